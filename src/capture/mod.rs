//! Screen capture and barcode collaborators
//!
//! Thin pollers over the native projection layer. Each one asks the native
//! side for its latest result and hands it out at most once per poll.

pub mod barcode;
pub mod screen;

pub use barcode::{
    BarcodeFormat, BarcodeReader, BarcodeReadingResult, BarcodeReadingResults, ResultPoint,
};
pub use screen::{CaptureStats, ScreenCapture};

/// Polling accessor for the latest result of a collaborator
pub trait ResultSource<T> {
    /// `None` when nothing new is available.
    fn try_get_result(&mut self) -> Option<T>;
}

/// Native barcode decoder (ZXing or ML Kit backed)
pub trait NativeBarcodeReader: Send {
    /// Latest result as JSON, empty when there is none
    fn latest_result_json(&mut self) -> String;

    fn close(&mut self);
}

/// Native screen image source
pub trait NativeImageSource: Send {
    /// Encoded bytes of the latest frame, if one arrived since the last call
    fn latest_image(&mut self, texture_required: bool) -> Option<Vec<u8>>;
}

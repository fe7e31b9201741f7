//! Barcode reading results

use super::{NativeBarcodeReader, ResultSource};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Symbologies reported by the native decoders. ML Kit names carry a
/// `FORMAT_` prefix and are accepted as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarcodeFormat {
    Aztec,
    Codabar,
    Code128,
    Code39,
    Code93,
    DataMatrix,
    Ean13,
    Ean8,
    Itf,
    MaxiCode,
    Pdf417,
    QrCode,
    Rss14,
    RssExpanded,
    UpcA,
    UpcE,
    UpcEanExtension,
    Unknown,
}

impl BarcodeFormat {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let name = value.strip_prefix("FORMAT_").unwrap_or(value);
        match name.to_ascii_uppercase().as_str() {
            "AZTEC" => BarcodeFormat::Aztec,
            "CODABAR" => BarcodeFormat::Codabar,
            "CODE_128" => BarcodeFormat::Code128,
            "CODE_39" => BarcodeFormat::Code39,
            "CODE_93" => BarcodeFormat::Code93,
            "DATA_MATRIX" => BarcodeFormat::DataMatrix,
            "EAN_13" => BarcodeFormat::Ean13,
            "EAN_8" => BarcodeFormat::Ean8,
            "ITF" => BarcodeFormat::Itf,
            "MAXICODE" => BarcodeFormat::MaxiCode,
            "PDF_417" | "PDF417" => BarcodeFormat::Pdf417,
            "QR_CODE" => BarcodeFormat::QrCode,
            "RSS_14" => BarcodeFormat::Rss14,
            "RSS_EXPANDED" => BarcodeFormat::RssExpanded,
            "UPC_A" => BarcodeFormat::UpcA,
            "UPC_E" => BarcodeFormat::UpcE,
            "UPC_EAN_EXTENSION" => BarcodeFormat::UpcEanExtension,
            _ => BarcodeFormat::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeFormat::Aztec => "AZTEC",
            BarcodeFormat::Codabar => "CODABAR",
            BarcodeFormat::Code128 => "CODE_128",
            BarcodeFormat::Code39 => "CODE_39",
            BarcodeFormat::Code93 => "CODE_93",
            BarcodeFormat::DataMatrix => "DATA_MATRIX",
            BarcodeFormat::Ean13 => "EAN_13",
            BarcodeFormat::Ean8 => "EAN_8",
            BarcodeFormat::Itf => "ITF",
            BarcodeFormat::MaxiCode => "MAXICODE",
            BarcodeFormat::Pdf417 => "PDF_417",
            BarcodeFormat::QrCode => "QR_CODE",
            BarcodeFormat::Rss14 => "RSS_14",
            BarcodeFormat::RssExpanded => "RSS_EXPANDED",
            BarcodeFormat::UpcA => "UPC_A",
            BarcodeFormat::UpcE => "UPC_E",
            BarcodeFormat::UpcEanExtension => "UPC_EAN_EXTENSION",
            BarcodeFormat::Unknown => "UNKNOWN",
        }
    }

    /// Space-separated list handed to the native reader constructor
    pub fn join(formats: &[BarcodeFormat]) -> String {
        formats
            .iter()
            .filter(|f| **f != BarcodeFormat::Unknown)
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPoint {
    pub x: f32,
    pub y: f32,
}

/// One decoded barcode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BarcodeReadingResult {
    pub text: String,
    pub format: String,
    pub num_bits: i32,
    /// Signed bytes as produced by the JVM
    pub raw_bytes: Vec<i32>,
    pub result_points: Vec<ResultPoint>,
    pub timestamp: i64,
}

impl BarcodeReadingResult {
    pub fn barcode_format(&self) -> BarcodeFormat {
        BarcodeFormat::parse(&self.format)
    }

    pub fn raw_bytes(&self) -> Vec<u8> {
        self.raw_bytes.iter().map(|b| *b as u8).collect()
    }
}

/// Every barcode found in one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeReadingResults {
    pub results: Vec<BarcodeReadingResult>,
    pub timestamp: i64,
}

/// Polls a native reader for its latest result.
///
/// `T` is [`BarcodeReadingResult`] for single-result decoders and
/// [`BarcodeReadingResults`] for multi-result ones.
pub struct BarcodeReader<N: NativeBarcodeReader, T = BarcodeReadingResult> {
    native: Option<N>,
    _result: PhantomData<fn() -> T>,
}

impl<N: NativeBarcodeReader, T> BarcodeReader<N, T> {
    pub fn new(native: Option<N>) -> Self {
        Self {
            native,
            _result: PhantomData,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.native.is_some()
    }

    /// Switch to a reader on a new projection manager. The old reader is
    /// closed first.
    pub fn rebind(&mut self, native: Option<N>) {
        self.close();
        self.native = native;
    }

    pub fn close(&mut self) {
        if let Some(mut native) = self.native.take() {
            native.close();
        }
    }
}

impl<N: NativeBarcodeReader, T: DeserializeOwned> ResultSource<T> for BarcodeReader<N, T> {
    fn try_get_result(&mut self) -> Option<T> {
        let native = self.native.as_mut()?;
        let json = native.latest_result_json();
        if json.is_empty() {
            return None;
        }
        debug!("Barcode reader result: {}", json);

        match serde_json::from_str(&json) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Dropping malformed barcode result: {}", e);
                None
            }
        }
    }
}

impl<N: NativeBarcodeReader, T> Drop for BarcodeReader<N, T> {
    fn drop(&mut self) {
        self.close();
    }
}

//! Screen capture polling

use super::{NativeImageSource, ResultSource};
use log::debug;
use std::fmt;

/// Capture statistics for monitoring
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureStats {
    /// Images handed out
    pub total_images: u64,

    /// Total encoded bytes handed out
    pub total_bytes: u64,

    /// Polls that found nothing new
    pub empty_polls: u64,
}

impl CaptureStats {
    fn record_image(&mut self, bytes: usize) {
        self.total_images += 1;
        self.total_bytes += bytes as u64;
    }
}

impl fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CaptureStats({} images, {} bytes, {} empty polls)",
            self.total_images, self.total_bytes, self.empty_polls
        )
    }
}

/// Latest projected frame, as encoded bytes
pub struct ScreenCapture<S: NativeImageSource> {
    source: Option<S>,
    texture_required: bool,
    stats: CaptureStats,
}

impl<S: NativeImageSource> ScreenCapture<S> {
    pub fn new(source: Option<S>, texture_required: bool) -> Self {
        Self {
            source,
            texture_required,
            stats: CaptureStats::default(),
        }
    }

    /// Follow the projection manager when it is replaced.
    pub fn set_source(&mut self, source: Option<S>) {
        self.source = source;
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }
}

impl<S: NativeImageSource> ResultSource<Vec<u8>> for ScreenCapture<S> {
    fn try_get_result(&mut self) -> Option<Vec<u8>> {
        let source = self.source.as_mut()?;
        match source.latest_image(self.texture_required) {
            Some(image) if !image.is_empty() => {
                self.stats.record_image(image.len());
                if self.stats.total_images == 1 {
                    debug!("First screen capture: {} bytes", image.len());
                }
                Some(image)
            }
            _ => {
                self.stats.empty_polls += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeSource {
        frames: VecDeque<Option<Vec<u8>>>,
        texture_flags: Vec<bool>,
    }

    impl NativeImageSource for FakeSource {
        fn latest_image(&mut self, texture_required: bool) -> Option<Vec<u8>> {
            self.texture_flags.push(texture_required);
            self.frames.pop_front().flatten()
        }
    }

    #[test]
    fn test_polls_latest_image() {
        let source = FakeSource {
            frames: VecDeque::from(vec![Some(vec![0x89, 0x50, 0x4e, 0x47]), Some(Vec::new()), None]),
            texture_flags: Vec::new(),
        };
        let mut capture = ScreenCapture::new(Some(source), true);

        assert_eq!(capture.try_get_result(), Some(vec![0x89, 0x50, 0x4e, 0x47]));
        assert_eq!(capture.try_get_result(), None);
        assert_eq!(capture.try_get_result(), None);
        assert_eq!(capture.source.as_ref().unwrap().texture_flags, vec![true, true, true]);
        assert_eq!(
            capture.stats(),
            &CaptureStats {
                total_images: 1,
                total_bytes: 4,
                empty_polls: 2,
            }
        );
    }

    #[test]
    fn test_unbound_capture_is_empty() {
        let mut capture: ScreenCapture<FakeSource> = ScreenCapture::new(None, false);
        assert_eq!(capture.try_get_result(), None);
        assert_eq!(capture.stats().empty_polls, 0);

        capture.set_source(Some(FakeSource {
            frames: VecDeque::from(vec![Some(vec![1])]),
            texture_flags: Vec::new(),
        }));
        assert_eq!(capture.try_get_result(), Some(vec![1]));
    }
}

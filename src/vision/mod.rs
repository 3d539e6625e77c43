//! Vision and image processing module
//!
//! Handles frame acquisition and history, template matching, OCR of numeric
//! readouts and detection of a frozen screen.

pub mod capture;
pub mod matcher;
pub mod ocr;
pub mod stuck;

use std::time::{Duration, Instant};

use image::GrayImage;

use crate::android::DeviceError;

pub use capture::{FrameHistory, FrameSource, HISTORY_CAPACITY};
pub use matcher::{MatchResult, Template, TemplateLibrary, VisualMatcher};
pub use ocr::{NumericReader, Ocr, OcrError, TesseractOcr};
pub use stuck::StuckDetector;

/// A captured screen: grayscale raster plus capture time
#[derive(Debug, Clone)]
pub struct Frame {
    image: GrayImage,
    captured_at: Instant,
}

impl Frame {
    /// Wrap a raster captured just now
    pub fn new(image: GrayImage) -> Self {
        Self::at(image, Instant::now())
    }

    /// Wrap a raster captured at a known instant
    pub fn at(image: GrayImage, captured_at: Instant) -> Self {
        Self { image, captured_at }
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Time elapsed since the capture
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Vision system errors
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Failed to capture screen: {0}")]
    Capture(#[from] DeviceError),
    #[error("Template {name} not found at {path}")]
    MissingTemplate { name: String, path: String },
    #[error("Template {name} could not be loaded: {reason}")]
    InvalidTemplate { name: String, reason: String },
}

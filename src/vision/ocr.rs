//! OCR of monetary readouts
//!
//! OCR output is best-effort text. [`parse_amount`] turns whatever comes back
//! into an amount without ever failing: anything unreadable is 0.0.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::{imageops, GrayImage};

use super::FrameSource;
use crate::config::Region;

/// Text recognition backend
pub trait Ocr: Send + Sync {
    /// Recognize the text in a cropped raster
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError>;
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Failed to run OCR: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write OCR input: {0}")]
    Image(#[from] image::ImageError),
    #[error("OCR failed: {0}")]
    Failed(String),
}

/// OCR backend that runs the Tesseract command line tool
pub struct TesseractOcr {
    binary: PathBuf,
    temp_dir: PathBuf,
    counter: AtomicU64,
}

impl TesseractOcr {
    /// Create a backend running `binary`
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self::with_temp_dir(binary, std::env::temp_dir().join("warden_ocr"))
    }

    /// Create a backend that writes its input rasters under `temp_dir`
    pub fn with_temp_dir(binary: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        let temp_dir = temp_dir.into();
        if let Err(e) = std::fs::create_dir_all(&temp_dir) {
            log::warn!(
                "Cannot create OCR directory {}, gold readings will fail: {}",
                temp_dir.display(),
                e
            );
        }

        Self {
            binary: binary.into(),
            temp_dir,
            counter: AtomicU64::new(0),
        }
    }

    /// Check that the binary runs
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl Ocr for TesseractOcr {
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self
            .temp_dir
            .join(format!("ocr_input_{}_{}.png", std::process::id(), n % 4));
        image.save(&path)?;

        let output = Command::new(&self.binary)
            .arg(&path)
            .arg("stdout")
            .arg("--psm")
            .arg("7") // Single text line
            .output()?;
        let _ = std::fs::remove_file(&path);

        if !output.status.success() {
            return Err(OcrError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse a monetary amount from raw OCR text.
///
/// Takes the first token starting with a digit, keeps its digits and first
/// decimal point, then applies at most one unit multiplier (b > m > k).
pub fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '.' || c.is_whitespace())
        .collect();

    let Some(token) = cleaned
        .split_whitespace()
        .find(|t| t.starts_with(|c: char| c.is_ascii_digit()))
    else {
        return 0.0;
    };

    let mut seen_dot = false;
    let digits: String = token
        .chars()
        .filter(|&c| match c {
            '.' => !std::mem::replace(&mut seen_dot, true),
            c => c.is_ascii_digit(),
        })
        .collect();

    match digits.parse::<f64>() {
        Ok(amount) if amount.is_finite() => amount * unit_multiplier(raw),
        _ => 0.0,
    }
}

/// Multiplier for the highest unit suffix in the text.
///
/// A suffix letter counts only right after a digit or decimal point,
/// optionally separated by whitespace.
fn unit_multiplier(raw: &str) -> f64 {
    let (mut thousand, mut million, mut billion) = (false, false, false);
    let mut after_number = false;

    for c in raw.chars().flat_map(char::to_lowercase) {
        if after_number {
            match c {
                'k' => thousand = true,
                'm' => million = true,
                'b' => billion = true,
                _ => {}
            }
        }
        after_number = c.is_ascii_digit() || c == '.' || (after_number && c.is_whitespace());
    }

    if billion {
        1e9
    } else if million {
        1e6
    } else if thousand {
        1e3
    } else {
        1.0
    }
}

/// Reads monetary amounts from screen regions
pub struct NumericReader {
    frames: FrameSource,
    ocr: Arc<dyn Ocr>,
}

impl NumericReader {
    pub fn new(frames: FrameSource, ocr: Arc<dyn Ocr>) -> Self {
        Self { frames, ocr }
    }

    /// Read the amount shown in a region.
    ///
    /// With `fresh` set the screen is captured specifically for this read;
    /// otherwise the current frame is reused. Never fails: anything that
    /// cannot be read is 0.0.
    pub fn read(&self, region: Region, fresh: bool) -> f64 {
        let frame = if fresh {
            self.frames.numeric().map(Arc::new)
        } else {
            self.frames.current()
        };

        match frame {
            Ok(frame) => self.read_image(frame.image(), region),
            Err(e) => {
                log::warn!("Error reading number from screen: {}", e);
                0.0
            }
        }
    }

    /// Read the amount shown in a region of an already captured raster
    pub fn read_image(&self, image: &GrayImage, region: Region) -> f64 {
        let Some((x, y, w, h)) = region.clamp_to(image.width(), image.height()) else {
            log::warn!("OCR region {:?} lies outside the frame", region);
            return 0.0;
        };

        let crop = imageops::crop_imm(image, x, y, w, h).to_image();
        match self.ocr.recognize(&crop) {
            Ok(text) => {
                let amount = parse_amount(&text);
                log::debug!("OCR {:?} -> {}", text.trim(), amount);
                amount
            }
            Err(e) => {
                log::warn!("Error in OCR: {}", e);
                0.0
            }
        }
    }
}

// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns an image file into the fixed-shape input the network
// expects:
//
//   1. decode (png / jpeg / ...)
//   2. convert to a single grey channel
//   3. bilinear resize to height × width (default 256 × 240)
//   4. scale intensities to [0, 1] at batching time
//
// Pixels stay as u8 until batching so a decoded training set
// takes a quarter of the memory of an f32 copy.

use image::imageops::{self, FilterType};
use std::path::Path;

use crate::domain::error::DataError;

pub const DEFAULT_HEIGHT: usize = 256;
pub const DEFAULT_WIDTH:  usize = 240;

/// A decoded single-channel image of fixed size.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanImage {
    pub height: usize,
    pub width:  usize,
    pixels:     Vec<u8>,
}

impl ScanImage {
    #[cfg(test)]
    pub fn from_pixels(height: usize, width: usize, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == height * width).then_some(Self { height, width, pixels })
    }

    /// Row-major intensities in [0, 1]
    pub fn to_floats(&self) -> Vec<f32> {
        self.pixels.iter().map(|&p| p as f32 / 255.0).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    pub height: usize,
    pub width:  usize,
}

impl ImagePreprocessor {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub fn load(&self, path: &Path) -> Result<ScanImage, DataError> {
        let img = image::open(path).map_err(|e| DataError::ImageDecode {
            path:   path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(self.process(&img))
    }

    pub fn process(&self, img: &image::DynamicImage) -> ScanImage {
        let grey = img.to_luma8();
        let grey = if grey.height() as usize == self.height && grey.width() as usize == self.width {
            grey
        } else {
            imageops::resize(&grey, self.width as u32, self.height as u32, FilterType::Triangle)
        };
        ScanImage {
            height: self.height,
            width:  self.width,
            pixels: grey.into_raw(),
        }
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_HEIGHT, DEFAULT_WIDTH)
    }
}

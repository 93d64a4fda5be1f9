//! Core types for decoding: codec errors, rasters and orientation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for coefficient decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input holds no bytes.
    #[error("Input is empty")]
    Empty,

    /// The input does not start with an SOI marker.
    #[error("Not a JPEG stream (missing SOI marker)")]
    NotJpeg,

    /// A marker segment runs past the end of the input.
    #[error("Unexpected end of JPEG data")]
    Truncated,

    /// The stream uses a JPEG process this decoder does not handle.
    #[error("Unsupported JPEG feature: {0}")]
    Unsupported(String),

    /// A marker segment is malformed.
    #[error("Invalid marker segment: {0}")]
    InvalidSegment(String),

    /// A scan references a Huffman table that was never defined.
    #[error("Huffman table {class} {id} is not defined")]
    MissingHuffmanTable { class: &'static str, id: u8 },

    /// A component references a quantization table that was never defined.
    #[error("Quantization table {0} is not defined")]
    MissingQuantTable(u8),

    /// The stream ends before any frame or scan was seen.
    #[error("No {0} found in JPEG stream")]
    Missing(&'static str),

    /// Entropy-coded data cannot be decoded.
    #[error("Corrupted entropy-coded data: {0}")]
    CorruptData(String),
}

/// Error types for loading a pixel raster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasterError {
    /// The file format is not recognized or supported.
    #[error("Invalid or unsupported image format")]
    InvalidFormat,

    /// The image file is corrupted or incomplete.
    #[error("Corrupted or incomplete image file: {0}")]
    CorruptedFile(String),
}

/// EXIF orientation values (1-8).
/// See: https://exiftool.org/TagNames/EXIF.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Orientation {
    #[default]
    Normal = 1,
    FlipHorizontal = 2,
    Rotate180 = 3,
    FlipVertical = 4,
    /// Flip horizontal + rotate 270 CW.
    Transpose = 5,
    Rotate90CW = 6,
    /// Flip horizontal + rotate 90 CW.
    Transverse = 7,
    Rotate270CW = 8,
}

impl Orientation {
    /// Returns true if this orientation swaps width and height.
    #[inline]
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90CW
                | Orientation::Transverse
                | Orientation::Rotate270CW
        )
    }
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90CW,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270CW,
            _ => Orientation::Normal,
        }
    }
}

/// Options for converting source bytes to a raster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterOptions {
    /// Rotate/flip according to the EXIF orientation tag.
    ///
    /// Off by default so the re-encoded image keeps the source dimensions.
    pub apply_orientation: bool,
}

/// An RGBA pixel raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// RGBA pixel data in row-major order (4 bytes per pixel).
    pub pixels: Vec<u8>,
}

impl Raster {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * 4,
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn from_rgba_image(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.into_raw(),
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_from_u32() {
        assert_eq!(Orientation::from(1), Orientation::Normal);
        assert_eq!(Orientation::from(6), Orientation::Rotate90CW);
        assert_eq!(Orientation::from(99), Orientation::Normal);
    }

    #[test]
    fn test_orientation_swaps_dimensions() {
        assert!(!Orientation::Normal.swaps_dimensions());
        assert!(!Orientation::Rotate180.swaps_dimensions());
        assert!(Orientation::Rotate90CW.swaps_dimensions());
        assert!(Orientation::Transverse.swaps_dimensions());
    }

    #[test]
    fn test_raster_from_rgba_image() {
        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]));
        let raster = Raster::from_rgba_image(img);
        assert_eq!((raster.width, raster.height), (3, 2));
        assert_eq!(raster.pixel_count(), 6);
        assert_eq!(&raster.pixels[4..8], &[1, 2, 3, 255]);
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::MissingHuffmanTable { class: "AC", id: 1 };
        assert_eq!(err.to_string(), "Huffman table AC 1 is not defined");
        assert_eq!(RasterError::InvalidFormat.to_string(), "Invalid or unsupported image format");
    }
}

//! Pixel decoding of arbitrary source images with optional EXIF orientation.

use std::io::Cursor;

use exif::{In, Reader, Tag};
use image::{DynamicImage, ImageReader};

use super::{Orientation, Raster, RasterError, RasterOptions};

/// Decode `bytes` (JPEG, PNG, BMP or WebP) to an RGBA raster.
///
/// # Errors
///
/// Returns `RasterError::InvalidFormat` if the format cannot be recognized.
/// Returns `RasterError::CorruptedFile` if the image fails to decode.
pub fn to_raster(bytes: &[u8], options: &RasterOptions) -> Result<Raster, RasterError> {
    if bytes.is_empty() {
        return Err(RasterError::InvalidFormat);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RasterError::CorruptedFile(e.to_string()))?;
    if reader.format().is_none() {
        return Err(RasterError::InvalidFormat);
    }

    let img = reader
        .decode()
        .map_err(|e| RasterError::CorruptedFile(e.to_string()))?;

    let img = if options.apply_orientation {
        apply_orientation(img, get_orientation(bytes))
    } else {
        img
    };

    Ok(Raster::from_rgba_image(img.into_rgba8()))
}

/// EXIF orientation of `bytes`, `Orientation::Normal` when absent or unreadable.
pub fn get_orientation(bytes: &[u8]) -> Orientation {
    let mut cursor = Cursor::new(bytes);
    match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Orientation::from)
            .unwrap_or_default(),
        Err(_) => Orientation::Normal,
    }
}

fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::FlipVertical => img.flipv(),
        Orientation::Transpose => img.rotate90().fliph(),
        Orientation::Rotate90CW => img.rotate90(),
        Orientation::Transverse => img.rotate270().fliph(),
        Orientation::Rotate270CW => img.rotate270(),
    }
}

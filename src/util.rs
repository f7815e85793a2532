use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};

use crate::{error::SubmissionError, PixelBoundingBox};

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

pub fn png_data_uri(image: &DynamicImage) -> Result<String, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    log::trace!(
        "Encoded {}x{} raster to {} PNG bytes.",
        image.width(),
        image.height(),
        bytes.len()
    );
    Ok(format!("{PNG_DATA_URI_PREFIX}{}", STANDARD.encode(bytes)))
}

/// Decodes any image payload and re-encodes it as a PNG data URI.
pub fn reencode_png_data_uri(bytes: &[u8]) -> Result<String, image::ImageError> {
    let image = image::load_from_memory(bytes)?;
    png_data_uri(&image)
}

pub fn is_data_uri(handle: &str) -> bool {
    handle.starts_with("data:")
}

/// Returns the raw bytes of a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, SubmissionError> {
    let (header, payload) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or(SubmissionError::InvalidDataUri)?;
    if !header.ends_with(";base64") {
        return Err(SubmissionError::InvalidDataUri);
    }
    STANDARD
        .decode(payload)
        .map_err(|_| SubmissionError::InvalidDataUri)
}

/// Crops `image` to the pixels covered by `b_box`, clamped to the raster.
pub fn crop_to_bbox(image: &DynamicImage, b_box: &PixelBoundingBox) -> DynamicImage {
    let (image_width, image_height) = (image.width() as f64, image.height() as f64);
    let left = b_box.min_x.floor().clamp(0.0, image_width);
    let top = b_box.min_y.floor().clamp(0.0, image_height);
    let right = (b_box.min_x + b_box.width).ceil().clamp(left, image_width);
    let bottom = (b_box.min_y + b_box.height).ceil().clamp(top, image_height);
    log::trace!("Slicing subimage to {b_box:?}");
    image.crop_imm(
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    )
}

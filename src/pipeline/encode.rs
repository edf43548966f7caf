//! Image encoding: page images and uploaded photos → base64 `ImageData`.
//!
//! Rendered PDF pages are PNG-encoded (lossless keeps thin grid lines and
//! small digits crisp). Uploaded PNG/JPEG photos are forwarded byte-for-byte
//! when they already fit `max_rendered_pixels`; anything larger, and any
//! WebP/GIF, is decoded, downscaled and re-encoded as PNG.

use super::input::InputKind;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the VLM API.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode an uploaded image file.
pub fn encode_image_file(
    bytes: &[u8],
    kind: InputKind,
    max_pixels: u32,
) -> Result<ImageData, image::ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let (width, height) = reader.into_dimensions()?;
    let fits = width.max(height) <= max_pixels;

    if fits && matches!(kind, InputKind::Png | InputKind::Jpeg) {
        debug!("Forwarding {}x{} {:?} unchanged", width, height, kind);
        return Ok(ImageData::new(STANDARD.encode(bytes), kind.mime_type()).with_detail("high"));
    }

    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    encode_page(&fit_within(img, max_pixels))
}

/// Downscale so the longest side is at most `max_pixels`, keeping aspect.
pub fn fit_within(img: DynamicImage, max_pixels: u32) -> DynamicImage {
    if img.width().max(img.height()) <= max_pixels {
        return img;
    }
    debug!(
        "Downscaling {}x{} to fit {} px",
        img.width(),
        img.height(),
        max_pixels
    );
    img.resize(max_pixels, max_pixels, FilterType::Lanczos3)
}

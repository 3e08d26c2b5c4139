//! Decode, resize and re-encode images.
//!
//! | Step | How |
//! |---|---|
//! | Decode (JPEG, PNG, GIF) | format sniffed from magic bytes, `image` decoders |
//! | Resize | `image::imageops` with the `Lanczos3` filter |
//! | Encode | `JpegEncoder` at its default quality |
//! | ETag | SHA-256 over the encoded bytes |

use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder, imageops::FilterType};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

const SUPPORTED_FORMATS: &[ImageFormat] =
    &[ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Gif];

/// Largest output raster accepted, in pixels (roughly 8K x 5K).
pub const MAX_OUTPUT_PIXELS: u64 = 40_000_000;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("image could not be decoded: {0}")]
    Decode(String),
    #[error("image could not be encoded: {0}")]
    Encode(String),
    #[error("output size {width}x{height} is too large")]
    TooLarge { width: u32, height: u32 },
}

/// JPEG bytes ready to send, plus their cache validator.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    /// Quoted hex SHA-256 of `bytes`.
    pub etag: String,
}

impl EncodedImage {
    fn new(bytes: Vec<u8>) -> Self {
        let etag = format!("\"{:x}\"", Sha256::digest(&bytes));
        Self { bytes, etag }
    }
}

/// Decode raster data, detecting the format from its leading bytes.
pub fn decode(data: &[u8]) -> Result<DynamicImage, ImageError> {
    let format = image::guess_format(data).map_err(|_| ImageError::UnsupportedFormat)?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(ImageError::UnsupportedFormat);
    }
    debug!(?format, "decoding image");
    image::load_from_memory_with_format(data, format)
        .map_err(|e| ImageError::Decode(e.to_string()))
}

/// Work out output dimensions for a requested `width` x `height`.
///
/// A zero axis is derived from the other one so the source aspect ratio
/// holds; both zero keeps the source size.
pub fn target_dimensions(src_width: u32, src_height: u32, width: u32, height: u32) -> (u32, u32) {
    let scale = |len: u32, num: u32, den: u32| -> u32 {
        let scaled = (len as f64 * num as f64 / den as f64).round();
        scaled.clamp(1.0, u32::MAX as f64) as u32
    };

    match (width, height) {
        (0, 0) => (src_width, src_height),
        (w, 0) => (w, scale(src_height, w, src_width.max(1))),
        (0, h) => (scale(src_width, h, src_height.max(1)), h),
        (w, h) => (w, h),
    }
}

/// Scale `img` to the requested size with Lanczos3 resampling.
///
/// The output size is checked against `MAX_OUTPUT_PIXELS` before any
/// buffer is allocated.
pub fn resize(img: DynamicImage, width: u32, height: u32) -> Result<DynamicImage, ImageError> {
    let (w, h) = target_dimensions(img.width(), img.height(), width, height);
    if (w, h) == (img.width(), img.height()) {
        return Ok(img);
    }
    if u64::from(w) * u64::from(h) > MAX_OUTPUT_PIXELS {
        return Err(ImageError::TooLarge {
            width: w,
            height: h,
        });
    }
    Ok(img.resize_exact(w, h, FilterType::Lanczos3))
}

/// Encode as baseline JPEG.
///
/// JPEG has no alpha channel, so everything is flattened to 8-bit RGB
/// (or kept as 8-bit luma) before encoding.
pub fn encode_jpeg(img: &DynamicImage) -> Result<EncodedImage, ImageError> {
    let flat = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => None,
        other => Some(DynamicImage::ImageRgb8(other.to_rgb8())),
    };
    let source = flat.as_ref().unwrap_or(img);

    let mut bytes = Vec::new();
    source
        .write_with_encoder(JpegEncoder::new(&mut bytes))
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ImageError::Encode("encoder produced no output".into()));
    }
    Ok(EncodedImage::new(bytes))
}

/// Run the whole pipeline over an inflated object payload.
pub fn transform(data: &[u8], width: u32, height: u32) -> Result<EncodedImage, ImageError> {
    let decoded = decode(data)?;
    let resized = resize(decoded, width, height)?;
    encode_jpeg(&resized)
}

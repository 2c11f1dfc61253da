use std::io::Cursor;

use image::DynamicImage;
use image::imageops::FilterType;

const THUMB_JPEG_QUALITY: u8 = 85;

/// A cover image re-encoded into the single lossy format the store keeps.
#[derive(Debug, Clone)]
pub struct NormalizedCover {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode raw cover bytes (any format the image crate knows) and re-encode
/// as lossy WebP at native resolution. Pure per-call transform; the caller
/// decides where it runs.
pub fn normalize(raw: &[u8], quality: f32) -> Result<NormalizedCover, CoverError> {
    let img = image::load_from_memory(raw)?;
    let (width, height) = (img.width(), img.height());

    // The WebP encoder only takes RGB8/RGBA8 surfaces
    let img = DynamicImage::ImageRgba8(img.to_rgba8());
    let encoder =
        webp::Encoder::from_image(&img).map_err(|e| CoverError::Encode(e.to_string()))?;
    let data = encoder.encode(quality).to_vec();

    Ok(NormalizedCover {
        data,
        width,
        height,
    })
}

/// Downscaled JPEG rendition for list views. Unlike `normalize` this does
/// resize; it is a convenience on top of stored covers, not part of the
/// ingest path.
pub fn thumbnail(data: &[u8], size: u32) -> Result<Vec<u8>, CoverError> {
    let img = image::load_from_memory(data)?;
    let thumb = img.resize(size, size, FilterType::Lanczos3);
    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, THUMB_JPEG_QUALITY);
    thumb.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

#[derive(Debug, thiserror::Error)]
pub enum CoverError {
    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("WebP encode error: {0}")]
    Encode(String),
}

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat};

use crate::error::EngineResult;

pub const PNG_EDIT_CAP_BYTES: usize = 4 * 1024 * 1024;
const PNG_EDGE_FLOOR: u32 = 256;

pub fn decode_grayscale(bytes: &[u8]) -> EngineResult<GrayImage> {
    Ok(image::load_from_memory(bytes)?.to_luma8())
}

pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> EngineResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(bytes)
}

pub fn encode_png(image: &DynamicImage) -> EngineResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

/// Target for the final photo sent back to chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegBudget {
    pub max_width: u32,
    pub max_height: u32,
    pub cap_bytes: usize,
    pub initial_quality: u8,
    pub min_quality: u8,
    pub step: u8,
}

impl Default for JpegBudget {
    fn default() -> Self {
        Self {
            max_width: 1600,
            max_height: 1600,
            cap_bytes: 700 * 1024,
            initial_quality: 88,
            min_quality: 62,
            step: 4,
        }
    }
}

/// Downscales to the budget's bounds, then lowers quality by `step` until the
/// encoding fits under the cap or the minimum quality is reached.
pub fn compress_jpeg(image: &DynamicImage, budget: &JpegBudget) -> EngineResult<Vec<u8>> {
    let fitted = shrink_to_fit(image, budget.max_width, budget.max_height);
    let min_quality = budget.min_quality.min(budget.initial_quality);
    let mut quality = budget.initial_quality;
    let mut out = encode_jpeg(&fitted, quality)?;
    while out.len() > budget.cap_bytes && quality > min_quality {
        quality = quality.saturating_sub(budget.step.max(1)).max(min_quality);
        out = encode_jpeg(&fitted, quality)?;
    }
    tracing::debug!(quality, bytes = out.len(), "jpeg compressed");
    Ok(out)
}

/// PNG for image-edit uploads: starts at `first_max_edge` and shrinks the
/// long edge by 15% per pass until under `cap_bytes`, stopping at 256px.
pub fn png_under_cap(bytes: &[u8], first_max_edge: u32, cap_bytes: usize) -> EngineResult<Vec<u8>> {
    let source = image::load_from_memory(bytes)?;
    let source = match source {
        DynamicImage::ImageRgba8(_) | DynamicImage::ImageLumaA8(_) => source,
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    };
    let mut max_edge = first_max_edge.max(1);
    let mut out = encode_png(&shrink_to_fit(&source, max_edge, max_edge))?;
    while out.len() >= cap_bytes && max_edge > PNG_EDGE_FLOOR {
        max_edge = max_edge * 85 / 100;
        out = encode_png(&shrink_to_fit(&source, max_edge, max_edge))?;
    }
    Ok(out)
}

fn shrink_to_fit(image: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = (image.width().max(1), image.height().max(1));
    let scale = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    if scale >= 1.0 {
        return image.clone();
    }
    let new_w = ((width as f64 * scale) as u32).max(1);
    let new_h = ((height as f64 * scale) as u32).max(1);
    image.resize_exact(new_w, new_h, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use image::{Luma, Rgb, RgbImage};

    use super::*;

    fn noise(width: u32, height: u32) -> DynamicImage {
        let mut state = 0x2545_f491_u32;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [a, b, c, _] = state.to_le_bytes();
            Rgb([a, b, c])
        }))
    }

    #[test]
    fn compress_downscales_to_the_bounds() -> anyhow::Result<()> {
        let source = DynamicImage::ImageLuma8(GrayImage::from_pixel(2000, 1000, Luma([90])));
        let bytes = compress_jpeg(&source, &JpegBudget::default())?;
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (1600, 800));
        Ok(())
    }

    #[test]
    fn compress_lowers_quality_for_a_tight_cap() -> anyhow::Result<()> {
        let source = noise(256, 256);
        let roomy = compress_jpeg(&source, &JpegBudget::default())?;
        let tight = compress_jpeg(
            &source,
            &JpegBudget {
                cap_bytes: 1,
                ..JpegBudget::default()
            },
        )?;
        assert!(tight.len() < roomy.len());
        assert_eq!(tight, encode_jpeg(&source, 62)?);
        Ok(())
    }

    #[test]
    fn png_under_cap_shrinks_until_it_fits() -> anyhow::Result<()> {
        let source = encode_png(&noise(600, 300))?;
        let unconstrained = png_under_cap(&source, 1024, PNG_EDIT_CAP_BYTES)?;
        let decoded = image::load_from_memory(&unconstrained)?;
        assert_eq!((decoded.width(), decoded.height()), (600, 300));
        assert!(matches!(decoded, DynamicImage::ImageRgba8(_)));

        let capped = png_under_cap(&source, 512, 64 * 1024)?;
        let decoded = image::load_from_memory(&capped)?;
        assert!(decoded.width() < 512);
        assert!(decoded.width() >= 200);
        Ok(())
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(decode_grayscale(b"not an image").is_err());
    }
}

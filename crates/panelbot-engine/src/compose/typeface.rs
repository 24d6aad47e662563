use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontVec, GlyphId, PxScale, ScaleFont};
use image::{GrayImage, Luma};

use crate::error::{EngineError, EngineResult};

/// Glyph metrics and rasterization used by caption fitting. Sizes are in
/// pixels per em.
pub trait Typeface {
    /// Width and height of a single line of `text`.
    fn measure(&self, text: &str, size: u32) -> (u32, u32);

    fn line_height(&self, size: u32) -> u32;

    fn draw(&self, canvas: &mut GrayImage, x: i64, y: i64, text: &str, size: u32, ink: u8);
}

impl<F: Typeface + ?Sized> Typeface for &F {
    fn measure(&self, text: &str, size: u32) -> (u32, u32) {
        (**self).measure(text, size)
    }

    fn line_height(&self, size: u32) -> u32 {
        (**self).line_height(size)
    }

    fn draw(&self, canvas: &mut GrayImage, x: i64, y: i64, text: &str, size: u32, ink: u8) {
        (**self).draw(canvas, x, y, text, size, ink)
    }
}

/// Renders every visible character as a solid ink block. ASCII advances 3/5
/// of an em, everything else a full em.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockFace;

impl BlockFace {
    fn advance(ch: char, size: u32) -> u32 {
        if ch.is_ascii() {
            (size * 3 / 5).max(1)
        } else {
            size.max(1)
        }
    }
}

impl Typeface for BlockFace {
    fn measure(&self, text: &str, size: u32) -> (u32, u32) {
        let width = text.chars().map(|ch| Self::advance(ch, size)).sum();
        let height = if text.is_empty() { 0 } else { self.line_height(size) };
        (width, height)
    }

    fn line_height(&self, size: u32) -> u32 {
        size.max(1)
    }

    fn draw(&self, canvas: &mut GrayImage, x: i64, y: i64, text: &str, size: u32, ink: u8) {
        let (cw, ch) = canvas.dimensions();
        let em = i64::from(size.max(1));
        let inset = (em / 10).max(1);
        let mut pen = x;
        for glyph in text.chars() {
            let advance = i64::from(Self::advance(glyph, size));
            if !glyph.is_whitespace() {
                let x0 = (pen + inset).max(0);
                let x1 = (pen + advance - inset).min(i64::from(cw));
                let y0 = (y + inset).max(0);
                let y1 = (y + em - inset).min(i64::from(ch));
                for py in y0..y1 {
                    for px in x0..x1 {
                        canvas.put_pixel(px as u32, py as u32, Luma([ink]));
                    }
                }
            }
            pen += advance;
        }
    }
}

/// TrueType/OpenType outlines rasterized with coverage blending. Collections
/// (`.ttc`) use their first face.
pub struct OutlineFace {
    font: FontVec,
}

impl OutlineFace {
    pub fn from_bytes(bytes: Vec<u8>) -> EngineResult<Self> {
        let font = FontVec::try_from_vec_and_index(bytes, 0)
            .map_err(|err| EngineError::Decode(format!("invalid font: {err}")))?;
        Ok(Self { font })
    }

    pub fn open(path: &Path) -> EngineResult<Self> {
        let bytes = std::fs::read(path).map_err(|err| {
            EngineError::config(format!("failed to read font {}: {err}", path.display()))
        })?;
        Self::from_bytes(bytes)
    }

    /// First candidate that exists and parses, with the path it came from.
    pub fn first_available(candidates: &[PathBuf]) -> Option<(PathBuf, Self)> {
        for path in candidates.iter().filter(|path| path.is_file()) {
            match Self::open(path) {
                Ok(face) => return Some((path.clone(), face)),
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping font"),
            }
        }
        None
    }

    /// `size` is pixels per em, as PIL and CSS count it.
    fn scale(&self, size: u32) -> PxScale {
        let units_per_em = self.font.units_per_em().unwrap_or(1000.0);
        PxScale::from(size.max(1) as f32 * self.font.height_unscaled() / units_per_em)
    }

    fn advances(&self, text: &str, scale: PxScale) -> Vec<(GlyphId, f32)> {
        let scaled = self.font.as_scaled(scale);
        let mut pen = 0.0;
        let mut previous: Option<GlyphId> = None;
        text.chars()
            .map(|ch| {
                let id = self.font.glyph_id(ch);
                if let Some(prev) = previous {
                    pen += scaled.kern(prev, id);
                }
                let at = pen;
                pen += scaled.h_advance(id);
                previous = Some(id);
                (id, at)
            })
            .collect()
    }
}

impl Typeface for OutlineFace {
    fn measure(&self, text: &str, size: u32) -> (u32, u32) {
        if text.is_empty() {
            return (0, 0);
        }
        let scale = self.scale(size);
        let scaled = self.font.as_scaled(scale);
        let width = self
            .advances(text, scale)
            .last()
            .map(|(id, at)| at + scaled.h_advance(*id))
            .unwrap_or(0.0);
        (width.ceil() as u32, self.line_height(size))
    }

    fn line_height(&self, size: u32) -> u32 {
        let scaled = self.font.as_scaled(self.scale(size));
        (scaled.ascent() - scaled.descent()).ceil().max(1.0) as u32
    }

    fn draw(&self, canvas: &mut GrayImage, x: i64, y: i64, text: &str, size: u32, ink: u8) {
        let scale = self.scale(size);
        let baseline = y as f32 + self.font.as_scaled(scale).ascent();
        let (cw, ch) = canvas.dimensions();
        for (id, at) in self.advances(text, scale) {
            let glyph = id.with_scale_and_position(scale, point(x as f32 + at, baseline));
            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i64 + i64::from(gx);
                let py = bounds.min.y as i64 + i64::from(gy);
                if px < 0 || py < 0 || px >= i64::from(cw) || py >= i64::from(ch) {
                    return;
                }
                let (px, py) = (px as u32, py as u32);
                let under = f32::from(canvas.get_pixel(px, py)[0]);
                let mixed = under + (f32::from(ink) - under) * coverage.clamp(0.0, 1.0);
                canvas.put_pixel(px, py, Luma([mixed.round() as u8]));
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_characters_take_a_full_em() {
        assert_eq!(BlockFace.measure("再无话说", 40), (160, 40));
        assert_eq!(BlockFace.measure("ok", 40), (48, 40));
        assert_eq!(BlockFace.measure("", 40), (0, 0));
    }

    #[test]
    fn draw_clips_to_canvas_and_skips_spaces() {
        let mut canvas = GrayImage::from_pixel(30, 20, Luma([255]));
        BlockFace.draw(&mut canvas, -5, 0, "字 字", 20, 0);
        assert_eq!(canvas.get_pixel(5, 10)[0], 0);
        // the space between the glyphs stays blank
        assert_eq!(canvas.get_pixel(21, 10)[0], 255);
        assert_eq!(canvas.get_pixel(29, 10)[0], 0);
    }

    const SYSTEM_FONTS: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ];

    #[test]
    fn garbage_is_not_a_font() {
        assert!(matches!(
            OutlineFace::from_bytes(b"definitely not sfnt".to_vec()),
            Err(EngineError::Decode(_))
        ));
        let missing = PathBuf::from("/nonexistent/font.ttf");
        assert!(matches!(OutlineFace::open(&missing), Err(EngineError::Config(_))));
        assert!(OutlineFace::first_available(&[missing]).is_none());
    }

    #[test]
    fn outline_face_measures_and_draws_real_glyphs() {
        let candidates: Vec<PathBuf> = SYSTEM_FONTS.iter().map(PathBuf::from).collect();
        let Some((path, face)) = OutlineFace::first_available(&candidates) else {
            eprintln!("no system font found; outline rendering not exercised");
            return;
        };

        let (short_w, short_h) = face.measure("Hi", 40);
        let (long_w, long_h) = face.measure("Hi Hi Hi", 40);
        assert!(short_w > 0, "{}", path.display());
        assert!(long_w > short_w * 3);
        assert_eq!(short_h, long_h);
        assert_eq!(short_h, face.line_height(40));
        assert!(face.line_height(80) > face.line_height(40));
        assert_eq!(face.measure("", 40), (0, 0));

        let mut canvas = GrayImage::from_pixel(200, 80, Luma([255]));
        face.draw(&mut canvas, 10, 10, "Hi", 40, 0);
        let inked: Vec<(u32, u32)> = canvas
            .enumerate_pixels()
            .filter(|(_, _, px)| px[0] < 128)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!inked.is_empty());
        // anti-aliased edges leave partial coverage, unlike solid blocks
        assert!(canvas.pixels().any(|px| px[0] > 0 && px[0] < 255));
        let max_x = inked.iter().map(|(x, _)| *x).max().unwrap_or(0);
        assert!(max_x <= 10 + short_w + 2);
        // spaces have an advance and no outline
        let mut blank = GrayImage::from_pixel(100, 60, Luma([255]));
        face.draw(&mut blank, 0, 0, "   ", 40, 0);
        assert!(blank.pixels().all(|px| px[0] == 255));
    }
}

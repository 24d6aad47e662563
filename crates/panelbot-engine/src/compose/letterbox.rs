use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

/// Aspect-preserving resize centered on a `width` x `height` canvas filled
/// with `fill`. Degenerate targets clamp to 1px.
pub fn letterbox(image: &GrayImage, width: u32, height: u32, fill: u8) -> GrayImage {
    let width = width.max(1);
    let height = height.max(1);
    let mut canvas = GrayImage::from_pixel(width, height, Luma([fill]));
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
        return canvas;
    }

    let scale = (width as f64 / src_w as f64).min(height as f64 / src_h as f64);
    let scaled_w = ((src_w as f64 * scale).floor() as u32).clamp(1, width);
    let scaled_h = ((src_h as f64 * scale).floor() as u32).clamp(1, height);
    let resized = imageops::resize(image, scaled_w, scaled_h, FilterType::Lanczos3);
    let x = (width - scaled_w) / 2;
    let y = (height - scaled_h) / 2;
    imageops::replace(&mut canvas, &resized, i64::from(x), i64::from(y));
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tall_image_is_pillarboxed() {
        let source = GrayImage::from_pixel(100, 200, Luma([0]));
        let fitted = letterbox(&source, 50, 50, 255);
        assert_eq!(fitted.dimensions(), (50, 50));

        let row = 25;
        let ink: Vec<u32> = (0..50)
            .filter(|x| fitted.get_pixel(*x, row)[0] < 128)
            .collect();
        assert_eq!(ink.first(), Some(&12));
        assert_eq!(ink.last(), Some(&36));
        assert_eq!(ink.len(), 25);
        assert_eq!(fitted.get_pixel(0, 0)[0], 255);
        assert_eq!(fitted.get_pixel(49, 49)[0], 255);
        assert!(fitted.get_pixel(24, 0)[0] < 128);
        assert!(fitted.get_pixel(24, 49)[0] < 128);
    }

    #[test]
    fn wide_image_is_letterboxed_vertically() {
        let source = GrayImage::from_pixel(300, 100, Luma([0]));
        let fitted = letterbox(&source, 150, 150, 200);
        assert_eq!(fitted.get_pixel(75, 10)[0], 200);
        assert!(fitted.get_pixel(75, 75)[0] < 128);
        assert_eq!(fitted.get_pixel(75, 140)[0], 200);
    }

    #[test]
    fn zero_target_clamps_to_one_pixel() {
        let source = GrayImage::from_pixel(10, 10, Luma([0]));
        assert_eq!(letterbox(&source, 0, 0, 255).dimensions(), (1, 1));
    }
}

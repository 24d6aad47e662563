use image::imageops;
use image::{GrayImage, Luma};

use super::letterbox::letterbox;

pub const DEFAULT_GAP: u32 = 24;
pub const DEFAULT_BORDER: u32 = 8;
const PAPER: u8 = 255;
const INK: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PanelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Scales both corners independently and floors them, so adjacent panels
    /// keep their shared gap after scaling.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        let x1 = (self.x as f64 * sx).floor() as u32;
        let y1 = (self.y as f64 * sy).floor() as u32;
        let x2 = (self.right() as f64 * sx).floor() as u32;
        let y2 = (self.bottom() as f64 * sy).floor() as u32;
        Self::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
    }

    /// A sub-rectangle placed by fractions of this panel's size.
    pub fn relative(&self, rx: f64, ry: f64, rw: f64, rh: f64) -> Self {
        let w = self.width as f64;
        let h = self.height as f64;
        Self::new(
            self.x + (w * rx) as u32,
            self.y + (h * ry) as u32,
            (w * rw) as u32,
            (h * rh) as u32,
        )
    }
}

/// One wide panel on top, two equal panels side by side below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriPanelLayout {
    pub width: u32,
    pub height: u32,
    pub top: PanelRect,
    pub bottom_left: PanelRect,
    pub bottom_right: PanelRect,
}

impl TriPanelLayout {
    pub fn new(top: (u32, u32), bottom: (u32, u32), gap: u32) -> Self {
        let (top_w, top_h) = (top.0.max(1), top.1.max(1));
        let (bot_w, bot_h) = (bottom.0.max(1), bottom.1.max(1));
        let width = top_w.max(bot_w * 2 + gap);
        let height = top_h + gap + bot_h;
        let row_y = top_h + gap;
        Self {
            width,
            height,
            top: PanelRect::new((width - top_w) / 2, 0, top_w, top_h),
            bottom_left: PanelRect::new(0, row_y, bot_w, bot_h),
            bottom_right: PanelRect::new(bot_w + gap, row_y, bot_w, bot_h),
        }
    }

    pub fn panels(&self) -> [PanelRect; 3] {
        [self.top, self.bottom_left, self.bottom_right]
    }

    /// Maps the layout onto an image of a different size, e.g. a single page
    /// generated remotely that follows the same panel arrangement.
    pub fn scaled_to(&self, width: u32, height: u32) -> Self {
        let sx = width as f64 / self.width as f64;
        let sy = height as f64 / self.height as f64;
        Self {
            width,
            height,
            top: self.top.scaled(sx, sy),
            bottom_left: self.bottom_left.scaled(sx, sy),
            bottom_right: self.bottom_right.scaled(sx, sy),
        }
    }

    /// Letterboxes each image into its panel on a white canvas and outlines
    /// the panels.
    pub fn composite(
        &self,
        top: &GrayImage,
        bottom_left: &GrayImage,
        bottom_right: &GrayImage,
        border: u32,
    ) -> GrayImage {
        let mut canvas = GrayImage::from_pixel(self.width, self.height, Luma([PAPER]));
        for (rect, image) in self
            .panels()
            .into_iter()
            .zip([top, bottom_left, bottom_right])
        {
            let fitted = letterbox(image, rect.width, rect.height, PAPER);
            imageops::replace(&mut canvas, &fitted, i64::from(rect.x), i64::from(rect.y));
        }
        self.draw_borders(&mut canvas, border);
        canvas
    }

    /// Empty white page with the three panel outlines.
    pub fn render_template(&self, border: u32) -> GrayImage {
        let mut canvas = GrayImage::from_pixel(self.width, self.height, Luma([PAPER]));
        self.draw_borders(&mut canvas, border);
        canvas
    }

    pub fn draw_borders(&self, canvas: &mut GrayImage, border: u32) {
        for rect in self.panels() {
            draw_panel_border(canvas, &rect, border, INK);
        }
    }
}

/// Outline of `thickness` px drawn inward from the rectangle's edges.
pub fn draw_panel_border(canvas: &mut GrayImage, rect: &PanelRect, thickness: u32, ink: u8) {
    if thickness == 0 {
        return;
    }
    let (cw, ch) = canvas.dimensions();
    let x_end = rect.right().min(cw);
    let y_end = rect.bottom().min(ch);
    for y in rect.y.min(y_end)..y_end {
        for x in rect.x.min(x_end)..x_end {
            let inset_x = (x - rect.x).min(rect.right() - 1 - x);
            let inset_y = (y - rect.y).min(rect.bottom() - 1 - y);
            if inset_x < thickness || inset_y < thickness {
                canvas.put_pixel(x, y, Luma([ink]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_bottom_row_sets_canvas_width() {
        let layout = TriPanelLayout::new((2048, 1024), (1024, 1024), 24);
        assert_eq!((layout.width, layout.height), (2072, 2072));
        assert_eq!(layout.top, PanelRect::new(12, 0, 2048, 1024));
        let left = layout.bottom_left;
        assert_eq!((left.x, left.y, left.right(), left.bottom()), (0, 1048, 1024, 2072));
        let right = layout.bottom_right;
        assert_eq!(
            (right.x, right.y, right.right(), right.bottom()),
            (1048, 1048, 2072, 2072)
        );
    }

    #[test]
    fn wide_top_panel_sets_canvas_width() {
        let layout = TriPanelLayout::new((2400, 600), (1000, 1000), 20);
        assert_eq!(layout.width, 2400);
        assert_eq!(layout.height, 1620);
        assert_eq!(layout.top.x, 0);
        assert_eq!(layout.bottom_right.x, 1020);
    }

    #[test]
    fn scaling_to_half_size_halves_every_panel() {
        let layout = TriPanelLayout::new((2048, 1024), (1024, 1024), 24).scaled_to(1036, 1036);
        assert_eq!(layout.top, PanelRect::new(6, 0, 1024, 512));
        assert_eq!(layout.bottom_left, PanelRect::new(0, 524, 512, 512));
        assert_eq!(layout.bottom_right, PanelRect::new(524, 524, 512, 512));
    }

    #[test]
    fn relative_box_uses_panel_fractions() {
        let panel = PanelRect::new(100, 200, 1000, 500);
        assert_eq!(
            panel.relative(0.5, 0.1, 0.25, 0.2),
            PanelRect::new(600, 250, 250, 100)
        );
    }

    #[test]
    fn template_draws_borders_inside_panels_only() {
        let layout = TriPanelLayout::new((200, 100), (100, 100), 10);
        let template = layout.render_template(4);
        assert_eq!(template.dimensions(), (210, 210));
        assert_eq!(template.get_pixel(5, 0)[0], INK);
        assert_eq!(template.get_pixel(5, 3)[0], INK);
        assert_eq!(template.get_pixel(50, 50)[0], PAPER);
        // gap between the bottom panels stays white
        assert_eq!(template.get_pixel(104, 150)[0], PAPER);
        assert_eq!(template.get_pixel(99, 150)[0], INK);
        assert_eq!(template.get_pixel(110, 150)[0], INK);
    }

    #[test]
    fn composite_places_panels_and_keeps_gap_white() {
        let layout = TriPanelLayout::new((200, 100), (100, 100), 10);
        let dark = GrayImage::from_pixel(50, 50, Luma([40]));
        let canvas = layout.composite(&dark, &dark, &dark, 2);
        let near = |value: u8| (35..=45).contains(&value);
        assert!(near(canvas.get_pixel(150, 155)[0]));
        assert_eq!(canvas.get_pixel(105, 155)[0], PAPER);
        assert!(near(canvas.get_pixel(50, 155)[0]));
        assert!(near(canvas.get_pixel(100, 50)[0]));
        assert_eq!(canvas.get_pixel(20, 50)[0], PAPER);
    }
}

use image::{GrayImage, Luma};

use super::layout::PanelRect;
use super::typeface::Typeface;

const PAPER: u8 = 255;
const INK: u8 = 0;

/// Ellipse bounds plus an optional triangular tail in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BubbleBox {
    pub rect: PanelRect,
    pub tail: Option<[(i64, i64); 3]>,
}

impl BubbleBox {
    pub fn new(rect: PanelRect) -> Self {
        Self { rect, tail: None }
    }

    pub fn with_tail(mut self, tail: [(i64, i64); 3]) -> Self {
        self.tail = Some(tail);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BubbleStyle {
    pub max_size: u32,
    pub min_size: u32,
    pub padding: u32,
    pub border: u32,
    /// Break text character by character to the content width.
    pub wrap: bool,
    pub line_spacing: f64,
}

impl Default for BubbleStyle {
    fn default() -> Self {
        Self {
            max_size: 52,
            min_size: 22,
            padding: 22,
            border: 5,
            wrap: true,
            line_spacing: 1.18,
        }
    }
}

impl BubbleStyle {
    pub fn single_line(max_size: u32, min_size: u32, padding: u32, border: u32) -> Self {
        Self {
            max_size,
            min_size,
            padding,
            border,
            wrap: false,
            line_spacing: 1.0,
        }
    }

    pub fn wrapped(max_size: u32, min_size: u32) -> Self {
        Self {
            max_size,
            min_size,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionFit {
    pub size: u32,
    pub lines: Vec<String>,
    pub fits: bool,
}

/// Largest size in `max_size..=min_size` (step 2) whose text block fits the
/// padded bubble. Falls back to `min_size` when nothing fits.
pub fn fit_caption(text: &str, rect: &PanelRect, style: &BubbleStyle, face: &dyn Typeface) -> CaptionFit {
    let max_size = style.max_size.max(style.min_size).max(1);
    let min_size = style.min_size.max(1);
    let content_w = rect.width.saturating_sub(2 * style.padding);
    let content_h = rect.height.saturating_sub(2 * style.padding);

    let mut size = max_size;
    loop {
        let lines = layout_lines(text, size, content_w, style.wrap, face);
        let (block_w, block_h) = block_extent(&lines, size, style, face);
        if block_w <= content_w && block_h <= content_h {
            return CaptionFit {
                size,
                lines,
                fits: true,
            };
        }
        if size < min_size + 2 {
            break;
        }
        size -= 2;
    }
    // an odd span steps over min_size
    let lines = layout_lines(text, min_size, content_w, style.wrap, face);
    let (block_w, block_h) = block_extent(&lines, min_size, style, face);
    CaptionFit {
        size: min_size,
        lines,
        fits: block_w <= content_w && block_h <= content_h,
    }
}

/// Draws the bubble and its centered caption. Never fails; an oversized
/// caption is drawn at the minimum size and may spill past the ellipse.
pub fn draw_bubble(
    canvas: &mut GrayImage,
    bubble: &BubbleBox,
    text: &str,
    style: &BubbleStyle,
    face: &dyn Typeface,
) -> CaptionFit {
    let rect = bubble.rect;
    fill_ellipse(canvas, &rect, style.border);
    if let Some(tail) = bubble.tail {
        fill_triangle(canvas, tail, PAPER);
        outline_triangle(canvas, tail, INK);
    }

    let fit = fit_caption(text, &rect, style, face);
    let advance = line_advance(fit.size, style, face);
    let block_h = (fit.lines.len() as f64 * advance) as i64;
    let top = i64::from(rect.y) + (i64::from(rect.height) - block_h) / 2;
    for (idx, line) in fit.lines.iter().enumerate() {
        let (line_w, _) = face.measure(line, fit.size);
        let x = i64::from(rect.x) + (i64::from(rect.width) - i64::from(line_w)) / 2;
        let y = top + (idx as f64 * advance) as i64;
        face.draw(canvas, x, y, line, fit.size, INK);
    }
    fit
}

fn layout_lines(
    text: &str,
    size: u32,
    content_w: u32,
    wrap: bool,
    face: &dyn Typeface,
) -> Vec<String> {
    if !wrap {
        return text.lines().map(str::to_string).collect();
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        let mut candidate = current.clone();
        candidate.push(ch);
        if face.measure(&candidate, size).0 <= content_w {
            current = candidate;
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn line_advance(size: u32, style: &BubbleStyle, face: &dyn Typeface) -> f64 {
    let spacing = if style.wrap { style.line_spacing } else { 1.0 };
    f64::from(face.line_height(size)) * spacing
}

fn block_extent(lines: &[String], size: u32, style: &BubbleStyle, face: &dyn Typeface) -> (u32, u32) {
    let width = lines
        .iter()
        .map(|line| face.measure(line, size).0)
        .max()
        .unwrap_or(0);
    let height = (lines.len() as f64 * line_advance(size, style, face)) as u32;
    (width, height)
}

/// White ellipse with a black outline `border` px thick, drawn inward.
fn fill_ellipse(canvas: &mut GrayImage, rect: &PanelRect, border: u32) {
    let (cw, ch) = canvas.dimensions();
    let rx = f64::from(rect.width.max(1)) / 2.0;
    let ry = f64::from(rect.height.max(1)) / 2.0;
    let cx = f64::from(rect.x) + rx;
    let cy = f64::from(rect.y) + ry;
    let inner_rx = (rx - f64::from(border)).max(0.0);
    let inner_ry = (ry - f64::from(border)).max(0.0);

    for y in rect.y..rect.bottom().min(ch) {
        for x in rect.x..rect.right().min(cw) {
            let dx = f64::from(x) + 0.5 - cx;
            let dy = f64::from(y) + 0.5 - cy;
            if (dx / rx).powi(2) + (dy / ry).powi(2) > 1.0 {
                continue;
            }
            let inside_inner = inner_rx > 0.0
                && inner_ry > 0.0
                && (dx / inner_rx).powi(2) + (dy / inner_ry).powi(2) <= 1.0;
            let value = if inside_inner { PAPER } else { INK };
            canvas.put_pixel(x, y, Luma([value]));
        }
    }
}

fn fill_triangle(canvas: &mut GrayImage, points: [(i64, i64); 3], value: u8) {
    let (cw, ch) = canvas.dimensions();
    let min_x = points.iter().map(|p| p.0).min().unwrap_or(0).max(0);
    let max_x = points.iter().map(|p| p.0).max().unwrap_or(0).min(i64::from(cw) - 1);
    let min_y = points.iter().map(|p| p.1).min().unwrap_or(0).max(0);
    let max_y = points.iter().map(|p| p.1).max().unwrap_or(0).min(i64::from(ch) - 1);
    let [a, b, c] = points;
    let edge = |p: (i64, i64), q: (i64, i64), x: i64, y: i64| (q.0 - p.0) * (y - p.1) - (q.1 - p.1) * (x - p.0);

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let e0 = edge(a, b, x, y);
            let e1 = edge(b, c, x, y);
            let e2 = edge(c, a, x, y);
            let all_pos = e0 >= 0 && e1 >= 0 && e2 >= 0;
            let all_neg = e0 <= 0 && e1 <= 0 && e2 <= 0;
            if all_pos || all_neg {
                canvas.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
    }
}

fn outline_triangle(canvas: &mut GrayImage, points: [(i64, i64); 3], value: u8) {
    for idx in 0..3 {
        draw_line(canvas, points[idx], points[(idx + 1) % 3], value);
    }
}

fn draw_line(canvas: &mut GrayImage, from: (i64, i64), to: (i64, i64), value: u8) {
    let (cw, ch) = canvas.dimensions();
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        if x >= 0 && y >= 0 && x < i64::from(cw) && y < i64::from(ch) {
            canvas.put_pixel(x as u32, y as u32, Luma([value]));
        }
        if x == to.0 && y == to.1 {
            break;
        }
        let doubled = 2 * err;
        if doubled >= dy {
            err += dy;
            x += sx;
        }
        if doubled <= dx {
            err += dx;
            y += sy;
        }
    }
}

use anyhow::{Context, Result};
use image::DynamicImage;
use panelbot_contracts::dialogue::PhotoInput;
use panelbot_engine::compose::{
    compress_jpeg, decode_grayscale, draw_bubble, BubbleBox, BubbleStyle, JpegBudget, PanelRect,
    TriPanelLayout,
};
use panelbot_engine::providers::format_dims;
use panelbot_engine::{ObjectStore, Sleeper, Transport};

use super::ComicStudio;

const PROMPT_TOP: &str = "Close-up, head-and-shoulders portrait, misty eyes with subtle tears, \
    mouth gently closed, facing camera; black-and-white manga ink style, \
    clean linework, high contrast, screentone; no text, no speech bubbles.";
const PROMPT_LEFT: &str = "Close-up, crying expression, mouth slightly open as if asking a question, \
    gazing right; black-and-white manga ink style, screentone, clean lines; \
    no text, no speech bubbles.";
const PROMPT_RIGHT: &str = "Close-up, solemn and resolute expression, eyes gently closed; \
    a ceremonial decorative collar resting on shoulders (fashion accessory); \
    facing left; black-and-white manga ink style, strong contrast, clean linework; \
    no text, no speech bubbles.";

const LINE_TOP: &str = "……";
const LINE_LEFT: &str = "你…你可有何话说？";
const LINE_RIGHT: &str = "再无话说，请速速动手！";

fn frac(length: u32, ratio: f64) -> u32 {
    (f64::from(length) * ratio) as u32
}

fn corner(rect: &PanelRect) -> (i64, i64, i64, i64) {
    (
        i64::from(rect.x),
        i64::from(rect.y),
        i64::from(rect.width),
        i64::from(rect.height),
    )
}

/// Speech bubbles with tails for the locally composited page.
fn legacy_bubbles(layout: &TriPanelLayout) -> [(BubbleBox, &'static str, BubbleStyle); 3] {
    let (top, left, right) = (layout.top, layout.bottom_left, layout.bottom_right);

    let b1 = PanelRect::new(
        top.x + frac(top.width, 0.60),
        top.y + frac(top.height, 0.10),
        frac(top.width, 0.33),
        frac(top.height, 0.22),
    );
    let (x, y, w, h) = corner(&b1);
    let (cx, by) = (x + w / 2, y + h);
    let tail1 = [(cx, by - 4), (cx - 18, by + 34), (cx + 6, by + 12)];

    let b2 = PanelRect::new(
        left.x + frac(left.width, 0.06),
        left.y + frac(left.height, 0.06),
        frac(left.width, 0.45),
        frac(left.height, 0.28),
    );
    let (x, y, w, h) = corner(&b2);
    let tail2 = [
        (x + w - 10, y + h - 6),
        (x + w + 24, y + h + 26),
        (x + w - 6, y + h + 10),
    ];

    let b3 = PanelRect::new(
        right.x + frac(right.width, 0.10),
        right.y + frac(right.height, 0.08),
        frac(right.width, 0.60),
        frac(right.height, 0.32),
    );
    let (x, y, _, h) = corner(&b3);
    let tail3 = [(x + 16, y + h - 6), (x - 16, y + h + 24), (x + 6, y + h + 12)];

    [
        (
            BubbleBox::new(b1).with_tail(tail1),
            LINE_TOP,
            BubbleStyle::wrapped(56, 26),
        ),
        (
            BubbleBox::new(b2).with_tail(tail2),
            LINE_LEFT,
            BubbleStyle::wrapped(50, 24),
        ),
        (
            BubbleBox::new(b3).with_tail(tail3),
            LINE_RIGHT,
            BubbleStyle::wrapped(50, 24),
        ),
    ]
}

impl<T: Transport, S: Sleeper, O: ObjectStore> ComicStudio<T, S, O> {
    /// Three text-only generations, letterboxed into the tri-panel page with
    /// captions, compressed for chat delivery.
    pub(super) fn render_legacy(&mut self, first: &PhotoInput, second: &PhotoInput) -> Result<Vec<u8>> {
        let [top_w, top_h] = self.settings.top;
        let [bot_w, bot_h] = self.settings.bottom;
        let size_top = format_dims(top_w, top_h);
        let size_bottom = format_dims(bot_w, bot_h);
        let ref_a = self.use_reference.then_some(first.bytes.as_slice());
        let ref_b = self.use_reference.then_some(second.bytes.as_slice());

        let panels = [
            ("p1", PROMPT_TOP, size_top.as_str(), ref_a),
            ("p2", PROMPT_LEFT, size_bottom.as_str(), ref_a),
            ("p3", PROMPT_RIGHT, size_bottom.as_str(), ref_b),
        ];
        let mut generated = Vec::with_capacity(panels.len());
        for (name, prompt, size, reference) in panels {
            let bytes = self
                .generate_openai(prompt, size, reference)
                .with_context(|| format!("panel {name} generation failed"))?;
            tracing::info!(panel = name, bytes = bytes.len(), "panel generated");
            self.save_debug(name, &bytes);
            generated.push(
                decode_grayscale(&bytes).with_context(|| format!("panel {name} is not an image"))?,
            );
        }

        let layout = TriPanelLayout::new((top_w, top_h), (bot_w, bot_h), self.settings.gap);
        let mut canvas = layout.composite(
            &generated[0],
            &generated[1],
            &generated[2],
            self.settings.border,
        );
        for (bubble, line, style) in legacy_bubbles(&layout) {
            draw_bubble(&mut canvas, &bubble, line, &style, self.face.as_ref());
        }

        let jpeg = compress_jpeg(&DynamicImage::ImageLuma8(canvas), &JpegBudget::default())?;
        Ok(jpeg)
    }
}

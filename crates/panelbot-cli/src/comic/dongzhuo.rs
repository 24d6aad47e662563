use anyhow::{bail, Context, Result};
use image::{DynamicImage, GrayImage};
use panelbot_contracts::dialogue::PhotoInput;
use panelbot_engine::compose::{
    decode_grayscale, draw_bubble, encode_jpeg, BubbleBox, BubbleStyle, TriPanelLayout,
};
use panelbot_engine::providers::ArkImageRequest;
use panelbot_engine::{ObjectStore, Sleeper, Transport};

use super::ComicStudio;

const PROMPT: &str = include_str!("../../resources/dongzhuo_prompt.txt");
const NEGATIVE_PROMPT: &str = "four panels, 4 panels, comic strip, manga page with four frames, \
    extra panel, 2x2 grid, multi-frame layout, extra frame, additional panel, split panel";

/// Bubbles placed by fractions of each panel once the reference layout is
/// scaled onto the generated page.
fn one_shot_bubbles(layout: &TriPanelLayout) -> [(BubbleBox, &'static str, BubbleStyle); 3] {
    [
        (
            BubbleBox::new(layout.top.relative(0.70, 0.06, 0.24, 0.24)),
            "……",
            BubbleStyle::single_line(48, 22, 20, 3),
        ),
        (
            BubbleBox::new(layout.bottom_left.relative(0.06, 0.06, 0.38, 0.30)),
            "你…你可有何话说？",
            BubbleStyle::single_line(44, 20, 20, 3),
        ),
        (
            BubbleBox::new(layout.bottom_right.relative(0.52, 0.06, 0.44, 0.30)),
            "再无话说，请速速动手！",
            BubbleStyle::single_line(44, 20, 20, 3),
        ),
    ]
}

impl<T: Transport, S: Sleeper, O: ObjectStore> ComicStudio<T, S, O> {
    /// One remote generation from both uploaded references, then grayscale
    /// and captions applied locally.
    pub(super) fn render_one_shot(&mut self, first: &PhotoInput, second: &PhotoInput) -> Result<Vec<u8>> {
        let image_urls: Vec<String> = [first, second]
            .into_iter()
            .filter_map(|photo| photo.public_url.clone())
            .collect();
        if image_urls.len() < 2 {
            bail!("参考图上传对象存储失败，缺少 image_urls");
        }

        let mut request = ArkImageRequest::new(PROMPT, self.ark_size.clone());
        request.image_urls = image_urls;
        request.options.style = Some("manga".to_string());
        request.options.negative_prompt = Some(NEGATIVE_PROMPT.to_string());

        let ark = &self.ark;
        let image = self
            .controller
            .execute(|_| ark.build_request(&request), &self.policy, None)
            .context("ark generation failed")?;
        tracing::info!(bytes = image.len(), "one-shot page generated");
        self.save_debug("one_shot", &image.bytes);

        let mut page = decode_grayscale(&image.bytes).context("generated page is not an image")?;
        self.caption_page(&mut page);
        let jpeg = encode_jpeg(
            &DynamicImage::ImageLuma8(page),
            self.settings.one_shot_jpeg_quality,
        )?;
        Ok(jpeg)
    }

    fn caption_page(&self, page: &mut GrayImage) {
        let [top_w, top_h] = self.settings.one_shot_top;
        let [bot_w, bot_h] = self.settings.one_shot_bottom;
        let layout = TriPanelLayout::new((top_w, top_h), (bot_w, bot_h), self.settings.gap)
            .scaled_to(page.width(), page.height());
        for (bubble, line, style) in one_shot_bubbles(&layout) {
            draw_bubble(page, &bubble, line, &style, self.face.as_ref());
        }
    }
}

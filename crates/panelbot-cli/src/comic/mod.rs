//! The two comic renders behind `/dokaku` and `/dongzhuo`.

mod dokaku;
mod dongzhuo;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use panelbot_contracts::dialogue::{DialogueKind, PhotoInput};
use panelbot_engine::compose::{BlockFace, OutlineFace, Typeface};
use panelbot_engine::providers::{ArkImages, OpenAiImages};
use panelbot_engine::{ObjectStore, RetryController, RetryPolicy, Sleeper, Transport};

use crate::config::{BotConfig, ComicSettings, Credentials};

pub const FINAL_CAPTION: &str = "真是一对苦命鸳鸯啊.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedComic {
    pub jpeg: Vec<u8>,
    pub file_name: &'static str,
}

/// What the dispatcher needs from the rendering side.
pub trait Renderer {
    /// Publishes a reference photo and returns its URL, or `None` when the
    /// upload failed.
    fn upload_reference(&mut self, photo: &PhotoInput) -> Option<String>;

    fn render(
        &mut self,
        kind: DialogueKind,
        first: &PhotoInput,
        second: &PhotoInput,
    ) -> Result<RenderedComic>;
}

pub struct ComicStudio<T: Transport, S: Sleeper, O: ObjectStore> {
    controller: RetryController<T, S>,
    store: O,
    openai: OpenAiImages,
    ark: ArkImages,
    ark_size: String,
    use_reference: bool,
    policy: RetryPolicy,
    settings: ComicSettings,
    face: Box<dyn Typeface>,
}

impl<T: Transport, S: Sleeper, O: ObjectStore> ComicStudio<T, S, O> {
    pub fn new(
        controller: RetryController<T, S>,
        store: O,
        config: &BotConfig,
        credentials: &Credentials,
    ) -> Result<Self> {
        let openai = OpenAiImages::new(
            credentials.openai_api_base.as_deref(),
            credentials.openai_api_key.clone(),
            &config.openai.model,
            config.openai.quality.clone(),
            std::time::Duration::from_secs(config.openai.timeout_secs),
        );
        if openai.model().to_ascii_lowercase().starts_with("gpt-image-") {
            tracing::warn!(model = openai.model(), "gpt-image models may be unavailable; dall-e-2 is the tested default");
        }
        let ark = ArkImages::new(
            config
                .ark
                .endpoint
                .as_deref()
                .or(credentials.ark_endpoint.as_deref()),
            credentials.ark_api_key.clone(),
            config.ark.model.clone().or_else(|| credentials.ark_model.clone()),
            std::time::Duration::from_secs(config.ark.timeout_secs),
        )
        .with_url_mode(true);
        let policy = config.retry.policy().context("invalid retry settings")?;
        let face = caption_face(&config.comic.font_paths);
        Ok(Self {
            controller,
            store,
            openai,
            ark,
            ark_size: config.ark.size.clone(),
            use_reference: config.openai.use_reference,
            policy,
            settings: config.comic.clone(),
            face,
        })
    }

    fn generate_openai(&mut self, prompt: &str, size: &str, reference: Option<&[u8]>) -> Result<Vec<u8>> {
        let edit = reference
            .map(|bytes| self.openai.prepare_reference(bytes))
            .transpose()
            .context("failed to prepare edit reference")?;
        let openai = &self.openai;
        let image = self.controller.execute(
            |_| openai.build_request(prompt, size, edit.as_ref()),
            &self.policy,
            reference,
        )?;
        Ok(image.bytes)
    }

    fn save_debug(&self, name: &str, bytes: &[u8]) {
        let Some(dir) = self.settings.debug_dir.as_deref() else {
            return;
        };
        if let Err(err) = write_debug_image(dir, name, bytes) {
            tracing::warn!(name, error = %err, "failed to save debug image");
        }
    }
}

impl<T: Transport, S: Sleeper, O: ObjectStore> Renderer for ComicStudio<T, S, O> {
    fn upload_reference(&mut self, photo: &PhotoInput) -> Option<String> {
        match self.store.put_object(&photo.bytes, &photo.suffix()) {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(error = %err, "reference upload failed");
                None
            }
        }
    }

    fn render(
        &mut self,
        kind: DialogueKind,
        first: &PhotoInput,
        second: &PhotoInput,
    ) -> Result<RenderedComic> {
        match kind {
            DialogueKind::Legacy => Ok(RenderedComic {
                jpeg: self.render_legacy(first, second)?,
                file_name: "dokaku.jpg",
            }),
            DialogueKind::OneShot => Ok(RenderedComic {
                jpeg: self.render_one_shot(first, second)?,
                file_name: "dongzhuo_final.jpg",
            }),
        }
    }
}

/// Block glyphs keep captions placeable when no font file is installed.
fn caption_face(candidates: &[PathBuf]) -> Box<dyn Typeface> {
    match OutlineFace::first_available(candidates) {
        Some((path, face)) => {
            tracing::info!(path = %path.display(), "caption font loaded");
            Box::new(face)
        }
        None => {
            tracing::warn!(tried = candidates.len(), "no caption font found; drawing block glyphs");
            Box::new(BlockFace)
        }
    }
}

fn write_debug_image(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let ext = image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin");
    let path = dir.join(format!("{name}.{ext}"));
    std::fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "debug image saved");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn upload_failure_yields_no_url() -> Result<()> {
        let config = test_config();
        let credentials = test_credentials();
        let mut ok = studio(vec![], FakeStore::default(), &config, &credentials)?;
        assert_eq!(
            ok.upload_reference(&photo("a", None)).as_deref(),
            Some("https://bucket.example/ref1.jpg")
        );

        let broken = FakeStore {
            broken: true,
            ..FakeStore::default()
        };
        let mut failing = studio(vec![], broken, &config, &credentials)?;
        assert_eq!(failing.upload_reference(&photo("a", None)), None);
        Ok(())
    }

    #[test]
    fn caption_face_prefers_the_first_readable_font() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let bogus = temp.path().join("broken.ttf");
        std::fs::write(&bogus, b"not a font")?;
        let candidates = vec![temp.path().join("missing.ttf"), bogus];
        let face = caption_face(&candidates);
        // block glyphs advance a full em for wide characters
        assert_eq!(face.measure("字字", 30), (60, 30));
        Ok(())
    }

    #[test]
    fn debug_images_are_written_with_a_sniffed_extension() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut config = test_config();
        config.comic.debug_dir = Some(temp.path().join("debug"));
        let credentials = test_credentials();
        let studio = studio(vec![], FakeStore::default(), &config, &credentials)?;
        studio.save_debug("p1", &png_bytes(4, 4, 0));
        studio.save_debug("raw", b"not an image");
        assert!(temp.path().join("debug").join("p1.png").is_file());
        assert!(temp.path().join("debug").join("raw.bin").is_file());
        Ok(())
    }
}

use std::time::Duration;

use image::ImageFormat;
use serde_json::{json, Map, Value};

use super::size::{is_dall_e_2, is_gpt_image_model, normalize_openai_size};
use crate::compose::{png_under_cap, PNG_EDIT_CAP_BYTES};
use crate::error::{EngineError, EngineResult};
use crate::http::{FormPart, RequestSpec};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "dall-e-2";
const EDIT_FIRST_MAX_EDGE: u32 = 1024;

/// Reference image already converted to what the edits endpoint accepts for
/// the configured model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditReference {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

/// Request builder for the OpenAI Images API (`images/generations` and
/// `images/edits`).
#[derive(Debug, Clone)]
pub struct OpenAiImages {
    api_base: String,
    api_key: Option<String>,
    model: String,
    quality: Option<String>,
    timeout: Duration,
}

impl OpenAiImages {
    pub fn new(
        api_base: Option<&str>,
        api_key: Option<String>,
        model: &str,
        quality: Option<String>,
        timeout: Duration,
    ) -> Self {
        let api_base = api_base
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string());
        let model = Some(model.trim())
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_OPENAI_MODEL)
            .to_string();
        Self {
            api_base,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            model,
            quality: quality.filter(|value| !value.trim().is_empty()),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// DALL·E-2 edits need a PNG under 4 MiB; other models take the bytes
    /// as provided, labelled with their sniffed format.
    pub fn prepare_reference(&self, bytes: &[u8]) -> EngineResult<EditReference> {
        if is_dall_e_2(&self.model) {
            return Ok(EditReference {
                bytes: png_under_cap(bytes, EDIT_FIRST_MAX_EDGE, PNG_EDIT_CAP_BYTES)?,
                mime_type: "image/png".to_string(),
                file_name: "image.png".to_string(),
            });
        }
        let format = image::guess_format(bytes).unwrap_or(ImageFormat::Png);
        let ext = format.extensions_str().first().copied().unwrap_or("png");
        Ok(EditReference {
            bytes: bytes.to_vec(),
            mime_type: format.to_mime_type().to_string(),
            file_name: format!("image.{ext}"),
        })
    }

    pub fn build_request(
        &self,
        prompt: &str,
        size: &str,
        reference: Option<&EditReference>,
    ) -> EngineResult<RequestSpec> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EngineError::config("OPENAI_API_KEY is not set"))?;
        let size = normalize_openai_size(&self.model, size);
        let spec = match reference {
            Some(reference) => self.edit_request(prompt, &size, reference),
            None => self.generation_request(prompt, &size),
        };
        Ok(spec.bearer(api_key))
    }

    fn generation_request(&self, prompt: &str, size: &str) -> RequestSpec {
        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(self.model));
        payload.insert("prompt".to_string(), json!(prompt));
        payload.insert("size".to_string(), json!(size));
        payload.insert("n".to_string(), json!(1));
        if is_gpt_image_model(&self.model) {
            if let Some(quality) = &self.quality {
                payload.insert("quality".to_string(), json!(quality));
            }
        } else {
            payload.insert("response_format".to_string(), json!("b64_json"));
        }
        RequestSpec::post_json(
            format!("{}/images/generations", self.api_base),
            Value::Object(payload),
            self.timeout,
        )
    }

    fn edit_request(&self, prompt: &str, size: &str, reference: &EditReference) -> RequestSpec {
        let mut parts = vec![
            FormPart::text("model", self.model.clone()),
            FormPart::text("prompt", prompt),
            FormPart::text("size", size),
            FormPart::text("n", "1"),
        ];
        if is_dall_e_2(&self.model) {
            parts.push(FormPart::text("response_format", "b64_json"));
        } else if let Some(quality) = &self.quality {
            parts.push(FormPart::text("quality", quality.clone()));
        }
        parts.push(FormPart::file(
            "image",
            reference.bytes.clone(),
            reference.file_name.clone(),
            reference.mime_type.clone(),
        ));
        RequestSpec::post_multipart(
            format!("{}/images/edits", self.api_base),
            parts,
            self.timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(model: &str) -> OpenAiImages {
        OpenAiImages::new(
            Some("https://proxy.test/v1/"),
            Some("sk-test".to_string()),
            model,
            Some("high".to_string()),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn dall_e_generation_asks_for_base64() -> anyhow::Result<()> {
        let spec = provider("dall-e-2").build_request("ink portrait", "1536x1024", None)?;
        assert_eq!(spec.url, "https://proxy.test/v1/images/generations");
        assert_eq!(
            spec.headers.get("Authorization").map(String::as_str),
            Some("Bearer sk-test")
        );
        assert_eq!(
            spec.json_body(),
            Some(&json!({
                "model": "dall-e-2",
                "prompt": "ink portrait",
                "size": "1024x1024",
                "n": 1,
                "response_format": "b64_json",
            }))
        );
        Ok(())
    }

    #[test]
    fn gpt_image_generation_sends_quality_instead() -> anyhow::Result<()> {
        let spec = provider("gpt-image-1").build_request("p", "1536x1024", None)?;
        let body = spec.json_body().cloned().unwrap_or_default();
        assert_eq!(body["quality"], "high");
        assert_eq!(body["size"], "1536x1024");
        assert!(body.get("response_format").is_none());
        Ok(())
    }

    #[test]
    fn edits_use_multipart_with_the_reference() -> anyhow::Result<()> {
        let openai = provider("gpt-image-1");
        let reference = openai.prepare_reference(b"raw-bytes")?;
        let spec = openai.build_request("p", "1024x1024", Some(&reference))?;
        assert_eq!(spec.url, "https://proxy.test/v1/images/edits");
        assert_eq!(spec.form_text("model"), Some("gpt-image-1"));
        assert_eq!(spec.form_text("quality"), Some("high"));
        assert_eq!(spec.form_text("response_format"), None);
        assert_eq!(reference.mime_type, "image/png");
        Ok(())
    }

    #[test]
    fn jpeg_reference_keeps_its_own_content_type() -> anyhow::Result<()> {
        let mut jpeg = Vec::new();
        let image = image::DynamicImage::ImageLuma8(image::GrayImage::new(8, 8));
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 80).encode_image(&image)?;
        let reference = provider("gpt-image-1").prepare_reference(&jpeg)?;
        assert_eq!(reference.mime_type, "image/jpeg");
        assert_eq!(reference.file_name, "image.jpg");
        assert_eq!(reference.bytes, jpeg);
        Ok(())
    }

    #[test]
    fn dall_e_2_reference_is_converted_to_png() -> anyhow::Result<()> {
        let mut jpeg = Vec::new();
        let image = image::DynamicImage::ImageLuma8(image::GrayImage::new(32, 16));
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 80).encode_image(&image)?;
        let reference = provider("dall-e-2").prepare_reference(&jpeg)?;
        assert_eq!(reference.mime_type, "image/png");
        assert_eq!(image::guess_format(&reference.bytes)?, image::ImageFormat::Png);
        Ok(())
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let openai = OpenAiImages::new(None, None, "", None, Duration::from_secs(1));
        assert_eq!(openai.model(), "dall-e-2");
        let err = openai.build_request("p", "1024x1024", None).err();
        assert!(matches!(err, Some(EngineError::Config(_))));
    }
}

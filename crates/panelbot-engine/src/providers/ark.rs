use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Map, Value};

use super::size::ark_size_token;
use crate::error::{EngineError, EngineResult};
use crate::http::RequestSpec;

pub const DEFAULT_ARK_ENDPOINT: &str =
    "https://ark.cn-beijing.volces.com/api/v3/images/generations";

/// Optional generation knobs. Unset fields are left out of the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ArkOptions {
    pub sequential_image_generation: String,
    pub response_format: String,
    pub watermark: bool,
    pub seed: Option<i64>,
    pub strength: Option<f64>,
    pub guidance_scale: Option<f64>,
    pub style: Option<String>,
    pub negative_prompt: Option<String>,
}

impl Default for ArkOptions {
    fn default() -> Self {
        Self {
            sequential_image_generation: "disabled".to_string(),
            response_format: "url".to_string(),
            watermark: false,
            seed: None,
            strength: None,
            guidance_scale: None,
            style: None,
            negative_prompt: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArkImageRequest {
    pub prompt: String,
    pub size: String,
    /// Public URLs of the reference images (URL-list mode).
    pub image_urls: Vec<String>,
    /// Raw reference images, sent as data URLs in the legacy payload.
    pub inline_references: Vec<Vec<u8>>,
    pub options: ArkOptions,
}

impl ArkImageRequest {
    pub fn new(prompt: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: size.into(),
            image_urls: Vec::new(),
            inline_references: Vec::new(),
            options: ArkOptions::default(),
        }
    }
}

/// Request builder for the Doubao / Ark image endpoint.
#[derive(Debug, Clone)]
pub struct ArkImages {
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
    timeout: Duration,
    force_url_mode: bool,
}

impl ArkImages {
    pub fn new(
        endpoint: Option<&str>,
        api_key: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Self {
        let endpoint = endpoint
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_ARK_ENDPOINT)
            .to_string();
        Self {
            endpoint,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            model: model
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            timeout,
            force_url_mode: false,
        }
    }

    pub fn with_url_mode(mut self, forced: bool) -> Self {
        self.force_url_mode = forced;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// URL-list payloads are used when forced or when the endpoint is the
    /// versioned Ark REST API.
    pub fn uses_url_mode(&self) -> bool {
        self.force_url_mode || self.endpoint.contains("/api/v3")
    }

    pub fn build_request(&self, request: &ArkImageRequest) -> EngineResult<RequestSpec> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EngineError::config("ARK_API_KEY / DOUBAO_API_KEY is not set"))?;
        let model = self
            .model
            .as_deref()
            .ok_or_else(|| EngineError::config("DOUBAO_IMAGE_MODEL is not set"))?;
        let payload = if self.uses_url_mode() {
            url_mode_payload(model, request)?
        } else {
            legacy_payload(model, request)
        };
        Ok(RequestSpec::post_json(&self.endpoint, Value::Object(payload), self.timeout).bearer(api_key))
    }
}

fn url_mode_payload(model: &str, request: &ArkImageRequest) -> EngineResult<Map<String, Value>> {
    let urls: Vec<&str> = request
        .image_urls
        .iter()
        .map(|url| url.trim())
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .collect();
    if urls.is_empty() {
        return Err(EngineError::config(
            "URL-list image request needs at least one http(s) reference URL",
        ));
    }
    let options = &request.options;
    let mut payload = Map::new();
    payload.insert("model".to_string(), json!(model));
    payload.insert("prompt".to_string(), json!(request.prompt));
    payload.insert("image".to_string(), json!(urls));
    payload.insert("size".to_string(), json!(ark_size_token(&request.size)));
    payload.insert(
        "sequential_image_generation".to_string(),
        json!(options.sequential_image_generation),
    );
    payload.insert("response_format".to_string(), json!(options.response_format));
    payload.insert("watermark".to_string(), json!(options.watermark));
    insert_optional(&mut payload, options);
    Ok(payload)
}

fn legacy_payload(model: &str, request: &ArkImageRequest) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("model".to_string(), json!(model));
    payload.insert("prompt".to_string(), json!(request.prompt));
    payload.insert("size".to_string(), json!(request.size));
    payload.insert("n".to_string(), json!(1));

    let references: Vec<String> = request
        .inline_references
        .iter()
        .map(|bytes| format!("data:image/png;base64,{}", BASE64.encode(bytes)))
        .chain(request.image_urls.iter().cloned())
        .collect();
    if !references.is_empty() {
        let weighted: Vec<Value> = references
            .iter()
            .map(|image| json!({"image": image, "role": "reference", "weight": 1.0}))
            .collect();
        payload.insert("image_prompts".to_string(), Value::Array(weighted.clone()));
        payload.insert("reference_images".to_string(), Value::Array(weighted));
        payload.insert(
            "images".to_string(),
            Value::Array(
                references
                    .iter()
                    .map(|image| json!({"type": "input", "image": image, "role": "reference"}))
                    .collect(),
            ),
        );
    }
    insert_optional(&mut payload, &request.options);
    payload
}

fn insert_optional(payload: &mut Map<String, Value>, options: &ArkOptions) {
    if let Some(seed) = options.seed {
        payload.insert("seed".to_string(), json!(seed));
    }
    if let Some(strength) = options.strength {
        payload.insert("strength".to_string(), json!(strength));
    }
    if let Some(guidance_scale) = options.guidance_scale {
        payload.insert("guidance_scale".to_string(), json!(guidance_scale));
    }
    if let Some(style) = &options.style {
        payload.insert("style".to_string(), json!(style));
    }
    if let Some(negative_prompt) = &options.negative_prompt {
        payload.insert("negative_prompt".to_string(), json!(negative_prompt));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ark(endpoint: Option<&str>) -> ArkImages {
        ArkImages::new(
            endpoint,
            Some("ark-key".to_string()),
            Some("doubao-seedream".to_string()),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn versioned_endpoint_sends_url_list_payload() -> anyhow::Result<()> {
        let mut request = ArkImageRequest::new("three panels", "2048x1024");
        request.image_urls = vec![
            "https://bucket.tos.test/a.jpg".to_string(),
            "not-a-url".to_string(),
            "https://bucket.tos.test/b.jpg".to_string(),
        ];
        request.options.style = Some("manga".to_string());
        request.options.negative_prompt = Some("four panels".to_string());
        let spec = ark(None).build_request(&request)?;
        assert_eq!(spec.url, DEFAULT_ARK_ENDPOINT);
        assert_eq!(
            spec.json_body(),
            Some(&json!({
                "model": "doubao-seedream",
                "prompt": "three panels",
                "image": ["https://bucket.tos.test/a.jpg", "https://bucket.tos.test/b.jpg"],
                "size": "2K",
                "sequential_image_generation": "disabled",
                "response_format": "url",
                "watermark": false,
                "style": "manga",
                "negative_prompt": "four panels",
            }))
        );
        Ok(())
    }

    #[test]
    fn url_mode_without_urls_is_a_config_error() {
        let request = ArkImageRequest::new("p", "2K");
        let err = ark(None).build_request(&request).err();
        assert!(matches!(err, Some(EngineError::Config(_))));
    }

    #[test]
    fn legacy_endpoint_duplicates_data_url_references() -> anyhow::Result<()> {
        let provider = ark(Some("https://images.example.test/generate"));
        assert!(!provider.uses_url_mode());
        let mut request = ArkImageRequest::new("p", "1024x1024");
        request.inline_references = vec![vec![1, 2, 3]];
        let spec = provider.build_request(&request)?;
        let body = spec.json_body().cloned().unwrap_or_default();
        assert_eq!(body["size"], "1024x1024");
        assert_eq!(body["n"], 1);
        let data_url = "data:image/png;base64,AQID";
        assert_eq!(body["image_prompts"][0]["image"], data_url);
        assert_eq!(body["reference_images"][0]["weight"], 1.0);
        assert_eq!(body["images"][0]["type"], "input");
        assert_eq!(body["images"][0]["image"], data_url);
        Ok(())
    }

    #[test]
    fn forced_url_mode_overrides_endpoint_detection() {
        let provider = ark(Some("https://images.example.test/generate")).with_url_mode(true);
        assert!(provider.uses_url_mode());
    }

    #[test]
    fn missing_model_is_a_config_error() {
        let provider = ArkImages::new(None, Some("k".to_string()), None, Duration::from_secs(1));
        let mut request = ArkImageRequest::new("p", "2K");
        request.image_urls = vec!["https://x.test/a.png".to_string()];
        let err = provider.build_request(&request).err();
        assert!(matches!(err, Some(EngineError::Config(message)) if message.contains("DOUBAO_IMAGE_MODEL")));
    }
}

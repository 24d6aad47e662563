use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::error::{body_snippet, truncate_text, EngineError, EngineResult};
use crate::http::{RequestSpec, Transport};

const DOCUMENT_SNIPPET_CHARS: usize = 600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBytes {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl ImageBytes {
    pub fn new(bytes: Vec<u8>, mime_type: Option<String>) -> Self {
        Self { bytes, mime_type }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub trait Downloader {
    fn download(&self, url: &str) -> EngineResult<ImageBytes>;
}

/// Fetches provider-hosted images with a plain GET over the same transport
/// that carried the generation call.
pub struct TransportDownloader<'a, T: Transport + ?Sized> {
    transport: &'a T,
    timeout: Duration,
}

impl<'a, T: Transport + ?Sized> TransportDownloader<'a, T> {
    pub fn new(transport: &'a T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }
}

impl<T: Transport + ?Sized> Downloader for TransportDownloader<'_, T> {
    fn download(&self, url: &str) -> EngineResult<ImageBytes> {
        let reply = self.transport.send(&RequestSpec::get(url, self.timeout))?;
        if !reply.is_success() {
            return Err(EngineError::Remote {
                status: reply.status,
                snippet: format!(
                    "image download failed for {}: {}",
                    truncate_text(url, 120),
                    body_snippet(&reply.body, 200)
                ),
            });
        }
        if reply.body.is_empty() {
            return Err(EngineError::EmptyBody {
                url: truncate_text(url, 120),
            });
        }
        Ok(ImageBytes::new(reply.body, reply.content_type))
    }
}

pub type ShapeExtractor = fn(&Map<String, Value>, &dyn Downloader) -> Option<EngineResult<ImageBytes>>;

/// Recognizes one known response layout. Returns `None` when the document
/// does not have that layout so the next matcher can try.
#[derive(Clone, Copy)]
pub struct ShapeMatcher {
    pub name: &'static str,
    pub extract: ShapeExtractor,
}

impl std::fmt::Debug for ShapeMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeMatcher").field("name", &self.name).finish()
    }
}

/// Nested shapes come first: a `data`/`images` wrapper may also carry a
/// top-level `url` of a different meaning.
pub const SHAPE_MATCHERS: &[ShapeMatcher] = &[
    ShapeMatcher {
        name: "data[0]",
        extract: match_data_list,
    },
    ShapeMatcher {
        name: "images[0]",
        extract: match_images_list,
    },
    ShapeMatcher {
        name: "url",
        extract: match_top_level_url,
    },
    ShapeMatcher {
        name: "image",
        extract: match_top_level_inline,
    },
];

const DATA_BASE64_KEYS: &[&str] = &["b64_json", "b64_image", "image_base64", "image"];
const IMAGES_BASE64_KEYS: &[&str] = &["base64", "b64_image", "image"];

pub fn extract_image(body: &[u8], downloader: &dyn Downloader) -> EngineResult<ImageBytes> {
    match serde_json::from_slice::<Value>(body) {
        Ok(document) => extract_from_document(&document, downloader),
        Err(_) => {
            if let Ok(format) = image::guess_format(body) {
                return Ok(ImageBytes::new(
                    body.to_vec(),
                    Some(format.to_mime_type().to_string()),
                ));
            }
            Err(EngineError::Shape {
                snippet: body_snippet(body, DOCUMENT_SNIPPET_CHARS),
            })
        }
    }
}

pub fn extract_from_document(
    document: &Value,
    downloader: &dyn Downloader,
) -> EngineResult<ImageBytes> {
    if let Some(obj) = document.as_object() {
        for matcher in SHAPE_MATCHERS {
            if let Some(result) = (matcher.extract)(obj, downloader) {
                tracing::debug!(shape = matcher.name, "provider response shape matched");
                return result;
            }
        }
    }
    let serialized = serde_json::to_string(document).unwrap_or_default();
    Err(EngineError::Shape {
        snippet: truncate_text(&serialized, DOCUMENT_SNIPPET_CHARS),
    })
}

/// Decodes plain base64 or a `data:<mime>;base64,<payload>` URL.
pub fn decode_inline_image(raw: &str) -> EngineResult<ImageBytes> {
    let trimmed = raw.trim();
    let (mime_type, payload) = match trimmed.split_once(";base64,") {
        Some((prefix, payload)) => (
            prefix
                .strip_prefix("data:")
                .map(str::trim)
                .filter(|mime| !mime.is_empty())
                .map(str::to_string),
            payload,
        ),
        None => (None, trimmed),
    };
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .map_err(|err| EngineError::Decode(err.to_string()))?;
    if bytes.is_empty() {
        return Err(EngineError::Decode("inline image decoded to zero bytes".to_string()));
    }
    Ok(ImageBytes::new(bytes, mime_type))
}

fn match_data_list(
    document: &Map<String, Value>,
    downloader: &dyn Downloader,
) -> Option<EngineResult<ImageBytes>> {
    match_first_list_item(document, "data", DATA_BASE64_KEYS, downloader)
}

fn match_images_list(
    document: &Map<String, Value>,
    downloader: &dyn Downloader,
) -> Option<EngineResult<ImageBytes>> {
    match_first_list_item(document, "images", IMAGES_BASE64_KEYS, downloader)
}

fn match_first_list_item(
    document: &Map<String, Value>,
    key: &str,
    base64_keys: &[&str],
    downloader: &dyn Downloader,
) -> Option<EngineResult<ImageBytes>> {
    let item = document
        .get(key)
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(Value::as_object)?;
    if let Some(url) = item.get("url").and_then(Value::as_str) {
        return Some(downloader.download(url));
    }
    base64_keys
        .iter()
        .find_map(|field| item.get(*field).and_then(Value::as_str))
        .map(decode_inline_image)
}

fn match_top_level_url(
    document: &Map<String, Value>,
    downloader: &dyn Downloader,
) -> Option<EngineResult<ImageBytes>> {
    document
        .get("url")
        .and_then(Value::as_str)
        .map(|url| downloader.download(url))
}

fn match_top_level_inline(
    document: &Map<String, Value>,
    _downloader: &dyn Downloader,
) -> Option<EngineResult<ImageBytes>> {
    document
        .get("image")
        .and_then(Value::as_str)
        .map(decode_inline_image)
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::{Digest, Sha256};

use crate::error::{body_snippet, EngineError, EngineResult};
use crate::http::{RequestBody, RequestSpec, Transport};

type HmacSha256 = Hmac<Sha256>;

const SIGNING_ALGORITHM: &str = "TOS4-HMAC-SHA256";
const SERVICE: &str = "tos";

/// Uploads bytes and returns a public URL for them.
pub trait ObjectStore {
    fn put_object(&self, bytes: &[u8], suffix: &str) -> EngineResult<String>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn put_object(&self, bytes: &[u8], suffix: &str) -> EngineResult<String> {
        (**self).put_object(bytes, suffix)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TosConfig {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TosTarget {
    access_key: String,
    secret_key: String,
    host: String,
    region: String,
    bucket: String,
}

impl TosConfig {
    fn resolve(&self) -> EngineResult<TosTarget> {
        let field = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        match (
            field(&self.access_key),
            field(&self.secret_key),
            field(&self.endpoint),
            field(&self.region),
            field(&self.bucket),
        ) {
            (Some(access_key), Some(secret_key), Some(endpoint), Some(region), Some(bucket)) => {
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                Ok(TosTarget {
                    access_key,
                    secret_key,
                    host,
                    region,
                    bucket,
                })
            }
            _ => Err(EngineError::config(
                "object storage is not configured: set TOS_ACCESS_KEY / TOS_SECRET_KEY / \
                 TOS_ENDPOINT / TOS_REGION / TOS_BUCKET",
            )),
        }
    }
}

/// Volcengine TOS over plain signed PUTs with virtual-hosted bucket URLs.
pub struct TosStorage<T: Transport> {
    transport: T,
    config: TosConfig,
    timeout: Duration,
}

impl<T: Transport> TosStorage<T> {
    pub fn new(transport: T, config: TosConfig, timeout: Duration) -> Self {
        Self {
            transport,
            config,
            timeout,
        }
    }

    pub fn object_key(&self, suffix: &str) -> String {
        let prefix = self.config.prefix.trim_matches('/');
        let name = format!("{}{}", uuid::Uuid::new_v4().simple(), normalize_suffix(suffix));
        if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        }
    }

    /// Builds the signed PUT for `key`. Returns the request and the public
    /// URL the object will have.
    pub fn signed_put(
        &self,
        key: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> EngineResult<(RequestSpec, String)> {
        let target = self.config.resolve()?;
        let host = format!("{}.{}", target.bucket, target.host);
        let path = format!("/{}", uri_encode_path(key));
        let url = format!("https://{host}{path}");
        let content_type = content_type_for(key);
        let payload_hash = hex::encode(Sha256::digest(bytes));
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let headers = [
            ("content-type", content_type.to_string()),
            ("host", host.clone()),
            ("x-tos-content-sha256", payload_hash.clone()),
            ("x-tos-date", timestamp.clone()),
        ];
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{}\n", value.trim()))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");
        let canonical_request = format!(
            "PUT\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );
        let scope = format!("{date}/{}/{SERVICE}/request", target.region);
        let string_to_sign = format!(
            "{SIGNING_ALGORITHM}\n{timestamp}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac_sha256(target.secret_key.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, target.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{SIGNING_ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            target.access_key
        );
        let spec = RequestSpec::new(Method::PUT, url.clone(), self.timeout)
            .header("Authorization", authorization)
            .header("x-tos-content-sha256", payload_hash)
            .header("x-tos-date", timestamp)
            .with_body(RequestBody::Bytes {
                content_type: content_type.to_string(),
                bytes: bytes.to_vec(),
            });
        Ok((spec, url))
    }
}

impl<T: Transport> ObjectStore for TosStorage<T> {
    fn put_object(&self, bytes: &[u8], suffix: &str) -> EngineResult<String> {
        let key = self.object_key(suffix);
        let (spec, url) = self.signed_put(&key, bytes, Utc::now())?;
        let reply = self.transport.send(&spec)?;
        if !reply.is_success() {
            return Err(EngineError::Remote {
                status: reply.status,
                snippet: body_snippet(&reply.body, 300),
            });
        }
        tracing::debug!(%url, bytes = bytes.len(), "object uploaded");
        Ok(url)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> EngineResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| EngineError::config(format!("invalid signing key: {err}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn normalize_suffix(suffix: &str) -> String {
    let trimmed = suffix.trim();
    if trimmed.is_empty() {
        ".jpg".to_string()
    } else if trimmed.starts_with('.') {
        trimmed.to_string()
    } else {
        format!(".{trimmed}")
    }
}

fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

fn uri_encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

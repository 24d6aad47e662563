use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No response was received (connect failure, timeout, reset).
    #[error("request failed: {message}")]
    Transport { message: String, transient: bool },
    #[error("remote returned {status}: {snippet}")]
    Remote { status: u16, snippet: String },
    #[error("no image field found in response: {snippet}")]
    Shape { snippet: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("downloaded image was empty ({url})")]
    EmptyBody { url: String },
    #[error("generated image is identical to the reference image")]
    IdenticalOutput,
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn body_snippet(body: &[u8], max_chars: usize) -> String {
    truncate_text(String::from_utf8_lossy(body).trim(), max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_text_appends_ellipsis_only_when_cut() {
        assert_eq!(truncate_text("abc", 3), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("董卓吕布", 2), "董卓…");
    }

    #[test]
    fn remote_error_exposes_status() {
        let err = EngineError::Remote {
            status: 503,
            snippet: "busy".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.to_string(), "remote returned 503: busy");
        assert_eq!(EngineError::IdenticalOutput.status(), None);
    }
}

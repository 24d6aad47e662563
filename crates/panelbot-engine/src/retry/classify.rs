use std::collections::BTreeSet;

use crate::error::EngineError;

pub const DEFAULT_RETRYABLE_STATUSES: &[u16] = &[408, 409, 425, 429, 500, 502, 503, 504];

pub const DEFAULT_TRANSIENT_HINTS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "reset",
    "refused",
    "temporarily",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureClassifier {
    retryable_statuses: BTreeSet<u16>,
    transient_hints: Vec<String>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRYABLE_STATUSES.iter().copied(),
            DEFAULT_TRANSIENT_HINTS.iter().copied(),
        )
    }
}

impl FailureClassifier {
    pub fn new<'a>(
        statuses: impl IntoIterator<Item = u16>,
        hints: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            retryable_statuses: statuses.into_iter().collect(),
            transient_hints: hints
                .into_iter()
                .map(|hint| hint.trim().to_ascii_lowercase())
                .filter(|hint| !hint.is_empty())
                .collect(),
        }
    }

    pub fn classify_status(&self, status: u16) -> RetryClass {
        if self.retryable_statuses.contains(&status) {
            RetryClass::Retryable
        } else {
            RetryClass::Fatal
        }
    }

    pub fn classify_transport(&self, message: &str, transient: bool) -> RetryClass {
        if transient {
            return RetryClass::Retryable;
        }
        let lowered = message.to_ascii_lowercase();
        if self
            .transient_hints
            .iter()
            .any(|hint| lowered.contains(hint.as_str()))
        {
            RetryClass::Retryable
        } else {
            RetryClass::Fatal
        }
    }

    pub fn classify(&self, err: &EngineError) -> RetryClass {
        match err {
            EngineError::Transport { message, transient } => {
                self.classify_transport(message, *transient)
            }
            EngineError::Remote { status, .. } => self.classify_status(*status),
            EngineError::IdenticalOutput => RetryClass::Retryable,
            EngineError::Config(_)
            | EngineError::Shape { .. }
            | EngineError::Decode(_)
            | EngineError::EmptyBody { .. }
            | EngineError::Image(_) => RetryClass::Fatal,
        }
    }
}

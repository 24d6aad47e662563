use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::time::Duration;

use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use reqwest::Method;
use serde_json::Value;

use crate::error::{body_snippet, truncate_text, EngineError, EngineResult};
use crate::retry::{FailureClassifier, RetryClass};

const SNIPPET_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        bytes: Vec<u8>,
        file_name: String,
        mime: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::Text(value.into()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        bytes: Vec<u8>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: FormValue::File {
                bytes,
                file_name: file_name.into(),
                mime: mime.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Bytes { content_type: String, bytes: Vec<u8> },
    Multipart(Vec<FormPart>),
}

/// One outbound call. Built once per attempt and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
    pub timeout: Duration,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
            timeout,
        }
    }

    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self::new(Method::GET, url, timeout)
    }

    pub fn post_json(url: impl Into<String>, payload: Value, timeout: Duration) -> Self {
        Self::new(Method::POST, url, timeout).with_body(RequestBody::Json(payload))
    }

    pub fn post_multipart(url: impl Into<String>, parts: Vec<FormPart>, timeout: Duration) -> Self {
        Self::new(Method::POST, url, timeout).with_body(RequestBody::Multipart(parts))
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn form_text(&self, name: &str) -> Option<&str> {
        let RequestBody::Multipart(parts) = &self.body else {
            return None;
        };
        parts.iter().find_map(|part| match &part.value {
            FormValue::Text(text) if part.name == name => Some(text.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a request and returns whatever the server answered. Only failures
/// where no response arrived come back as `Err`, always as
/// `EngineError::Transport`.
pub trait Transport {
    fn send(&self, request: &RequestSpec) -> EngineResult<HttpReply>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &RequestSpec) -> EngineResult<HttpReply> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &RequestSpec) -> EngineResult<HttpReply> {
        (**self).send(request)
    }
}

#[derive(Debug)]
pub enum AttemptResult {
    Success { status: u16, body: Vec<u8> },
    RetryableFailure(EngineError),
    FatalFailure(EngineError),
}

pub fn run_attempt<T: Transport + ?Sized>(
    transport: &T,
    request: &RequestSpec,
    classifier: &FailureClassifier,
) -> AttemptResult {
    let failure = match transport.send(request) {
        Ok(reply) if reply.is_success() => {
            return AttemptResult::Success {
                status: reply.status,
                body: reply.body,
            }
        }
        Ok(reply) => EngineError::Remote {
            status: reply.status,
            snippet: body_snippet(&reply.body, SNIPPET_CHARS),
        },
        Err(err) => err,
    };
    match classifier.classify(&failure) {
        RetryClass::Retryable => AttemptResult::RetryableFailure(failure),
        RetryClass::Fatal => AttemptResult::FatalFailure(failure),
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_form(parts: &[FormPart]) -> EngineResult<MultipartForm> {
        let mut form = MultipartForm::new();
        for part in parts {
            form = match &part.value {
                FormValue::Text(text) => form.text(part.name.clone(), text.clone()),
                FormValue::File {
                    bytes,
                    file_name,
                    mime,
                } => {
                    let file = MultipartPart::bytes(bytes.clone())
                        .file_name(file_name.clone())
                        .mime_str(mime)
                        .map_err(|err| {
                            EngineError::config(format!("invalid mime '{mime}': {err}"))
                        })?;
                    form.part(part.name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &RequestSpec) -> EngineResult<HttpReply> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(payload) => builder.json(payload),
            RequestBody::Bytes {
                content_type,
                bytes,
            } => builder
                .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                .body(bytes.clone()),
            RequestBody::Multipart(parts) => builder.multipart(Self::build_form(parts)?),
        };

        let response = builder.send().map_err(|err| transport_error(&err))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .map_err(|err| transport_error(&err))?
            .to_vec();
        Ok(HttpReply {
            status,
            content_type,
            body,
        })
    }
}

fn transport_error(err: &reqwest::Error) -> EngineError {
    EngineError::Transport {
        message: error_chain_text(err, 512),
        transient: err.is_timeout() || err.is_connect() || err.is_request() || err.is_body(),
    }
}

fn error_chain_text(err: &(dyn StdError + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(|last| last != trimmed).unwrap_or(true) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    /// Replays scripted replies in order and records every request it saw.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: RefCell<VecDeque<EngineResult<HttpReply>>>,
        pub seen: RefCell<Vec<RequestSpec>>,
    }

    impl ScriptedTransport {
        pub fn new(replies: Vec<EngineResult<HttpReply>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                seen: RefCell::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.seen.borrow().len()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: &RequestSpec) -> EngineResult<HttpReply> {
            self.seen.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(transient("script exhausted")))
        }
    }

    pub fn reply(status: u16, body: &[u8]) -> EngineResult<HttpReply> {
        Ok(HttpReply {
            status,
            content_type: None,
            body: body.to_vec(),
        })
    }

    pub fn json_reply(value: serde_json::Value) -> EngineResult<HttpReply> {
        reply(200, value.to_string().as_bytes())
    }

    pub fn transient(message: &str) -> EngineError {
        EngineError::Transport {
            message: message.to_string(),
            transient: true,
        }
    }
}

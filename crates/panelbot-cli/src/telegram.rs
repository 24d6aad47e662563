use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

/// One inbound chat event the dispatcher understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Message(IncomingMessage),
    Callback(CallbackQuery),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub text: Option<String>,
    /// Largest available size of an attached photo.
    pub photo_file_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    pub id: String,
    pub user_id: i64,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    pub file_path: String,
}

/// The outbound half of the chat service.
pub trait ChatTransport {
    fn send_text(&self, chat_id: i64, text: &str, button: Option<&InlineButton>) -> Result<()>;

    fn send_photo(&self, chat_id: i64, jpeg: Vec<u8>, file_name: &str, caption: &str) -> Result<()>;

    fn fetch_file(&self, file_id: &str) -> Result<FetchedFile>;

    fn answer_callback(&self, callback_id: &str, alert: Option<&str>) -> Result<()>;

    fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()>;
}

/// Telegram Bot API over blocking HTTPS.
pub struct TelegramClient {
    http: HttpClient,
    api_base: String,
    token: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: String, poll_timeout: Duration) -> Result<Self> {
        // Long polls must outlive the server-side wait.
        let http = HttpClient::builder()
            .timeout(poll_timeout + Duration::from_secs(15))
            .build()
            .context("failed to build telegram http client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    fn call(&self, method: &str, payload: Value) -> Result<Value> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("telegram {method} request failed"))?;
        let envelope = response
            .json::<Value>()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("telegram {method} returned unreadable json"))?;
        unwrap_result(method, envelope)
    }

    /// Returns `(update_id, update)` pairs after `offset`; updates with no
    /// counterpart in [`Update`] still advance the offset.
    pub fn get_updates(&self, offset: Option<i64>) -> Result<Vec<(i64, Option<Update>)>> {
        let mut payload = json!({
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "edited_message", "callback_query"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        let result = self.call("getUpdates", payload)?;
        let Some(items) = result.as_array() else {
            bail!("telegram getUpdates returned a non-list result");
        };
        Ok(items
            .iter()
            .filter_map(|item| {
                let update_id = item.get("update_id")?.as_i64()?;
                Some((update_id, parse_update(item)))
            })
            .collect())
    }
}

impl ChatTransport for TelegramClient {
    fn send_text(&self, chat_id: i64, text: &str, button: Option<&InlineButton>) -> Result<()> {
        let mut payload = json!({"chat_id": chat_id, "text": text});
        if let Some(button) = button {
            payload["reply_markup"] = json!({
                "inline_keyboard": [[{"text": button.text, "callback_data": button.callback_data}]]
            });
        }
        self.call("sendMessage", payload).map(|_| ())
    }

    fn send_photo(&self, chat_id: i64, jpeg: Vec<u8>, file_name: &str, caption: &str) -> Result<()> {
        let part = Part::bytes(jpeg)
            .file_name(file_name.to_string())
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", part);
        let response = self
            .http
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .map_err(reqwest::Error::without_url)
            .context("telegram sendPhoto request failed")?;
        let envelope = response
            .json::<Value>()
            .map_err(reqwest::Error::without_url)
            .context("telegram sendPhoto returned unreadable json")?;
        unwrap_result("sendPhoto", envelope).map(|_| ())
    }

    fn fetch_file(&self, file_id: &str) -> Result<FetchedFile> {
        let result = self.call("getFile", json!({"file_id": file_id}))?;
        let Some(file_path) = result.get("file_path").and_then(Value::as_str) else {
            bail!("telegram getFile returned no file_path for {file_id}");
        };
        let url = format!("{}/file/bot{}/{file_path}", self.api_base, self.token);
        let response = self
            .http
            .get(&url)
            .send()
            .map_err(reqwest::Error::without_url)
            .context("telegram file download failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("telegram file download returned {status}");
        }
        let bytes = response
            .bytes()
            .map_err(reqwest::Error::without_url)
            .context("telegram file download was cut short")?
            .to_vec();
        if bytes.is_empty() {
            bail!("telegram file download was empty");
        }
        Ok(FetchedFile {
            bytes,
            file_path: file_path.to_string(),
        })
    }

    fn answer_callback(&self, callback_id: &str, alert: Option<&str>) -> Result<()> {
        let mut payload = json!({"callback_query_id": callback_id});
        if let Some(text) = alert {
            payload["text"] = json!(text);
            payload["show_alert"] = json!(true);
        }
        self.call("answerCallbackQuery", payload).map(|_| ())
    }

    fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        self.call(
            "editMessageText",
            json!({"chat_id": chat_id, "message_id": message_id, "text": text}),
        )
        .map(|_| ())
    }
}

fn unwrap_result(method: &str, envelope: Value) -> Result<Value> {
    if envelope.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(envelope.get("result").cloned().unwrap_or(Value::Null));
    }
    let description = envelope
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    bail!("telegram {method} failed: {description}")
}

pub fn parse_update(item: &Value) -> Option<Update> {
    if let Some(query) = item.get("callback_query") {
        let message = query.get("message");
        return Some(Update::Callback(CallbackQuery {
            id: query.get("id")?.as_str()?.to_string(),
            user_id: query.get("from")?.get("id")?.as_i64()?,
            chat_id: message
                .and_then(|m| m.get("chat"))
                .and_then(|chat| chat.get("id"))
                .and_then(Value::as_i64),
            message_id: message
                .and_then(|m| m.get("message_id"))
                .and_then(Value::as_i64),
            data: query
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }));
    }

    let message = item.get("message").or_else(|| item.get("edited_message"))?;
    let chat_id = message.get("chat")?.get("id")?.as_i64()?;
    let user_id = message.get("from")?.get("id")?.as_i64()?;
    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str)
        .map(str::to_string);
    // Telegram lists photo sizes smallest first.
    let photo_file_id = message
        .get("photo")
        .and_then(Value::as_array)
        .and_then(|sizes| sizes.last())
        .and_then(|size| size.get("file_id"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(Update::Message(IncomingMessage {
        chat_id,
        user_id,
        text,
        photo_file_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_client(token: &str) -> Result<TelegramClient> {
        // Bind then drop so the port is known to refuse connections.
        let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
        TelegramClient::new(
            &format!("http://127.0.0.1:{port}"),
            token.to_string(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn transport_errors_do_not_carry_the_bot_token() -> Result<()> {
        let client = unreachable_client("123456:SECRETTOKEN")?;

        let polled = client.get_updates(None).err().map(|err| format!("{err:#}"));
        let polled = polled.unwrap_or_default();
        assert!(polled.contains("telegram getUpdates request failed"));
        assert!(!polled.contains("SECRETTOKEN"), "{polled}");

        let photo = client
            .send_photo(1, vec![0xFF, 0xD8], "x.jpg", "caption")
            .err()
            .map(|err| format!("{err:#}"))
            .unwrap_or_default();
        assert!(photo.contains("sendPhoto"));
        assert!(!photo.contains("SECRETTOKEN"), "{photo}");
        Ok(())
    }

    #[test]
    fn parse_photo_message_takes_the_largest_size() {
        let update = parse_update(&json!({
            "update_id": 3,
            "message": {
                "message_id": 9,
                "chat": {"id": -100},
                "from": {"id": 42},
                "caption": "here",
                "photo": [
                    {"file_id": "small", "width": 90},
                    {"file_id": "large", "width": 1280}
                ]
            }
        }));
        assert_eq!(
            update,
            Some(Update::Message(IncomingMessage {
                chat_id: -100,
                user_id: 42,
                text: Some("here".to_string()),
                photo_file_id: Some("large".to_string()),
            }))
        );
    }

    #[test]
    fn parse_callback_query() {
        let update = parse_update(&json!({
            "update_id": 4,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 42},
                "data": "REROLL:42:2026-01-02",
                "message": {"message_id": 77, "chat": {"id": 5}}
            }
        }));
        assert_eq!(
            update,
            Some(Update::Callback(CallbackQuery {
                id: "cb-1".to_string(),
                user_id: 42,
                chat_id: Some(5),
                message_id: Some(77),
                data: "REROLL:42:2026-01-02".to_string(),
            }))
        );
    }

    #[test]
    fn parse_skips_unsupported_updates() {
        assert_eq!(parse_update(&json!({"update_id": 5, "poll": {}})), None);
        assert_eq!(
            parse_update(&json!({"update_id": 6, "message": {"chat": {"id": 1}}})),
            None
        );
    }

    #[test]
    fn api_envelope_errors_carry_the_description() {
        let ok = unwrap_result("sendMessage", json!({"ok": true, "result": {"message_id": 1}}));
        assert_eq!(ok.ok(), Some(json!({"message_id": 1})));
        let err = unwrap_result(
            "sendMessage",
            json!({"ok": false, "description": "Bad Request: chat not found"}),
        );
        assert_eq!(
            err.err().map(|e| e.to_string()),
            Some("telegram sendMessage failed: Bad Request: chat not found".to_string())
        );
    }
}

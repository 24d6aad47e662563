use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only bot activity journal, one compact JSON object per line.
///
/// Every event carries `type`, `instance` and `ts`; caller payload is merged
/// last and may override them.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Journal>,
}

#[derive(Debug)]
struct Journal {
    file: PathBuf,
    instance: String,
    append: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, instance: impl Into<String>) -> Self {
        let shared = Journal {
            file: path.into(),
            instance: instance.into(),
            append: Mutex::new(()),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.file
    }

    pub fn instance(&self) -> &str {
        &self.shared.instance
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut envelope = match json!({
            "type": event_type,
            "instance": self.shared.instance,
            "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        }) {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        envelope.extend(payload);
        let event = Value::Object(envelope);
        self.append_line(&serde_json::to_string(&event)?)?;
        Ok(event)
    }

    /// Journal failures must not interrupt a chat reply.
    pub fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.emit(event_type, payload) {
            tracing::warn!(event_type, error = %format!("{err:#}"), "failed to append event");
        }
    }

    fn append_line(&self, line: &str) -> anyhow::Result<()> {
        let file = self.path();
        if let Some(dir) = file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let _held = self
            .shared
            .append
            .lock()
            .map_err(|_| anyhow!("event journal mutex poisoned"))?;
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .with_context(|| format!("failed to open {}", file.display()))?;
        writeln!(out, "{line}")?;
        Ok(())
    }
}

/// Builds a payload from `(key, value)` pairs.
pub fn payload<I, K>(pairs: I) -> EventPayload
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(key, value)| (key.into(), value)).collect()
}

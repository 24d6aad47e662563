use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use panelbot_engine::providers::{first_non_empty_env, non_empty_env};
use panelbot_engine::{EngineResult, RetryPolicy, TosConfig};
use serde::Deserialize;

/// `config.json`. Every field has a default so a missing or partial file
/// still yields a usable configuration; credentials come from the
/// environment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub telegram: TelegramSettings,
    pub openai: OpenAiSettings,
    pub ark: ArkSettings,
    pub comic: ComicSettings,
    pub retry: RetrySettings,
    pub storage: StorageSettings,
    pub fortune: FortuneSettings,
}

impl BotConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub api_base: String,
    pub poll_timeout_secs: u64,
    /// Commands addressed to another `@bot` are ignored when this is set.
    pub bot_username: Option<String>,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 50,
            bot_username: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub model: String,
    pub quality: Option<String>,
    pub timeout_secs: u64,
    /// Send the uploaded photos as edit references instead of text-only
    /// generations.
    pub use_reference: bool,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            model: "dall-e-2".to_string(),
            quality: Some("standard".to_string()),
            timeout_secs: 60,
            use_reference: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArkSettings {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub size: String,
    pub timeout_secs: u64,
}

impl Default for ArkSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            size: "2K".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ComicSettings {
    /// `[width, height]` of the top panel in the locally composited page.
    pub top: [u32; 2],
    pub bottom: [u32; 2],
    pub gap: u32,
    pub border: u32,
    /// Reference geometry the one-shot page's bubbles are placed against.
    pub one_shot_top: [u32; 2],
    pub one_shot_bottom: [u32; 2],
    pub one_shot_jpeg_quality: u8,
    pub debug_dir: Option<PathBuf>,
    /// Caption fonts tried in order; the first readable one wins.
    pub font_paths: Vec<PathBuf>,
}

impl Default for ComicSettings {
    fn default() -> Self {
        Self {
            top: [1536, 1024],
            bottom: [1024, 1024],
            gap: 24,
            border: 8,
            one_shot_top: [2048, 1024],
            one_shot_bottom: [1024, 1024],
            one_shot_jpeg_quality: 92,
            debug_dir: None,
            font_paths: [
                "assets/fonts/NotoSansSC-Medium.ttf",
                "assets/fonts/NotoSansSC-SemiBold.ttf",
                "assets/fonts/NotoSansSC-Regular.ttf",
                "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
                "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
    pub enforce_distinct_output: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 900,
            multiplier: 1.6,
            jitter_ms: 350,
            enforce_distinct_output: false,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> EngineResult<RetryPolicy> {
        Ok(RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.multiplier,
            Duration::from_millis(self.jitter_ms),
        )?
        .with_enforce_distinct_output(self.enforce_distinct_output))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub prefix: String,
    pub timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            prefix: "dongzhuo".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FortuneSettings {
    pub utc_offset_hours: i32,
    pub store_file: String,
}

impl Default for FortuneSettings {
    fn default() -> Self {
        Self {
            utc_offset_hours: 8,
            store_file: "fortunes.json".to_string(),
        }
    }
}

/// Secrets and endpoints read from the environment. Missing values are
/// reported by the component that needs them, at call time.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub telegram_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub ark_endpoint: Option<String>,
    pub ark_api_key: Option<String>,
    pub ark_model: Option<String>,
    pub tos: TosConfig,
}

impl Credentials {
    pub fn from_env(storage: &StorageSettings) -> Self {
        Self {
            telegram_token: first_non_empty_env(&["TG_BOT_TOKEN", "BOT_TOKEN"]),
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            openai_api_base: non_empty_env("OPENAI_API_BASE"),
            ark_endpoint: non_empty_env("DOUBAO_IMAGE_URL"),
            ark_api_key: first_non_empty_env(&["ARK_API_KEY", "DOUBAO_API_KEY"]),
            ark_model: non_empty_env("DOUBAO_IMAGE_MODEL"),
            tos: TosConfig {
                access_key: non_empty_env("TOS_ACCESS_KEY"),
                secret_key: non_empty_env("TOS_SECRET_KEY"),
                endpoint: non_empty_env("TOS_ENDPOINT"),
                region: non_empty_env("TOS_REGION"),
                bucket: non_empty_env("TOS_BUCKET"),
                prefix: storage.prefix.clone(),
            },
        }
    }
}

//! Runtime configuration loaded from the process environment.
//!
//! A `.env` file in the working directory is read first (if present); real environment variables
//! win over it.

use std::path::PathBuf;

use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};

/// OpenAI-compatible chat-completions endpoint used for scripts and preset selection.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "llama-3.3-70b-versatile".to_owned(),
            base_url: "https://api.groq.com/openai/v1".to_owned(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TtsConfig {
    pub api_key: Option<String>,
    pub voice_id: String,
    pub model_id: String,
    pub base_url: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_owned(),
            model_id: "eleven_multilingual_v2".to_owned(),
            base_url: "https://api.elevenlabs.io/v1".to_owned(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WebDriverConfig {
    pub url: String,
    pub chromedriver_bin: String,
    /// Spawn `chromedriver` locally when the first connection attempt fails.
    pub launch: bool,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9515".to_owned(),
            chromedriver_bin: "chromedriver".to_owned(),
            launch: true,
        }
    }
}

/// Remote object storage. Disabled unless both `url` and `key` are set.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: Option<String>,
    pub key: Option<String>,
    pub bucket: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            bucket: "reelcast-videos".to_owned(),
        }
    }
}

impl StoreConfig {
    pub fn is_enabled(&self) -> bool {
        self.url.is_some() && self.key.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub workers: usize,
    pub fps: Fps,
    pub crf: u8,
    pub padding_secs: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("temp"),
            output_dir: PathBuf::from("videos"),
            workers: 2,
            fps: Fps { num: 30, den: 1 },
            crf: 23,
            padding_secs: 1.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub webdriver: WebDriverConfig,
    pub store: StoreConfig,
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Load `.env` (if any) and then read the process environment.
    pub fn from_env() -> ReelResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset and blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ReelResult<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let mut cfg = Self::default();

        cfg.llm.api_key = get("LLM_API_KEY");
        if let Some(v) = get("LLM_MODEL") {
            cfg.llm.model = v;
        }
        if let Some(v) = get("LLM_BASE_URL") {
            cfg.llm.base_url = v.trim_end_matches('/').to_owned();
        }

        cfg.tts.api_key = get("TTS_API_KEY");
        if let Some(v) = get("TTS_VOICE_ID") {
            cfg.tts.voice_id = v;
        }
        if let Some(v) = get("TTS_MODEL_ID") {
            cfg.tts.model_id = v;
        }
        if let Some(v) = get("TTS_BASE_URL") {
            cfg.tts.base_url = v.trim_end_matches('/').to_owned();
        }

        if let Some(v) = get("WEBDRIVER_URL") {
            cfg.webdriver.url = v;
        }
        if let Some(v) = get("CHROMEDRIVER_BIN") {
            cfg.webdriver.chromedriver_bin = v;
        }
        if let Some(v) = get("REEL_LAUNCH_WEBDRIVER") {
            cfg.webdriver.launch = parse_bool("REEL_LAUNCH_WEBDRIVER", &v)?;
        }

        cfg.store.url = get("STORE_URL").map(|v| v.trim_end_matches('/').to_owned());
        cfg.store.key = get("STORE_KEY");
        if let Some(v) = get("STORE_BUCKET") {
            cfg.store.bucket = v;
        }

        if let Some(v) = get("REEL_TEMP_DIR") {
            cfg.runtime.temp_dir = PathBuf::from(v);
        }
        if let Some(v) = get("REEL_OUTPUT_DIR") {
            cfg.runtime.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("REEL_WORKERS") {
            cfg.runtime.workers = parse_num("REEL_WORKERS", &v)?;
            if cfg.runtime.workers == 0 {
                return Err(ReelError::validation("REEL_WORKERS must be at least 1"));
            }
        }
        if let Some(v) = get("REEL_FPS") {
            cfg.runtime.fps = Fps::integer(parse_num("REEL_FPS", &v)?)?;
        }
        if let Some(v) = get("REEL_CRF") {
            let crf: u8 = parse_num("REEL_CRF", &v)?;
            if crf > 51 {
                return Err(ReelError::validation("REEL_CRF must be within 0..=51"));
            }
            cfg.runtime.crf = crf;
        }
        if let Some(v) = get("REEL_PADDING_SECS") {
            let padding: f64 = parse_num("REEL_PADDING_SECS", &v)?;
            if !padding.is_finite() || padding < 0.0 {
                return Err(ReelError::validation(
                    "REEL_PADDING_SECS must be a non-negative number",
                ));
            }
            cfg.runtime.padding_secs = padding;
        }

        Ok(cfg)
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> ReelResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ReelError::validation(format!("{key}='{value}' is not valid: {e}")))
}

fn parse_bool(key: &str, value: &str) -> ReelResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ReelError::validation(format!(
            "{key}='{value}' is not a boolean"
        ))),
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

pub const DEFAULT_CAPTURE_FPS: u32 = 5;
pub const DEFAULT_SENSITIVITY: f64 = 0.08;
pub const DEFAULT_MIN_SECONDS_BETWEEN_SLIDES: u64 = 2;
pub const DEFAULT_OUTPUT_DIR: &str = "assets/output";
pub const DEFAULT_MAX_CAPTION_CHARS: usize = 900;
pub const DEFAULT_ADMIN_HTTP_ADDR: &str = ":8080";
pub const DEFAULT_TESSERACT_LANG: &str = "spa";

/// Shortest caption limit that still leaves room for the `...` marker.
pub const MIN_CAPTION_CHARS: usize = 4;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("telegram_bot_token is empty")]
    MissingBotToken,
    #[error("telegram_chat_id is invalid (0)")]
    MissingChatId,
    #[error("sensitivity must be in (0, 1], got {0}")]
    Sensitivity(f64),
    #[error("capture_fps must be greater than zero")]
    CaptureFps,
    #[error("min_seconds_between_slides must be greater than zero")]
    MinGap,
    #[error("max_caption_chars must be at least 4, got {0}")]
    CaptionLimit(usize),
    #[error("admin_http_addr '{0}' is not a valid listen address")]
    AdminAddr(String),
}

/// Runtime configuration, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera_index: i32,
    pub capture_fps: u32,
    pub sensitivity: f64,
    pub min_seconds_between_slides: u64,

    pub telegram_bot_token: String,
    pub telegram_chat_id: i64,

    pub tesseract_lang: String,

    pub output_dir: PathBuf,
    pub enable_annotation: bool,
    pub max_caption_chars: usize,

    pub admin_http_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_index: 0,
            capture_fps: DEFAULT_CAPTURE_FPS,
            sensitivity: DEFAULT_SENSITIVITY,
            min_seconds_between_slides: DEFAULT_MIN_SECONDS_BETWEEN_SLIDES,
            telegram_bot_token: String::new(),
            telegram_chat_id: 0,
            tesseract_lang: DEFAULT_TESSERACT_LANG.into(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            enable_annotation: false,
            max_caption_chars: DEFAULT_MAX_CAPTION_CHARS,
            admin_http_addr: DEFAULT_ADMIN_HTTP_ADDR.into(),
        }
    }
}

impl Config {
    /// Replaces zero/empty values with their defaults. Negative or out-of-range
    /// values are left alone so that `validate` can reject them.
    pub fn normalized(mut self) -> Self {
        if self.capture_fps == 0 {
            self.capture_fps = DEFAULT_CAPTURE_FPS;
        }
        if self.sensitivity == 0.0 {
            self.sensitivity = DEFAULT_SENSITIVITY;
        }
        if self.min_seconds_between_slides == 0 {
            self.min_seconds_between_slides = DEFAULT_MIN_SECONDS_BETWEEN_SLIDES;
        }
        if self.output_dir.as_os_str().is_empty() {
            self.output_dir = PathBuf::from(DEFAULT_OUTPUT_DIR);
        }
        if self.max_caption_chars == 0 {
            self.max_caption_chars = DEFAULT_MAX_CAPTION_CHARS;
        }
        if self.admin_http_addr.trim().is_empty() {
            self.admin_http_addr = DEFAULT_ADMIN_HTTP_ADDR.into();
        }
        if self.tesseract_lang.trim().is_empty() {
            self.tesseract_lang = DEFAULT_TESSERACT_LANG.into();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_bot_token.trim().is_empty() {
            return Err(ConfigError::MissingBotToken);
        }
        if self.telegram_chat_id == 0 {
            return Err(ConfigError::MissingChatId);
        }
        if !(self.sensitivity > 0.0 && self.sensitivity <= 1.0) {
            return Err(ConfigError::Sensitivity(self.sensitivity));
        }
        if self.capture_fps == 0 {
            return Err(ConfigError::CaptureFps);
        }
        if self.min_seconds_between_slides == 0 {
            return Err(ConfigError::MinGap);
        }
        if self.max_caption_chars < MIN_CAPTION_CHARS {
            return Err(ConfigError::CaptionLimit(self.max_caption_chars));
        }
        self.admin_socket_addr()?;
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.capture_fps.max(1)
    }

    pub fn min_gap(&self) -> Duration {
        Duration::from_secs(self.min_seconds_between_slides)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.output_dir.join("metrics.jsonl")
    }

    /// Parses `admin_http_addr`, accepting the port-only `":8080"` form as
    /// "all interfaces".
    pub fn admin_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = self.admin_http_addr.trim();
        let candidate = if raw.starts_with(':') {
            format!("0.0.0.0{raw}")
        } else {
            raw.to_string()
        };
        candidate
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::AdminAddr(self.admin_http_addr.clone()))
    }

    /// Fields the running loop cannot pick up without a restart.
    pub fn restart_required_changes(&self, other: &Config) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.camera_index != other.camera_index {
            changed.push("camera_index");
        }
        if self.tesseract_lang != other.tesseract_lang {
            changed.push("tesseract_lang");
        }
        if self.telegram_bot_token != other.telegram_bot_token
            || self.telegram_chat_id != other.telegram_chat_id
        {
            changed.push("telegram credentials");
        }
        if self.admin_http_addr != other.admin_http_addr {
            changed.push("admin_http_addr");
        }
        changed
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: Config = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    let config = config.normalized();
    config
        .validate()
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}

/// Shared, persisted configuration. Readers take a snapshot with `current`.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Config>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = load_config(&path)?;
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Wraps an already-validated config without touching disk until the
    /// first `replace`.
    pub fn with_config(path: PathBuf, config: Config) -> Self {
        Self {
            path,
            data: RwLock::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Config {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Validates, persists and swaps in a new config. On any failure the
    /// previous config stays in effect.
    pub fn replace(&self, config: Config) -> Result<Config, SettingsError> {
        let config = config.normalized();
        config.validate()?;

        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&config).map_err(SettingsError::Persist)?;
        *guard = config.clone();
        Ok(config)
    }

    fn persist(&self, data: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Invalid(#[from] ConfigError),
    #[error("failed to persist config: {0:#}")]
    Persist(anyhow::Error),
}

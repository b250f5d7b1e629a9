//! FocusCoach configuration.
//!
//! Read from a TOML file (default `config/focuscoach.toml`); a missing file
//! means all defaults.  Environment variables, including those loaded from
//! `.env`, override the file:
//!
//! | Variable | Overrides |
//! |---|---|
//! | `FOCUSCOACH_API_KEY`, then `OPENAI_API_KEY` | `llm.api_key` |
//! | `FOCUSCOACH_API_BASE_URL` | `llm.base_url` |
//! | `FOCUSCOACH_MODEL` | `llm.model` |
//! | `FOCUSCOACH_INTERVAL_SECS` | `monitor.interval_secs` |
//!
//! The optional `[chat]` section points the `chat` command at a different
//! endpoint or model than the screenshot classifier.  Unset keys fall back
//! to `[llm]`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use focuscoach_monitor::capture::default_command;
use focuscoach_monitor::llm::{DEFAULT_MAX_IMAGE_DIMENSION, DEFAULT_MODEL, OPENAI_BASE_URL};
use focuscoach_monitor::workflow::DEFAULT_INTERVENTION_MESSAGE;
use focuscoach_monitor::{CommandCapture, JsonGoalStore, LlmConfig, MonitorConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub monitor: MonitorSection,
    pub capture: CaptureSection,
    pub llm: LlmSection,
    pub chat: ChatSection,
    pub goal: GoalSection,
}

/// `[monitor]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub interval_secs: u64,
    pub intervention_message: String,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            intervention_message: DEFAULT_INTERVENTION_MESSAGE.to_owned(),
        }
    }
}

/// `[capture]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    /// Capture argv; `{path}` is replaced with the output file.
    pub command: Vec<String>,
    pub screenshot_dir: PathBuf,
    /// Archive classified screenshots here instead of deleting them.
    pub processed_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            screenshot_dir: PathBuf::from("screenshots"),
            processed_dir: None,
            timeout_secs: 15,
        }
    }
}

/// `[llm]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
    /// Screenshots are shrunk to fit this square before upload; 0 sends
    /// them at capture resolution.
    pub max_image_dimension: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            api_key: None,
            max_tokens: 1024,
            temperature: Some(0.4),
            timeout_secs: 60,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
        }
    }
}

/// `[chat]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// `[goal]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalSection {
    pub path: PathBuf,
}

impl Default for GoalSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/goal.json"),
        }
    }
}

impl FocusConfig {
    /// Load `path` (if it exists), then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse TOML config {}", path.display()))?;

        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("FOCUSCOACH_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = var("FOCUSCOACH_API_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = var("FOCUSCOACH_MODEL") {
            self.llm.model = model;
        }
        if let Some(raw) = var("FOCUSCOACH_INTERVAL_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.monitor.interval_secs = secs,
                Err(e) => {
                    warn!(value = %raw, error = %e, "ignoring invalid FOCUSCOACH_INTERVAL_SECS")
                }
            }
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.llm
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.monitor.interval_secs),
            intervention_message: self.monitor.intervention_message.clone(),
            ..MonitorConfig::default()
        }
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.llm.api_key.clone().unwrap_or_default(),
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            timeout: Duration::from_secs(self.llm.timeout_secs),
            max_image_dimension: Some(self.llm.max_image_dimension).filter(|&px| px > 0),
        }
    }

    /// Client settings for the `chat` command: `[llm]` with `[chat]`
    /// applied on top.
    pub fn chat_llm_config(&self) -> LlmConfig {
        let mut config = self.llm_config();
        if let Some(url) = &self.chat.base_url {
            config.base_url = url.clone();
        }
        if let Some(model) = &self.chat.model {
            config.model = model.clone();
        }
        if let Some(key) = self.chat.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            config.api_key = key.to_owned();
        }
        config
    }

    pub fn capture(&self) -> Result<CommandCapture> {
        let capture =
            CommandCapture::new(self.capture.command.clone(), &self.capture.screenshot_dir)
                .context("invalid [capture] configuration")?;
        Ok(capture
            .with_processed_dir(self.capture.processed_dir.clone())
            .with_timeout(Duration::from_secs(self.capture.timeout_secs)))
    }

    pub fn goal_store(&self) -> JsonGoalStore {
        JsonGoalStore::new(&self.goal.path)
    }
}

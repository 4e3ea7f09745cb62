use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from `~/.taskpilot/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub integrations: IntegrationConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl EngineConfig {
    /// Load config from the default path, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = EngineConfig::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: EngineConfig =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that type checks cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        self.board.validate()
    }

    fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskpilot")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_project_name() -> String {
    "taskpilot".into()
}
fn default_log_level() -> String {
    "info".into()
}

/// Classification pipeline scheduling and batch behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_true")]
    pub auto_analysis_enabled: bool,
    #[serde(default = "default_frequency_hours")]
    pub analysis_frequency_hours: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_per_item_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_analysis_enabled: true,
            analysis_frequency_hours: default_frequency_hours(),
            batch_size: default_batch_size(),
            timeout_per_item_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "pipeline.batch_size must be at least 1".to_string(),
            ));
        }
        if self.analysis_frequency_hours <= 0.0 {
            return Err(ConfigError::Validation(
                "pipeline.analysis_frequency_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn analysis_frequency(&self) -> Duration {
        Duration::from_secs_f64(self.analysis_frequency_hours * 3600.0)
    }

    pub fn timeout_per_item(&self) -> Duration {
        Duration::from_secs(self.timeout_per_item_secs)
    }
}

fn default_frequency_hours() -> f64 {
    6.0
}
fn default_batch_size() -> usize {
    10
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retry_attempts() -> u32 {
    2
}
fn default_true() -> bool {
    true
}

/// Kanban board behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "default_true")]
    pub auto_move_approved: bool,
    #[serde(default)]
    pub require_approval_for_execution: bool,
    /// Soft cap; exceeding it is warn-logged, never an error.
    #[serde(default = "default_max_items")]
    pub max_items_per_column: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            auto_move_approved: true,
            require_approval_for_execution: false,
            max_items_per_column: default_max_items(),
        }
    }
}

impl BoardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_items_per_column == 0 {
            return Err(ConfigError::Validation(
                "board.max_items_per_column must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_items() -> usize {
    100
}

/// Toggles for the backlog <-> action-plan integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    #[serde(default = "default_true")]
    pub sync_with_action_plan: bool,
    #[serde(default = "default_true")]
    pub auto_create_tasks: bool,
    #[serde(default = "default_true")]
    pub connect_related_items: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            sync_with_action_plan: true,
            auto_create_tasks: true,
            connect_related_items: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
        }
    }
}

fn default_channels() -> Vec<String> {
    vec!["log".to_string()]
}

//! Configuration settings for commentsync.
//!
//! Settings are loaded from `~/.commentsync/config.yaml`.

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::config::Paths;
use crate::error::SyncError;
use crate::features::conflict::ConflictStrategy;
use crate::features::delta::SyncScope;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// General CLI settings.
    pub general: GeneralConfig,
    /// Outbound queue settings.
    pub queue: QueueConfig,
    /// Sync engine settings.
    pub engine: EngineConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    /// Color output setting.
    #[serde(default = "default_color")]
    pub color: ColorSetting,
}

/// Color output setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorSetting {
    /// Auto-detect based on terminal.
    #[default]
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

/// Retry and concurrency settings for the outbound queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Attempts before an operation is dead-lettered.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// First retry delay; doubles per attempt.
    #[serde(default = "default_backoff_base_seconds")]
    pub backoff_base_seconds: f64,
    /// Upper bound on the un-jittered retry delay.
    #[serde(default = "default_max_backoff_seconds")]
    pub max_backoff_seconds: f64,
    /// Fraction of the delay added or removed at random.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// Cap on operations dispatched concurrently by one `process_next` call,
    /// whatever bound the caller asks for.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_operations: usize,
}

/// Sync engine scheduling and resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Run a sync pass on a fixed interval.
    #[serde(default = "default_true")]
    pub enable_background_sync: bool,
    /// Minutes between background sync passes.
    #[serde(default = "default_sync_interval_minutes")]
    pub sync_interval_minutes: u64,
    /// Sync as soon as connectivity returns.
    #[serde(default = "default_true")]
    pub sync_on_reconnect: bool,
    /// In-flight push operations per pass.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_push: usize,
    /// Strategy applied when both sides changed.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    /// Scopes pulled on every pass.
    #[serde(default)]
    pub scopes: Vec<SyncScope>,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `COMMENTSYNC_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

const fn default_color() -> ColorSetting {
    ColorSetting::Auto
}

const fn default_max_retry_attempts() -> u32 {
    5
}

const fn default_backoff_base_seconds() -> f64 {
    2.0
}

const fn default_max_backoff_seconds() -> f64 {
    300.0
}

const fn default_jitter_factor() -> f64 {
    0.25
}

const fn default_concurrency() -> usize {
    4
}

const fn default_true() -> bool {
    true
}

const fn default_sync_interval_minutes() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
            color: default_color(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            backoff_base_seconds: default_backoff_base_seconds(),
            max_backoff_seconds: default_max_backoff_seconds(),
            jitter_factor: default_jitter_factor(),
            max_concurrent_operations: default_concurrency(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_background_sync: default_true(),
            sync_interval_minutes: default_sync_interval_minutes(),
            sync_on_reconnect: default_true(),
            max_concurrent_push: default_concurrency(),
            conflict_strategy: ConflictStrategy::default(),
            scopes: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl QueueConfig {
    /// Check the values for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_retry_attempts == 0 {
            return Err(SyncError::Config(
                "queue.max_retry_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(SyncError::Config(format!(
                "queue.jitter_factor must be in [0, 1), got {}",
                self.jitter_factor
            )));
        }
        if self.backoff_base_seconds < 0.0 || self.max_backoff_seconds < 0.0 {
            return Err(SyncError::Config(
                "queue backoff durations must not be negative".to_string(),
            ));
        }
        if self.max_concurrent_operations == 0 {
            return Err(SyncError::Config(
                "queue.max_concurrent_operations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Check the values for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_concurrent_push == 0 {
            return Err(SyncError::Config(
                "engine.max_concurrent_push must be at least 1".to_string(),
            ));
        }
        if self.enable_background_sync && self.sync_interval_minutes == 0 {
            return Err(SyncError::Config(
                "engine.sync_interval_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Time between background passes.
    #[must_use]
    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync_interval_minutes.max(1) * 60)
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, SyncError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<(), SyncError> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        self.save_to_path(&paths.config_file)
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), SyncError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| SyncError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Check every section for invalid values.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<(), SyncError> {
        self.queue.validate()?;
        self.engine.validate()
    }
}

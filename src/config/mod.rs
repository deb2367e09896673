//! Configuration management for commentsync.
//!
//! This module handles loading and saving configuration from `~/.commentsync/`.

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{ColorSetting, Config, EngineConfig, GeneralConfig, LoggingConfig, QueueConfig};

//! Config command implementation.

use colored::Colorize;

use crate::cli::args::{ConfigCommands, OutputFormat};
use crate::config::{Config, Paths};
use crate::error::SyncError;
use crate::output::to_json;

/// Execute config subcommands.
///
/// # Errors
///
/// Returns `SyncError::Config` if the file cannot be serialized or written,
/// or if `init` would overwrite an existing file without `--force`.
pub fn config(
    paths: &Paths,
    config: &Config,
    cmd: ConfigCommands,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match cmd {
        ConfigCommands::Show => match format {
            OutputFormat::Json => to_json(config),
            OutputFormat::Pretty => serde_yaml::to_string(config)
                .map_err(|e| SyncError::Config(format!("Failed to serialize config: {e}"))),
        },
        ConfigCommands::Path => {
            let path = paths.config_file.display().to_string();
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({
                    "path": path,
                    "exists": paths.config_file.exists(),
                })),
                OutputFormat::Pretty => Ok(path),
            }
        }
        ConfigCommands::Init { force } => {
            if paths.config_file.exists() && !force {
                return Err(SyncError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    paths.config_file.display()
                )));
            }
            paths.ensure_dirs()?;
            Config::default().save_to_path(&paths.config_file)?;
            let path = paths.config_file.display().to_string();
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({ "created": path })),
                OutputFormat::Pretty => Ok(format!("{} {}", "Wrote".green(), path)),
            }
        }
    }
}

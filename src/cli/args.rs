use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "commentsync")]
#[command(about = "Inspect and maintain the offline comment sync state")]
#[command(long_about = "commentsync - offline-first comment sync

Inspects and maintains the local sync state: the outbound operation queue,
per-scope pull metadata and unresolved conflicts. All data lives in
~/.commentsync/.

QUICK START:
  commentsync status               Queue counts and scope summary
  commentsync queue list           Pending operations
  commentsync queue retry-dead     Requeue dead-lettered operations
  commentsync scopes reset KEY     Force a full re-fetch of one scope

OUTPUT FORMATS:
  --output pretty    Human-readable colored output
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  commentsync <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output, or 'json' for
    /// machine-readable output suitable for scripting. Defaults to
    /// `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show sync status
    ///
    /// Displays queue counts per status, the dead-letter count and a
    /// summary of every scope that has been pulled.
    #[command(alias = "st")]
    Status,

    /// Manage the outbound operation queue
    #[command(alias = "q")]
    Queue(QueueArgs),

    /// Inspect or reset per-scope pull metadata
    Scopes(ScopesArgs),

    /// List conflicts held for manual review
    Conflicts,

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Generate shell completions
    ///
    /// Outputs completion script for the specified shell.
    /// Redirect to a file or source directly.
    ///
    /// Example: commentsync completions bash > ~/.bash_completion.d/commentsync
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

/// Queue subcommands.
#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued operations
    ///
    /// Shows operations in dispatch order, optionally filtered by status.
    List {
        /// Filter by status (pending, in_progress, failed, completed, cancelled, dead_letter)
        #[arg(long, short = 's')]
        status: Option<String>,

        /// Maximum operations to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Requeue every dead-lettered operation with a fresh retry budget
    RetryDead,

    /// Delete completed operations
    ClearCompleted,

    /// Return operations left in progress by a crash to pending
    Recover,
}

#[derive(Args)]
pub struct ScopesArgs {
    #[command(subcommand)]
    pub command: ScopesCommands,
}

/// Scope metadata subcommands.
#[derive(Subcommand)]
pub enum ScopesCommands {
    /// List pull metadata for every scope
    List,

    /// Delete a scope's metadata so the next pull is a full sync
    ///
    /// Example: commentsync scopes reset channel:UC123
    Reset {
        /// Scope key, e.g. `channel:UC123` or `video:abc`
        key: String,
    },
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_queue_list() {
        let cli = Cli::parse_from(["commentsync", "-o", "json", "queue", "list", "-s", "dead_letter", "-n", "5"]);
        assert_eq!(cli.output, Some(OutputFormat::Json));
        match cli.command {
            Commands::Queue(QueueArgs {
                command: QueueCommands::List { status, limit },
            }) => {
                assert_eq!(status.as_deref(), Some("dead_letter"));
                assert_eq!(limit, 5);
            }
            _ => panic!("expected queue list"),
        }
    }

    #[test]
    fn test_output_is_global() {
        let cli = Cli::parse_from(["commentsync", "scopes", "list", "--output", "json"]);
        assert_eq!(cli.output, Some(OutputFormat::Json));
    }
}

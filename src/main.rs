use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use commentsync::cli::args::{Cli, Commands};
use commentsync::cli::commands;
use commentsync::config::{ColorSetting, Config, Paths};
use commentsync::storage::Database;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_env("COMMENTSYNC_LOG")
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_db(paths: &Paths) -> Result<Database> {
    paths.ensure_dirs()?;
    Database::open_at(&paths.database)
        .with_context(|| format!("opening {}", paths.database.display()))
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = Paths::new()?;
    let config = Config::load_from_path(&paths.config_file)?;
    config.validate()?;

    init_logging(&config);
    match config.general.color {
        ColorSetting::Always => colored::control::set_override(true),
        ColorSetting::Never => colored::control::set_override(false),
        ColorSetting::Auto => {}
    }

    let format = cli.output.unwrap_or(config.general.default_output);
    let output = match cli.command {
        Commands::Config(args) => commands::config(&paths, &config, args.command, format)?,
        Commands::Completions { shell } => commands::completions(shell)?,
        Commands::Status => commands::status(&open_db(&paths)?, &config, format)?,
        Commands::Queue(args) => commands::queue(&open_db(&paths)?, &config, args.command, format)?,
        Commands::Scopes(args) => commands::scopes(&open_db(&paths)?, args.command, format)?,
        Commands::Conflicts => commands::conflicts(&open_db(&paths)?, format)?,
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

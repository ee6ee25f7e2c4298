//! LoadRun CLI
//!
//! Command-line interface for the LoadRun durable storage layer.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use loadrun_core::{Config, Persistence, Platform};

mod commands;
mod output;

use commands::store::AliasArgs;
use output::{Output, OutputFormat};

/// Environment variable holding the log filter
const LOG_ENV: &str = "LOADRUN_LOG";

#[derive(Parser)]
#[command(name = "loadrun")]
#[command(about = "LoadRun - redundant local storage with fallback")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (defaults to ~/.config/loadrun/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured platform (native, web)
    #[arg(long, global = true)]
    platform: Option<Platform>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a value (JSON, or a plain string) under a key
    Save {
        /// Logical key
        key: String,
        /// Value to store
        value: String,
        #[command(flatten)]
        aliases: AliasOpts,
    },
    /// Load the value stored under a key
    Load {
        /// Logical key
        key: String,
        #[command(flatten)]
        aliases: AliasOpts,
    },
    /// Delete a key and its aliases from every store
    #[command(alias = "rm")]
    Clear {
        /// Logical key
        key: String,
        #[command(flatten)]
        aliases: AliasOpts,
    },
    /// Report which stores accept writes
    Probe,
    /// Delete aliases older than the retention window
    Gc,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone, Default)]
struct AliasOpts {
    /// Additional alias key (repeatable)
    #[arg(short, long = "alias")]
    alias: Vec<String>,

    /// User id used to derive alias keys
    #[arg(short, long)]
    user: Option<String>,

    /// User role used to derive alias keys
    #[arg(short, long)]
    role: Option<String>,
}

impl From<AliasOpts> for AliasArgs {
    fn from(opts: AliasOpts) -> Self {
        AliasArgs {
            aliases: opts.alias,
            user: opts.user,
            role: opts.role,
        }
    }
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, platform, compression_enabled, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands work on the file, not the stores
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let mut config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    if let Some(platform) = cli.platform {
        config.platform = platform;
    }
    init_logging(&config);

    let persistence =
        Persistence::from_config(&config).context("Failed to initialize storage")?;
    debug!(
        "Storage ready: platform {}, {} backend(s)",
        config.platform,
        persistence.backends().len()
    );

    match cli.command {
        Commands::Save {
            key,
            value,
            aliases,
        } => commands::store::save(&persistence, key, value, aliases.into(), &output).await,
        Commands::Load { key, aliases } => {
            commands::store::load(&persistence, key, aliases.into(), &output).await
        }
        Commands::Clear { key, aliases } => {
            commands::store::clear(&persistence, key, aliases.into(), &output).await
        }
        Commands::Probe => commands::health::probe(&persistence, &output).await,
        Commands::Gc => commands::health::gc(&persistence, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize logging to stderr, or to the configured log file
///
/// The filter comes from LOADRUN_LOG, defaulting to warnings only.
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new("loadrun_core=warn,loadrun_cli=warn"));

    let Some(ref log_path) = config.log_file else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init();
        return;
    };

    let log_file = match File::options().create(true).append(true).open(log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            return;
        }
    };

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();
}

//! Config command handlers

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use loadrun_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, platform, log_file, enable_web_fallbacks, \
     enable_object_database, enable_multiple_backups, compression_enabled, max_aliases, \
     alias_retention_days, session_quota_bytes";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "platform": config.platform,
                    "log_file": config.log_file,
                    "storage": config.storage,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            let storage = &config.storage;
            println!("Configuration:");
            println!("  data_dir:                {}", config.data_dir.display());
            println!("  platform:                {}", config.platform);
            println!(
                "  log_file:                {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Storage:");
            println!("  enable_web_fallbacks:    {}", storage.enable_web_fallbacks);
            println!("  enable_object_database:  {}", storage.enable_object_database);
            println!("  enable_multiple_backups: {}", storage.enable_multiple_backups);
            println!("  compression_enabled:     {}", storage.compression_enabled);
            println!("  max_aliases:             {}", storage.max_aliases);
            println!(
                "  alias_retention_days:    {}",
                optional(storage.alias_retention_days)
            );
            println!(
                "  session_quota_bytes:     {}",
                optional(storage.session_quota_bytes)
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    apply(&mut config, &key, &value)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

/// Apply one `key = value` assignment to a configuration
fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let storage = &mut config.storage;
    match key {
        "data_dir" => config.data_dir = value.into(),
        "platform" => config.platform = value.parse()?,
        "log_file" => {
            config.log_file = if is_unset(value) {
                None
            } else {
                Some(value.into())
            };
        }
        "enable_web_fallbacks" => storage.enable_web_fallbacks = parse(key, value)?,
        "enable_object_database" => storage.enable_object_database = parse(key, value)?,
        "enable_multiple_backups" => storage.enable_multiple_backups = parse(key, value)?,
        "compression_enabled" => storage.compression_enabled = parse(key, value)?,
        "max_aliases" => storage.max_aliases = parse(key, value)?,
        "alias_retention_days" => storage.alias_retention_days = parse_optional(key, value)?,
        "session_quota_bytes" => storage.session_quota_bytes = parse_optional(key, value)?,
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

fn is_unset(value: &str) -> bool {
    value.is_empty() || value == "none"
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid value for {}: '{}'", key, value))
}

fn parse_optional<T>(key: &str, value: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if is_unset(value) {
        return Ok(None);
    }
    parse(key, value).map(Some)
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}

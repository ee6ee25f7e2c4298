//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use loadrun_core::{GcReport, HealthReport, Loaded, StorageResult};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print per-attempt results of a save or clear
    pub fn print_results(&self, action: &str, key: &str, results: &[StorageResult], ok: bool) {
        let successes = results.iter().filter(|r| r.success).count();
        match self.format {
            OutputFormat::Human => {
                for result in results {
                    let mark = if result.success { "✓" } else { "✗" };
                    match result.error {
                        Some(ref error) => println!(
                            "{} {:<10} {} ({})",
                            mark,
                            result.backend,
                            truncate(&result.key, 50),
                            error
                        ),
                        None => println!(
                            "{} {:<10} {}",
                            mark,
                            result.backend,
                            truncate(&result.key, 50)
                        ),
                    }
                }
                println!();
                println!(
                    "{} '{}': {}/{} succeeded ({})",
                    action,
                    key,
                    successes,
                    results.len(),
                    if ok { "ok" } else { "below threshold" }
                );
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "key": key,
                "success": ok,
                "succeeded": successes,
                "attempted": results.len(),
                "results": results,
            })),
            OutputFormat::Quiet => {
                println!("{}/{}", successes, results.len());
            }
        }
    }

    /// Print a loaded value, or its absence
    pub fn print_loaded(&self, key: &str, loaded: Option<&Loaded<serde_json::Value>>) {
        match (self.format, loaded) {
            (OutputFormat::Human, Some(loaded)) => {
                println!("Key:     {}", key);
                println!(
                    "Source:  {} ({})",
                    loaded.source.backend, loaded.source.key
                );
                println!("Value:");
                println!("{}", pretty(&loaded.data));
            }
            (OutputFormat::Human, None) => {
                println!("No data stored for '{}'.", key);
            }
            (OutputFormat::Json, loaded) => print_json(&serde_json::json!({
                "key": key,
                "found": loaded.is_some(),
                "data": loaded.map(|l| &l.data),
                "source": loaded.map(|l| &l.source),
            })),
            (OutputFormat::Quiet, Some(loaded)) => {
                println!("{}", loaded.data);
            }
            (OutputFormat::Quiet, None) => {}
        }
    }

    /// Print a health report
    pub fn print_health(&self, report: &HealthReport) {
        match self.format {
            OutputFormat::Human => {
                println!("Storage Health");
                println!("==============");
                println!();
                println!("Platform: {}", report.platform);
                println!();
                for backend in &report.backends {
                    let status = if backend.available {
                        "available"
                    } else {
                        "unavailable"
                    };
                    match backend.error {
                        Some(ref error) => {
                            println!("  {:<10} {} ({})", backend.backend, status, error)
                        }
                        None => println!("  {:<10} {}", backend.backend, status),
                    }
                }
                println!();
                println!(
                    "{} of {} backend(s) available",
                    report.total_capabilities,
                    report.backends.len()
                );
            }
            OutputFormat::Json => print_json(report),
            OutputFormat::Quiet => {
                println!("{}", report.total_capabilities);
            }
        }
    }

    /// Print a garbage collection report
    pub fn print_gc(&self, report: &GcReport, retention_days: Option<u32>) {
        match self.format {
            OutputFormat::Human => {
                let Some(days) = retention_days else {
                    println!("Alias retention is not configured; nothing to collect.");
                    println!("Enable it with: loadrun config set alias_retention_days 30");
                    return;
                };
                println!("Alias retention: {} day(s)", days);
                println!("  Tracked: {}", report.examined);
                println!("  Removed: {}", report.removed);
                if report.released > 0 {
                    println!("  Kept:    {} (still written under another key)", report.released);
                }
                if report.failed > 0 {
                    println!("  Failed:  {} (will retry next run)", report.failed);
                }
            }
            OutputFormat::Json => print_json(report),
            OutputFormat::Quiet => {
                println!("{}", report.removed);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to format JSON output: {}", e),
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

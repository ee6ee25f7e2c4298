//! Probe and garbage collection command handlers

use anyhow::Result;
use chrono::Utc;

use loadrun_core::Persistence;

use crate::output::Output;

/// Probe every backend and print availability
pub async fn probe(persistence: &Persistence, output: &Output) -> Result<()> {
    let report = persistence.probe().await;
    output.print_health(&report);
    Ok(())
}

/// Collect stale aliases
pub async fn gc(persistence: &Persistence, output: &Output) -> Result<()> {
    let report = persistence.collect_garbage(Utc::now()).await;
    output.print_gc(&report, persistence.options().alias_retention_days);
    Ok(())
}

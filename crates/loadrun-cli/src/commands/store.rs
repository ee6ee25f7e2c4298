//! Save, load and clear command handlers

use anyhow::{bail, Result};

use loadrun_core::{is_overall_success, Loaded, Persistence, UserContext};

use crate::output::Output;

/// Alias selection shared by save/load/clear
#[derive(Debug, Clone, Default)]
pub struct AliasArgs {
    /// Explicit alias keys
    pub aliases: Vec<String>,
    /// User id for derived aliases
    pub user: Option<String>,
    /// Role for derived aliases
    pub role: Option<String>,
}

impl AliasArgs {
    /// Derived aliases (when a user or role is given) followed by explicit ones
    pub fn resolve(&self, persistence: &Persistence, key: &str) -> Vec<String> {
        let mut keys = Vec::new();

        if self.user.is_some() || self.role.is_some() {
            let user = UserContext::new(
                self.user.clone().unwrap_or_default(),
                self.role.clone().unwrap_or_default(),
            );
            keys.extend(persistence.key_derivation().derive(key, &user));
        }

        for alias in &self.aliases {
            if alias != key && !keys.contains(alias) {
                keys.push(alias.clone());
            }
        }
        keys
    }
}

/// Parse a command-line value as JSON, falling back to a plain string
pub fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Save a value; fails when fewer than half of the writes land
pub async fn save(
    persistence: &Persistence,
    key: String,
    value: String,
    aliases: AliasArgs,
    output: &Output,
) -> Result<()> {
    let alias_keys = aliases.resolve(persistence, &key);
    let data = parse_value(&value);

    let results = persistence.save(&key, &data, &alias_keys).await;
    let ok = is_overall_success(&results);
    output.print_results("Saved", &key, &results, ok);

    if !ok {
        bail!(
            "Save of '{}' did not reach the success threshold ({} of {} writes failed)",
            key,
            results.iter().filter(|r| !r.success).count(),
            results.len()
        );
    }
    Ok(())
}

/// Load a value; absence is reported, not an error
pub async fn load(
    persistence: &Persistence,
    key: String,
    aliases: AliasArgs,
    output: &Output,
) -> Result<()> {
    let alias_keys = aliases.resolve(persistence, &key);
    let loaded: Option<Loaded<serde_json::Value>> = persistence.load(&key, &alias_keys).await;
    output.print_loaded(&key, loaded.as_ref());
    Ok(())
}

/// Clear a value and its aliases
pub async fn clear(
    persistence: &Persistence,
    key: String,
    aliases: AliasArgs,
    output: &Output,
) -> Result<()> {
    let alias_keys = aliases.resolve(persistence, &key);
    let results = persistence.clear(&key, &alias_keys).await;
    let ok = is_overall_success(&results);
    output.print_results("Cleared", &key, &results, ok);
    Ok(())
}

//! Alias key derivation
//!
//! Spreads one logical key over several physical keys so a value survives
//! the loss of any single one. Aliases are deterministic for a given user,
//! role, platform and UTC day, which lets a later load find them again.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Platform;

/// Identity the aliases are scoped to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub role: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
        }
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Derives alias keys for a logical key
#[derive(Clone)]
pub struct KeyDerivation {
    platform: Platform,
    max_aliases: usize,
    clock: Clock,
}

impl fmt::Debug for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDerivation")
            .field("platform", &self.platform)
            .field("max_aliases", &self.max_aliases)
            .finish()
    }
}

impl KeyDerivation {
    pub fn new(platform: Platform, max_aliases: usize) -> Self {
        Self {
            platform,
            max_aliases,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock (for deterministic tests)
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn max_aliases(&self) -> usize {
        self.max_aliases
    }

    /// Current time according to the derivation clock
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Alias keys for `key`, most specific first
    ///
    /// Never contains `key` itself and never contains duplicates. Empty user
    /// id or role components are skipped.
    pub fn derive(&self, key: &str, user: &UserContext) -> Vec<String> {
        let user_id = user.user_id.trim();
        let role = user.role.trim();

        let mut candidates = Vec::with_capacity(6);
        if !user_id.is_empty() {
            candidates.push(format!("{}:user:{}", key, user_id));
        }
        if !role.is_empty() {
            candidates.push(format!("{}:role:{}", key, role));
        }
        candidates.push(format!("{}:platform:{}", key, self.platform));
        if !user_id.is_empty() && !role.is_empty() {
            candidates.push(format!("{}:user:{}:{}", key, user_id, role));
        }
        candidates.push(format!("{}:backup", key));
        candidates.push(format!("{}:day:{}", key, self.now().format("%Y-%m-%d")));

        let mut aliases: Vec<String> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate != key && !aliases.contains(&candidate) {
                aliases.push(candidate);
            }
        }
        aliases.truncate(self.max_aliases);
        aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> KeyDerivation {
        KeyDerivation::new(Platform::Web, 6)
            .with_clock(|| Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 0).unwrap())
    }

    #[test]
    fn test_full_alias_order() {
        let aliases = fixed().derive("profile", &UserContext::new("u42", "driver"));
        assert_eq!(
            aliases,
            vec![
                "profile:user:u42",
                "profile:role:driver",
                "profile:platform:web",
                "profile:user:u42:driver",
                "profile:backup",
                "profile:day:2026-03-14",
            ]
        );
    }

    #[test]
    fn test_missing_identity_parts_are_skipped() {
        let aliases = fixed().derive("session", &UserContext::default());
        assert_eq!(
            aliases,
            vec![
                "session:platform:web",
                "session:backup",
                "session:day:2026-03-14",
            ]
        );
    }

    #[test]
    fn test_truncated_to_max_aliases() {
        let derivation = KeyDerivation::new(Platform::Native, 2);
        let aliases = derivation.derive("wallet", &UserContext::new("u1", "shipper"));
        assert_eq!(aliases, vec!["wallet:user:u1", "wallet:role:shipper"]);

        let none = KeyDerivation::new(Platform::Native, 0);
        assert!(none.derive("wallet", &UserContext::new("u1", "shipper")).is_empty());
    }

    #[test]
    fn test_deterministic_for_same_day() {
        let derivation = fixed();
        let user = UserContext::new("u1", "driver");
        assert_eq!(derivation.derive("k", &user), derivation.derive("k", &user));
    }
}

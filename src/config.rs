//! Configuration types.

use std::time::Duration;

/// Alert engine configuration.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Path of the persisted rule set.
    pub rules_path: String,
    /// Timeout applied around each notification dispatch.
    pub dispatch_timeout: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            rules_path: "./rules.json".to_string(),
            dispatch_timeout: Duration::from_secs(30),
        }
    }
}

impl AlertConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rules_path: std::env::var("ALERT_RULES_PATH").unwrap_or(defaults.rules_path),
            dispatch_timeout: std::env::var("ALERT_DISPATCH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.dispatch_timeout),
        }
    }
}

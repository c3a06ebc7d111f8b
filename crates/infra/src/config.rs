//! Deployment configuration.
//!
//! Read from an optional `depot.toml` and `DEPOT_`-prefixed environment variables
//! (`DEPOT_COST_POLICY`, `DEPOT_DRAFT_TTL_SECS`, `DEPOT_LOG_FILTER`,
//! `DEPOT_SEED_OPENING_QUANTITY`); the environment wins over the file.

use std::collections::HashMap;
use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use depot_inventory::CostPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "depot.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DepotConfig {
    /// Fixed per deployment; stock recorded under another policy is refused at startup.
    pub cost_policy: CostPolicy,
    /// Idle drafts older than this are discarded.
    pub draft_ttl_secs: u64,
    pub log_filter: String,
    /// Seed demo counterparties and items on an empty store, each priced item with
    /// an opening lot of this many units. Zero disables seeding.
    pub seed_opening_quantity: u64,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            cost_policy: CostPolicy::Fifo,
            draft_ttl_secs: 3600,
            log_filter: "info".to_string(),
            seed_opening_quantity: 0,
        }
    }
}

impl DepotConfig {
    /// Load `depot.toml` from the working directory plus the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// `env` replaces the process environment when given.
    pub fn load_with_env<P: AsRef<Path>>(
        path: P,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let builder = Config::builder()
            .set_default("cost_policy", defaults.cost_policy.as_str())?
            .set_default("draft_ttl_secs", defaults.draft_ttl_secs)?
            .set_default("log_filter", defaults.log_filter)?
            .set_default("seed_opening_quantity", defaults.seed_opening_quantity)?
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("DEPOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            );

        let config: DepotConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn draft_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.draft_ttl_secs).unwrap_or(i64::MAX))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.draft_ttl_secs == 0 {
            return Err(ConfigError::Invalid("draft_ttl_secs must be positive".to_string()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_apply_without_file_or_environment() {
        let config = DepotConfig::load_with_env("does-not-exist.toml", env(&[])).unwrap();
        assert_eq!(config, DepotConfig::default());
        assert_eq!(config.draft_ttl(), chrono::Duration::hours(1));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = DepotConfig::load_with_env(
            "does-not-exist.toml",
            env(&[
                ("DEPOT_COST_POLICY", "weighted_average"),
                ("DEPOT_DRAFT_TTL_SECS", "90"),
                ("DEPOT_LOG_FILTER", "depot=debug"),
                ("DEPOT_SEED_OPENING_QUANTITY", "100"),
            ]),
        )
        .unwrap();

        assert_eq!(config.cost_policy, CostPolicy::WeightedAverage);
        assert_eq!(config.draft_ttl_secs, 90);
        assert_eq!(config.log_filter, "depot=debug");
        assert_eq!(config.seed_opening_quantity, 100);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = DepotConfig::load_with_env("does-not-exist.toml", env(&[("DEPOT_COST_POLICY", "lifo")]));
        assert!(matches!(err, Err(ConfigError::Load(_))));
    }

    #[test]
    fn zero_ttl_is_invalid() {
        let err = DepotConfig::load_with_env("does-not-exist.toml", env(&[("DEPOT_DRAFT_TTL_SECS", "0")]));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }
}

//! Layered configuration: defaults, optional `invoicely.toml`, then
//! `INVOICELY__*` environment variables (a `.env` file is read first).

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Seconds between recurring generation runs.
    pub recurring_tick_secs: u64,
    /// Due date offset of generated invoices.
    pub generated_due_days: u32,
    /// Share link lifetime when the caller does not pick one.
    pub share_token_days: i64,
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            recurring_tick_secs: 3600,
            generated_due_days: 14,
            share_token_days: 30,
            log_filter: "info".to_string(),
        }
    }
}

impl BillingConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("invoicely").required(false))
            .add_source(
                Environment::with_prefix("INVOICELY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    /// Deserialize an already built source stack. Missing keys keep defaults.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.recurring_tick_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.recurring_tick_secs == 0 {
            return Err(ConfigError::Message(
                "recurring_tick_secs must be greater than zero".to_string(),
            ));
        }
        if self.share_token_days < 1 {
            return Err(ConfigError::Message(
                "share_token_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_yield_defaults() {
        let config = Config::builder().build().unwrap();
        assert_eq!(BillingConfig::from_config(config).unwrap(), BillingConfig::default());
    }

    #[test]
    fn overrides_replace_single_keys() {
        let config = Config::builder()
            .set_override("generated_due_days", 30)
            .unwrap()
            .set_override("log_filter", "debug")
            .unwrap()
            .build()
            .unwrap();

        let loaded = BillingConfig::from_config(config).unwrap();
        assert_eq!(loaded.generated_due_days, 30);
        assert_eq!(loaded.log_filter, "debug");
        assert_eq!(loaded.recurring_tick_secs, 3600);
    }

    #[test]
    fn zero_tick_is_rejected() {
        let config = Config::builder()
            .set_override("recurring_tick_secs", 0)
            .unwrap()
            .build()
            .unwrap();
        assert!(BillingConfig::from_config(config).is_err());
    }
}

//! Engine configuration.
//!
//! Supports layered loading:
//! 1. Default values in code
//! 2. Optional `config/stockledger.{toml,yaml,json}` file
//! 3. Environment variable overrides with `STOCKLEDGER__` prefix (`.env` honoured)

use std::time::Duration;

use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use stockledger_ledger::MAX_PAGE_LIMIT;
use stockledger_observability::LogFormat;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Bounded wait for one attempt at acquiring a document's product locks.
    pub lock_timeout_ms: u64,

    /// Attempts before a document fails with `Busy`.
    pub lock_retry_attempts: u32,

    /// Minimum stock threshold for products created without one.
    pub default_minimum_stock: i64,

    /// Period of the background low-stock sweep.
    pub sweep_interval_secs: u64,

    /// Default page size for movement history.
    pub movement_page_limit: u32,

    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 250,
            lock_retry_attempts: 3,
            default_minimum_stock: 5,
            sweep_interval_secs: 300,
            movement_page_limit: 100,
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    /// Load configuration from files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_from(Environment::with_prefix("STOCKLEDGER").separator("__"))
    }

    fn load_from(env: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Config::builder()
            .set_default("lock_timeout_ms", defaults.lock_timeout_ms)?
            .set_default("lock_retry_attempts", defaults.lock_retry_attempts)?
            .set_default("default_minimum_stock", defaults.default_minimum_stock)?
            .set_default("sweep_interval_secs", defaults.sweep_interval_secs)?
            .set_default("movement_page_limit", defaults.movement_page_limit)?
            .set_default("log_format", "json")?
            .add_source(File::with_name("config/stockledger").required(false))
            .add_source(env.try_parsing(true))
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_retry_attempts == 0 {
            return Err(ConfigError::Message("lock_retry_attempts must be at least 1".into()));
        }
        if self.default_minimum_stock < 0 {
            return Err(ConfigError::Message("default_minimum_stock cannot be negative".into()));
        }
        if self.movement_page_limit == 0 || self.movement_page_limit > MAX_PAGE_LIMIT {
            return Err(ConfigError::Message(format!(
                "movement_page_limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Message("sweep_interval_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Install the process-wide subscriber in the configured format.
    pub fn init_logging(&self) {
        stockledger_observability::init(self.log_format);
    }
}

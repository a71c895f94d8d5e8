//! Service configuration.
//!
//! Loaded from a TOML (or JSON) file, then overridden from the environment
//! for secrets. Every section has defaults, so an empty file is valid.

use crate::retry::{BackoffStrategy, RetryPolicy};
use crate::telemetry::LogFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use turbo_commerce::{Currency, Money};

/// Environment variable overriding `gateway.key_id`.
pub const ENV_GATEWAY_KEY_ID: &str = "SHOP_GATEWAY_KEY_ID";
/// Environment variable overriding `gateway.key_secret`.
pub const ENV_GATEWAY_KEY_SECRET: &str = "SHOP_GATEWAY_KEY_SECRET";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "SHOP_LOG_LEVEL";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or written.
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parse failure.
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML render failure.
    #[error("failed to render TOML config: {0}")]
    TomlRender(#[from] toml::ser::Error),

    /// JSON parse or render failure.
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// Values that parse but make no sense.
    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopConfig {
    #[serde(default)]
    pub reservation: ReservationConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Reservation lifetime and sweeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationConfig {
    /// Seconds a cart line holds its units.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Seconds between sweeper passes.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    turbo_commerce::cart::RESERVATION_TTL_SECS as u64
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Checkout rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Store currency.
    #[serde(default)]
    pub currency: Currency,

    /// Cash on delivery ceiling, in major units.
    #[serde(default = "default_cod_limit")]
    pub cod_limit: i64,

    /// Per-line quantity cap.
    #[serde(default = "default_max_quantity")]
    pub max_quantity_per_line: i64,
}

fn default_cod_limit() -> i64 {
    turbo_commerce::checkout::COD_LIMIT_MAJOR
}

fn default_max_quantity() -> i64 {
    turbo_commerce::cart::MAX_QUANTITY_PER_ITEM
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: Currency::default(),
            cod_limit: default_cod_limit(),
            max_quantity_per_line: default_max_quantity(),
        }
    }
}

/// Payment gateway connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// API base URL. Gateway payments are disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub key_id: String,

    /// Also the HMAC key for payment signatures.
    #[serde(default)]
    pub key_secret: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            key_id: String::new(),
            key_secret: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Conflict retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    5
}

fn default_max_delay_ms() -> u64 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Session mirror of cart summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a mirrored summary stays readable.
    #[serde(default = "default_summary_ttl_secs")]
    pub summary_ttl_secs: u64,
}

fn default_summary_ttl_secs() -> u64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            summary_ttl_secs: default_summary_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// redb database file. Commands run against an in-memory store when
    /// unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Result of [`ShopConfig::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ShopConfig {
    /// Load config from a file. `.json` files are read as JSON, anything
    /// else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if is_json(path) {
            Ok(serde_json::from_str(&content)?)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save config to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            self.to_toml_string()?
        };
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup` (an environment stand-in).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key_id) = lookup(ENV_GATEWAY_KEY_ID) {
            self.gateway.key_id = key_id;
        }
        if let Some(secret) = lookup(ENV_GATEWAY_KEY_SECRET) {
            self.gateway.key_secret = secret;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        self
    }

    /// Check values, splitting hard errors from warnings.
    pub fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        if self.reservation.ttl_secs == 0 {
            report.errors.push("reservation.ttl_secs must be positive".into());
        }
        if self.reservation.sweep_interval_secs == 0 {
            report
                .errors
                .push("reservation.sweep_interval_secs must be positive".into());
        } else if self.reservation.sweep_interval_secs > self.reservation.ttl_secs {
            report.warnings.push(format!(
                "reservation.sweep_interval_secs ({}) exceeds ttl_secs ({}); expired units may be held for up to {}s",
                self.reservation.sweep_interval_secs,
                self.reservation.ttl_secs,
                self.reservation.ttl_secs + self.reservation.sweep_interval_secs,
            ));
        }
        if self.checkout.cod_limit < 0 {
            report.errors.push("checkout.cod_limit must not be negative".into());
        }
        if self.checkout.max_quantity_per_line < 1 {
            report
                .errors
                .push("checkout.max_quantity_per_line must be at least 1".into());
        }
        if self.retry.max_attempts == 0 {
            report.errors.push("retry.max_attempts must be at least 1".into());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            report
                .warnings
                .push("retry.base_delay_ms exceeds retry.max_delay_ms".into());
        }
        if self.cache.summary_ttl_secs > self.reservation.ttl_secs {
            report.warnings.push(
                "cache.summary_ttl_secs exceeds the reservation TTL; mirrored carts may show expired lines".into(),
            );
        }

        match &self.gateway.base_url {
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                report
                    .errors
                    .push(format!("gateway.base_url is not an http(s) URL: {url}"));
            }
            Some(_) if self.gateway.key_secret.is_empty() => {
                report.errors.push(format!(
                    "gateway.key_secret is empty; set it in the file or {ENV_GATEWAY_KEY_SECRET}"
                ));
            }
            Some(_) => {}
            None => report
                .warnings
                .push("gateway.base_url is unset; gateway payments are disabled".into()),
        }

        report
    }

    /// Fail on any validation error.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let report = self.validate();
        if report.is_ok() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(report.errors))
        }
    }

    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation.ttl_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.reservation.sweep_interval_secs)
    }

    pub fn summary_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.summary_ttl_secs)
    }

    pub fn cod_limit(&self) -> Money {
        Money::from_major(self.checkout.cod_limit, self.checkout.currency)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_attempts).with_backoff(BackoffStrategy::Exponential {
            base: Duration::from_millis(self.retry.base_delay_ms),
            max: Duration::from_millis(self.retry.max_delay_ms),
        })
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

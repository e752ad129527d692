use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const CONFIG_DIR: &str = "config";

/// Payment-rail configuration. Expiry windows drive the stale-payment sweep;
/// chain windows are longer than the card window because of block-time
/// variance.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentsConfig {
    /// Secret key for the card processor.
    #[serde(default)]
    pub card_secret_key: String,
    /// Base URL of the card processor REST API.
    #[serde(default = "default_card_api_url")]
    pub card_api_url: String,

    #[serde(default = "default_solana_rpc_url")]
    pub solana_rpc_url: String,
    /// Receiving wallet for Solana payments.
    #[serde(default)]
    pub solana_wallet: String,

    /// Esplora-style Bitcoin block explorer API.
    #[serde(default = "default_bitcoin_api_url")]
    pub bitcoin_api_url: String,
    #[serde(default)]
    pub bitcoin_wallet: String,

    #[serde(default = "default_ethereum_rpc_url")]
    pub ethereum_rpc_url: String,
    #[serde(default)]
    pub ethereum_wallet: String,

    /// How long a card intent may sit unpaid before the sweep fails it.
    #[serde(default = "default_card_expiry_secs")]
    pub card_expiry_secs: u64,
    /// How long a chain payment may sit unconfirmed before the sweep fails it.
    #[serde(default = "default_chain_expiry_secs")]
    pub chain_expiry_secs: u64,

    /// Bounded retry for transient rail failures.
    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_rail_retry_attempts")]
    pub rail_retry_attempts: u32,
    #[serde(default = "default_rail_retry_base_ms")]
    pub rail_retry_base_ms: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// How long a pending booking whose payments all ended terminally may
    /// wait for a retry before the sweep releases its slot.
    #[serde(default = "default_booking_grace_secs")]
    pub booking_grace_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            card_secret_key: String::new(),
            card_api_url: default_card_api_url(),
            solana_rpc_url: default_solana_rpc_url(),
            solana_wallet: String::new(),
            bitcoin_api_url: default_bitcoin_api_url(),
            bitcoin_wallet: String::new(),
            ethereum_rpc_url: default_ethereum_rpc_url(),
            ethereum_wallet: String::new(),
            card_expiry_secs: default_card_expiry_secs(),
            chain_expiry_secs: default_chain_expiry_secs(),
            rail_retry_attempts: default_rail_retry_attempts(),
            rail_retry_base_ms: default_rail_retry_base_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            booking_grace_secs: default_booking_grace_secs(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL.
    pub database_url: String,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Run pending migrations on startup.
    #[serde(default)]
    pub auto_migrate: bool,

    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    /// development | test | production
    pub environment: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,

    /// Allowed CORS origins, comma separated. Empty means permissive (dev).
    #[serde(default)]
    pub cors_origins: Option<String>,

    #[serde(default)]
    #[validate]
    pub payments: PaymentsConfig,
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            auto_migrate: false,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            cors_origins: None,
            payments: PaymentsConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn default_card_api_url() -> String {
    "https://api.stripe.com/v1".to_string()
}
fn default_solana_rpc_url() -> String {
    "https://api.devnet.solana.com".to_string()
}
fn default_bitcoin_api_url() -> String {
    "https://blockstream.info/api".to_string()
}
fn default_ethereum_rpc_url() -> String {
    "https://eth-sepolia.g.alchemy.com/v2/demo".to_string()
}
fn default_card_expiry_secs() -> u64 {
    15 * 60
}
fn default_chain_expiry_secs() -> u64 {
    2 * 60 * 60
}
fn default_rail_retry_attempts() -> u32 {
    3
}
fn default_rail_retry_base_ms() -> u64 {
    250
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_booking_grace_secs() -> u64 {
    2 * 60 * 60
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Load configuration from `config/default`, an environment-specific file,
/// then `APP__`-prefixed environment variables, in increasing precedence.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://tourbook.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if app_config.is_production() && app_config.payments.card_secret_key.is_empty() {
        error!("card_secret_key must be configured in production (APP__PAYMENTS__CARD_SECRET_KEY)");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        );
        assert!(!cfg.is_production());
        assert!(cfg.payments.card_expiry_secs < cfg.payments.chain_expiry_secs);
        assert!(cfg.payments.rail_retry_attempts >= 1);
    }
}

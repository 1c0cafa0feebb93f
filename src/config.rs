use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::money::STORAGE_DECIMALS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid config {path}: {reason}")]
    Invalid { path: String, reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL (`DATABASE_URL` overrides it)
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_postgres_pool_size")]
    pub postgres_pool_size: u32,
    /// HS256 secret of the auth service that issues user tokens (`JWT_SECRET` overrides it)
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    pub currency: String,
    /// Fractional digits accepted from clients
    pub decimals: u32,
    /// Purchases priced below this are rejected
    #[serde(default = "default_min_price")]
    pub min_price: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            decimals: 2,
            min_price: default_min_price(),
        }
    }
}

/// Provider costs before markup. Keys are service codes, `default` is the fallback.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PricingConfig {
    pub markup_percent: Decimal,
    pub activation_costs: HashMap<String, Decimal>,
    pub rental_hourly_costs: HashMap<String, Decimal>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            markup_percent: Decimal::from(30),
            activation_costs: HashMap::from([("default".to_string(), Decimal::new(50, 2))]),
            rental_hourly_costs: HashMap::from([("default".to_string(), Decimal::new(10, 2))]),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkersConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub poll_batch_size: i64,
    pub poll_concurrency: usize,
    pub scan_interval_secs: u64,
    pub stale_threshold_secs: u64,
    pub recovery_batch_size: i64,
    pub reconcile_interval_secs: u64,
    pub reconcile_auto_apply: bool,
    /// Lifetime of an activation when the provider does not report one
    pub activation_ttl_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 5,
            poll_batch_size: 200,
            poll_concurrency: 16,
            scan_interval_secs: 30,
            stale_threshold_secs: 120,
            recovery_batch_size: 100,
            reconcile_interval_secs: 3600,
            reconcile_auto_apply: false,
            activation_ttl_secs: 20 * 60,
        }
    }
}

impl WorkersConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn activation_ttl(&self) -> Duration {
        Duration::from_secs(self.activation_ttl_secs)
    }
}

/// Credentials of one upstream SMS provider
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SandboxSettings {
    pub enabled: bool,
    /// Seconds before a sandbox number "receives" its code
    pub code_delay_secs: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            code_delay_secs: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub sms_activate: Option<ProviderSettings>,
    #[serde(default)]
    pub five_sim: Option<ProviderSettings>,
    #[serde(default)]
    pub smspva: Option<ProviderSettings>,
    #[serde(default)]
    pub onlinesim: Option<ProviderSettings>,
    #[serde(default)]
    pub sandbox: SandboxSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MoneyFusionSettings {
    /// Re-check every notification against the gateway before crediting
    #[serde(default = "default_true")]
    pub verify_remote: bool,
    #[serde(default = "default_moneyfusion_status_url")]
    pub status_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PayDunyaSettings {
    pub master_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WaveSettings {
    pub webhook_secret: String,
    /// Maximum age of a signed webhook
    #[serde(default = "default_wave_tolerance_secs")]
    pub tolerance_secs: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentsConfig {
    #[serde(default)]
    pub moneyfusion: Option<MoneyFusionSettings>,
    #[serde(default)]
    pub paydunya: Option<PayDunyaSettings>,
    #[serde(default)]
    pub wave: Option<WaveSettings>,
    /// Share of a referred user's first deposit credited to the referrer
    #[serde(default)]
    pub referral_bonus_percent: Decimal,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            moneyfusion: None,
            paydunya: None,
            wave: None,
            referral_bonus_percent: Decimal::ZERO,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_min_price() -> Decimal {
    Decimal::new(1, 2)
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_wave_tolerance_secs() -> i64 {
    300
}

fn default_moneyfusion_status_url() -> String {
    "https://www.pay.moneyfusion.net/paiementNotif".to_string()
}

fn default_postgres_pool_size() -> u32 {
    20
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?;
        config.validate().map_err(|reason| ConfigError::Invalid {
            path: config_path,
            reason,
        })?;
        Ok(config)
    }

    /// Settings the schema cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.ledger.decimals > STORAGE_DECIMALS {
            return Err(format!(
                "ledger.decimals {} exceeds the {} fractional digits the ledger stores",
                self.ledger.decimals, STORAGE_DECIMALS
            ));
        }
        Ok(())
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// `DATABASE_URL` wins over the file
    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.postgres_url.clone())
    }

    /// `JWT_SECRET` wins over the file
    pub fn jwt_secret(&self) -> Option<String> {
        std::env::var("JWT_SECRET")
            .ok()
            .or_else(|| self.jwt_secret.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: sms_ledger.log
use_json: false
rotation: daily
gateway:
  host: 0.0.0.0
  port: 8080
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.ledger.decimals, 2);
        assert_eq!(config.workers.stale_threshold(), Duration::from_secs(120));
        assert!(config.providers.sms_activate.is_none());
        assert!(config.providers.sandbox.enabled);
        assert_eq!(config.payments.referral_bonus_percent, Decimal::ZERO);
    }

    #[test]
    fn test_provider_and_pricing_sections() {
        let yaml = format!(
            "{MINIMAL}{}",
            r#"
pricing:
  markup_percent: "25"
  activation_costs:
    default: "0.40"
    wa: "0.90"
  rental_hourly_costs:
    default: "0.05"
providers:
  five_sim:
    api_key: secret
payments:
  wave:
    webhook_secret: wave_sn_test
  referral_bonus_percent: "5"
"#
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        let five_sim = config.providers.five_sim.unwrap();
        assert!(five_sim.enabled);
        assert_eq!(five_sim.timeout(), Duration::from_secs(30));
        assert_eq!(config.pricing.activation_costs["wa"], Decimal::new(90, 2));
        assert_eq!(config.payments.wave.unwrap().tolerance_secs, 300);
        assert_eq!(config.payments.referral_bonus_percent, Decimal::from(5));
    }

    #[test]
    fn test_decimals_beyond_storage_rejected() {
        let yaml = format!("{MINIMAL}ledger:\n  currency: USD\n  decimals: 6\n");
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert!(config.validate().unwrap_err().contains("ledger.decimals 6"));

        let yaml = format!("{MINIMAL}ledger:\n  currency: XOF\n  decimals: 4\n");
        assert!(AppConfig::from_yaml(&yaml).unwrap().validate().is_ok());
    }

    #[test]
    fn test_shipped_configs_parse() {
        for env in ["dev", "prod"] {
            let config = AppConfig::load(env).unwrap_or_else(|e| panic!("{env}: {e}"));
            assert_eq!(config.gateway.port, 8080);
            assert!(config.ledger.decimals <= STORAGE_DECIMALS);
        }
        assert!(matches!(
            AppConfig::load("missing"),
            Err(ConfigError::Read { .. })
        ));
    }
}

//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `METERCTL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `METERCTL_` override YAML values
//! 3. **Legacy variables** - `DATABASE_URL`, `API_KEY`, `ACCESS_TOKEN`, `COST_ON_INLET`,
//!    `INIT_BALANCE`, `DEFAULT_MODEL_*_PRICE`, `OPENWEBUI_DOMAIN` and `OPENWEBUI_API_KEY`
//!    are accepted unprefixed so existing deployments keep working
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `METERCTL_BALANCE__CEILING=1000` sets the `balance.ceiling` field.
//!
//! ## Inlet cost table
//!
//! `cost_on_inlet` is either a single number, used as the pre-charge for every model, or a
//! comma separated `model:price` list where the `default` key acts as the wildcard:
//!
//! ```bash
//! COST_ON_INLET=0.05
//! COST_ON_INLET="gpt-4:0.32,gpt-4o-mini:0.01,default:0.02"
//! ```
//!
//! The table is parsed once while the configuration is loaded. Entries that cannot be parsed are
//! skipped and reported at startup; they never fail a request.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::HashMap, fmt, str::FromStr, time::Duration};
use url::Url;

use crate::db::models::model_prices::Prices;
use crate::errors::Error;
use crate::types::ModelId;

/// Key in the inlet cost table that applies to every model without its own entry.
pub const DEFAULT_COST_KEY: &str = "default";

/// Unprefixed environment variables and the config keys they populate.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("DATABASE_URL", "database_url"),
    ("API_KEY", "api_key"),
    ("ACCESS_TOKEN", "access_token"),
    ("COST_ON_INLET", "cost_on_inlet"),
    ("INIT_BALANCE", "balance.initial_balance"),
    ("DEFAULT_MODEL_INPUT_PRICE", "pricing.default_input_price"),
    ("DEFAULT_MODEL_OUTPUT_PRICE", "pricing.default_output_price"),
    ("DEFAULT_MODEL_PER_MSG_PRICE", "pricing.default_per_msg_price"),
    ("OPENWEBUI_DOMAIN", "upstream.url"),
    ("OPENWEBUI_API_KEY", "upstream.api_key"),
];

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "METERCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Shorthand for `database.url`, usually populated from `DATABASE_URL`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// PostgreSQL connection settings
    pub database: DatabaseConfig,
    /// Bearer credential expected on the inlet/outlet service endpoints
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Bearer credential expected on administrative endpoints (price sync, users, backups)
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// Balance ledger settings
    pub balance: BalanceConfig,
    /// Prices assigned to models the first time they are seen
    pub pricing: PricingConfig,
    /// Flat pre-charge applied by the inlet, per model
    pub cost_on_inlet: InletCostTable,
    /// Upstream model catalog (OpenWebUI compatible) used to discover models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamConfig>,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Origins allowed to call the API from a browser
    pub cors_allowed_origins: Vec<String>,
}

/// Connection pool configuration with all SQLx parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Time before idle connections are closed (seconds, 0 = never)
    pub idle_timeout_secs: u64,
    /// Maximum lifetime of a connection (seconds, 0 = never)
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 0,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection string for the main database
    pub url: String,
    /// Connection pool settings
    pub pool: PoolSettings,
    /// Server-side timeout applied to every statement on every pooled connection
    #[serde(with = "humantime_serde")]
    pub statement_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/meterctl".to_string(),
            pool: PoolSettings::default(),
            statement_timeout: Duration::from_secs(10),
        }
    }
}

/// Balance ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BalanceConfig {
    /// Balance given to a user the first time they are seen
    pub initial_balance: Decimal,
    /// Maximum balance a user can hold after any ledger operation
    pub ceiling: Decimal,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            initial_balance: Decimal::ZERO,
            ceiling: Decimal::new(9_999_999_999, 4), // 999999.9999
        }
    }
}

/// Default prices for newly discovered models. Prices are per million tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PricingConfig {
    pub default_input_price: Decimal,
    pub default_output_price: Decimal,
    /// Negative disables per-message pricing
    pub default_per_msg_price: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_input_price: Decimal::from(60),
            default_output_price: Decimal::from(60),
            default_per_msg_price: Decimal::NEGATIVE_ONE,
        }
    }
}

impl PricingConfig {
    pub fn default_prices(&self) -> Prices {
        Prices {
            input_price: self.default_input_price,
            output_price: self.default_output_price,
            per_msg_price: self.default_per_msg_price,
        }
    }
}

/// Upstream model catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base URL of the upstream (models are fetched from `{url}/api/models`)
    pub url: Url,
    /// Bearer token for the upstream
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Timeout for a single catalog request
    #[serde(default = "UpstreamConfig::default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl UpstreamConfig {
    fn default_request_timeout() -> Duration {
        Duration::from_secs(30)
    }
}

/// Pre-charge table for the inlet, parsed once from its string form.
///
/// Lookups go `overrides[model]`, then `default`, then zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InletCostTable {
    pub default: Option<Decimal>,
    pub overrides: HashMap<ModelId, Decimal>,
    /// Entries skipped while parsing, kept so they can be logged once telemetry is up
    pub rejected: Vec<String>,
}

impl InletCostTable {
    /// Parse either a single number or a `model:price,model:price` list.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }

        if let Ok(amount) = Decimal::from_str(raw) {
            if amount.is_sign_negative() {
                return Self {
                    rejected: vec![raw.to_string()],
                    ..Self::default()
                };
            }
            return Self {
                default: Some(amount),
                ..Self::default()
            };
        }

        let mut table = Self::default();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parsed = entry.split_once(':').and_then(|(model, cost)| {
                let model = model.trim();
                let cost = Decimal::from_str(cost.trim()).ok()?;
                (!model.is_empty() && !cost.is_sign_negative()).then(|| (model.to_string(), cost))
            });

            match parsed {
                Some((model, cost)) if model == DEFAULT_COST_KEY => table.default = Some(cost),
                Some((model, cost)) => {
                    table.overrides.insert(model, cost);
                }
                None => table.rejected.push(entry.to_string()),
            }
        }
        table
    }

    /// Pre-charge for a model: its own entry, else the default, else zero.
    pub fn cost_for(&self, model: &str) -> Decimal {
        self.overrides.get(model).copied().or(self.default).unwrap_or(Decimal::ZERO)
    }

    /// The table key that priced `model`: its own id when listed, otherwise `default`
    pub fn entry_for<'a>(&'a self, model: &'a str) -> &'a str {
        if self.overrides.contains_key(model) { model } else { DEFAULT_COST_KEY }
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.overrides.is_empty()
    }
}

impl fmt::Display for InletCostTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.overrides.is_empty() {
            if let Some(default) = self.default {
                return write!(f, "{default}");
            }
            return Ok(());
        }

        let mut entries: Vec<String> = self.overrides.iter().map(|(model, cost)| format!("{model}:{cost}")).collect();
        entries.sort();
        if let Some(default) = self.default {
            entries.push(format!("{DEFAULT_COST_KEY}:{default}"));
        }
        write!(f, "{}", entries.join(","))
    }
}

impl Serialize for InletCostTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for InletCostTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Environment values such as `0.5` arrive as numbers, lists arrive as strings
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Integer(i64),
            Float(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Integer(n) => Self::parse(&n.to_string()),
            Raw::Float(n) => Self::parse(&n.to_string()),
            Raw::Text(s) => Self::parse(&s),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7878,
            database_url: None,
            database: DatabaseConfig::default(),
            api_key: None,
            access_token: None,
            balance: BalanceConfig::default(),
            pricing: PricingConfig::default(),
            cost_on_inlet: InletCostTable::default(),
            upstream: None,
            enable_metrics: true,
            enable_otel_export: false,
            cors_allowed_origins: vec![],
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Configuration {
                message: "Config validation: api_key is not configured. \
                          Set API_KEY or METERCTL_API_KEY, or add api_key to the config file."
                    .to_string(),
            });
        }

        if self.access_token.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Configuration {
                message: "Config validation: access_token is not configured. \
                          Set ACCESS_TOKEN or METERCTL_ACCESS_TOKEN, or add access_token to the config file."
                    .to_string(),
            });
        }

        if self.api_key == self.access_token {
            return Err(Error::Configuration {
                message: "Config validation: api_key and access_token must be different credentials".to_string(),
            });
        }

        if self.balance.ceiling <= Decimal::ZERO {
            return Err(Error::Configuration {
                message: format!("Config validation: balance.ceiling must be positive, got {}", self.balance.ceiling),
            });
        }

        if self.balance.initial_balance > self.balance.ceiling {
            return Err(Error::Configuration {
                message: format!(
                    "Config validation: balance.initial_balance ({}) cannot exceed balance.ceiling ({})",
                    self.balance.initial_balance, self.balance.ceiling
                ),
            });
        }

        if self.pricing.default_input_price.is_sign_negative() || self.pricing.default_output_price.is_sign_negative() {
            return Err(Error::Configuration {
                message: "Config validation: default token prices cannot be negative".to_string(),
            });
        }

        if let Err(e) = self.pricing.default_prices().check_range() {
            return Err(Error::Configuration {
                message: format!("Config validation: pricing default {e}"),
            });
        }

        let pool = &self.database.pool;
        if pool.max_connections == 0 || pool.min_connections > pool.max_connections {
            return Err(Error::Configuration {
                message: format!(
                    "Config validation: invalid pool size (min_connections {}, max_connections {})",
                    pool.min_connections, pool.max_connections
                ),
            });
        }

        if pool.acquire_timeout_secs == 0 || self.database.statement_timeout.is_zero() {
            return Err(Error::Configuration {
                message: "Config validation: database timeouts must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("METERCTL_").split("__"))
            // Unprefixed variables from older deployments
            .merge(
                Env::raw()
                    .only(&LEGACY_ENV_KEYS.iter().map(|(env, _)| *env).collect::<Vec<_>>())
                    .map(|key| {
                        LEGACY_ENV_KEYS
                            .iter()
                            .find(|(env, _)| key.as_str().eq_ignore_ascii_case(env))
                            .map(|(_, target)| *target)
                            .unwrap_or_default()
                            .into()
                    }),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args() -> Args {
        Args {
            config: "test.yaml".to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_inlet_cost_single_number_is_default() {
        let table = InletCostTable::parse("0.5");
        assert_eq!(table.default, Some(Decimal::from_str("0.5").unwrap()));
        assert!(table.overrides.is_empty());
        assert_eq!(table.cost_for("gpt-4"), Decimal::from_str("0.5").unwrap());
    }

    #[test]
    fn test_inlet_cost_list_with_default_and_bad_entries() {
        let table = InletCostTable::parse("gpt-4:0.32, gpt-4o-mini:0.01,broken,llama:abc,default:0.02,:1,neg:-3");

        assert_eq!(table.cost_for("gpt-4"), Decimal::from_str("0.32").unwrap());
        assert_eq!(table.cost_for("gpt-4o-mini"), Decimal::from_str("0.01").unwrap());
        assert_eq!(table.cost_for("unknown"), Decimal::from_str("0.02").unwrap());
        assert_eq!(table.rejected, vec!["broken", "llama:abc", ":1", "neg:-3"]);
        assert_eq!(table.entry_for("gpt-4"), "gpt-4");
        assert_eq!(table.entry_for("client-supplied-id"), DEFAULT_COST_KEY);
    }

    #[test]
    fn test_inlet_cost_without_default_falls_back_to_zero() {
        let table = InletCostTable::parse("gpt-4:1");
        assert_eq!(table.cost_for("claude"), Decimal::ZERO);
        assert!(InletCostTable::parse("").is_empty());
        assert!(InletCostTable::parse("   ").is_empty());
    }

    #[test]
    fn test_inlet_cost_display_round_trips() {
        let table = InletCostTable::parse("b:2,a:1,default:0.5");
        assert_eq!(table.to_string(), "a:1,b:2,default:0.5");
        assert_eq!(InletCostTable::parse(&table.to_string()), table);
    }

    #[test]
    fn test_legacy_env_variables() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 9000\n")?;
            jail.set_env("API_KEY", "service-key");
            jail.set_env("ACCESS_TOKEN", "admin-token");
            jail.set_env("DATABASE_URL", "postgres://db/metering");
            jail.set_env("COST_ON_INLET", "gpt-4:0.5,default:0.1");
            jail.set_env("INIT_BALANCE", "2.5");
            jail.set_env("DEFAULT_MODEL_PER_MSG_PRICE", "0.02");
            jail.set_env("OPENWEBUI_DOMAIN", "http://openwebui:8080");

            let config = Config::load(&args())?;

            assert_eq!(config.port, 9000);
            assert_eq!(config.api_key.as_deref(), Some("service-key"));
            assert_eq!(config.access_token.as_deref(), Some("admin-token"));
            assert_eq!(config.database.url, "postgres://db/metering");
            assert_eq!(config.cost_on_inlet.cost_for("gpt-4"), Decimal::from_str("0.5").unwrap());
            assert_eq!(config.cost_on_inlet.cost_for("other"), Decimal::from_str("0.1").unwrap());
            assert_eq!(config.balance.initial_balance, Decimal::from_str("2.5").unwrap());
            assert_eq!(config.pricing.default_per_msg_price, Decimal::from_str("0.02").unwrap());
            assert_eq!(config.upstream.unwrap().url.as_str(), "http://openwebui:8080/");

            Ok(())
        });
    }

    #[test]
    fn test_numeric_cost_on_inlet_from_env() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "api_key: a\naccess_token: b\n")?;
            jail.set_env("METERCTL_COST_ON_INLET", "1");

            let config = Config::load(&args())?;
            assert_eq!(config.cost_on_inlet.default, Some(Decimal::ONE));
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
api_key: a
access_token: b
balance:
  ceiling: 500
database:
  statement_timeout: 3s
"#,
            )?;
            jail.set_env("METERCTL_BALANCE__CEILING", "1000");
            jail.set_env("METERCTL_HOST", "127.0.0.1");

            let config = Config::load(&args())?;
            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.balance.ceiling, Decimal::from(1000));
            assert_eq!(config.database.statement_timeout, Duration::from_secs(3));
            Ok(())
        });
    }

    #[test]
    fn test_config_validation_missing_credentials() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api_key is not configured"));

        let config = Config {
            api_key: Some("key".to_string()),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("access_token is not configured"));
    }

    #[test]
    fn test_config_validation_rejects_shared_credential() {
        let config = Config {
            api_key: Some("same".to_string()),
            access_token: Some("same".to_string()),
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("must be different"));
    }

    #[test]
    fn test_config_validation_ceiling() {
        let mut config = Config {
            api_key: Some("key".to_string()),
            access_token: Some("token".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        config.balance.ceiling = Decimal::ZERO;
        assert!(config.validate().unwrap_err().to_string().contains("ceiling must be positive"));
    }

    #[test]
    fn test_config_validation_price_range() {
        let mut config = Config {
            api_key: Some("key".to_string()),
            access_token: Some("token".to_string()),
            ..Config::default()
        };
        config.pricing.default_input_price = Decimal::from(1_000_000);
        assert!(config.validate().is_ok());

        config.pricing.default_input_price = Decimal::from(10_000_000_000_i64);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("input_price"), "{err}");
    }
}

use std::{collections::HashSet, env, fmt, net::SocketAddr, time::Duration};

use url::Url;

use super::server_bind_address;

const DEFAULT_DATABASE_URL: &str = "sqlite:seat_bridge.db?mode=rwc";
const DEFAULT_PAYMENT_TYPE_LABEL: &str = "Tripleseat";
const DEFAULT_OUTBOUND_TIMEOUT_SECS: u64 = 30;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Credentials and toggles for the Tripleseat side of the bridge.
#[derive(Debug, Clone)]
pub struct TripleseatConfig {
    pub base_url: Url,
    pub api_token: String,
    /// Shared secret for webhook signatures. Verification fails closed when
    /// this is absent unless `skip_signature_verification` is set.
    pub webhook_secret: Option<String>,
    pub skip_signature_verification: bool,
    pub skip_event_validation: bool,
}

/// Credentials and fixed POS identifiers for the Revel side of the bridge.
#[derive(Debug, Clone)]
pub struct RevelConfig {
    pub base_url: Url,
    pub api_key: String,
    pub api_secret: String,
    /// Revel user id recorded as the creator of injected orders.
    pub created_by: i64,
    /// Dining option id applied to every injected order.
    pub dining_option: i64,
    /// Discount definition referenced when the invoice total undercuts the
    /// item subtotal. The discount step is skipped when unset.
    pub discount_id: Option<i64>,
    /// Payment type recorded against injected orders. The payment step is
    /// skipped when unset.
    pub payment_type_id: Option<i64>,
    pub payment_type_label: String,
}

/// Connection settings for the optional supply-system feed.
#[derive(Debug, Clone)]
pub struct SupplyConfig {
    pub base_url: Url,
    pub api_token: String,
}

/// Operational switches controlling which deliveries are relayed.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub enabled: bool,
    pub dry_run: bool,
    /// Tripleseat location ids the bridge will relay. Empty means every
    /// location with an enabled venue mapping is eligible.
    pub allowed_locations: HashSet<i64>,
    /// Forces all injections into a single Revel establishment, used for
    /// staging against a sandbox POS.
    pub establishment_override: Option<i64>,
}

impl BridgeConfig {
    /// Returns `true` when the given Tripleseat location may be relayed.
    pub fn location_allowed(&self, site_id: i64) -> bool {
        self.allowed_locations.is_empty() || self.allowed_locations.contains(&site_id)
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub tripleseat: TripleseatConfig,
    pub revel: RevelConfig,
    pub supply: Option<SupplyConfig>,
    pub bridge: BridgeConfig,
    pub outbound_timeout: Duration,
    /// Webhook endpoint for operator notifications. Notifications are
    /// silently disabled when unset.
    pub notify_url: Option<Url>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let database_url =
            optional_var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let tripleseat = TripleseatConfig {
            base_url: base_url_var("TRIPLESEAT_BASE_URL")?,
            api_token: require_var("TRIPLESEAT_API_TOKEN")?,
            webhook_secret: optional_var("TRIPLESEAT_WEBHOOK_SECRET"),
            skip_signature_verification: flag_var("TRIPLESEAT_SKIP_SIGNATURE_VERIFICATION", false)?,
            skip_event_validation: flag_var("TRIPLESEAT_SKIP_EVENT_VALIDATION", false)?,
        };

        let revel = RevelConfig {
            base_url: base_url_var("REVEL_BASE_URL")?,
            api_key: require_var("REVEL_API_KEY")?,
            api_secret: require_var("REVEL_API_SECRET")?,
            created_by: id_var("REVEL_CREATED_BY")?,
            dining_option: id_var("REVEL_DINING_OPTION")?,
            discount_id: optional_id_var("REVEL_DISCOUNT_ID")?,
            payment_type_id: optional_id_var("REVEL_PAYMENT_TYPE_ID")?,
            payment_type_label: optional_var("REVEL_PAYMENT_TYPE_LABEL")
                .unwrap_or_else(|| DEFAULT_PAYMENT_TYPE_LABEL.to_string()),
        };

        let supply = match optional_var("SUPPLY_BASE_URL") {
            Some(_) => Some(SupplyConfig {
                base_url: base_url_var("SUPPLY_BASE_URL")?,
                api_token: require_var("SUPPLY_API_TOKEN")?,
            }),
            None => None,
        };

        let bridge = BridgeConfig {
            enabled: flag_var("BRIDGE_ENABLED", true)?,
            dry_run: flag_var("BRIDGE_DRY_RUN", false)?,
            allowed_locations: id_list_var("BRIDGE_ALLOWED_LOCATIONS")?,
            establishment_override: optional_id_var("BRIDGE_ESTABLISHMENT_OVERRIDE")?,
        };

        let outbound_timeout = match optional_var("OUTBOUND_TIMEOUT_SECS") {
            Some(value) => {
                let secs = value.parse::<u64>().map_err(|err| ConfigError::InvalidVar {
                    name: "OUTBOUND_TIMEOUT_SECS",
                    reason: err.to_string(),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_OUTBOUND_TIMEOUT_SECS),
        };

        let notify_url = match optional_var("NOTIFY_URL") {
            Some(value) => Some(Url::parse(&value).map_err(|err| ConfigError::InvalidVar {
                name: "NOTIFY_URL",
                reason: err.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            tripleseat,
            revel,
            supply,
            bridge,
            outbound_timeout,
            notify_url,
        })
    }
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    optional_var(name).ok_or(ConfigError::MissingVar(name))
}

fn optional_var(name: &'static str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

/// Parses a base URL and guarantees a trailing slash so `Url::join` keeps
/// the full path.
fn base_url_var(name: &'static str) -> Result<Url, ConfigError> {
    let mut value = require_var(name)?;
    if !value.ends_with('/') {
        value.push('/');
    }
    Url::parse(&value).map_err(|err| ConfigError::InvalidVar {
        name,
        reason: err.to_string(),
    })
}

fn flag_var(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match optional_var(name) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidVar {
                name,
                reason: format!("expected a boolean, got {other}"),
            }),
        },
        None => Ok(default),
    }
}

fn id_var(name: &'static str) -> Result<i64, ConfigError> {
    let value = require_var(name)?;
    value.parse::<i64>().map_err(|err| ConfigError::InvalidVar {
        name,
        reason: err.to_string(),
    })
}

fn optional_id_var(name: &'static str) -> Result<Option<i64>, ConfigError> {
    match optional_var(name) {
        Some(value) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|err| ConfigError::InvalidVar {
                name,
                reason: err.to_string(),
            }),
        None => Ok(None),
    }
}

fn id_list_var(name: &'static str) -> Result<HashSet<i64>, ConfigError> {
    let mut ids = HashSet::new();
    if let Some(value) = optional_var(name) {
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let id = part.parse::<i64>().map_err(|err| ConfigError::InvalidVar {
                name,
                reason: format!("entry {part:?}: {err}"),
            })?;
            ids.insert(id);
        }
    }
    Ok(ids)
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVar(&'static str),
    InvalidVar {
        name: &'static str,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVar(name) => write!(f, "required environment variable {name} is not set"),
            Self::InvalidVar { name, reason } => {
                write!(f, "invalid value for {name}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

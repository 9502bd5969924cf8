use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::workflows::eligibility::ScoringTable;

const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.paystack.co";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub payments: PaymentConfig,
    pub eligibility: EligibilityConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let payments = PaymentConfig::from_env()?;
        let eligibility = EligibilityConfig::from_env()?;

        if environment == AppEnvironment::Production && payments.secret_key.is_none() {
            return Err(ConfigError::MissingGatewaySecret);
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            payments,
            eligibility,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Payment gateway credentials and client limits.
#[derive(Clone)]
pub struct PaymentConfig {
    pub secret_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub currency: String,
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret_key = env::var("PAYSTACK_SECRET_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let base_url = env::var("PAYSTACK_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_GATEWAY_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let timeout_secs = match env::var("PAYMENT_GATEWAY_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidGatewayTimeout)?,
            Err(_) => DEFAULT_GATEWAY_TIMEOUT_SECS,
        };

        let currency = env::var("PAYMENT_CURRENCY")
            .unwrap_or_else(|_| "GHS".to_string())
            .trim()
            .to_ascii_uppercase();

        Ok(Self {
            secret_key,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            currency,
        })
    }
}

// Keeps the gateway secret out of debug logs.
impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("currency", &self.currency)
            .finish()
    }
}

/// Scoring table used by the eligibility calculator.
#[derive(Debug, Clone)]
pub struct EligibilityConfig {
    pub scoring: ScoringTable,
}

impl EligibilityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let scoring = match env::var("ELIGIBILITY_SCORING_TABLE") {
            Ok(path) if !path.trim().is_empty() => {
                let path = PathBuf::from(path.trim());
                let raw = std::fs::read_to_string(&path).map_err(|source| {
                    ConfigError::ScoringTableIo {
                        path: path.clone(),
                        source,
                    }
                })?;
                serde_json::from_str(&raw)
                    .map_err(|source| ConfigError::ScoringTableFormat { path, source })?
            }
            _ => ScoringTable::default(),
        };

        Ok(Self { scoring })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidGatewayTimeout,
    MissingGatewaySecret,
    ScoringTableIo {
        path: PathBuf,
        source: std::io::Error,
    },
    ScoringTableFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidGatewayTimeout => write!(
                f,
                "PAYMENT_GATEWAY_TIMEOUT_SECS must be a positive number of seconds"
            ),
            ConfigError::MissingGatewaySecret => {
                write!(f, "PAYSTACK_SECRET_KEY is required in production")
            }
            ConfigError::ScoringTableIo { path, .. } => {
                write!(f, "unable to read scoring table at {}", path.display())
            }
            ConfigError::ScoringTableFormat { path, .. } => {
                write!(f, "scoring table at {} is not valid JSON", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidGatewayTimeout
            | ConfigError::MissingGatewaySecret => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::ScoringTableIo { source, .. } => Some(source),
            ConfigError::ScoringTableFormat { source, .. } => Some(source),
        }
    }
}

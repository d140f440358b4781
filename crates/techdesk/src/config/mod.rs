use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::tickets::{CreationPolicy, FieldLimits, LifecyclePolicy, TicketServiceConfig};

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
    pub helpdesk: HelpdeskConfig,
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
        let log_format = match non_empty("APP_LOG_FORMAT") {
            Some(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat(raw))?,
            None if environment == AppEnvironment::Production => LogFormat::Full,
            None => LogFormat::Compact,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            helpdesk: HelpdeskConfig::from_env()?,
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Line layout for log output. `Full` keeps targets and thread names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Full,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// Ticketing policy flags and notification endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpdeskConfig {
    pub creation_policy: CreationPolicy,
    pub auto_progress_on_assign: bool,
    pub number_attempts: u32,
    pub webhook_url: Option<String>,
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
    pub notify_timeout: Duration,
}

impl Default for HelpdeskConfig {
    fn default() -> Self {
        Self {
            creation_policy: CreationPolicy::default(),
            auto_progress_on_assign: false,
            number_attempts: 5,
            webhook_url: None,
            mail_relay_url: None,
            mail_from: "techsupport@localhost".to_string(),
            notify_timeout: Duration::from_millis(5000),
        }
    }
}

impl HelpdeskConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let creation_policy = match non_empty("HELPDESK_CREATION_POLICY") {
            Some(raw) => raw
                .parse::<CreationPolicy>()
                .map_err(|_| ConfigError::InvalidCreationPolicy(raw))?,
            None => defaults.creation_policy,
        };

        let auto_progress_on_assign = match non_empty("HELPDESK_AUTO_PROGRESS_ON_ASSIGN") {
            Some(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
                name: "HELPDESK_AUTO_PROGRESS_ON_ASSIGN",
                value: raw,
            })?,
            None => defaults.auto_progress_on_assign,
        };

        let number_attempts = match non_empty("HELPDESK_NUMBER_ATTEMPTS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts > 0)
                .ok_or(ConfigError::InvalidNumber {
                    name: "HELPDESK_NUMBER_ATTEMPTS",
                    value: raw,
                })?,
            None => defaults.number_attempts,
        };

        let notify_timeout = match non_empty("HELPDESK_NOTIFY_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidNumber {
                    name: "HELPDESK_NOTIFY_TIMEOUT_MS",
                    value: raw,
                })?,
            None => defaults.notify_timeout,
        };

        Ok(Self {
            creation_policy,
            auto_progress_on_assign,
            number_attempts,
            webhook_url: non_empty("HELPDESK_WEBHOOK_URL"),
            mail_relay_url: non_empty("HELPDESK_MAIL_RELAY_URL"),
            mail_from: non_empty("HELPDESK_MAIL_FROM").unwrap_or(defaults.mail_from),
            notify_timeout,
        })
    }

    pub fn service_config(&self) -> TicketServiceConfig {
        TicketServiceConfig {
            policy: LifecyclePolicy {
                creation: self.creation_policy,
                auto_progress_on_assign: self.auto_progress_on_assign,
                limits: FieldLimits::default(),
            },
            number_attempts: self.number_attempts,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCreationPolicy(String),
    InvalidLogFormat(String),
    InvalidFlag { name: &'static str, value: String },
    InvalidNumber { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCreationPolicy(value) => write!(
                f,
                "HELPDESK_CREATION_POLICY must be user_role_only or any_role, got '{value}'"
            ),
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be compact or full, got '{value}'")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be true or false, got '{value}'")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive integer, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

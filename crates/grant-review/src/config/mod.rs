use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use chrono::Duration;

use crate::workflows::grants::ReviewPolicy;

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
    pub workflow: WorkflowConfig,
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
        let include_targets = env::var("APP_LOG_TARGETS")
            .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                include_targets,
            },
            workflow: WorkflowConfig::from_env()?,
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
    pub include_targets: bool,
}

/// Validator SLA ceiling: one year.
const MAX_DD_APPROVAL_WINDOW_HOURS: i64 = 24 * 366;

/// Operational dials for the review and due-diligence workflows.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    pub approval_threshold: f64,
    pub disparity_threshold: f64,
    pub dd_approval_window_hours: i64,
    pub dd_sweep_interval_secs: u64,
    pub rubric_path: Option<PathBuf>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            approval_threshold: 70.0,
            disparity_threshold: 10.0,
            dd_approval_window_hours: 72,
            dd_sweep_interval_secs: 300,
            rubric_path: None,
        }
    }
}

impl WorkflowConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let approval_threshold =
            percentage_var("GRANT_APPROVAL_THRESHOLD", defaults.approval_threshold)?;
        let disparity_threshold =
            percentage_var("GRANT_DISPARITY_THRESHOLD", defaults.disparity_threshold)?;

        let dd_approval_window_hours = match env::var("GRANT_DD_APPROVAL_WINDOW_HOURS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|hours| (1..=MAX_DD_APPROVAL_WINDOW_HOURS).contains(hours))
                .ok_or(ConfigError::InvalidNumber {
                    variable: "GRANT_DD_APPROVAL_WINDOW_HOURS",
                    value: raw,
                })?,
            Err(_) => defaults.dd_approval_window_hours,
        };

        let dd_sweep_interval_secs = match env::var("GRANT_DD_SWEEP_INTERVAL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidNumber {
                    variable: "GRANT_DD_SWEEP_INTERVAL_SECS",
                    value: raw,
                })?,
            Err(_) => defaults.dd_sweep_interval_secs,
        };

        let rubric_path = env::var("GRANT_RUBRIC_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            approval_threshold,
            disparity_threshold,
            dd_approval_window_hours,
            dd_sweep_interval_secs,
            rubric_path,
        })
    }

    pub fn review_policy(&self) -> ReviewPolicy {
        ReviewPolicy {
            approval_threshold: self.approval_threshold,
            disparity_threshold: self.disparity_threshold,
            dd_approval_window: Duration::try_hours(
                self.dd_approval_window_hours
                    .clamp(1, MAX_DD_APPROVAL_WINDOW_HOURS),
            )
            .unwrap_or_else(|| ReviewPolicy::default().dd_approval_window),
        }
    }
}

fn percentage_var(variable: &'static str, default: f64) -> Result<f64, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| (0.0..=100.0).contains(value))
            .ok_or(ConfigError::InvalidNumber {
                variable,
                value: raw,
            }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidNumber {
        variable: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable, value } => {
                write!(f, "{variable} has an out-of-range or non-numeric value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::attendance::AttendancePolicy;

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
    pub attendance: AttendancePolicy,
    pub registry: RegistryConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            attendance: load_policy()?,
            registry: RegistryConfig {
                classrooms_csv: env::var_os("REGISTRY_CLASSROOMS_CSV").map(PathBuf::from),
                schedules_csv: env::var_os("REGISTRY_SCHEDULES_CSV").map(PathBuf::from),
                enrollments_csv: env::var_os("REGISTRY_ENROLLMENTS_CSV").map(PathBuf::from),
            },
        })
    }
}

fn load_policy() -> Result<AttendancePolicy, ConfigError> {
    let defaults = AttendancePolicy::default();

    let policy = AttendancePolicy {
        tolerance_before_minutes: parse_var(
            "ATTENDANCE_TOLERANCE_BEFORE_MINUTES",
            defaults.tolerance_before_minutes,
        )?,
        tolerance_after_minutes: parse_var(
            "ATTENDANCE_TOLERANCE_AFTER_MINUTES",
            defaults.tolerance_after_minutes,
        )?,
        late_grace_minutes: parse_var(
            "ATTENDANCE_LATE_GRACE_MINUTES",
            defaults.late_grace_minutes,
        )?,
        max_accuracy_meters: parse_accuracy(defaults.max_accuracy_meters)?,
        utc_offset_minutes: parse_var(
            "ATTENDANCE_UTC_OFFSET_MINUTES",
            defaults.utc_offset_minutes,
        )?,
    };

    if policy.campus_offset().is_none() {
        return Err(ConfigError::InvalidValue {
            key: "ATTENDANCE_UTC_OFFSET_MINUTES",
            value: policy.utc_offset_minutes.to_string(),
        });
    }

    Ok(policy)
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_accuracy(default: Option<f64>) -> Result<Option<f64>, ConfigError> {
    const KEY: &str = "ATTENDANCE_MAX_ACCURACY_METERS";

    let Ok(raw) = env::var(KEY) else {
        return Ok(default);
    };
    if raw.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(Some(value)),
        _ => Err(ConfigError::InvalidValue { key: KEY, value: raw }),
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
}

/// Optional CSV sources for the campus registry. When unset the service falls back to
/// its bundled sample campus.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    pub classrooms_csv: Option<PathBuf>,
    pub schedules_csv: Option<PathBuf>,
    pub enrollments_csv: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    MissingPair { key: &'static str, paired_with: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
            ConfigError::MissingPair { key, paired_with } => {
                write!(f, "{key} must be set when {paired_with} is set")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::MissingPair { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

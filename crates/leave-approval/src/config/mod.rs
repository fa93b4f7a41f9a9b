use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use url::Url;

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
    pub approval: ApprovalConfig,
}

const DEFAULT_SENDER: &str = "no-reply@localhost";
const DEFAULT_STEP_ATTEMPTS: u32 = 3;

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

        let server = ServerConfig { host, port };
        let approval = ApprovalConfig::from_env(environment, &server)?;

        Ok(Self {
            environment,
            server,
            telemetry: TelemetryConfig { log_level },
            approval,
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

/// Credentials and routing for the leave approval workflow.
#[derive(Clone)]
pub struct ApprovalConfig {
    pub jwt_secret: String,
    pub sender_email: String,
    /// Base for approve/reject/status links. Never derived from request headers.
    pub public_base_url: Url,
    pub max_step_attempts: u32,
}

impl ApprovalConfig {
    fn from_env(environment: AppEnvironment, server: &ServerConfig) -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingVar("JWT_SECRET"))?;

        let sender_email = env::var("SES_EMAIL").unwrap_or_else(|_| DEFAULT_SENDER.to_string());

        let public_base_url = match env::var("APP_PUBLIC_BASE_URL") {
            Ok(raw) if !raw.trim().is_empty() => {
                Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidBaseUrl { source })?
            }
            // Only a local development server may link back to its own bind address.
            _ if environment == AppEnvironment::Development => {
                Url::parse(&format!("http://{}:{}/", server.host, server.port))
                    .map_err(|source| ConfigError::InvalidBaseUrl { source })?
            }
            _ => return Err(ConfigError::MissingVar("APP_PUBLIC_BASE_URL")),
        };

        let max_step_attempts = match env::var("ENGINE_MAX_STEP_ATTEMPTS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts >= 1)
                .ok_or(ConfigError::InvalidStepAttempts)?,
            Err(_) => DEFAULT_STEP_ATTEMPTS,
        };

        Ok(Self {
            jwt_secret,
            sender_email,
            public_base_url,
            max_step_attempts,
        })
    }
}

impl fmt::Debug for ApprovalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalConfig")
            .field("jwt_secret", &"<redacted>")
            .field("sender_email", &self.sender_email)
            .field("public_base_url", &self.public_base_url)
            .field("max_step_attempts", &self.max_step_attempts)
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingVar(&'static str),
    InvalidBaseUrl { source: url::ParseError },
    InvalidStepAttempts,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingVar(name) => write!(f, "{name} must be set"),
            ConfigError::InvalidBaseUrl { .. } => {
                write!(f, "APP_PUBLIC_BASE_URL must be an absolute URL")
            }
            ConfigError::InvalidStepAttempts => {
                write!(f, "ENGINE_MAX_STEP_ATTEMPTS must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::MissingVar(_)
            | ConfigError::InvalidStepAttempts => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidBaseUrl { source } => Some(source),
        }
    }
}

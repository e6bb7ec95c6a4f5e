//! CLI argument parsing, validation, and startup helpers.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use clap::Parser;
use tracing::{error, info};
use url::Url;

use crate::ServerConfig;
use crate::api::LogResetDelivery;
use crate::auth::{DEFAULT_PROTECTED_PREFIXES, SameSite};
use crate::db::Database;
use crate::jwt::{ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS};
use crate::rate_limit::{
    LOGIN_PER_MINUTE, PASSWORD_RESET_PER_MINUTE, REGISTER_PER_MINUTE, RateLimits,
};

const MIN_JWT_SECRET_LENGTH: usize = 32;

pub const ACCESS_SECRET_ENV: &str = "JWT_SECRET";
pub const REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "invoicer",
    about = "Clients, purchase orders and invoices behind cookie sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "invoicer.db")]
    pub database: String,

    /// Public origin (full URL, e.g. "https://records.example.com"). HTTPS origins get Secure cookies
    #[arg(long, env = "PUBLIC_ORIGIN", default_value = "http://localhost:3000")]
    pub public_origin: String,

    /// Path to file containing the access token secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer using JWT_REFRESH_SECRET env var instead
    #[arg(long)]
    pub jwt_refresh_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL", default_value_t = ACCESS_TOKEN_DURATION_SECS)]
    pub access_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_TTL", default_value_t = REFRESH_TOKEN_DURATION_SECS)]
    pub refresh_ttl: u64,

    /// SameSite attribute of the auth cookies
    #[arg(long, value_enum, default_value = "strict")]
    pub same_site: SameSite,

    /// Path prefix that requires a session (repeatable). Defaults to /dashboard, /clients, /invoices and /orders
    #[arg(long = "protected-prefix", value_parser = validate_prefix)]
    pub protected_prefixes: Vec<String>,

    /// Password login attempts allowed per minute per client IP
    #[arg(long, env = "LOGIN_PER_MINUTE", default_value_t = LOGIN_PER_MINUTE)]
    pub login_per_minute: NonZeroU32,

    /// Registrations allowed per minute per client IP
    #[arg(long, env = "REGISTER_PER_MINUTE", default_value_t = REGISTER_PER_MINUTE)]
    pub register_per_minute: NonZeroU32,

    /// Password reset requests and confirmations allowed per minute per client IP
    #[arg(long, env = "PASSWORD_RESET_PER_MINUTE", default_value_t = PASSWORD_RESET_PER_MINUTE)]
    pub password_reset_per_minute: NonZeroU32,

    /// Read the client IP from this header (e.g. X-Forwarded-For) when running behind a proxy
    #[arg(long, value_parser = parse_ip_header)]
    pub ip_header: Option<HeaderName>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{env_var} is required. Set the {env_var} environment variable (recommended) or use {flag}")]
    MissingSecret {
        env_var: &'static str,
        flag: &'static str,
    },
    #[error("failed to read secret file {path}: {source}")]
    SecretFile {
        path: String,
        source: std::io::Error,
    },
    #[error("{env_var} is shorter than {min} characters. Use a longer secret")]
    SecretTooShort { env_var: &'static str, min: usize },
    #[error("JWT_SECRET and JWT_REFRESH_SECRET must be different")]
    IdenticalSecrets,
    #[error("{name} must be at least one second")]
    ZeroTtl { name: &'static str },
    #[error("invalid public origin {origin}: {reason}")]
    InvalidOrigin { origin: String, reason: String },
}

/// The two signing secrets, validated.
pub struct JwtSecrets {
    pub access: String,
    pub refresh: String,
}

fn validate_prefix(s: &str) -> Result<String, String> {
    if !s.starts_with('/') {
        return Err(format!("Protected prefix must start with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Protected prefix contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

fn parse_ip_header(s: &str) -> Result<HeaderName, String> {
    HeaderName::try_from(s).map_err(|e| format!("Invalid header name {}: {}", s, e))
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a secret from an environment variable or a file.
/// The environment variable is removed after reading, so this must run
/// before any other thread is started.
pub fn load_secret(
    env_var: &'static str,
    file: Option<&str>,
    flag: &'static str,
) -> Result<String, ConfigError> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: `main` calls this before building the tokio runtime, while
        // the process has a single thread.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = file {
        std::fs::read_to_string(path)
            .map_err(|source| ConfigError::SecretFile {
                path: path.to_string(),
                source,
            })?
            .trim()
            .to_string()
    } else {
        return Err(ConfigError::MissingSecret { env_var, flag });
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::SecretTooShort {
            env_var,
            min: MIN_JWT_SECRET_LENGTH,
        });
    }

    Ok(secret)
}

/// Load both signing secrets. They must differ so that neither key can
/// verify the other kind of credential.
pub fn load_jwt_secrets(
    access_file: Option<&str>,
    refresh_file: Option<&str>,
) -> Result<JwtSecrets, ConfigError> {
    let access = load_secret(ACCESS_SECRET_ENV, access_file, "--jwt-secret-file")?;
    let refresh = load_secret(REFRESH_SECRET_ENV, refresh_file, "--jwt-refresh-secret-file")?;
    if access == refresh {
        return Err(ConfigError::IdenticalSecrets);
    }
    Ok(JwtSecrets { access, refresh })
}

/// Parse and validate the public origin URL.
pub fn validate_public_origin(origin: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidOrigin {
        origin: origin.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(origin).map_err(|e| invalid(&e.to_string()))?;

    let is_https = url.scheme() == "https";
    let is_local = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));

    if !is_https && !(url.scheme() == "http" && is_local) {
        return Err(invalid("must use HTTPS for non-localhost deployments"));
    }
    if url.path() != "/" || url.query().is_some() {
        return Err(invalid("must not contain a path or query"));
    }

    Ok(url)
}

/// Convert a TTL in seconds, rejecting zero.
pub fn validate_ttl(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::ZeroTtl { name });
    }
    Ok(Duration::from_secs(secs))
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    secrets: JwtSecrets,
    public_origin: Url,
) -> Result<ServerConfig, ConfigError> {
    let access_ttl = validate_ttl("--access-ttl", args.access_ttl)?;
    let refresh_ttl = validate_ttl("--refresh-ttl", args.refresh_ttl)?;
    let secure_cookies = public_origin.scheme() == "https";

    let protected_prefixes = if args.protected_prefixes.is_empty() {
        DEFAULT_PROTECTED_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect()
    } else {
        args.protected_prefixes.clone()
    };

    Ok(ServerConfig {
        db,
        jwt_secret: secrets.access.into_bytes(),
        jwt_refresh_secret: secrets.refresh.into_bytes(),
        access_ttl,
        refresh_ttl,
        public_origin,
        secure_cookies,
        same_site: args.same_site,
        protected_prefixes,
        rate_limits: RateLimits {
            login_per_minute: args.login_per_minute,
            register_per_minute: args.register_per_minute,
            password_reset_per_minute: args.password_reset_per_minute,
        },
        ip_header: args.ip_header.clone(),
        reset_delivery: Arc::new(LogResetDelivery),
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

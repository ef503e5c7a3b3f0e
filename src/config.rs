//! Configuration loading and validation.
//!
//! Settings come from three layers, each overriding the last:
//! `config/default.toml`, `config/{profile}.toml`, then `APP__*`
//! environment variables. The JWT secret is the one value with no
//! default; startup fails without it.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PROFILE: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server bind host
    pub host: String,

    /// Server bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment profile: development, staging, production
    pub environment: String,

    /// SQL connection URL (Postgres in deployment, SQLite for local work)
    pub database_url: String,

    /// Connection pool sizing
    #[serde(default = "default_pool_max")]
    pub db_max_connections: u32,
    #[serde(default = "default_pool_min")]
    pub db_min_connections: u32,

    /// Pool timeouts, in seconds
    #[serde(default = "default_connect_timeout")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_acquire_timeout")]
    pub db_acquire_timeout_secs: u64,

    /// Apply pending migrations during startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// HS256 signing secret for bearer tokens. At least 64 characters
    /// and not a recognizable placeholder.
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    pub jwt_expiration: usize,

    /// Expected `iss` claim
    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    /// Expected `aud` claim
    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Comma-separated allowed CORS origins. Required outside
    /// development unless `cors_allow_any_origin` is set.
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Explicit opt-in to permissive CORS outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// Log filter level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Buffer size of the post-commit event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Flat shipping fee in whole currency units, charged on shipped
    /// orders below the free-shipping threshold
    #[serde(default = "default_flat_shipping_fee")]
    pub flat_shipping_fee: u64,
}

impl AppConfig {
    /// Builds a config from the required values, defaulting the rest.
    /// Mostly useful for tests and tooling.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        jwt_expiration: usize,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            host,
            port,
            environment,
            database_url,
            db_max_connections: default_pool_max(),
            db_min_connections: default_pool_min(),
            db_connect_timeout_secs: default_connect_timeout(),
            db_idle_timeout_secs: default_idle_timeout(),
            db_acquire_timeout_secs: default_acquire_timeout(),
            auto_migrate: false,
            jwt_secret,
            jwt_expiration,
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            log_level: default_log_level(),
            log_json: false,
            event_channel_capacity: default_event_channel_capacity(),
            flat_shipping_fee: default_flat_shipping_fee(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Configured CORS origins, split on commas with whitespace and
    /// empty entries discarded.
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Cross-field rules that `validator` derive cannot express.
    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && self.cors_origins().is_empty() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Outside development, set APP__CORS_ALLOWED_ORIGINS or opt in with APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_pool_max() -> u32 {
    16
}
fn default_pool_min() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_acquire_timeout() -> u64 {
    8
}
fn default_event_channel_capacity() -> usize {
    1024
}
fn default_flat_shipping_fee() -> u64 {
    2_500
}
fn default_auth_issuer() -> String {
    "storefront-orders".to_string()
}
fn default_auth_audience() -> String {
    "storefront".to_string()
}

fn secret_rejection(message: &'static str) -> ValidationError {
    let mut err = ValidationError::new("jwt_secret");
    err.message = Some(message.into());
    err
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 64 {
        return Err(secret_rejection(
            "JWT secret must be at least 64 characters",
        ));
    }

    const PLACEHOLDERS: [&str; 3] = [
        "CHANGE_THIS_SECRET_IN_PRODUCTION",
        "your-secret-key",
        "default-secret-key",
    ];
    if PLACEHOLDERS
        .iter()
        .any(|&placeholder| trimmed.eq_ignore_ascii_case(placeholder))
    {
        return Err(secret_rejection(
            "JWT secret is a known placeholder; generate a random value",
        ));
    }

    let distinct: std::collections::HashSet<char> = trimmed.chars().collect();
    if distinct.len() < 10 {
        return Err(secret_rejection(
            "JWT secret needs at least 10 distinct characters",
        ));
    }

    Ok(())
}

// validator's derive hands numeric fields over by value.
fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity > 0 {
        return Ok(());
    }
    let mut err = ValidationError::new("event_channel_capacity");
    err.message = Some("event_channel_capacity must be greater than 0".into());
    Err(err)
}

/// Installs the global tracing subscriber. RUST_LOG overrides the
/// configured level when present and non-empty.
pub fn init_tracing(level: &str, json: bool) {
    let directive = match env::var("RUST_LOG") {
        Ok(spec) if !spec.trim().is_empty() => spec,
        _ => format!("storefront_orders={},tower_http=debug", level),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(directive);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // RUN_ENV and APP_ENV both select the profile file
    let profile = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_PROFILE.to_string());
    info!("Loading configuration profile '{}'", profile);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "No '{}' directory; using built-in defaults plus APP__* variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_PROFILE)?
        .set_default("database_url", "sqlite://storefront_orders.db?mode=rwc")?
        .set_default("jwt_expiration", 3600)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, profile)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // Checked up front so the operator sees one clear message instead
    // of a deserialization error about a missing field.
    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured; set APP__JWT_SECRET to a random string of 64+ characters");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret: set APP__JWT_SECRET or provide it in a config file".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;
    app_config
        .validate()
        .and_then(|()| app_config.validate_additional_constraints())
        .map_err(|e| {
            error!("Configuration rejected: {:?}", e);
            AppConfigError::Validation(e)
        })?;

    info!("Configuration loaded");
    Ok(app_config)
}

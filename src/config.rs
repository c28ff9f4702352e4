use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 5000;
const CONFIG_DIR: &str = "config";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_STORAGE_BACKEND: &str = "supabase";
const DEFAULT_STORAGE_BUCKET: &str = "bills";
const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HANDOFF_ISSUER: &str = "profitpilot-backend";
const DEFAULT_HANDOFF_AUDIENCE: &str = "n8n";
const DEFAULT_HANDOFF_TTL_SECS: u64 = 300;
const DEFAULT_LIST_LIMIT: u64 = 10;
const DEFAULT_STATS_PERIOD_DAYS: u32 = 30;
const DEV_DEFAULT_HANDOFF_SECRET: &str = "profitpilot_development_handoff_secret_not_for_production_use";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Largest accepted bill upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    #[validate(range(min = 1))]
    pub max_upload_bytes: usize,

    /// Object storage backend: "supabase" or "memory"
    #[serde(default = "default_storage_backend")]
    #[validate(custom = "validate_storage_backend")]
    pub storage_backend: String,

    /// Base URL of the Supabase project (identity and storage)
    #[validate(url)]
    pub supabase_url: String,

    /// Service-role key used for storage writes and the `apikey` header
    #[validate(length(min = 1))]
    pub supabase_service_key: String,

    /// Bucket holding uploaded bills
    #[serde(default = "default_storage_bucket")]
    #[validate(length(min = 1))]
    pub storage_bucket: String,

    /// Extraction workflow webhook
    #[validate(url)]
    pub n8n_webhook_url: String,

    /// Ceiling on the synchronous extraction call
    #[serde(default = "default_extraction_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub extraction_timeout_secs: u64,

    /// HS256 secret for hand-off tokens
    #[validate(length(min = 32), custom = "validate_handoff_secret")]
    pub handoff_jwt_secret: String,

    #[serde(default = "default_handoff_issuer")]
    pub handoff_issuer: String,

    #[serde(default = "default_handoff_audience")]
    pub handoff_audience: String,

    /// Hand-off token validity in seconds
    #[serde(default = "default_handoff_ttl_secs")]
    #[validate(range(min = 30, max = 3600))]
    pub handoff_ttl_secs: u64,

    /// Page size when `limit` is omitted on the list endpoint
    #[serde(default = "default_list_limit")]
    #[validate(range(min = 1, max = 100))]
    pub default_list_limit: u64,

    /// Stats window when `period` is omitted
    #[serde(default = "default_stats_period_days")]
    #[validate(range(min = 1, max = 3650))]
    pub default_stats_period_days: u32,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the external endpoints
    pub fn new(
        database_url: String,
        supabase_url: String,
        supabase_service_key: String,
        n8n_webhook_url: String,
        handoff_jwt_secret: String,
    ) -> Self {
        Self {
            database_url,
            host: "127.0.0.1".to_string(),
            port: default_port(),
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            storage_backend: default_storage_backend(),
            supabase_url,
            supabase_service_key,
            storage_bucket: default_storage_bucket(),
            n8n_webhook_url,
            extraction_timeout_secs: default_extraction_timeout_secs(),
            handoff_jwt_secret,
            handoff_issuer: default_handoff_issuer(),
            handoff_audience: default_handoff_audience(),
            handoff_ttl_secs: default_handoff_ttl_secs(),
            default_list_limit: default_list_limit(),
            default_stats_period_days: default_stats_period_days(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn uses_memory_storage(&self) -> bool {
        self.storage_backend.eq_ignore_ascii_case("memory")
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    /// Request body ceiling for the upload route; multipart framing needs headroom
    pub fn upload_body_limit(&self) -> usize {
        self.max_upload_bytes.saturating_add(1024 * 1024)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.handoff_jwt_secret.trim() == DEV_DEFAULT_HANDOFF_SECRET {
            let mut err = ValidationError::new("handoff_secret_default_dev");
            err.message = Some(
                "The bundled development hand-off secret must not be used outside development. Set APP__HANDOFF_JWT_SECRET."
                    .into(),
            );
            errors.add("handoff_jwt_secret", err);
        }

        if self.is_production() && self.uses_memory_storage() {
            let mut err = ValidationError::new("storage_backend_memory");
            err.message = Some("In-memory storage is not allowed in production".into());
            errors.add("storage_backend", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    300
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_storage_backend() -> String {
    DEFAULT_STORAGE_BACKEND.to_string()
}

fn default_storage_bucket() -> String {
    DEFAULT_STORAGE_BUCKET.to_string()
}

fn default_extraction_timeout_secs() -> u64 {
    DEFAULT_EXTRACTION_TIMEOUT_SECS
}

fn default_handoff_issuer() -> String {
    DEFAULT_HANDOFF_ISSUER.to_string()
}

fn default_handoff_audience() -> String {
    DEFAULT_HANDOFF_AUDIENCE.to_string()
}

fn default_handoff_ttl_secs() -> u64 {
    DEFAULT_HANDOFF_TTL_SECS
}

fn default_list_limit() -> u64 {
    DEFAULT_LIST_LIMIT
}

fn default_stats_period_days() -> u32 {
    DEFAULT_STATS_PERIOD_DAYS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_storage_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "supabase" | "memory" => Ok(()),
        _ => {
            let mut err = ValidationError::new("storage_backend");
            err.message = Some("Must be one of: supabase, memory".into());
            Err(err)
        }
    }
}

fn validate_handoff_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    const DISALLOWED: [&str; 4] = [
        "CHANGE_THIS_SECRET_IN_PRODUCTION",
        "your-secret-key",
        "default-secret-key",
        "n8n-secret",
    ];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("handoff_jwt_secret");
        err.message = Some("Hand-off secret must be overridden with a secure random value".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("handoff_jwt_secret");
            err.message = Some("Hand-off secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("handoff_jwt_secret");
        err.message =
            Some("Hand-off secret must have at least 10 unique characters".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("profitpilot_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Docker config (config/docker.toml) if DOCKER env var is set
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let base = config_dir.to_string_lossy();
    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://profitpilot.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", base)).required(false))
        .add_source(File::with_name(&format!("{}/{}", base, run_env)).required(false));

    if run_env.eq_ignore_ascii_case(DEFAULT_ENV) {
        builder = builder.set_default("handoff_jwt_secret", DEV_DEFAULT_HANDOFF_SECRET)?;
    }

    if env::var("DOCKER").is_ok() {
        info!("Docker environment detected");
        builder = builder.add_source(File::with_name(&format!("{}/docker", base)).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("handoff_jwt_secret").is_err() {
        error!("Hand-off secret is not configured. Set APP__HANDOFF_JWT_SECRET to a secure random string (minimum 32 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "handoff_jwt_secret is required but not configured. Set APP__HANDOFF_JWT_SECRET."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

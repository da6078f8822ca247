use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
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
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DB_NAME_PLACEHOLDER: &str = "{db_name}";
const DEFAULT_TENANT_URL_TEMPLATE: &str = "sqlite://{db_name}.db?mode=rwc";
const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EXTRA_SURCHARGE: i64 = 100;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Connection URL of the shared tenant directory
    pub directory_database_url: String,

    /// Connection URL for a tenant store; `{db_name}` is replaced with the
    /// tenant's storage location
    #[validate(custom = "validate_tenant_url_template")]
    pub tenant_database_url_template: String,

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

    /// Run directory and tenant migrations when stores are opened
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections per store
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections per store
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Upper bound for any single storage operation issued by the core
    #[serde(default = "default_storage_timeout_secs")]
    #[validate(custom = "validate_storage_timeout")]
    pub storage_timeout_secs: u64,

    /// Flat amount billed per extra ingredient per unit ordered
    #[serde(default = "default_extra_ingredient_surcharge")]
    #[validate(custom = "validate_surcharge")]
    pub extra_ingredient_surcharge: Decimal,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Seconds between sweeps that drop store handles of inactive tenants; 0 disables
    #[serde(default = "default_tenant_sweep_interval_secs")]
    pub tenant_sweep_interval_secs: u64,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the store URLs
    pub fn new(
        directory_database_url: String,
        tenant_database_url_template: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            directory_database_url,
            tenant_database_url_template,
            host,
            port,
            environment,
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
            storage_timeout_secs: default_storage_timeout_secs(),
            extra_ingredient_surcharge: default_extra_ingredient_surcharge(),
            event_channel_capacity: default_event_channel_capacity(),
            tenant_sweep_interval_secs: default_tenant_sweep_interval_secs(),
        }
    }

    /// Builds the connection URL for one tenant store
    pub fn tenant_database_url(&self, storage_location: &str) -> String {
        self.tenant_database_url_template
            .replace(DB_NAME_PLACEHOLDER, storage_location)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    pub fn tenant_sweep_interval(&self) -> Option<Duration> {
        (self.tenant_sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.tenant_sweep_interval_secs))
    }

    /// Checks if running in development environment
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

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Runs field validation followed by cross-field checks
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.validate_additional_constraints()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
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

fn default_storage_timeout_secs() -> u64 {
    DEFAULT_STORAGE_TIMEOUT_SECS
}

fn default_extra_ingredient_surcharge() -> Decimal {
    Decimal::from(DEFAULT_EXTRA_SURCHARGE)
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_tenant_sweep_interval_secs() -> u64 {
    300
}

fn validate_tenant_url_template(template: &str) -> Result<(), ValidationError> {
    if template.contains(DB_NAME_PLACEHOLDER) {
        Ok(())
    } else {
        let mut err = ValidationError::new("tenant_database_url_template");
        err.message = Some("Must contain the {db_name} placeholder".into());
        Err(err)
    }
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

fn validate_storage_timeout(secs: u64) -> Result<(), ValidationError> {
    if secs == 0 {
        let mut err = ValidationError::new("storage_timeout_secs");
        err.message = Some("storage_timeout_secs must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_surcharge(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() {
        let mut err = ValidationError::new("extra_ingredient_surcharge");
        err.message = Some("extra_ingredient_surcharge must not be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("comanda_api={},tower_http=debug,sqlx=warn", level);
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
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("directory_database_url", "sqlite://comanda_directory.db?mode=rwc")?
        .set_default("tenant_database_url_template", DEFAULT_TENANT_URL_TEMPLATE)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate_all().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "sqlite://{db_name}.db?mode=rwc".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn tenant_url_substitutes_storage_location() {
        let cfg = base_config();
        assert_eq!(
            cfg.tenant_database_url("la-pizzeria_pos_db"),
            "sqlite://la-pizzeria_pos_db.db?mode=rwc"
        );
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.tenant_database_url_template = "postgres://localhost/shared".into();
        let errors = cfg.validate_all().unwrap_err();
        assert!(errors
            .field_errors()
            .contains_key("tenant_database_url_template"));
    }

    #[test]
    fn negative_surcharge_is_rejected() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.extra_ingredient_surcharge = Decimal::from(-1);
        assert!(cfg.validate_all().is_err());
    }

    #[test]
    fn zero_storage_timeout_is_rejected() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.storage_timeout_secs = 0;
        assert!(cfg.validate_all().is_err());
    }

    #[test]
    fn zero_event_channel_capacity_is_rejected() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.event_channel_capacity = 0;
        let errors = cfg.validate_all().unwrap_err();
        assert!(errors.field_errors().contains_key("event_channel_capacity"));
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://example.com".into());
        assert!(cfg.validate_all().is_ok());
    }

    #[test]
    fn zero_sweep_interval_disables_the_sweep() {
        let mut cfg = base_config();
        assert_eq!(cfg.tenant_sweep_interval(), Some(Duration::from_secs(300)));
        cfg.tenant_sweep_interval_secs = 0;
        assert_eq!(cfg.tenant_sweep_interval(), None);
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_all().is_ok());
        assert_eq!(cfg.extra_ingredient_surcharge, Decimal::from(100));
    }
}

//! Configuration management

use clap::Parser;
use config::{builder::DefaultState, Config as ConfigBuilder, ConfigBuilder as Builder, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable prefix, e.g. `BOOKHUB_SERVER__PORT=8080`
pub const ENV_PREFIX: &str = "BOOKHUB";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid server configuration: {0}")]
    InvalidServer(String),

    #[error("Invalid database configuration: {0}")]
    InvalidDatabase(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Invalid security configuration: {0}")]
    InvalidSecurity(String),

    #[error("Invalid cache configuration: {0}")]
    InvalidCache(String),

    #[error("Invalid profiler configuration: {0}")]
    InvalidProfiler(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub cache: CacheConfig,
    pub profiler: ProfilerConfig,
}

/// Register the built-in defaults (lowest priority source)
fn with_defaults(builder: Builder<DefaultState>) -> Result<Builder<DefaultState>, ConfigError> {
    Ok(builder
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8000)?
        .set_default("server.max_connections", 100)?
        .set_default("server.request_timeout", 30)?
        .set_default("database.path", "./data/bookhub.db")?
        .set_default("database.connection_pool_size", 10)?
        .set_default("database.busy_timeout", 5000)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "json")?
        .set_default("logging.output", "stdout")?
        .set_default("logging.max_file_size", 10485760)? // 10 MB
        .set_default("logging.max_backups", 5)?
        .set_default("security.jwt_secret", "change-this-secret-in-production")?
        .set_default("security.access_token_expire_minutes", 60 * 24 * 7)?
        .set_default("security.admin_token_expire_minutes", 60 * 8)?
        .set_default("security.allowed_origins", vec!["*"])?
        .set_default("security.rate_limit_requests", 300)?
        .set_default("security.rate_limit_window", 60)?
        .set_default("security.enable_hsts", false)?
        .set_default("security.hsts_max_age", 31536000)?
        .set_default("security.bootstrap_admin_username", "admin")?
        .set_default("security.bootstrap_admin_password", "admin12345")?
        .set_default("security.bootstrap_admin_email", "admin@bookhub.local")?
        .set_default("security.max_login_attempts", 5)?
        .set_default("security.lockout_minutes", 15)?
        .set_default("cache.enabled", true)?
        .set_default("cache.max_size", 1000)?
        .set_default("cache.default_ttl", 3600)?
        .set_default("cache.cleanup_interval", 300)?
        .set_default("profiler.enabled", true)?
        .set_default("profiler.sample_rate", 0.1)?
        .set_default("profiler.slow_endpoint_threshold", 1.0)?
        .set_default("profiler.slow_dependency_threshold", 0.1)?
        .set_default("profiler.analysis_interval", 900)?)
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();

        // 1. Defaults
        let mut builder = with_defaults(ConfigBuilder::builder())?;

        // 2. Config file
        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(config_path.display().to_string()));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // 3. Environment variables
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("security.allowed_origins")
                .try_parsing(true),
        );

        // 4. CLI arguments
        if let Some(host) = &cli_args.host {
            builder = builder.set_override("server.host", host.clone())?;
        }
        if let Some(port) = cli_args.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(db_path) = &cli_args.database {
            builder = builder.set_override("database.path", db_path.display().to_string())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path, on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = with_defaults(ConfigBuilder::builder())?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Configuration made of the defaults only
    pub fn defaults() -> Result<Self, ConfigError> {
        let config: Config = with_defaults(ConfigBuilder::builder())?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.security.validate()?;
        self.cache.validate()?;
        self.profiler.validate()?;
        Ok(())
    }
}

/// Command-line arguments for configuration override
#[derive(Debug, Parser)]
#[command(name = "bookhub")]
#[command(about = "BookHub reading platform backend", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Server host address
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Database file path
    #[arg(short, long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub request_timeout: u64, // seconds
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidServer("host cannot be empty".to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidServer("port must be greater than 0".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidServer(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidServer(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub connection_pool_size: usize,
    pub busy_timeout: u64, // milliseconds
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidDatabase("path cannot be empty".to_string()));
        }

        if self.connection_pool_size == 0 {
            return Err(ConfigError::InvalidDatabase(
                "connection_pool_size must be greater than 0".to_string(),
            ));
        }

        if self.busy_timeout == 0 {
            return Err(ConfigError::InvalidDatabase(
                "busy_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub log_file: Option<PathBuf>,
    pub max_file_size: usize, // bytes
    pub max_backups: usize,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "level must be one of: {:?}",
                valid_levels
            )));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "format must be one of: {:?}",
                valid_formats
            )));
        }

        let valid_outputs = ["stdout", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "output must be one of: {:?}",
                valid_outputs
            )));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string(),
            ));
        }

        if self.max_file_size == 0 {
            return Err(ConfigError::InvalidLogging(
                "max_file_size must be greater than 0".to_string(),
            ));
        }

        if self.max_backups == 0 {
            return Err(ConfigError::InvalidLogging(
                "max_backups must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
    pub admin_token_expire_minutes: i64,
    pub allowed_origins: Vec<String>,
    pub rate_limit_requests: usize,
    pub rate_limit_window: u64, // seconds
    pub enable_hsts: bool,
    pub hsts_max_age: u64, // seconds
    pub bootstrap_admin_username: String,
    pub bootstrap_admin_password: String,
    pub bootstrap_admin_email: String,
    /// Failed logins for one account before it is locked
    pub max_login_attempts: u32,
    pub lockout_minutes: u64,
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < 16 {
            return Err(ConfigError::InvalidSecurity(
                "jwt_secret must be at least 16 characters".to_string(),
            ));
        }

        if self.access_token_expire_minutes <= 0 || self.admin_token_expire_minutes <= 0 {
            return Err(ConfigError::InvalidSecurity(
                "token expiry must be greater than 0".to_string(),
            ));
        }

        if self.allowed_origins.is_empty() {
            return Err(ConfigError::InvalidSecurity(
                "allowed_origins cannot be empty".to_string(),
            ));
        }

        if self.rate_limit_requests == 0 {
            return Err(ConfigError::InvalidSecurity(
                "rate_limit_requests must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_window == 0 {
            return Err(ConfigError::InvalidSecurity(
                "rate_limit_window must be greater than 0".to_string(),
            ));
        }

        if self.max_login_attempts == 0 || self.lockout_minutes == 0 {
            return Err(ConfigError::InvalidSecurity(
                "max_login_attempts and lockout_minutes must be greater than 0".to_string(),
            ));
        }

        if self.enable_hsts && self.hsts_max_age == 0 {
            return Err(ConfigError::InvalidSecurity(
                "hsts_max_age must be greater than 0 when enable_hsts is true".to_string(),
            ));
        }

        if self.bootstrap_admin_password.len() < 8 {
            return Err(ConfigError::InvalidSecurity(
                "bootstrap_admin_password must be at least 8 characters".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub default_ttl: u64,      // seconds
    pub cleanup_interval: u64, // seconds
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::InvalidCache("max_size must be greater than 0".to_string()));
        }

        if self.default_ttl == 0 {
            return Err(ConfigError::InvalidCache(
                "default_ttl must be greater than 0".to_string(),
            ));
        }

        if self.cleanup_interval == 0 {
            return Err(ConfigError::InvalidCache(
                "cleanup_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfilerConfig {
    pub enabled: bool,
    pub sample_rate: f64,
    pub slow_endpoint_threshold: f64,   // seconds
    pub slow_dependency_threshold: f64, // seconds
    pub analysis_interval: u64,         // seconds
    pub output_dir: Option<PathBuf>,
}

impl ProfilerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(ConfigError::InvalidProfiler(
                "sample_rate must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.slow_endpoint_threshold <= 0.0 || self.slow_dependency_threshold <= 0.0 {
            return Err(ConfigError::InvalidProfiler(
                "thresholds must be greater than 0".to_string(),
            ));
        }

        if self.analysis_interval == 0 {
            return Err(ConfigError::InvalidProfiler(
                "analysis_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::defaults().unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.cache.default_ttl, 3600);
        assert_eq!(config.profiler.sample_rate, 0.1);
        assert_eq!(config.profiler.slow_endpoint_threshold, 1.0);
        assert!(config.profiler.output_dir.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9100\n\n[profiler]\nsample_rate = 1.0\noutput_dir = \"./reports\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.profiler.sample_rate, 1.0);
        assert_eq!(config.profiler.output_dir, Some(PathBuf::from("./reports")));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_sample_rate() {
        let mut config = Config::defaults().unwrap();
        config.profiler.sample_rate = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidProfiler(_))));
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut config = Config::defaults().unwrap();
        config.security.jwt_secret = "short".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSecurity(_))));
    }
}

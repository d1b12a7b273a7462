use crate::cli::{Cli, Command, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

const ENV_PREFIX: &str = "XML_VALIDATOR_";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub network: NetworkConfig,
    pub validation: ValidationConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest request body accepted
    pub max_body_bytes: usize,
}

/// Network configuration for document and schema fetches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Timeout for each fetch in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts for transient failures
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Largest response body accepted
    pub max_response_bytes: u64,
    /// Serve `file://` URLs from the local filesystem
    pub allow_file_urls: bool,
}

/// Limits on the CPU-bound part of a validation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Timeout for compilation plus the streaming walk in seconds
    pub timeout_seconds: u64,
    /// Validations running at once; defaults to the number of CPUs
    pub max_concurrent_validations: Option<usize>,
    /// Largest number of documents in one schema set
    pub max_schema_documents: usize,
}

/// In-memory schema cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum number of cached schema documents
    pub max_entries: u64,
    /// Time-to-live for a cached schema document in seconds
    pub ttl_seconds: u64,
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
}

/// Output configuration for the `check` command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormatConfig,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    #[default]
    Human,
    Json,
    Summary,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
            OutputFormat::Summary => OutputFormatConfig::Summary,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
            OutputFormatConfig::Summary => OutputFormat::Summary,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 0,
            retry_delay_ms: 1000,
            max_response_bytes: 50 * 1024 * 1024,
            allow_file_urls: false,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            max_concurrent_validations: None,
            max_schema_documents: 256,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 256,
            ttl_seconds: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, cli).await
    }

    /// As [`load_config`](Self::load_config) with a custom environment provider
    pub async fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "xml-validator.toml",
            "xml-validator.json",
            ".xml-validator.toml",
            ".xml-validator.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("xml-validator");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Server settings
        if let Some(host) = env.get("XML_VALIDATOR_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_env(env, "PORT")? {
            config.server.port = port;
        }
        if let Some(max_body) = parse_env(env, "MAX_BODY_BYTES")? {
            config.server.max_body_bytes = max_body;
        }

        // Network settings
        if let Some(timeout) = parse_env(env, "TIMEOUT")? {
            config.network.timeout_seconds = timeout;
        }
        if let Some(retry_attempts) = parse_env(env, "RETRY_ATTEMPTS")? {
            config.network.retry_attempts = retry_attempts;
        }
        if let Some(allow) = parse_env(env, "ALLOW_FILE_URLS")? {
            config.network.allow_file_urls = allow;
        }

        // Validation settings
        if let Some(timeout) = parse_env(env, "VALIDATION_TIMEOUT")? {
            config.validation.timeout_seconds = timeout;
        }
        if let Some(max) = parse_env(env, "MAX_CONCURRENT_VALIDATIONS")? {
            config.validation.max_concurrent_validations = Some(max);
        }
        if let Some(max) = parse_env(env, "MAX_SCHEMA_DOCUMENTS")? {
            config.validation.max_schema_documents = max;
        }

        // Cache settings
        if let Some(enabled) = parse_env(env, "CACHE_ENABLED")? {
            config.cache.enabled = enabled;
        }
        if let Some(ttl) = parse_env(env, "CACHE_TTL")? {
            config.cache.ttl_seconds = ttl;
        }
        if let Some(entries) = parse_env(env, "CACHE_MAX_ENTRIES")? {
            config.cache.max_entries = entries;
        }

        // Logging settings
        if let Some(filter) = env.get("XML_VALIDATOR_LOG") {
            config.logging.filter = filter;
        }
        if let Some(json) = parse_env(env, "LOG_JSON")? {
            config.logging.json = json;
        }

        // Output settings
        if let Some(format) = env.get("XML_VALIDATOR_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                "summary" => OutputFormatConfig::Summary,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid XML_VALIDATOR_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    ///
    /// Only flags actually given on the command line override.
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        match &cli.command {
            Command::Serve(args) => {
                if let Some(host) = &args.host {
                    config.server.host = host.clone();
                }
                if let Some(port) = args.port {
                    config.server.port = port;
                }
                if let Some(timeout) = args.timeout {
                    config.network.timeout_seconds = timeout;
                }
                if args.allow_file_urls {
                    config.network.allow_file_urls = true;
                }
            }
            Command::Check(args) => {
                // Local paths are the point of `check`
                config.network.allow_file_urls = true;
                if let Some(timeout) = args.timeout {
                    config.network.timeout_seconds = timeout;
                }
                if let Some(format) = args.format {
                    config.output.format = format.into();
                }
                if args.verbose {
                    config.output.verbose = true;
                    config.output.quiet = false;
                }
                if args.quiet {
                    config.output.quiet = true;
                    config.output.verbose = false;
                }
            }
        }

        config
    }

    /// Merge two configurations (second takes precedence)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        base.server = override_config.server;
        base.network = override_config.network;

        base.validation.timeout_seconds = override_config.validation.timeout_seconds;
        if override_config.validation.max_concurrent_validations.is_some() {
            base.validation.max_concurrent_validations =
                override_config.validation.max_concurrent_validations;
        }
        base.validation.max_schema_documents = override_config.validation.max_schema_documents;

        base.cache = override_config.cache;
        base.logging = override_config.logging;
        base.output = override_config.output;

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.server.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Server host must not be empty".to_string(),
            ));
        }

        if config.server.max_body_bytes == 0 {
            return Err(ConfigError::Validation(
                "Maximum body size must be greater than 0".to_string(),
            ));
        }

        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.network.retry_attempts > 10 {
            return Err(ConfigError::Validation(
                "Retry attempts cannot exceed 10".to_string(),
            ));
        }

        if config.validation.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Validation timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(max) = config.validation.max_concurrent_validations {
            if max == 0 {
                return Err(ConfigError::Validation(
                    "Concurrent validations must be greater than 0".to_string(),
                ));
            }
            if max > 1000 {
                return Err(ConfigError::Validation(
                    "Concurrent validations cannot exceed 1000".to_string(),
                ));
            }
        }

        if config.validation.max_schema_documents == 0 {
            return Err(ConfigError::Validation(
                "Schema document limit must be greater than 0".to_string(),
            ));
        }

        if config.cache.enabled && (config.cache.ttl_seconds == 0 || config.cache.max_entries == 0)
        {
            return Err(ConfigError::Validation(
                "Cache TTL and size must be greater than 0".to_string(),
            ));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }

    /// `host:port` the server binds to
    pub fn get_bind_address(config: &Config) -> String {
        format!("{}:{}", config.server.host, config.server.port)
    }

    /// Effective number of concurrent validations
    pub fn get_concurrency(config: &Config) -> usize {
        config
            .validation
            .max_concurrent_validations
            .unwrap_or_else(num_cpus::get)
    }

    /// Convert configuration to Duration for network timeout
    pub fn get_timeout_duration(config: &Config) -> Duration {
        Duration::from_secs(config.network.timeout_seconds)
    }

    /// Convert configuration to Duration for the validation timeout
    pub fn get_validation_timeout(config: &Config) -> Duration {
        Duration::from_secs(config.validation.timeout_seconds)
    }
}

/// Read and parse `XML_VALIDATOR_{name}`
fn parse_env<T: std::str::FromStr>(env: &impl EnvProvider, name: &str) -> Result<Option<T>> {
    let key = format!("{}{}", ENV_PREFIX, name);
    match env.get(&key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, value))),
    }
}

//! Layered configuration loading.
//!
//! Sources, lowest precedence first: the structured config file (if any),
//! then process environment variables. `.env` files only feed the process
//! environment and never override variables that are already set.

use serde::de::DeserializeOwned;
use std::env;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use crate::logging::{init_logging, LogFormat, DEFAULT_LOG_FILTER};

/// Prefix for environment variables read by [`ConfigBuilder`].
///
/// `METHOD_KIT_PRIVATE_ERRORS=true` sets `private_errors`; nested keys use
/// `__`, e.g. `METHOD_KIT_LOGGING__FORMAT=json`.
pub const DEFAULT_ENV_PREFIX: &str = "METHOD_KIT";

#[derive(Debug)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    NotFound(PathBuf),
    /// The file has an extension we do not know how to read.
    UnsupportedFormat(PathBuf),
    /// Sources were read but could not be merged or deserialized.
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "Config file not found: {}", path.display()),
            Self::UnsupportedFormat(path) => {
                write!(f, "Unsupported config file format: {}", path.display())
            }
            Self::Parse(msg) => write!(f, "Failed to parse config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Kinds of files accepted by [`ConfigBuilder::with_config_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    DotEnv,
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect the format from the file name.
    ///
    /// Anything named `.env` or `.env.<suffix>` is a dotenv file.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let file_name = path.file_name()?.to_str()?;

        if file_name == ".env" || file_name.starts_with(".env.") {
            return Some(Self::DotEnv);
        }

        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "env" => Some(Self::DotEnv),
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn file_format(self) -> Option<config::FileFormat> {
        match self {
            Self::DotEnv => None,
            Self::Toml => Some(config::FileFormat::Toml),
            Self::Yaml => Some(config::FileFormat::Yaml),
            Self::Json => Some(config::FileFormat::Json),
        }
    }
}

/// Builder for any `serde`-deserializable settings type.
///
/// ```ignore
/// use method_kit::ConfigBuilder;
///
/// let settings: MethodSettings = ConfigBuilder::new()
///     .with_dotenv()
///     .with_config_file("methods.toml")
///     .build()?;
/// ```
pub struct ConfigBuilder {
    load_default_dotenv: bool,
    files: Vec<PathBuf>,
    env_prefix: Option<String>,
    #[cfg(feature = "tracing")]
    init_logging: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            load_default_dotenv: false,
            files: Vec::new(),
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
            #[cfg(feature = "tracing")]
            init_logging: false,
        }
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `.env` from the current directory before reading the environment.
    pub fn with_dotenv(mut self) -> Self {
        self.load_default_dotenv = true;
        self
    }

    /// Add a config file. Dotenv files may be given several times; for
    /// structured formats the last one wins.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Read environment variables under `prefix` instead of [`DEFAULT_ENV_PREFIX`].
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Read every environment variable, unprefixed.
    pub fn without_env_prefix(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Install the global subscriber from `LOG_FORMAT` / `RUST_LOG` during `build`.
    #[cfg(feature = "tracing")]
    pub fn with_logging_from_env(mut self) -> Self {
        self.init_logging = true;
        self
    }

    pub fn build<C: DeserializeOwned>(self) -> Result<C, ConfigError> {
        if self.load_default_dotenv {
            let _ = dotenvy::dotenv();
        }

        let mut structured: Option<(PathBuf, config::FileFormat)> = None;

        for path in &self.files {
            let format = ConfigFormat::from_path(path)
                .ok_or_else(|| ConfigError::UnsupportedFormat(path.clone()))?;

            match format.file_format() {
                None => {
                    if path.exists() {
                        let _ = dotenvy::from_path(path);
                    }
                }
                Some(file_format) => {
                    if !path.exists() {
                        return Err(ConfigError::NotFound(path.clone()));
                    }
                    structured = Some((path.clone(), file_format));
                }
            }
        }

        #[cfg(feature = "tracing")]
        if self.init_logging {
            init_logging(LogFormat::from_env(), DEFAULT_LOG_FILTER);
        }

        let mut builder = config::Config::builder();
        if let Some((path, format)) = structured {
            builder = builder.add_source(config::File::from(path).format(format));
        }

        let settings = builder
            .add_source(EnvSource {
                prefix: self.env_prefix,
            })
            .build()?;

        Ok(settings.try_deserialize::<C>()?)
    }
}

/// Environment source that also maps the conventional deployment variables
/// (`ENVIRONMENT`, `APP_ENV`, `RUST_ENV`) onto the `environment` key.
#[derive(Debug, Clone)]
struct EnvSource {
    prefix: Option<String>,
}

impl config::Source for EnvSource {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        use config::{Environment, Value, ValueKind};

        let source = match &self.prefix {
            Some(prefix) => Environment::with_prefix(prefix).prefix_separator("_"),
            None => Environment::default(),
        };

        let mut map = source.separator("__").try_parsing(true).collect()?;

        if !map.contains_key("environment") {
            if let Ok(val) = env::var("ENVIRONMENT")
                .or_else(|_| env::var("APP_ENV"))
                .or_else(|_| env::var("RUST_ENV"))
            {
                map.insert(
                    "environment".to_string(),
                    Value::new(None, ValueKind::String(val)),
                );
            }
        }

        Ok(map)
    }
}

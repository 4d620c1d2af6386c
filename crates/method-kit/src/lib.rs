//! # method-kit
//!
//! Ambient services shared by the method-kit crates: layered configuration
//! loading, the deployment [`Environment`], and global logging setup.
//!
//! ## Features
//!
//! - `tracing` - Enable logging initialization with tracing-subscriber (default)

mod config;
mod environment;
mod logging;

pub use config::{ConfigBuilder, ConfigError, ConfigFormat, DEFAULT_ENV_PREFIX};
pub use environment::Environment;
pub use logging::{LogFormat, DEFAULT_LOG_FILTER};

#[cfg(feature = "tracing")]
pub use logging::{init_logging, init_logging_from_env};

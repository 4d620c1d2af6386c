//! Deployable method settings.

use serde::{Deserialize, Serialize};

use crate::request_id::DEFAULT_REQUEST_ID_BYTES;

pub use method_kit::{ConfigBuilder, ConfigError, Environment};

/// Settings shared by the methods of a service, loadable with
/// [`ConfigBuilder`].
///
/// ```toml
/// environment = "production"
/// prefix_errors = true
/// request_id_bytes = 18
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodSettings {
    pub environment: Environment,
    /// Redact messages of errors not marked public. Defaults to `true` in
    /// production and `false` elsewhere.
    pub private_errors: Option<bool>,
    /// Prefix caller-visible error messages with the message id.
    pub prefix_errors: bool,
    /// Random bytes per request id. Values below 8 are raised to 8.
    pub request_id_bytes: usize,
}

impl Default for MethodSettings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            private_errors: None,
            prefix_errors: false,
            request_id_bytes: DEFAULT_REQUEST_ID_BYTES,
        }
    }
}

impl MethodSettings {
    /// ```ignore
    /// let settings: MethodSettings = MethodSettings::builder()
    ///     .with_dotenv()
    ///     .with_config_file("methods.toml")
    ///     .build()?;
    /// ```
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn private_errors(&self) -> bool {
        self.private_errors
            .unwrap_or_else(|| self.environment.private_errors_by_default())
    }
}

//! Deployment environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Where the process is running.
///
/// Production deployments hide internal error messages from callers unless a
/// method explicitly opts out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        })
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

impl Environment {
    /// Read `ENVIRONMENT`, `APP_ENV` or `RUST_ENV`, in that order.
    pub fn from_env() -> Self {
        env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .or_else(|_| env::var("RUST_ENV"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Whether error messages should be redacted unless marked public.
    pub fn private_errors_by_default(&self) -> bool {
        self.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_production_aliases() {
        for raw in ["production", "Production", "PROD", " prod "] {
            assert_eq!(raw.parse::<Environment>().unwrap(), Environment::Production);
        }
    }

    #[test]
    fn anything_else_is_development() {
        for raw in ["development", "dev", "staging", ""] {
            assert_eq!(raw.parse::<Environment>().unwrap(), Environment::Development);
        }
    }

    #[test]
    fn production_redacts_by_default() {
        assert!(Environment::Production.private_errors_by_default());
        assert!(!Environment::Development.private_errors_by_default());
    }

    #[test]
    fn deserializes_from_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            environment: Environment,
        }

        let parsed: Wrapper = config::Config::builder()
            .set_override("environment", "prod")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(parsed.environment.is_production());
    }
}

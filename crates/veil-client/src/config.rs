//! Client configuration loaded from environment variables.
//!
//! Everything has a default, so a client starts with zero configuration
//! against production.

use std::path::PathBuf;

use veil_shared::{EndpointOverrides, Environment};
use veil_store::Database;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Environment used when the login input carries no prefix.
    /// Env: `VEIL_DEFAULT_ENV` (`prod` / `stg` / `dev`)
    /// Default: production
    pub default_environment: Environment,

    /// Endpoint overrides, captured once at startup.
    /// Env: `VEIL_IDENTITY_URL`, `VEIL_TRANSPORT_HOST`, `VEIL_TRANSPORT_PORT`,
    /// `VEIL_CA_BUNDLE`
    pub overrides: EndpointOverrides,

    /// Directory holding the local store.
    /// Env: `VEIL_DATA_DIR`
    /// Default: the platform data directory
    pub data_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self {
            overrides: EndpointOverrides::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("VEIL_DEFAULT_ENV") {
            match val.parse::<Environment>() {
                Ok(env) => config.default_environment = env,
                Err(e) => {
                    tracing::warn!(value = %val, error = %e, "Invalid VEIL_DEFAULT_ENV, using default");
                }
            }
        }

        if let Ok(dir) = std::env::var("VEIL_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        config
    }

    /// Open the local store. Failure here is fatal for the client.
    pub fn open_store(&self) -> Result<Database> {
        let db = match &self.data_dir {
            Some(dir) => Database::open_in(dir),
            None => Database::new(),
        };
        db.map_err(|e| {
            tracing::error!(error = %e, "Cannot open local store");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.default_environment, Environment::Production);
        assert_eq!(config.overrides, EndpointOverrides::default());
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_open_store_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            data_dir: Some(dir.path().join("nested")),
            ..ClientConfig::default()
        };
        let db = config.open_store().unwrap();
        assert!(db.path().unwrap().starts_with(dir.path()));
    }

    #[test]
    fn test_unwritable_data_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let config = ClientConfig {
            data_dir: Some(blocker.join("store")),
            ..ClientConfig::default()
        };
        let err = config.open_store().unwrap_err();
        assert_eq!(err.classify(), ErrorClass::Fatal);
    }
}

//! Deployment environments and endpoint resolution.
//!
//! A login identifier may carry an environment prefix (`stg@alice`). The
//! selected [`Environment`] is combined with an immutable set of
//! [`EndpointOverrides`] captured from the process environment to produce the
//! [`Endpoints`] used for the rest of the login attempt.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{
    ADDRESS_SEPARATOR, DEFAULT_TRANSPORT_PORT, DEV_ENV_PREFIX, ENV_CA_BUNDLE, ENV_IDENTITY_URL,
    ENV_TRANSPORT_HOST, ENV_TRANSPORT_PORT, PROD_ENV_PREFIX, STG_ENV_PREFIX,
};
use crate::types::UserIdentity;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
}

impl Environment {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Production => PROD_ENV_PREFIX,
            Self::Staging => STG_ENV_PREFIX,
            Self::Development => DEV_ENV_PREFIX,
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            PROD_ENV_PREFIX => Some(Self::Production),
            STG_ENV_PREFIX => Some(Self::Staging),
            DEV_ENV_PREFIX => Some(Self::Development),
            _ => None,
        }
    }

    /// Built-in identity service endpoint.
    pub fn default_identity_url(self) -> &'static str {
        match self {
            Self::Production => "https://identity.veil.chat",
            Self::Staging => "https://identity-stg.veil.chat",
            Self::Development => "https://identity-dev.veil.chat",
        }
    }

    /// Built-in transport host.
    pub fn default_transport_host(self) -> &'static str {
        match self {
            Self::Production => "xmpp.veil.chat",
            Self::Staging => "xmpp-stg.veil.chat",
            Self::Development => "xmpp-dev.veil.chat",
        }
    }

    /// Split a raw login identifier into environment and identity.
    ///
    /// `<prefix>@<id>` with a recognised prefix selects that environment.
    /// Anything else selects `default` and keeps the input unchanged as the
    /// identity.
    pub fn resolve(raw: &str, default: Environment) -> (Environment, UserIdentity) {
        let pieces: Vec<&str> = raw.split(ADDRESS_SEPARATOR).collect();
        if let [prefix, id] = pieces.as_slice() {
            if let Some(env) = Self::from_prefix(prefix) {
                return (env, UserIdentity::new(*id));
            }
        }
        (default, UserIdentity::new(raw))
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Self::Production),
            "stg" | "staging" => Ok(Self::Staging),
            "dev" | "development" => Ok(Self::Development),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Endpoint overrides read once from the process environment.
///
/// Empty variables count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointOverrides {
    /// Env: `VEIL_IDENTITY_URL`
    pub identity_url: Option<String>,
    /// Env: `VEIL_TRANSPORT_HOST`
    pub transport_host: Option<String>,
    /// Env: `VEIL_TRANSPORT_PORT`. Kept raw; validated at lookup.
    pub transport_port: Option<String>,
    /// Env: `VEIL_CA_BUNDLE`
    pub ca_bundle: Option<PathBuf>,
}

impl EndpointOverrides {
    pub fn from_env() -> Self {
        Self {
            identity_url: non_empty_var(ENV_IDENTITY_URL),
            transport_host: non_empty_var(ENV_TRANSPORT_HOST),
            transport_port: non_empty_var(ENV_TRANSPORT_PORT),
            ca_bundle: non_empty_var(ENV_CA_BUNDLE).map(PathBuf::from),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Service endpoints for one login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    environment: Environment,
    overrides: EndpointOverrides,
}

impl Endpoints {
    pub fn new(environment: Environment, overrides: EndpointOverrides) -> Self {
        Self {
            environment,
            overrides,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn identity_service_url(&self) -> String {
        let url = self
            .overrides
            .identity_url
            .clone()
            .unwrap_or_else(|| self.environment.default_identity_url().to_string());
        debug!(url = %url, env = %self.environment, "identity service URL");
        url
    }

    pub fn transport_host(&self) -> String {
        let host = self
            .overrides
            .transport_host
            .clone()
            .unwrap_or_else(|| self.environment.default_transport_host().to_string());
        debug!(host = %host, env = %self.environment, "transport host");
        host
    }

    pub fn transport_port(&self) -> u16 {
        let port = match self.overrides.transport_port.as_deref() {
            Some(raw) => raw.trim().parse::<u16>().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid transport port override, using default");
                DEFAULT_TRANSPORT_PORT
            }),
            None => DEFAULT_TRANSPORT_PORT,
        };
        debug!(port, "transport port");
        port
    }

    pub fn ca_bundle(&self) -> Option<PathBuf> {
        self.overrides.ca_bundle.clone()
    }
}

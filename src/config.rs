// src/config.rs

use anyhow::{bail, Result};
use std::{env, fmt};

pub const ENV_DATABASE: &str = "KUSTO_DB";
pub const ENV_CLIENT_ID: &str = "AZURE_SP_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "AZURE_SP_CLIENT_SECRET";
pub const ENV_TENANT_ID: &str = "AZURE_SP_TENANT_ID";
pub const ENV_ENDPOINT: &str = "KUSTO_ENDPOINT";
pub const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Service-principal credentials plus the engine they authenticate against.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub endpoint: String,
    pub authority_host: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("endpoint", &self.endpoint)
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

/// Everything the provisioning run reads from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: String,
    pub credentials: Credentials,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty (or whitespace-only) values
    /// count as missing, and every missing key is reported in one error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut required = |key: &'static str| -> String {
            match lookup(key).map(|v| v.trim().to_owned()) {
                Some(v) if !v.is_empty() => v,
                _ => {
                    missing.push(key);
                    String::new()
                }
            }
        };

        let database = required(ENV_DATABASE);
        let client_id = required(ENV_CLIENT_ID);
        let client_secret = required(ENV_CLIENT_SECRET);
        let tenant_id = required(ENV_TENANT_ID);
        let endpoint = required(ENV_ENDPOINT);

        if !missing.is_empty() {
            bail!(
                "missing one or more environment variables: {}",
                missing.join(", ")
            );
        }

        let authority_host = lookup(ENV_AUTHORITY_HOST)
            .map(|v| v.trim().trim_end_matches('/').to_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_owned());

        Ok(Self {
            database,
            credentials: Credentials {
                client_id,
                client_secret,
                tenant_id,
                endpoint,
                authority_host,
            },
        })
    }
}

// src/auth.rs

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::config::Credentials;

/// Refresh this long before the token service says a token expires.
const EXPIRY_SKEW_SECS: i64 = 300;

/// A bearer token and the instant it stops being valid.
#[derive(Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) < self.expires_on
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth2 client-credentials grant for a service principal, with a
/// per-resource token cache.
pub struct ClientSecretCredential {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cache: Mutex<HashMap<String, AccessToken>>,
}

impl ClientSecretCredential {
    pub fn new(http: Client, creds: &Credentials) -> Self {
        Self {
            http,
            token_url: token_url(&creds.authority_host, &creds.tenant_id),
            client_id: creds.client_id.clone(),
            client_secret: creds.client_secret.clone(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Bearer token for `resource` (e.g. the cluster URL), served from
    /// cache while still fresh.
    #[instrument(level = "debug", skip(self))]
    pub async fn token(&self, resource: &str) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(tok) = cache.get(resource) {
            if tok.is_fresh(Utc::now()) {
                return Ok(tok.secret.clone());
            }
        }

        let tok = self.request_token(resource).await?;
        debug!(expires_on = %tok.expires_on, "acquired token");
        let secret = tok.secret.clone();
        cache.insert(resource.to_owned(), tok);
        Ok(secret)
    }

    async fn request_token(&self, resource: &str) -> Result<AccessToken> {
        let scope = scope_for(resource);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.token_url))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading token response from {}", self.token_url))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(e) => anyhow!(
                    "token request rejected ({}): {}: {}",
                    status,
                    e.error,
                    e.error_description.unwrap_or_default()
                ),
                Err(_) => anyhow!("token request rejected ({})", status),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).context("parsing token response")?;
        Ok(AccessToken {
            secret: parsed.access_token,
            expires_on: expiry_after(Utc::now(), parsed.expires_in)?,
        })
    }
}

/// `now + expires_in` seconds, rejecting lifetimes chrono cannot represent.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| anyhow!("token service returned unusable expires_in {}", expires_in))
}

fn token_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

fn scope_for(resource: &str) -> String {
    format!("{}/.default", resource.trim_end_matches('/'))
}

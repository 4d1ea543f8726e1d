// src/kusto/mod.rs

pub mod response;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::{Host, Url};
use uuid::Uuid;

use crate::auth::ClientSecretCredential;
use crate::config::Credentials;

pub use response::{service_error_message, KustoColumn, KustoResponse, KustoTable};

const MGMT_PATH: &str = "v1/rest/mgmt";
const CLIENT_NAME: &str = "kusto-provision";
const INGEST_PREFIX: &str = "ingest-";

/// Anything that can run a management command against a database.
#[async_trait]
pub trait Management: Send + Sync {
    async fn execute_mgmt(&self, database: &str, command: &str) -> Result<KustoResponse>;
}

/// Authenticated handle bound to one service endpoint.
#[derive(Clone)]
pub struct KustoClient {
    http: Client,
    endpoint: Url,
    credential: Arc<ClientSecretCredential>,
}

impl fmt::Debug for KustoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KustoClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl KustoClient {
    pub fn new(creds: &Credentials) -> Result<Self> {
        let endpoint = Url::parse(&creds.endpoint)
            .with_context(|| format!("parsing endpoint URL {}", creds.endpoint))?;
        if endpoint.host_str().is_none() {
            return Err(anyhow!("endpoint URL {} has no host", creds.endpoint));
        }
        let http = Client::builder()
            .user_agent(concat!("kusto-provision/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        let credential = Arc::new(ClientSecretCredential::new(http.clone(), creds));
        Ok(Self {
            http,
            endpoint,
            credential,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Token resource for this endpoint: the origin without a trailing slash.
    fn resource(&self) -> &str {
        self.endpoint.as_str().trim_end_matches('/')
    }

    /// Acquire a token up front so bad credentials surface immediately.
    pub async fn authenticate(&self) -> Result<()> {
        self.credential
            .token(self.resource())
            .await
            .with_context(|| format!("authenticating against {}", self.resource()))?;
        Ok(())
    }

    /// The same credentials pointed at the cluster's ingestion endpoint.
    pub fn ingestion_client(&self) -> Result<Self> {
        Ok(Self {
            http: self.http.clone(),
            endpoint: ingestion_endpoint(&self.endpoint)?,
            credential: Arc::clone(&self.credential),
        })
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }
}

#[async_trait]
impl Management for KustoClient {
    #[instrument(level = "debug", skip(self, command))]
    async fn execute_mgmt(&self, database: &str, command: &str) -> Result<KustoResponse> {
        let url = self.endpoint.join(MGMT_PATH)?;
        let token = self.credential.token(self.resource()).await?;
        let request_id = client_request_id();
        debug!(endpoint = %self.endpoint, request_id = %request_id, "executing management command");

        let resp = self
            .http
            .post(url.clone())
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .header("x-ms-client-request-id", &request_id)
            .header("x-ms-app", CLIENT_NAME)
            .json(&mgmt_body(database, command))
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading response from {}", url))?;

        if !status.is_success() {
            let detail = service_error_message(&body).unwrap_or_else(|| body.trim().to_owned());
            return Err(anyhow!(
                "management command failed ({}) [request {}]: {}",
                status,
                request_id,
                detail
            ));
        }

        serde_json::from_str(&body).context("parsing management response")
    }
}

fn mgmt_body(database: &str, command: &str) -> Value {
    json!({ "db": database, "csl": command })
}

fn client_request_id() -> String {
    format!("{};{}", CLIENT_NAME, Uuid::new_v4())
}

/// `https://ingest-<host>` for a cluster endpoint. Already-prefixed hosts,
/// IP addresses and localhost are returned unchanged.
pub fn ingestion_endpoint(endpoint: &Url) -> Result<Url> {
    match endpoint.host() {
        Some(Host::Domain(host)) if host.starts_with(INGEST_PREFIX) || host == "localhost" => {
            Ok(endpoint.clone())
        }
        Some(Host::Domain(host)) => {
            let mut url = endpoint.clone();
            url.set_host(Some(&format!("{}{}", INGEST_PREFIX, host)))
                .with_context(|| format!("deriving ingestion endpoint from {}", endpoint))?;
            Ok(url)
        }
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => Ok(endpoint.clone()),
        None => Err(anyhow!("endpoint URL {} has no host", endpoint)),
    }
}

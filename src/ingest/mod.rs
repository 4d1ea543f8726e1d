// src/ingest/mod.rs

pub mod blob;
pub mod message;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header;
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::kusto::{KustoClient, KustoResponse, Management};
use message::{queue_messages_url, IngestionMessage};

pub use blob::{blob_url, redact_sas};

/// Database the ingestion service answers its own commands in.
const INGEST_ADMIN_DB: &str = "NetDefaultDB";
const GET_RESOURCES_COMMAND: &str = ".get ingestion resources";
const GET_IDENTITY_TOKEN_COMMAND: &str = ".get kusto identity token";
const SECURED_QUEUE_KIND: &str = "SecuredReadyForAggregationQueue";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Csv => "csv",
        }
    }

    /// Mapping kind the service expects alongside a mapping reference.
    pub fn mapping_kind(&self) -> &'static str {
        match self {
            DataFormat::Csv => "Csv",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionProperties {
    pub format: DataFormat,
    pub mapping_reference: Option<String>,
}

impl IngestionProperties {
    pub fn new(format: DataFormat) -> Self {
        Self {
            format,
            mapping_reference: None,
        }
    }

    pub fn with_mapping_reference(mut self, name: impl Into<String>) -> Self {
        self.mapping_reference = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionStatus {
    /// Accepted onto the ingestion queue; the data has not landed yet.
    Queued,
}

/// What was handed to the ingestion service. Paths have their SAS stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReceipt {
    pub status: IngestionStatus,
    pub source_id: Uuid,
    pub database: String,
    pub table: String,
    pub blob_path: String,
    pub queue: String,
}

/// Anything that can submit a blob for ingestion into `database.table`.
#[async_trait]
pub trait Ingestor: Send + Sync {
    async fn ingest_from_blob(
        &self,
        database: &str,
        table: &str,
        blob_url: &str,
        props: &IngestionProperties,
    ) -> Result<IngestionReceipt>;
}

#[async_trait]
impl Ingestor for KustoClient {
    async fn ingest_from_blob(
        &self,
        database: &str,
        table: &str,
        blob_url: &str,
        props: &IngestionProperties,
    ) -> Result<IngestionReceipt> {
        let ingest =
            IngestClient::new(self, database, table).context("failed to create ingestion client")?;
        ingest
            .submit_blob(blob_url, props)
            .await
            .context("failed to ingest file")
    }
}

/// Queued ingestion into one table, bound to the cluster's ingestion endpoint.
pub struct IngestClient {
    client: KustoClient,
    database: String,
    table: String,
}

impl IngestClient {
    pub fn new(client: &KustoClient, database: &str, table: &str) -> Result<Self> {
        if database.trim().is_empty() {
            bail!("ingestion database name is empty");
        }
        if table.trim().is_empty() {
            bail!("ingestion table name is empty");
        }
        Ok(Self {
            client: client.ingestion_client()?,
            database: database.to_owned(),
            table: table.to_owned(),
        })
    }

    /// Post one ingestion message for `blob_url` onto a secured queue and
    /// return without waiting for the data to land.
    #[instrument(
        level = "info",
        skip(self, blob_url, props),
        fields(db = %self.database, table = %self.table)
    )]
    pub async fn submit_blob(
        &self,
        blob_url: &str,
        props: &IngestionProperties,
    ) -> Result<IngestionReceipt> {
        let resources = self
            .client
            .execute_mgmt(INGEST_ADMIN_DB, GET_RESOURCES_COMMAND)
            .await
            .context("fetching ingestion resources")?;
        let queue = pick_queue(&resources)?;

        let identity = self
            .client
            .execute_mgmt(INGEST_ADMIN_DB, GET_IDENTITY_TOKEN_COMMAND)
            .await
            .context("fetching ingestion identity token")?;
        let auth_context = authorization_context(&identity)?;

        let msg = IngestionMessage::new(blob_url, &self.database, &self.table, props, auth_context);
        let url = queue_messages_url(&queue)?;
        let queue_shown = redact_sas(url.as_str());
        debug!(queue = %queue_shown, id = %msg.id, "posting ingestion message");

        let resp = self
            .client
            .http()
            .post(url)
            .header(header::CONTENT_TYPE, "application/xml")
            .body(msg.to_queue_body()?)
            .send()
            .await
            .with_context(|| format!("POST {} failed", queue_shown))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "queue rejected ingestion message ({}): {}",
                status,
                body.trim()
            ));
        }

        info!(id = %msg.id, "ingestion queued");
        Ok(IngestionReceipt {
            status: IngestionStatus::Queued,
            source_id: msg.id,
            database: self.database.clone(),
            table: self.table.clone(),
            blob_path: redact_sas(blob_url),
            queue: queue_shown,
        })
    }
}

/// First secured aggregation queue listed by `.get ingestion resources`.
fn pick_queue(resources: &KustoResponse) -> Result<String> {
    let table = resources.primary()?;
    let kind_idx = table
        .column_index("ResourceTypeName")
        .ok_or_else(|| anyhow!("ingestion resources lack ResourceTypeName"))?;
    let root_idx = table
        .column_index("StorageRoot")
        .ok_or_else(|| anyhow!("ingestion resources lack StorageRoot"))?;
    table
        .rows
        .iter()
        .find_map(|row| {
            let kind = row.get(kind_idx).and_then(Value::as_str)?;
            let root = row.get(root_idx).and_then(Value::as_str)?;
            (kind == SECURED_QUEUE_KIND).then(|| root.to_owned())
        })
        .ok_or_else(|| anyhow!("ingestion service returned no {}", SECURED_QUEUE_KIND))
}

fn authorization_context(identity: &KustoResponse) -> Result<String> {
    identity
        .primary()?
        .string_column("AuthorizationContext")?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("ingestion service returned no authorization context"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> KustoResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn picks_secured_queue() -> Result<()> {
        let resources = response(
            r#"{"Tables":[{"TableName":"Table_0",
                "Columns":[{"ColumnName":"ResourceTypeName","DataType":"String"},{"ColumnName":"StorageRoot","DataType":"String"}],
                "Rows":[
                    ["TempStorage","https://abc.blob.core.windows.net/tmp?sv=1"],
                    ["FailedIngestionsQueue","https://abc.queue.core.windows.net/failed?sv=1"],
                    ["SecuredReadyForAggregationQueue","https://abc.queue.core.windows.net/ready-0?sv=1"],
                    ["SecuredReadyForAggregationQueue","https://abc.queue.core.windows.net/ready-1?sv=1"]
                ]}]}"#,
        );
        assert_eq!(
            pick_queue(&resources)?,
            "https://abc.queue.core.windows.net/ready-0?sv=1"
        );
        Ok(())
    }

    #[test]
    fn missing_queue_is_an_error() {
        let resources = response(
            r#"{"Tables":[{"TableName":"Table_0",
                "Columns":[{"ColumnName":"ResourceTypeName"},{"ColumnName":"StorageRoot"}],
                "Rows":[["TempStorage","https://abc.blob.core.windows.net/tmp?sv=1"]]}]}"#,
        );
        let err = pick_queue(&resources).unwrap_err();
        assert!(err.to_string().contains(SECURED_QUEUE_KIND));
    }

    #[test]
    fn reads_authorization_context() -> Result<()> {
        let identity = response(
            r#"{"Tables":[{"TableName":"Table_0",
                "Columns":[{"ColumnName":"AuthorizationContext","DataType":"String"}],
                "Rows":[["ctx-token"]]}]}"#,
        );
        assert_eq!(authorization_context(&identity)?, "ctx-token");

        let empty = response(
            r#"{"Tables":[{"TableName":"Table_0","Columns":[{"ColumnName":"AuthorizationContext"}],"Rows":[]}]}"#,
        );
        assert!(authorization_context(&empty).is_err());
        Ok(())
    }

    #[test]
    fn ingest_client_rejects_empty_names() -> Result<()> {
        let creds = crate::config::Credentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            tenant_id: "tenant".into(),
            endpoint: "https://mycluster.kusto.windows.net".into(),
            authority_host: "https://login.microsoftonline.com".into(),
        };
        let client = KustoClient::new(&creds)?;
        assert!(IngestClient::new(&client, "", "StormEvents").is_err());
        assert!(IngestClient::new(&client, "db", "  ").is_err());

        let ok = IngestClient::new(&client, "db", "StormEvents")?;
        assert_eq!(
            ok.client.endpoint().host_str(),
            Some("ingest-mycluster.kusto.windows.net")
        );
        Ok(())
    }

    #[test]
    fn csv_properties_carry_mapping() {
        let props = IngestionProperties::new(DataFormat::Csv).with_mapping_reference("m");
        assert_eq!(props.format.as_str(), "csv");
        assert_eq!(props.mapping_reference.as_deref(), Some("m"));
        assert_eq!(props.format.mapping_kind(), "Csv");
    }
}

// src/ingest/message.rs

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use url::Url;
use uuid::Uuid;

use super::IngestionProperties;

/// Queued-ingestion request as read by the cluster's ingestion service.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngestionMessage {
    pub id: Uuid,
    pub blob_path: String,
    pub raw_data_size: u64,
    pub database_name: String,
    pub table_name: String,
    pub retain_blob_on_success: bool,
    pub flush_immediately: bool,
    pub report_level: u8,
    pub report_method: u8,
    #[serde(serialize_with = "rfc3339")]
    pub source_message_creation_time: DateTime<Utc>,
    pub additional_properties: AdditionalProperties,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalProperties {
    pub authorization_context: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_mapping_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_mapping_type: Option<String>,
}

/// Report failures only.
const REPORT_LEVEL_FAILURES_ONLY: u8 = 0;
/// Report through the status queue.
const REPORT_METHOD_QUEUE: u8 = 0;

fn rfc3339<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl IngestionMessage {
    pub fn new(
        blob_path: &str,
        database: &str,
        table: &str,
        props: &IngestionProperties,
        authorization_context: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            blob_path: blob_path.to_owned(),
            raw_data_size: 0,
            database_name: database.to_owned(),
            table_name: table.to_owned(),
            retain_blob_on_success: true,
            flush_immediately: false,
            report_level: REPORT_LEVEL_FAILURES_ONLY,
            report_method: REPORT_METHOD_QUEUE,
            source_message_creation_time: Utc::now(),
            additional_properties: AdditionalProperties {
                authorization_context,
                format: props.format.as_str().to_owned(),
                ingestion_mapping_reference: props.mapping_reference.clone(),
                ingestion_mapping_type: props
                    .mapping_reference
                    .as_ref()
                    .map(|_| props.format.mapping_kind().to_owned()),
            },
        }
    }

    /// Storage-queue Put Message body: the JSON message, base64-encoded.
    pub fn to_queue_body(&self) -> Result<String> {
        let json = serde_json::to_vec(self).context("serializing ingestion message")?;
        Ok(format!(
            "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
            STANDARD.encode(json)
        ))
    }
}

/// `<queue>/messages?<sas>` for a queue URI handed out by the ingestion service.
pub fn queue_messages_url(queue_uri: &str) -> Result<Url> {
    let mut url = Url::parse(queue_uri).context("parsing ingestion queue URI")?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("queue URI cannot carry a path"))?
        .pop_if_empty()
        .push("messages");
    Ok(url)
}

// src/sequence.rs
//
// The provisioning run: drop, create table, create mapping, queue ingestion.
// Every step after the drop is fail-fast; nothing already created is rolled
// back.

use anyhow::Context;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Config, Credentials};
use crate::ingest::{
    blob_url, redact_sas, DataFormat, IngestionProperties, IngestionReceipt, Ingestor,
};
use crate::kusto::{KustoClient, Management};
use crate::schema::commands::{
    BLOB_ACCOUNT, BLOB_CONTAINER, BLOB_FILE, BLOB_SAS_TOKEN, CREATE_MAPPING_COMMAND,
    CREATE_TABLE_COMMAND, DROP_TABLE_COMMAND, MAPPING_NAME, TABLE_NAME,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Connect,
    DropTable,
    CreateTable,
    CreateMapping,
    IngestFile,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Connect => "connect",
            Step::DropTable => "drop table",
            Step::CreateTable => "create table",
            Step::CreateMapping => "create mapping",
            Step::IngestFile => "ingest file",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run has got to. `Aborted` is terminal and only reached on error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Start,
    Connected,
    TableDropped,
    TableCreated,
    MappingCreated,
    IngestionSubmitted,
    Aborted,
}

/// A fatal step failure, with the last state the run reached before it.
#[derive(Debug, Error)]
#[error("{step} failed")]
pub struct StepError {
    pub step: Step,
    pub reached: State,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Dropped,
    /// The drop failed and was ignored, most likely because the table did
    /// not exist yet.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub state: State,
    pub drop: DropOutcome,
    pub receipt: IngestionReceipt,
}

/// Build the client handle and prove the credentials work.
#[instrument(level = "info", skip(creds), fields(endpoint = %creds.endpoint))]
pub async fn connect(creds: &Credentials) -> Result<KustoClient, StepError> {
    let fail = |source| StepError {
        step: Step::Connect,
        reached: State::Start,
        source,
    };
    let client = KustoClient::new(creds)
        .context("failed to create kusto client")
        .map_err(fail)?;
    client
        .authenticate()
        .await
        .context("failed to create kusto client")
        .map_err(fail)?;

    info!("Connected to Azure Data Explorer");
    Ok(client)
}

/// Best effort: every error is logged and swallowed, not just "table not
/// found".
pub async fn drop_table<C>(client: &C, database: &str) -> DropOutcome
where
    C: Management + ?Sized,
{
    match client.execute_mgmt(database, DROP_TABLE_COMMAND).await {
        Ok(_) => {
            info!("Table {} dropped from DB {}", TABLE_NAME, database);
            DropOutcome::Dropped
        }
        Err(e) => {
            let detail = format!("{:#}", e);
            warn!(
                step = %Step::DropTable,
                error = %detail,
                "Failed to drop {} table. Maybe it does not exist?",
                TABLE_NAME
            );
            DropOutcome::Skipped
        }
    }
}

pub async fn create_table<C>(client: &C, database: &str) -> anyhow::Result<()>
where
    C: Management + ?Sized,
{
    client
        .execute_mgmt(database, CREATE_TABLE_COMMAND)
        .await
        .context("failed to create table")?;
    info!("Table {} created in DB {}", TABLE_NAME, database);
    Ok(())
}

pub async fn create_mapping<C>(client: &C, database: &str) -> anyhow::Result<()>
where
    C: Management + ?Sized,
{
    client
        .execute_mgmt(database, CREATE_MAPPING_COMMAND)
        .await
        .context("failed to create mapping")?;
    info!("Mapping {} created", MAPPING_NAME);
    Ok(())
}

/// Queue `file` from the given blob container for ingestion into
/// `database.table` using the named CSV mapping. Returns once the request is
/// accepted; the data lands later.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_file<C>(
    client: &C,
    account: &str,
    container: &str,
    sas_token: &str,
    file: &str,
    mapping: &str,
    database: &str,
    table: &str,
) -> anyhow::Result<IngestionReceipt>
where
    C: Ingestor + ?Sized,
{
    let url = blob_url(account, container, file, sas_token);
    let props = IngestionProperties::new(DataFormat::Csv).with_mapping_reference(mapping);
    let receipt = client.ingest_from_blob(database, table, &url, &props).await?;
    info!(source_id = %receipt.source_id, "Ingested file from - {}", redact_sas(&url));
    Ok(receipt)
}

/// Drive the whole sequence against an already-connected handle, stopping at
/// the first fatal step.
#[instrument(level = "info", skip(client))]
pub async fn run<C>(client: &C, database: &str) -> Result<Outcome, StepError>
where
    C: Management + Ingestor + ?Sized,
{
    let mut state = State::Connected;

    let drop = drop_table(client, database).await;
    if drop == DropOutcome::Dropped {
        advance(&mut state, State::TableDropped);
    }

    create_table(client, database)
        .await
        .map_err(|e| abort(Step::CreateTable, state, e))?;
    advance(&mut state, State::TableCreated);

    create_mapping(client, database)
        .await
        .map_err(|e| abort(Step::CreateMapping, state, e))?;
    advance(&mut state, State::MappingCreated);

    let receipt = ingest_file(
        client,
        BLOB_ACCOUNT,
        BLOB_CONTAINER,
        BLOB_SAS_TOKEN,
        BLOB_FILE,
        MAPPING_NAME,
        database,
        TABLE_NAME,
    )
    .await
    .map_err(|e| abort(Step::IngestFile, state, e))?;
    advance(&mut state, State::IngestionSubmitted);

    Ok(Outcome {
        state,
        drop,
        receipt,
    })
}

/// Load config, connect, then run. Nothing touches the network until the
/// config has loaded.
pub async fn provision<L, F, Fut, C>(load: L, connector: F) -> anyhow::Result<Outcome>
where
    L: FnOnce() -> anyhow::Result<Config>,
    F: FnOnce(Credentials) -> Fut,
    Fut: Future<Output = Result<C, StepError>>,
    C: Management + Ingestor,
{
    let config = load()?;
    info!("Using database - {}", config.database);

    let client = connector(config.credentials).await?;
    let outcome = run(&client, &config.database).await?;
    Ok(outcome)
}

fn advance(state: &mut State, next: State) {
    debug!(from = ?*state, to = ?next, "state transition");
    *state = next;
}

fn abort(step: Step, reached: State, source: anyhow::Error) -> StepError {
    error!(step = %step, reached = ?reached, to = ?State::Aborted, "sequence aborted");
    StepError {
        step,
        reached,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::IngestionStatus;
    use crate::kusto::KustoResponse;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Mgmt { database: String, command: String },
        Ingest {
            database: String,
            table: String,
            url: String,
            props: IngestionProperties,
        },
    }

    /// In-memory stand-in for the client handle. Records every call and fails
    /// the ones it is told to.
    #[derive(Default)]
    struct FakeClient {
        calls: Mutex<Vec<Call>>,
        failing_commands: Vec<&'static str>,
        fail_ingest: bool,
    }

    impl FakeClient {
        fn failing(commands: &[&'static str]) -> Self {
            Self {
                failing_commands: commands.to_vec(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn commands(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .map(|c| match c {
                    Call::Mgmt { command, .. } => command,
                    Call::Ingest { .. } => "<ingest>".to_string(),
                })
                .collect()
        }
    }

    #[async_trait]
    impl Management for FakeClient {
        async fn execute_mgmt(&self, database: &str, command: &str) -> Result<KustoResponse> {
            self.calls.lock().unwrap().push(Call::Mgmt {
                database: database.to_owned(),
                command: command.to_owned(),
            });
            if self.failing_commands.iter().any(|c| *c == command) {
                bail!("injected failure for `{}`", command);
            }
            Ok(KustoResponse::default())
        }
    }

    #[async_trait]
    impl Ingestor for FakeClient {
        async fn ingest_from_blob(
            &self,
            database: &str,
            table: &str,
            blob_url: &str,
            props: &IngestionProperties,
        ) -> Result<IngestionReceipt> {
            self.calls.lock().unwrap().push(Call::Ingest {
                database: database.to_owned(),
                table: table.to_owned(),
                url: blob_url.to_owned(),
                props: props.clone(),
            });
            if self.fail_ingest {
                bail!("injected ingestion failure");
            }
            Ok(IngestionReceipt {
                status: IngestionStatus::Queued,
                source_id: Uuid::new_v4(),
                database: database.to_owned(),
                table: table.to_owned(),
                blob_path: redact_sas(blob_url),
                queue: "https://q.example/ready/messages".to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn runs_all_steps_in_order() -> Result<()> {
        let client = FakeClient::default();
        let outcome = run(&client, "testkustodb").await?;

        assert_eq!(outcome.state, State::IngestionSubmitted);
        assert_eq!(outcome.drop, DropOutcome::Dropped);
        assert_eq!(outcome.receipt.status, IngestionStatus::Queued);
        assert_eq!(
            client.commands(),
            vec![
                DROP_TABLE_COMMAND,
                CREATE_TABLE_COMMAND,
                CREATE_MAPPING_COMMAND,
                "<ingest>",
            ]
        );
        for call in client.calls() {
            match call {
                Call::Mgmt { database, .. } | Call::Ingest { database, .. } => {
                    assert_eq!(database, "testkustodb")
                }
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn ingestion_targets_sample_blob_with_csv_mapping() -> Result<()> {
        let client = FakeClient::default();
        run(&client, "db").await?;

        let ingest = client
            .calls()
            .into_iter()
            .find(|c| matches!(c, Call::Ingest { .. }))
            .unwrap();
        let Call::Ingest { table, url, props, .. } = ingest else {
            unreachable!()
        };
        assert_eq!(table, TABLE_NAME);
        assert_eq!(
            url,
            blob_url(BLOB_ACCOUNT, BLOB_CONTAINER, BLOB_FILE, BLOB_SAS_TOKEN)
        );
        assert_eq!(props.format, DataFormat::Csv);
        assert_eq!(props.mapping_reference.as_deref(), Some(MAPPING_NAME));
        Ok(())
    }

    #[tokio::test]
    async fn drop_failure_is_not_fatal() -> Result<()> {
        let client = FakeClient::failing(&[DROP_TABLE_COMMAND]);
        let outcome = run(&client, "db").await?;

        assert_eq!(outcome.drop, DropOutcome::Skipped);
        assert_eq!(outcome.state, State::IngestionSubmitted);
        assert_eq!(client.commands().len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn create_table_failure_stops_the_run() {
        let client = FakeClient::failing(&[CREATE_TABLE_COMMAND]);
        let err = run(&client, "db").await.unwrap_err();

        assert_eq!(err.step, Step::CreateTable);
        assert_eq!(err.reached, State::TableDropped);
        assert_eq!(client.commands(), vec![DROP_TABLE_COMMAND, CREATE_TABLE_COMMAND]);
        assert!(format!("{:#}", err.source).contains("failed to create table"));
    }

    #[tokio::test]
    async fn create_mapping_failure_stops_before_ingest() {
        let client = FakeClient::failing(&[CREATE_MAPPING_COMMAND]);
        let err = run(&client, "db").await.unwrap_err();

        assert_eq!(err.step, Step::CreateMapping);
        assert_eq!(err.reached, State::TableCreated);
        assert_eq!(
            client.commands(),
            vec![DROP_TABLE_COMMAND, CREATE_TABLE_COMMAND, CREATE_MAPPING_COMMAND]
        );
    }

    #[tokio::test]
    async fn ingest_failure_is_fatal() {
        let client = FakeClient {
            fail_ingest: true,
            ..Default::default()
        };
        let err = run(&client, "db").await.unwrap_err();

        assert_eq!(err.step, Step::IngestFile);
        assert_eq!(err.reached, State::MappingCreated);
        assert_eq!(client.commands().len(), 4);
        assert_eq!(err.to_string(), "ingest file failed");
    }

    #[tokio::test]
    async fn failed_drop_then_failed_create_reports_connected() {
        let client = FakeClient::failing(&[DROP_TABLE_COMMAND, CREATE_TABLE_COMMAND]);
        let err = run(&client, "db").await.unwrap_err();
        assert_eq!(err.step, Step::CreateTable);
        assert_eq!(err.reached, State::Connected);
    }

    #[tokio::test]
    async fn connect_rejects_unusable_endpoint() {
        let creds = Credentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            tenant_id: "tenant".into(),
            endpoint: "::not-a-url".into(),
            authority_host: "https://login.microsoftonline.com".into(),
        };
        let err = connect(&creds).await.unwrap_err();
        assert_eq!(err.step, Step::Connect);
        assert_eq!(err.reached, State::Start);
    }

    fn env_with(overrides: &[(&str, Option<&str>)]) -> Result<Config> {
        let mut vars: HashMap<&str, Option<&str>> = HashMap::from([
            ("KUSTO_DB", Some("testkustodb")),
            ("AZURE_SP_CLIENT_ID", Some("id")),
            ("AZURE_SP_CLIENT_SECRET", Some("secret")),
            ("AZURE_SP_TENANT_ID", Some("tenant")),
            ("KUSTO_ENDPOINT", Some("https://mycluster.kusto.windows.net")),
        ]);
        vars.extend(overrides.iter().copied());
        Config::from_lookup(|key| vars.get(key).copied().flatten().map(str::to_owned))
    }

    #[tokio::test]
    async fn missing_variable_fails_before_connect() {
        let connected = AtomicBool::new(false);
        let err = provision(
            || env_with(&[("KUSTO_ENDPOINT", None)]),
            |_creds| {
                connected.store(true, Ordering::SeqCst);
                async { Ok::<_, StepError>(FakeClient::default()) }
            },
        )
        .await
        .unwrap_err();

        assert!(!connected.load(Ordering::SeqCst));
        assert!(format!("{:#}", err).contains("KUSTO_ENDPOINT"));
    }

    #[tokio::test]
    async fn provision_runs_with_loaded_config() -> Result<()> {
        let outcome = provision(
            || env_with(&[]),
            |creds| async move {
                assert_eq!(creds.endpoint, "https://mycluster.kusto.windows.net");
                Ok::<_, StepError>(FakeClient::default())
            },
        )
        .await?;

        assert_eq!(outcome.state, State::IngestionSubmitted);
        assert_eq!(outcome.receipt.database, "testkustodb");
        Ok(())
    }

    #[tokio::test]
    async fn provision_surfaces_connect_failure() {
        let err = provision(
            || env_with(&[("KUSTO_ENDPOINT", Some("::not-a-url"))]),
            |creds| async move { connect(&creds).await },
        )
        .await
        .unwrap_err();

        let step = err.downcast_ref::<StepError>().unwrap();
        assert_eq!(step.step, Step::Connect);
        assert_eq!(step.reached, State::Start);
    }
}

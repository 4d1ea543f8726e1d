use anyhow::Result;
use kusto_provision::{config::Config, sequence};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();

    match provision().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn provision() -> Result<()> {
    // ─── 2) config first, then connect once and run every step ───────
    let outcome = sequence::provision(Config::from_env, |creds| async move {
        sequence::connect(&creds).await
    })
    .await?;

    // ─── 3) report ───────────────────────────────────────────────────
    info!(
        state = ?outcome.state,
        drop = ?outcome.drop,
        source_id = %outcome.receipt.source_id,
        "all done"
    );
    Ok(())
}

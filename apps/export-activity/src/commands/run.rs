use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pgexport_core::ActivityDriver;
use pgexport_pg::PgClient;
use pgexport_types::PostgresInsertInputs;

use crate::config::{heartbeat_state_path, RuntimeConfig};
use crate::file_source::FileSource;
use crate::heartbeat_sink::FileHeartbeatSink;

/// Runs one export activity attempt against a connection-options file of
/// `PostgresInsertInputs` (§6) and a JSON file replaying the source batches
/// the orchestrator's query layer would otherwise stream.
#[derive(Parser)]
pub struct Opts {
    /// Path to a JSON `PostgresInsertInputs` document.
    #[arg(long)]
    inputs: PathBuf,

    /// Path to a JSON document of `{schema, batches}` standing in for the
    /// source query layer (§1: out of scope, only its contract is specified).
    #[arg(long)]
    batches: PathBuf,
}

impl Opts {
    pub async fn execute(&self, config: RuntimeConfig) -> anyhow::Result<u64> {
        let inputs_body = tokio::fs::read(&self.inputs)
            .await
            .with_context(|| format!("reading inputs file {}", self.inputs.display()))?;
        let inputs: PostgresInsertInputs =
            serde_json::from_slice(&inputs_body).with_context(|| format!("parsing inputs file {}", self.inputs.display()))?;

        let producer = Arc::new(FileSource::load(&self.batches).await?);

        let mut pg = PgClient::new(pgexport_pg::PgConnectOptions {
            host: inputs.host.clone(),
            port: inputs.port,
            user: inputs.user.clone(),
            password: inputs.password.clone(),
            database: inputs.database.clone(),
            has_self_signed_cert: inputs.has_self_signed_cert,
        });
        pg.connect().await.context("connecting to destination postgres")?;

        let heartbeat_path = heartbeat_state_path(&config.heartbeat_state_dir, inputs.run_id);
        let sink = Arc::new(FileHeartbeatSink::new(heartbeat_path));

        let driver = ActivityDriver::new(producer, Arc::new(pg), sink, config.driver_config());

        let records_completed = driver.run(&inputs).await.context("running export activity")?;
        tracing::info!(records_completed, team_id = inputs.team_id, run_id = %inputs.run_id, "export activity attempt finished");
        Ok(records_completed)
    }
}

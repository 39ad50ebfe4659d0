use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pgexport_pg::{map_schema, ManagedTable};
use pgexport_queue::RecordBatchQueue;
use pgexport_source::{Producer, SourceQuery};
use pgexport_types::{
    BatchExportModel, Destination, DestinationField, ExportError, ManagedTableDescriptor,
    PostgresInsertInputs,
};
use tokio::sync::oneshot;

use crate::heartbeat::{Heartbeater, HeartbeatSink};
use crate::model_resolution::resolve_model;
use crate::Consumer;

/// The `_inserted_at`-equivalent ordering column every source schema
/// carries and which never reaches the destination (spec §4.9 step 6).
pub const ORDERING_COLUMN: &str = "_inserted_at";

#[derive(Debug, Clone)]
pub struct ActivityDriverConfig {
    pub upload_chunk_size_bytes: u64,
    pub heartbeat_cadence: Duration,
    pub queue_byte_ceiling: u64,
    /// Field names the schema mapper should route to `JSONB` instead of
    /// `TEXT` for non-canonical models (§4.2).
    pub known_json_fields: Vec<String>,
}

/// Runs one export window end to end (spec §4.9).
pub struct ActivityDriver<P, D, S>
where
    P: Producer + 'static,
    D: Destination + 'static,
    S: HeartbeatSink + 'static,
{
    producer: Arc<P>,
    pg: Arc<D>,
    heartbeat_sink: Arc<S>,
    config: ActivityDriverConfig,
}

impl<P, D, S> ActivityDriver<P, D, S>
where
    P: Producer + 'static,
    D: Destination + 'static,
    S: HeartbeatSink + 'static,
{
    pub fn new(
        producer: Arc<P>,
        pg: Arc<D>,
        heartbeat_sink: Arc<S>,
        config: ActivityDriverConfig,
    ) -> Self {
        Self {
            producer,
            pg,
            heartbeat_sink,
            config,
        }
    }

    #[tracing::instrument(skip_all, fields(team_id = inputs.team_id, run_id = %inputs.run_id))]
    pub async fn run(&self, inputs: &PostgresInsertInputs) -> Result<u64, ExportError> {
        let result = self.run_inner(inputs).await;
        if let Err(err) = &result {
            pgexport_metrics::ACTIVITY_ERRORS_TOTAL
                .with_label_values(&[err.kind()])
                .inc();
        }
        result
    }

    async fn run_inner(&self, inputs: &PostgresInsertInputs) -> Result<u64, ExportError> {
        // Step 2: resume heartbeat details.
        let mut details = self
            .heartbeat_sink
            .should_resume_from_activity_heartbeat()
            .await
            .unwrap_or_default();
        let mut heartbeater = Heartbeater::new(Arc::clone(&self.heartbeat_sink), self.config.heartbeat_cadence);

        // Step 3: resolve the model.
        let resolved = resolve_model(&inputs.batch_export_model);

        let window = inputs
            .window()
            .map_err(|e| ExportError::Other(anyhow::anyhow!(e)))?;

        // Step 4: construct the queue, start the producer.
        let queue = RecordBatchQueue::new(self.config.queue_byte_ceiling);
        let query = SourceQuery {
            team_id: inputs.team_id,
            model_name: inputs.batch_export_model.name().to_string(),
            full_range: window,
            done_ranges: details.done_ranges.clone(),
            fields: resolved.destination_default_fields.clone(),
            destination_default_fields: resolved.destination_default_fields,
            filters: resolved.filters,
            exclude_events: inputs.exclude_events.clone(),
            include_events: inputs.include_events.clone(),
            is_backfill: inputs.is_backfill,
            backfill_details: inputs.backfill_details.clone(),
            extra_params: serde_json::Value::Null,
        };

        let (schema_tx, schema_rx) = oneshot::channel();
        let producer = Arc::clone(&self.producer);
        let queue_for_producer = Arc::clone(&queue);
        let producer_task = tokio::spawn(async move { producer.run(query, queue_for_producer, schema_tx).await });

        // Step 5: wait for schema, or for the producer to finish with no data.
        let schema = match schema_rx.await {
            Ok(schema) => schema,
            Err(_) => {
                join_producer(producer_task).await?;
                return Ok(details.records_completed);
            }
        };

        // Step 6: normalize the schema.
        let normalized = schema.normalized_for_destination(ORDERING_COLUMN);

        // Step 7: compute table_fields, intersected with live columns.
        let table_fields: Vec<DestinationField> = if matches!(inputs.batch_export_model, BatchExportModel::Events) {
            BatchExportModel::canonical_events_fields()
        } else {
            let known_json: Vec<&str> = self.config.known_json_fields.iter().map(String::as_str).collect();
            map_schema(&normalized, &known_json)?
        };

        let live_columns = self.pg.get_table_columns(&inputs.schema, &inputs.table_name).await?;
        let destination_fields: Vec<DestinationField> = match live_columns {
            Some(live) if !live.is_empty() => table_fields
                .into_iter()
                .filter(|f| live.contains(&f.name))
                .collect(),
            _ => table_fields,
        };

        // Step 8: merge configuration by model.
        let merge_config = inputs.batch_export_model.merge_config();

        // Step 9: staging name.
        let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let staging_name = ManagedTableDescriptor::staging_name(&inputs.table_name, &timestamp, inputs.team_id);

        // Step 10: acquire the final table, and the staging table if merging.
        let final_descriptor = ManagedTableDescriptor {
            schema: inputs.schema.clone(),
            table: inputs.table_name.clone(),
            fields: destination_fields.clone(),
            primary_key: merge_config.as_ref().map(|m| m.merge_key.clone()),
            create: true,
            delete_on_exit: false,
        };
        let final_table = ManagedTable::acquire(&self.pg, final_descriptor).await?;

        let staging_table = if let Some(merge) = &merge_config {
            let descriptor = ManagedTableDescriptor {
                schema: inputs.schema.clone(),
                table: staging_name,
                fields: destination_fields.clone(),
                primary_key: Some(merge.merge_key.clone()),
                create: true,
                delete_on_exit: true,
            };
            Some(ManagedTable::acquire(&self.pg, descriptor).await?)
        } else {
            None
        };

        let target_table_name = staging_table
            .as_ref()
            .map(|t| t.descriptor().table.clone())
            .unwrap_or_else(|| inputs.table_name.clone());
        let destination_columns: Vec<String> = destination_fields.iter().map(|f| f.name.clone()).collect();

        let consumer = Consumer::new(
            Arc::clone(&self.pg),
            inputs.schema.clone(),
            target_table_name,
            destination_columns.clone(),
            self.config.upload_chunk_size_bytes,
        );

        let fallback_start = inputs.data_interval_start.unwrap_or(inputs.data_interval_end);

        // Step 11: run the consumer.
        let consumer_result = consumer
            .run(Arc::clone(&queue), &mut heartbeater, &mut details, fallback_start)
            .await;

        // Step 12: merge stage into final on completion, success or error,
        // so whatever was staged before a failure still lands (§4.9 step 12,
        // §7 effectively-once per merge key).
        let merge_result: Result<(), ExportError> = if let (Some(merge), Some(staging)) = (&merge_config, &staging_table) {
            self.pg
                .merge_tables(
                    &inputs.table_name,
                    &staging.descriptor().table,
                    &inputs.schema,
                    &destination_columns,
                    &merge.merge_key,
                    &merge.update_key,
                )
                .await
                .map(|_| ())
        } else {
            Ok(())
        };

        // Deterministic cleanup on every exit path, regardless of outcome.
        if let Some(staging) = staging_table {
            staging.release(&self.pg).await?;
        }
        final_table.release(&self.pg).await?;

        let producer_outcome = join_producer(producer_task).await;

        consumer_result?;
        producer_outcome?;
        merge_result?;

        // Step 13.
        Ok(details.records_completed)
    }
}

async fn join_producer(
    task: tokio::task::JoinHandle<Result<(), ExportError>>,
) -> Result<(), ExportError> {
    task.await.map_err(|e| ExportError::Other(anyhow::anyhow!(e)))?
}

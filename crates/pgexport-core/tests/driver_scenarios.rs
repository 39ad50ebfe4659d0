//! End-to-end scenarios (S1-S6) driving `ActivityDriver` against an
//! in-memory `Destination` and `HeartbeatSink` — no live Postgres.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pgexport_core::{ActivityDriver, ActivityDriverConfig, HeartbeatSink};
use pgexport_source::InMemorySource;
use pgexport_types::{
    BatchExportModel, ColumnData, Destination, DestinationField, ExportError, Field, HeartbeatDetails,
    LogicalType, PostgresInsertInputs, RecordBatch, Schema, Secret,
};
use uuid::Uuid;

fn t(h: i64, m: i64, s: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h as u32, m as u32, s as u32).unwrap()
}

struct TableState {
    fields: Vec<DestinationField>,
    primary_key: Option<Vec<String>>,
    rows: Vec<HashMap<String, String>>,
}

/// An in-memory stand-in for `pgexport-pg::PgClient`, exercising the same
/// `Destination` seam the driver is built against.
#[derive(Default)]
struct FakeDestination {
    tables: StdMutex<HashMap<(String, String), TableState>>,
    /// Every table name ever passed to `create_table`, kept even after
    /// `drop_table` removes the entry, so tests can inspect what the driver
    /// asked for without racing the cleanup pass.
    created: StdMutex<Vec<String>>,
}

impl FakeDestination {
    fn row_count(&self, schema: &str, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(&(schema.to_string(), table.to_string()))
            .map_or(0, |t| t.rows.len())
    }

    fn rows(&self, schema: &str, table: &str) -> Vec<HashMap<String, String>> {
        self.tables
            .lock()
            .unwrap()
            .get(&(schema.to_string(), table.to_string()))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Destination for FakeDestination {
    async fn create_table(
        &self,
        schema: &str,
        name: &str,
        fields: &[DestinationField],
        exists_ok: bool,
        primary_key: Option<&[String]>,
    ) -> Result<(), ExportError> {
        self.created.lock().unwrap().push(name.to_string());
        let mut tables = self.tables.lock().unwrap();
        let key = (schema.to_string(), name.to_string());
        if tables.contains_key(&key) && !exists_ok {
            return Err(ExportError::Other(anyhow::anyhow!("table already exists")));
        }
        tables.entry(key).or_insert_with(|| TableState {
            fields: fields.to_vec(),
            primary_key: primary_key.map(|pk| pk.to_vec()),
            rows: Vec::new(),
        });
        Ok(())
    }

    async fn drop_table(&self, schema: &str, name: &str, not_found_ok: bool) -> Result<(), ExportError> {
        let mut tables = self.tables.lock().unwrap();
        let key = (schema.to_string(), name.to_string());
        if tables.remove(&key).is_none() && !not_found_ok {
            return Err(ExportError::UndefinedTable {
                schema: schema.to_string(),
                table: name.to_string(),
            });
        }
        Ok(())
    }

    async fn get_table_columns(&self, schema: &str, name: &str) -> Result<Option<Vec<String>>, ExportError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(&(schema.to_string(), name.to_string()))
            .map(|t| t.fields.iter().map(|f| f.name.clone()).collect()))
    }

    async fn copy_tsv_to_postgres(
        &self,
        mut reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
        schema: &str,
        name: &str,
        columns: &[String],
    ) -> Result<u64, ExportError> {
        use tokio::io::AsyncReadExt;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| ExportError::TransientSourceError(e.into()))?;
        let sanitized = pgexport_sanitize::sanitize(&buf);
        let text = String::from_utf8_lossy(&sanitized).into_owned();

        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(&(schema.to_string(), name.to_string()))
            .ok_or_else(|| ExportError::UndefinedTable {
                schema: schema.to_string(),
                table: name.to_string(),
            })?;

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let values: Vec<&str> = line.split('\t').collect();
            let row: HashMap<String, String> = columns
                .iter()
                .cloned()
                .zip(values.into_iter().map(str::to_string))
                .collect();
            table.rows.push(row);
        }
        Ok(sanitized.len() as u64)
    }

    async fn merge_tables(
        &self,
        final_table: &str,
        stage_table: &str,
        schema: &str,
        _columns: &[String],
        merge_key: &[String],
        update_key: &[String],
    ) -> Result<u64, ExportError> {
        let mut tables = self.tables.lock().unwrap();
        let final_key = (schema.to_string(), final_table.to_string());
        if tables
            .get(&final_key)
            .and_then(|t| t.primary_key.as_ref())
            .is_none()
        {
            return Err(ExportError::MissingPrimaryKeyError {
                schema: schema.to_string(),
                table: final_table.to_string(),
            });
        }

        let stage_rows = tables
            .get(&(schema.to_string(), stage_table.to_string()))
            .map(|t| t.rows.clone())
            .unwrap_or_default();

        let final_state = tables.get_mut(&final_key).unwrap();
        let mut affected = 0u64;
        for stage_row in stage_rows {
            let existing_idx = final_state
                .rows
                .iter()
                .position(|r| merge_key.iter().all(|k| r.get(k) == stage_row.get(k)));
            match existing_idx {
                Some(idx) => {
                    let should_update = update_key.iter().any(|k| {
                        let new_v = stage_row.get(k).and_then(|v| v.parse::<f64>().ok());
                        let old_v = final_state.rows[idx].get(k).and_then(|v| v.parse::<f64>().ok());
                        match (new_v, old_v) {
                            (Some(n), Some(o)) => n > o,
                            _ => false,
                        }
                    });
                    if should_update {
                        final_state.rows[idx] = stage_row;
                        affected += 1;
                    }
                }
                None => {
                    final_state.rows.push(stage_row);
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }
}

#[derive(Default)]
struct FakeHeartbeatSink {
    resume_from: Option<HeartbeatDetails>,
    calls: StdMutex<Vec<HeartbeatDetails>>,
}

impl FakeHeartbeatSink {
    fn resuming_from(details: HeartbeatDetails) -> Self {
        Self {
            resume_from: Some(details),
            calls: StdMutex::new(Vec::new()),
        }
    }

    fn last_details(&self) -> HeartbeatDetails {
        self.calls.lock().unwrap().last().cloned().expect("at least one heartbeat")
    }
}

#[async_trait]
impl HeartbeatSink for FakeHeartbeatSink {
    async fn heartbeat(&self, details: &HeartbeatDetails) {
        self.calls.lock().unwrap().push(details.clone());
    }

    async fn should_resume_from_activity_heartbeat(&self) -> Option<HeartbeatDetails> {
        self.resume_from.clone()
    }
}

fn inputs(team_id: i64, table_name: &str, model: BatchExportModel, start: DateTime<Utc>, end: DateTime<Utc>) -> PostgresInsertInputs {
    PostgresInsertInputs {
        team_id,
        user: "export".to_string(),
        password: Secret::new("hunter2".to_string()),
        host: "localhost".to_string(),
        port: 5432,
        database: "posthog".to_string(),
        schema: "public".to_string(),
        table_name: table_name.to_string(),
        has_self_signed_cert: false,
        data_interval_start: Some(start),
        data_interval_end: end,
        exclude_events: vec![],
        include_events: vec![],
        run_id: Uuid::nil(),
        backfill_details: None,
        is_backfill: false,
        batch_export_model: model,
        batch_export_schema: None,
    }
}

fn events_schema() -> Schema {
    Schema::new(vec![
        Field::new("uuid", LogicalType::String, false),
        Field::new("event", LogicalType::String, false),
        Field::new("properties", LogicalType::String, true),
        Field::new("elements", LogicalType::String, true),
        Field::new("set", LogicalType::String, true),
        Field::new("set_once", LogicalType::String, true),
        Field::new("distinct_id", LogicalType::String, false),
        Field::new("team_id", LogicalType::Int32, false),
        Field::new("ip", LogicalType::String, true),
        Field::new("site_url", LogicalType::String, true),
        Field::new("timestamp", LogicalType::TimestampTz, false),
    ])
}

fn events_batch(schema: Arc<Schema>, watermark: DateTime<Utc>, team_id: i64, n_rows: usize, start_idx: usize) -> RecordBatch {
    let uuids: Vec<Option<String>> = (0..n_rows).map(|i| Some(format!("uuid-{}", start_idx + i))).collect();
    let events: Vec<Option<String>> = (0..n_rows).map(|_| Some("pageview".to_string())).collect();
    let properties: Vec<Option<String>> = (0..n_rows).map(|_| Some("{\"k\":\"v\"}".to_string())).collect();
    let nulls: Vec<Option<String>> = (0..n_rows).map(|_| None).collect();
    let distinct_ids: Vec<Option<String>> = (0..n_rows).map(|i| Some(format!("user-{}", start_idx + i))).collect();
    let team_ids: Vec<Option<i64>> = (0..n_rows).map(|_| Some(team_id)).collect();
    let timestamps: Vec<Option<DateTime<Utc>>> = (0..n_rows).map(|_| Some(watermark)).collect();

    RecordBatch::new(
        schema,
        vec![
            ColumnData::Utf8(uuids),
            ColumnData::Utf8(events),
            ColumnData::Utf8(properties),
            ColumnData::Utf8(nulls.clone()),
            ColumnData::Utf8(nulls.clone()),
            ColumnData::Utf8(nulls),
            ColumnData::Utf8(distinct_ids),
            ColumnData::Int(team_ids),
            ColumnData::Utf8(vec![None; n_rows]),
            ColumnData::Utf8(vec![None; n_rows]),
            ColumnData::TimestampTz(timestamps),
        ],
        watermark,
    )
}

fn driver_config() -> ActivityDriverConfig {
    ActivityDriverConfig {
        upload_chunk_size_bytes: 10 * 1024 * 1024,
        heartbeat_cadence: Duration::from_millis(0),
        queue_byte_ceiling: 64 * 1024 * 1024,
        known_json_fields: vec!["properties".to_string(), "elements".to_string(), "set".to_string(), "set_once".to_string()],
    }
}

#[tokio::test]
async fn s1_happy_path_events() {
    let schema = Arc::new(events_schema());
    let window_start = t(0, 0, 0);
    let window_end = t(1, 0, 0);
    let batches = vec![
        events_batch(Arc::clone(&schema), t(0, 0, 1), 42, 4000, 0),
        events_batch(Arc::clone(&schema), t(0, 20, 0), 42, 3000, 4000),
        events_batch(Arc::clone(&schema), t(0, 59, 59), 42, 3000, 7000),
    ];
    let producer = Arc::new(InMemorySource::new((*schema).clone(), batches));
    let pg = Arc::new(FakeDestination::default());
    let sink = Arc::new(FakeHeartbeatSink::default());

    let driver = ActivityDriver::new(producer, Arc::clone(&pg), Arc::clone(&sink), driver_config());
    let req = inputs(42, "events_export", BatchExportModel::Events, window_start, window_end);

    let completed = driver.run(&req).await.expect("s1 should succeed");

    assert_eq!(completed, 10_000);
    assert_eq!(pg.row_count("public", "events_export"), 10_000);

    let last = sink.last_details();
    assert_eq!(last.records_completed, 10_000);
    assert_eq!(last.done_ranges.ranges().len(), 1);
    assert_eq!(last.done_ranges.ranges()[0].0, window_start);
}

#[tokio::test]
async fn s2_persons_merge_keeps_max_version() {
    let pg = Arc::new(FakeDestination::default());
    let window_start = t(0, 0, 0);
    let window_end = t(1, 0, 0);

    let schema = Schema::new(vec![
        Field::new("team_id", LogicalType::Int64, false),
        Field::new("distinct_id", LogicalType::String, false),
        Field::new("person_version", LogicalType::Int64, false),
        Field::new("person_distinct_id_version", LogicalType::Int64, false),
    ]);
    let schema_arc = Arc::new(schema.clone());

    let person_batch = |watermark: DateTime<Utc>, version: i64| {
        RecordBatch::new(
            Arc::clone(&schema_arc),
            vec![
                ColumnData::Int(vec![Some(42)]),
                ColumnData::Utf8(vec![Some("user-a".to_string())]),
                ColumnData::Int(vec![Some(version)]),
                ColumnData::Int(vec![Some(version)]),
            ],
            watermark,
        )
    };

    let run = |version: i64, pg: Arc<FakeDestination>| {
        let batch = person_batch(t(0, 0, 1), version);
        let producer = Arc::new(InMemorySource::new(schema.clone(), vec![batch]));
        let sink = Arc::new(FakeHeartbeatSink::default());
        let driver = ActivityDriver::new(producer, pg, sink, driver_config());
        let req = inputs(42, "persons_export", BatchExportModel::Persons, window_start, window_end);
        async move { driver.run(&req).await }
    };

    run(1, Arc::clone(&pg)).await.expect("first attempt");
    let rows = pg.rows("public", "persons_export");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("person_version").unwrap(), "1");

    run(2, Arc::clone(&pg)).await.expect("second attempt");
    let rows = pg.rows("public", "persons_export");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("person_version").unwrap(), "2");

    // Replaying the first (lower-version) batch must not downgrade the row.
    run(1, Arc::clone(&pg)).await.expect("replay attempt");
    let rows = pg.rows("public", "persons_export");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("person_version").unwrap(), "2");
}

#[tokio::test]
async fn s4_partial_flush_crash_then_resume() {
    let schema = Schema::new(vec![
        Field::new("id", LogicalType::Int64, false),
        Field::new("value", LogicalType::String, true),
    ]);
    let window_start = t(0, 0, 0);
    let window_end = t(4, 0, 0);

    let make_batch = |watermark: DateTime<Utc>, base: i64| {
        RecordBatch::new(
            Arc::new(schema.clone()),
            vec![
                ColumnData::Int((0..100).map(|i| Some(base + i)).collect()),
                ColumnData::Utf8((0..100).map(|i| Some(format!("row-{}", base + i))).collect()),
            ],
            watermark,
        )
    };

    let batches = vec![
        make_batch(t(1, 0, 0), 0),
        make_batch(t(2, 0, 0), 100),
        make_batch(t(3, 0, 0), 200),
    ];

    let pg = Arc::new(FakeDestination::default());
    let mut config = driver_config();
    config.upload_chunk_size_bytes = 1;
    config.known_json_fields = vec![];

    let producer = Arc::new(InMemorySource::new(schema.clone(), batches.clone()).failing_after(1));
    let sink = Arc::new(FakeHeartbeatSink::default());
    let driver = ActivityDriver::new(producer, Arc::clone(&pg), Arc::clone(&sink), config.clone());
    let req = inputs(7, "custom_export", BatchExportModel::Custom("custom".to_string()), window_start, window_end);

    let err = driver.run(&req).await.expect_err("should fail after first flush");
    assert!(!matches!(err, ExportError::MissingPrimaryKeyError { .. }));
    assert_eq!(pg.row_count("public", "custom_export"), 100);

    let resume_details = sink.last_details();
    assert_eq!(resume_details.records_completed, 100);
    assert_eq!(resume_details.done_ranges.ranges().len(), 1);

    // Re-drive with all three batches; the done range should make the
    // producer skip the already-exported first one.
    let producer2 = Arc::new(InMemorySource::new(schema, batches));
    let sink2 = Arc::new(FakeHeartbeatSink::resuming_from(resume_details));
    let driver2 = ActivityDriver::new(producer2, Arc::clone(&pg), Arc::clone(&sink2), config);

    let completed = driver2.run(&req).await.expect("resumed attempt should succeed");
    assert_eq!(completed, 300);
    assert_eq!(pg.row_count("public", "custom_export"), 300);
}

#[tokio::test]
async fn s5_missing_primary_key_on_merge_target() {
    let pg = Arc::new(FakeDestination::default());
    let window_start = t(0, 0, 0);
    let window_end = t(1, 0, 0);

    // Pre-create the final table without a primary key, as if it were
    // provisioned outside this pipeline.
    pg.create_table("public", "sessions_export", &[], true, None).await.unwrap();

    let schema = Schema::new(vec![
        Field::new("team_id", LogicalType::Int64, false),
        Field::new("session_id", LogicalType::String, false),
        Field::new("end_timestamp", LogicalType::TimestampTz, false),
    ]);
    let batch = RecordBatch::new(
        Arc::new(schema.clone()),
        vec![
            ColumnData::Int(vec![Some(42)]),
            ColumnData::Utf8(vec![Some("session-a".to_string())]),
            ColumnData::TimestampTz(vec![Some(window_start)]),
        ],
        t(0, 0, 1),
    );
    let producer = Arc::new(InMemorySource::new(schema, vec![batch]));
    let sink = Arc::new(FakeHeartbeatSink::default());
    let driver = ActivityDriver::new(producer, Arc::clone(&pg), sink, driver_config());
    let req = inputs(42, "sessions_export", BatchExportModel::Sessions, window_start, window_end);

    let err = driver.run(&req).await.expect_err("must fail without a primary key");
    assert!(matches!(err, ExportError::MissingPrimaryKeyError { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn s6_staging_identifier_is_truncated_to_63_bytes() {
    let pg = Arc::new(FakeDestination::default());
    let window_start = t(0, 0, 0);
    let window_end = t(1, 0, 0);
    let long_table_name = "a".repeat(80);

    let schema = Schema::new(vec![
        Field::new("team_id", LogicalType::Int64, false),
        Field::new("session_id", LogicalType::String, false),
        Field::new("end_timestamp", LogicalType::TimestampTz, false),
    ]);
    let batch = RecordBatch::new(
        Arc::new(schema.clone()),
        vec![
            ColumnData::Int(vec![Some(42)]),
            ColumnData::Utf8(vec![Some("session-a".to_string())]),
            ColumnData::TimestampTz(vec![Some(window_start)]),
        ],
        t(0, 0, 1),
    );
    let producer = Arc::new(InMemorySource::new(schema, vec![batch]));
    let sink = Arc::new(FakeHeartbeatSink::default());
    let driver = ActivityDriver::new(producer, Arc::clone(&pg), sink, driver_config());
    let req = inputs(42, &long_table_name, BatchExportModel::Sessions, window_start, window_end);

    driver.run(&req).await.expect("should succeed despite a long table name");

    let created = pg.created.lock().unwrap().clone();
    let staged: Vec<&String> = created.iter().filter(|name| name.starts_with("stage_")).collect();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].len(), 63);
    assert!(!pg.tables.lock().unwrap().keys().any(|(_, t)| t == staged[0]), "staging table should have been dropped on exit");
    assert_eq!(pg.row_count("public", &long_table_name), 1);
}

//! The source side of the pipeline (spec §4.6): the `Producer` contract and
//! an in-memory reference implementation used by integration tests that
//! don't stand up a live query engine.

mod in_memory;
mod producer;
mod query;

pub use in_memory::InMemorySource;
pub use producer::Producer;
pub use query::SourceQuery;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pgexport_queue::RecordBatchQueue;
    use pgexport_types::{ColumnData, DoneRanges, Field, LogicalType, RecordBatch, Schema, Window};
    use std::sync::Arc;

    fn t(h: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(h * 3600, 0).unwrap()
    }

    fn batch(watermark: chrono::DateTime<Utc>) -> RecordBatch {
        RecordBatch::new(
            Arc::new(Schema::default()),
            vec![ColumnData::Int(vec![Some(1)])],
            watermark,
        )
    }

    fn query(full_range: Window, done_ranges: DoneRanges) -> SourceQuery {
        SourceQuery {
            team_id: 1,
            model_name: "events".to_string(),
            full_range,
            done_ranges,
            fields: vec![Field::new("id", LogicalType::Int64, false)],
            destination_default_fields: vec![],
            filters: serde_json::Value::Null,
            exclude_events: vec![],
            include_events: vec![],
            is_backfill: false,
            backfill_details: None,
            extra_params: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn publishes_schema_and_streams_in_order() {
        let schema = Schema::new(vec![Field::new("id", LogicalType::Int64, false)]);
        // The window is half-open `(start, end]`: a batch watermarked
        // exactly at `start` belongs to the previous window, not this one.
        let batches = vec![batch(t(1)), batch(t(2)), batch(t(3))];
        let source = InMemorySource::new(schema, batches);
        let queue = RecordBatchQueue::new(1_000_000);

        let window = Window::new(Some(t(0)), t(4)).unwrap();
        let q = query(window, DoneRanges::new());
        let (schema_tx, schema_rx) = tokio::sync::oneshot::channel();

        let queue_clone = Arc::clone(&queue);
        let handle = tokio::spawn(async move { source.run(q, queue_clone, schema_tx).await });

        let published = schema_rx.await.expect("schema should publish");
        assert_eq!(published.fields.len(), 1);

        let first = queue.get().await.unwrap().unwrap();
        assert_eq!(first.watermark, t(1));
        let second = queue.get().await.unwrap().unwrap();
        assert_eq!(second.watermark, t(2));
        let third = queue.get().await.unwrap().unwrap();
        assert_eq!(third.watermark, t(3));
        assert!(queue.get().await.unwrap().is_none());

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn empty_result_drops_schema_without_sending() {
        let schema = Schema::new(vec![Field::new("id", LogicalType::Int64, false)]);
        let source = InMemorySource::new(schema, vec![]);
        let queue = RecordBatchQueue::new(1_000_000);
        let window = Window::new(Some(t(0)), t(1)).unwrap();
        let q = query(window, DoneRanges::new());
        let (schema_tx, schema_rx) = tokio::sync::oneshot::channel();

        source.run(q, Arc::clone(&queue), schema_tx).await.unwrap();
        assert!(schema_rx.await.is_err());
        assert!(queue.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skips_batches_already_covered_by_done_ranges() {
        let schema = Schema::new(vec![Field::new("id", LogicalType::Int64, false)]);
        let batches = vec![batch(t(1)), batch(t(2)), batch(t(3))];
        let source = InMemorySource::new(schema, batches);
        let queue = RecordBatchQueue::new(1_000_000);

        let window = Window::new(Some(t(0)), t(4)).unwrap();
        // Done through t(1) inclusive: the batch watermarked exactly at
        // t(1) was the one that produced this done range and must not be
        // re-emitted.
        let mut done = DoneRanges::new();
        done.track_done_range(Some(t(0)), t(1), t(0));
        let q = query(window, done);
        let (schema_tx, _schema_rx) = tokio::sync::oneshot::channel();

        source.run(q, Arc::clone(&queue), schema_tx).await.unwrap();

        let first = queue.get().await.unwrap().unwrap();
        assert_eq!(first.watermark, t(2));
        let second = queue.get().await.unwrap().unwrap();
        assert_eq!(second.watermark, t(3));
        assert!(queue.get().await.unwrap().is_none());
    }
}

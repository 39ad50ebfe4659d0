//! A FIFO of `RecordBatch`es bounded by cumulative bytes rather than item
//! count (spec §4.5), so memory use stays flat regardless of row width. The
//! queue is the only mutable object shared between the producer and
//! consumer tasks (spec §5): its state lives behind a single mutex, with
//! two `Notify` handles standing in for the condition variables a
//! synchronous implementation would reach for.

use std::collections::VecDeque;
use std::sync::Arc;

use pgexport_types::{ExportError, RecordBatch};
use tokio::sync::{Mutex, Notify};

struct QueueState {
    items: VecDeque<RecordBatch>,
    bytes: u64,
    producer_done: bool,
    producer_error: Option<Arc<ExportError>>,
}

pub struct RecordBatchQueue {
    state: Mutex<QueueState>,
    not_full: Notify,
    not_empty: Notify,
    byte_ceiling: u64,
}

impl RecordBatchQueue {
    pub fn new(byte_ceiling: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                bytes: 0,
                producer_done: false,
                producer_error: None,
            }),
            not_full: Notify::new(),
            not_empty: Notify::new(),
            byte_ceiling,
        })
    }

    /// Blocks until the batch fits under the byte ceiling (or the queue is
    /// currently empty, so a single oversized batch is never stuck forever),
    /// then enqueues it.
    pub async fn put(&self, batch: RecordBatch) {
        let size = batch.approx_size_bytes() as u64;
        loop {
            {
                let mut state = self.state.lock().await;
                if state.items.is_empty() || state.bytes + size <= self.byte_ceiling {
                    state.bytes += size;
                    pgexport_metrics::QUEUE_BYTES.set(state.bytes as i64);
                    state.items.push_back(batch);
                    drop(state);
                    self.not_empty.notify_one();
                    return;
                }
            }
            self.not_full.notified().await;
        }
    }

    /// Blocks until a batch is available, or returns `Ok(None)` once the
    /// queue is drained and the producer has signaled completion, or
    /// `Err` if the producer signaled failure and there is nothing left to
    /// drain.
    pub async fn get(&self) -> Result<Option<RecordBatch>, Arc<ExportError>> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(batch) = state.items.pop_front() {
                    state.bytes -= batch.approx_size_bytes() as u64;
                    pgexport_metrics::QUEUE_BYTES.set(state.bytes as i64);
                    drop(state);
                    self.not_full.notify_one();
                    return Ok(Some(batch));
                }
                if state.producer_done {
                    if let Some(err) = state.producer_error.clone() {
                        return Err(err);
                    }
                    return Ok(None);
                }
            }
            self.not_empty.notified().await;
        }
    }

    pub async fn mark_done(&self) {
        let mut state = self.state.lock().await;
        state.producer_done = true;
        drop(state);
        self.not_empty.notify_waiters();
    }

    pub async fn mark_failed(&self, err: ExportError) {
        let mut state = self.state.lock().await;
        state.producer_done = true;
        state.producer_error = Some(Arc::new(err));
        drop(state);
        self.not_empty.notify_waiters();
    }

    pub async fn current_bytes(&self) -> u64 {
        self.state.lock().await.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pgexport_types::{ColumnData, Schema};
    use std::sync::Arc as StdArc;

    fn batch_of(rows: usize) -> RecordBatch {
        let schema = StdArc::new(Schema::default());
        let data = (0..rows).map(|i| Some(format!("row-{i}"))).collect();
        RecordBatch::new(
            schema,
            vec![ColumnData::Utf8(data)],
            Utc.timestamp_opt(0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn put_get_round_trips_in_order() {
        let queue = RecordBatchQueue::new(1_000_000);
        queue.put(batch_of(3)).await;
        queue.put(batch_of(5)).await;
        queue.mark_done().await;

        let first = queue.get().await.unwrap().unwrap();
        assert_eq!(first.num_rows, 3);
        let second = queue.get().await.unwrap().unwrap();
        assert_eq!(second.num_rows, 5);
        assert!(queue.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_and_done_yields_none() {
        let queue = RecordBatchQueue::new(1_000_000);
        queue.mark_done().await;
        assert!(queue.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn producer_failure_propagates_after_drain() {
        let queue = RecordBatchQueue::new(1_000_000);
        queue.put(batch_of(1)).await;
        queue
            .mark_failed(ExportError::TransientSourceError(anyhow::anyhow!("boom")))
            .await;

        assert!(queue.get().await.unwrap().is_some());
        assert!(queue.get().await.is_err());
    }

    #[tokio::test]
    async fn byte_ceiling_is_never_exceeded_by_a_blocked_producer() {
        let small_size = batch_of(1).approx_size_bytes() as u64;
        let queue = RecordBatchQueue::new(small_size);
        queue.put(batch_of(1)).await;
        assert_eq!(queue.current_bytes().await, small_size);

        let q2 = StdArc::clone(&queue);
        let put_task = tokio::spawn(async move {
            q2.put(batch_of(1)).await;
        });

        tokio::task::yield_now().await;
        // The second put should still be blocked: bytes must not have grown
        // past whatever the first batch already consumed until a `get`
        // makes room.
        assert_eq!(queue.current_bytes().await, small_size);

        let _ = queue.get().await.unwrap();
        put_task.await.unwrap();
        assert!(queue.get().await.unwrap().is_some());
    }
}

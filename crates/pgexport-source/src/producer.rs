use std::sync::Arc;

use async_trait::async_trait;
use pgexport_queue::RecordBatchQueue;
use pgexport_types::{ExportError, Schema};
use tokio::sync::oneshot;

use crate::query::SourceQuery;

/// Drains a model/window into `queue`, publishing the batch schema exactly
/// once via `schema_tx` before or alongside the first batch (spec §4.6). If
/// the run produces no data at all, the implementation should drop
/// `schema_tx` without sending, which the driver reads as "no rows for this
/// window" (§4.9 step 5).
///
/// Implementations own signaling queue completion: on success call
/// `queue.mark_done()`, on fatal failure call `queue.mark_failed(err)` and
/// return the same error.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn run(
        &self,
        query: SourceQuery,
        queue: Arc<RecordBatchQueue>,
        schema_tx: oneshot::Sender<Schema>,
    ) -> Result<(), ExportError>;
}

//! Shared data model for the Postgres batch-export pipeline: the export
//! window, the record-batch/schema types, done-range bookkeeping, heartbeat
//! details, managed-table descriptors, activity/workflow inputs, and the
//! crate-wide error taxonomy.

mod destination;
mod done_ranges;
mod error;
mod heartbeat;
mod inputs;
mod model;
mod record_batch;
mod schema;
mod secret;
mod table;
mod window;

pub use destination::Destination;
pub use done_ranges::{DateRange, DoneRanges};
pub use error::ExportError;
pub use heartbeat::HeartbeatDetails;
pub use inputs::{BackfillDetails, PostgresBatchExportInputs, PostgresInsertInputs};
pub use model::{BatchExportModel, MergeConfig};
pub use record_batch::{ColumnData, RecordBatch};
pub use schema::{Field, LogicalType, Schema};
pub use secret::Secret;
pub use table::{DestinationField, ManagedTableDescriptor, PgType};
pub use window::{Window, WindowError};

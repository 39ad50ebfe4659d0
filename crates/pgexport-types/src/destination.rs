use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::ExportError;
use crate::table::DestinationField;

/// The write surface `pgexport-core` drives an export through. `PgClient`
/// is the only production implementation; tests substitute an in-memory
/// fake so the happy-path and resume scenarios run without a live Postgres
/// (spec §10.6).
#[async_trait]
pub trait Destination: Send + Sync {
    async fn create_table(
        &self,
        schema: &str,
        name: &str,
        fields: &[DestinationField],
        exists_ok: bool,
        primary_key: Option<&[String]>,
    ) -> Result<(), ExportError>;

    async fn drop_table(&self, schema: &str, name: &str, not_found_ok: bool) -> Result<(), ExportError>;

    async fn get_table_columns(&self, schema: &str, name: &str) -> Result<Option<Vec<String>>, ExportError>;

    async fn copy_tsv_to_postgres(
        &self,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        schema: &str,
        name: &str,
        columns: &[String],
    ) -> Result<u64, ExportError>;

    async fn merge_tables(
        &self,
        final_table: &str,
        stage_table: &str,
        schema: &str,
        columns: &[String],
        merge_key: &[String],
        update_key: &[String],
    ) -> Result<u64, ExportError>;
}

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use futures_util::SinkExt;
use pgexport_types::{Destination, DestinationField, ExportError, Secret};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_postgres::IsolationLevel;
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::error_map::classify;
use crate::tls::build_tls_config;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CONNECT_ATTEMPTS: u32 = 5;
const COPY_READ_CHUNK_BYTES: usize = 64 * 1024;

/// Connection lifecycle of spec §4.3: operations other than `connect` are
/// only valid from `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Connected,
    Closed,
}

#[derive(Debug, Clone)]
pub struct PgConnectOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub database: String,
    pub has_self_signed_cert: bool,
}

/// One exclusively-owned destination connection for the lifetime of an
/// activity attempt (spec §9: "ownership of the connection"). Not a
/// general-purpose pool — `max_size` is pinned to 1 so the single handle
/// the driver holds is the only writer.
pub struct PgClient {
    options: PgConnectOptions,
    pool: Option<Pool>,
    state: ConnectionState,
}

impl PgClient {
    pub fn new(options: PgConnectOptions) -> Self {
        Self {
            options,
            pool: None,
            state: ConnectionState::Unconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn require_connected(&self) -> Result<&Pool, ExportError> {
        match (&self.state, &self.pool) {
            (ConnectionState::Connected, Some(pool)) => Ok(pool),
            _ => Err(ExportError::ConnectionError(anyhow::anyhow!(
                "not connected"
            ))),
        }
    }

    /// Opens the destination connection, retrying up to
    /// `MAX_CONNECT_ATTEMPTS` times with exponential backoff on transient
    /// failures. Fails with `ExportError::ConnectionError` once exhausted.
    pub async fn connect(&mut self) -> Result<(), ExportError> {
        self.state = ConnectionState::Connecting;

        let mut cfg = Config::new();
        cfg.host = Some(self.options.host.clone());
        cfg.port = Some(self.options.port);
        cfg.user = Some(self.options.user.clone());
        cfg.password = Some(self.options.password.expose().clone());
        cfg.dbname = Some(self.options.database.clone());
        cfg.connect_timeout = Some(CONNECT_TIMEOUT);
        cfg.pool = Some(PoolConfig {
            max_size: 1,
            ..Default::default()
        });
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut last_err = None;
        for attempt in 0..MAX_CONNECT_ATTEMPTS {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                tracing::warn!(attempt, ?backoff, "retrying postgres connection");
                tokio::time::sleep(backoff).await;
            }

            let tls = MakeRustlsConnect::new(build_tls_config(self.options.has_self_signed_cert));
            let pool = match cfg.create_pool(Some(Runtime::Tokio1), tls) {
                Ok(pool) => pool,
                Err(err) => {
                    last_err = Some(anyhow::anyhow!(err));
                    continue;
                }
            };

            match tokio::time::timeout(CONNECT_TIMEOUT, pool.get()).await {
                Ok(Ok(_conn)) => {
                    self.pool = Some(pool);
                    self.state = ConnectionState::Connected;
                    return Ok(());
                }
                Ok(Err(err)) => last_err = Some(anyhow::anyhow!(err)),
                Err(_) => last_err = Some(anyhow::anyhow!("connect timed out")),
            }
        }

        self.state = ConnectionState::Unconnected;
        Err(ExportError::ConnectionError(
            last_err.unwrap_or_else(|| anyhow::anyhow!("exhausted connection attempts")),
        ))
    }

    pub fn close(&mut self) {
        self.pool = None;
        self.state = ConnectionState::Closed;
    }

    pub async fn create_table(
        &self,
        schema: &str,
        name: &str,
        fields: &[DestinationField],
        exists_ok: bool,
        primary_key: Option<&[String]>,
    ) -> Result<(), ExportError> {
        let pool = self.require_connected()?;
        let mut client = pool
            .get()
            .await
            .map_err(|e| ExportError::ConnectionError(anyhow::anyhow!(e)))?;

        let txn = client
            .build_transaction()
            .isolation_level(IsolationLevel::ReadCommitted)
            .read_only(false)
            .start()
            .await
            .map_err(|e| classify(e, false, schema, name))?;

        let columns = fields
            .iter()
            .map(|f| format!("{} {}", quote_ident(&f.name), f.pg_type))
            .collect::<Vec<_>>()
            .join(", ");

        let pk_clause = primary_key
            .filter(|pk| !pk.is_empty())
            .map(|pk| {
                format!(
                    ", PRIMARY KEY ({})",
                    pk.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
                )
            })
            .unwrap_or_default();

        let if_not_exists = if exists_ok { "IF NOT EXISTS " } else { "" };
        let sql = format!(
            "CREATE TABLE {if_not_exists}{}.{} ({columns}{pk_clause})",
            quote_ident(schema),
            quote_ident(name),
        );

        txn.execute(&sql, &[])
            .await
            .map_err(|e| classify(e, false, schema, name))?;
        txn.commit()
            .await
            .map_err(|e| classify(e, false, schema, name))?;
        Ok(())
    }

    pub async fn drop_table(&self, schema: &str, name: &str, not_found_ok: bool) -> Result<(), ExportError> {
        let pool = self.require_connected()?;
        let client = pool
            .get()
            .await
            .map_err(|e| ExportError::ConnectionError(anyhow::anyhow!(e)))?;

        let if_exists = if not_found_ok { "IF EXISTS " } else { "" };
        let sql = format!("DROP TABLE {if_exists}{}.{}", quote_ident(schema), quote_ident(name));
        client
            .execute(&sql, &[])
            .await
            .map_err(|e| classify(e, false, schema, name))?;
        Ok(())
    }

    /// Returns the live column names of `schema.name`. Tolerates
    /// `InsufficientPrivilege` and `UndefinedTable` per spec §4.3 by
    /// returning `None`; callers decide the fallback.
    pub async fn get_table_columns(
        &self,
        schema: &str,
        name: &str,
    ) -> Result<Option<Vec<String>>, ExportError> {
        let pool = self.require_connected()?;
        let client = pool
            .get()
            .await
            .map_err(|e| ExportError::ConnectionError(anyhow::anyhow!(e)))?;

        let sql = format!("SELECT * FROM {}.{} WHERE 1=0", quote_ident(schema), quote_ident(name));
        match client.prepare(&sql).await {
            Ok(stmt) => {
                let stmt_columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
                Ok(Some(stmt_columns))
            }
            Err(err) => match classify(err, true, schema, name) {
                ExportError::InsufficientPrivilege { .. } => {
                    tracing::warn!(schema, name, "insufficient privilege to introspect columns, assuming derived schema");
                    Ok(None)
                }
                ExportError::UndefinedTable { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    /// Streams `reader`'s bytes through the sanitizer (§4.1) into a
    /// `COPY ... FROM STDIN WITH (FORMAT CSV, DELIMITER '\t')`.
    pub async fn copy_tsv_to_postgres<R>(
        &self,
        mut reader: R,
        schema: &str,
        name: &str,
        columns: &[String],
    ) -> Result<u64, ExportError>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let pool = self.require_connected()?;
        let mut client = pool
            .get()
            .await
            .map_err(|e| ExportError::ConnectionError(anyhow::anyhow!(e)))?;

        let txn = client
            .build_transaction()
            .isolation_level(IsolationLevel::ReadCommitted)
            .read_only(false)
            .start()
            .await
            .map_err(|e| classify(e, false, schema, name))?;

        txn.execute(&format!("SET search_path TO {}", quote_ident(schema)), &[])
            .await
            .map_err(|e| classify(e, false, schema, name))?;

        let column_list = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        let copy_sql = format!(
            "COPY {} ({column_list}) FROM STDIN WITH (FORMAT CSV, DELIMITER '\t')",
            quote_ident(name),
        );

        let sink = txn
            .copy_in(&copy_sql)
            .await
            .map_err(|e| classify(e, false, schema, name))?;
        tokio::pin!(sink);

        let mut buf = vec![0u8; COPY_READ_CHUNK_BYTES];
        let mut total_bytes = 0u64;
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| ExportError::TransientSourceError(e.into()))?;
            if n == 0 {
                break;
            }
            let sanitized = pgexport_sanitize::sanitize(&buf[..n]);
            total_bytes += sanitized.len() as u64;
            sink.send(bytes::Bytes::from(sanitized))
                .await
                .map_err(|e| classify(e, false, schema, name))?;
        }

        sink.finish()
            .await
            .map_err(|e| classify(e, false, schema, name))?;
        txn.commit()
            .await
            .map_err(|e| classify(e, false, schema, name))?;
        Ok(total_bytes)
    }

    /// `INSERT ... SELECT ... FROM stage ON CONFLICT (merge_key) DO UPDATE`,
    /// used instead of `MERGE` for PostgreSQL < 15 compatibility (§4.3).
    pub async fn merge_tables(
        &self,
        final_table: &str,
        stage_table: &str,
        schema: &str,
        columns: &[String],
        merge_key: &[String],
        update_key: &[String],
    ) -> Result<u64, ExportError> {
        let pool = self.require_connected()?;
        let client = pool
            .get()
            .await
            .map_err(|e| ExportError::ConnectionError(anyhow::anyhow!(e)))?;

        let has_pk: bool = client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.table_constraints
                    WHERE table_schema = $1 AND table_name = $2 AND constraint_type = 'PRIMARY KEY'
                )",
                &[&schema, &final_table],
            )
            .await
            .map_err(|e| classify(e, false, schema, final_table))?
            .get(0);

        if !has_pk {
            return Err(ExportError::MissingPrimaryKeyError {
                schema: schema.to_string(),
                table: final_table.to_string(),
            });
        }

        let column_list = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        let conflict_cols = merge_key.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        let set_clause = columns
            .iter()
            .filter(|c| !merge_key.contains(c))
            .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let update_guard = update_key
            .iter()
            .map(|c| {
                format!(
                    "EXCLUDED.{} > {}.{}",
                    quote_ident(c),
                    quote_ident(final_table),
                    quote_ident(c)
                )
            })
            .collect::<Vec<_>>()
            .join(" OR ");

        let sql = format!(
            "INSERT INTO {schema}.{final_table} ({column_list}) \
             SELECT {column_list} FROM {schema}.{stage_table} \
             ON CONFLICT ({conflict_cols}) DO UPDATE SET {set_clause} \
             WHERE {update_guard}",
            schema = quote_ident(schema),
            final_table = quote_ident(final_table),
            stage_table = quote_ident(stage_table),
        );

        let rows = client
            .execute(&sql, &[])
            .await
            .map_err(|e| classify(e, false, schema, final_table))?;
        Ok(rows)
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `Destination` is the object-safe seam `pgexport-core` is built against;
/// this impl just forwards to the inherent methods above so production
/// callers keep the concrete, generic-`R` `copy_tsv_to_postgres` for free.
#[async_trait]
impl Destination for PgClient {
    async fn create_table(
        &self,
        schema: &str,
        name: &str,
        fields: &[DestinationField],
        exists_ok: bool,
        primary_key: Option<&[String]>,
    ) -> Result<(), ExportError> {
        PgClient::create_table(self, schema, name, fields, exists_ok, primary_key).await
    }

    async fn drop_table(&self, schema: &str, name: &str, not_found_ok: bool) -> Result<(), ExportError> {
        PgClient::drop_table(self, schema, name, not_found_ok).await
    }

    async fn get_table_columns(&self, schema: &str, name: &str) -> Result<Option<Vec<String>>, ExportError> {
        PgClient::get_table_columns(self, schema, name).await
    }

    async fn copy_tsv_to_postgres(
        &self,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        schema: &str,
        name: &str,
        columns: &[String],
    ) -> Result<u64, ExportError> {
        PgClient::copy_tsv_to_postgres(self, reader, schema, name, columns).await
    }

    async fn merge_tables(
        &self,
        final_table: &str,
        stage_table: &str,
        schema: &str,
        columns: &[String],
        merge_key: &[String],
        update_key: &[String],
    ) -> Result<u64, ExportError> {
        PgClient::merge_tables(self, final_table, stage_table, schema, columns, merge_key, update_key).await
    }
}

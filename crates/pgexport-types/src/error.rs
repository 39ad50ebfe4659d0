use thiserror::Error;

/// The error taxonomy of spec §7. Every variant is non-retryable (`✱` in the
/// spec table) unless noted otherwise; `is_retryable` is the single source
/// of truth the workflow-level retry policy (§6) consults instead of
/// string-matching messages.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to connect to postgres after exhausting retries")]
    ConnectionError(#[source] anyhow::Error),

    #[error("postgres connection lost mid-stream")]
    OperationalError(#[source] anyhow::Error),

    #[error("destination schema {0:?} does not exist")]
    InvalidSchemaName(String),

    #[error("insufficient privilege for {operation}")]
    InsufficientPrivilege {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("destination table {schema}.{table} does not exist")]
    UndefinedTable { schema: String, table: String },

    #[error("destination column drift: {0}")]
    UndefinedColumn(String),

    #[error("not-null violation writing to destination")]
    NotNullViolation(#[source] anyhow::Error),

    #[error("unique violation writing to destination")]
    UniqueViolation(#[source] anyhow::Error),

    #[error("check or foreign-key violation writing to destination")]
    ConstraintViolation(#[source] anyhow::Error),

    #[error("string data right truncation")]
    StringDataRightTruncation(#[source] anyhow::Error),

    #[error("destination is out of disk space")]
    DiskFull(#[source] anyhow::Error),

    #[error("feature not supported by a read-only destination")]
    FeatureNotSupported(#[source] anyhow::Error),

    #[error("payload contains bytes postgres cannot translate")]
    UntranslatableCharacter(#[source] anyhow::Error),

    #[error("merge requested on {schema}.{table} which has no primary key")]
    MissingPrimaryKeyError { schema: String, table: String },

    #[error("unsupported source type for field {name:?}: {logical_type:?}")]
    UnsupportedType {
        name: String,
        logical_type: crate::schema::LogicalType,
    },

    #[error("transient source I/O error")]
    TransientSourceError(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExportError {
    /// `true` for the rows in §7 marked with `✱`: the workflow should
    /// surface these as a failure rather than silently retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExportError::TransientSourceError(_))
    }

    /// Stable label for `activity_errors_total{kind}` (spec §10.5).
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::ConnectionError(_) => "connection_error",
            ExportError::OperationalError(_) => "operational_error",
            ExportError::InvalidSchemaName(_) => "invalid_schema_name",
            ExportError::InsufficientPrivilege { .. } => "insufficient_privilege",
            ExportError::UndefinedTable { .. } => "undefined_table",
            ExportError::UndefinedColumn(_) => "undefined_column",
            ExportError::NotNullViolation(_) => "not_null_violation",
            ExportError::UniqueViolation(_) => "unique_violation",
            ExportError::ConstraintViolation(_) => "constraint_violation",
            ExportError::StringDataRightTruncation(_) => "string_data_right_truncation",
            ExportError::DiskFull(_) => "disk_full",
            ExportError::FeatureNotSupported(_) => "feature_not_supported",
            ExportError::UntranslatableCharacter(_) => "untranslatable_character",
            ExportError::MissingPrimaryKeyError { .. } => "missing_primary_key",
            ExportError::UnsupportedType { .. } => "unsupported_type",
            ExportError::TransientSourceError(_) => "transient_source_error",
            ExportError::Other(_) => "other",
        }
    }
}

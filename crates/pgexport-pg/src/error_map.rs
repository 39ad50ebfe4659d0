use pgexport_types::ExportError;
use tokio_postgres::error::SqlState;

/// Classifies a wire-level Postgres error into the taxonomy of spec §7 by
/// inspecting its `SqlState`. Errors with no recognized SQLSTATE (connection
/// drops, protocol errors) fall through to `OperationalError`. `schema`/
/// `table` are used only to enrich `UndefinedTable`.
pub fn classify(
    err: tokio_postgres::Error,
    during_introspection: bool,
    schema: &str,
    table: &str,
) -> ExportError {
    let Some(code) = err.code() else {
        return ExportError::OperationalError(err.into());
    };

    match *code {
        SqlState::INVALID_SCHEMA_NAME => {
            ExportError::InvalidSchemaName(format!("{err}"))
        }
        SqlState::INSUFFICIENT_PRIVILEGE => {
            let operation = if during_introspection {
                "introspect columns"
            } else {
                "write"
            };
            ExportError::InsufficientPrivilege {
                operation,
                source: err.into(),
            }
        }
        SqlState::UNDEFINED_TABLE => ExportError::UndefinedTable {
            schema: schema.to_string(),
            table: table.to_string(),
        },
        SqlState::UNDEFINED_COLUMN => ExportError::UndefinedColumn(format!("{err}")),
        SqlState::NOT_NULL_VIOLATION => ExportError::NotNullViolation(err.into()),
        SqlState::UNIQUE_VIOLATION => ExportError::UniqueViolation(err.into()),
        SqlState::CHECK_VIOLATION | SqlState::FOREIGN_KEY_VIOLATION => {
            ExportError::ConstraintViolation(err.into())
        }
        SqlState::STRING_DATA_RIGHT_TRUNCATION => {
            ExportError::StringDataRightTruncation(err.into())
        }
        SqlState::DISK_FULL => ExportError::DiskFull(err.into()),
        SqlState::FEATURE_NOT_SUPPORTED => ExportError::FeatureNotSupported(err.into()),
        SqlState::UNTRANSLATABLE_CHARACTER => ExportError::UntranslatableCharacter(err.into()),
        _ => ExportError::OperationalError(err.into()),
    }
}

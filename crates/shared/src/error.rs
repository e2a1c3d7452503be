use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dataMode should be \"bookmarkable\" or \"anonymous\", got {0:?}")]
pub struct UnknownDataMode(pub String);

/// Failures of the record capabilities used by view controllers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("no database api available for {operation}; provide one or override {operation}")]
    DatabaseUnavailable { operation: &'static str },
    #[error("saved records do not contain a record of table {table}")]
    RecordNotSaved { table: String },
    #[error("record of table {table} not found")]
    RecordNotFound { table: String },
    #[error("invalid join from {table} to {other_table}: {reason}")]
    InvalidJoin {
        table: String,
        other_table: String,
        reason: String,
    },
    #[error("{message}")]
    RecordInUse { table: String, message: String },
    #[error("illegal autoGen value on {table}.{column}")]
    IllegalAutoGen { table: String, column: String },
}

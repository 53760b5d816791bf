// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by every Tablegate layer
//!
//! Each failure maps to a stable machine-readable [`ErrorCode`]. Messages
//! never carry SQL text; details carry field-level context only.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Stable error codes surfaced to tool callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotWhitelisted,
    AccessDenied,
    InvalidColumn,
    InvalidOperator,
    EmptyWhereClause,
    ValidationError,
    ForeignKeyViolation,
    UniqueViolation,
    NotNullViolation,
    CheckViolation,
    NotFound,
    TransactionTimeout,
    Deadlock,
    SerializationFailure,
    ConnectionFailure,
    PoolExhausted,
    BackupIntegrityFailure,
    BackupFailed,
    UnknownOperation,
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotWhitelisted => "NOT_WHITELISTED",
            ErrorCode::AccessDenied => "ACCESS_DENIED",
            ErrorCode::InvalidColumn => "INVALID_COLUMN",
            ErrorCode::InvalidOperator => "INVALID_OPERATOR",
            ErrorCode::EmptyWhereClause => "EMPTY_WHERE_CLAUSE",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ForeignKeyViolation => "FOREIGN_KEY_VIOLATION",
            ErrorCode::UniqueViolation => "UNIQUE_VIOLATION",
            ErrorCode::NotNullViolation => "NOT_NULL_VIOLATION",
            ErrorCode::CheckViolation => "CHECK_VIOLATION",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::TransactionTimeout => "TRANSACTION_TIMEOUT",
            ErrorCode::Deadlock => "DEADLOCK",
            ErrorCode::SerializationFailure => "SERIALIZATION_FAILURE",
            ErrorCode::ConnectionFailure => "CONNECTION_FAILURE",
            ErrorCode::PoolExhausted => "POOL_EXHAUSTED",
            ErrorCode::BackupIntegrityFailure => "BACKUP_INTEGRITY_FAILURE",
            ErrorCode::BackupFailed => "BACKUP_FAILED",
            ErrorCode::UnknownOperation => "UNKNOWN_OPERATION",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Transient failures a caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::SerializationFailure
                | ErrorCode::Deadlock
                | ErrorCode::ConnectionFailure
                | ErrorCode::PoolExhausted
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level problem found while validating a payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
            constraint: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }
}

/// Unified error type for admin operations
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Table '{table}' is not whitelisted")]
    NotWhitelisted { table: String },

    #[error("Access denied: {operation} on '{table}' ({reason})")]
    AccessDenied {
        table: String,
        operation: String,
        reason: String,
    },

    #[error("Column '{column}' is not allowed on table '{table}'")]
    InvalidColumn { table: String, column: String },

    #[error("Operator '{operator}' is not supported (column '{column}')")]
    InvalidOperator { column: String, operator: String },

    #[error("{operation} requires a non-empty WHERE clause")]
    EmptyWhereClause { operation: String },

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        violations: Vec<Violation>,
    },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation {
        message: String,
        violations: Vec<Violation>,
    },

    #[error("Unique violation: {message}")]
    UniqueViolation {
        message: String,
        violations: Vec<Violation>,
    },

    #[error("Not-null violation: {message}")]
    NotNullViolation { message: String, column: Option<String> },

    #[error("Check violation: {message}")]
    CheckViolation {
        message: String,
        constraint: Option<String>,
    },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Transaction timed out after {timeout_ms}ms")]
    TransactionTimeout { timeout_ms: u64 },

    #[error("Deadlock detected: {message}")]
    Deadlock { message: String },

    #[error("Serialization failure: {message}")]
    SerializationFailure { message: String },

    #[error("Connection failed: {message}")]
    ConnectionFailure { message: String },

    #[error("Connection pool exhausted: {message}")]
    PoolExhausted { message: String },

    #[error("Backup integrity check failed: {message}")]
    BackupIntegrity {
        message: String,
        backup_file: Option<String>,
    },

    #[error("Backup operation failed: {message}")]
    BackupFailed { message: String },

    #[error("Unknown operation: {operation}")]
    UnknownOperation { operation: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        sqlstate: Option<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Failure of one entry inside a batch; the batch was rolled back.
    #[error("Batch entry {index} failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<AdminError>,
    },
}

impl AdminError {
    pub fn not_whitelisted(table: impl Into<String>) -> Self {
        Self::NotWhitelisted {
            table: table.into(),
        }
    }

    pub fn access_denied(
        table: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::AccessDenied {
            table: table.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::InvalidColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn invalid_operator(column: impl Into<String>, operator: impl Into<String>) -> Self {
        Self::InvalidOperator {
            column: column.into(),
            operator: operator.into(),
        }
    }

    pub fn empty_where(operation: impl Into<String>) -> Self {
        Self::EmptyWhereClause {
            operation: operation.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            violations: Vec::new(),
        }
    }

    pub fn validation_with(msg: impl Into<String>, violations: Vec<Violation>) -> Self {
        Self::Validation {
            message: msg.into(),
            violations,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    pub fn connection_failure(msg: impl Into<String>) -> Self {
        Self::ConnectionFailure {
            message: msg.into(),
        }
    }

    pub fn backup_integrity(msg: impl Into<String>, backup_file: Option<String>) -> Self {
        Self::BackupIntegrity {
            message: msg.into(),
            backup_file,
        }
    }

    pub fn backup_failed(msg: impl Into<String>) -> Self {
        Self::BackupFailed {
            message: msg.into(),
        }
    }

    pub fn unknown_operation(op: impl Into<String>) -> Self {
        Self::UnknownOperation {
            operation: op.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
        }
    }

    pub fn at_batch_index(self, index: usize) -> Self {
        Self::Batch {
            index,
            source: Box::new(self),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AdminError::NotWhitelisted { .. } => ErrorCode::NotWhitelisted,
            AdminError::AccessDenied { .. } => ErrorCode::AccessDenied,
            AdminError::InvalidColumn { .. } => ErrorCode::InvalidColumn,
            AdminError::InvalidOperator { .. } => ErrorCode::InvalidOperator,
            AdminError::EmptyWhereClause { .. } => ErrorCode::EmptyWhereClause,
            AdminError::Validation { .. } => ErrorCode::ValidationError,
            AdminError::ForeignKeyViolation { .. } => ErrorCode::ForeignKeyViolation,
            AdminError::UniqueViolation { .. } => ErrorCode::UniqueViolation,
            AdminError::NotNullViolation { .. } => ErrorCode::NotNullViolation,
            AdminError::CheckViolation { .. } => ErrorCode::CheckViolation,
            AdminError::NotFound { .. } => ErrorCode::NotFound,
            AdminError::TransactionTimeout { .. } => ErrorCode::TransactionTimeout,
            AdminError::Deadlock { .. } => ErrorCode::Deadlock,
            AdminError::SerializationFailure { .. } => ErrorCode::SerializationFailure,
            AdminError::ConnectionFailure { .. } => ErrorCode::ConnectionFailure,
            AdminError::PoolExhausted { .. } => ErrorCode::PoolExhausted,
            AdminError::BackupIntegrity { .. } => ErrorCode::BackupIntegrityFailure,
            AdminError::BackupFailed { .. } => ErrorCode::BackupFailed,
            AdminError::UnknownOperation { .. } => ErrorCode::UnknownOperation,
            AdminError::Database { .. } => ErrorCode::DatabaseError,
            AdminError::Internal { .. } => ErrorCode::InternalError,
            AdminError::Batch { source, .. } => source.code(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Structured context for the caller; `Value::Null` when there is none.
    pub fn details(&self) -> Value {
        match self {
            AdminError::NotWhitelisted { table } => json!({ "table": table }),
            AdminError::AccessDenied {
                table, operation, ..
            } => json!({ "table": table, "operation": operation }),
            AdminError::InvalidColumn { table, column } => {
                json!({ "table": table, "column": column })
            }
            AdminError::InvalidOperator { column, operator } => {
                json!({ "column": column, "operator": operator })
            }
            AdminError::Validation { violations, .. }
            | AdminError::ForeignKeyViolation { violations, .. }
            | AdminError::UniqueViolation { violations, .. } => {
                if violations.is_empty() {
                    Value::Null
                } else {
                    json!({ "errors": violations })
                }
            }
            AdminError::NotNullViolation {
                column: Some(column),
                ..
            } => json!({ "column": column }),
            AdminError::CheckViolation {
                constraint: Some(constraint),
                ..
            } => json!({ "constraint": constraint }),
            AdminError::TransactionTimeout { timeout_ms } => json!({ "timeoutMs": timeout_ms }),
            AdminError::BackupIntegrity {
                backup_file: Some(file),
                ..
            } => json!({ "backupFile": file }),
            AdminError::Database {
                sqlstate: Some(state),
                ..
            } => json!({ "sqlstate": state }),
            AdminError::Batch { index, source } => {
                let mut details = match source.details() {
                    Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                details.insert("batchIndex".into(), json!(index));
                Value::Object(details)
            }
            _ => Value::Null,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.to_string(),
            details: self.details(),
            retryable: self.is_retryable(),
        }
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        AdminError::validation(format!("Invalid arguments: {}", err))
    }
}

/// Wire shape of an error returned to a tool caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
    pub retryable: bool,
}

/// Result type alias for admin operations
pub type AdminResult<T> = Result<T, AdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes() {
        assert!(ErrorCode::Deadlock.is_retryable());
        assert!(ErrorCode::SerializationFailure.is_retryable());
        assert!(ErrorCode::ConnectionFailure.is_retryable());
        assert!(ErrorCode::PoolExhausted.is_retryable());
        assert!(!ErrorCode::UniqueViolation.is_retryable());
        assert!(!ErrorCode::TransactionTimeout.is_retryable());
    }

    #[test]
    fn batch_error_keeps_inner_code_and_index() {
        let err = AdminError::ForeignKeyViolation {
            message: "series_id references a missing row".into(),
            violations: vec![Violation::new("series_id", "no such series")],
        }
        .at_batch_index(2);

        assert_eq!(err.code(), ErrorCode::ForeignKeyViolation);
        let details = err.details();
        assert_eq!(details["batchIndex"], 2);
        assert_eq!(details["errors"][0]["field"], "series_id");
    }

    #[test]
    fn payload_serializes_code_as_screaming_snake() {
        let payload = AdminError::not_whitelisted("pg_shadow").to_payload();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["code"], "NOT_WHITELISTED");
        assert_eq!(value["retryable"], false);
        assert_eq!(value["details"]["table"], "pg_shadow");
    }
}

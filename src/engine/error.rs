// SPDX-License-Identifier: Apache-2.0

//! Raw driver failures and their translation into the admin error taxonomy
//!
//! Drivers report a [`DbFailure`] carrying SQLSTATE and constraint context.
//! Translation into [`AdminError`] happens once, at the transaction
//! boundary (or directly for single-statement reads).

use sqlx::postgres::PgDatabaseError;
use tablegate_core::{AdminError, Violation};
use thiserror::Error;

/// Coarse class of a driver failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbFailureKind {
    /// Server reported an error with a SQLSTATE
    Database,
    /// Socket, TLS, or protocol failure
    Connection,
    /// No pooled connection became available in time
    PoolTimeout,
    /// Client-side deadline expired
    Timeout,
    /// Row could not be decoded
    Decode,
    Other,
}

/// Failure reported by a [`DataEngine`](crate::engine::DataEngine)
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DbFailure {
    pub kind: DbFailureKind,
    pub sqlstate: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub constraint: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
}

impl DbFailure {
    pub fn new(kind: DbFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sqlstate: None,
            message: message.into(),
            detail: None,
            constraint: None,
            table: None,
            column: None,
        }
    }

    /// Server error with a SQLSTATE, as a mock engine would script it.
    pub fn sqlstate(code: &str, message: impl Into<String>) -> Self {
        Self {
            sqlstate: Some(code.to_string()),
            ..Self::new(DbFailureKind::Database, message)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DbFailureKind::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(DbFailureKind::Timeout, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(DbFailureKind::Decode, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == DbFailureKind::Timeout || self.sqlstate.as_deref() == Some("57014")
    }

    /// Column named in a `Key (col)=(value)` detail line, if present.
    fn key_column(&self) -> Option<String> {
        let detail = self.detail.as_deref()?;
        let start = detail.find("Key (")? + "Key (".len();
        let end = detail[start..].find(')')? + start;
        Some(detail[start..end].to_string())
    }

    fn violation(&self) -> Vec<Violation> {
        let field = self
            .column
            .clone()
            .or_else(|| self.key_column())
            .or_else(|| self.constraint.clone())
            .unwrap_or_default();
        let mut violation = Violation::new(
            field,
            self.detail.clone().unwrap_or_else(|| self.message.clone()),
        );
        if let Some(constraint) = &self.constraint {
            violation = violation.with_constraint(constraint.clone());
        }
        vec![violation]
    }

    /// Maps the failure to an admin error. `timeout_ms` is reported for
    /// statement-timeout cancellations.
    pub fn into_admin(self, timeout_ms: u64) -> AdminError {
        match self.kind {
            DbFailureKind::PoolTimeout => {
                return AdminError::PoolExhausted {
                    message: self.message,
                }
            }
            DbFailureKind::Connection => return AdminError::connection_failure(self.message),
            DbFailureKind::Timeout => return AdminError::TransactionTimeout { timeout_ms },
            DbFailureKind::Decode | DbFailureKind::Other => {
                return AdminError::Database {
                    message: self.message,
                    sqlstate: self.sqlstate,
                }
            }
            DbFailureKind::Database => {}
        }

        let state = self.sqlstate.clone().unwrap_or_default();
        match state.as_str() {
            "23505" => AdminError::UniqueViolation {
                violations: self.violation(),
                message: self.message,
            },
            "23503" => AdminError::ForeignKeyViolation {
                violations: self.violation(),
                message: self.message,
            },
            "23502" => AdminError::NotNullViolation {
                message: self.message,
                column: self.column,
            },
            "23514" => AdminError::CheckViolation {
                message: self.message,
                constraint: self.constraint,
            },
            "40001" => AdminError::SerializationFailure {
                message: self.message,
            },
            "40P01" => AdminError::Deadlock {
                message: self.message,
            },
            "57014" => AdminError::TransactionTimeout { timeout_ms },
            "57P01" | "57P02" | "57P03" => AdminError::connection_failure(self.message),
            s if s.starts_with("08") => AdminError::connection_failure(self.message),
            _ => AdminError::Database {
                message: self.message,
                sqlstate: self.sqlstate,
            },
        }
    }
}

impl From<DbFailure> for AdminError {
    fn from(failure: DbFailure) -> Self {
        failure.into_admin(0)
    }
}

impl From<sqlx::Error> for DbFailure {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let mut failure = DbFailure::new(DbFailureKind::Database, db.message());
                failure.sqlstate = db.code().map(|c| c.into_owned());
                failure.constraint = db.constraint().map(str::to_string);
                failure.table = db.table().map(str::to_string);
                if let Some(pg) = db.try_downcast_ref::<PgDatabaseError>() {
                    failure.detail = pg.detail().map(str::to_string);
                    failure.column = pg.column().map(str::to_string);
                }
                failure
            }
            sqlx::Error::PoolTimedOut => DbFailure::new(
                DbFailureKind::PoolTimeout,
                "timed out waiting for a pooled connection",
            ),
            sqlx::Error::PoolClosed => DbFailure::connection("connection pool is closed"),
            sqlx::Error::Io(e) => DbFailure::connection(e.to_string()),
            sqlx::Error::Tls(e) => DbFailure::connection(e.to_string()),
            sqlx::Error::Protocol(msg) => DbFailure::connection(msg),
            sqlx::Error::WorkerCrashed => DbFailure::connection("connection worker crashed"),
            sqlx::Error::ColumnDecode { index, source } => {
                DbFailure::decode(format!("failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(e) => DbFailure::decode(e.to_string()),
            other => DbFailure::new(DbFailureKind::Other, other.to_string()),
        }
    }
}

/// Result type alias for driver operations
pub type DbResult<T> = Result<T, DbFailure>;

#[cfg(test)]
mod tests {
    use super::*;
    use tablegate_core::ErrorCode;

    #[test]
    fn sqlstates_map_to_codes() {
        let cases = [
            ("23505", ErrorCode::UniqueViolation),
            ("23503", ErrorCode::ForeignKeyViolation),
            ("23502", ErrorCode::NotNullViolation),
            ("23514", ErrorCode::CheckViolation),
            ("40001", ErrorCode::SerializationFailure),
            ("40P01", ErrorCode::Deadlock),
            ("57014", ErrorCode::TransactionTimeout),
            ("08006", ErrorCode::ConnectionFailure),
            ("57P01", ErrorCode::ConnectionFailure),
            ("42P01", ErrorCode::DatabaseError),
        ];
        for (state, code) in cases {
            let err = DbFailure::sqlstate(state, "boom").into_admin(1000);
            assert_eq!(err.code(), code, "sqlstate {}", state);
        }
    }

    #[test]
    fn pool_timeout_is_retryable_exhaustion() {
        let err: AdminError = DbFailure::from(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.code(), ErrorCode::PoolExhausted);
        assert!(err.is_retryable());
    }

    #[test]
    fn unique_violation_names_the_key_column() {
        let err = DbFailure::sqlstate("23505", "duplicate key value violates unique constraint")
            .with_detail("Key (email)=(a@b.c) already exists.")
            .with_constraint("authors_email_key")
            .into_admin(0);
        let details = err.details();
        assert_eq!(details["errors"][0]["field"], "email");
        assert_eq!(details["errors"][0]["constraint"], "authors_email_key");
    }

    #[test]
    fn statement_timeout_reports_configured_budget() {
        let err = DbFailure::sqlstate("57014", "canceling statement due to statement timeout")
            .into_admin(2500);
        assert_eq!(err.details()["timeoutMs"], 2500);
    }
}

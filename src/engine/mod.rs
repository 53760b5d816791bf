// SPDX-License-Identifier: Apache-2.0

// Data Engine Module
// Driver seam, PostgreSQL driver, catalog introspection, validation and transactions

pub mod connection_url;
pub mod drivers;
pub mod error;
pub mod records;
pub mod schema;
pub mod schema_cache;
pub mod traits;
pub mod transaction;
pub mod validator;

pub use connection_url::PgConnectionParams;
pub use error::{DbFailure, DbFailureKind, DbResult};
pub use records::RecordStore;
pub use schema::{SchemaInspector, TableSchema};
pub use schema_cache::SchemaCache;
pub use traits::{DataEngine, TransactionHandle, TransactionOptions};
pub use transaction::{ManagedTransaction, TransactionManager};
pub use validator::DataValidator;

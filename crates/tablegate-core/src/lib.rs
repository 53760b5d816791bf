// SPDX-License-Identifier: Apache-2.0

//! Tablegate core: whitelist registry, access control, error taxonomy.

pub mod access;
pub mod error;
pub mod operator;
pub mod types;
pub mod whitelist;

pub use access::{validate_table_access, Operation};
pub use error::{AdminError, AdminResult, ErrorCode, ErrorPayload, Violation};
pub use operator::Operator;
pub use types::{Record, SqlStatement};
pub use whitelist::{Permission, TableCategory, TablePolicy, Whitelist};

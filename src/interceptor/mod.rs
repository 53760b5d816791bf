// SPDX-License-Identifier: Apache-2.0

//! Operation interceptor
//!
//! Every operation that passes access control is recorded by the
//! [`AuditLogger`] without blocking the caller.

pub mod audit;
pub mod types;

pub use audit::AuditLogger;
pub use types::*;

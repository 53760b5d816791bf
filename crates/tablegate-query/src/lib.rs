// SPDX-License-Identifier: Apache-2.0

//! Tablegate query: WHERE grammar and the parameterized statement builder.

pub mod builder;
pub mod condition;
pub mod ident;

pub use builder::{
    parse_order_by, OnConflict, OrderTerm, QueryBuilder, QueryLimits, SelectQuery, SortDirection,
};
pub use condition::{Condition, WhereClause};
pub use ident::{quote_ident, ColumnTypes, Params};

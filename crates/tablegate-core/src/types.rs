// SPDX-License-Identifier: Apache-2.0

//! Record and statement types shared across crates

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A row keyed by column name, in column order.
pub type Record = serde_json::Map<String, Value>;

/// Parameterized SQL: `text` holds only `$n` placeholders for user values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub text: String,
    pub values: Vec<Value>,
}

impl SqlStatement {
    pub fn new(text: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            values,
        }
    }

    /// Statement without parameters, for fixed catalog queries.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::new(text, Vec::new())
    }
}

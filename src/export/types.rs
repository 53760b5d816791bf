// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use tablegate_query::OnConflict;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// What an import or restore does with rows whose key already exists
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    Error,
    Skip,
    #[serde(alias = "overwrite")]
    Upsert,
}

impl ConflictPolicy {
    pub fn on_conflict(&self) -> OnConflict {
        match self {
            ConflictPolicy::Error => OnConflict::Error,
            ConflictPolicy::Skip => OnConflict::DoNothing,
            ConflictPolicy::Upsert => OnConflict::Upsert,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub file: String,
    pub format: ExportFormat,
    pub records: u64,
    pub size: u64,
}

// SPDX-License-Identifier: Apache-2.0

//! Audit read tools

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tablegate_core::{AdminResult, Record};
use tracing::instrument;

use super::{parse_args, ToolOutput};
use crate::interceptor::types::AuditFilters;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
struct AuditArgs {
    #[serde(default)]
    filters: AuditFilters,
}

#[derive(Debug, Serialize)]
struct AuditPage {
    total: u64,
    count: usize,
    records: Vec<Record>,
}

/// Accepts filters either nested under `filters` or at the top level.
fn filters(arguments: Value) -> AdminResult<AuditFilters> {
    if arguments.get("filters").is_some() {
        Ok(parse_args::<AuditArgs>(arguments)?.filters)
    } else {
        parse_args(arguments)
    }
}

#[instrument(skip(state, arguments))]
pub async fn query_audit_logs(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let filters = filters(arguments)?;
    let (total, records) = state.audit.query(&filters).await?;
    ToolOutput::new(&AuditPage {
        total,
        count: records.len(),
        records,
    })
}

#[instrument(skip(state, arguments))]
pub async fn get_audit_summary(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let filters = filters(arguments)?;
    let summary = state.audit.summary(&filters).await?;
    ToolOutput::new(&summary)
}

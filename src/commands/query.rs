// SPDX-License-Identifier: Apache-2.0

//! Read tool: `query_records`

use serde_json::Value;
use tablegate_core::AdminResult;
use tablegate_query::SelectQuery;
use tracing::instrument;

use super::{parse_args, ToolOutput};
use crate::AppState;

#[instrument(skip(state, arguments))]
pub async fn query_records(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let query: SelectQuery = parse_args(arguments)?;
    let page = state.store.query(&query).await?;
    Ok(ToolOutput::new(&page)?.with_statement(page.statement.clone()))
}

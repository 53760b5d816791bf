// SPDX-License-Identifier: Apache-2.0

//! Schema introspection tools
//!
//! Reads go through the TTL-bounded introspection cache, separate from the
//! validator's explicitly invalidated one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tablegate_core::{AdminError, AdminResult, TablePolicy};
use tracing::instrument;

use super::{parse_args, ToolOutput};
use crate::engine::schema::{ColumnInfo, Relationship, TableSchema};
use crate::AppState;

const MAX_RELATIONSHIP_DEPTH: u32 = 5;

#[derive(Debug, Deserialize)]
struct TableArgs {
    table: String,
}

fn default_depth() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct RelationshipArgs {
    table: String,
    #[serde(default = "default_depth")]
    depth: u32,
}

#[derive(Debug, Serialize)]
struct SchemaView<'a> {
    #[serde(flatten)]
    schema: &'a TableSchema,
    policy: &'a TablePolicy,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelationshipView {
    table: String,
    depth: u32,
    relationships: Vec<Relationship>,
}

#[derive(Debug, Serialize)]
struct ColumnsView<'a> {
    table: &'a str,
    columns: Vec<&'a ColumnInfo>,
}

async fn describe(state: &AppState, table: &str) -> AdminResult<std::sync::Arc<TableSchema>> {
    state.inspector.table_schema(&state.introspection, table).await
}

#[instrument(skip(state, arguments))]
pub async fn get_schema(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: TableArgs = parse_args(arguments)?;
    let policy = state.whitelist.validate_table(&args.table)?;
    let schema = describe(state, &args.table).await?;
    ToolOutput::new(&SchemaView {
        schema: &schema,
        policy,
    })
}

/// Whitelisted tables that exist in the database.
#[instrument(skip(state))]
pub async fn list_tables(state: &AppState) -> AdminResult<ToolOutput> {
    let present = state.inspector.list_tables().await?;
    let tables: Vec<&TablePolicy> = state
        .whitelist
        .tables()
        .filter(|policy| present.contains(&policy.name))
        .collect();
    ToolOutput::new(&tables)
}

#[instrument(skip(state, arguments))]
pub async fn get_relationships(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: RelationshipArgs = parse_args(arguments)?;
    if args.depth == 0 || args.depth > MAX_RELATIONSHIP_DEPTH {
        return Err(AdminError::validation(format!(
            "depth must be between 1 and {}",
            MAX_RELATIONSHIP_DEPTH
        )));
    }
    let relationships = state
        .inspector
        .relationships(&state.introspection, &state.whitelist, &args.table, args.depth)
        .await?;
    ToolOutput::new(&RelationshipView {
        table: args.table,
        depth: args.depth,
        relationships,
    })
}

/// Live columns of a table, limited to the whitelisted ones.
#[instrument(skip(state, arguments))]
pub async fn list_table_columns(state: &AppState, arguments: Value) -> AdminResult<ToolOutput> {
    let args: TableArgs = parse_args(arguments)?;
    let policy = state.whitelist.validate_table(&args.table)?;
    let schema = describe(state, &args.table).await?;
    ToolOutput::new(&ColumnsView {
        table: &args.table,
        columns: schema
            .columns
            .iter()
            .filter(|c| policy.has_column(&c.name))
            .collect(),
    })
}

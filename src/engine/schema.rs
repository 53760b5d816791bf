// SPDX-License-Identifier: Apache-2.0

//! Live catalog introspection
//!
//! Column metadata, keys and constraints come from `information_schema` and
//! `pg_catalog`. Results feed the validator, the builder's type hints and the
//! introspection tools.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tablegate_core::{AdminError, AdminResult, Record, SqlStatement, Whitelist};
use tablegate_query::ColumnTypes;
use tracing::debug;

use crate::engine::schema_cache::SchemaCache;
use crate::engine::traits::DataEngine;

pub const DEFAULT_NAMESPACE: &str = "public";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub udt_name: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

impl ColumnInfo {
    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_name: Option<String>,
}

/// Inbound reference: `table.column` points at the inspected table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub table: String,
    pub column: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueConstraint {
    pub column: String,
    pub constraint_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    /// Single-column UNIQUE constraints.
    pub unique_constraints: Vec<UniqueConstraint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count_estimate: Option<i64>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column name to `udt_name`, as the builder's cast hints.
    pub fn column_types(&self) -> ColumnTypes {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.udt_name.clone()))
            .collect()
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }
}

/// One hop in a relationship walk
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub depth: u32,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    /// "outgoing" when `from_table` is the table being walked, else "incoming".
    pub direction: &'static str,
}

/// Reads catalog metadata through a [`DataEngine`]
pub struct SchemaInspector {
    engine: Arc<dyn DataEngine>,
    namespace: String,
}

impl SchemaInspector {
    pub fn new(engine: Arc<dyn DataEngine>) -> Self {
        Self {
            engine,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Base tables in the namespace, by name.
    pub async fn list_tables(&self) -> AdminResult<Vec<String>> {
        let rows = self
            .engine
            .fetch_all(&SqlStatement::new(
                "SELECT table_name::text AS table_name \
                 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                vec![json!(self.namespace)],
            ))
            .await?;
        Ok(rows.iter().filter_map(|r| text(r, "table_name")).collect())
    }

    pub async fn describe_table(&self, table: &str) -> AdminResult<TableSchema> {
        let args = vec![json!(self.namespace), json!(table)];

        let column_rows = self
            .engine
            .fetch_all(&SqlStatement::new(
                "SELECT column_name::text AS column_name, data_type::text AS data_type, \
                        udt_name::text AS udt_name, is_nullable::text AS is_nullable, \
                        character_maximum_length::int AS max_length, \
                        column_default::text AS column_default \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                args.clone(),
            ))
            .await?;
        if column_rows.is_empty() {
            return Err(AdminError::not_found(format!(
                "Table '{}' does not exist in the database",
                table
            )));
        }

        let pk_rows = self
            .engine
            .fetch_all(&SqlStatement::new(
                "SELECT a.attname::text AS column_name \
                 FROM pg_index i \
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
                 JOIN pg_class c ON c.oid = i.indrelid \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE i.indisprimary AND n.nspname = $1 AND c.relname = $2 \
                 ORDER BY array_position(i.indkey, a.attnum)",
                args.clone(),
            ))
            .await?;
        let primary_key: Vec<String> = pk_rows.iter().filter_map(|r| text(r, "column_name")).collect();

        let fk_rows = self
            .engine
            .fetch_all(&SqlStatement::new(
                "SELECT kcu.column_name::text AS column_name, \
                        ccu.table_name::text AS foreign_table_name, \
                        ccu.column_name::text AS foreign_column_name, \
                        tc.constraint_name::text AS constraint_name \
                 FROM information_schema.table_constraints AS tc \
                 JOIN information_schema.key_column_usage AS kcu \
                   ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 JOIN information_schema.constraint_column_usage AS ccu \
                   ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
                 WHERE tc.constraint_type = 'FOREIGN KEY' \
                   AND tc.table_schema = $1 AND tc.table_name = $2",
                args.clone(),
            ))
            .await?;
        let foreign_keys = fk_rows
            .iter()
            .filter_map(|r| {
                Some(ForeignKey {
                    column: text(r, "column_name")?,
                    referenced_table: text(r, "foreign_table_name")?,
                    referenced_column: text(r, "foreign_column_name")?,
                    constraint_name: text(r, "constraint_name"),
                })
            })
            .collect();

        let unique_rows = self
            .engine
            .fetch_all(&SqlStatement::new(
                "SELECT tc.constraint_name::text AS constraint_name, \
                        kcu.column_name::text AS column_name \
                 FROM information_schema.table_constraints AS tc \
                 JOIN information_schema.key_column_usage AS kcu \
                   ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 WHERE tc.constraint_type = 'UNIQUE' \
                   AND tc.table_schema = $1 AND tc.table_name = $2",
                args.clone(),
            ))
            .await?;
        let unique_constraints = single_column_constraints(&unique_rows);

        let count_rows = self
            .engine
            .fetch_all(&SqlStatement::new(
                "SELECT c.reltuples::bigint AS estimate \
                 FROM pg_class c \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 AND c.relname = $2",
                args,
            ))
            .await?;
        let row_count_estimate = count_rows
            .first()
            .and_then(|r| r.get("estimate"))
            .and_then(Value::as_i64)
            .filter(|n| *n >= 0);

        let columns = column_rows
            .iter()
            .filter_map(|r| {
                let name = text(r, "column_name")?;
                Some(ColumnInfo {
                    is_primary_key: primary_key.contains(&name),
                    data_type: text(r, "data_type").unwrap_or_default(),
                    udt_name: text(r, "udt_name").unwrap_or_default(),
                    nullable: text(r, "is_nullable").as_deref() == Some("YES"),
                    max_length: r.get("max_length").and_then(Value::as_i64),
                    default_value: text(r, "column_default"),
                    name,
                })
            })
            .collect();

        debug!(table, "described table");
        Ok(TableSchema {
            table: table.to_string(),
            columns,
            primary_key,
            foreign_keys,
            unique_constraints,
            row_count_estimate,
        })
    }

    /// Foreign keys in other tables that point at `table`.
    pub async fn inbound_references(&self, table: &str) -> AdminResult<Vec<Reference>> {
        let rows = self
            .engine
            .fetch_all(&SqlStatement::new(
                "SELECT tc.table_name::text AS table_name, \
                        kcu.column_name::text AS column_name, \
                        ccu.column_name::text AS foreign_column_name \
                 FROM information_schema.table_constraints AS tc \
                 JOIN information_schema.key_column_usage AS kcu \
                   ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 JOIN information_schema.constraint_column_usage AS ccu \
                   ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
                 WHERE tc.constraint_type = 'FOREIGN KEY' \
                   AND tc.table_schema = $1 AND ccu.table_name = $2",
                vec![json!(self.namespace), json!(table)],
            ))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| {
                Some(Reference {
                    table: text(r, "table_name")?,
                    column: text(r, "column_name")?,
                    referenced_column: text(r, "foreign_column_name")?,
                })
            })
            .collect())
    }

    /// Cached [`describe_table`](Self::describe_table).
    pub async fn table_schema(&self, cache: &SchemaCache, table: &str) -> AdminResult<Arc<TableSchema>> {
        if let Some(schema) = cache.get(table) {
            return Ok(schema);
        }
        let schema = self.describe_table(table).await?;
        Ok(cache.insert(table, schema))
    }

    /// Breadth-first walk of foreign keys in both directions, limited to
    /// whitelisted tables and `depth` hops.
    pub async fn relationships(
        &self,
        cache: &SchemaCache,
        whitelist: &Whitelist,
        table: &str,
        depth: u32,
    ) -> AdminResult<Vec<Relationship>> {
        let mut found = Vec::new();
        let mut visited: HashSet<String> = HashSet::from([table.to_string()]);
        let mut queue = VecDeque::from([(table.to_string(), 1u32)]);

        while let Some((current, level)) = queue.pop_front() {
            if level > depth {
                continue;
            }

            let schema = self.table_schema(cache, &current).await?;
            for fk in &schema.foreign_keys {
                if !whitelist.contains(&fk.referenced_table) {
                    continue;
                }
                found.push(Relationship {
                    depth: level,
                    from_table: current.clone(),
                    from_column: fk.column.clone(),
                    to_table: fk.referenced_table.clone(),
                    to_column: fk.referenced_column.clone(),
                    direction: "outgoing",
                });
                if visited.insert(fk.referenced_table.clone()) {
                    queue.push_back((fk.referenced_table.clone(), level + 1));
                }
            }

            for reference in self.inbound_references(&current).await? {
                if !whitelist.contains(&reference.table) {
                    continue;
                }
                found.push(Relationship {
                    depth: level,
                    from_table: reference.table.clone(),
                    from_column: reference.column.clone(),
                    to_table: current.clone(),
                    to_column: reference.referenced_column.clone(),
                    direction: "incoming",
                });
                if visited.insert(reference.table.clone()) {
                    queue.push_back((reference.table, level + 1));
                }
            }
        }

        Ok(found)
    }
}

fn text(record: &Record, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}

fn single_column_constraints(rows: &[Record]) -> Vec<UniqueConstraint> {
    let mut by_constraint: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        if let (Some(name), Some(column)) = (text(row, "constraint_name"), text(row, "column_name")) {
            by_constraint.entry(name).or_default().push(column);
        }
    }
    let mut constraints: Vec<UniqueConstraint> = by_constraint
        .into_iter()
        .filter_map(|(constraint_name, mut columns)| {
            (columns.len() == 1).then(|| UniqueConstraint {
                column: columns.remove(0),
                constraint_name,
            })
        })
        .collect();
    constraints.sort_by(|a, b| a.column.cmp(&b.column));
    constraints.dedup_by(|a, b| a.column == b.column);
    constraints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn composite_unique_constraints_are_ignored() {
        let rows = vec![
            row(&[("constraint_name", "authors_email_key"), ("column_name", "email")]),
            row(&[("constraint_name", "chapters_book_number_key"), ("column_name", "book_id")]),
            row(&[("constraint_name", "chapters_book_number_key"), ("column_name", "chapter_number")]),
        ];
        assert_eq!(
            single_column_constraints(&rows),
            vec![UniqueConstraint {
                column: "email".into(),
                constraint_name: "authors_email_key".into(),
            }]
        );
    }

    #[test]
    fn column_types_map_names_to_udt() {
        let schema = TableSchema {
            table: "books".into(),
            columns: vec![ColumnInfo {
                name: "published_at".into(),
                data_type: "timestamp with time zone".into(),
                udt_name: "timestamptz".into(),
                nullable: true,
                max_length: None,
                default_value: None,
                is_primary_key: false,
            }],
            primary_key: vec![],
            foreign_keys: vec![],
            unique_constraints: vec![],
            row_count_estimate: None,
        };
        assert_eq!(
            schema.column_types().get("published_at").map(String::as_str),
            Some("timestamptz")
        );
    }
}

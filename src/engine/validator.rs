// SPDX-License-Identifier: Apache-2.0

//! Record validation against live column metadata
//!
//! Three passes run before a write:
//! 1. schema: presence, nullability, type family, length and naming rules;
//! 2. foreign keys: one existence probe per referencing column;
//! 3. unique columns: one probe per supplied value, excluding the row itself on update.
//!
//! Passes 2 and 3 only run when pass 1 is clean. Probes execute inside the
//! caller's transaction so earlier rows of the same batch are visible.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;
use tablegate_core::whitelist::{
    CREATED_AT_COLUMN, DEFAULT_PRIMARY_KEY, SOFT_DELETE_COLUMN, UPDATED_AT_COLUMN,
};
use tablegate_core::{AdminError, AdminResult, Record, SqlStatement, Violation};
use tablegate_query::ident::bind_for_column;
use tablegate_query::{quote_ident, Params};

use crate::engine::schema::{ColumnInfo, SchemaInspector, TableSchema};
use crate::engine::schema_cache::SchemaCache;
use crate::engine::transaction::ManagedTransaction;

/// Columns the database fills in itself.
const SERVER_MANAGED: [&str; 4] = [
    DEFAULT_PRIMARY_KEY,
    CREATED_AT_COLUMN,
    UPDATED_AT_COLUMN,
    SOFT_DELETE_COLUMN,
];

#[derive(Debug, Clone, Copy)]
pub enum WriteMode<'a> {
    Insert,
    /// Insert that resolves key conflicts itself; unique probes are skipped.
    Upsert,
    /// `current_id` identifies the row being updated, when known.
    Update { current_id: Option<&'a Value> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Numeric,
    Text,
    Uuid,
    Boolean,
    Temporal,
    Json,
    Array,
    Other,
}

impl TypeFamily {
    pub fn of(column: &ColumnInfo) -> Self {
        match column.data_type.as_str() {
            "smallint" | "integer" | "bigint" => TypeFamily::Integer,
            "numeric" | "decimal" | "real" | "double precision" => TypeFamily::Numeric,
            "character varying" | "character" | "text" => TypeFamily::Text,
            "uuid" => TypeFamily::Uuid,
            "boolean" => TypeFamily::Boolean,
            "date" => TypeFamily::Temporal,
            t if t.starts_with("timestamp") => TypeFamily::Temporal,
            "json" | "jsonb" => TypeFamily::Json,
            "ARRAY" => TypeFamily::Array,
            "USER-DEFINED" if column.udt_name == "citext" => TypeFamily::Text,
            _ => TypeFamily::Other,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TypeFamily::Integer => "an integer",
            TypeFamily::Numeric => "a number",
            TypeFamily::Text => "a string",
            TypeFamily::Uuid => "a UUID",
            TypeFamily::Boolean => "a boolean",
            TypeFamily::Temporal => "a date or timestamp",
            TypeFamily::Json => "JSON",
            TypeFamily::Array => "an array",
            TypeFamily::Other => "a value",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            TypeFamily::Integer => match value {
                Value::Number(n) => n.is_i64() || n.is_u64(),
                Value::String(s) => s.trim().parse::<i64>().is_ok(),
                _ => false,
            },
            TypeFamily::Numeric => match value {
                Value::Number(_) => true,
                Value::String(s) => s.trim().parse::<f64>().is_ok(),
                _ => false,
            },
            TypeFamily::Text => value.is_string(),
            TypeFamily::Uuid => value
                .as_str()
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            TypeFamily::Boolean => value.is_boolean(),
            TypeFamily::Temporal => value.as_str().is_some_and(is_temporal),
            TypeFamily::Array => value.is_array(),
            TypeFamily::Json | TypeFamily::Other => true,
        }
    }
}

fn is_temporal(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

/// Naming-convention rules for a supplied value.
fn semantic_violation(column: &str, value: &Value) -> Option<Violation> {
    let name = column.to_ascii_lowercase();

    if let Some(text) = value.as_str() {
        if name.contains("email") {
            let valid = email_pattern().is_some_and(|re| re.is_match(text));
            if !valid {
                return Some(
                    Violation::new(column, "must be a valid email address").with_value(value.clone()),
                );
            }
        }
        if name.contains("url") {
            let valid = url::Url::parse(text)
                .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
                .unwrap_or(false);
            if !valid {
                return Some(
                    Violation::new(column, "must be an absolute http(s) URL").with_value(value.clone()),
                );
            }
        }
    }

    if name.ends_with("_id") || name.contains("count") || name.contains("number") {
        if let Some(n) = value.as_f64() {
            if n < 0.0 {
                return Some(Violation::new(column, "must not be negative").with_value(value.clone()));
            }
        }
    }

    None
}

/// Pass 1: shape of the payload against column metadata.
pub fn check_schema(schema: &TableSchema, data: &Record, mode: WriteMode<'_>) -> Vec<Violation> {
    let mut violations = Vec::new();

    if matches!(mode, WriteMode::Insert | WriteMode::Upsert) {
        for column in &schema.columns {
            let required = !column.nullable
                && !column.has_default()
                && !SERVER_MANAGED.contains(&column.name.as_str());
            if required && !data.contains_key(&column.name) {
                violations.push(Violation::new(&column.name, "is required"));
            }
        }
    }

    for (name, value) in data {
        let Some(column) = schema.column(name) else {
            violations.push(Violation::new(name, "column does not exist in the database"));
            continue;
        };

        if value.is_null() {
            if !column.nullable {
                violations.push(Violation::new(name, "must not be null"));
            }
            continue;
        }

        let family = TypeFamily::of(column);
        if !family.accepts(value) {
            violations.push(
                Violation::new(name, format!("must be {}", family.label())).with_value(value.clone()),
            );
            continue;
        }

        if let (Some(max), Some(text)) = (column.max_length, value.as_str()) {
            if text.chars().count() as i64 > max {
                violations.push(
                    Violation::new(name, format!("must be at most {} characters", max))
                        .with_constraint(format!("max_length:{}", max)),
                );
                continue;
            }
        }

        if let Some(violation) = semantic_violation(name, value) {
            violations.push(violation);
        }
    }

    violations
}

/// Validates payloads before writes
pub struct DataValidator {
    inspector: Arc<SchemaInspector>,
    cache: SchemaCache,
}

impl DataValidator {
    pub fn new(inspector: Arc<SchemaInspector>) -> Self {
        Self {
            inspector,
            cache: SchemaCache::manual(),
        }
    }

    /// Cached column metadata; refreshed only by invalidation.
    pub async fn schema(&self, table: &str) -> AdminResult<Arc<TableSchema>> {
        self.inspector.table_schema(&self.cache, table).await
    }

    pub fn invalidate(&self, table: &str) {
        self.cache.invalidate(table);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub async fn validate(
        &self,
        tx: &mut ManagedTransaction,
        schema: &TableSchema,
        data: &Record,
        mode: WriteMode<'_>,
    ) -> AdminResult<()> {
        let violations = check_schema(schema, data, mode);
        if !violations.is_empty() {
            return Err(AdminError::validation_with(
                format!("{} field(s) failed validation on '{}'", violations.len(), schema.table),
                violations,
            ));
        }

        let fk_violations = check_foreign_keys(tx, schema, data).await?;
        let unique_violations = check_unique(tx, schema, data, mode).await?;

        if !fk_violations.is_empty() {
            let mut violations = fk_violations;
            violations.extend(unique_violations);
            return Err(AdminError::ForeignKeyViolation {
                message: format!("referenced record not found on '{}'", schema.table),
                violations,
            });
        }
        if !unique_violations.is_empty() {
            return Err(AdminError::UniqueViolation {
                message: format!("duplicate value on '{}'", schema.table),
                violations: unique_violations,
            });
        }
        Ok(())
    }
}

async fn check_foreign_keys(
    tx: &mut ManagedTransaction,
    schema: &TableSchema,
    data: &Record,
) -> AdminResult<Vec<Violation>> {
    let mut violations = Vec::new();
    for (name, value) in data {
        if value.is_null() {
            continue;
        }
        let Some(fk) = schema.foreign_key(name) else {
            continue;
        };

        let udt = schema.column(name).map(|c| c.udt_name.as_str());
        let mut params = Params::new();
        let placeholder = bind_for_column(&mut params, udt, value);
        let probe = SqlStatement::new(
            format!(
                "SELECT 1 AS \"found\" FROM {} WHERE {} = {} LIMIT 1",
                quote_ident(&fk.referenced_table),
                quote_ident(&fk.referenced_column),
                placeholder
            ),
            params.into_values(),
        );

        if tx.fetch_all(&probe).await?.is_empty() {
            let mut violation = Violation::new(
                name,
                format!("references missing {}.{}", fk.referenced_table, fk.referenced_column),
            )
            .with_value(value.clone());
            if let Some(constraint) = &fk.constraint_name {
                violation = violation.with_constraint(constraint.clone());
            }
            violations.push(violation);
        }
    }
    Ok(violations)
}

async fn check_unique(
    tx: &mut ManagedTransaction,
    schema: &TableSchema,
    data: &Record,
    mode: WriteMode<'_>,
) -> AdminResult<Vec<Violation>> {
    let current_id = match mode {
        WriteMode::Insert => None,
        WriteMode::Upsert => return Ok(Vec::new()),
        WriteMode::Update { current_id } => current_id.filter(|v| !v.is_null()),
    };
    let pk = schema
        .primary_key
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_PRIMARY_KEY);

    let mut violations = Vec::new();
    for unique in &schema.unique_constraints {
        let column = &unique.column;
        let Some(value) = data.get(column).filter(|v| !v.is_null()) else {
            continue;
        };

        let mut params = Params::new();
        let placeholder = bind_for_column(
            &mut params,
            schema.column(column).map(|c| c.udt_name.as_str()),
            value,
        );
        let mut sql = format!(
            "SELECT 1 AS \"found\" FROM {} WHERE {} = {}",
            quote_ident(&schema.table),
            quote_ident(column),
            placeholder
        );
        if let Some(id) = current_id {
            let id_placeholder =
                bind_for_column(&mut params, schema.column(pk).map(|c| c.udt_name.as_str()), id);
            sql.push_str(&format!(" AND {} <> {}", quote_ident(pk), id_placeholder));
        }
        sql.push_str(" LIMIT 1");

        let probe = SqlStatement::new(sql, params.into_values());
        if !tx.fetch_all(&probe).await?.is_empty() {
            violations.push(
                Violation::new(column, "value already exists")
                    .with_value(value.clone())
                    .with_constraint(unique.constraint_name.clone()),
            );
        }
    }
    Ok(violations)
}

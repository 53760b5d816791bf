// SPDX-License-Identifier: Apache-2.0

//! Safe query builder
//!
//! Every statement is composed from whitelisted, quoted identifiers and
//! `$n` placeholders. User values only ever travel in the parameter list.

use serde::Deserialize;
use serde_json::Value;
use tablegate_core::whitelist::{SOFT_DELETE_COLUMN, UPDATED_AT_COLUMN};
use tablegate_core::{AdminError, AdminResult, Record, SqlStatement, TablePolicy, Whitelist};

use crate::condition::{Condition, WhereClause};
use crate::ident::{bind_for_column, quote_ident, ColumnTypes, Params};

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 1000;

/// Pagination bounds applied to SELECT
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// Read descriptor as received from a tool call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectQuery {
    pub table: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default, rename = "where")]
    pub filter: Option<Value>,
    #[serde(default)]
    pub order_by: Option<Value>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl SelectQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order(mut self, order_by: Value) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn paged(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: String,
    pub direction: SortDirection,
}

/// What an INSERT does when it hits an existing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    #[default]
    Error,
    DoNothing,
    Upsert,
}

/// Compiles descriptors against a whitelist
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'w> {
    whitelist: &'w Whitelist,
    limits: QueryLimits,
    column_types: Option<&'w ColumnTypes>,
}

impl<'w> QueryBuilder<'w> {
    pub fn new(whitelist: &'w Whitelist) -> Self {
        Self {
            whitelist,
            limits: QueryLimits::default(),
            column_types: None,
        }
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Live column types of the target table, used to cast text-encoded values.
    pub fn with_column_types(mut self, types: &'w ColumnTypes) -> Self {
        if !types.is_empty() {
            self.column_types = Some(types);
        }
        self
    }

    fn udt(&self, column: &str) -> Option<&'w str> {
        self.column_types
            .and_then(|types| types.get(column))
            .map(String::as_str)
    }

    pub fn whitelist(&self) -> &'w Whitelist {
        self.whitelist
    }

    pub fn select(&self, query: &SelectQuery) -> AdminResult<SqlStatement> {
        let policy = self.whitelist.validate_table(&query.table)?;

        let projection = match &query.columns {
            None => "*".to_string(),
            Some(columns) if columns.is_empty() => {
                return Err(AdminError::validation("columns must not be empty"))
            }
            Some(columns) => {
                self.whitelist
                    .validate_columns(&query.table, columns.iter().map(String::as_str))?;
                columns
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        };

        let clause = read_clause(policy, query)?;
        let order = parse_order_by(policy, query.order_by.as_ref())?;
        let (limit, offset) = self.pagination(query.limit, query.offset)?;

        let mut params = Params::new();
        let mut sql = format!("SELECT {} FROM {}", projection, quote_ident(&policy.name));
        if let Some(where_sql) = clause.compile(&mut params, self.column_types) {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        if !order.is_empty() {
            let terms: Vec<String> = order
                .iter()
                .map(|term| {
                    let dir = match term.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{} {}", quote_ident(&term.column), dir)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        sql.push_str(&format!(" LIMIT {}", params.push(Value::from(limit))));
        if offset > 0 {
            sql.push_str(&format!(" OFFSET {}", params.push(Value::from(offset))));
        }

        Ok(SqlStatement::new(sql, params.into_values()))
    }

    /// `SELECT COUNT(*)` with the same filtering as [`select`](Self::select).
    pub fn count(&self, query: &SelectQuery) -> AdminResult<SqlStatement> {
        let policy = self.whitelist.validate_table(&query.table)?;
        let clause = read_clause(policy, query)?;

        let mut params = Params::new();
        let mut sql = format!(
            "SELECT COUNT(*) AS \"count\" FROM {}",
            quote_ident(&policy.name)
        );
        if let Some(where_sql) = clause.compile(&mut params, self.column_types) {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        Ok(SqlStatement::new(sql, params.into_values()))
    }

    pub fn insert(
        &self,
        table: &str,
        data: &Record,
        on_conflict: OnConflict,
    ) -> AdminResult<SqlStatement> {
        let policy = self.whitelist.validate_table(table)?;
        self.whitelist
            .validate_columns(table, data.keys().map(String::as_str))?;

        let mut params = Params::new();
        let mut sql = if data.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table))
        } else {
            let columns: Vec<String> = data.keys().map(|c| quote_ident(c)).collect();
            let placeholders: Vec<String> = data
                .iter()
                .map(|(column, value)| bind_for_column(&mut params, self.udt(column), value))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(table),
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        match on_conflict {
            OnConflict::Error => {}
            OnConflict::DoNothing => sql.push_str(" ON CONFLICT DO NOTHING"),
            OnConflict::Upsert => {
                let assignments: Vec<String> = data
                    .keys()
                    .filter(|c| **c != policy.primary_key)
                    .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
                    .collect();
                if assignments.is_empty() {
                    sql.push_str(&format!(
                        " ON CONFLICT ({}) DO NOTHING",
                        quote_ident(&policy.primary_key)
                    ));
                } else {
                    sql.push_str(&format!(
                        " ON CONFLICT ({}) DO UPDATE SET {}",
                        quote_ident(&policy.primary_key),
                        assignments.join(", ")
                    ));
                }
            }
        }
        sql.push_str(" RETURNING *");

        Ok(SqlStatement::new(sql, params.into_values()))
    }

    pub fn update(
        &self,
        table: &str,
        data: &Record,
        filter: Option<&Value>,
    ) -> AdminResult<SqlStatement> {
        let policy = self.whitelist.validate_table(table)?;
        if data.is_empty() {
            return Err(AdminError::validation("update data must not be empty"));
        }
        self.whitelist
            .validate_columns(table, data.keys().map(String::as_str))?;
        let clause = WhereClause::parse(policy, filter)?;
        if clause.is_empty() {
            return Err(AdminError::empty_where("UPDATE"));
        }

        let mut params = Params::new();
        let mut assignments: Vec<String> = data
            .iter()
            .map(|(column, value)| {
                format!(
                    "{} = {}",
                    quote_ident(column),
                    bind_for_column(&mut params, self.udt(column), value)
                )
            })
            .collect();
        if policy.has_column(UPDATED_AT_COLUMN) && !data.contains_key(UPDATED_AT_COLUMN) {
            assignments.push(format!("{} = CURRENT_TIMESTAMP", quote_ident(UPDATED_AT_COLUMN)));
        }

        let where_sql = clause.compile(&mut params, self.column_types).unwrap_or_default();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} RETURNING *",
            quote_ident(table),
            assignments.join(", "),
            where_sql
        );
        Ok(SqlStatement::new(sql, params.into_values()))
    }

    /// Hard delete.
    pub fn delete(&self, table: &str, filter: Option<&Value>) -> AdminResult<SqlStatement> {
        let policy = self.whitelist.validate_table(table)?;
        let clause = WhereClause::parse(policy, filter)?;
        if clause.is_empty() {
            return Err(AdminError::empty_where("DELETE"));
        }

        let mut params = Params::new();
        let where_sql = clause.compile(&mut params, self.column_types).unwrap_or_default();
        let sql = format!(
            "DELETE FROM {} WHERE {} RETURNING *",
            quote_ident(table),
            where_sql
        );
        Ok(SqlStatement::new(sql, params.into_values()))
    }

    /// Marks rows deleted. Already-deleted rows are left untouched, so a
    /// repeated call affects zero rows.
    pub fn soft_delete(&self, table: &str, filter: Option<&Value>) -> AdminResult<SqlStatement> {
        let policy = self.whitelist.validate_table(table)?;
        if !policy.soft_delete {
            return Err(AdminError::validation(format!(
                "Table '{}' does not support soft delete",
                table
            )));
        }
        let mut clause = WhereClause::parse(policy, filter)?;
        if clause.is_empty() {
            return Err(AdminError::empty_where("soft DELETE"));
        }
        clause.push(Condition::IsNull {
            column: SOFT_DELETE_COLUMN.to_string(),
            negated: false,
        });

        let mut sets = vec![format!(
            "{} = CURRENT_TIMESTAMP",
            quote_ident(SOFT_DELETE_COLUMN)
        )];
        if policy.has_column(UPDATED_AT_COLUMN) {
            sets.push(format!("{} = CURRENT_TIMESTAMP", quote_ident(UPDATED_AT_COLUMN)));
        }

        let mut params = Params::new();
        let where_sql = clause.compile(&mut params, self.column_types).unwrap_or_default();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} RETURNING *",
            quote_ident(table),
            sets.join(", "),
            where_sql
        );
        Ok(SqlStatement::new(sql, params.into_values()))
    }

    fn pagination(&self, limit: Option<i64>, offset: Option<i64>) -> AdminResult<(i64, i64)> {
        let max = self.limits.max_limit as i64;
        let limit = match limit {
            None => self.limits.default_limit.min(self.limits.max_limit) as i64,
            Some(l) if l < 1 || l > max => {
                return Err(AdminError::validation(format!(
                    "limit must be between 1 and {}",
                    max
                )))
            }
            Some(l) => l,
        };
        let offset = match offset {
            None => 0,
            Some(o) if o < 0 => {
                return Err(AdminError::validation("offset must not be negative"))
            }
            Some(o) => o,
        };
        Ok((limit, offset))
    }
}

/// Filter for reads: soft-deleted rows hidden unless asked for or filtered on explicitly.
fn read_clause(policy: &TablePolicy, query: &SelectQuery) -> AdminResult<WhereClause> {
    let mut clause = WhereClause::parse(policy, query.filter.as_ref())?;
    if policy.soft_delete && !query.include_deleted && !clause.references(SOFT_DELETE_COLUMN) {
        clause.push(Condition::IsNull {
            column: SOFT_DELETE_COLUMN.to_string(),
            negated: false,
        });
    }
    Ok(clause)
}

/// Accepts `"col"`, `"col DESC"`, `{column, direction}`, or an array of those.
pub fn parse_order_by(policy: &TablePolicy, order_by: Option<&Value>) -> AdminResult<Vec<OrderTerm>> {
    let mut terms = Vec::new();
    match order_by {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                terms.push(order_term(policy, item)?);
            }
        }
        Some(item) => terms.push(order_term(policy, item)?),
    }
    Ok(terms)
}

fn order_term(policy: &TablePolicy, item: &Value) -> AdminResult<OrderTerm> {
    let (column, direction) = match item {
        Value::String(text) => {
            let mut parts = text.split_whitespace();
            let column = parts.next().unwrap_or_default();
            let direction = parts.next();
            if parts.next().is_some() {
                return Err(AdminError::validation(format!("Invalid orderBy '{}'", text)));
            }
            (column.to_string(), direction.map(str::to_string))
        }
        Value::Object(map) => {
            let column = map
                .get("column")
                .and_then(Value::as_str)
                .ok_or_else(|| AdminError::validation("orderBy object needs a column"))?;
            let direction = map
                .get("direction")
                .and_then(Value::as_str)
                .map(str::to_string);
            (column.to_string(), direction)
        }
        _ => return Err(AdminError::validation("orderBy must be a string or object")),
    };

    if !policy.has_column(&column) {
        return Err(AdminError::invalid_column(&policy.name, column));
    }
    let direction = match direction.as_deref().map(str::to_ascii_uppercase).as_deref() {
        None | Some("ASC") => SortDirection::Asc,
        Some("DESC") => SortDirection::Desc,
        Some(other) => {
            return Err(AdminError::validation(format!(
                "Invalid sort direction '{}'",
                other
            )))
        }
    };
    Ok(OrderTerm { column, direction })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;
    use tablegate_core::ErrorCode;

    fn assert_parses(sql: &str) {
        Parser::parse_sql(&PostgreSqlDialect {}, sql)
            .unwrap_or_else(|e| panic!("generated SQL does not parse: {}\n{}", e, sql));
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    #[test]
    fn books_range_and_genre_query_binds_three_filter_params() {
        let whitelist = Whitelist::builtin();
        let builder = QueryBuilder::new(&whitelist);
        let query: SelectQuery = serde_json::from_value(json!({
            "table": "books",
            "where": {
                "word_count": { "$gte": 80000, "$lte": 120000 },
                "genre": { "$in": ["fantasy", "epic fantasy"] }
            },
            "limit": 50
        }))
        .unwrap();

        let stmt = builder.select(&query).unwrap();
        let where_part = stmt
            .text
            .split(" WHERE ")
            .nth(1)
            .and_then(|rest| rest.split(" LIMIT ").next())
            .unwrap();
        assert_eq!(where_part.matches('$').count(), 3);
        assert!(where_part.contains("\"deleted_at\" IS NULL"));
        assert!(stmt.text.ends_with("LIMIT $4"));
        assert_eq!(stmt.values.len(), 4);
        assert!(stmt.values.contains(&json!(80000)));
        assert!(stmt.values.contains(&json!(120000)));
        assert!(stmt.values.contains(&json!(["fantasy", "epic fantasy"])));
        assert_eq!(stmt.values[3], json!(50));
        assert_parses(&stmt.text);
    }

    #[test]
    fn select_defaults_to_star_and_default_limit() {
        let whitelist = Whitelist::builtin();
        let stmt = QueryBuilder::new(&whitelist)
            .select(&SelectQuery {
                include_deleted: true,
                ..SelectQuery::table("series")
            })
            .unwrap();
        assert_eq!(stmt.text, "SELECT * FROM \"series\" LIMIT $1");
        assert_eq!(stmt.values, vec![json!(100)]);
    }

    #[test]
    fn select_with_columns_order_and_offset() {
        let whitelist = Whitelist::builtin();
        let query = SelectQuery {
            columns: Some(vec!["id".into(), "title".into()]),
            ..SelectQuery::table("chapters")
        }
        .with_order(json!(["chapter_number", { "column": "title", "direction": "desc" }]))
        .paged(10, 20);

        let stmt = QueryBuilder::new(&whitelist).select(&query).unwrap();
        assert_eq!(
            stmt.text,
            "SELECT \"id\", \"title\" FROM \"chapters\" WHERE \"deleted_at\" IS NULL \
             ORDER BY \"chapter_number\" ASC, \"title\" DESC LIMIT $1 OFFSET $2"
        );
        assert_eq!(stmt.values, vec![json!(10), json!(20)]);
        assert_parses(&stmt.text);
    }

    #[test]
    fn pagination_bounds_are_enforced() {
        let whitelist = Whitelist::builtin();
        let builder = QueryBuilder::new(&whitelist);
        for (limit, offset) in [(0, 0), (1001, 0), (-5, 0), (10, -1)] {
            let err = builder
                .select(&SelectQuery::table("books").paged(limit, offset))
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::ValidationError);
        }
    }

    #[test]
    fn order_by_rejects_unknown_column_and_direction() {
        let whitelist = Whitelist::builtin();
        let builder = QueryBuilder::new(&whitelist);
        let err = builder
            .select(&SelectQuery::table("books").with_order(json!("password")))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidColumn);
        let err = builder
            .select(&SelectQuery::table("books").with_order(json!("title SIDEWAYS")))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn count_uses_the_same_filter() {
        let whitelist = Whitelist::builtin();
        let stmt = QueryBuilder::new(&whitelist)
            .count(&SelectQuery::table("books").with_filter(json!({ "status": "draft" })))
            .unwrap();
        assert_eq!(
            stmt.text,
            "SELECT COUNT(*) AS \"count\" FROM \"books\" WHERE \"status\" = $1 AND \"deleted_at\" IS NULL"
        );
        assert_parses(&stmt.text);
    }

    #[test]
    fn insert_returns_row_and_supports_conflict_policies() {
        let whitelist = Whitelist::builtin();
        let builder = QueryBuilder::new(&whitelist);
        let data = record(json!({ "id": 7, "title": "Dust" }));

        let plain = builder.insert("books", &data, OnConflict::Error).unwrap();
        assert_eq!(
            plain.text,
            "INSERT INTO \"books\" (\"id\", \"title\") VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(plain.values, vec![json!(7), json!("Dust")]);

        let skip = builder.insert("books", &data, OnConflict::DoNothing).unwrap();
        assert!(skip.text.contains("ON CONFLICT DO NOTHING RETURNING *"));

        let upsert = builder.insert("books", &data, OnConflict::Upsert).unwrap();
        assert!(upsert
            .text
            .contains("ON CONFLICT (\"id\") DO UPDATE SET \"title\" = EXCLUDED.\"title\""));

        for stmt in [plain, skip, upsert] {
            assert_parses(&stmt.text);
        }
    }

    #[test]
    fn insert_rejects_unknown_columns() {
        let whitelist = Whitelist::builtin();
        let data = record(json!({ "title": "x", "is_admin": true }));
        let err = QueryBuilder::new(&whitelist)
            .insert("books", &data, OnConflict::Error)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidColumn);
    }

    #[test]
    fn update_places_set_params_before_where_and_touches_updated_at() {
        let whitelist = Whitelist::builtin();
        let data = record(json!({ "status": "published" }));
        let stmt = QueryBuilder::new(&whitelist)
            .update("books", &data, Some(&json!({ "id": 3 })))
            .unwrap();
        assert_eq!(
            stmt.text,
            "UPDATE \"books\" SET \"status\" = $1, \"updated_at\" = CURRENT_TIMESTAMP \
             WHERE \"id\" = $2 RETURNING *"
        );
        assert_eq!(stmt.values, vec![json!("published"), json!(3)]);
        assert_parses(&stmt.text);
    }

    #[test]
    fn update_and_delete_refuse_empty_where() {
        let whitelist = Whitelist::builtin();
        let builder = QueryBuilder::new(&whitelist);
        let data = record(json!({ "status": "x" }));

        for filter in [None, Some(json!({}))] {
            let err = builder.update("books", &data, filter.as_ref()).unwrap_err();
            assert_eq!(err.code(), ErrorCode::EmptyWhereClause);
            let err = builder.delete("books", filter.as_ref()).unwrap_err();
            assert_eq!(err.code(), ErrorCode::EmptyWhereClause);
            let err = builder.soft_delete("books", filter.as_ref()).unwrap_err();
            assert_eq!(err.code(), ErrorCode::EmptyWhereClause);
        }
    }

    #[test]
    fn soft_delete_only_touches_live_rows() {
        let whitelist = Whitelist::builtin();
        let stmt = QueryBuilder::new(&whitelist)
            .soft_delete("scenes", Some(&json!({ "chapter_id": 4 })))
            .unwrap();
        assert_eq!(
            stmt.text,
            "UPDATE \"scenes\" SET \"deleted_at\" = CURRENT_TIMESTAMP, \
             \"updated_at\" = CURRENT_TIMESTAMP WHERE \"chapter_id\" = $1 \
             AND \"deleted_at\" IS NULL RETURNING *"
        );
        assert_parses(&stmt.text);
    }

    #[test]
    fn soft_delete_requires_deleted_at() {
        let whitelist = Whitelist::builtin();
        let err = QueryBuilder::new(&whitelist)
            .soft_delete("audit_logs", Some(&json!({ "id": 1 })))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn hard_delete_parses() {
        let whitelist = Whitelist::builtin();
        let stmt = QueryBuilder::new(&whitelist)
            .delete("locations", Some(&json!({ "id": { "$in": [1, 2, 3] } })))
            .unwrap();
        assert_eq!(
            stmt.text,
            "DELETE FROM \"locations\" WHERE \"id\" = ANY($1) RETURNING *"
        );
        assert_parses(&stmt.text);
    }

    proptest! {
        #[test]
        fn user_values_never_reach_sql_text(payload in "[a-zA-Z0-9 ';\\-\"()]{1,24}") {
            let marker = format!("zz{}qq", payload);
            let whitelist = Whitelist::builtin();
            let builder = QueryBuilder::new(&whitelist);

            let data = record(json!({ "title": marker.clone(), "synopsis": marker.clone() }));
            let filter = json!({ "title": { "$like": marker.clone() }, "status": [marker.clone()] });

            let stmts = [
                builder.insert("books", &data, OnConflict::Upsert).unwrap(),
                builder.update("books", &data, Some(&filter)).unwrap(),
                builder.soft_delete("books", Some(&filter)).unwrap(),
                builder.select(&SelectQuery::table("books").with_filter(filter.clone())).unwrap(),
            ];
            for stmt in stmts {
                prop_assert!(!stmt.text.contains(&marker));
                let placeholders = (1..=stmt.values.len())
                    .filter(|n| stmt.text.contains(&format!("${}", n)))
                    .count();
                prop_assert_eq!(placeholders, stmt.values.len());
            }
        }

        #[test]
        fn operator_keys_outside_the_set_are_rejected(key in "\\$[a-z]{2,8}") {
            prop_assume!(tablegate_core::Operator::from_key(&key).is_none());
            let whitelist = Whitelist::builtin();
            let filter = json!({ "title": { key.clone(): "x" } });
            let err = QueryBuilder::new(&whitelist)
                .select(&SelectQuery::table("books").with_filter(filter))
                .unwrap_err();
            prop_assert_eq!(err.code(), ErrorCode::InvalidOperator);
        }
    }
}

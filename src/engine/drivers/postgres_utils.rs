// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL driver helpers: JSON parameter binding and row decoding

use base64::Engine as _;
use bigdecimal::BigDecimal;
use bigdecimal::ToPrimitive as BigDecimalToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use sqlx::postgres::{PgArguments, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{Column, Row, ValueRef};
use tablegate_core::Record;
use uuid::Uuid;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Binds a JSON parameter. Scalars map to their natural PostgreSQL type;
/// homogeneous scalar arrays become PostgreSQL arrays; anything else is
/// sent as `jsonb`.
pub(crate) fn bind_param<'q>(query: PgQuery<'q>, value: &'q Value) -> PgQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.as_str()),
        Value::Array(items) => bind_array(query, value, items),
        Value::Object(_) => query.bind(sqlx::types::Json(value)),
    }
}

fn bind_array<'q>(query: PgQuery<'q>, whole: &'q Value, items: &'q [Value]) -> PgQuery<'q> {
    if items.iter().all(Value::is_string) {
        let strings: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
        return query.bind(strings);
    }
    if items.iter().all(|v| v.as_i64().is_some()) {
        let ints: Vec<i64> = items.iter().filter_map(Value::as_i64).collect();
        return query.bind(ints);
    }
    if items.iter().all(Value::is_number) {
        let floats: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
        return query.bind(floats);
    }
    if items.iter().all(Value::is_boolean) {
        let bools: Vec<bool> = items.iter().filter_map(Value::as_bool).collect();
        return query.bind(bools);
    }
    query.bind(sqlx::types::Json(whole))
}

/// Converts a row into a column-ordered JSON record
pub(crate) fn row_to_record(row: &PgRow) -> Record {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), extract_value(row, col.ordinal())))
        .collect()
}

fn float(f: f64) -> Value {
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(f.to_string()))
}

/// Decodes one column by trying the common types in turn; unknown types
/// (enums, domains) fall back to their UTF-8 wire text.
pub(crate) fn extract_value(row: &PgRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| float(f as f64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(idx) {
        return v
            .map(|d| match d.to_f64() {
                Some(f) if f.is_finite() => float(f),
                _ => Value::String(d.to_string()),
            })
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
        return v
            .map(|d| {
                use rust_decimal::prelude::ToPrimitive;
                match d.to_f64() {
                    Some(f) if f.is_finite() => float(f),
                    _ => Value::String(d.to_string()),
                }
            })
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Uuid>, _>(idx) {
        return v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v
            .map(|bytes| Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<i64>>, _>(idx) {
        return v
            .map(|vals| Value::Array(vals.into_iter().map(Value::from).collect()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<i32>>, _>(idx) {
        return v
            .map(|vals| Value::Array(vals.into_iter().map(Value::from).collect()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<f64>>, _>(idx) {
        return v
            .map(|vals| Value::Array(vals.into_iter().map(float).collect()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<bool>>, _>(idx) {
        return v
            .map(|vals| Value::Array(vals.into_iter().map(Value::Bool).collect()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<Option<String>>>, _>(idx) {
        return v
            .map(|vals| {
                Value::Array(
                    vals.into_iter()
                        .map(|item| item.map(Value::String).unwrap_or(Value::Null))
                        .collect(),
                )
            })
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<Uuid>>, _>(idx) {
        return v
            .map(|vals| {
                Value::Array(
                    vals.into_iter()
                        .map(|u| Value::String(u.to_string()))
                        .collect(),
                )
            })
            .unwrap_or(Value::Null);
    }

    raw_text(row, idx)
}

fn raw_text(row: &PgRow, idx: usize) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => Value::Null,
        Ok(raw) => raw
            .as_bytes()
            .ok()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
        Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_floats_become_strings() {
        assert_eq!(float(1.5), serde_json::json!(1.5));
        assert_eq!(float(f64::NAN), Value::String("NaN".into()));
        assert_eq!(float(f64::INFINITY), Value::String("inf".into()));
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Identifier quoting and placeholder bookkeeping

use std::collections::HashMap;

use serde_json::Value;

/// Column name to catalog type name (`udt_name`), e.g. `timestamptz`, `_int4`.
pub type ColumnTypes = HashMap<String, String>;

const TEXT_TYPES: &[&str] = &["text", "varchar", "bpchar", "name", "citext"];

/// Quotes a PostgreSQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Ordered positional parameters for one statement
#[derive(Debug, Default)]
pub struct Params {
    values: Vec<Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value and returns its `$n` placeholder.
    pub fn push(&mut self, value: Value) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

fn is_text_type(udt: &str) -> bool {
    TEXT_TYPES.contains(&udt)
}

fn is_json_type(udt: &str) -> bool {
    udt == "json" || udt == "jsonb"
}

/// Binds a value destined for a column. Values that travel as text (strings,
/// NULL, JSON documents) are cast to the column type when it is known.
pub fn bind_for_column(params: &mut Params, udt: Option<&str>, value: &Value) -> String {
    let udt = match udt {
        Some(udt) if !is_text_type(udt) => udt,
        _ => return params.push(value.clone()),
    };
    match value {
        Value::Null | Value::String(_) => {
            format!("{}::{}", params.push(value.clone()), quote_ident(udt))
        }
        Value::Object(_) | Value::Array(_) if is_json_type(udt) => format!(
            "{}::{}",
            params.push(Value::String(value.to_string())),
            quote_ident(udt)
        ),
        Value::Array(items)
            if udt.starts_with('_')
                && !is_text_type(&udt[1..])
                && items.iter().any(Value::is_string) =>
        {
            format!("{}::{}", params.push(value.clone()), quote_ident(udt))
        }
        _ => params.push(value.clone()),
    }
}

/// Binds the array operand of `= ANY(...)` for a scalar column.
pub fn bind_set_for_column(params: &mut Params, udt: Option<&str>, items: &[Value]) -> String {
    let placeholder = params.push(Value::Array(items.to_vec()));
    match udt {
        Some(udt) if !is_text_type(udt) && items.iter().any(Value::is_string) => {
            format!("{}::{}[]", placeholder, quote_ident(udt))
        }
        _ => placeholder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("books"), "\"books\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn placeholders_are_numbered_from_one() {
        let mut params = Params::new();
        assert_eq!(params.push(Value::from(1)), "$1");
        assert_eq!(params.push(Value::from("x")), "$2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn text_values_are_cast_to_known_column_types() {
        let mut params = Params::new();
        assert_eq!(
            bind_for_column(&mut params, Some("timestamptz"), &json!("2024-01-01T00:00:00Z")),
            "$1::\"timestamptz\""
        );
        assert_eq!(bind_for_column(&mut params, Some("int4"), &Value::Null), "$2::\"int4\"");
        assert_eq!(bind_for_column(&mut params, Some("varchar"), &json!("x")), "$3");
        assert_eq!(bind_for_column(&mut params, Some("int8"), &json!(5)), "$4");
        assert_eq!(bind_for_column(&mut params, None, &json!("x")), "$5");
    }

    #[test]
    fn json_documents_travel_as_text() {
        let mut params = Params::new();
        let placeholder = bind_for_column(&mut params, Some("jsonb"), &json!(["brave", "loyal"]));
        assert_eq!(placeholder, "$1::\"jsonb\"");
        assert_eq!(params.into_values(), vec![json!("[\"brave\",\"loyal\"]")]);
    }

    #[test]
    fn string_sets_are_cast_to_element_arrays() {
        let mut params = Params::new();
        assert_eq!(
            bind_set_for_column(&mut params, Some("uuid"), &[json!("a"), json!("b")]),
            "$1::\"uuid\"[]"
        );
        assert_eq!(bind_set_for_column(&mut params, Some("int4"), &[json!(1)]), "$2");
    }
}

// SPDX-License-Identifier: Apache-2.0

//! WHERE condition grammar
//!
//! A condition object maps a column to one of:
//! - a scalar literal (equality),
//! - an array (`= ANY($n)` with one array parameter),
//! - `null` (`IS NULL`),
//! - an object of `$`-operator keys, each producing one clause.
//!
//! Clauses are joined with AND; there is no OR and no nesting. Parsing
//! validates every column and operator before any parameter is built.

use serde_json::Value;
use tablegate_core::{AdminError, AdminResult, Operator, TablePolicy};

use crate::ident::{bind_for_column, bind_set_for_column, quote_ident, ColumnTypes, Params};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals {
        column: String,
        value: Value,
    },
    Compare {
        column: String,
        op: Operator,
        value: Value,
    },
    InSet {
        column: String,
        values: Vec<Value>,
    },
    IsNull {
        column: String,
        negated: bool,
    },
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Equals { column, .. }
            | Condition::Compare { column, .. }
            | Condition::InSet { column, .. }
            | Condition::IsNull { column, .. } => column,
        }
    }

    fn compile(&self, params: &mut Params, types: Option<&ColumnTypes>) -> String {
        let udt = types.and_then(|t| t.get(self.column())).map(String::as_str);
        match self {
            Condition::Equals { column, value } => format!(
                "{} = {}",
                quote_ident(column),
                bind_for_column(params, udt, value)
            ),
            Condition::Compare {
                column,
                op: op @ (Operator::Like | Operator::ILike),
                value,
            } => format!(
                "{} {} {}",
                quote_ident(column),
                op.sql(),
                params.push(value.clone())
            ),
            Condition::Compare { column, op, value } => format!(
                "{} {} {}",
                quote_ident(column),
                op.sql(),
                bind_for_column(params, udt, value)
            ),
            Condition::InSet { values, .. } if values.is_empty() => "FALSE".to_string(),
            Condition::InSet { column, values } => format!(
                "{} = ANY({})",
                quote_ident(column),
                bind_set_for_column(params, udt, values)
            ),
            Condition::IsNull { column, negated } => {
                if *negated {
                    format!("{} IS NOT NULL", quote_ident(column))
                } else {
                    format!("{} IS NULL", quote_ident(column))
                }
            }
        }
    }
}

/// Conjunction of conditions for one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    conditions: Vec<Condition>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON condition object against a table policy.
    /// `None` and `null` produce an empty clause.
    pub fn parse(policy: &TablePolicy, filter: Option<&Value>) -> AdminResult<Self> {
        let map = match filter {
            None | Some(Value::Null) => return Ok(Self::new()),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(AdminError::validation(
                    "where must be an object of column conditions",
                ))
            }
        };

        let mut clause = Self::new();
        for (column, spec) in map {
            if !policy.has_column(column) {
                return Err(AdminError::invalid_column(&policy.name, column));
            }
            parse_column(&mut clause, column, spec)?;
        }
        Ok(clause)
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn references(&self, column: &str) -> bool {
        self.conditions.iter().any(|c| c.column() == column)
    }

    /// Renders `a = $1 AND b IS NULL`, or `None` when empty. Known column
    /// types add casts to text-encoded parameters.
    pub fn compile(&self, params: &mut Params, types: Option<&ColumnTypes>) -> Option<String> {
        if self.conditions.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| c.compile(params, types))
            .collect();
        Some(parts.join(" AND "))
    }
}

fn parse_column(clause: &mut WhereClause, column: &str, spec: &Value) -> AdminResult<()> {
    match spec {
        Value::Null => clause.push(Condition::IsNull {
            column: column.to_string(),
            negated: false,
        }),
        Value::Array(items) => clause.push(in_set(column, items)?),
        Value::Object(ops) => {
            if ops.is_empty() {
                return Err(AdminError::validation(format!(
                    "Condition on '{}' has no operators",
                    column
                )));
            }
            for (key, operand) in ops {
                let op = Operator::from_key(key)
                    .ok_or_else(|| AdminError::invalid_operator(column, key))?;
                clause.push(operator_condition(column, op, operand)?);
            }
        }
        scalar => clause.push(Condition::Equals {
            column: column.to_string(),
            value: scalar.clone(),
        }),
    }
    Ok(())
}

fn operator_condition(column: &str, op: Operator, operand: &Value) -> AdminResult<Condition> {
    let column_name = column.to_string();
    match op {
        Operator::Null => match operand {
            Value::Bool(is_null) => Ok(Condition::IsNull {
                column: column_name,
                negated: !is_null,
            }),
            _ => Err(AdminError::validation(format!(
                "$null on '{}' expects true or false",
                column
            ))),
        },
        Operator::In => match operand {
            Value::Array(items) => in_set(column, items),
            _ => Err(AdminError::validation(format!(
                "$in on '{}' expects an array",
                column
            ))),
        },
        Operator::Eq | Operator::Ne if operand.is_null() => Ok(Condition::IsNull {
            column: column_name,
            negated: op == Operator::Ne,
        }),
        Operator::Eq => {
            ensure_scalar(column, op, operand)?;
            Ok(Condition::Equals {
                column: column_name,
                value: operand.clone(),
            })
        }
        Operator::Like | Operator::ILike => match operand {
            Value::String(_) => Ok(Condition::Compare {
                column: column_name,
                op,
                value: operand.clone(),
            }),
            _ => Err(AdminError::validation(format!(
                "{} on '{}' expects a string pattern",
                op, column
            ))),
        },
        _ => {
            ensure_scalar(column, op, operand)?;
            Ok(Condition::Compare {
                column: column_name,
                op,
                value: operand.clone(),
            })
        }
    }
}

fn in_set(column: &str, items: &[Value]) -> AdminResult<Condition> {
    if items.iter().any(|v| v.is_array() || v.is_object()) {
        return Err(AdminError::validation(format!(
            "Array condition on '{}' must contain scalar values",
            column
        )));
    }
    Ok(Condition::InSet {
        column: column.to_string(),
        values: items.to_vec(),
    })
}

fn ensure_scalar(column: &str, op: Operator, operand: &Value) -> AdminResult<()> {
    match operand {
        Value::Array(_) | Value::Object(_) | Value::Null => Err(AdminError::validation(format!(
            "{} on '{}' expects a scalar value",
            op, column
        ))),
        _ => Ok(()),
    }
}

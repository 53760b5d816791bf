// SPDX-License-Identifier: Apache-2.0

//! Closed set of comparison operators accepted in WHERE conditions

use std::fmt;

/// Comparison operators addressable through `$`-prefixed JSON keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    In,
    Null,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Like,
        Operator::ILike,
        Operator::In,
        Operator::Null,
    ];

    /// Resolves a JSON key such as `$gte`. Anything outside the set is `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "$eq" => Some(Operator::Eq),
            "$ne" => Some(Operator::Ne),
            "$gt" => Some(Operator::Gt),
            "$gte" => Some(Operator::Gte),
            "$lt" => Some(Operator::Lt),
            "$lte" => Some(Operator::Lte),
            "$like" => Some(Operator::Like),
            "$ilike" => Some(Operator::ILike),
            "$in" => Some(Operator::In),
            "$null" => Some(Operator::Null),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Like => "$like",
            Operator::ILike => "$ilike",
            Operator::In => "$in",
            Operator::Null => "$null",
        }
    }

    /// SQL token for binary operators. `$in` and `$null` have dedicated forms.
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
            Operator::In => "= ANY",
            Operator::Null => "IS NULL",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_resolve_both_ways() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_key(op.key()), Some(op));
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert_eq!(Operator::from_key("$or"), None);
        assert_eq!(Operator::from_key("$regex"), None);
        assert_eq!(Operator::from_key("gte"), None);
        assert_eq!(Operator::from_key("$GTE"), None);
    }
}

//! Filter DSL translation.
//!
//! Filter terms are kept as `(key, value, operator)` triples until a terminal
//! operation needs them, then translated into the clause list placed under
//! `bool.filter`. Terms combine conjunctively.

use serde_json::{json, Value};
use std::fmt;

/// Comparison operator of a [`FilterTerm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    /// Exact match (`term`).
    #[default]
    Eq,
    /// Prefix match (`prefix`).
    Like,
    /// Any of a set of values (`terms`).
    In,
    /// Inclusive range between two bounds.
    Between,
    /// Not equal (`must_not` + `term`).
    Neq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Field present (value `true`) or absent (value `false`).
    Exists,
}

impl Operator {
    /// Key suffixes recognized by [`parse_key`], longest first so `__gte`
    /// wins over `__gt`.
    const SUFFIXES: &'static [(&'static str, Operator)] = &[
        ("__contains", Operator::Like),
        ("__between", Operator::Between),
        ("__exists", Operator::Exists),
        ("__gte", Operator::Gte),
        ("__lte", Operator::Lte),
        ("__in", Operator::In),
        ("__ne", Operator::Neq),
        ("__gt", Operator::Gt),
        ("__lt", Operator::Lt),
    ];

    /// Returns the operator's display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "EQ",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::Between => "BETWEEN",
            Operator::Neq => "NEQ",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::Exists => "EXISTS",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm {
    /// Field name as stored.
    pub key: String,
    /// Operand. `null` terms are skipped during translation.
    pub value: Value,
    /// Comparison operator.
    pub op: Operator,
}

impl FilterTerm {
    /// Creates a term with an explicit operator.
    pub fn new(key: impl Into<String>, value: impl Into<Value>, op: Operator) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            op,
        }
    }

    /// Creates an equality term.
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, value, Operator::Eq)
    }

    /// Creates a term from a suffixed key such as `name__contains`.
    ///
    /// The field part is normalized with [`first_lower`].
    pub fn parse(key: &str, value: impl Into<Value>) -> Self {
        let (field, op) = parse_key(key);
        Self::new(first_lower(field), value, op)
    }

    fn to_clause(&self) -> Option<Value> {
        if self.value.is_null() {
            return None;
        }
        let key = self.key.as_str();
        let clause = match self.op {
            Operator::Eq => json!({ "term": { key: self.value } }),
            Operator::Like => json!({ "prefix": { key: self.value } }),
            Operator::In => json!({ "terms": { key: split_values(&self.value) } }),
            Operator::Gt => range(key, "gt", &self.value),
            Operator::Gte => range(key, "gte", &self.value),
            Operator::Lt => range(key, "lt", &self.value),
            Operator::Lte => range(key, "lte", &self.value),
            Operator::Between => {
                let bounds = split_values(&self.value);
                if bounds.len() < 2 {
                    return None;
                }
                json!({ "range": { key: { "gte": bounds[0], "lte": bounds[1] } } })
            }
            Operator::Neq => json!({
                "bool": { "must_not": [ { "term": { key: self.value } } ] }
            }),
            Operator::Exists => {
                let exists = json!({ "exists": { "field": key } });
                if self.value.as_bool() == Some(false) {
                    json!({ "bool": { "must_not": [exists] } })
                } else {
                    exists
                }
            }
        };
        Some(clause)
    }
}

fn range(key: &str, bound: &str, value: &Value) -> Value {
    json!({ "range": { key: { bound: value } } })
}

/// Arrays are used as-is; anything else is rendered and split on `,`.
fn split_values(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(values) => values.clone(),
        Value::String(s) => s.split(',').map(|part| Value::from(part)).collect(),
        other => other
            .to_string()
            .split(',')
            .map(|part| Value::from(part))
            .collect(),
    }
}

/// Splits an operator suffix off a filter key.
///
/// ```
/// use esorm_gateway::{parse_key, Operator};
///
/// assert_eq!(parse_key("Name__contains"), ("Name", Operator::Like));
/// assert_eq!(parse_key("state"), ("state", Operator::Eq));
/// ```
pub fn parse_key(key: &str) -> (&str, Operator) {
    Operator::SUFFIXES
        .iter()
        .find_map(|(suffix, op)| key.strip_suffix(suffix).map(|field| (field, *op)))
        .unwrap_or((key, Operator::Eq))
}

/// Lowercases the first character of a field name (`CreateTime` → `createTime`).
pub fn first_lower(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Translates filter terms into `bool.filter` clauses.
pub fn build_filter(terms: &[FilterTerm]) -> Vec<Value> {
    terms.iter().filter_map(FilterTerm::to_clause).collect()
}

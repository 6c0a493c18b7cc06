//! Query parameters, named-query registry, and placeholder binding.
//!
//! Queries are parameterized either positionally (`$1..$n`, bound in order)
//! or by name (`:name` placeholders). The SQL layer only understands
//! positional parameters, so named arguments are lowered to positional form
//! before execution. Binding failures are fatal and never retried.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::r#trait::RepositoryError;

/// A bindable query parameter value.
///
/// Closed set of primitives the SQL layer knows how to bind; anything
/// richer goes through [`ParamValue::Json`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// SQL NULL. Binds as a text-typed NULL; cast the placeholder in the
    /// query (`:arg::uuid`) when the column type matters.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for ParamValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<JsonValue> for ParamValue {
    fn from(value: JsonValue) -> Self {
        Self::Json(value)
    }
}

impl<V> From<Option<V>> for ParamValue
where
    V: Into<ParamValue>,
{
    fn from(value: Option<V>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Arguments for a parameterized query.
#[derive(Debug, Clone)]
pub enum QueryArgs {
    /// Bound to `$1..$n` in order.
    Positional(Vec<ParamValue>),
    /// Bound to `:name` placeholders.
    Named(Vec<(String, ParamValue)>),
}

impl QueryArgs {
    /// No arguments.
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    pub fn positional<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ParamValue>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<ParamValue>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }

    /// Lower the arguments against `sql` into positional form.
    pub(crate) fn lower(self, sql: &str) -> Result<(String, Vec<ParamValue>), RepositoryError> {
        match self {
            Self::Positional(values) => Ok((sql.to_string(), values)),
            Self::Named(pairs) => expand_named(sql, pairs),
        }
    }
}

/// Rewrite `:name` placeholders in `sql` to `$n` and order the argument
/// values accordingly.
///
/// Skips string literals and `::` casts. Repeated placeholders share one
/// position. A placeholder with no argument, an argument matching no
/// placeholder, and a duplicated argument name are all binding errors.
fn expand_named(
    sql: &str,
    args: Vec<(String, ParamValue)>,
) -> Result<(String, Vec<ParamValue>), RepositoryError> {
    let mut values: HashMap<String, ParamValue> = HashMap::with_capacity(args.len());
    for (name, value) in args {
        if values.insert(name.clone(), value).is_some() {
            return Err(RepositoryError::Binding(format!(
                "duplicate argument :{name}"
            )));
        }
    }

    let mut out = String::with_capacity(sql.len());
    let mut order: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut in_literal = false;

    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if in_literal {
            out.push(c);
            if c == '\'' {
                in_literal = false;
            }
            continue;
        }

        match c {
            '\'' => {
                in_literal = true;
                out.push(c);
            }
            ':' => match chars.peek().copied() {
                // `::` is a cast, not a placeholder.
                Some(':') => {
                    out.push_str("::");
                    chars.next();
                }
                Some(d) if d.is_ascii_alphabetic() || d == '_' => {
                    let mut name = String::new();
                    while let Some(d) = chars.peek().copied() {
                        if d.is_ascii_alphanumeric() || d == '_' {
                            name.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }

                    if !values.contains_key(&name) {
                        return Err(RepositoryError::Binding(format!(
                            "no argument for placeholder :{name}"
                        )));
                    }
                    let position = *positions.entry(name.clone()).or_insert_with(|| {
                        order.push(name.clone());
                        order.len()
                    });
                    out.push('$');
                    out.push_str(&position.to_string());
                }
                _ => out.push(':'),
            },
            _ => out.push(c),
        }
    }

    for name in values.keys() {
        if !positions.contains_key(name) {
            return Err(RepositoryError::Binding(format!(
                "argument :{name} matches no placeholder"
            )));
        }
    }

    let ordered = order
        .into_iter()
        .map(|name| values[&name].clone())
        .collect();
    Ok((out, ordered))
}

/// Immutable registry of named queries (name → SQL text).
///
/// Built once at startup and shared (`Arc`) across repositories. This is
/// the "precompiled, named parameterized query definition executed by name"
/// — the text is fixed at registration, only the arguments vary per call.
#[derive(Debug, Clone, Default)]
pub struct NamedQueries {
    queries: HashMap<String, String>,
}

impl NamedQueries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sql` under `name`. Last definition wins.
    pub fn define(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.queries.insert(name.into(), sql.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.queries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub(crate) fn resolve(&self, name: &str) -> Result<&str, RepositoryError> {
        self.get(name)
            .ok_or_else(|| RepositoryError::Binding(format!("unknown named query '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_args_pass_through_untouched() {
        let args = QueryArgs::positional([ParamValue::from(1), ParamValue::from("x")]);
        let (sql, values) = args.lower("SELECT * FROM cars WHERE a = $1 AND b = $2").unwrap();

        assert_eq!(sql, "SELECT * FROM cars WHERE a = $1 AND b = $2");
        assert_eq!(values, vec![ParamValue::Int(1), ParamValue::Text("x".into())]);
    }

    #[test]
    fn named_placeholders_lower_to_positions_in_placeholder_order() {
        let args = QueryArgs::named([("name", ParamValue::from("volvo")), ("year", 1999.into())]);
        let (sql, values) = args
            .lower("SELECT * FROM cars WHERE year > :year AND name = :name")
            .unwrap();

        assert_eq!(sql, "SELECT * FROM cars WHERE year > $1 AND name = $2");
        assert_eq!(
            values,
            vec![ParamValue::Int(1999), ParamValue::Text("volvo".into())]
        );
    }

    #[test]
    fn repeated_placeholder_shares_one_position() {
        let args = QueryArgs::named([("name", ParamValue::from("volvo"))]);
        let (sql, values) = args
            .lower("SELECT * FROM cars WHERE name = :name OR alias = :name")
            .unwrap();

        assert_eq!(sql, "SELECT * FROM cars WHERE name = $1 OR alias = $1");
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn casts_are_not_placeholders() {
        let args = QueryArgs::named([("id", ParamValue::from("7"))]);
        let (sql, _) = args
            .lower("SELECT * FROM cars WHERE id = :id::uuid")
            .unwrap();

        assert_eq!(sql, "SELECT * FROM cars WHERE id = $1::uuid");
    }

    #[test]
    fn string_literals_are_left_alone() {
        let args = QueryArgs::named([("name", ParamValue::from("volvo"))]);
        let (sql, _) = args
            .lower("SELECT * FROM cars WHERE tag = ':notaparam' AND name = :name")
            .unwrap();

        assert_eq!(sql, "SELECT * FROM cars WHERE tag = ':notaparam' AND name = $1");
    }

    #[test]
    fn placeholder_without_argument_is_a_binding_error() {
        let args = QueryArgs::named([("name", ParamValue::from("volvo"))]);
        let err = args
            .lower("SELECT * FROM cars WHERE name = :name AND year = :year")
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Binding(_)));
        assert!(err.to_string().contains(":year"));
    }

    #[test]
    fn argument_without_placeholder_is_a_binding_error() {
        let args = QueryArgs::named([("name", ParamValue::from("volvo")), ("year", 1999.into())]);
        let err = args.lower("SELECT * FROM cars WHERE name = :name").unwrap_err();

        assert!(matches!(err, RepositoryError::Binding(_)));
        assert!(err.to_string().contains(":year"));
    }

    #[test]
    fn duplicate_argument_name_is_a_binding_error() {
        let args = QueryArgs::Named(vec![
            ("name".to_string(), ParamValue::from("a")),
            ("name".to_string(), ParamValue::from("b")),
        ]);
        let err = args.lower("SELECT * FROM cars WHERE name = :name").unwrap_err();

        assert!(matches!(err, RepositoryError::Binding(_)));
    }

    #[test]
    fn option_converts_to_null_or_value() {
        assert_eq!(ParamValue::from(None::<i64>), ParamValue::Null);
        assert_eq!(ParamValue::from(Some(3i64)), ParamValue::Int(3));
    }

    #[test]
    fn registry_resolves_defined_queries() {
        let queries = NamedQueries::new()
            .define("Car.findByName", "SELECT * FROM cars WHERE name = :name")
            .define("Car.findAll", "SELECT * FROM cars");

        assert_eq!(queries.len(), 2);
        assert_eq!(queries.get("Car.findAll"), Some("SELECT * FROM cars"));
        assert!(queries.resolve("Car.findAll").is_ok());

        let err = queries.resolve("Car.missing").unwrap_err();
        assert!(matches!(err, RepositoryError::Binding(_)));
        assert!(err.to_string().contains("Car.missing"));
    }
}

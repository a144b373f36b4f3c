//! Condition model.
//!
//! A [`Condition`] is a backend-agnostic filter tree. Leaves are [`Cond`]
//! maps from a field reference to a value or a [`Comparison`]; inner nodes
//! combine children with `AND` / `OR`.
//!
//! A field reference may carry an operator suffix separated by whitespace:
//!
//! ```rust,ignore
//! use unidb_core::{cond, Comparison, Condition};
//!
//! let adults = cond! { "age >=" => 18, "status" => "active" };
//! let named = cond! { "name" => Comparison::like("A%") };
//! let filter = Condition::or([adults.into(), named.into()]);
//! ```
//!
//! An empty condition is the neutral always-true predicate.

mod operator;

pub use operator::Operator;

use crate::error::CompileError;
use unidb_codec::WireValue;

/// An operator applied to an operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    op: Operator,
    operand: WireValue,
}

impl Comparison {
    /// Creates a comparison from an operator and operand.
    pub fn new(op: Operator, operand: impl Into<WireValue>) -> Self {
        Self {
            op,
            operand: operand.into(),
        }
    }

    /// Creates a comparison from an operator token such as `">="` or `"@>"`.
    pub fn op(token: &str, operand: impl Into<WireValue>) -> Self {
        Self::new(Operator::parse(token), operand)
    }

    /// Passes `token` through verbatim on SQL backends.
    pub fn custom(token: impl Into<String>, operand: impl Into<WireValue>) -> Self {
        Self::new(Operator::Custom(token.into()), operand)
    }

    /// Equal to.
    pub fn eq(value: impl Into<WireValue>) -> Self {
        Self::new(Operator::Equal, value)
    }

    /// Not equal to.
    pub fn ne(value: impl Into<WireValue>) -> Self {
        Self::new(Operator::NotEqual, value)
    }

    /// Less than.
    pub fn lt(value: impl Into<WireValue>) -> Self {
        Self::new(Operator::LessThan, value)
    }

    /// Greater than.
    pub fn gt(value: impl Into<WireValue>) -> Self {
        Self::new(Operator::GreaterThan, value)
    }

    /// Less than or equal to.
    pub fn lte(value: impl Into<WireValue>) -> Self {
        Self::new(Operator::LessThanOrEqual, value)
    }

    /// Greater than or equal to.
    pub fn gte(value: impl Into<WireValue>) -> Self {
        Self::new(Operator::GreaterThanOrEqual, value)
    }

    /// Alias of [`Comparison::lt`] for time values.
    pub fn before(value: impl Into<WireValue>) -> Self {
        Self::lt(value)
    }

    /// Alias of [`Comparison::gt`] for time values.
    pub fn after(value: impl Into<WireValue>) -> Self {
        Self::gt(value)
    }

    /// Alias of [`Comparison::lte`] for time values.
    pub fn on_or_before(value: impl Into<WireValue>) -> Self {
        Self::lte(value)
    }

    /// Alias of [`Comparison::gte`] for time values.
    pub fn on_or_after(value: impl Into<WireValue>) -> Self {
        Self::gte(value)
    }

    /// Within `[low, high]`, both ends included.
    pub fn between(low: impl Into<WireValue>, high: impl Into<WireValue>) -> Self {
        Self::new(Operator::Between, WireValue::Array(vec![low.into(), high.into()]))
    }

    /// Strictly outside `[low, high]`; the bounds themselves do not match.
    pub fn not_between(low: impl Into<WireValue>, high: impl Into<WireValue>) -> Self {
        Self::new(
            Operator::NotBetween,
            WireValue::Array(vec![low.into(), high.into()]),
        )
    }

    /// Equal to one of `values`.
    pub fn is_in<V: Into<WireValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::new(
            Operator::In,
            WireValue::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Equal to none of `values`.
    pub fn not_in<V: Into<WireValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::new(
            Operator::NotIn,
            WireValue::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// `IS value`.
    pub fn is(value: impl Into<WireValue>) -> Self {
        Self::new(Operator::Is, value)
    }

    /// `IS NOT value`.
    pub fn is_not(value: impl Into<WireValue>) -> Self {
        Self::new(Operator::IsNot, value)
    }

    /// `IS NULL`.
    pub fn is_null() -> Self {
        Self::is(WireValue::Null)
    }

    /// `IS NOT NULL`.
    pub fn is_not_null() -> Self {
        Self::is_not(WireValue::Null)
    }

    /// SQL `LIKE` pattern (`%` any run, `_` any single character).
    pub fn like(pattern: impl Into<String>) -> Self {
        Self::new(Operator::Like, WireValue::Text(pattern.into()))
    }

    /// Negated [`Comparison::like`].
    pub fn not_like(pattern: impl Into<String>) -> Self {
        Self::new(Operator::NotLike, WireValue::Text(pattern.into()))
    }

    /// Regular expression match.
    pub fn regexp(pattern: impl Into<String>) -> Self {
        Self::new(Operator::RegExp, WireValue::Text(pattern.into()))
    }

    /// Negated regular expression match.
    pub fn not_regexp(pattern: impl Into<String>) -> Self {
        Self::new(Operator::NotRegExp, WireValue::Text(pattern.into()))
    }

    /// The operator.
    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// The operand.
    pub fn operand(&self) -> &WireValue {
        &self.operand
    }

    /// The two bounds of a range comparison.
    ///
    /// # Errors
    ///
    /// Returns a malformed condition error unless the operand is a pair.
    pub fn range(&self) -> Result<(&WireValue, &WireValue), CompileError> {
        match self.operand.as_array() {
            Some([low, high]) => Ok((low, high)),
            Some(items) => Err(CompileError::malformed(format!(
                "{} needs exactly two operands, got {}",
                self.op,
                items.len()
            ))),
            None => Err(CompileError::malformed(format!(
                "{} needs a pair of operands, got {}",
                self.op,
                self.operand.kind()
            ))),
        }
    }

    /// The items of a list comparison.
    ///
    /// # Errors
    ///
    /// Returns a malformed condition error unless the operand is an array.
    pub fn list(&self) -> Result<&[WireValue], CompileError> {
        self.operand.as_array().ok_or_else(|| {
            CompileError::malformed(format!(
                "{} needs a list of operands, got {}",
                self.op,
                self.operand.kind()
            ))
        })
    }
}

/// Right-hand side of a [`Cond`] entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A plain value; the operator comes from the key suffix or is `=`.
    Value(WireValue),
    /// An explicit comparison; the key must not carry a suffix.
    Comparison(Comparison),
}

impl<T: Into<WireValue>> From<T> for Operand {
    fn from(value: T) -> Self {
        Self::Value(value.into())
    }
}

impl From<Comparison> for Operand {
    fn from(comparison: Comparison) -> Self {
        Self::Comparison(comparison)
    }
}

/// An ordered set of field predicates joined by `AND`.
///
/// Entries keep insertion order; setting an existing key replaces its
/// operand in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cond {
    entries: Vec<(String, Operand)>,
}

impl Cond {
    /// Creates an empty (always-true) condition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.set(key, operand);
        self
    }

    /// Sets an entry, replacing an existing one with the same key.
    pub fn set(&mut self, key: impl Into<String>, operand: impl Into<Operand>) {
        let key = key.into();
        let operand = operand.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = operand,
            None => self.entries.push((key, operand)),
        }
    }

    /// Looks up an entry by its exact key.
    pub fn get(&self, key: &str) -> Option<&Operand> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Operand)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves every entry to a field and comparison.
    ///
    /// # Errors
    ///
    /// Returns a malformed condition error for empty field names and for a
    /// suffixed key whose operand is itself a comparison.
    pub fn predicates(&self) -> Result<Vec<(&str, Comparison)>, CompileError> {
        self.entries
            .iter()
            .map(|(key, operand)| resolve(key, operand))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Operand>> FromIterator<(K, V)> for Cond {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut cond = Cond::new();
        for (k, v) in iter {
            cond.set(k, v);
        }
        cond
    }
}

/// Splits `"age >="` into the field and its operator suffix.
fn split_key(key: &str) -> (&str, Option<&str>) {
    let key = key.trim();
    match key.find(char::is_whitespace) {
        Some(at) => {
            let suffix = key[at..].trim();
            (&key[..at], (!suffix.is_empty()).then_some(suffix))
        }
        None => (key, None),
    }
}

fn resolve<'a>(key: &'a str, operand: &Operand) -> Result<(&'a str, Comparison), CompileError> {
    let (field, suffix) = split_key(key);
    if field.is_empty() {
        return Err(CompileError::malformed(format!("empty field name in `{key}`")));
    }
    let comparison = match (suffix, operand) {
        (Some(token), Operand::Value(value)) => Comparison::op(token, value.clone()),
        (None, Operand::Value(value)) => Comparison::eq(value.clone()),
        (None, Operand::Comparison(c)) => c.clone(),
        (Some(token), Operand::Comparison(_)) => {
            return Err(CompileError::malformed(format!(
                "`{field}` has operator suffix `{token}` and a comparison operand"
            )));
        }
    };
    Ok((field, comparison))
}

/// A filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field predicates joined by `AND`.
    Cond(Cond),
    /// All children must hold.
    And(Vec<Condition>),
    /// At least one child must hold.
    Or(Vec<Condition>),
    /// A verbatim SQL fragment with `?` placeholders.
    Raw {
        /// SQL text.
        sql: String,
        /// Positional arguments.
        args: Vec<WireValue>,
    },
}

impl Default for Condition {
    fn default() -> Self {
        Self::Cond(Cond::new())
    }
}

impl Condition {
    /// The always-true condition.
    pub fn all() -> Self {
        Self::default()
    }

    /// Conjunction of `children`.
    pub fn and(children: impl IntoIterator<Item = Condition>) -> Self {
        Self::And(children.into_iter().collect())
    }

    /// Disjunction of `children`.
    pub fn or(children: impl IntoIterator<Item = Condition>) -> Self {
        Self::Or(children.into_iter().collect())
    }

    /// A raw SQL fragment; only SQL backends accept it.
    ///
    /// Parameters are written `?`. On `$n` and `@pN` dialects a literal
    /// `?` is written `??`.
    pub fn raw<V: Into<WireValue>>(sql: impl Into<String>, args: impl IntoIterator<Item = V>) -> Self {
        Self::Raw {
            sql: sql.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// True if the condition matches everything.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Cond(cond) => cond.is_empty(),
            Self::And(children) => children.iter().all(Condition::is_empty),
            // An empty disjunct makes the whole disjunction true.
            Self::Or(children) => children.is_empty() || children.iter().any(Condition::is_empty),
            Self::Raw { sql, .. } => sql.trim().is_empty(),
        }
    }

    /// Narrows this condition with `other`.
    #[must_use]
    pub fn and_also(self, other: Condition) -> Self {
        match (self, other) {
            (a, b) if b.is_empty() => a,
            (a, b) if a.is_empty() => b,
            (Self::And(mut children), Self::And(more)) => {
                children.extend(more);
                Self::And(children)
            }
            (Self::And(mut children), b) => {
                children.push(b);
                Self::And(children)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }
}

impl From<Cond> for Condition {
    fn from(cond: Cond) -> Self {
        Self::Cond(cond)
    }
}

/// Builds a [`Cond`] from `key => value` pairs.
///
/// ```rust,ignore
/// let c = cond! { "age >" => 21, "name" => Comparison::like("J%") };
/// ```
#[macro_export]
macro_rules! cond {
    () => {
        $crate::Cond::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::Cond::new()$(.with($key, $value))+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_splits_off_the_field() {
        assert_eq!(split_key("age"), ("age", None));
        assert_eq!(split_key("age >="), ("age", Some(">=")));
        assert_eq!(split_key(" name  NOT LIKE "), ("name", Some("NOT LIKE")));
    }

    #[test]
    fn set_replaces_in_place() {
        let mut c = Cond::new().with("a", 1).with("b", 2);
        c.set("a", 3);
        let keys: Vec<_> = c.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(c.get("a"), Some(&Operand::Value(WireValue::Integer(3))));
    }

    #[test]
    fn predicates_resolve_operators() {
        let c = Cond::new()
            .with("age >", 21)
            .with("name", "Ada")
            .with("score", Comparison::between(1, 5));
        let preds = c.predicates().unwrap();
        assert_eq!(preds[0], ("age", Comparison::gt(21)));
        assert_eq!(preds[1], ("name", Comparison::eq("Ada")));
        assert_eq!(preds[2].1.operator(), &Operator::Between);
    }

    #[test]
    fn suffix_with_comparison_is_malformed() {
        let c = Cond::new().with("age >", Comparison::lt(3));
        assert!(matches!(c.predicates(), Err(CompileError::Malformed { .. })));
    }

    #[test]
    fn range_requires_a_pair() {
        let c = Comparison::op("BETWEEN", vec![1]);
        assert!(c.range().is_err());
        assert!(Comparison::between(1, 2).range().is_ok());
        assert!(Comparison::op("IN", 5).list().is_err());
    }

    #[test]
    fn emptiness() {
        assert!(Condition::all().is_empty());
        assert!(Condition::and([]).is_empty());
        assert!(Condition::or([Cond::new().with("a", 1).into(), Condition::all()]).is_empty());
        assert!(!Condition::raw("a = ?", [1]).is_empty());
    }

    #[test]
    fn and_also_skips_empty_sides() {
        let a: Condition = Cond::new().with("a", 1).into();
        assert_eq!(Condition::all().and_also(a.clone()), a);
        assert_eq!(a.clone().and_also(Condition::all()), a);
        let both = a.clone().and_also(a.clone());
        assert_eq!(both, Condition::And(vec![a.clone(), a]));
    }

    #[test]
    fn macro_builds_ordered_cond() {
        let c = crate::cond! { "b" => 1, "a <" => 2.5 };
        let keys: Vec<_> = c.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b", "a <"]);
        assert!(crate::cond! {}.is_empty());
    }
}

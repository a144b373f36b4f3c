//! Comparison operators.

use std::fmt;

/// Canonical comparison operators.
///
/// Unknown operator tokens are kept as [`Operator::Custom`] and passed
/// through verbatim to SQL backends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessThanOrEqual,
    /// `>=`
    GreaterThanOrEqual,
    /// `BETWEEN a AND b`, both ends included.
    Between,
    /// `NOT BETWEEN a AND b`, both ends excluded.
    NotBetween,
    /// `IN (...)`
    In,
    /// `NOT IN (...)`
    NotIn,
    /// `IS`
    Is,
    /// `IS NOT`
    IsNot,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// Regular expression match.
    RegExp,
    /// Negated regular expression match.
    NotRegExp,
    /// A token with no canonical meaning.
    Custom(String),
}

impl Operator {
    /// Parses an operator token.
    ///
    /// Matching ignores case and collapses inner whitespace, so `not  like`
    /// is [`Operator::NotLike`].
    pub fn parse(token: &str) -> Self {
        let normalized = token
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        match normalized.as_str() {
            "=" | "==" | "EQ" => Self::Equal,
            "!=" | "<>" | "NE" => Self::NotEqual,
            "<" | "LT" => Self::LessThan,
            ">" | "GT" => Self::GreaterThan,
            "<=" | "LTE" => Self::LessThanOrEqual,
            ">=" | "GTE" => Self::GreaterThanOrEqual,
            "BETWEEN" => Self::Between,
            "NOT BETWEEN" => Self::NotBetween,
            "IN" => Self::In,
            "NOT IN" => Self::NotIn,
            "IS" => Self::Is,
            "IS NOT" => Self::IsNot,
            "LIKE" => Self::Like,
            "NOT LIKE" => Self::NotLike,
            "REGEXP" | "~" => Self::RegExp,
            "NOT REGEXP" | "!~" => Self::NotRegExp,
            _ => Self::Custom(token.trim().to_string()),
        }
    }

    /// Canonical token.
    pub fn token(&self) -> &str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThanOrEqual => ">=",
            Self::Between => "BETWEEN",
            Self::NotBetween => "NOT BETWEEN",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::RegExp => "REGEXP",
            Self::NotRegExp => "NOT REGEXP",
            Self::Custom(token) => token,
        }
    }

    /// Operand must be a two element pair.
    pub fn takes_range(&self) -> bool {
        matches!(self, Self::Between | Self::NotBetween)
    }

    /// Operand must be a list.
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

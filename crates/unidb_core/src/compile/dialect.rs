//! SQL dialects.
//!
//! A [`Dialect`] owns everything that differs between SQL engines once a
//! condition has been compiled: identifier quoting, placeholder syntax,
//! paging clauses, how generated keys come back and how composite values
//! are bound.
//!
//! # Available Dialects
//!
//! - [`Postgres`] - `"ident"`, `$n` placeholders, `RETURNING`, native arrays
//! - [`MySql`] - `` `ident` ``, `?` placeholders, first id of a batch
//! - [`Sqlite`] - `"ident"`, `?` placeholders, last id of a batch
//! - [`MsSql`] - `[ident]`, `@pN` placeholders, `OUTPUT INSERTED`

use std::fmt;
use unidb_codec::{json, CodecResult, WireValue};

/// How an insert reports generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyReturn {
    /// `INSERT ... RETURNING col` yields one row per inserted row.
    Returning,
    /// `INSERT ... OUTPUT INSERTED.col VALUES ...` yields one row per inserted row.
    Output,
    /// The driver reports the id of the first row of a multi-row insert.
    FirstInsertId,
    /// The driver reports the id of the last row of a multi-row insert.
    LastInsertId,
}

/// Engine-specific SQL rendering.
pub trait Dialect: Send + Sync + fmt::Debug + 'static {
    /// Dialect name used in errors.
    fn name(&self) -> &'static str;

    /// Opening and closing identifier quote.
    fn quotes(&self) -> (char, char) {
        ('"', '"')
    }

    /// Placeholder for the `n`th parameter, 1-based.
    fn placeholder(&self, n: usize) -> String {
        let _ = n;
        "?".to_string()
    }

    /// Regular expression operator, `None` when the engine has none.
    fn regexp_operator(&self, negated: bool) -> Option<&'static str>;

    /// Paging clause, including its leading space; empty for no paging.
    fn limit_offset(&self, limit: Option<u64>, offset: u64, ordered: bool) -> String {
        let _ = ordered;
        match (limit, offset) {
            (None, 0) => String::new(),
            (Some(limit), 0) => format!(" LIMIT {limit}"),
            (Some(limit), offset) => format!(" LIMIT {limit} OFFSET {offset}"),
            (None, offset) => format!(" OFFSET {offset}"),
        }
    }

    /// Literal used for a column a multi-row insert leaves out.
    fn missing_value(&self) -> &'static str {
        "DEFAULT"
    }

    /// Insert statement body for a row with no columns.
    fn empty_insert(&self) -> &'static str {
        " DEFAULT VALUES"
    }

    /// How generated keys are reported.
    fn key_return(&self) -> KeyReturn;

    /// Statement that removes every row of `table`.
    fn truncate(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.quote(table))
    }

    /// Query listing user tables, one `name` column per row.
    fn list_tables(&self) -> &'static str;

    /// Lowers a wire value to something the engine can bind.
    ///
    /// # Errors
    ///
    /// Returns a codec error when a composite value has no JSON form.
    fn bind(&self, value: WireValue) -> CodecResult<WireValue> {
        match value {
            WireValue::Array(_) | WireValue::Document(_) | WireValue::Json(_) => {
                json::to_json_text(&value).map(WireValue::Text)
            }
            other => Ok(other),
        }
    }

    /// Quotes a possibly dotted identifier.
    ///
    /// Anything that is not a plain identifier (expressions, aliases) is
    /// returned verbatim; `*` stays unquoted.
    fn quote(&self, ident: &str) -> String {
        let ident = ident.trim();
        let parts: Vec<&str> = ident.split('.').collect();
        if !parts.iter().all(|p| *p == "*" || is_identifier(p)) {
            return ident.to_string();
        }
        let (open, close) = self.quotes();
        parts
            .iter()
            .map(|p| {
                if *p == "*" {
                    (*p).to_string()
                } else {
                    format!("{open}{p}{close}")
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// True when placeholders are numbered (`$n`, `@pN`) rather than `?`.
    fn numbered_placeholders(&self) -> bool {
        self.placeholder(1) != "?"
    }

    /// Rewrites `?` placeholders outside quoted regions.
    ///
    /// On numbered dialects `??` stands for a literal `?`, so operators
    /// such as jsonb `?|` survive the rewrite.
    fn rewrite_placeholders(&self, sql: &str) -> String {
        if !self.numbered_placeholders() {
            return sql.to_string();
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut n = 0;
        let mut quote: Option<char> = None;
        let mut chars = sql.chars().peekable();
        while let Some(c) = chars.next() {
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                    out.push(c);
                }
                None => match c {
                    '\'' | '"' | '`' => {
                        quote = Some(c);
                        out.push(c);
                    }
                    '[' => {
                        quote = Some(']');
                        out.push(c);
                    }
                    '?' if chars.peek() == Some(&'?') => {
                        chars.next();
                        out.push('?');
                    }
                    '?' => {
                        n += 1;
                        out.push_str(&self.placeholder(n));
                    }
                    _ => out.push(c),
                },
            }
        }
        out
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }

    fn regexp_operator(&self, negated: bool) -> Option<&'static str> {
        Some(if negated { "!~" } else { "~" })
    }

    fn key_return(&self) -> KeyReturn {
        KeyReturn::Returning
    }

    fn list_tables(&self) -> &'static str {
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = current_schema() ORDER BY table_name"
    }

    fn bind(&self, value: WireValue) -> CodecResult<WireValue> {
        // Arrays bind natively; documents travel as jsonb.
        match value {
            WireValue::Document(_) => json::to_json(&value).map(WireValue::Json),
            other => Ok(other),
        }
    }
}

/// MySQL and MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quotes(&self) -> (char, char) {
        ('`', '`')
    }

    fn regexp_operator(&self, negated: bool) -> Option<&'static str> {
        Some(if negated { "NOT REGEXP" } else { "REGEXP" })
    }

    fn limit_offset(&self, limit: Option<u64>, offset: u64, _ordered: bool) -> String {
        match (limit, offset) {
            (None, 0) => String::new(),
            (Some(limit), 0) => format!(" LIMIT {limit}"),
            (Some(limit), offset) => format!(" LIMIT {limit} OFFSET {offset}"),
            // OFFSET alone is not valid MySQL.
            (None, offset) => format!(" LIMIT 18446744073709551615 OFFSET {offset}"),
        }
    }

    fn empty_insert(&self) -> &'static str {
        " () VALUES ()"
    }

    fn key_return(&self) -> KeyReturn {
        KeyReturn::FirstInsertId
    }

    fn list_tables(&self) -> &'static str {
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = DATABASE() ORDER BY table_name"
    }
}

/// SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn regexp_operator(&self, negated: bool) -> Option<&'static str> {
        Some(if negated { "NOT REGEXP" } else { "REGEXP" })
    }

    fn limit_offset(&self, limit: Option<u64>, offset: u64, _ordered: bool) -> String {
        match (limit, offset) {
            (None, 0) => String::new(),
            (Some(limit), 0) => format!(" LIMIT {limit}"),
            (Some(limit), offset) => format!(" LIMIT {limit} OFFSET {offset}"),
            (None, offset) => format!(" LIMIT -1 OFFSET {offset}"),
        }
    }

    fn missing_value(&self) -> &'static str {
        "NULL"
    }

    fn key_return(&self) -> KeyReturn {
        KeyReturn::LastInsertId
    }

    fn truncate(&self, table: &str) -> String {
        format!("DELETE FROM {}", self.quote(table))
    }

    fn list_tables(&self) -> &'static str {
        "SELECT name FROM sqlite_master WHERE type = 'table' \
         AND name NOT LIKE 'sqlite_%' ORDER BY name"
    }

    fn bind(&self, value: WireValue) -> CodecResult<WireValue> {
        match value {
            WireValue::Bool(b) => Ok(WireValue::Integer(i64::from(b))),
            WireValue::Array(_) | WireValue::Document(_) | WireValue::Json(_) => {
                json::to_json_text(&value).map(WireValue::Text)
            }
            other => Ok(other),
        }
    }
}

/// Microsoft SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsSql;

impl Dialect for MsSql {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quotes(&self) -> (char, char) {
        ('[', ']')
    }

    fn placeholder(&self, n: usize) -> String {
        format!("@p{n}")
    }

    fn regexp_operator(&self, _negated: bool) -> Option<&'static str> {
        None
    }

    fn limit_offset(&self, limit: Option<u64>, offset: u64, ordered: bool) -> String {
        if limit.is_none() && offset == 0 {
            return String::new();
        }
        // OFFSET/FETCH is only valid after ORDER BY.
        let mut out = String::new();
        if !ordered {
            out.push_str(" ORDER BY (SELECT NULL)");
        }
        out.push_str(&format!(" OFFSET {offset} ROWS"));
        if let Some(limit) = limit {
            out.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
        }
        out
    }

    fn key_return(&self) -> KeyReturn {
        KeyReturn::Output
    }

    fn list_tables(&self) -> &'static str {
        "SELECT TABLE_NAME AS name FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
    }
}

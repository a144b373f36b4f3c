//! Full SQL statement assembly.

use super::dialect::{Dialect, KeyReturn};
use super::sql::SqlCompiler;
use crate::error::{CompileError, Result};
use crate::query::Query;
use unidb_codec::{Document, WireValue};

/// A statement ready for the driver: final placeholders, bound arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text in the dialect's placeholder syntax.
    pub sql: String,
    /// Arguments lowered for the dialect.
    pub args: Vec<WireValue>,
}

impl Statement {
    fn finish(dialect: &dyn Dialect, sql: &str, args: Vec<WireValue>) -> Result<Self> {
        let args = args
            .into_iter()
            .map(|arg| dialect.bind(arg))
            .collect::<unidb_codec::CodecResult<Vec<_>>>()?;
        Ok(Self {
            sql: dialect.rewrite_placeholders(sql),
            args,
        })
    }
}

fn where_clause(dialect: &dyn Dialect, query: &Query, sql: &mut String) -> Result<Vec<WireValue>> {
    let predicate = SqlCompiler::new(dialect).compile(&query.condition)?;
    if !predicate.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate.text);
    }
    Ok(predicate.args)
}

fn column_list(dialect: &dyn Dialect, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT` for a query, including ordering and paging.
///
/// # Errors
///
/// Returns compile errors from the condition and codec errors from binding.
pub fn select(dialect: &dyn Dialect, query: &Query) -> Result<Statement> {
    let fields = if query.fields.is_empty() {
        "*".to_string()
    } else {
        column_list(dialect, &query.fields)
    };
    let mut sql = format!("SELECT {fields} FROM {}", dialect.quote(&query.collection));
    let args = where_clause(dialect, query, &mut sql)?;
    if !query.group.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&column_list(dialect, &query.group));
    }
    if !query.order.is_empty() {
        let terms: Vec<String> = query
            .order
            .iter()
            .map(|o| {
                let column = dialect.quote(&o.column);
                if o.descending {
                    format!("{column} DESC")
                } else {
                    column
                }
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }
    sql.push_str(&dialect.limit_offset(query.limit, query.offset, !query.order.is_empty()));
    Statement::finish(dialect, &sql, args)
}

/// `SELECT COUNT(*)` over the query's filter, ignoring paging.
///
/// A grouped query counts groups.
///
/// # Errors
///
/// Returns compile errors from the condition and codec errors from binding.
pub fn count(dialect: &dyn Dialect, query: &Query) -> Result<Statement> {
    let table = dialect.quote(&query.collection);
    if query.group.is_empty() {
        let mut sql = format!("SELECT COUNT(*) AS count FROM {table}");
        let args = where_clause(dialect, query, &mut sql)?;
        return Statement::finish(dialect, &sql, args);
    }
    let groups = column_list(dialect, &query.group);
    let mut inner = format!("SELECT {groups} FROM {table}");
    let args = where_clause(dialect, query, &mut inner)?;
    inner.push_str(" GROUP BY ");
    inner.push_str(&groups);
    let sql = format!("SELECT COUNT(*) AS count FROM ({inner}) AS grouped");
    Statement::finish(dialect, &sql, args)
}

/// Multi-row `INSERT`.
///
/// Columns are the union of the rows' keys in first-seen order; a row
/// missing a column gets the dialect's default marker. With `returning`,
/// dialects that can report keys inline do so.
///
/// # Errors
///
/// Returns [`CompileError::Malformed`] for an empty batch or several rows
/// with no columns.
pub fn insert(
    dialect: &dyn Dialect,
    table: &str,
    rows: &[Document],
    returning: Option<&str>,
) -> Result<Statement> {
    if rows.is_empty() {
        return Err(CompileError::malformed("insert without rows").into());
    }
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key) {
                columns.push(key);
            }
        }
    }
    let table = dialect.quote(table);
    let output = match (returning, dialect.key_return()) {
        (Some(col), KeyReturn::Output) => format!(" OUTPUT INSERTED.{}", dialect.quote(col)),
        _ => String::new(),
    };
    let mut sql = format!("INSERT INTO {table}");
    let mut args = Vec::new();
    if columns.is_empty() {
        if rows.len() > 1 {
            return Err(CompileError::malformed("multi-row insert without columns").into());
        }
        sql.push_str(&output);
        sql.push_str(dialect.empty_insert());
    } else {
        let names = columns
            .iter()
            .map(|c| dialect.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ({names}){output} VALUES "));
        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let cells: Vec<&str> = columns
                .iter()
                .map(|c| match row.get(c) {
                    Some(value) => {
                        args.push(value.clone());
                        "?"
                    }
                    None => dialect.missing_value(),
                })
                .collect();
            tuples.push(format!("({})", cells.join(", ")));
        }
        sql.push_str(&tuples.join(", "));
    }
    if let (Some(col), KeyReturn::Returning) = (returning, dialect.key_return()) {
        sql.push_str(&format!(" RETURNING {}", dialect.quote(col)));
    }
    Statement::finish(dialect, &sql, args)
}

/// `UPDATE ... SET` over the query's filter.
///
/// # Errors
///
/// Returns [`CompileError::Malformed`] when `set` is empty.
pub fn update(dialect: &dyn Dialect, query: &Query, set: &Document) -> Result<Statement> {
    if set.is_empty() {
        return Err(CompileError::malformed("update without columns").into());
    }
    let assignments: Vec<String> = set
        .keys()
        .map(|k| format!("{} = ?", dialect.quote(k)))
        .collect();
    let mut args: Vec<WireValue> = set.iter().map(|(_, v)| v.clone()).collect();
    let mut sql = format!(
        "UPDATE {} SET {}",
        dialect.quote(&query.collection),
        assignments.join(", ")
    );
    args.extend(where_clause(dialect, query, &mut sql)?);
    Statement::finish(dialect, &sql, args)
}

/// `DELETE` over the query's filter.
///
/// # Errors
///
/// Returns compile errors from the condition and codec errors from binding.
pub fn delete(dialect: &dyn Dialect, query: &Query) -> Result<Statement> {
    let mut sql = format!("DELETE FROM {}", dialect.quote(&query.collection));
    let args = where_clause(dialect, query, &mut sql)?;
    Statement::finish(dialect, &sql, args)
}

/// Statement removing every row of `table`.
pub fn truncate(dialect: &dyn Dialect, table: &str) -> Statement {
    Statement {
        sql: dialect.truncate(table),
        args: Vec::new(),
    }
}

/// Query listing tables.
pub fn collections(dialect: &dyn Dialect) -> Statement {
    Statement {
        sql: dialect.list_tables().to_string(),
        args: Vec::new(),
    }
}

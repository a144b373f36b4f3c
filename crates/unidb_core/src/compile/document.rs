//! Condition to document filter compilation.
//!
//! Sibling predicates on the same field merge into one operator document
//! (`{age: {$gt: 1, $lt: 9}}`). Only genuinely conflicting entries fall
//! back to an `$and` list.

use crate::cond::{Comparison, Condition, Operator};
use crate::error::CompileError;
use unidb_codec::{json, Document, WireValue};

/// Compiles conditions into document-store filters.
#[derive(Debug, Clone)]
pub struct DocumentCompiler {
    backend: String,
}

impl Default for DocumentCompiler {
    fn default() -> Self {
        Self::new("document")
    }
}

impl DocumentCompiler {
    /// Creates a compiler reporting errors against `backend`.
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
        }
    }

    /// Compiles `condition` into a filter document.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Unsupported`] for raw SQL,
    /// [`CompileError::UnsupportedOperator`] for custom operators and
    /// [`CompileError::Malformed`] for ill-formed operands.
    pub fn compile(&self, condition: &Condition) -> Result<Document, CompileError> {
        match condition {
            Condition::Cond(cond) => {
                let mut merger = Merger::default();
                for (field, comparison) in cond.predicates()? {
                    self.predicate(&mut merger, field, &comparison)?;
                }
                Ok(merger.finish())
            }
            Condition::And(children) => {
                let mut merger = Merger::default();
                for child in children {
                    merger.merge_all(self.compile(child)?);
                }
                Ok(merger.finish())
            }
            Condition::Or(children) => {
                let mut branches = Vec::with_capacity(children.len());
                for child in children {
                    let doc = self.compile(child)?;
                    if doc.is_empty() {
                        return Ok(Document::new());
                    }
                    match only_or(&doc) {
                        Some(items) => branches.extend(items.iter().cloned()),
                        None => branches.push(WireValue::Document(doc)),
                    }
                }
                Ok(match branches.len() {
                    0 => Document::new(),
                    1 => match branches.pop() {
                        Some(WireValue::Document(doc)) => doc,
                        Some(other) => Document::new().with("$or", WireValue::Array(vec![other])),
                        None => Document::new(),
                    },
                    _ => Document::new().with("$or", WireValue::Array(branches)),
                })
            }
            Condition::Raw { .. } => Err(CompileError::unsupported("raw SQL condition", &self.backend)),
        }
    }

    fn predicate(
        &self,
        merger: &mut Merger,
        field: &str,
        comparison: &Comparison,
    ) -> Result<(), CompileError> {
        let operand = lower(comparison.operand())?;
        let op = |name: &str, value: WireValue| WireValue::Document(Document::new().with(name, value));
        let filter = match comparison.operator() {
            Operator::Equal | Operator::Is => match operand {
                // A document operand would read as an operator document.
                WireValue::Document(_) => op("$eq", operand),
                other => other,
            },
            Operator::NotEqual | Operator::IsNot => op("$ne", operand),
            Operator::LessThan => op("$lt", operand),
            Operator::GreaterThan => op("$gt", operand),
            Operator::LessThanOrEqual => op("$lte", operand),
            Operator::GreaterThanOrEqual => op("$gte", operand),
            Operator::Between => {
                let (low, high) = comparison.range()?;
                WireValue::Document(
                    Document::new()
                        .with("$gte", lower(low)?)
                        .with("$lte", lower(high)?),
                )
            }
            Operator::NotBetween => {
                let (low, high) = comparison.range()?;
                let below = Document::new().with(field, op("$lt", lower(low)?));
                let above = Document::new().with(field, op("$gt", lower(high)?));
                merger.clause(
                    "$or",
                    WireValue::Array(vec![WireValue::Document(below), WireValue::Document(above)]),
                );
                return Ok(());
            }
            Operator::In => op("$in", WireValue::Array(comparison.list()?.to_vec())),
            Operator::NotIn => op("$nin", WireValue::Array(comparison.list()?.to_vec())),
            Operator::Like => op("$regex", WireValue::Text(like_to_regex(pattern(comparison)?))),
            Operator::NotLike => op(
                "$not",
                op("$regex", WireValue::Text(like_to_regex(pattern(comparison)?))),
            ),
            Operator::RegExp => op("$regex", WireValue::Text(pattern(comparison)?.to_string())),
            Operator::NotRegExp => op(
                "$not",
                op("$regex", WireValue::Text(pattern(comparison)?.to_string())),
            ),
            Operator::Custom(token) => {
                return Err(CompileError::unsupported_operator(token.as_str(), &self.backend));
            }
        };
        merger.field(field, filter);
        Ok(())
    }
}

fn lower(value: &WireValue) -> Result<WireValue, CompileError> {
    json::lower(value.clone(), false).map_err(|e| CompileError::malformed(e.to_string()))
}

fn pattern(comparison: &Comparison) -> Result<&str, CompileError> {
    comparison.operand().as_text().ok_or_else(|| {
        CompileError::malformed(format!(
            "{} needs a text pattern, got {}",
            comparison.operator(),
            comparison.operand().kind()
        ))
    })
}

/// Translates a SQL `LIKE` pattern into an anchored regular expression.
///
/// `%` matches any run, `_` any single character; a backslash makes the
/// next character literal.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    let mut chars = pattern.chars();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(next.encode_utf8(&mut buf)));
                }
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out.push('$');
    out
}

fn only_or(doc: &Document) -> Option<&[WireValue]> {
    if doc.len() == 1 {
        doc.get("$or").and_then(WireValue::as_array)
    } else {
        None
    }
}

fn is_operator_doc(value: &WireValue) -> Option<&Document> {
    value
        .as_document()
        .filter(|d| !d.is_empty() && d.keys().all(|k| k.starts_with('$')))
}

/// Accumulates conjunctive filter entries.
#[derive(Default)]
struct Merger {
    doc: Document,
    rest: Vec<WireValue>,
}

impl Merger {
    fn field(&mut self, field: &str, filter: WireValue) {
        let Some(existing) = self.doc.get_mut(field) else {
            self.doc.insert(field, filter);
            return;
        };
        let disjoint = match (is_operator_doc(existing), is_operator_doc(&filter)) {
            (Some(a), Some(b)) => b.keys().all(|k| !a.contains_key(k)),
            _ => false,
        };
        if disjoint {
            if let (WireValue::Document(target), WireValue::Document(more)) = (existing, filter) {
                target.extend(more);
            }
        } else {
            self.rest
                .push(WireValue::Document(Document::new().with(field, filter)));
        }
    }

    fn clause(&mut self, key: &str, value: WireValue) {
        if self.doc.contains_key(key) {
            self.rest.push(WireValue::Document(Document::new().with(key, value)));
        } else {
            self.doc.insert(key, value);
        }
    }

    fn merge_all(&mut self, doc: Document) {
        for (key, value) in doc {
            match key.as_str() {
                "$and" => match value {
                    WireValue::Array(items) => self.rest.extend(items),
                    other => self.clause("$and", other),
                },
                k if k.starts_with('$') => self.clause(k, value),
                field => self.field(field, value),
            }
        }
    }

    fn finish(mut self) -> Document {
        if !self.rest.is_empty() {
            self.doc.insert("$and", WireValue::Array(self.rest));
        }
        self.doc
    }
}

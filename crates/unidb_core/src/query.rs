//! Backend-neutral query description.

use crate::cond::Condition;

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column or field name.
    pub column: String,
    /// Sort descending.
    pub descending: bool,
}

impl OrderBy {
    /// Parses `"col"` (ascending) or `"-col"` (descending).
    pub fn parse(term: &str) -> Self {
        let term = term.trim();
        match term.strip_prefix('-') {
            Some(column) => Self::desc(column.trim()),
            None => Self::asc(term.strip_prefix('+').unwrap_or(term).trim()),
        }
    }

    /// Ascending order on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Descending order on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    /// The same column in the opposite direction.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            column: self.column.clone(),
            descending: !self.descending,
        }
    }
}

/// Everything an adapter needs to run a read, update or delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Table or collection name.
    pub collection: String,
    /// Row filter.
    pub condition: Condition,
    /// Projected columns; empty means all.
    pub fields: Vec<String>,
    /// Sort terms in priority order.
    pub order: Vec<OrderBy>,
    /// Grouping columns.
    pub group: Vec<String>,
    /// Maximum rows returned.
    pub limit: Option<u64>,
    /// Rows skipped.
    pub offset: u64,
}

impl Query {
    /// A query over every row of `collection`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Same filter without projection, ordering or paging.
    #[must_use]
    pub fn filter_only(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            condition: self.condition.clone(),
            group: self.group.clone(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_terms_parse() {
        assert_eq!(OrderBy::parse("-created"), OrderBy::desc("created"));
        assert_eq!(OrderBy::parse("name"), OrderBy::asc("name"));
        assert_eq!(OrderBy::parse("+name"), OrderBy::asc("name"));
        assert_eq!(OrderBy::asc("a").reversed(), OrderBy::desc("a"));
    }

    #[test]
    fn filter_only_drops_paging() {
        let mut q = Query::new("users");
        q.limit = Some(5);
        q.offset = 10;
        q.order.push(OrderBy::asc("id"));
        q.group.push("team".into());
        let f = q.filter_only();
        assert_eq!(f.limit, None);
        assert_eq!(f.offset, 0);
        assert!(f.order.is_empty());
        assert_eq!(f.group, ["team"]);
    }
}

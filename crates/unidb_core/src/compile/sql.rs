//! Condition to SQL predicate compilation.

use super::dialect::Dialect;
use crate::cond::{Comparison, Condition, Operator};
use crate::error::CompileError;
use unidb_codec::WireValue;

/// A compiled `WHERE` fragment.
///
/// The text uses `?` placeholders; the dialect rewrites them when the
/// statement is assembled. A literal `?` inside an operator is written
/// `??`. An empty text is the always-true predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    /// SQL text without the `WHERE` keyword.
    pub text: String,
    /// Positional arguments in placeholder order.
    pub args: Vec<WireValue>,
}

impl Predicate {
    /// True if the predicate filters nothing.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Atom,
    And,
    Or,
    Raw,
}

struct Fragment {
    text: String,
    args: Vec<WireValue>,
    kind: Kind,
}

/// Compiles conditions for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct SqlCompiler<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlCompiler<'d> {
    /// Creates a compiler for `dialect`.
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Compiles `condition` into a predicate.
    ///
    /// Output is deterministic: the same tree always yields the same text
    /// and argument order.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Malformed`] for ill-formed operands and
    /// [`CompileError::UnsupportedOperator`] for operators the dialect lacks.
    pub fn compile(&self, condition: &Condition) -> Result<Predicate, CompileError> {
        Ok(match self.render(condition)? {
            Some(fragment) => Predicate {
                text: fragment.text,
                args: fragment.args,
            },
            None => Predicate::default(),
        })
    }

    fn render(&self, condition: &Condition) -> Result<Option<Fragment>, CompileError> {
        match condition {
            Condition::Cond(cond) => {
                let mut atoms = Vec::with_capacity(cond.len());
                for (field, comparison) in cond.predicates()? {
                    atoms.push(self.atom(field, &comparison)?);
                }
                Ok(join(atoms, Kind::And))
            }
            Condition::And(children) => {
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    if let Some(fragment) = self.render(child)? {
                        parts.push(fragment);
                    }
                }
                Ok(join(parts, Kind::And))
            }
            Condition::Or(children) => {
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    match self.render(child)? {
                        Some(fragment) => parts.push(fragment),
                        // One always-true branch makes the disjunction true.
                        None => return Ok(None),
                    }
                }
                Ok(join(parts, Kind::Or))
            }
            Condition::Raw { sql, args } => {
                let sql = sql.trim();
                if sql.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Fragment {
                    text: sql.to_string(),
                    args: args.clone(),
                    kind: Kind::Raw,
                }))
            }
        }
    }

    fn atom(&self, field: &str, comparison: &Comparison) -> Result<Fragment, CompileError> {
        let column = self.dialect.quote(field);
        let operand = comparison.operand();
        let mut args = Vec::new();
        let text = match comparison.operator() {
            Operator::Equal | Operator::Is if operand.is_null() => format!("{column} IS NULL"),
            Operator::NotEqual | Operator::IsNot if operand.is_null() => {
                format!("{column} IS NOT NULL")
            }
            Operator::Equal => binary(&column, "=", operand, &mut args),
            Operator::NotEqual => binary(&column, "<>", operand, &mut args),
            Operator::LessThan => binary(&column, "<", operand, &mut args),
            Operator::GreaterThan => binary(&column, ">", operand, &mut args),
            Operator::LessThanOrEqual => binary(&column, "<=", operand, &mut args),
            Operator::GreaterThanOrEqual => binary(&column, ">=", operand, &mut args),
            Operator::Is => binary(&column, "IS", operand, &mut args),
            Operator::IsNot => binary(&column, "IS NOT", operand, &mut args),
            Operator::Like => binary(&column, "LIKE", operand, &mut args),
            Operator::NotLike => binary(&column, "NOT LIKE", operand, &mut args),
            op @ (Operator::Between | Operator::NotBetween) => {
                let (low, high) = comparison.range()?;
                args.push(low.clone());
                args.push(high.clone());
                format!("{column} {op} ? AND ?")
            }
            op @ (Operator::In | Operator::NotIn) => {
                let items = comparison.list()?;
                if items.is_empty() {
                    let always = if *op == Operator::In { "1 = 0" } else { "1 = 1" };
                    always.to_string()
                } else {
                    args.extend(items.iter().cloned());
                    let marks = vec!["?"; items.len()].join(", ");
                    format!("{column} {op} ({marks})")
                }
            }
            op @ (Operator::RegExp | Operator::NotRegExp) => {
                let token = self
                    .dialect
                    .regexp_operator(*op == Operator::NotRegExp)
                    .ok_or_else(|| {
                        CompileError::unsupported_operator(op.token(), self.dialect.name())
                    })?;
                binary(&column, token, operand, &mut args)
            }
            Operator::Custom(token) if token.contains('?') => {
                // A bare `?` would read as a placeholder.
                if !self.dialect.numbered_placeholders() {
                    return Err(CompileError::unsupported_operator(
                        token.as_str(),
                        self.dialect.name(),
                    ));
                }
                binary(&column, &token.replace('?', "??"), operand, &mut args)
            }
            Operator::Custom(token) => binary(&column, token, operand, &mut args),
        };
        Ok(Fragment {
            text,
            args,
            kind: Kind::Atom,
        })
    }
}

fn binary(column: &str, op: &str, operand: &WireValue, args: &mut Vec<WireValue>) -> String {
    args.push(operand.clone());
    format!("{column} {op} ?")
}

/// Joins fragments with `kind`, flattening same-kind children and
/// parenthesizing the rest.
fn join(parts: Vec<Fragment>, kind: Kind) -> Option<Fragment> {
    if parts.len() <= 1 {
        return parts.into_iter().next();
    }
    let separator = if kind == Kind::Or { " OR " } else { " AND " };
    let mut texts = Vec::with_capacity(parts.len());
    let mut args = Vec::new();
    for part in parts {
        let bare = part.kind == Kind::Atom || part.kind == kind;
        texts.push(if bare {
            part.text
        } else {
            format!("({})", part.text)
        });
        args.extend(part.args);
    }
    Some(Fragment {
        text: texts.join(separator),
        args,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::dialect::{MsSql, MySql, Postgres};
    use crate::cond::Cond;

    fn pg(condition: impl Into<Condition>) -> Result<Predicate, CompileError> {
        SqlCompiler::new(&Postgres).compile(&condition.into())
    }

    #[test]
    fn empty_condition_is_always_true() {
        assert!(pg(Cond::new()).unwrap().is_empty());
        assert!(pg(Condition::and([])).unwrap().is_empty());
        assert!(pg(Condition::or([])).unwrap().is_empty());
    }

    #[test]
    fn suffix_operators() {
        let p = pg(Cond::new().with("age >=", 18).with("name LIKE", "A%")).unwrap();
        assert_eq!(p.text, r#""age" >= ? AND "name" LIKE ?"#);
        assert_eq!(p.args, vec![WireValue::Integer(18), "A%".into()]);
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let p = pg(Cond::new()
            .with("a", WireValue::Null)
            .with("b !=", WireValue::Null)
            .with("c", Comparison::is_not_null()))
        .unwrap();
        assert_eq!(p.text, r#""a" IS NULL AND "b" IS NOT NULL AND "c" IS NOT NULL"#);
        assert!(p.args.is_empty());
    }

    #[test]
    fn ranges_and_lists() {
        let p = pg(Cond::new()
            .with("n", Comparison::between(1, 9))
            .with("m", Comparison::not_between(2, 3))
            .with("k", Comparison::is_in([1, 2, 3])))
        .unwrap();
        assert_eq!(
            p.text,
            r#""n" BETWEEN ? AND ? AND "m" NOT BETWEEN ? AND ? AND "k" IN (?, ?, ?)"#
        );
        assert_eq!(p.args.len(), 7);
    }

    #[test]
    fn empty_lists_are_constant() {
        let none: [i64; 0] = [];
        assert_eq!(pg(Cond::new().with("k", Comparison::is_in(none))).unwrap().text, "1 = 0");
        assert_eq!(pg(Cond::new().with("k", Comparison::not_in(none))).unwrap().text, "1 = 1");
    }

    #[test]
    fn between_needs_two_operands() {
        let err = pg(Cond::new().with("n BETWEEN", vec![1, 2, 3])).unwrap_err();
        assert!(matches!(err, CompileError::Malformed { .. }));
    }

    #[test]
    fn logical_nesting_is_parenthesized() {
        let c = Condition::and([
            Cond::new().with("a", 1).into(),
            Condition::or([
                Cond::new().with("b", 2).into(),
                Cond::new().with("c", 3).with("d", 4).into(),
            ]),
        ]);
        assert_eq!(
            pg(c).unwrap().text,
            r#""a" = ? AND ("b" = ? OR ("c" = ? AND "d" = ?))"#
        );
    }

    #[test]
    fn single_children_unwrap_and_same_kind_flattens() {
        let c = Condition::or([
            Condition::and([Cond::new().with("a", 1).into()]),
            Condition::or([Cond::new().with("b", 2).into(), Cond::new().with("c", 3).into()]),
        ]);
        assert_eq!(pg(c).unwrap().text, r#""a" = ? OR "b" = ? OR "c" = ?"#);
    }

    #[test]
    fn or_with_empty_branch_is_always_true() {
        let c = Condition::or([Cond::new().with("a", 1).into(), Condition::all()]);
        assert!(pg(c).unwrap().is_empty());
    }

    #[test]
    fn raw_fragments_keep_args() {
        let c = Condition::and([
            Condition::raw("lower(name) = ? OR x = ?", ["ada", "bob"]),
            Cond::new().with("a", 1).into(),
        ]);
        let p = pg(c).unwrap();
        assert_eq!(p.text, r#"(lower(name) = ? OR x = ?) AND "a" = ?"#);
        assert_eq!(p.args.len(), 3);
    }

    #[test]
    fn regexp_per_dialect() {
        let c: Condition = Cond::new().with("name", Comparison::regexp("^A")).into();
        assert_eq!(pg(c.clone()).unwrap().text, r#""name" ~ ?"#);
        assert_eq!(SqlCompiler::new(&MySql).compile(&c).unwrap().text, "`name` REGEXP ?");
        let err = SqlCompiler::new(&MsSql).compile(&c).unwrap_err();
        assert_eq!(err, CompileError::unsupported_operator("REGEXP", "mssql"));
    }

    #[test]
    fn custom_operators_pass_through() {
        let p = pg(Cond::new().with("tags @>", WireValue::Array(vec!["a".into()]))).unwrap();
        assert_eq!(p.text, r#""tags" @> ?"#);
    }

    #[test]
    fn question_mark_operators_need_numbered_placeholders() {
        let c: Condition = Cond::new().with("tags ?|", WireValue::Array(vec!["a".into()])).into();
        let p = pg(c.clone()).unwrap();
        assert_eq!(p.text, r#""tags" ??| ?"#);
        assert_eq!(p.args.len(), 1);
        let err = SqlCompiler::new(&MySql).compile(&c).unwrap_err();
        assert_eq!(err, CompileError::unsupported_operator("?|", "mysql"));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn leaf() -> impl Strategy<Value = Condition> {
            (prop::sample::select(vec!["a", "b", "c"]), prop::sample::select(vec!["", " >", " <=", " !="]), any::<i64>())
                .prop_map(|(f, op, v)| Cond::new().with(format!("{f}{op}"), v).into())
        }

        fn tree() -> impl Strategy<Value = Condition> {
            leaf().prop_recursive(3, 16, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Condition::And),
                    prop::collection::vec(inner, 0..4).prop_map(Condition::Or),
                ]
            })
        }

        proptest! {
            #[test]
            fn compilation_is_deterministic(c in tree()) {
                let first = pg(c.clone()).unwrap();
                let second = pg(c).unwrap();
                prop_assert_eq!(&first, &second);
                prop_assert_eq!(first.text.matches('?').count(), first.args.len());
            }
        }
    }
}

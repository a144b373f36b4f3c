//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use crate::fixtures::{Address, Audit, Person};
use proptest::prelude::*;
use unidb_codec::{Document, WireValue};
use unidb_core::{Comparison, Cond, Condition};

/// Strategy for generating valid column names.
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for scalar wire values.
///
/// Floats are finite so values compare equal to themselves.
pub fn scalar_value_strategy() -> impl Strategy<Value = WireValue> {
    prop_oneof![
        Just(WireValue::Null),
        any::<bool>().prop_map(WireValue::Bool),
        any::<i64>().prop_map(WireValue::Integer),
        (-1.0e12f64..1.0e12).prop_map(WireValue::Float),
        "[ -~]{0,24}".prop_map(WireValue::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(WireValue::Bytes),
    ]
}

/// Strategy for wire values nested up to a few levels deep.
pub fn wire_value_strategy() -> impl Strategy<Value = WireValue> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(WireValue::Array),
            prop::collection::vec((column_name_strategy(), inner), 0..4)
                .prop_map(|pairs| WireValue::Document(pairs.into_iter().collect())),
        ]
    })
}

/// Strategy for documents with distinct keys.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(column_name_strategy(), wire_value_strategy(), 0..8)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for integer comparisons on a single column.
pub fn comparison_strategy() -> impl Strategy<Value = Comparison> {
    prop_oneof![
        any::<i32>().prop_map(|v| Comparison::eq(v)),
        any::<i32>().prop_map(|v| Comparison::ne(v)),
        any::<i32>().prop_map(|v| Comparison::lt(v)),
        any::<i32>().prop_map(|v| Comparison::gte(v)),
        (any::<i32>(), any::<i32>()).prop_map(|(a, b)| Comparison::between(a.min(b), a.max(b))),
        (any::<i32>(), any::<i32>()).prop_map(|(a, b)| Comparison::not_between(a.min(b), a.max(b))),
        prop::collection::vec(any::<i32>(), 1..5).prop_map(|vs| Comparison::is_in(vs)),
        prop::collection::vec(any::<i32>(), 1..5).prop_map(|vs| Comparison::not_in(vs)),
        Just(Comparison::is_null()),
        "[a-z%_]{1,6}".prop_map(|p| Comparison::like(p)),
        (custom_operator_strategy(), any::<i32>()).prop_map(|(op, v)| Comparison::custom(op, v)),
    ]
}

/// Strategy for passthrough operator tokens, some containing `?`.
pub fn custom_operator_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["@>", "<@", "&&", "?", "?|", "?&"])
}

/// Strategy for a flat [`Cond`] over distinct columns.
pub fn cond_strategy() -> impl Strategy<Value = Cond> {
    prop::collection::btree_map(column_name_strategy(), comparison_strategy(), 0..5)
        .prop_map(|entries| entries.into_iter().collect())
}

/// Strategy for condition trees without raw fragments.
pub fn condition_strategy() -> impl Strategy<Value = Condition> {
    cond_strategy()
        .prop_map(Condition::from)
        .prop_recursive(2, 16, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..4).prop_map(Condition::and),
                prop::collection::vec(inner, 1..4).prop_map(Condition::or),
            ]
        })
}

/// Strategy for people with a positive id.
pub fn person_strategy() -> impl Strategy<Value = Person> {
    (
        1i64..1_000_000,
        "[A-Z][a-z]{1,10}",
        0i64..120,
        prop::option::of("[a-z]{1,8}@example\\.com"),
        prop::collection::vec("[a-z0-9]{1,6}", 0..4),
        ("[0-9]{1,4} [A-Z][a-z]{2,8} St", "[A-Z][a-z]{2,10}"),
        (0i64..4_000_000_000, prop::option::of("[a-z]{3,8}")),
    )
        .prop_map(|(id, name, age, email, tags, (street, city), (created, editor))| Person {
            id,
            name,
            age,
            email,
            tags,
            address: Address { street, city },
            audit: Audit { created, editor },
        })
}

//! Integration tests for Value
//!
//! Tests tagging, base access, numeric views, equality, and display.

use std::collections::HashSet;

use tabula_foundation::{Type, Value};

// =============================================================================
// Tagging
// =============================================================================

#[test]
fn tagging_keeps_base() {
    let v = Value::from("john@x.com").with_tag("email");
    assert_eq!(v.base(), &Value::from("john@x.com"));
    assert!(v.has_tag("email"));
    assert_eq!(v.value_type(), Type::String);
}

#[test]
fn tagging_is_idempotent() {
    let once = Value::from("a").with_tag("x");
    let twice = once.with_tag("x");
    assert_eq!(once, twice);
    assert_eq!(twice.tags().count(), 1);
}

#[test]
fn tags_are_ordered() {
    let v = Value::from("a").with_tag("zeta").with_tag("alpha");
    assert_eq!(v.tags().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
}

#[test]
fn removing_last_tag_unwraps() {
    let v = Value::Int(3).with_tag("n").without_tag("n");
    assert_eq!(v, Value::Int(3));
    assert!(!matches!(v, Value::Tagged(_)));
}

#[test]
fn with_base_keeps_tags() {
    let v = Value::from("OLD").with_tag("email").with_base(Value::from("new"));
    assert_eq!(v.base(), &Value::from("new"));
    assert!(v.has_tag("email"));
}

#[test]
fn tagged_null_is_null() {
    assert!(Value::Null.with_tag("x").is_null());
}

// =============================================================================
// Numeric Views
// =============================================================================

#[test]
fn numbers_from_text() {
    assert_eq!(Value::from(" 12.5 ").to_number(), Some(12.5));
    assert_eq!(Value::from("n/a").to_number(), None);
    assert_eq!(Value::from("7").as_number(), None);
    assert_eq!(Value::Int(7).as_number(), Some(7.0));
}

#[test]
fn mixed_numeric_ordering() {
    assert!(Value::Int(2) < Value::Float(2.5));
    assert!(Value::from("a").partial_cmp(&Value::Int(1)).is_none());
}

// =============================================================================
// Equality and Display
// =============================================================================

#[test]
fn equal_values_hash_equal() {
    let set: HashSet<Value> = [Value::from("a"), Value::from("a"), Value::Float(0.5), Value::Float(0.5)]
        .into_iter()
        .collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn tagged_and_untagged_differ() {
    assert_ne!(Value::from("a"), Value::from("a").with_tag("t"));
}

#[test]
fn display_shows_base_only() {
    assert_eq!(Value::from("x").with_tag("t").to_string(), "x");
    assert_eq!(Value::Null.to_string(), "");
    assert_eq!(format!("{:?}", Value::from("x").with_tag("t")), "\"x\"#{t}");
}

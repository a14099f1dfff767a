//! Integration tests for Table
//!
//! Tests column identity, typed writes, row access, and snapshots.

use tabula_foundation::{ColumnId, ErrorKind, TableId, Type, Value};
use tabula_storage::Table;

fn orders() -> Table {
    let mut table = Table::new(TableId::new(2), "Orders").with_column("CustomerEmail");
    table.add_column("Total", Type::Float);
    table.push_record([Value::from("ann@x.com"), Value::Int(120)]).unwrap();
    table.push_record([Value::from("bob@y.org"), Value::Float(9.5)]).unwrap();
    table
}

// =============================================================================
// Column Identity
// =============================================================================

#[test]
fn ids_survive_rename_and_reorder() {
    let mut table = orders();
    let total = table.column_by_name("Total").unwrap().id;
    table.rename_column(total, "Amount").unwrap();
    table.move_column(total, 0).unwrap();
    assert_eq!(table.columns()[0].id, total);
    assert_eq!(&*table.columns()[0].name, "Amount");
    assert_eq!(table.get(0, total).unwrap(), &Value::Int(120));
}

#[test]
fn removed_ids_are_not_reused() {
    let mut table = orders();
    table.remove_column(ColumnId::new(1)).unwrap();
    assert_eq!(table.add_column("Total", Type::Any), ColumnId::new(2));
    assert!(table.get(0, ColumnId::new(1)).is_err());
}

#[test]
fn duplicate_names_resolve_to_first() {
    let table = Table::new(TableId::new(1), "T").with_column("A").with_column("A");
    assert_eq!(table.column_by_name("A").unwrap().id, ColumnId::new(0));
}

// =============================================================================
// Typed Writes
// =============================================================================

#[test]
fn declared_type_rejects_text() {
    let mut table = orders();
    let err = table.set(0, ColumnId::new(1), Value::from("lots")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { expected: Type::Float, actual: Type::String }));
    assert_eq!(table.get(0, ColumnId::new(1)).unwrap(), &Value::Int(120));
}

#[test]
fn tagged_values_type_by_base() {
    let mut table = orders();
    table
        .set(1, ColumnId::new(1), Value::Float(3.0).with_tag("refund"))
        .unwrap();
    assert!(table.get(1, ColumnId::new(1)).unwrap().has_tag("refund"));
}

#[test]
fn short_records_pad_with_null() {
    let mut table = orders();
    let row = table.push_record([Value::from("cy@z.net")]).unwrap();
    assert_eq!(row, 2);
    assert!(table.get(2, ColumnId::new(1)).unwrap().is_null());
}

#[test]
fn long_records_are_rejected() {
    let mut table = orders();
    let err = table
        .push_record([Value::from("a"), Value::Int(1), Value::Int(2)])
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ArityMismatch { expected: 2, actual: 3 }));
    assert_eq!(table.row_count(), 2);
}

#[test]
fn out_of_bounds_rows() {
    let table = orders();
    let err = table.get(5, ColumnId::new(0)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RowOutOfBounds { row: 5, length: 2, .. }));
}

// =============================================================================
// Snapshots
// =============================================================================

#[test]
fn clones_are_independent() {
    let original = orders();
    let mut copy = original.clone();
    copy.set(0, ColumnId::new(0), Value::from("changed")).unwrap();
    assert_eq!(original.get(0, ColumnId::new(0)).unwrap(), &Value::from("ann@x.com"));
}

#[test]
fn copy_column_requires_matching_rows() {
    let source = orders();
    let mut target = orders();
    target.set(0, ColumnId::new(0), Value::Null).unwrap();
    target.copy_column_from(&source, ColumnId::new(0)).unwrap();
    assert_eq!(target, source);

    let mut short = Table::new(TableId::new(2), "Orders").with_column("CustomerEmail");
    short.add_column("Total", Type::Float);
    let err = short.copy_column_from(&source, ColumnId::new(0)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ArityMismatch { .. }));
}

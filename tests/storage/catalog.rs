//! Integration tests for Catalog

use tabula_foundation::{ErrorKind, TableId};
use tabula_storage::{Catalog, Table};

fn catalog() -> Catalog {
    Catalog::from_tables([
        Table::new(TableId::new(3), "Orders"),
        Table::new(TableId::new(1), "Customers"),
    ])
}

#[test]
fn iterates_in_id_order() {
    let ids: Vec<_> = catalog().ids().collect();
    assert_eq!(ids, vec![TableId::new(1), TableId::new(3)]);
    assert_eq!(catalog().next_table_id(), TableId::new(4));
}

#[test]
fn insert_rejects_duplicates() {
    let mut catalog = catalog();
    let err = catalog.insert(Table::new(TableId::new(1), "Again")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateTable(_)));
    assert_eq!(catalog.get(TableId::new(1)).unwrap().name(), "Customers");
}

#[test]
fn upsert_replaces() {
    let mut catalog = catalog();
    let previous = catalog.upsert(Table::new(TableId::new(1), "Clients"));
    assert_eq!(previous.unwrap().name(), "Customers");
    assert!(catalog.table_by_name("Clients").is_some());
    assert!(catalog.table_by_name("Customers").is_none());
}

#[test]
fn remove_and_require() {
    let mut catalog = catalog();
    catalog.remove(TableId::new(3)).unwrap();
    assert!(matches!(
        catalog.require(TableId::new(3)).unwrap_err().kind,
        ErrorKind::TableNotFound(_)
    ));
    assert!(catalog.remove(TableId::new(3)).is_err());
}

#[test]
fn names_are_exact_and_case_sensitive() {
    let catalog = catalog();
    assert!(catalog.table_by_name("customers").is_none());
    assert!(catalog.table_by_name("Customers ").is_none());
}

#[test]
fn duplicate_names_resolve_to_lowest_id() {
    let catalog = Catalog::from_tables([
        Table::new(TableId::new(5), "Dup"),
        Table::new(TableId::new(2), "Dup"),
    ]);
    assert_eq!(catalog.table_by_name("Dup").unwrap().id(), TableId::new(2));
}

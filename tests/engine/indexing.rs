//! Rule compilation, column resolution, and index construction.

use tabula_engine::{
    ActionDecl, ColumnAddr, ColumnRef, MatcherDecl, Resolver, RuleCompiler, RuleDecl, RuleIndex, TransformDecl,
    Unresolved, Warning,
};
use tabula_foundation::{ColumnId, ErrorKind, RuleId};

use crate::common::{CUSTOMERS, ORDERS, catalog, compile, index};

fn addr(table: tabula_foundation::TableId, column: u64) -> ColumnAddr {
    ColumnAddr::new(table, ColumnId::new(column))
}

// =============================================================================
// Compilation
// =============================================================================

#[test]
fn malformed_rules_are_rejected_at_load() {
    let cases = [
        RuleDecl::default().column("Email").glob("*").tag("x"),
        RuleDecl::new(1).glob("*").tag("x"),
        RuleDecl::new(2).column("Email").tag("x"),
        RuleDecl::new(3).column("Email").glob("*"),
        RuleDecl::new(4).column("Email").glob("*").tag(""),
        RuleDecl {
            action: Some(ActionDecl::Link { target: None }),
            ..RuleDecl::new(5).column("Email").matching(MatcherDecl::Any)
        },
    ];
    for decl in &cases {
        let err = RuleCompiler::compile(decl, 0).unwrap_err();
        assert!(err.is_malformed_rule(), "{decl:?} gave {err}");
    }
}

#[test]
fn bad_patterns_are_rejected_at_load() {
    let decl = RuleDecl::new(1).column("Email").matching(MatcherDecl::Regex {
        pattern: "(".into(),
        case_insensitive: false,
    });
    let err = RuleCompiler::compile(&decl.tag("x"), 0).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidPattern { .. } | ErrorKind::MalformedRule { .. }));
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn resolution_is_exact_and_case_sensitive() {
    let catalog = catalog();
    let resolver = Resolver::new(&catalog);
    let customers = catalog.get(CUSTOMERS).unwrap();
    assert_eq!(
        resolver.resolve(&ColumnRef::local("Email"), customers),
        Ok(addr(CUSTOMERS, 1))
    );
    assert!(matches!(
        resolver.resolve(&ColumnRef::local("email"), customers),
        Err(Unresolved::MissingColumn { .. })
    ));
}

#[test]
fn qualified_references_ignore_context() {
    let catalog = catalog();
    let resolver = Resolver::new(&catalog);
    let customers = catalog.get(CUSTOMERS).unwrap();
    let reference = ColumnRef::parse("Orders.Total");
    assert_eq!(resolver.resolve(&reference, customers), Ok(addr(ORDERS, 1)));
}

#[test]
fn renamed_columns_keep_their_bindings_by_new_name() {
    let mut catalog = catalog();
    catalog
        .get_mut(CUSTOMERS)
        .unwrap()
        .rename_column(ColumnId::new(1), "Mail")
        .unwrap();
    let decls = [RuleDecl::new(1).column("Mail").glob("*@*").tag("email")];
    let idx = index(&catalog, &decls);
    assert_eq!(idx.bindings(addr(CUSTOMERS, 1)).len(), 1);
}

// =============================================================================
// Index
// =============================================================================

#[test]
fn global_rules_bind_per_table() {
    let mut catalog = catalog();
    catalog
        .get_mut(ORDERS)
        .unwrap()
        .rename_column(ColumnId::new(0), "Email")
        .unwrap();
    let idx = index(&catalog, &[RuleDecl::new(1).column("Email").glob("*@*").tag("email")]);
    assert_eq!(idx.bindings(addr(CUSTOMERS, 1)).len(), 1);
    assert_eq!(idx.bindings(addr(ORDERS, 0)).len(), 1);
    assert!(idx.warnings().is_empty());
}

#[test]
fn local_rules_bind_to_their_table_only() {
    let catalog = catalog();
    let idx = index(&catalog, &[RuleDecl::new(1).local(ORDERS).column("Total").glob("*").tag("t")]);
    assert_eq!(idx.binding_count(), 1);

    let missing = index(&catalog, &[RuleDecl::new(2).local(CUSTOMERS).column("Total").glob("*").tag("t")]);
    assert!(missing.is_empty());
    assert_eq!(missing.warnings()[&RuleId::new(2)].len(), 1);
}

#[test]
fn unresolved_qualified_reference_warns() {
    let mut catalog = catalog();
    catalog.remove(ORDERS).unwrap();
    let idx = index(
        &catalog,
        &[
            RuleDecl::new(1).column("Orders.CustomerEmail").glob("*").tag("x"),
            RuleDecl::new(2).column("Email").glob("*@*").tag("email"),
        ],
    );
    let warnings = &idx.warnings()[&RuleId::new(1)];
    assert!(matches!(
        &warnings[0],
        Warning::UnresolvedReference { reason: Unresolved::MissingTable(name), .. } if &**name == "Orders"
    ));
    assert_eq!(idx.bindings(addr(CUSTOMERS, 1)).len(), 1);
}

#[test]
fn ordering_is_priority_then_creation() {
    let catalog = catalog();
    let decls = [
        RuleDecl::new(10).column("Email").glob("*").tag("c").priority(2).created(0),
        RuleDecl::new(11).column("Email").glob("*").tag("b").priority(1).created(5),
        RuleDecl::new(12).column("Email").glob("*").tag("a").priority(1).created(3),
    ];
    let rules = compile(&decls);
    let forward = RuleIndex::build(&rules, &catalog);
    let reversed = RuleIndex::build(rules.iter().rev(), &catalog);
    let order = |idx: &RuleIndex| -> Vec<u64> {
        idx.rules_for(addr(CUSTOMERS, 1)).map(|r| r.id.raw()).collect()
    };
    assert_eq!(order(&forward), vec![12, 11, 10]);
    assert_eq!(order(&forward), order(&reversed));
}

#[test]
fn disabled_rules_are_not_indexed() {
    let catalog = catalog();
    let idx = index(&catalog, &[RuleDecl::new(1).column("Email").glob("*").tag("x").enabled(false)]);
    assert!(idx.is_empty());
}

#[test]
fn dependents_follow_cross_table_reads() {
    let catalog = catalog();
    let idx = index(
        &catalog,
        &[
            RuleDecl::new(1)
                .column("Email")
                .matching(MatcherDecl::Any)
                .replace(TransformDecl::Lowercase),
            RuleDecl::new(2)
                .column("Orders.CustomerEmail")
                .matching(MatcherDecl::InColumn(ColumnRef::parse("Customers.Email")))
                .tag("known"),
        ],
    );
    assert_eq!(
        idx.dependents([addr(CUSTOMERS, 1)]),
        [addr(CUSTOMERS, 1), addr(ORDERS, 0)].into_iter().collect()
    );
    assert_eq!(idx.dependents([addr(ORDERS, 0)]).len(), 1);
}

//! Evaluation semantics across whole passes.

use tabula_engine::{
    CompareOp, EffectKind, LinkRecord, MatcherDecl, RuleDecl, SkipReason, TransformDecl,
};
use tabula_foundation::{ColumnId, RuleId, Type, Value};
use tabula_storage::Catalog;

use crate::common::{CUSTOMERS, ORDERS, catalog, full_pass, index};

const EMAIL: ColumnId = ColumnId::new(1);

fn output(catalog: &Catalog, table: tabula_foundation::TableId, row: usize, column: ColumnId) -> Value {
    catalog.get(table).unwrap().get(row, column).unwrap().clone()
}

fn normalize_rules() -> Vec<RuleDecl> {
    vec![
        RuleDecl::new(1)
            .column("Email")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Lowercase)
            .priority(1),
        RuleDecl::new(2).column("Email").glob("*@*").tag("email").priority(2),
    ]
}

#[test]
fn replace_then_tag_composes() {
    let catalog = catalog();
    let outcome = full_pass(&catalog, &index(&catalog, &normalize_rules()));

    let value = output(&outcome.outputs, CUSTOMERS, 0, EMAIL);
    assert_eq!(value.base(), &Value::from("john@x.com"));
    assert_eq!(value.tags().collect::<Vec<_>>(), vec!["email"]);

    let row0: Vec<_> = outcome
        .effects()
        .filter(|e| e.table == CUSTOMERS && e.row == 0)
        .collect();
    assert_eq!(row0.len(), 2);
    assert_eq!(row0[0].rule, RuleId::new(1));
    assert_eq!(row0[0].prior, Value::from("JOHN@X.COM"));
    assert_eq!(row0[0].new, Value::from("john@x.com"));
    assert_eq!(row0[0].kind, EffectKind::Replace);
    assert_eq!(row0[1].rule, RuleId::new(2));
    assert_eq!(row0[1].new.base(), row0[1].prior.base());
    assert!(row0[0].tick < row0[1].tick);
}

#[test]
fn unchanged_replace_records_nothing() {
    let catalog = catalog();
    let outcome = full_pass(&catalog, &index(&catalog, &normalize_rules()[..1]));
    // Only "JOHN@X.COM" changes under lowercase; " ann@y.org " and "n/a" do not.
    assert_eq!(outcome.effects().count(), 1);
}

#[test]
fn equal_priority_replaces_apply_in_creation_order() {
    let catalog = catalog();
    let decls = [
        RuleDecl::new(7)
            .column("Name")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Constant(Value::from("second")))
            .created(2),
        RuleDecl::new(8)
            .column("Name")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Constant(Value::from("first")))
            .created(1),
    ];
    let outcome = full_pass(&catalog, &index(&catalog, &decls));
    assert_eq!(output(&outcome.outputs, CUSTOMERS, 0, ColumnId::new(0)), Value::from("second"));
    let rules: Vec<_> = outcome
        .effects()
        .filter(|e| e.row == 0)
        .map(|e| e.rule.raw())
        .collect();
    assert_eq!(rules, vec![8, 7]);
}

#[test]
fn later_rules_see_replaced_values() {
    let catalog = catalog();
    let decls = [
        RuleDecl::new(1)
            .column("Email")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Trim),
        RuleDecl::new(2)
            .column("Email")
            .matching(MatcherDecl::Exact(Value::from("ann@y.org")))
            .tag("known")
            .priority(1),
    ];
    let outcome = full_pass(&catalog, &index(&catalog, &decls));
    assert!(output(&outcome.outputs, CUSTOMERS, 1, EMAIL).has_tag("known"));
}

#[test]
fn numeric_comparison_on_text_is_skipped() {
    let catalog = catalog();
    let decls = [RuleDecl::new(1)
        .column("Total")
        .matching(MatcherDecl::Compare {
            op: CompareOp::Gt,
            value: 100.0,
        })
        .tag("large")];
    let outcome = full_pass(&catalog, &index(&catalog, &decls));
    let total = ColumnId::new(1);

    assert!(output(&outcome.outputs, ORDERS, 0, total).has_tag("large"));
    assert!(!output(&outcome.outputs, ORDERS, 1, total).has_tag("large"));
    assert_eq!(output(&outcome.outputs, ORDERS, 2, total), Value::from("abc"));

    let skip = outcome.effects().find(|e| e.row == 2).unwrap();
    assert_eq!(
        skip.kind,
        EffectKind::Skipped(SkipReason::TypeMismatch {
            expected: Type::Float,
            actual: Type::String,
        })
    );
    assert_eq!(skip.prior, skip.new);
}

#[test]
fn links_use_normalized_values() {
    let catalog = catalog();
    let decls = [
        RuleDecl::new(1)
            .column("Customers.Email")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Trim),
        RuleDecl::new(2)
            .column("Customers.Email")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Lowercase)
            .priority(1),
        RuleDecl::new(3)
            .column("Orders.CustomerEmail")
            .matching(MatcherDecl::Any)
            .link("Customers.Email")
            .priority(2),
    ];
    let outcome = full_pass(&catalog, &index(&catalog, &decls));
    let links: Vec<&LinkRecord> = outcome.links().collect();
    assert_eq!(links.len(), 2);
    assert_eq!((links[0].source.row, links[0].target.row), (0, 0));
    assert_eq!((links[1].source.row, links[1].target.row), (1, 1));
    assert_eq!(links[0].key, Value::from("john@x.com"));

    // Links never mutate either side.
    assert_eq!(output(&outcome.outputs, ORDERS, 0, ColumnId::new(0)), Value::from("john@x.com"));
}

#[test]
fn link_keys_wait_for_replaces_of_equal_priority() {
    let mut catalog = catalog();
    catalog
        .get_mut(ORDERS)
        .unwrap()
        .set(1, ColumnId::new(0), Value::from("ANN@Y.ORG"))
        .unwrap();
    let decls = [
        RuleDecl::new(1)
            .column("Customers.Email")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Trim),
        RuleDecl::new(2)
            .column("Orders.CustomerEmail")
            .matching(MatcherDecl::Any)
            .link("Customers.Email")
            .priority(1),
        // Created after the link, same priority: still runs before the key is read.
        RuleDecl::new(3)
            .column("Orders.CustomerEmail")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Lowercase)
            .priority(1),
        // Higher priority: runs after the key is read.
        RuleDecl::new(4)
            .column("Orders.CustomerEmail")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Uppercase)
            .priority(2),
    ];
    let outcome = full_pass(&catalog, &index(&catalog, &decls));
    let links: Vec<&LinkRecord> = outcome.links().collect();
    assert_eq!(links.len(), 1);
    assert_eq!((links[0].source.row, links[0].target.row), (1, 1));
    assert_eq!(links[0].key, Value::from("ann@y.org"));
    assert_eq!(output(&outcome.outputs, ORDERS, 1, ColumnId::new(0)), Value::from("ANN@Y.ORG"));
}

#[test]
fn membership_reads_the_other_tables_output() {
    let catalog = catalog();
    let decls = [
        RuleDecl::new(1)
            .column("Customers.Email")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Lowercase),
        RuleDecl::new(2)
            .column("Orders.CustomerEmail")
            .matching(MatcherDecl::InColumn(tabula_engine::ColumnRef::parse("Customers.Email")))
            .tag("customer"),
    ];
    let outcome = full_pass(&catalog, &index(&catalog, &decls));
    assert!(output(&outcome.outputs, ORDERS, 0, ColumnId::new(0)).has_tag("customer"));
    assert!(!output(&outcome.outputs, ORDERS, 2, ColumnId::new(0)).has_tag("customer"));
}

#[test]
fn shape_is_preserved() {
    let catalog = catalog();
    let outcome = full_pass(&catalog, &index(&catalog, &normalize_rules()));
    for input in catalog.iter() {
        let output = outcome.outputs.get(input.id()).unwrap();
        assert_eq!(output.row_count(), input.row_count());
        assert_eq!(output.columns(), input.columns());
    }
}

#[test]
fn passes_are_idempotent() {
    let catalog = catalog();
    let idx = index(&catalog, &normalize_rules());
    let first = full_pass(&catalog, &idx);
    let second = full_pass(&catalog, &idx);
    assert_eq!(first.outputs, second.outputs);
    assert_eq!(
        first.effects().collect::<Vec<_>>(),
        second.effects().collect::<Vec<_>>()
    );
}

#[test]
fn global_rule_effects_are_independent_per_table() {
    let mut catalog = catalog();
    catalog
        .get_mut(ORDERS)
        .unwrap()
        .rename_column(ColumnId::new(0), "Email")
        .unwrap();
    let idx = index(&catalog, &normalize_rules());
    let before = full_pass(&catalog, &idx);

    catalog
        .get_mut(ORDERS)
        .unwrap()
        .set(0, ColumnId::new(0), Value::from("OTHER@Q.COM"))
        .unwrap();
    let after = full_pass(&catalog, &idx);

    assert_eq!(before.outputs.get(CUSTOMERS), after.outputs.get(CUSTOMERS));
    let customer_effects = |o: &tabula_engine::PassOutcome| -> Vec<_> {
        o.effects()
            .filter(|e| e.table == CUSTOMERS)
            .map(|e| (e.row, e.rule, e.new.clone()))
            .collect()
    };
    assert_eq!(customer_effects(&before), customer_effects(&after));
    assert!(after.effects().any(|e| e.table == ORDERS && e.new.base() == &Value::from("other@q.com")));
}

#[test]
fn unresolved_rule_produces_no_effects() {
    let mut catalog = catalog();
    catalog.remove(ORDERS).unwrap();
    let mut decls = normalize_rules();
    decls.push(RuleDecl::new(3).column("Orders.CustomerEmail").glob("*").tag("x"));
    let idx = index(&catalog, &decls);
    let outcome = full_pass(&catalog, &idx);
    assert!(outcome.effects().all(|e| e.rule != RuleId::new(3)));
    assert_eq!(outcome.effects().filter(|e| e.rule == RuleId::new(2)).count(), 2);
    assert_eq!(idx.warnings().len(), 1);
}

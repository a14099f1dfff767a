//! Worked scenarios from composition through revert.

use tabula_engine::{
    CellAddr, Change, Diagnostic, EffectKind, MatcherDecl, RuleDecl, SkipReason, VersionedChange, Warning,
};
use tabula_foundation::{ColumnId, ErrorKind, RuleId, TableId, Value};
use tabula_runtime::{LoadMode, Session, SessionConfig};
use tabula_storage::Table;

use crate::common::{CUSTOMERS, EMAIL, ORDERS, cell, cleaning_rules, composition_rules, session, tables};

#[test]
fn replace_then_tag_compose() {
    let mut session = session(composition_rules());
    session.evaluate_all();

    let value = cell(&session, CUSTOMERS, 0, EMAIL);
    assert_eq!(value.base(), &Value::from("john@x.com"));
    assert!(value.has_tag("email"));

    let entries = session.provenance(CUSTOMERS, Some(0), Some(EMAIL));
    assert_eq!(entries.len(), 2);
    let replace = &entries[0].effect;
    assert_eq!(replace.rule, RuleId::new(1));
    assert_eq!(replace.kind, EffectKind::Replace);
    assert_eq!(replace.prior.base(), &Value::from("JOHN@X.COM"));
    assert_eq!(replace.new.base(), &Value::from("john@x.com"));
    let tag = &entries[1].effect;
    assert_eq!(tag.rule, RuleId::new(2));
    assert_eq!(tag.kind, EffectKind::Tag("email".into()));
    assert_eq!(tag.prior.base(), tag.new.base());
    assert!(entries[0].effect.tick < entries[1].effect.tick);
}

#[test]
fn unresolved_reference_leaves_other_rules_alone() {
    let mut session = Session::new();
    session.load_tables(
        [Table::new(CUSTOMERS, "Customers")
            .with_column("Email")
            .with_row(["JOHN@X.COM"])],
        LoadMode::Replace,
    );
    let mut rules = composition_rules();
    rules.push(
        RuleDecl::new(3)
            .column("Orders.CustomerEmail")
            .matching(MatcherDecl::Any)
            .tag("order"),
    );
    assert!(session.load_rules(rules, LoadMode::Replace).is_clean());

    let snapshot = session.evaluate_all();
    let warnings = snapshot.diagnostics.for_rule(RuleId::new(3));
    assert_eq!(warnings.len(), 1);
    assert!(matches!(warnings[0], Warning::UnresolvedReference { .. }));
    assert_eq!(session.change_log().by_rule(RuleId::new(3)).count(), 0);

    let value = cell(&session, CUSTOMERS, 0, ColumnId::new(0));
    assert_eq!(value.base(), &Value::from("john@x.com"));
    assert!(value.has_tag("email"));
}

#[test]
fn revert_keeps_tags_that_still_match() {
    let mut session = session(composition_rules());
    session.evaluate_all();
    let replace = session.provenance(CUSTOMERS, Some(0), Some(EMAIL))[0].id;

    session.revert(replace).unwrap();
    let value = cell(&session, CUSTOMERS, 0, EMAIL);
    assert_eq!(value.base(), &Value::from("JOHN@X.COM"));
    assert!(value.has_tag("email"));
    // Other rows are untouched.
    assert_eq!(cell(&session, CUSTOMERS, 1, EMAIL).base(), &Value::from(" ann@y.org "));
}

#[test]
fn revert_drops_tags_that_no_longer_match() {
    let mut rules = composition_rules();
    rules[1] = RuleDecl::new(2)
        .column("Email")
        .matching(MatcherDecl::Exact(Value::from("john@x.com")))
        .tag("known")
        .priority(2);
    let mut session = session(rules);
    session.evaluate_all();
    assert!(cell(&session, CUSTOMERS, 0, EMAIL).has_tag("known"));

    let replace = session.provenance(CUSTOMERS, Some(0), Some(EMAIL))[0].id;
    session.revert(replace).unwrap();
    let value = cell(&session, CUSTOMERS, 0, EMAIL);
    assert_eq!(value.base(), &Value::from("JOHN@X.COM"));
    assert!(!value.has_tag("known"));
    assert!(session.provenance(CUSTOMERS, Some(0), Some(EMAIL)).is_empty());
    assert!(
        session
            .suppressions()
            .contains(CellAddr::new(CUSTOMERS, 0, EMAIL), RuleId::new(1))
    );
}

#[test]
fn global_rules_apply_per_table_independently() {
    let mut session = session(composition_rules());
    session.evaluate_all();
    let customers = session.output(CUSTOMERS).unwrap().clone();

    session.load_tables(
        [Table::new(TableId::new(3), "Leads")
            .with_column("Email")
            .with_row(["LEAD@X.COM"])],
        LoadMode::Merge,
    );
    session.evaluate_all();

    assert_eq!(session.output(CUSTOMERS).unwrap(), &customers);
    let lead = cell(&session, TableId::new(3), 0, ColumnId::new(0));
    assert_eq!(lead.base(), &Value::from("lead@x.com"));
    assert!(lead.has_tag("email"));
}

#[test]
fn evaluate_all_is_idempotent() {
    let mut session = session(cleaning_rules());
    let first = session.evaluate_all();
    let canonical = session.change_log().canonical();
    let links = session.links().clone();

    let second = session.evaluate_all();
    assert_eq!(second.outputs, first.outputs);
    assert_eq!(session.change_log().canonical(), canonical);
    assert_eq!(session.links(), &links);
}

#[test]
fn type_mismatches_are_skipped_not_fatal() {
    let mut session = session(cleaning_rules());
    session.evaluate_all();
    assert!(cell(&session, ORDERS, 0, ColumnId::new(1)).has_tag("large"));
    assert!(!cell(&session, ORDERS, 1, ColumnId::new(1)).has_tag("large"));

    let skips = session.provenance(ORDERS, Some(2), Some(ColumnId::new(1)));
    assert_eq!(skips.len(), 1);
    assert!(matches!(
        skips[0].effect.kind,
        EffectKind::Skipped(SkipReason::TypeMismatch { .. })
    ));
    assert_eq!(session.skip_summary().get("type_mismatch"), Some(&1));
    assert!(matches!(
        session.revert(skips[0].id).unwrap_err().kind,
        ErrorKind::NotRevertible(_)
    ));
}

#[test]
fn cycles_are_reported_and_other_rules_still_run() {
    let mut rules = cleaning_rules();
    rules.push(
        RuleDecl::new(6)
            .column("Customers.Email")
            .matching(MatcherDecl::InColumn(tabula_engine::ColumnRef::parse(
                "Orders.CustomerEmail",
            )))
            .tag("ordered")
            .priority(2),
    );
    let mut session = session(rules);
    let snapshot = session.evaluate_all();

    assert_eq!(
        snapshot.diagnostics.top_level,
        vec![Diagnostic::CyclicLinkDependency {
            tables: vec![CUSTOMERS, ORDERS],
        }]
    );
    assert!(session.links().is_empty());
    assert_eq!(cell(&session, CUSTOMERS, 1, EMAIL).base(), &Value::from("ann@y.org"));
    assert!(!cell(&session, CUSTOMERS, 0, EMAIL).has_tag("ordered"));

    // Removing one side of the cycle brings cross-table rules back.
    session
        .evaluate_incremental(VersionedChange::new(1, Change::RuleRemoved(RuleId::new(6))))
        .unwrap();
    assert!(session.diagnostics().top_level.is_empty());
    assert_eq!(session.links().len(), 2);
    assert_eq!(session.skip_summary().get("cross_table_disabled"), None);
}

#[test]
fn cancelled_tables_catch_up_on_the_next_pass() {
    let mut session = Session::with_config(SessionConfig::fast());
    session.load_tables(tables(), LoadMode::Replace);
    session.load_rules(cleaning_rules(), LoadMode::Replace);

    session.cancel_token().cancel_table(ORDERS);
    let snapshot = session.evaluate_all();
    assert!(snapshot.cancelled.contains(&ORDERS));
    assert!(session.output(ORDERS).is_none());
    assert!(session.output(CUSTOMERS).is_some());
    assert_eq!(session.pending().tables(), [ORDERS].into());
    assert!(!session.cancel_token().is_cancelled(ORDERS));

    let delta = session
        .evaluate_incremental(VersionedChange::new(
            1,
            Change::CellEdited {
                table: CUSTOMERS,
                row: 2,
                column: ColumnId::new(0),
                value: Value::from("Bob"),
            },
        ))
        .unwrap();
    assert!(delta.cancelled.is_empty());
    assert!(session.pending().is_empty());
    assert_eq!(session.links().len(), 2);
    assert_eq!(cell(&session, ORDERS, 1, ColumnId::new(0)).base(), &Value::from("ann@y.org"));
}

#[test]
fn readers_rerun_when_a_cancelled_link_target_catches_up() {
    let mut session = session(cleaning_rules());
    session.evaluate_all();
    assert_eq!(session.links().len(), 2);

    session.cancel_token().cancel_table(CUSTOMERS);
    session
        .evaluate_incremental(VersionedChange::new(
            1,
            Change::CellEdited {
                table: CUSTOMERS,
                row: 2,
                column: EMAIL,
                value: Value::from("NOBODY@Z.NET"),
            },
        ))
        .unwrap();
    // Orders ran against the stale Customers output.
    assert_eq!(session.links().len(), 2);
    assert_eq!(session.pending().tables(), [CUSTOMERS].into());

    // A change elsewhere folds the pending scope and its readers back in.
    let notes = Table::new(TableId::new(3), "Notes").with_column("Text");
    session
        .evaluate_incremental(VersionedChange::new(2, Change::TableAdded(notes)))
        .unwrap();
    assert!(session.pending().is_empty());
    assert_eq!(session.links().len(), 3);
    assert!(session.links().iter().any(|l| l.source.row == 2 && l.target.row == 2));
}

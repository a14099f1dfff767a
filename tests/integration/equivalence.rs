//! Incremental re-evaluation agrees with evaluating from scratch.

use proptest::prelude::*;
use tabula_engine::{Change, RuleDecl, VersionedChange};
use tabula_foundation::{ColumnId, RuleId, TableId, Type, Value};
use tabula_runtime::{Session, SessionConfig};
use tabula_storage::Table;

use crate::common::{CUSTOMERS, ORDERS, cleaning_rules, session};

/// Evaluates the session's current inputs in a fresh session and checks
/// that outputs, provenance, and links match.
fn assert_matches_fresh(session: &Session) {
    let mut fresh = Session::from_state(session.state(), SessionConfig::default()).unwrap();
    fresh.evaluate_all();
    assert_eq!(session.outputs(), fresh.outputs());
    assert_eq!(session.change_log().canonical(), fresh.change_log().canonical());
    assert_eq!(session.links(), fresh.links());
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::from("JOHN@X.COM")),
        Just(Value::from(" ann@y.org")),
        Just(Value::from("bo@q.io")),
        Just(Value::from("250")),
        Just(Value::from("abc")),
        Just(Value::Null),
    ]
}

fn change_strategy() -> impl Strategy<Value = Change> {
    prop_oneof![
        4 => (prop_oneof![Just(CUSTOMERS), Just(ORDERS)], 0..3usize, 0..2u64, value_strategy()).prop_map(
            |(table, row, column, value)| Change::CellEdited {
                table,
                row,
                column: ColumnId::new(column),
                value,
            }
        ),
        1 => (0..5usize, any::<bool>()).prop_map(|(i, enabled)| {
            Change::RuleEdited(cleaning_rules().swap_remove(i).enabled(enabled))
        }),
    ]
}

fn cancel_strategy() -> impl Strategy<Value = Option<TableId>> {
    prop_oneof![
        3 => Just(None),
        1 => Just(Some(CUSTOMERS)),
        1 => Just(Some(ORDERS)),
    ]
}

/// Applies a change that touches nothing the rules read, so only pending
/// scopes are re-evaluated.
fn catch_up(session: &mut Session, version: u64) {
    let spare = Table::new(TableId::new(99), "Spare").with_column("Text");
    session
        .evaluate_incremental(VersionedChange::new(version, Change::TableAdded(spare)))
        .unwrap();
    assert!(session.pending().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn edits_match_full_evaluation(changes in prop::collection::vec(change_strategy(), 1..8)) {
        let mut session = session(cleaning_rules());
        session.evaluate_all();
        for (version, change) in changes.into_iter().enumerate() {
            session
                .evaluate_incremental(VersionedChange::new(version as u64 + 1, change))
                .unwrap();
        }
        assert_matches_fresh(&session);
    }

    #[test]
    fn cancelled_edits_match_full_evaluation(
        steps in prop::collection::vec((change_strategy(), cancel_strategy()), 1..8),
    ) {
        let mut session = session(cleaning_rules());
        session.evaluate_all();
        let mut version = 0;
        for (change, cancel) in steps {
            if let Some(table) = cancel {
                session.cancel_token().cancel_table(table);
            }
            version += 1;
            session
                .evaluate_incremental(VersionedChange::new(version, change))
                .unwrap();
        }
        catch_up(&mut session, version + 1);
        assert_matches_fresh(&session);
    }
}

#[test]
fn schema_changes_match_full_evaluation() {
    let changes = [
        Change::ColumnRenamed {
            table: ORDERS,
            column: ColumnId::new(0),
            name: "Email".into(),
        },
        Change::ColumnAdded {
            table: CUSTOMERS,
            name: "Phone".into(),
            ty: Type::Any,
        },
        Change::TableAdded(
            Table::new(TableId::new(3), "Leads")
                .with_column("Email")
                .with_row([" LEAD@X.COM "]),
        ),
        Change::ColumnRemoved {
            table: CUSTOMERS,
            column: ColumnId::new(1),
        },
        Change::TableRemoved(TableId::new(3)),
    ];

    let mut session = session(cleaning_rules());
    session.evaluate_all();
    for (version, change) in changes.into_iter().enumerate() {
        session
            .evaluate_incremental(VersionedChange::new(version as u64 + 1, change))
            .unwrap();
        assert_matches_fresh(&session);
    }
}

#[test]
fn rule_changes_match_full_evaluation() {
    let mut session = session(cleaning_rules());
    session.evaluate_all();

    let added = RuleDecl::new(9).column("Name").glob("J*").tag("j");
    session
        .evaluate_incremental(VersionedChange::new(1, Change::RuleAdded(added)))
        .unwrap();
    assert_matches_fresh(&session);

    session
        .evaluate_incremental(VersionedChange::new(2, Change::RuleRemoved(RuleId::new(4))))
        .unwrap();
    assert!(session.links().is_empty());
    assert_matches_fresh(&session);
}

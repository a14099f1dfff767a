//! Shared fixtures.

use tabula_engine::{MatcherDecl, RuleDecl, TransformDecl};
use tabula_foundation::{ColumnId, TableId, Value};
use tabula_runtime::{LoadMode, Session};
use tabula_storage::Table;

pub const CUSTOMERS: TableId = TableId::new(1);
pub const ORDERS: TableId = TableId::new(2);
pub const EMAIL: ColumnId = ColumnId::new(1);

pub fn tables() -> Vec<Table> {
    vec![
        Table::new(CUSTOMERS, "Customers")
            .with_column("Name")
            .with_column("Email")
            .with_row(["John", "JOHN@X.COM"])
            .with_row(["Ann", " ann@y.org "])
            .with_row(["Bo", "n/a"]),
        Table::new(ORDERS, "Orders")
            .with_column("CustomerEmail")
            .with_column("Total")
            .with_row(["john@x.com", "120"])
            .with_row(["ANN@Y.ORG", "15"])
            .with_row(["nobody@z.net", "abc"]),
    ]
}

/// Lowercase, then tag, on every `Email` column.
pub fn composition_rules() -> Vec<RuleDecl> {
    vec![
        RuleDecl::new(1)
            .column("Email")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Lowercase)
            .priority(1),
        RuleDecl::new(2).column("Email").glob("*@*").tag("email").priority(2),
    ]
}

/// Cleans both tables and links orders to customers.
pub fn cleaning_rules() -> Vec<RuleDecl> {
    vec![
        RuleDecl::new(1)
            .column("Email")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Trim),
        RuleDecl::new(2)
            .column("Email")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Lowercase)
            .priority(1),
        RuleDecl::new(3)
            .column("Orders.CustomerEmail")
            .matching(MatcherDecl::Any)
            .replace(TransformDecl::Lowercase),
        RuleDecl::new(4)
            .column("Orders.CustomerEmail")
            .matching(MatcherDecl::Any)
            .link("Customers.Email")
            .priority(1),
        RuleDecl::new(5)
            .column("Orders.Total")
            .matching(MatcherDecl::Compare {
                op: tabula_engine::CompareOp::Gt,
                value: 100.0,
            })
            .tag("large"),
    ]
}

pub fn session(rules: Vec<RuleDecl>) -> Session {
    let mut session = Session::new();
    session.load_tables(tables(), LoadMode::Replace);
    let report = session.load_rules(rules, LoadMode::Replace);
    assert!(report.is_clean(), "{:?}", report.rejected);
    session
}

pub fn cell(session: &Session, table: TableId, row: usize, column: ColumnId) -> Value {
    session.output(table).unwrap().get(row, column).unwrap().clone()
}

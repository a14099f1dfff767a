//! Shared fixtures.

use std::sync::Arc;

use tabula_engine::{CancelToken, PassOutcome, PassRequest, Rule, RuleCompiler, RuleDecl, RuleIndex, Suppressions, run_pass};
use tabula_foundation::TableId;
use tabula_storage::{Catalog, Table};

pub const CUSTOMERS: TableId = TableId::new(1);
pub const ORDERS: TableId = TableId::new(2);

pub fn catalog() -> Catalog {
    Catalog::from_tables([
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
            .with_row(["ann@y.org", "15"])
            .with_row(["nobody@z.net", "abc"]),
    ])
}

pub fn compile(decls: &[RuleDecl]) -> Vec<Arc<Rule>> {
    decls
        .iter()
        .enumerate()
        .map(|(i, d)| Arc::new(RuleCompiler::compile(d, i as u64).unwrap()))
        .collect()
}

pub fn index(catalog: &Catalog, decls: &[RuleDecl]) -> RuleIndex {
    RuleIndex::build(&compile(decls), catalog)
}

pub fn full_pass(catalog: &Catalog, index: &RuleIndex) -> PassOutcome {
    let previous = Catalog::new();
    let suppressed = Suppressions::new();
    let cancel = CancelToken::new();
    run_pass(&PassRequest::new(catalog, &previous, index, &suppressed, &cancel))
}

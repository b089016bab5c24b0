//! Source tables of a query, read off the engine while it compiles.
//!
//! The authorizer sees one `SQLITE_READ` per column the statement reads,
//! tagged with the column's table. A statement that consumes rows without
//! reading a column (`SELECT count(*) FROM items`) still reports the table,
//! with an empty column name. Expression-only queries report nothing.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::{Connection, Statement};

use crate::error::Result;
use crate::statement::prepare_single;

/// Compile `sql` and collect the tables it reads.
///
/// Compilation bypasses the statement cache, since a cache hit would not run
/// the authorizer.
pub fn compile_tracked<'c>(conn: &'c Connection, sql: &str) -> Result<(Statement<'c>, BTreeSet<String>)> {
    let seen = Arc::new(Mutex::new(BTreeSet::new()));
    let sink = AssertUnwindSafe(Arc::clone(&seen));
    conn.authorizer(Some(move |ctx: AuthContext<'_>| {
        if let AuthAction::Read { table_name, .. } = ctx.action {
            sink.lock().insert(table_name.to_string());
        }
        Authorization::Allow
    }));
    let compiled = prepare_single(conn, sql);
    conn.authorizer(None::<fn(AuthContext<'_>) -> Authorization>);

    let stmt = compiled?;
    let tables = std::mem::take(&mut *seen.lock());
    Ok((stmt, tables))
}

//! ChangeTracker: which tables the current transaction touched.
//!
//! Three engine hooks feed one shared state:
//!
//! - the update hook adds the modified table to the pending set;
//! - the rollback hook discards the pending set;
//! - the commit hook moves a non-empty pending set onto the committed queue.
//!
//! The hooks run on whichever thread performed the write. The committed
//! queue is drained later by the control thread, so the `parking_lot::Mutex`
//! around the state is the only handoff between the two.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::hooks::Action;
use rusqlite::Connection;

/// Table names modified by one transaction.
pub type ChangeSet = BTreeSet<String>;

#[derive(Default)]
struct ChangeState {
    pending: ChangeSet,
    committed: VecDeque<ChangeSet>,
}

#[derive(Clone, Default)]
pub struct ChangeTracker {
    state: Arc<Mutex<ChangeState>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the hooks on `conn`, replacing any installed before.
    pub fn attach(&self, conn: &Connection) {
        let state = Arc::clone(&self.state);
        conn.update_hook(Some(move |_action: Action, _db: &str, table: &str, _rowid: i64| {
            let mut st = state.lock();
            if !st.pending.contains(table) {
                st.pending.insert(table.to_string());
            }
        }));

        let state = Arc::clone(&self.state);
        conn.rollback_hook(Some(move || {
            state.lock().pending.clear();
        }));

        let state = Arc::clone(&self.state);
        conn.commit_hook(Some(move || {
            let mut st = state.lock();
            if !st.pending.is_empty() {
                let batch = std::mem::take(&mut st.pending);
                st.committed.push_back(batch);
            }
            // Returning true would turn the commit into a rollback.
            false
        }));
    }

    pub fn detach(&self, conn: &Connection) {
        conn.update_hook(None::<fn(Action, &str, &str, i64)>);
        conn.rollback_hook(None::<fn()>);
        conn.commit_hook(None::<fn() -> bool>);
    }

    /// Oldest committed batch not yet delivered.
    pub fn pop_committed(&self) -> Option<ChangeSet> {
        self.state.lock().committed.pop_front()
    }

    /// Tables touched by the transaction still in progress.
    pub fn pending(&self) -> ChangeSet {
        self.state.lock().pending.clone()
    }

    /// Replace the pending set with an earlier [`pending`](Self::pending)
    /// snapshot, dropping tables written since.
    pub fn restore(&self, snapshot: ChangeSet) {
        self.state.lock().pending = snapshot;
    }

    pub fn has_committed(&self) -> bool {
        !self.state.lock().committed.is_empty()
    }

    pub fn clear(&self) {
        let mut st = self.state.lock();
        st.pending.clear();
        st.committed.clear();
    }
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("ChangeTracker")
            .field("pending", &st.pending)
            .field("committed", &st.committed.len())
            .finish()
    }
}

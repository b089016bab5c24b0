//! Database: the connection, its change tracker and its live queries.
//!
//! The connection sits in a `parking_lot::ReentrantMutex<RefCell<Connection>>`
//! so that `transaction()` can hold the lock while its closure, or a live
//! query callback, re-enters the handle on the same thread.
//!
//! Deliveries happen on the control thread, the thread that opened the
//! handle. Writes from other threads still record their commits; the batches
//! wait until the control thread next calls into the handle or calls
//! [`Database::flush`].

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, ReentrantMutex};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec;
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::reactive::dependencies::compile_tracked;
use crate::reactive::live::{LiveQuery, Liveness, SharedRegistry};
use crate::reactive::{ChangeTracker, SubscriptionId, SubscriptionRegistry};
use crate::statement::{CursorState, PreparedStatement};

pub struct Database {
    conn: ReentrantMutex<RefCell<Connection>>,
    path: Option<PathBuf>,
    config: DatabaseConfig,
    tracker: ChangeTracker,
    registry: SharedRegistry,
    control_thread: ThreadId,
    delivering: AtomicBool,
    /// New subscriptions still owed their first value.
    deferred: Mutex<Vec<SubscriptionId>>,
}

impl Database {
    // -----------------------------------------------------------------------
    // Open / close
    // -----------------------------------------------------------------------

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, DatabaseConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::from_connection(conn, Some(path.to_path_buf()), config)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(DatabaseConfig::default())
    }

    pub fn open_in_memory_with(config: DatabaseConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None, config)
    }

    /// A private on-disk database that the engine deletes when it closes.
    pub fn temporary() -> Result<Self> {
        let conn = Connection::open("")?;
        Self::from_connection(conn, None, DatabaseConfig::default())
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>, config: DatabaseConfig) -> Result<Self> {
        conn.busy_timeout(config.busy_timeout)?;
        conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
        if let Some(mode) = config.journal_mode {
            let applied: String =
                conn.pragma_update_and_check(None, "journal_mode", mode.as_str(), |row| row.get(0))?;
            tracing::debug!(requested = mode.as_str(), applied = %applied, "journal mode set");
        }

        let tracker = ChangeTracker::new();
        tracker.attach(&conn);
        tracing::debug!(path = ?path, "database opened");

        Ok(Self {
            conn: ReentrantMutex::new(RefCell::new(conn)),
            path,
            config,
            tracker,
            registry: Arc::new(Mutex::new(SubscriptionRegistry::new())),
            control_thread: thread::current().id(),
            delivering: AtomicBool::new(false),
            deferred: Mutex::new(Vec::new()),
        })
    }

    /// Cancel every subscription, detach the hooks and close the connection.
    pub fn close(self) -> Result<()> {
        let Database {
            conn,
            path,
            tracker,
            registry,
            ..
        } = self;

        let callbacks = registry.lock().drain();
        drop(callbacks);

        let conn = conn.into_inner().into_inner();
        tracker.detach(&conn);
        tracker.clear();
        tracing::debug!(path = ?path, "database closed");
        conn.close().map_err(|(_, e)| e.into())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.lock().len()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Run `sql` for its effect, stepping through any rows it returns.
    pub fn execute<P: Serialize + ?Sized>(&self, sql: &str, params: &P) -> Result<()> {
        self.with_conn(|conn| {
            let mut stmt = PreparedStatement::compile(conn, sql, params, self.config.bool_encoding)?;
            let mut cursor = stmt.execute()?;
            while cursor.state() == CursorState::HasRow {
                cursor.step()?;
            }
            Ok(())
        })?;
        self.deliver_pending(false);
        Ok(())
    }

    /// Run several `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| Ok(conn.execute_batch(sql)?))?;
        self.deliver_pending(false);
        Ok(())
    }

    /// Run `sql` once and decode its result as `T`.
    ///
    /// Records decode from the first row, sequences from every row, and
    /// `Option<T>` is `None` when there is no row.
    pub fn decode<T, P>(&self, sql: &str, params: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let value = self.with_conn(|conn| {
            let mut stmt = PreparedStatement::compile(conn, sql, params, self.config.bool_encoding)?;
            let mut cursor = stmt.execute()?;
            let value = codec::decode_rows(&mut cursor)?;
            Ok(value)
        })?;
        self.deliver_pending(false);
        Ok(value)
    }

    /// Prepare a live query. Its dependency set holds every table the engine
    /// reports reading while compiling `sql`.
    pub fn live<T, P>(&self, sql: &str, params: &P) -> Result<LiveQuery<'_, T>>
    where
        T: DeserializeOwned + Send + 'static,
        P: Serialize + ?Sized,
    {
        let (bindings, tables) = self.with_conn(|conn| {
            let (stmt, tables) = compile_tracked(conn, sql)?;
            let bindings =
                codec::encode_params(params, stmt.parameter_count(), sql, self.config.bool_encoding)?;
            Ok((bindings, tables))
        })?;
        self.deliver_pending(false);
        Ok(LiveQuery::new(self, sql, bindings, tables))
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`. Nested calls use savepoints.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        thread_local! {
            static SP_COUNTER: Cell<u64> = const { Cell::new(0) };
        }

        let result = {
            // Held for the whole closure so other threads cannot interleave.
            let guard = self.conn.lock();
            let outermost = guard.borrow().is_autocommit();
            let (begin, commit, rollback) = if outermost {
                ("BEGIN".to_string(), "COMMIT".to_string(), "ROLLBACK".to_string())
            } else {
                let name = SP_COUNTER.with(|c| {
                    let n = c.get();
                    c.set(n + 1);
                    format!("sp_{n}")
                });
                (
                    format!("SAVEPOINT {name}"),
                    format!("RELEASE SAVEPOINT {name}"),
                    format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"),
                )
            };

            // ROLLBACK TO does not fire the rollback hook, so a savepoint
            // puts the pending tables back by hand.
            let snapshot = (!outermost).then(|| self.tracker.pending());
            let undo = || {
                let _ = guard.borrow().execute_batch(&rollback);
                if let Some(tables) = &snapshot {
                    self.tracker.restore(tables.clone());
                }
            };

            guard.borrow().execute_batch(&begin)?;
            match f(self) {
                Ok(value) => match guard.borrow().execute_batch(&commit) {
                    Ok(()) => Ok(value),
                    Err(e) => {
                        undo();
                        Err(e.into())
                    }
                },
                Err(e) => {
                    undo();
                    Err(e)
                }
            }
        };

        self.deliver_pending(false);
        result
    }

    /// Deliver every committed batch to the live queries it overlaps.
    ///
    /// Only the control thread delivers; a call from any other thread logs a
    /// warning and leaves the batches queued.
    pub fn flush(&self) {
        self.deliver_pending(true);
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        f(&*conn)
    }

    fn deliver_pending(&self, explicit: bool) {
        if thread::current().id() != self.control_thread {
            if explicit {
                tracing::warn!(
                    thread = ?thread::current().id(),
                    "flush called off the control thread; deliveries stay queued"
                );
            }
            return;
        }
        // The outer commit delivers; never show callbacks uncommitted rows.
        if !self.with_conn(|conn| Ok(conn.is_autocommit())).unwrap_or(false) {
            return;
        }
        // Nested flush from a callback: the running pass drains the queue.
        if self.delivering.swap(true, Ordering::AcqRel) {
            return;
        }

        loop {
            let first = std::mem::take(&mut *self.deferred.lock());
            let batch = self.tracker.pop_committed();
            if first.is_empty() && batch.is_none() {
                break;
            }
            for &id in &first {
                self.redeliver(id);
            }
            // A first delivery already reflects this batch.
            if let Some(changes) = batch {
                let ids = self.registry.lock().overlapping(&changes);
                tracing::trace!(tables = ?changes, subscriptions = ids.len(), "delivering commit batch");
                for id in ids.into_iter().filter(|id| !first.contains(id)) {
                    self.redeliver(id);
                }
            }
        }

        self.delivering.store(false, Ordering::Release);
    }

    /// Queue the first delivery of a new subscription and deliver it now if
    /// this is the control thread outside a transaction.
    pub(crate) fn deliver_first(&self, id: SubscriptionId) {
        self.deferred.lock().push(id);
        self.deliver_pending(false);
    }

    /// Run one subscription's callback and re-arm it unless it finished,
    /// panicked or was cancelled meanwhile.
    fn redeliver(&self, id: SubscriptionId) {
        let checked_out = self.registry.lock().checkout(id);
        let Some(mut callback) = checked_out else {
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(self)));
        let leftover = match outcome {
            Ok(Liveness::Continue) => self.registry.lock().checkin(id, callback),
            Ok(Liveness::Finished) => {
                let _ = self.registry.lock().unregister(id);
                Some(callback)
            }
            Err(_) => {
                tracing::warn!(?id, "live query callback panicked; subscription cancelled");
                let _ = self.registry.lock().unregister(id);
                Some(callback)
            }
        };
        // Dropped outside the registry lock.
        drop(leftover);
    }

    /// Re-run a live query through the statement cache.
    pub(crate) fn decode_cached<T: DeserializeOwned>(&self, sql: &str, bindings: &[SqlValue]) -> Result<T> {
        self.with_conn(|conn| {
            let mut stmt = PreparedStatement::compile_cached(conn, sql, bindings.to_vec())?;
            let mut cursor = stmt.reset()?;
            let value = codec::decode_rows(&mut cursor)?;
            Ok(value)
        })
    }

    pub(crate) fn registry(&self) -> &SharedRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

//! Live queries: a query whose decoded result is delivered again after every
//! commit that touches one of its source tables.
//!
//! ```no_run
//! # use sqlite_live::{Database, LiveEvent};
//! # fn main() -> sqlite_live::Result<()> {
//! let db = Database::open_in_memory()?;
//! db.execute_batch("CREATE TABLE items (name TEXT)")?;
//!
//! let sub = db.live::<i64, _>("SELECT count(*) FROM items", &())?.subscribe(|event| {
//!     if let LiveEvent::Value(count) = event {
//!         println!("{count} items");
//!     }
//! });
//! db.execute("INSERT INTO items VALUES (?)", &("pen",))?; // prints "1 items"
//! sub.cancel();
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use serde::de::DeserializeOwned;

use crate::database::Database;
use crate::error::{Error, Result};

use super::registry::{SubscriptionId, SubscriptionRegistry, SubscriptionState};

// ============================================================================
// Delivery plumbing shared with Database
// ============================================================================

/// What a delivery callback tells the flush loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    Continue,
    Finished,
}

pub(crate) type Redeliver = Box<dyn FnMut(&Database) -> Liveness + Send>;

pub(crate) type SharedRegistry = Arc<Mutex<SubscriptionRegistry<Redeliver>>>;

// ============================================================================
// LiveEvent
// ============================================================================

#[derive(Debug)]
pub enum LiveEvent<T> {
    /// A fresh decode of the query.
    Value(T),
    /// The result no longer decodes as `T`; nothing more will be delivered.
    Finished,
    /// The engine failed while re-running the query; nothing more will be
    /// delivered.
    Failed(Error),
}

// ============================================================================
// LiveQuery
// ============================================================================

/// A compiled, bound live query that has not been subscribed yet.
pub struct LiveQuery<'db, T> {
    db: &'db Database,
    sql: Arc<str>,
    bindings: Vec<SqlValue>,
    dependencies: BTreeSet<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<'db, T> LiveQuery<'db, T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(
        db: &'db Database,
        sql: &str,
        bindings: Vec<SqlValue>,
        dependencies: BTreeSet<String>,
    ) -> Self {
        Self {
            db,
            sql: Arc::from(sql),
            bindings,
            dependencies,
            _marker: PhantomData,
        }
    }

    /// Add tables the engine cannot see through, e.g. ones only reached from
    /// a view or a trigger.
    pub fn depends_on<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(tables.into_iter().map(Into::into));
        self
    }

    /// Tables whose commits trigger a redelivery.
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Register `sink` and deliver the first value to it.
    ///
    /// On the control thread outside a transaction the first value arrives
    /// before this returns. Otherwise the subscription stays
    /// [`Pending`](SubscriptionState::Pending) until the next delivery pass
    /// on the control thread, which runs after the outermost commit.
    pub fn subscribe<F>(self, mut sink: F) -> Subscription
    where
        F: FnMut(LiveEvent<T>) + Send + 'static,
    {
        let LiveQuery {
            db,
            sql,
            bindings,
            dependencies,
            ..
        } = self;

        let query = Arc::clone(&sql);
        let deliver: Redeliver = Box::new(move |db: &Database| {
            match db.decode_cached::<T>(&query, &bindings) {
                Ok(value) => {
                    sink(LiveEvent::Value(value));
                    Liveness::Continue
                }
                Err(e) if e.is_decode_failure() => {
                    tracing::debug!(sql = %query, error = %e, "live query no longer decodes");
                    sink(LiveEvent::Finished);
                    Liveness::Finished
                }
                Err(e) => {
                    tracing::error!(sql = %query, error = %e, "live query redelivery failed");
                    sink(LiveEvent::Failed(e));
                    Liveness::Finished
                }
            }
        });

        let id = db.registry().lock().register(dependencies, deliver);
        tracing::debug!(?id, sql = %sql, "live query subscribed");
        db.deliver_first(id);

        Subscription {
            registry: Arc::downgrade(db.registry()),
            id,
        }
    }

    /// Subscribe through an unbounded channel.
    ///
    /// The stream yields `Ok` per delivery, one `Err` if the engine fails,
    /// and ends when the result stops decoding or the stream is dropped.
    pub fn into_stream(self) -> LiveStream<T> {
        let (tx, rx) = mpsc::unbounded();
        let subscription = self.subscribe(move |event| match event {
            LiveEvent::Value(value) => {
                let _ = tx.unbounded_send(Ok(value));
            }
            LiveEvent::Finished => tx.close_channel(),
            LiveEvent::Failed(e) => {
                let _ = tx.unbounded_send(Err(e));
                tx.close_channel();
            }
        });
        LiveStream {
            receiver: rx,
            subscription,
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle to a registered live query. Dropping it cancels the subscription.
pub struct Subscription {
    registry: Weak<Mutex<SubscriptionRegistry<Redeliver>>>,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn state(&self) -> SubscriptionState {
        match self.registry.upgrade() {
            Some(registry) => registry.lock().state(self.id),
            None => SubscriptionState::Cancelled,
        }
    }

    /// Stop further deliveries. A delivery already running finishes, but its
    /// subscription is not re-armed.
    pub fn cancel(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let callback = {
            let mut reg = registry.lock();
            if !reg.is_live(self.id) {
                return;
            }
            reg.unregister(self.id)
        };
        tracing::debug!(id = ?self.id, "live query cancelled");
        drop(callback);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// LiveStream
// ============================================================================

pub struct LiveStream<T> {
    receiver: mpsc::UnboundedReceiver<Result<T>>,
    subscription: Subscription,
}

impl<T> LiveStream<T> {
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn cancel(&self) {
        self.subscription.cancel();
    }
}

impl<T> Stream for LiveStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

//! Subscription lifecycle and commit-driven redelivery.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use sqlite_live::{Database, LiveEvent, Subscription, SubscriptionState};

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, PartialEq)]
enum Seen<T> {
    Value(T),
    Finished,
    Failed,
}

type Log<T> = Arc<Mutex<Vec<Seen<T>>>>;

fn recorder<T: Send + 'static>() -> (Log<T>, impl FnMut(LiveEvent<T>) + Send + 'static) {
    let log: Log<T> = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let log = Arc::clone(&log);
        move |event| {
            log.lock().push(match event {
                LiveEvent::Value(v) => Seen::Value(v),
                LiveEvent::Finished => Seen::Finished,
                LiveEvent::Failed(_) => Seen::Failed,
            })
        }
    };
    (log, sink)
}

fn counts(log: &Log<i64>) -> Vec<i64> {
    log.lock()
        .iter()
        .filter_map(|seen| match seen {
            Seen::Value(v) => Some(*v),
            _ => None,
        })
        .collect()
}

fn items_db() -> Database {
    let db = Database::open_in_memory().expect("open in-memory database");
    db.execute_batch(
        "CREATE TABLE items (name TEXT, qty INTEGER);
         CREATE TABLE other (x INTEGER);
         CREATE TABLE audit (x INTEGER);",
    )
    .expect("create tables");
    db
}

fn count_items(db: &Database) -> (Log<i64>, Subscription) {
    let (log, sink) = recorder();
    let sub = db
        .live::<i64, _>("SELECT count(*) FROM items", &())
        .unwrap()
        .subscribe(sink);
    (log, sub)
}

// ============================================================================
// Delivery
// ============================================================================

#[test]
fn first_value_is_delivered_on_subscribe() {
    let db = items_db();
    let (log, sub) = count_items(&db);
    assert_eq!(counts(&log), [0]);
    assert_eq!(sub.state(), SubscriptionState::Active);
    assert_eq!(db.subscription_count(), 1);
}

#[test]
fn dependencies_come_from_the_compiled_query() {
    let db = items_db();
    let query = db
        .live::<Vec<String>, _>(
            "SELECT name FROM items WHERE qty > (SELECT count(*) FROM other)",
            &(),
        )
        .unwrap();
    let expected: BTreeSet<String> = ["items", "other"].into_iter().map(String::from).collect();
    assert_eq!(query.dependencies(), &expected);
}

#[test]
fn each_commit_redelivers_once() {
    let db = items_db();
    let (log, _sub) = count_items(&db);

    db.execute("INSERT INTO items VALUES ('a', 1), ('b', 2), ('c', 3)", &())
        .unwrap();
    db.execute("INSERT INTO items VALUES (?, ?)", &("d", 4)).unwrap();
    assert_eq!(counts(&log), [0, 3, 4]);
}

#[test]
fn unrelated_commits_are_ignored() {
    let db = items_db();
    let (log, _sub) = count_items(&db);

    db.execute("INSERT INTO other VALUES (1)", &()).unwrap();
    assert_eq!(counts(&log), [0]);
}

#[test]
fn transaction_delivers_once_after_commit() {
    let db = items_db();
    let (log, _sub) = count_items(&db);

    db.transaction(|db| {
        db.execute("INSERT INTO items VALUES ('a', 1)", &())?;
        db.execute("INSERT INTO items VALUES ('b', 2)", &())?;
        assert_eq!(counts(&log), [0], "nothing is delivered while the transaction is open");
        Ok(())
    })
    .unwrap();
    assert_eq!(counts(&log), [0, 2]);
}

#[test]
fn rolled_back_writes_deliver_nothing() {
    let db = items_db();
    let (log, _sub) = count_items(&db);

    let result: sqlite_live::Result<()> = db.transaction(|db| {
        db.execute("INSERT INTO items VALUES ('a', 1)", &())?;
        db.execute("INSERT INTO nowhere VALUES (1)", &())
    });
    assert!(result.is_err());
    assert_eq!(counts(&log), [0]);

    // The discarded batch does not leak into the next commit.
    db.execute("INSERT INTO other VALUES (1)", &()).unwrap();
    assert_eq!(counts(&log), [0]);
}

#[test]
fn rolled_back_savepoint_drops_its_tables_from_the_outer_commit() {
    let db = items_db();
    let (items, _items_sub) = count_items(&db);
    let (others, sink) = recorder();
    let _others_sub = db
        .live::<i64, _>("SELECT count(*) FROM other", &())
        .unwrap()
        .subscribe(sink);

    db.transaction(|db| {
        db.execute("INSERT INTO other VALUES (1)", &())?;
        let inner: sqlite_live::Result<()> = db.transaction(|db| {
            db.execute("INSERT INTO items VALUES ('a', 1)", &())?;
            db.execute("INSERT INTO nowhere VALUES (1)", &())
        });
        assert!(inner.is_err());
        Ok(())
    })
    .unwrap();

    assert_eq!(counts(&items), [0]);
    assert_eq!(counts(&others), [0, 1]);
}

#[test]
fn subscribing_inside_a_transaction_waits_for_the_commit() {
    let db = items_db();
    let (log, sub) = db
        .transaction(|db| {
            db.execute("INSERT INTO items VALUES ('a', 1)", &())?;
            let (log, sub) = count_items(db);
            assert!(counts(&log).is_empty(), "uncommitted rows are never delivered");
            assert_eq!(sub.state(), SubscriptionState::Pending);
            Ok((log, sub))
        })
        .unwrap();

    assert_eq!(counts(&log), [1], "one delivery for the subscription and the commit");
    assert_eq!(sub.state(), SubscriptionState::Active);
}

#[test]
fn expression_only_query_is_inert_until_told_its_tables() {
    let db = items_db();

    let (inert, sink) = recorder::<i64>();
    let query = db.live::<i64, _>("SELECT 1 + ?", &(1,)).unwrap();
    assert!(query.dependencies().is_empty());
    let _inert_sub = query.subscribe(sink);

    let (explicit, sink) = recorder::<i64>();
    let _explicit_sub = db
        .live::<i64, _>("SELECT 1 + ?", &(1,))
        .unwrap()
        .depends_on(["items"])
        .subscribe(sink);

    db.execute("INSERT INTO items VALUES ('a', 1)", &()).unwrap();
    assert_eq!(counts(&inert), [2]);
    assert_eq!(counts(&explicit), [2, 2]);
}

#[test]
fn bound_parameters_are_reused_on_redelivery() {
    let db = items_db();
    let (log, sink) = recorder::<Vec<String>>();
    let _sub = db
        .live::<Vec<String>, _>("SELECT name FROM items WHERE qty >= ? ORDER BY name", &5)
        .unwrap()
        .subscribe(sink);

    db.execute("INSERT INTO items VALUES ('small', 1), ('big', 9)", &()).unwrap();
    let log = log.lock();
    assert_eq!(
        *log,
        [Seen::Value(vec![]), Seen::Value(vec!["big".to_string()])]
    );
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn cancel_stops_deliveries() {
    let db = items_db();
    let (log, sub) = count_items(&db);

    sub.cancel();
    assert_eq!(sub.state(), SubscriptionState::Cancelled);
    db.execute("INSERT INTO items VALUES ('a', 1)", &()).unwrap();
    assert_eq!(counts(&log), [0]);
    assert_eq!(db.subscription_count(), 0);

    // A second cancel is a no-op.
    sub.cancel();
}

#[test]
fn dropping_the_handle_cancels() {
    let db = items_db();
    let (log, sub) = count_items(&db);
    drop(sub);

    db.execute("INSERT INTO items VALUES ('a', 1)", &()).unwrap();
    assert_eq!(counts(&log), [0]);
    assert_eq!(db.subscription_count(), 0);
}

#[test]
fn callback_may_cancel_another_subscription_mid_pass() {
    let db = items_db();
    let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let (first, mut record) = recorder::<i64>();
    let _canceller = {
        let victim = Arc::clone(&victim);
        db.live::<i64, _>("SELECT count(*) FROM items", &())
            .unwrap()
            .subscribe(move |event| {
                record(event);
                let taken = victim.lock().take();
                drop(taken);
            })
    };
    let (second, sub) = count_items(&db);
    *victim.lock() = Some(sub);

    db.execute("INSERT INTO items VALUES ('a', 1)", &()).unwrap();
    db.execute("INSERT INTO items VALUES ('b', 2)", &()).unwrap();
    assert_eq!(counts(&first), [0, 1, 2]);
    assert_eq!(counts(&second), [0]);
    assert_eq!(db.subscription_count(), 1);
}

#[test]
fn panicking_callback_is_cancelled_and_others_still_run() {
    let db = items_db();
    let panicky = db
        .live::<i64, _>("SELECT count(*) FROM items", &())
        .unwrap()
        .subscribe(|event| {
            if let LiveEvent::Value(n) = event {
                assert_eq!(n, 0, "boom");
            }
        });
    let (log, _sub) = count_items(&db);

    db.execute("INSERT INTO items VALUES ('a', 1)", &()).unwrap();
    assert_eq!(panicky.state(), SubscriptionState::Cancelled);
    assert_eq!(counts(&log), [0, 1]);

    db.execute("INSERT INTO items VALUES ('b', 2)", &()).unwrap();
    assert_eq!(counts(&log), [0, 1, 2]);
}

// ============================================================================
// Termination
// ============================================================================

#[test]
fn result_that_stops_decoding_finishes_the_subscription() {
    let db = items_db();
    db.execute("INSERT INTO items VALUES ('a', 1)", &()).unwrap();

    let (log, sink) = recorder::<i64>();
    let sub = db
        .live::<i64, _>("SELECT max(qty) FROM items", &())
        .unwrap()
        .subscribe(sink);

    // max() over no rows is NULL, which an i64 cannot hold.
    db.execute("DELETE FROM items WHERE qty > 0", &()).unwrap();
    assert_eq!(*log.lock(), [Seen::Value(1), Seen::Finished]);
    assert_eq!(sub.state(), SubscriptionState::Cancelled);

    db.execute("INSERT INTO items VALUES ('b', 2)", &()).unwrap();
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn engine_failure_on_redelivery_fails_the_subscription() {
    let db = items_db();
    let (log, sink) = recorder::<i64>();
    let sub = db
        .live::<i64, _>("SELECT count(*) FROM items", &())
        .unwrap()
        .depends_on(["audit"])
        .subscribe(sink);

    db.execute_batch("DROP TABLE items").unwrap();
    db.execute("INSERT INTO audit VALUES (1)", &()).unwrap();

    assert_eq!(*log.lock(), [Seen::Value(0), Seen::Failed]);
    assert_eq!(sub.state(), SubscriptionState::Cancelled);
}

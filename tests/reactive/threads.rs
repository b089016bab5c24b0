//! Writes from other threads are delivered on the control thread only.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use sqlite_live::{Database, LiveEvent};

fn open(dir: &tempfile::TempDir) -> Database {
    let db = Database::open(dir.path().join("threads.db")).expect("open database");
    db.execute_batch("CREATE TABLE jobs (id INTEGER PRIMARY KEY, done INTEGER NOT NULL)")
        .expect("create table");
    db
}

fn watch_jobs(db: &Database) -> (Arc<Mutex<Vec<i64>>>, sqlite_live::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sub = {
        let seen = Arc::clone(&seen);
        db.live::<i64, _>("SELECT count(*) FROM jobs", &())
            .unwrap()
            .subscribe(move |event| {
                if let LiveEvent::Value(n) = event {
                    seen.lock().push(n);
                }
            })
    };
    (seen, sub)
}

#[test]
fn commits_from_a_worker_wait_for_the_control_thread() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let (seen, _sub) = watch_jobs(&db);

    thread::scope(|s| {
        s.spawn(|| {
            db.execute("INSERT INTO jobs (done) VALUES (?)", &0).unwrap();
            db.execute("INSERT INTO jobs (done) VALUES (?)", &0).unwrap();
        });
    });
    assert_eq!(*seen.lock(), [0], "no delivery on the worker thread");

    db.flush();
    // Both queued batches re-run the query at flush time.
    assert_eq!(*seen.lock(), [0, 2, 2]);
}

#[test]
fn subscribing_from_a_worker_delivers_on_the_control_thread() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);

    let (seen, sub) = thread::scope(|s| s.spawn(|| watch_jobs(&db)).join().unwrap());
    assert!(seen.lock().is_empty(), "no delivery on the worker thread");
    assert_eq!(sub.state(), sqlite_live::SubscriptionState::Pending);

    db.flush();
    assert_eq!(*seen.lock(), [0]);
    assert_eq!(sub.state(), sqlite_live::SubscriptionState::Active);
}

#[test]
fn flush_off_the_control_thread_leaves_batches_queued() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let (seen, _sub) = watch_jobs(&db);

    thread::scope(|s| {
        s.spawn(|| {
            db.execute("INSERT INTO jobs (done) VALUES (1)", &()).unwrap();
            db.flush();
        });
    });
    assert_eq!(*seen.lock(), [0]);

    // Any call on the control thread drains the queue.
    let done: i64 = db.decode("SELECT count(*) FROM jobs WHERE done = 1", &()).unwrap();
    assert_eq!(done, 1);
    assert_eq!(*seen.lock(), [0, 1]);
}

#[test]
fn shared_handle_serializes_writers() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(open(&dir));
    let (seen, _sub) = watch_jobs(&db);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                db.transaction(|db| {
                    for _ in 0..5 {
                        db.execute("INSERT INTO jobs (done) VALUES (0)", &())?;
                    }
                    Ok(())
                })
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap().unwrap();
    }

    db.flush();
    let seen = seen.lock();
    assert_eq!(seen.len(), 5, "one delivery per committed transaction");
    assert_eq!(seen.last(), Some(&20));
}

//! Integration tests for decoding rows into typed records.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlite_live::{CodecError, Database, Error, Value};

// ============================================================================
// Helpers
// ============================================================================

fn notes_db() -> Database {
    let db = Database::open_in_memory().expect("open in-memory database");
    db.execute_batch(
        "CREATE TABLE notes (
            id    INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            body  TEXT,
            stars INTEGER NOT NULL DEFAULT 0
        );
        INSERT INTO notes (title, body, stars) VALUES ('first', 'hello', 3);
        INSERT INTO notes (title, body, stars) VALUES ('second', NULL, 5);",
    )
    .expect("seed notes");
    db
}

#[derive(Debug, PartialEq, Deserialize)]
struct Note {
    id: i64,
    title: String,
    body: Option<String>,
    stars: u8,
}

fn first_note() -> Note {
    Note {
        id: 1,
        title: "first".into(),
        body: Some("hello".into()),
        stars: 3,
    }
}

// ============================================================================
// Keyed records
// ============================================================================

#[test]
fn struct_reads_the_first_row_by_column_name() {
    let db = notes_db();
    let note: Note = db.decode("SELECT * FROM notes ORDER BY id", &()).unwrap();
    assert_eq!(note, first_note());
}

#[test]
fn column_order_does_not_matter() {
    let db = notes_db();
    let note: Note = db
        .decode("SELECT stars, body, title, id FROM notes WHERE id = ?", &1)
        .unwrap();
    assert_eq!(note, first_note());
}

#[test]
fn optional_field_without_a_column_is_none() {
    #[derive(Debug, Deserialize)]
    struct Summary {
        id: i64,
        title: String,
        body: Option<String>,
    }

    let db = notes_db();
    let summary: Summary = db.decode("SELECT id, title FROM notes WHERE id = 1", &()).unwrap();
    assert_eq!(summary.id, 1);
    assert_eq!(summary.title, "first");
    assert_eq!(summary.body, None);
}

#[test]
fn required_field_without_a_column_is_a_schema_mismatch() {
    let db = notes_db();
    let sql = "SELECT id, title FROM notes";
    let err = db.decode::<Note, _>(sql, &()).unwrap_err();
    match err {
        Error::Codec(CodecError::SchemaMismatch { key, query }) => {
            assert_eq!(key, "stars");
            assert_eq!(query, sql);
        }
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

#[test]
fn null_into_a_required_field_names_the_column() {
    let db = notes_db();
    #[derive(Debug, Deserialize)]
    struct Strict {
        #[allow(dead_code)]
        body: String,
    }
    let err = db
        .decode::<Strict, _>("SELECT body FROM notes WHERE id = 2", &())
        .unwrap_err();
    assert!(err.is_decode_failure());
    assert!(err.to_string().contains("column 'body'"), "{err}");
}

#[test]
fn dynamic_rows_decode_as_value_maps() {
    let db = notes_db();
    let rows: Vec<BTreeMap<String, Value>> =
        db.decode("SELECT * FROM notes ORDER BY id", &()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], Value::I64(1));
    assert_eq!(rows[0]["title"], Value::Text("first".into()));
    assert_eq!(rows[1]["body"], Value::Null);
    assert_eq!(rows[1]["stars"], Value::I64(5));
}

// ============================================================================
// Sequences, tuples, options, scalars
// ============================================================================

#[test]
fn sequence_reads_one_element_per_row() {
    let db = notes_db();
    let notes: Vec<Note> = db.decode("SELECT * FROM notes ORDER BY id", &()).unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0], first_note());
    assert_eq!(notes[1].body, None);
}

#[test]
fn sequence_over_no_rows_is_empty() {
    let db = notes_db();
    let notes: Vec<Note> = db.decode("SELECT * FROM notes WHERE id > 100", &()).unwrap();
    assert!(notes.is_empty());
}

#[test]
fn tuples_read_columns_by_position() {
    let db = notes_db();
    let rows: Vec<(i64, String, Option<String>)> = db
        .decode("SELECT id, title, body FROM notes ORDER BY id", &())
        .unwrap();
    assert_eq!(
        rows,
        vec![
            (1, "first".to_string(), Some("hello".to_string())),
            (2, "second".to_string(), None),
        ]
    );
}

#[test]
fn option_is_none_without_a_row() {
    let db = notes_db();
    let note: Option<Note> = db.decode("SELECT * FROM notes WHERE id = 99", &()).unwrap();
    assert!(note.is_none());

    let note: Option<Note> = db.decode("SELECT * FROM notes WHERE id = 1", &()).unwrap();
    assert_eq!(note, Some(first_note()));
}

#[test]
fn option_scalar_is_none_for_a_null_column() {
    let db = notes_db();
    let body: Option<String> = db.decode("SELECT body FROM notes WHERE id = 2", &()).unwrap();
    assert_eq!(body, None);
    let body: Option<String> = db.decode("SELECT body FROM notes WHERE id = 1", &()).unwrap();
    assert_eq!(body.as_deref(), Some("hello"));
}

#[test]
fn scalar_without_a_row_is_a_decode_failure() {
    let db = notes_db();
    let err = db
        .decode::<i64, _>("SELECT id FROM notes WHERE id = 99", &())
        .unwrap_err();
    assert!(err.is_decode_failure(), "{err}");
}

// ============================================================================
// Archive fallback, timestamps, enums, blobs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Meta {
    tags: Vec<String>,
    weight: f64,
}

#[derive(Debug, PartialEq, Deserialize)]
struct Doc {
    id: i64,
    meta: Meta,
}

#[test]
fn nested_record_round_trips_through_one_column() {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE docs (id INTEGER PRIMARY KEY, meta BLOB)").unwrap();
    let meta = Meta {
        tags: vec!["a".into(), "b".into()],
        weight: 0.5,
    };
    db.execute("INSERT INTO docs (id, meta) VALUES (?, ?)", &(7, meta.clone())).unwrap();

    let kind: String = db.decode("SELECT typeof(meta) FROM docs", &()).unwrap();
    assert_eq!(kind, "blob");

    let doc: Doc = db.decode("SELECT id, meta FROM docs", &()).unwrap();
    assert_eq!(doc, Doc { id: 7, meta });
}

#[test]
fn corrupt_archive_is_a_decode_failure() {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE docs (id INTEGER, meta BLOB); INSERT INTO docs VALUES (1, x'00ff');")
        .unwrap();
    let err = db.decode::<Doc, _>("SELECT id, meta FROM docs", &()).unwrap_err();
    assert!(err.is_decode_failure());
    assert!(err.to_string().contains("column 'meta'"), "{err}");
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Event {
    name: String,
    #[serde(with = "sqlite_live::timestamp")]
    at: DateTime<Utc>,
}

#[test]
fn timestamp_fields_use_the_fixed_text_layout() {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE events (name TEXT, at TEXT)").unwrap();
    let event = Event {
        name: "deploy".into(),
        at: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap() + chrono::Duration::milliseconds(250),
    };
    db.execute("INSERT INTO events (name, at) VALUES (?, ?)", &event).unwrap();

    let raw: String = db.decode("SELECT at FROM events", &()).unwrap();
    assert_eq!(raw, "20240309140507.250");

    let back: Event = db.decode("SELECT name, at FROM events", &()).unwrap();
    assert_eq!(back, event);
}

#[test]
fn unparseable_timestamp_fails_loudly() {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE events (name TEXT, at TEXT); INSERT INTO events VALUES ('x', 'yesterday');")
        .unwrap();
    let err = db.decode::<Event, _>("SELECT name, at FROM events", &()).unwrap_err();
    assert!(err.is_decode_failure());
    assert!(err.to_string().contains("yesterday"), "{err}");
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
enum Priority {
    Low,
    High,
}

#[test]
fn unit_enums_are_stored_by_variant_name() {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE tasks (priority TEXT)").unwrap();
    db.execute("INSERT INTO tasks VALUES (?), (?)", &(Priority::High, Priority::Low))
        .unwrap();

    let raw: Vec<String> = db.decode("SELECT priority FROM tasks ORDER BY rowid", &()).unwrap();
    assert_eq!(raw, ["High", "Low"]);

    let back: Vec<Priority> = db.decode("SELECT priority FROM tasks ORDER BY rowid", &()).unwrap();
    assert_eq!(back, [Priority::High, Priority::Low]);
}

#[test]
fn byte_fields_marked_serde_bytes_bind_as_blobs() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Attachment {
        name: String,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    }

    let db = Database::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE attachments (name TEXT, data BLOB)").unwrap();
    let file = Attachment {
        name: "logo.png".into(),
        data: vec![0x89, b'P', b'N', b'G', 0],
    };
    db.execute("INSERT INTO attachments VALUES (?, ?)", &file).unwrap();

    let (kind, len): (String, i64) = db
        .decode("SELECT typeof(data), length(data) FROM attachments", &())
        .unwrap();
    assert_eq!(kind, "blob");
    assert_eq!(len, 5);

    let back: Attachment = db.decode("SELECT name, data FROM attachments", &()).unwrap();
    assert_eq!(back, file);
}

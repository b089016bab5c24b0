//! Parameter binding through `execute` and `decode`.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlite_live::{CodecError, Database, Error, StatementError, Value};

fn db() -> Database {
    let db = Database::open_in_memory().expect("open in-memory database");
    db.execute_batch("CREATE TABLE people (name TEXT, age INTEGER, nick TEXT)")
        .expect("create table");
    db
}

#[test]
fn too_many_parameters_are_refused() {
    let db = db();
    let err = db
        .execute("INSERT INTO people (name) VALUES (?)", &("ada", 36))
        .unwrap_err();
    match err {
        Error::Statement(StatementError::ParameterCount { expected, actual, .. }) => {
            assert_eq!((expected, actual), (1, 2));
        }
        other => panic!("expected ParameterCount, got {other:?}"),
    }
}

#[test]
fn too_few_parameters_are_refused() {
    let db = db();
    let err = db
        .execute("INSERT INTO people (name, age) VALUES (?, ?)", &("ada",))
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::Statement(StatementError::ParameterCount {
                expected: 2,
                actual: 1,
                ..
            })
        ),
        "{err:?}"
    );
}

#[test]
fn named_parameter_maps_are_refused() {
    let db = db();
    let params = BTreeMap::from([("name".to_string(), "ada".to_string())]);
    let err = db
        .execute("INSERT INTO people (name) VALUES (?)", &params)
        .unwrap_err();
    assert!(matches!(err, Error::Codec(CodecError::Encode(_))), "{err:?}");
    assert!(err.to_string().contains("positional"), "{err}");
}

#[test]
fn dynamic_values_bind_one_per_slot() {
    let db = db();
    let params = vec![Value::from("grace"), Value::I64(85), Value::Null];
    db.execute("INSERT INTO people VALUES (?, ?, ?)", &params).unwrap();

    let row: (String, i64, Option<String>) = db.decode("SELECT * FROM people", &()).unwrap();
    assert_eq!(row, ("grace".to_string(), 85, None));
}

#[test]
fn struct_fields_bind_in_declared_order() {
    #[derive(Serialize)]
    struct NewPerson<'a> {
        name: &'a str,
        age: u32,
        nick: Option<&'a str>,
    }

    let db = db();
    let person = NewPerson {
        name: "linus",
        age: 54,
        nick: Some("torvalds"),
    };
    db.execute("INSERT INTO people (name, age, nick) VALUES (?, ?, ?)", &person)
        .unwrap();

    let nick: String = db
        .decode("SELECT nick FROM people WHERE name = ? AND age = ?", &("linus", 54))
        .unwrap();
    assert_eq!(nick, "torvalds");
}

#[test]
fn none_binds_null() {
    let db = db();
    db.execute("INSERT INTO people VALUES (?, ?, ?)", &("anon", None::<i64>, None::<&str>))
        .unwrap();
    let nulls: i64 = db
        .decode("SELECT count(*) FROM people WHERE age IS NULL AND nick IS NULL", &())
        .unwrap();
    assert_eq!(nulls, 1);
}

#[test]
fn single_scalar_fills_a_single_slot() {
    let db = db();
    let doubled: i64 = db.decode("SELECT ? * 2", &21).unwrap();
    assert_eq!(doubled, 42);
}

#[test]
fn compound_parameter_is_archived_into_a_blob() {
    let db = db();
    let tags = vec!["x", "y"];
    let kind: String = db.decode("SELECT typeof(?)", &(tags,)).unwrap();
    assert_eq!(kind, "blob");
}

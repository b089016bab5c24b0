//! Typed records and live queries over SQLite.
//!
//! Rows decode into any `serde::Deserialize` type and parameters encode from
//! any `serde::Serialize` type, with no per-type mapping code:
//!
//! - a struct reads the current row by column name;
//! - a `Vec<T>` reads one `T` per row;
//! - a tuple reads columns by position;
//! - a scalar reads the first column;
//! - a compound value in one column travels as a JSON archive in a BLOB.
//!
//! Byte fields bind as BLOBs when marked `#[serde(with = "serde_bytes")]`;
//! a plain `Vec<u8>` is a sequence and goes through the archive.
//! `DateTime<Utc>` fields use `#[serde(with = "sqlite_live::timestamp")]`.
//!
//! Live queries ([`Database::live`]) redeliver their decoded result after
//! every commit that touches a table they read.

pub mod codec;
pub mod config;
pub mod database;
pub mod error;
pub mod reactive;
pub mod statement;

pub use codec::timestamp::serde_with as timestamp;
pub use codec::{Kind, Timestamp, Value};
pub use config::{BoolEncoding, DatabaseConfig, JournalMode};
pub use database::Database;
pub use error::{CodecError, Error, Result, StatementError};
pub use reactive::{LiveEvent, LiveQuery, LiveStream, Subscription, SubscriptionId, SubscriptionState};
pub use statement::{ColumnMap, Cursor, CursorState, Ownership, PreparedStatement};

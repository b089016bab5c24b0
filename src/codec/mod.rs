//! Typed records to and from statement slots.
//!
//! The walk over a record is serde's; this module supplies the
//! `Deserializer` over a row cursor ([`RowDecoder`]) and the `Serializer`
//! over parameter slots ([`ParamEncoder`]), both built on the per-slot
//! [`value`] codec.

pub mod archive;
pub mod de;
pub mod ser;
pub mod timestamp;
pub mod value;

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::statement::Cursor;

pub use archive::{from_archive, to_archive};
pub use de::{ColumnDecoder, KeyedRow, RowDecoder};
pub use ser::{encode_params, ParamEncoder, SlotEncoder};
pub use timestamp::{format_timestamp, parse_timestamp, Timestamp};
pub use value::{decode, encode, Kind, Value};

/// Decode `T` from a cursor positioned on its first row.
///
/// Schema mismatches raised during the walk are reported against the
/// cursor's query.
pub fn decode_rows<T: DeserializeOwned>(cursor: &mut Cursor<'_>) -> Result<T> {
    let sql = cursor.sql();
    T::deserialize(RowDecoder::new(cursor)).map_err(|e| e.with_query(sql))
}

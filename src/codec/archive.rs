//! Compound values that fill a single column.
//!
//! Sequences, maps, nested records and data-carrying enums have no native
//! storage class, so they are written as one BLOB holding their JSON form
//! and read back the same way.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

pub fn to_archive<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::encode(format!("archive: {e}")))
}

pub fn from_archive<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    with_archive(bytes, |de| T::deserialize(de))
}

/// Run one deserialize call against archived bytes and require that it
/// consumes them.
pub(crate) fn with_archive<'b, T, F>(bytes: &'b [u8], f: F) -> Result<T>
where
    F: FnOnce(&mut serde_json::Deserializer<serde_json::de::IoRead<&'b [u8]>>) -> serde_json::Result<T>,
{
    let mut de = serde_json::Deserializer::from_reader(bytes);
    let value = f(&mut de).map_err(archive_error)?;
    de.end().map_err(archive_error)?;
    Ok(value)
}

fn archive_error(e: serde_json::Error) -> Error {
    Error::decode(format!("archive: {e}"))
}

//! Decoding rows into typed records.
//!
//! [`RowDecoder`] picks the adapter from the shape serde asks for:
//!
//! - named-field records and maps read the current row through [`KeyedRow`];
//! - sequences read one element per row, stepping the cursor after each one;
//! - tuples read the current row's columns by position;
//! - everything else reads column 0 through a [`ColumnDecoder`].
//!
//! A value that needs more than one slot but sits in a single column (a
//! nested record field, a `Vec` field) goes through the archive fallback.

use rusqlite::types::ValueRef;
use rusqlite::Row;
use serde::de::{self, DeserializeSeed, Deserializer, IntoDeserializer, Visitor};

use crate::error::{Error, Result};
use crate::statement::{ColumnMap, Cursor, CursorState};

use super::archive::with_archive;
use super::timestamp::TIMESTAMP_NAME;
use super::value::{self, Kind};

// ============================================================================
// RowDecoder
// ============================================================================

pub struct RowDecoder<'a, 's> {
    cursor: &'a mut Cursor<'s>,
}

impl<'a, 's> RowDecoder<'a, 's> {
    pub fn new(cursor: &'a mut Cursor<'s>) -> Self {
        Self { cursor }
    }

    fn first_column(self) -> Result<ColumnDecoder<'a, 's>> {
        let cursor: &'a Cursor<'s> = self.cursor;
        let row = cursor.current()?;
        let name = cursor
            .columns()
            .name(0)
            .ok_or_else(|| Error::decode(format!("`{}` returns no columns", cursor.sql())))?;
        Ok(ColumnDecoder::new(row, 0, name))
    }

    fn keyed(self, keys: Vec<&'a str>) -> Result<KeyedRow<'a, 's>> {
        let cursor: &'a Cursor<'s> = self.cursor;
        Ok(KeyedRow::new(cursor.current()?, cursor.columns(), keys))
    }
}

macro_rules! forward_to_first_column {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                self.first_column()?.$method(visitor)
            }
        )*
    };
}

impl<'de, 'a, 's> Deserializer<'de> for RowDecoder<'a, 's> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.cursor.columns().len() == 1 {
            self.first_column()?.deserialize_any(visitor)
        } else {
            self.deserialize_map(visitor)
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.cursor.state() == CursorState::Done {
            return visitor.visit_none();
        }
        if self.cursor.columns().len() == 1 && self.cursor.current()?.get_ref(0)? == ValueRef::Null
        {
            return visitor.visit_none();
        }
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name == TIMESTAMP_NAME {
            return self.first_column()?.deserialize_newtype_struct(name, visitor);
        }
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(RowSeq {
            cursor: self.cursor,
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        let cursor: &'a Cursor<'s> = self.cursor;
        let row = cursor.current()?;
        visitor.visit_seq(ColumnSeq {
            row,
            columns: cursor.columns(),
            next: 0,
            len: len.min(cursor.columns().len()),
        })
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let keys = self.cursor.columns().keys().collect();
        visitor.visit_map(self.keyed(keys)?)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let columns = self.cursor.columns();
        // Fields without a column are left out; serde then reports them as
        // missing, which is `None` for options and a schema mismatch otherwise.
        let keys = fields
            .iter()
            .copied()
            .filter(|field| columns.contains(field))
            .collect();
        visitor.visit_map(self.keyed(keys)?)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        self.first_column()?.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    forward_to_first_column! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_f32 deserialize_f64 deserialize_char deserialize_str deserialize_string
        deserialize_bytes deserialize_byte_buf deserialize_identifier
    }
}

// ----------------------------------------------------------------------------
// Unkeyed: one element per row
// ----------------------------------------------------------------------------

struct RowSeq<'a, 's> {
    cursor: &'a mut Cursor<'s>,
}

impl<'de, 'a, 's> de::SeqAccess<'de> for RowSeq<'a, 's> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if self.cursor.state() == CursorState::Done {
            return Ok(None);
        }
        let element = seed.deserialize(RowDecoder::new(self.cursor))?;
        self.cursor.step()?;
        Ok(Some(element))
    }

    // Row count is not known until the engine reports completion.
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

// ----------------------------------------------------------------------------
// Positional: the current row's columns in order
// ----------------------------------------------------------------------------

struct ColumnSeq<'a, 's> {
    row: &'a Row<'s>,
    columns: &'a ColumnMap,
    next: usize,
    len: usize,
}

impl<'de, 'a, 's> de::SeqAccess<'de> for ColumnSeq<'a, 's> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if self.next >= self.len {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;
        let name = self.columns.name(index).unwrap_or_default();
        seed.deserialize(ColumnDecoder::new(self.row, index, name)).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.len - self.next)
    }
}

// ============================================================================
// KeyedRow
// ============================================================================

/// The current row viewed by column name.
pub struct KeyedRow<'a, 's> {
    row: &'a Row<'s>,
    columns: &'a ColumnMap,
    keys: std::vec::IntoIter<&'a str>,
    pending: Option<(usize, &'a str)>,
}

impl<'a, 's> KeyedRow<'a, 's> {
    pub(crate) fn new(row: &'a Row<'s>, columns: &'a ColumnMap, keys: Vec<&'a str>) -> Self {
        Self {
            row,
            columns,
            keys: keys.into_iter(),
            pending: None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.columns.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.columns.keys()
    }

    /// The single-value view of the column named `key`.
    pub fn column(&self, key: &'a str) -> Result<ColumnDecoder<'a, 's>> {
        let index = self.columns.index_of(key)?;
        Ok(ColumnDecoder::new(self.row, index, key))
    }
}

impl<'de, 'a, 's> de::MapAccess<'de> for KeyedRow<'a, 's> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let Some(key) = self.keys.next() else {
            return Ok(None);
        };
        let index = self.columns.index_of(key)?;
        self.pending = Some((index, key));
        seed.deserialize(key.into_deserializer()).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let (index, key) = self
            .pending
            .take()
            .ok_or_else(|| Error::decode("value requested before its key"))?;
        seed.deserialize(ColumnDecoder::new(self.row, index, key))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.keys.len())
    }
}

// ============================================================================
// ColumnDecoder
// ============================================================================

/// One column of the current row.
pub struct ColumnDecoder<'a, 's> {
    row: &'a Row<'s>,
    index: usize,
    name: &'a str,
}

impl<'a, 's> ColumnDecoder<'a, 's> {
    pub(crate) fn new(row: &'a Row<'s>, index: usize, name: &'a str) -> Self {
        Self { row, index, name }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// NULL check, kept apart from typed decoding.
    pub fn is_null(&self) -> Result<bool> {
        Ok(self.raw()? == ValueRef::Null)
    }

    pub fn decode(&self, kind: Kind) -> Result<value::Value> {
        value::decode(self.raw()?, kind).map_err(|e| e.in_column(self.name))
    }

    fn raw(&self) -> Result<ValueRef<'a>> {
        Ok(self.row.get_ref(self.index)?)
    }

    fn scalar<'de, V: Visitor<'de>>(self, kind: Kind, visitor: V) -> Result<V::Value> {
        let name = self.name;
        Deserializer::deserialize_any(self.decode(kind)?, visitor).map_err(|e| e.in_column(name))
    }

    fn archived<T>(
        self,
        f: impl FnOnce(
            &mut serde_json::Deserializer<serde_json::de::IoRead<&[u8]>>,
        ) -> serde_json::Result<T>,
    ) -> Result<T> {
        let bytes = value::archive_bytes(self.raw()?).map_err(|e| e.in_column(self.name))?;
        with_archive(&bytes, f).map_err(|e| e.in_column(self.name))
    }
}

impl<'de, 'a, 's> Deserializer<'de> for ColumnDecoder<'a, 's> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.raw()? {
            ValueRef::Null => visitor.visit_unit(),
            ValueRef::Integer(i) => visitor.visit_i64(i),
            ValueRef::Real(f) => visitor.visit_f64(f),
            ValueRef::Text(_) => self.scalar(Kind::Text, visitor),
            ValueRef::Blob(bytes) => visitor.visit_bytes(bytes),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.is_null()? {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::Bool, visitor)
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::I8, visitor)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::I16, visitor)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::I32, visitor)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::I64, visitor)
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::U8, visitor)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::U16, visitor)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::U32, visitor)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::U64, visitor)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::F32, visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::F64, visitor)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::Text, visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::Text, visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::Text, visitor)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::Text, visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::Blob, visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.scalar(Kind::Blob, visitor)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name == TIMESTAMP_NAME {
            let name = self.name;
            let at = self.decode(Kind::Timestamp)?;
            return visitor.visit_newtype_struct(at).map_err(|e| e.in_column(name));
        }
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.archived(|de| Deserializer::deserialize_seq(de, visitor))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        self.archived(|de| Deserializer::deserialize_tuple(de, len, visitor))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.archived(|de| Deserializer::deserialize_tuple_struct(de, name, len, visitor))
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.archived(|de| Deserializer::deserialize_map(de, visitor))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        self.archived(|de| Deserializer::deserialize_struct(de, name, fields, visitor))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        // Unit variants live in a text column under their name.
        if let ValueRef::Text(_) = self.raw()? {
            let value::Value::Text(variant) = self.decode(Kind::Text)? else {
                return Err(Error::decode("text column did not decode as text"));
            };
            return visitor.visit_enum(variant.into_deserializer());
        }
        self.archived(|de| Deserializer::deserialize_enum(de, name, variants, visitor))
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

//! Encoding parameters into positional slots.
//!
//! [`ParamEncoder`] spreads a parameter set over the statement's slots:
//! tuples, sequences and structs give one slot per element (struct fields in
//! declared order), a scalar gives one slot and `()` gives none. Each slot is
//! filled by a [`SlotEncoder`], which falls back to the archive for anything
//! compound.

use rusqlite::types::Value as SqlValue;
use serde::ser::{self, Impossible, Serialize, Serializer};
use serde_json::value::Serializer as Json;

use crate::config::BoolEncoding;
use crate::error::{Error, Result, StatementError};

use super::value::{self, Value};

/// Encode `params` and check them against the statement's declared count.
pub fn encode_params<P: Serialize + ?Sized>(
    params: &P,
    expected: usize,
    sql: &str,
    bools: BoolEncoding,
) -> Result<Vec<SqlValue>> {
    let mut slots = Vec::with_capacity(expected);
    params.serialize(ParamEncoder::new(&mut slots, bools))?;
    if slots.len() != expected {
        return Err(StatementError::ParameterCount {
            sql: sql.to_string(),
            expected,
            actual: slots.len(),
        }
        .into());
    }
    Ok(slots)
}

// ============================================================================
// ParamEncoder
// ============================================================================

pub struct ParamEncoder<'a> {
    slots: &'a mut Vec<SqlValue>,
    bools: BoolEncoding,
}

impl<'a> ParamEncoder<'a> {
    pub fn new(slots: &'a mut Vec<SqlValue>, bools: BoolEncoding) -> Self {
        Self { slots, bools }
    }

    fn push(self, value: Value) -> Result<()> {
        self.slots.push(value::encode(&value, self.bools)?);
        Ok(())
    }

    fn push_encoded<T: Serialize + ?Sized>(self, value: &T) -> Result<()> {
        let slot = value.serialize(SlotEncoder::new(self.bools))?;
        self.slots.push(slot);
        Ok(())
    }
}

fn unsupported<T>(what: &str) -> Result<T> {
    Err(Error::encode(format!(
        "{what} cannot be bound; parameters are positional"
    )))
}

impl<'a> Serializer for ParamEncoder<'a> {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = ParamSlots<'a>;
    type SerializeTuple = ParamSlots<'a>;
    type SerializeTupleStruct = ParamSlots<'a>;
    type SerializeTupleVariant = Impossible<(), Error>;
    type SerializeMap = Impossible<(), Error>;
    type SerializeStruct = ParamSlots<'a>;
    type SerializeStructVariant = Impossible<(), Error>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.push(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.push(Value::I8(v))
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.push(Value::I16(v))
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.push(Value::I32(v))
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.push(Value::I64(v))
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.push(Value::U8(v))
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.push(Value::U16(v))
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.push(Value::U32(v))
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.push(Value::U64(v))
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.push(Value::F32(v))
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        self.push(Value::F64(v))
    }

    fn serialize_char(self, v: char) -> Result<()> {
        self.push(Value::Text(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.push(Value::Text(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.push(Value::Blob(v.to_vec()))
    }

    fn serialize_none(self) -> Result<()> {
        self.push(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.push(Value::Text(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        let slot = SlotEncoder::new(self.bools).serialize_newtype_variant(name, index, variant, value)?;
        self.slots.push(slot);
        Ok(())
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<ParamSlots<'a>> {
        Ok(ParamSlots::new(self, len.unwrap_or(0)))
    }

    fn serialize_tuple(self, len: usize) -> Result<ParamSlots<'a>> {
        Ok(ParamSlots::new(self, len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<ParamSlots<'a>> {
        Ok(ParamSlots::new(self, len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        unsupported(&format!("tuple variant '{variant}'"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        unsupported("a map of named parameters")
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<ParamSlots<'a>> {
        Ok(ParamSlots::new(self, len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        unsupported(&format!("struct variant '{variant}'"))
    }
}

/// One slot per element, in order.
pub struct ParamSlots<'a> {
    slots: &'a mut Vec<SqlValue>,
    bools: BoolEncoding,
}

impl<'a> ParamSlots<'a> {
    fn new(encoder: ParamEncoder<'a>, len: usize) -> Self {
        encoder.slots.reserve(len);
        Self {
            slots: encoder.slots,
            bools: encoder.bools,
        }
    }

    fn element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ParamEncoder::new(self.slots, self.bools).push_encoded(value)
    }
}

impl ser::SerializeSeq for ParamSlots<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTuple for ParamSlots<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for ParamSlots<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeStruct for ParamSlots<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _key: &'static str, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// SlotEncoder
// ============================================================================

/// Encodes one value into one parameter slot.
#[derive(Debug, Clone, Copy)]
pub struct SlotEncoder {
    bools: BoolEncoding,
}

impl SlotEncoder {
    pub fn new(bools: BoolEncoding) -> Self {
        Self { bools }
    }

    fn slot(self, value: Value) -> Result<SqlValue> {
        value::encode(&value, self.bools)
    }
}

fn archive_error(e: serde_json::Error) -> Error {
    Error::encode(format!("archive: {e}"))
}

fn archived(value: serde_json::Result<serde_json::Value>) -> Result<SqlValue> {
    let value = value.map_err(archive_error)?;
    let bytes = serde_json::to_vec(&value).map_err(archive_error)?;
    Ok(SqlValue::Blob(bytes))
}

impl Serializer for SlotEncoder {
    type Ok = SqlValue;
    type Error = Error;

    type SerializeSeq = Archived<<Json as Serializer>::SerializeSeq>;
    type SerializeTuple = Archived<<Json as Serializer>::SerializeTuple>;
    type SerializeTupleStruct = Archived<<Json as Serializer>::SerializeTupleStruct>;
    type SerializeTupleVariant = Archived<<Json as Serializer>::SerializeTupleVariant>;
    type SerializeMap = Archived<<Json as Serializer>::SerializeMap>;
    type SerializeStruct = Archived<<Json as Serializer>::SerializeStruct>;
    type SerializeStructVariant = Archived<<Json as Serializer>::SerializeStructVariant>;

    fn serialize_bool(self, v: bool) -> Result<SqlValue> {
        self.slot(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<SqlValue> {
        self.slot(Value::I8(v))
    }

    fn serialize_i16(self, v: i16) -> Result<SqlValue> {
        self.slot(Value::I16(v))
    }

    fn serialize_i32(self, v: i32) -> Result<SqlValue> {
        self.slot(Value::I32(v))
    }

    fn serialize_i64(self, v: i64) -> Result<SqlValue> {
        self.slot(Value::I64(v))
    }

    fn serialize_u8(self, v: u8) -> Result<SqlValue> {
        self.slot(Value::U8(v))
    }

    fn serialize_u16(self, v: u16) -> Result<SqlValue> {
        self.slot(Value::U16(v))
    }

    fn serialize_u32(self, v: u32) -> Result<SqlValue> {
        self.slot(Value::U32(v))
    }

    fn serialize_u64(self, v: u64) -> Result<SqlValue> {
        self.slot(Value::U64(v))
    }

    fn serialize_f32(self, v: f32) -> Result<SqlValue> {
        self.slot(Value::F32(v))
    }

    fn serialize_f64(self, v: f64) -> Result<SqlValue> {
        self.slot(Value::F64(v))
    }

    fn serialize_char(self, v: char) -> Result<SqlValue> {
        self.slot(Value::Text(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<SqlValue> {
        self.slot(Value::Text(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<SqlValue> {
        self.slot(Value::Blob(v.to_vec()))
    }

    fn serialize_none(self) -> Result<SqlValue> {
        Ok(SqlValue::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<SqlValue> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<SqlValue> {
        Ok(SqlValue::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<SqlValue> {
        Ok(SqlValue::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<SqlValue> {
        self.slot(Value::Text(variant.to_string()))
    }

    // Timestamps arrive here with their text form already inside.
    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<SqlValue> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<SqlValue> {
        archived(Json.serialize_newtype_variant(name, index, variant, value))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq> {
        Json.serialize_seq(len).map(Archived).map_err(archive_error)
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        Json.serialize_tuple(len).map(Archived).map_err(archive_error)
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Json.serialize_tuple_struct(name, len).map(Archived).map_err(archive_error)
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Json.serialize_tuple_variant(name, index, variant, len)
            .map(Archived)
            .map_err(archive_error)
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap> {
        Json.serialize_map(len).map(Archived).map_err(archive_error)
    }

    fn serialize_struct(self, name: &'static str, len: usize) -> Result<Self::SerializeStruct> {
        Json.serialize_struct(name, len).map(Archived).map_err(archive_error)
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Json.serialize_struct_variant(name, index, variant, len)
            .map(Archived)
            .map_err(archive_error)
    }
}

// ----------------------------------------------------------------------------
// Archived compounds
// ----------------------------------------------------------------------------

/// A compound being collected into one archive slot.
pub struct Archived<S>(S);

impl<S> ser::SerializeSeq for Archived<S>
where
    S: ser::SerializeSeq<Ok = serde_json::Value, Error = serde_json::Error>,
{
    type Ok = SqlValue;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.0.serialize_element(value).map_err(archive_error)
    }

    fn end(self) -> Result<SqlValue> {
        archived(self.0.end())
    }
}

impl<S> ser::SerializeTuple for Archived<S>
where
    S: ser::SerializeTuple<Ok = serde_json::Value, Error = serde_json::Error>,
{
    type Ok = SqlValue;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.0.serialize_element(value).map_err(archive_error)
    }

    fn end(self) -> Result<SqlValue> {
        archived(self.0.end())
    }
}

impl<S> ser::SerializeTupleStruct for Archived<S>
where
    S: ser::SerializeTupleStruct<Ok = serde_json::Value, Error = serde_json::Error>,
{
    type Ok = SqlValue;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.0.serialize_field(value).map_err(archive_error)
    }

    fn end(self) -> Result<SqlValue> {
        archived(self.0.end())
    }
}

impl<S> ser::SerializeTupleVariant for Archived<S>
where
    S: ser::SerializeTupleVariant<Ok = serde_json::Value, Error = serde_json::Error>,
{
    type Ok = SqlValue;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.0.serialize_field(value).map_err(archive_error)
    }

    fn end(self) -> Result<SqlValue> {
        archived(self.0.end())
    }
}

impl<S> ser::SerializeMap for Archived<S>
where
    S: ser::SerializeMap<Ok = serde_json::Value, Error = serde_json::Error>,
{
    type Ok = SqlValue;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.0.serialize_key(key).map_err(archive_error)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.0.serialize_value(value).map_err(archive_error)
    }

    fn end(self) -> Result<SqlValue> {
        archived(self.0.end())
    }
}

impl<S> ser::SerializeStruct for Archived<S>
where
    S: ser::SerializeStruct<Ok = serde_json::Value, Error = serde_json::Error>,
{
    type Ok = SqlValue;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.0.serialize_field(key, value).map_err(archive_error)
    }

    fn end(self) -> Result<SqlValue> {
        archived(self.0.end())
    }
}

impl<S> ser::SerializeStructVariant for Archived<S>
where
    S: ser::SerializeStructVariant<Ok = serde_json::Value, Error = serde_json::Error>,
{
    type Ok = SqlValue;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.0.serialize_field(key, value).map_err(archive_error)
    }

    fn end(self) -> Result<SqlValue> {
        archived(self.0.end())
    }
}

//! The timestamp mapping.
//!
//! Instants are stored as TEXT in the fixed-width UTC layout
//! `yyyyMMddHHmmss.SSS`, so they sort lexically and keep millisecond
//! precision. [`Timestamp`] carries that mapping through serde: the codec
//! recognizes it by its newtype name, while other formats (the archive
//! included) just see the formatted string.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::error::{Error, Result};

pub(crate) const TIMESTAMP_NAME: &str = "$sqlite_live::Timestamp";

const FORMAT: &str = "%Y%m%d%H%M%S%.3f";

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text, FORMAT).map_err(|e| {
        Error::decode(format!("'{text}' is not a yyyyMMddHHmmss.SSS timestamp: {e}"))
    })?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// A UTC instant that binds and decodes through the timestamp mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Timestamp(at)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(TIMESTAMP_NAME, &format_timestamp(&self.0))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a yyyyMMddHHmmss.SSS timestamp")
            }

            fn visit_newtype_struct<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> std::result::Result<Timestamp, D::Error> {
                let text = String::deserialize(deserializer)?;
                self.visit_str(&text)
            }

            fn visit_str<E: de::Error>(self, text: &str) -> std::result::Result<Timestamp, E> {
                parse_timestamp(text).map(Timestamp).map_err(E::custom)
            }
        }

        deserializer.deserialize_newtype_struct(TIMESTAMP_NAME, TimestampVisitor)
    }
}

/// `#[serde(with = "sqlite_live::timestamp")]` for `DateTime<Utc>` fields.
pub mod serde_with {
    use super::*;

    pub fn serialize<S: Serializer>(
        at: &DateTime<Utc>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        Timestamp(*at).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DateTime<Utc>, D::Error> {
        Timestamp::deserialize(deserializer).map(|ts| ts.0)
    }

    /// The same mapping for `Option<DateTime<Utc>>` fields; `None` is NULL.
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            at: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            match at {
                Some(at) => serializer.serialize_some(&Timestamp(*at)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
            Ok(Option::<Timestamp>::deserialize(deserializer)?.map(|ts| ts.0))
        }
    }
}

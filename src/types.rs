//! Core types exchanged with an sMAP archiver.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::reading::Reading;

/// Milliseconds per second; archiver readings are timestamped in ms.
pub const MILLIS_PER_SECOND: u64 = 1_000;

/// A stream envelope as sent and received by the archiver.
///
/// A message with an empty `uuid` carries metadata for a collection rather
/// than a single stream. Field names follow the archiver's JSON casing;
/// lowercase spellings are accepted when decoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Readings in server order.
    #[serde(
        rename = "Readings",
        alias = "readings",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub readings: Vec<Reading>,

    /// Stream identifier.
    #[serde(alias = "UUID", default, deserialize_with = "null_as_default")]
    pub uuid: String,

    #[serde(
        rename = "Properties",
        alias = "properties",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub properties: BTreeMap<String, JsonValue>,

    #[serde(
        rename = "Metadata",
        alias = "metadata",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub metadata: BTreeMap<String, JsonValue>,

    /// Archiver path of the stream, e.g. `/building/floor1/temp`.
    #[serde(
        rename = "Path",
        alias = "path",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub path: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl StreamMessage {
    /// Create a message carrying readings for one stream.
    pub fn with_readings(uuid: impl Into<String>, readings: Vec<Reading>) -> Self {
        Self {
            uuid: uuid.into(),
            readings,
            ..Default::default()
        }
    }

    /// True if this message describes a collection rather than a stream.
    pub fn is_collection(&self) -> bool {
        self.uuid.is_empty()
    }

    /// Check that this document can be uploaded as metadata.
    pub fn validate_for_ingest(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::InvalidDocument {
                message: format!("document for stream '{}' has no Path", self.uuid),
            });
        }
        if self.uuid.is_empty() {
            return Err(Error::InvalidDocument {
                message: format!("document at '{}' has no uuid", self.path),
            });
        }
        Ok(())
    }

    /// Flatten the readings into rows, lazily and in server order.
    pub fn rows(&self) -> impl Iterator<Item = Result<Row<'_>>> + '_ {
        self.readings
            .iter()
            .map(|reading| Row::from_reading(&self.uuid, reading))
    }
}

/// Convert a millisecond reading timestamp to an absolute time, truncated
/// to whole seconds.
pub fn reading_time(millis: u64) -> Result<DateTime<Utc>> {
    let seconds = (millis / MILLIS_PER_SECOND) as i64;
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| Error::decode(format!("reading timestamp {} is out of range", millis)))
}

/// A flattened reading, as delivered to sinks.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Row<'a> {
    /// Stream identifier.
    pub uuid: &'a str,
    /// Time of the reading, second resolution.
    pub time: DateTime<Utc>,
    /// Value of the reading.
    pub value: f64,
}

impl<'a> Row<'a> {
    /// Build a row from a millisecond-stamped reading.
    pub fn from_reading(uuid: &'a str, reading: &Reading) -> Result<Self> {
        Ok(Self {
            uuid,
            time: reading_time(reading.time)?,
            value: reading.value,
        })
    }
}

//! Codec for a single sMAP reading.
//!
//! On the wire a reading is a two-element JSON array `[timestamp, value]`.
//! Archivers are not consistent about how they encode the timestamp: some
//! versions emit an integer, others a float such as `1.45e12`. Decoding
//! accepts both and normalizes to `u64`.

use serde::de::{self, Deserializer};
use serde::ser::{self, SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_json::value::RawValue;

use crate::error::{Error, Result};

/// 2^64 as a float, the first value that no longer fits in a `u64`.
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

/// One (timestamp, value) sample of a stream.
///
/// The unit of `time` is whatever the producer uses: milliseconds for
/// readings fetched from an archiver, nanoseconds for readings built from
/// an ingest data file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Timestamp of the sample.
    pub time: u64,
    /// Sampled value.
    pub value: f64,
}

impl Reading {
    /// Create a new reading.
    pub fn new(time: u64, value: f64) -> Self {
        Self { time, value }
    }

    /// Decode a reading from an already parsed wire tuple.
    ///
    /// Fails if the tuple does not have exactly two elements, if the
    /// timestamp is not a non-negative integral number, or if the value
    /// is not a number.
    pub fn from_wire(tuple: &[JsonValue]) -> Result<Self> {
        let [time, value] = tuple else {
            return Err(Error::decode(format!(
                "bad sMAP reading, need a (time, value) 2-tuple but got {} elements",
                tuple.len()
            )));
        };

        let time = decode_timestamp(time)?;
        let value = value
            .as_f64()
            .ok_or_else(|| Error::decode(format!("bad reading value {}", value)))?;

        Ok(Self { time, value })
    }
}

fn decode_timestamp(raw: &JsonValue) -> Result<u64> {
    let JsonValue::Number(n) = raw else {
        return Err(Error::decode(format!("bad reading timestamp {}", raw)));
    };

    if let Some(t) = n.as_u64() {
        return Ok(t);
    }
    if n.is_i64() {
        return Err(Error::decode(format!("negative reading timestamp {}", n)));
    }

    n.as_f64()
        .and_then(float_timestamp)
        .ok_or_else(|| Error::decode(format!("reading timestamp {} is not a whole number", n)))
}

/// Convert a float timestamp without losing information.
fn float_timestamp(t: f64) -> Option<u64> {
    (t.is_finite() && t >= 0.0 && t.fract() == 0.0 && t < U64_LIMIT).then_some(t as u64)
}

/// Render a value as a plain decimal: `Display` for `f64` never switches
/// to exponent notation and prints the shortest string that round-trips.
fn plain_decimal(value: f64) -> String {
    value.to_string()
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if !self.value.is_finite() {
            return Err(ser::Error::custom(format!(
                "cannot encode non-finite reading value {}",
                self.value
            )));
        }
        let value = RawValue::from_string(plain_decimal(self.value)).map_err(ser::Error::custom)?;

        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.time)?;
        tuple.serialize_element(&value)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Reading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tuple = Vec::<JsonValue>::deserialize(deserializer)?;
        Reading::from_wire(&tuple).map_err(de::Error::custom)
    }
}

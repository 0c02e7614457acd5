//! # Record decoding
//!
//! Turns one confirmed candidate range into a typed [`Record`]. Decoders are
//! pure over the borrowed slice; a failure is reported per range and never
//! stops the stream.

pub mod layout;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use thiserror::Error;

use crate::constants::NTP_UNIX_DELTA;
use crate::format::{Epoch, FormatDescriptor};
use crate::ranges::ByteRange;

pub use layout::LayoutDecoder;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("field {field} = {value} outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("unexpected sub-type tag {found} at offset {offset}, expected {expected}")]
    UnexpectedTag {
        offset: usize,
        expected: String,
        found: String,
    },
    #[error("field {field} is not finite")]
    NonFiniteField { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            FieldValue::Unsigned(v) => v as f64,
            FieldValue::Signed(v) => v as f64,
            FieldValue::Float(v) => v,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldValue::Unsigned(v) => Some(v),
            FieldValue::Signed(v) => u64::try_from(v).ok(),
            FieldValue::Float(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Unsigned(v) => write!(f, "{v}"),
            FieldValue::Signed(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// Decoder output before provenance is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub fields: Vec<Field>,
    /// Seconds since the NTP epoch.
    pub timestamp: f64,
}

/// A decoded sample with its provenance. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub stream: String,
    /// Absolute byte range in the input.
    pub range: ByteRange,
    pub timestamp: f64,
    #[serde(serialize_with = "fields_as_map")]
    pub fields: Vec<Field>,
    #[serde(serialize_with = "hex_bytes")]
    pub raw: Vec<u8>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.value)
    }

    /// Timestamp rendered as an RFC 3339 UTC string.
    pub fn timestamp_utc(&self) -> Option<String> {
        ntp_to_utc(self.timestamp)
    }
}

fn fields_as_map<S: Serializer>(fields: &[Field], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for field in fields {
        map.serialize_entry(&field.name, &field.value)?;
    }
    map.end()
}

fn hex_bytes<S: Serializer>(raw: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(raw))
}

pub trait RecordDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Decoded, DecodeError>;
}

/// Convert an epoch-relative integer time to seconds since the NTP epoch.
///
/// The shift happens in integer space so repeated conversions never drift.
pub fn to_ntp_seconds(value: u64, epoch: Epoch) -> f64 {
    match epoch {
        Epoch::Unix => value.saturating_add(NTP_UNIX_DELTA) as f64,
        Epoch::Ntp => value as f64,
    }
}

pub fn ntp_to_utc(ntp: f64) -> Option<String> {
    if !ntp.is_finite() {
        return None;
    }
    let unix = ntp - NTP_UNIX_DELTA as f64;
    let secs = unix.floor() as i64;
    let nanos = ((unix - unix.floor()) * 1e9) as u32;
    chrono::DateTime::from_timestamp(secs, nanos).map(|dt| dt.to_rfc3339())
}

pub fn build_decoder(format: &FormatDescriptor) -> anyhow::Result<Box<dyn RecordDecoder>> {
    Ok(Box::new(LayoutDecoder::new(format.layout.clone())?))
}

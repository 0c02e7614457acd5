use anyhow::Result;

use crate::decode::{Decoded, DecodeError, Field, FieldValue, RecordDecoder, to_ntp_seconds};
use crate::format::{Endian, FieldKind, RecordLayout};
use crate::sieve::decode_hex;

/// Positional decoder for fixed-width binary records.
pub struct LayoutDecoder {
    layout: RecordLayout,
    tag: Option<(usize, Vec<u8>)>,
    timestamp_idx: usize,
}

impl LayoutDecoder {
    pub fn new(layout: RecordLayout) -> Result<Self> {
        layout.validate("layout")?;
        let tag = match &layout.tag {
            Some(spec) => Some((spec.offset, decode_hex("layout.tag.hex", &spec.hex)?)),
            None => None,
        };
        let timestamp_idx = layout
            .fields
            .iter()
            .position(|f| f.name == layout.timestamp.field)
            .ok_or_else(|| anyhow::anyhow!("timestamp field {} missing", layout.timestamp.field))?;
        Ok(Self {
            layout,
            tag,
            timestamp_idx,
        })
    }

    fn read_value(&self, kind: FieldKind, bytes: &[u8]) -> FieldValue {
        macro_rules! int {
            ($ty:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(&bytes[..$n]);
                match self.layout.endian {
                    Endian::Big => <$ty>::from_be_bytes(buf),
                    Endian::Little => <$ty>::from_le_bytes(buf),
                }
            }};
        }
        match kind {
            FieldKind::U8 => FieldValue::Unsigned(bytes[0] as u64),
            FieldKind::U16 => FieldValue::Unsigned(int!(u16, 2) as u64),
            FieldKind::U32 => FieldValue::Unsigned(int!(u32, 4) as u64),
            FieldKind::I16 => FieldValue::Signed(int!(i16, 2) as i64),
            FieldKind::I32 => FieldValue::Signed(int!(i32, 4) as i64),
            FieldKind::F32 => FieldValue::Float(int!(f32, 4) as f64),
            FieldKind::F64 => FieldValue::Float(int!(f64, 8)),
        }
    }
}

impl RecordDecoder for LayoutDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Decoded, DecodeError> {
        if bytes.len() != self.layout.record_len {
            return Err(DecodeError::Length {
                expected: self.layout.record_len,
                actual: bytes.len(),
            });
        }
        if let Some((offset, expected)) = &self.tag {
            let found = &bytes[*offset..*offset + expected.len()];
            if found != expected.as_slice() {
                return Err(DecodeError::UnexpectedTag {
                    offset: *offset,
                    expected: hex::encode(expected),
                    found: hex::encode(found),
                });
            }
        }

        let mut fields = Vec::with_capacity(self.layout.fields.len());
        for spec in &self.layout.fields {
            let value = self.read_value(spec.kind, &bytes[spec.offset..spec.offset + spec.kind.width()]);
            if spec.min.is_some() || spec.max.is_some() {
                let v = value.as_f64();
                if !v.is_finite() {
                    return Err(DecodeError::NonFiniteField {
                        field: spec.name.clone(),
                    });
                }
                let min = spec.min.unwrap_or(f64::NEG_INFINITY);
                let max = spec.max.unwrap_or(f64::INFINITY);
                if v < min || v > max {
                    return Err(DecodeError::OutOfRange {
                        field: spec.name.clone(),
                        value: v,
                        min,
                        max,
                    });
                }
            }
            fields.push(Field {
                name: spec.name.clone(),
                value,
            });
        }

        let raw_time = fields[self.timestamp_idx].value.as_u64().ok_or_else(|| {
            DecodeError::OutOfRange {
                field: self.layout.timestamp.field.clone(),
                value: fields[self.timestamp_idx].value.as_f64(),
                min: 0.0,
                max: u64::MAX as f64,
            }
        })?;
        let timestamp = to_ntp_seconds(raw_time, self.layout.timestamp.epoch);
        Ok(Decoded { fields, timestamp })
    }
}

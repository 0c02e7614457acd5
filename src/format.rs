//! Immutable per-format descriptor: outer framing, record sizes and field layout.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::sieve::decode_hex;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormatDescriptor {
    pub id: String,
    /// Stream name stamped on every decoded record.
    pub stream: String,
    pub framing: Framing,
    pub records: RecordFraming,
    pub layout: RecordLayout,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Framing {
    /// SIO mule blocks for one instrument id.
    Sio { instrument_id: String },
    /// Raw instrument output; spans run from header to header.
    Header { pattern_hex: String },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SieveStrategy {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordFraming {
    pub strategy: SieveStrategy,
    #[serde(default)]
    pub header_hex: Option<String>,
    #[serde(default)]
    pub header_len: usize,
    pub sample_bytes: usize,
    pub status_bytes: usize,
    #[serde(default)]
    pub augmented_status_bytes: Option<usize>,
    pub status_marker: MarkerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarkerConfig {
    pub prefix_hex: String,
    pub last_min: u8,
    pub last_max: u8,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Endian {
    #[default]
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    U8,
    U16,
    U32,
    I16,
    I32,
    F32,
    F64,
}

impl FieldKind {
    pub fn width(self) -> usize {
        match self {
            FieldKind::U8 => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 => 4,
            FieldKind::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, FieldKind::F32 | FieldKind::F64)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub offset: usize,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Epoch {
    /// Seconds since 1970-01-01; shifted onto the NTP epoch.
    Unix,
    /// Seconds since 1900-01-01.
    Ntp,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimestampSpec {
    /// Name of an integer field in `fields`.
    pub field: String,
    pub epoch: Epoch,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TagSpec {
    pub offset: usize,
    pub hex: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordLayout {
    #[serde(default)]
    pub endian: Endian,
    pub record_len: usize,
    pub fields: Vec<FieldSpec>,
    pub timestamp: TimestampSpec,
    #[serde(default)]
    pub tag: Option<TagSpec>,
}

impl FormatDescriptor {
    /// Check everything that can be checked without input bytes.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("format id must not be empty");
        }
        match &self.framing {
            Framing::Sio { instrument_id } => {
                if instrument_id.len() != 2 {
                    bail!("format {}: sio instrument id must be 2 characters", self.id);
                }
            }
            Framing::Header { pattern_hex } => {
                decode_hex("framing.pattern_hex", pattern_hex)?;
            }
        }
        if let Some(hex) = &self.records.header_hex {
            decode_hex("records.header_hex", hex)?;
        }
        decode_hex("records.status_marker.prefix_hex", &self.records.status_marker.prefix_hex)?;
        if self.layout.record_len != self.records.sample_bytes {
            bail!(
                "format {}: layout.record_len {} differs from records.sample_bytes {}",
                self.id,
                self.layout.record_len,
                self.records.sample_bytes
            );
        }
        self.layout.validate(&self.id)
    }
}

impl RecordLayout {
    pub fn validate(&self, id: &str) -> Result<()> {
        if self.fields.is_empty() {
            bail!("format {id}: layout has no fields");
        }
        for field in &self.fields {
            if field.offset + field.kind.width() > self.record_len {
                bail!(
                    "format {id}: field {} ends past record_len {}",
                    field.name,
                    self.record_len
                );
            }
            if let (Some(min), Some(max)) = (field.min, field.max) {
                if min > max {
                    bail!("format {id}: field {} has min > max", field.name);
                }
            }
        }
        let Some(ts) = self.fields.iter().find(|f| f.name == self.timestamp.field) else {
            bail!(
                "format {id}: timestamp field {} is not in the layout",
                self.timestamp.field
            );
        };
        if ts.kind.is_float() {
            bail!("format {id}: timestamp field {} must be an integer", ts.name);
        }
        if let Some(tag) = &self.tag {
            let bytes = decode_hex("layout.tag.hex", &tag.hex)?;
            if tag.offset + bytes.len() > self.record_len {
                bail!("format {id}: tag ends past record_len {}", self.record_len);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::constants::*;

    /// WFP engineering sample layout: time, five floats, three counters.
    pub fn wfp_layout() -> RecordLayout {
        let mut fields = vec![FieldSpec {
            name: "profiler_timestamp".into(),
            kind: FieldKind::U32,
            offset: 0,
            min: None,
            max: None,
        }];
        for (i, name) in [
            "prof_current",
            "prof_voltage",
            "prof_pressure",
            "sensor_speed",
            "sensor_depth",
        ]
        .iter()
        .enumerate()
        {
            fields.push(FieldSpec {
                name: (*name).into(),
                kind: FieldKind::F32,
                offset: 4 + i * 4,
                min: None,
                max: None,
            });
        }
        for (i, name) in ["motor_current", "motor_voltage", "status_bits"].iter().enumerate() {
            fields.push(FieldSpec {
                name: (*name).into(),
                kind: FieldKind::U16,
                offset: 24 + i * 2,
                min: None,
                max: None,
            });
        }
        RecordLayout {
            endian: Endian::Big,
            record_len: WFP_SAMPLE_BYTES,
            fields,
            timestamp: TimestampSpec {
                field: "profiler_timestamp".into(),
                epoch: Epoch::Unix,
            },
            tag: None,
        }
    }

    pub fn wfp_format(framing: Framing, strategy: SieveStrategy) -> FormatDescriptor {
        FormatDescriptor {
            id: "test_wfp".into(),
            stream: "wfp_eng_test".into(),
            framing,
            records: RecordFraming {
                strategy,
                header_hex: Some(hex::encode(WFP_E_HEADER)),
                header_len: WFP_E_HEADER_LEN,
                sample_bytes: WFP_SAMPLE_BYTES,
                status_bytes: WFP_STATUS_BYTES,
                augmented_status_bytes: match strategy {
                    SieveStrategy::Forward => None,
                    SieveStrategy::Backward => Some(WFP_AUGMENTED_STATUS_BYTES),
                },
                status_marker: MarkerConfig {
                    prefix_hex: hex::encode(WFP_STATUS_PREFIX),
                    last_min: WFP_STATUS_LAST_MIN,
                    last_max: WFP_STATUS_LAST_MAX,
                },
            },
            layout: wfp_layout(),
        }
    }
}

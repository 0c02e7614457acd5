//! # Sieves
//!
//! A sieve partitions a byte buffer into candidate ranges. The same trait is
//! used at two levels: span sieves pick data spans out of buffered input for
//! the [`Chunker`](crate::chunk::Chunker), record sieves split one data span
//! into sample candidates.

pub mod backward;
pub mod forward;
pub mod header;
pub mod pattern;
pub mod sio;

use anyhow::{Result, anyhow, bail};
use thiserror::Error;

use crate::constants::{SIO_BLOCK_END, SIO_HEADER_LEN};
use crate::format::{Framing, FormatDescriptor, MarkerConfig, SieveStrategy};
use crate::ranges::ByteRange;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SieveError {
    #[error(
        "backward walk misaligned at relative offset {position}: {remaining} bytes fit no record size"
    )]
    Alignment { position: usize, remaining: usize },
}

/// Pure partition of a buffer into ordered, disjoint ranges relative to the buffer.
pub trait Sieve: Send + Sync {
    fn name(&self) -> &str;

    fn sieve(&self, buf: &[u8]) -> Result<Vec<ByteRange>, SieveError>;

    /// Whether every returned range carries its own terminator, so a range
    /// ending at the buffer end is already complete.
    fn terminated(&self) -> bool {
        false
    }

    /// Length of the prefix of `tail` that can never become part of a range,
    /// however many bytes follow. `tail` is the buffered input past the last
    /// range already taken.
    fn settled_prefix(&self, _tail: &[u8]) -> usize {
        0
    }

    /// Length of the start marker, for sieves whose ranges run back to back
    /// from one marker to the next. Such a sieve may be run on any suffix of
    /// the buffer and reports only the ranges whose marker lies inside it.
    fn marker_len(&self) -> Option<usize> {
        None
    }
}

/// Status/control record marker: a fixed prefix followed by one byte in a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMarker {
    prefix: Vec<u8>,
    last_min: u8,
    last_max: u8,
}

impl StatusMarker {
    pub fn new(prefix: Vec<u8>, last_min: u8, last_max: u8) -> Self {
        Self {
            prefix,
            last_min,
            last_max,
        }
    }

    pub fn len(&self) -> usize {
        self.prefix.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// True if `buf` starts with the marker.
    pub fn matches(&self, buf: &[u8]) -> bool {
        if buf.len() < self.len() {
            return false;
        }
        let last = buf[self.prefix.len()];
        buf[..self.prefix.len()] == self.prefix[..] && (self.last_min..=self.last_max).contains(&last)
    }
}

/// Embedded file header that anchors the record region inside a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub pattern: Vec<u8>,
    /// Pattern plus any fixed trailer bytes.
    pub len: usize,
}

/// Geometry shared by the record-level sieves.
#[derive(Debug, Clone)]
pub struct RecordGeometry {
    pub header: Option<RecordHeader>,
    /// Frame prefix skipped before searching for the header.
    pub prefix_len: usize,
    /// Frame terminator excluded from the record region when it is the last byte.
    pub terminator: Option<u8>,
    pub sample_bytes: usize,
    pub status_bytes: usize,
    pub augmented_status_bytes: Option<usize>,
    pub marker: StatusMarker,
}

impl RecordGeometry {
    /// Bounds of the span after stripping frame prefix and terminator.
    pub(crate) fn frame_bounds(&self, buf: &[u8]) -> (usize, usize) {
        let mut end = buf.len();
        if let Some(term) = self.terminator {
            if end > self.prefix_len && buf[end - 1] == term {
                end -= 1;
            }
        }
        let start = self.prefix_len.min(end);
        (start, end)
    }

    /// Start of the record region after the embedded header, if one is present.
    pub(crate) fn header_end(&self, buf: &[u8], start: usize, end: usize) -> Option<usize> {
        let header = self.header.as_ref()?;
        let pos = pattern::find_pattern(&buf[start..end], &header.pattern)?;
        Some((start + pos + header.len).min(end))
    }

    /// End of the record region: the next header occurrence or `end`.
    pub(crate) fn region_end(&self, buf: &[u8], region_start: usize, end: usize) -> usize {
        match &self.header {
            Some(header) => pattern::find_pattern(&buf[region_start..end], &header.pattern)
                .map(|pos| region_start + pos)
                .unwrap_or(end),
            None => end,
        }
    }

    pub(crate) fn smallest_record(&self) -> usize {
        let mut min = self.sample_bytes.min(self.status_bytes);
        if let Some(aug) = self.augmented_status_bytes {
            min = min.min(aug);
        }
        min
    }
}

pub(crate) fn decode_hex(label: &str, value: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(value.trim()).map_err(|e| anyhow!("invalid hex for {label}: {e}"))?;
    if bytes.is_empty() {
        bail!("{label} must not be empty");
    }
    Ok(bytes)
}

fn build_marker(cfg: &MarkerConfig) -> Result<StatusMarker> {
    let prefix = decode_hex("status_marker.prefix_hex", &cfg.prefix_hex)?;
    if cfg.last_min > cfg.last_max {
        bail!(
            "status marker range {:#04x}..={:#04x} is empty",
            cfg.last_min,
            cfg.last_max
        );
    }
    Ok(StatusMarker::new(prefix, cfg.last_min, cfg.last_max))
}

/// Span-level sieve for a format's outer framing.
pub fn build_span_sieve(format: &FormatDescriptor) -> Result<Box<dyn Sieve>> {
    match &format.framing {
        Framing::Sio { instrument_id } => {
            Ok(Box::new(sio::SioBlockSieve::new(Some(instrument_id.as_str()))?))
        }
        Framing::Header { pattern_hex } => {
            let pattern = decode_hex("framing.pattern_hex", pattern_hex)?;
            Ok(Box::new(header::HeaderSpanSieve::new(pattern)))
        }
    }
}

/// Record-level sieve for a format's sample/status layout.
pub fn build_record_sieve(format: &FormatDescriptor) -> Result<Box<dyn Sieve>> {
    let records = &format.records;
    if records.sample_bytes == 0 || records.status_bytes == 0 {
        bail!("format {}: record sizes must be non-zero", format.id);
    }
    let header = match &records.header_hex {
        Some(hex) => {
            let pattern = decode_hex("records.header_hex", hex)?;
            let len = records.header_len.max(pattern.len());
            Some(RecordHeader { pattern, len })
        }
        None => None,
    };
    let (prefix_len, terminator) = match format.framing {
        Framing::Sio { .. } => (SIO_HEADER_LEN, Some(SIO_BLOCK_END)),
        Framing::Header { .. } => (0, None),
    };
    let geometry = RecordGeometry {
        header,
        prefix_len,
        terminator,
        sample_bytes: records.sample_bytes,
        status_bytes: records.status_bytes,
        augmented_status_bytes: records.augmented_status_bytes,
        marker: build_marker(&records.status_marker)?,
    };
    match records.strategy {
        SieveStrategy::Forward => {
            if geometry.header.is_none() {
                bail!("format {}: forward strategy needs records.header_hex", format.id);
            }
            Ok(Box::new(forward::ForwardSieve::new(geometry)))
        }
        SieveStrategy::Backward => Ok(Box::new(backward::BackwardSieve::new(geometry))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::constants::*;

    pub fn wfp_marker() -> StatusMarker {
        StatusMarker::new(WFP_STATUS_PREFIX.to_vec(), WFP_STATUS_LAST_MIN, WFP_STATUS_LAST_MAX)
    }

    pub fn raw_geometry(augmented: Option<usize>) -> RecordGeometry {
        RecordGeometry {
            header: Some(RecordHeader {
                pattern: WFP_E_HEADER.to_vec(),
                len: WFP_E_HEADER_LEN,
            }),
            prefix_len: 0,
            terminator: None,
            sample_bytes: WFP_SAMPLE_BYTES,
            status_bytes: WFP_STATUS_BYTES,
            augmented_status_bytes: augmented,
            marker: wfp_marker(),
        }
    }

    pub fn e_header() -> Vec<u8> {
        let mut out = WFP_E_HEADER.to_vec();
        out.extend_from_slice(&0x51F2_56B3u32.to_be_bytes());
        out.extend_from_slice(&0x51F2_572Eu32.to_be_bytes());
        out
    }

    pub fn sample(seed: u8) -> Vec<u8> {
        let mut out = vec![0u8; WFP_SAMPLE_BYTES];
        out[..4].copy_from_slice(&(0x51F2_572Eu32 + seed as u32).to_be_bytes());
        for (i, b) in out.iter_mut().enumerate().skip(4) {
            *b = seed.wrapping_add(i as u8) & 0x7F;
        }
        out
    }

    pub fn status(augmented: bool) -> Vec<u8> {
        let mut out = vec![0xFF, 0xFF, 0xFF, 0xFC];
        out.extend_from_slice(&[0x10; 12]);
        if augmented {
            out.extend_from_slice(&[0x00, 0x00]);
        }
        out
    }
}

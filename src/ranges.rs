//! # Byte range bookkeeping
//!
//! Tracks which absolute offsets of the input are still unscanned and which
//! registered data spans still hold undelivered records. Pure data structure,
//! no I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// End offset used for an open-ended unprocessed range.
pub const STREAM_END: u64 = u64::MAX;

/// Half-open byte interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Translate a range relative to `base` into absolute offsets.
    pub fn shift(&self, base: u64) -> ByteRange {
        ByteRange::new(
            self.start.saturating_add(base),
            self.end.saturating_add(base),
        )
    }
}

impl From<[u64; 2]> for ByteRange {
    fn from(pair: [u64; 2]) -> Self {
        ByteRange::new(pair[0], pair[1])
    }
}

impl From<ByteRange> for [u64; 2] {
    fn from(range: ByteRange) -> Self {
        [range.start, range.end]
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.end == STREAM_END {
            write!(f, "[{}, end)", self.start)
        } else {
            write!(f, "[{}, {})", self.start, self.end)
        }
    }
}

/// A registered data span and how many of its candidate records were delivered.
///
/// Persisted as `[start, end, returned, total]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 4]", into = "[u64; 4]")]
pub struct InProcessSpan {
    pub range: ByteRange,
    pub returned: u64,
    pub total: u64,
}

impl InProcessSpan {
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.returned)
    }
}

impl From<[u64; 4]> for InProcessSpan {
    fn from(raw: [u64; 4]) -> Self {
        Self {
            range: ByteRange::new(raw[0], raw[1]),
            returned: raw[2],
            total: raw[3],
        }
    }
}

impl From<InProcessSpan> for [u64; 4] {
    fn from(span: InProcessSpan) -> Self {
        [span.range.start, span.range.end, span.returned, span.total]
    }
}

/// Persisted cursor state handed to callers for durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorState {
    pub unprocessed_ranges: Vec<ByteRange>,
    pub in_process_ranges: Vec<InProcessSpan>,
    pub last_timestamp: f64,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            unprocessed_ranges: vec![ByteRange::new(0, STREAM_END)],
            in_process_ranges: Vec::new(),
            last_timestamp: 0.0,
        }
    }
}

impl CursorState {
    /// State covering only `[0, len)` of the input.
    pub fn bounded(len: u64) -> Self {
        Self {
            unprocessed_ranges: if len > 0 {
                vec![ByteRange::new(0, len)]
            } else {
                Vec::new()
            },
            ..Self::default()
        }
    }

    /// Lowest offset any part of this state still refers to.
    pub fn lowest_offset(&self) -> Option<u64> {
        let unprocessed = self.unprocessed_ranges.first().map(|r| r.start);
        let in_process = self.in_process_ranges.first().map(|s| s.range.start);
        match (unprocessed, in_process) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Highest offset this state refers to, ignoring an open-ended tail.
    /// The input must be at least this long for the state to apply to it.
    pub fn highest_offset(&self) -> u64 {
        let unprocessed = self
            .unprocessed_ranges
            .iter()
            .map(|r| if r.end == STREAM_END { r.start } else { r.end });
        let in_process = self.in_process_ranges.iter().map(|s| s.range.end);
        unprocessed.chain(in_process).max().unwrap_or(0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid range {range}: {reason}")]
    InvalidRange { range: ByteRange, reason: String },
    #[error("corrupt cursor state: {0}")]
    CorruptState(String),
}

impl RangeError {
    fn invalid(range: ByteRange, reason: &str) -> Self {
        RangeError::InvalidRange {
            range,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ByteRangeTracker {
    unprocessed: Vec<ByteRange>,
    in_process: Vec<InProcessSpan>,
}

impl ByteRangeTracker {
    /// Tracker for a fresh, open-ended stream.
    pub fn new() -> Self {
        Self {
            unprocessed: vec![ByteRange::new(0, STREAM_END)],
            in_process: Vec::new(),
        }
    }

    pub fn unprocessed(&self) -> &[ByteRange] {
        &self.unprocessed
    }

    pub fn in_process(&self) -> &[InProcessSpan] {
        &self.in_process
    }

    /// First unprocessed range that still has bytes at or after `offset`.
    pub fn next_unprocessed(&self, offset: u64) -> Option<ByteRange> {
        self.unprocessed.iter().find(|r| r.end > offset).copied()
    }

    /// Remove `range` from the unprocessed set.
    ///
    /// The range must sit entirely inside one unprocessed interval; anything
    /// else means the caller lost track of the input.
    pub fn mark_scanned(&mut self, range: ByteRange) -> Result<(), RangeError> {
        if range.start > range.end {
            return Err(RangeError::invalid(range, "start is past end"));
        }
        if range.is_empty() {
            return Ok(());
        }
        let idx = self
            .unprocessed
            .iter()
            .position(|r| r.contains(&range))
            .ok_or_else(|| RangeError::invalid(range, "not contained in unprocessed ranges"))?;

        let existing = self.unprocessed[idx];
        let before = ByteRange::new(existing.start, range.start);
        let after = ByteRange::new(range.end, existing.end);

        let mut replacement = Vec::with_capacity(2);
        if !before.is_empty() {
            replacement.push(before);
        }
        if !after.is_empty() {
            replacement.push(after);
        }
        self.unprocessed.splice(idx..=idx, replacement);
        Ok(())
    }

    /// Record a data span holding `record_count` candidate records.
    ///
    /// A span with no candidates is fully consumed on arrival and leaves no entry.
    pub fn register_span(&mut self, range: ByteRange, record_count: u64) -> Result<(), RangeError> {
        if range.is_empty() {
            return Err(RangeError::invalid(range, "empty span"));
        }
        if self.in_process.iter().any(|s| s.range.overlaps(&range)) {
            return Err(RangeError::invalid(range, "overlaps a registered span"));
        }
        if self.unprocessed.iter().any(|r| r.overlaps(&range)) {
            return Err(RangeError::invalid(range, "span has not been scanned"));
        }
        if record_count == 0 {
            return Ok(());
        }
        let idx = self
            .in_process
            .partition_point(|s| s.range.start < range.start);
        self.in_process.insert(
            idx,
            InProcessSpan {
                range,
                returned: 0,
                total: record_count,
            },
        );
        Ok(())
    }

    /// Count one delivered (or skipped) record against the span `range`.
    ///
    /// Returns `true` when the span is now fully consumed and was removed.
    pub fn consume_one(&mut self, range: ByteRange) -> Result<bool, RangeError> {
        let idx = self
            .in_process
            .iter()
            .position(|s| s.range == range)
            .ok_or_else(|| RangeError::invalid(range, "no registered span"))?;
        let span = &mut self.in_process[idx];
        span.returned += 1;
        if span.returned >= span.total {
            self.in_process.remove(idx);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn snapshot(&self, last_timestamp: f64) -> CursorState {
        CursorState {
            unprocessed_ranges: self.unprocessed.clone(),
            in_process_ranges: self.in_process.clone(),
            last_timestamp,
        }
    }

    /// Replace the tracker contents with a validated copy of `state`.
    ///
    /// Adjacent unprocessed ranges are merged and exhausted in-process entries
    /// dropped; overlaps and inverted ranges are rejected.
    pub fn restore(&mut self, state: &CursorState) -> Result<(), RangeError> {
        let mut unprocessed: Vec<ByteRange> = Vec::with_capacity(state.unprocessed_ranges.len());
        for range in &state.unprocessed_ranges {
            if range.start > range.end {
                return Err(RangeError::CorruptState(format!(
                    "unprocessed range {range} is inverted"
                )));
            }
            if range.is_empty() {
                continue;
            }
            match unprocessed.last_mut() {
                Some(prev) if range.start < prev.end => {
                    return Err(RangeError::CorruptState(format!(
                        "unprocessed range {range} overlaps or precedes {prev}"
                    )));
                }
                Some(prev) if range.start == prev.end => prev.end = range.end,
                _ => unprocessed.push(*range),
            }
        }

        let mut in_process: Vec<InProcessSpan> = Vec::with_capacity(state.in_process_ranges.len());
        for span in &state.in_process_ranges {
            if span.range.start > span.range.end {
                return Err(RangeError::CorruptState(format!(
                    "in-process range {} is inverted",
                    span.range
                )));
            }
            if span.range.is_empty() {
                return Err(RangeError::CorruptState(format!(
                    "in-process range {} is empty",
                    span.range
                )));
            }
            if span.returned > span.total {
                return Err(RangeError::CorruptState(format!(
                    "in-process range {} returned {} of {} records",
                    span.range, span.returned, span.total
                )));
            }
            if let Some(prev) = in_process.last() {
                if span.range.start < prev.range.end {
                    return Err(RangeError::CorruptState(format!(
                        "in-process range {} overlaps or precedes {}",
                        span.range, prev.range
                    )));
                }
            }
            if let Some(clash) = unprocessed.iter().find(|r| r.overlaps(&span.range)) {
                return Err(RangeError::CorruptState(format!(
                    "in-process range {} overlaps unprocessed range {clash}",
                    span.range
                )));
            }
            if span.returned < span.total {
                in_process.push(*span);
            }
        }

        if !state.last_timestamp.is_finite() || state.last_timestamp < 0.0 {
            return Err(RangeError::CorruptState(format!(
                "last_timestamp {} is not a valid NTP time",
                state.last_timestamp
            )));
        }

        self.unprocessed = unprocessed;
        self.in_process = in_process;
        Ok(())
    }
}

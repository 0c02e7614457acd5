//! # Extraction Engine
//!
//! Orchestrates the chunker, both sieve levels, the record decoder and the
//! byte range tracker. Single-threaded and pull-based: all work happens inside
//! [`ExtractionEngine::get_records`], which reads from its [`ByteSource`] only
//! as far as needed to deliver the requested records.
//!
//! Cursor state changes after every scanned region, every registered span and
//! every consumed candidate; each change is pushed to the caller's sink.

pub mod events;

use std::collections::VecDeque;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::chunk::{ChunkError, Chunker};
use crate::constants::{DEFAULT_MAX_BUFFER, DEFAULT_READ_SIZE};
use crate::decode::{Record, RecordDecoder, build_decoder};
use crate::format::FormatDescriptor;
use crate::ranges::{ByteRange, ByteRangeTracker, CursorState, InProcessSpan, RangeError};
use crate::sieve::{Sieve, SieveError, build_record_sieve, build_span_sieve};
use crate::source::{ByteSource, SourceError};

pub use events::{CollectingSink, ExtractionSink, Fault, FaultKind, NullSink, SinkError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
    #[error("span sieve failed: {0}")]
    Sieve(#[from] SieveError),
    #[error("buffer overflow: {0}")]
    BufferOverflow(#[from] ChunkError),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("invalid format: {0}")]
    Format(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    Idle,
    Scanning,
    Sieving,
    Decoding,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub bytes_read: u64,
    pub non_data_bytes: u64,
    pub spans_registered: u64,
    pub records_emitted: u64,
    pub decode_faults: u64,
    pub alignment_faults: u64,
    pub timestamp_regressions: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Bytes requested from the source per pull.
    pub read_size: usize,
    /// Upper bound on buffered input.
    pub max_buffer_bytes: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            read_size: DEFAULT_READ_SIZE,
            max_buffer_bytes: DEFAULT_MAX_BUFFER,
        }
    }
}

/// The format-specific pieces an engine is assembled from.
pub struct EngineParts {
    pub stream: String,
    pub span_sieve: Box<dyn Sieve>,
    pub record_sieve: Box<dyn Sieve>,
    pub decoder: Box<dyn RecordDecoder>,
}

impl EngineParts {
    pub fn from_format(format: &FormatDescriptor) -> anyhow::Result<Self> {
        format.validate()?;
        Ok(Self {
            stream: format.stream.clone(),
            span_sieve: build_span_sieve(format)?,
            record_sieve: build_record_sieve(format)?,
            decoder: build_decoder(format)?,
        })
    }
}

/// A registered span whose candidates are being decoded.
#[derive(Debug)]
struct ActiveSpan {
    span: ByteRange,
    /// Absolute candidate ranges in file order.
    candidates: Vec<ByteRange>,
    next: usize,
}

pub struct ExtractionEngine<S: ByteSource> {
    stream: String,
    span_sieve: Box<dyn Sieve>,
    record_sieve: Box<dyn Sieve>,
    decoder: Box<dyn RecordDecoder>,
    source: S,
    chunker: Chunker,
    tracker: ByteRangeTracker,
    last_timestamp: f64,
    active: VecDeque<ActiveSpan>,
    /// Restored in-process spans whose candidates have not been recomputed yet.
    rederive: VecDeque<InProcessSpan>,
    eof: bool,
    phase: EnginePhase,
    stats: EngineStats,
    options: EngineOptions,
}

impl<S: ByteSource> ExtractionEngine<S> {
    /// Build an engine over `source`, resuming from `state` when given.
    pub fn new(
        parts: EngineParts,
        source: S,
        state: Option<CursorState>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let mut engine = Self {
            stream: parts.stream,
            span_sieve: parts.span_sieve,
            record_sieve: parts.record_sieve,
            decoder: parts.decoder,
            source,
            chunker: Chunker::new(0, options.max_buffer_bytes),
            tracker: ByteRangeTracker::new(),
            last_timestamp: 0.0,
            active: VecDeque::new(),
            rederive: VecDeque::new(),
            eof: false,
            phase: EnginePhase::Idle,
            stats: EngineStats::default(),
            options,
        };
        engine.set_state(state.unwrap_or_default())?;
        Ok(engine)
    }

    pub fn from_format(
        format: &FormatDescriptor,
        source: S,
        state: Option<CursorState>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let parts =
            EngineParts::from_format(format).map_err(|e| EngineError::Format(format!("{e:#}")))?;
        debug!(
            "engine: format {} with {} span sieve and {} record sieve",
            format.id,
            parts.span_sieve.name(),
            parts.record_sieve.name()
        );
        Self::new(parts, source, state, options)
    }

    pub fn state(&self) -> CursorState {
        self.tracker.snapshot(self.last_timestamp)
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Replace the cursor state. The next `get_records` resumes exactly from it.
    ///
    /// Registered spans are re-derived from their stored bounds; they are never
    /// handed to the span sieve again.
    pub fn set_state(&mut self, state: CursorState) -> Result<(), EngineError> {
        let mut tracker = ByteRangeTracker::new();
        tracker.restore(&state)?;
        let restored = tracker.snapshot(state.last_timestamp);
        let floor = restored.lowest_offset().unwrap_or(0);

        self.source.seek(floor)?;
        self.chunker.reset(floor);
        self.rederive = tracker.in_process().iter().copied().collect();
        self.tracker = tracker;
        self.last_timestamp = state.last_timestamp;
        self.active.clear();
        self.eof = false;
        self.phase = EnginePhase::Idle;
        debug!(
            "engine: state set at offset {floor}, {} unprocessed ranges, {} spans to re-derive",
            restored.unprocessed_ranges.len(),
            self.rederive.len()
        );
        Ok(())
    }

    /// Deliver up to `n` records in byte-offset order.
    ///
    /// Returns fewer than `n` once the source has nothing more right now.
    /// Content errors go to `sink` as faults; only fatal errors are returned.
    pub fn get_records(
        &mut self,
        n: usize,
        sink: &mut dyn ExtractionSink,
    ) -> Result<Vec<Record>, EngineError> {
        self.eof = false;
        let mut records = Vec::with_capacity(n.min(1024));
        let result = self.pull(n, &mut records, sink);
        self.phase = EnginePhase::Idle;
        result.map(|_| records)
    }

    fn pull(
        &mut self,
        n: usize,
        records: &mut Vec<Record>,
        sink: &mut dyn ExtractionSink,
    ) -> Result<(), EngineError> {
        while records.len() < n {
            if !self.active.is_empty() {
                self.decode_next(records, sink)?;
                continue;
            }
            if let Some(entry) = self.rederive.front().copied() {
                if self.rederive_span(entry)? {
                    continue;
                }
                break;
            }
            if !self.scan(sink)? {
                break;
            }
        }
        Ok(())
    }

    fn decode_next(
        &mut self,
        records: &mut Vec<Record>,
        sink: &mut dyn ExtractionSink,
    ) -> Result<(), EngineError> {
        self.phase = EnginePhase::Decoding;
        let Some(active) = self.active.front_mut() else {
            return Ok(());
        };
        let span = active.span;
        let candidate = active.candidates[active.next];
        active.next += 1;
        if active.next >= active.candidates.len() {
            self.active.pop_front();
        }

        let raw = self
            .chunker
            .slice(candidate)
            .ok_or_else(|| RangeError::InvalidRange {
                range: candidate,
                reason: "candidate bytes are no longer buffered".to_string(),
            })?
            .to_vec();

        match self.decoder.decode(&raw) {
            Ok(decoded) => {
                self.tracker.consume_one(span)?;
                if decoded.timestamp < self.last_timestamp {
                    self.stats.timestamp_regressions += 1;
                    let fault = Fault {
                        kind: FaultKind::TimestampRegression,
                        range: candidate,
                        message: format!(
                            "timestamp {} precedes previous {}",
                            decoded.timestamp, self.last_timestamp
                        ),
                    };
                    warn!("engine: {} at {candidate}", fault.message);
                    sink.on_fault(&fault)?;
                }
                self.last_timestamp = decoded.timestamp;
                let record = Record {
                    stream: self.stream.clone(),
                    range: candidate,
                    timestamp: decoded.timestamp,
                    fields: decoded.fields,
                    raw,
                };
                self.stats.records_emitted += 1;
                sink.on_record(&record)?;
                records.push(record);
            }
            Err(err) => {
                self.tracker.consume_one(span)?;
                self.stats.decode_faults += 1;
                warn!("engine: decode failed at {candidate}: {err}");
                sink.on_fault(&Fault {
                    kind: FaultKind::Decode,
                    range: candidate,
                    message: err.to_string(),
                })?;
            }
        }
        sink.on_state(&self.state())?;
        Ok(())
    }

    /// Recompute the candidates of a restored span. Returns `false` if its
    /// bytes cannot be buffered yet.
    fn rederive_span(&mut self, entry: InProcessSpan) -> Result<bool, EngineError> {
        self.phase = EnginePhase::Sieving;
        while self.chunker.end() < entry.range.end {
            if self.eof {
                debug!(
                    "engine: input ends before restored span {}",
                    entry.range
                );
                return Ok(false);
            }
            self.fill()?;
        }
        let bytes = self.chunker.slice(entry.range).ok_or_else(|| {
            RangeError::CorruptState(format!(
                "restored span {} is not addressable in the input",
                entry.range
            ))
        })?;
        let candidates = self.record_sieve.sieve(bytes).map_err(|e| {
            RangeError::CorruptState(format!(
                "restored span {} no longer sieves: {e}",
                entry.range
            ))
        })?;
        if candidates.len() as u64 != entry.total {
            return Err(RangeError::CorruptState(format!(
                "restored span {} holds {} records, state says {}",
                entry.range,
                candidates.len(),
                entry.total
            ))
            .into());
        }
        self.rederive.pop_front();
        trace!(
            "engine: re-derived span {} resuming at record {} of {}",
            entry.range, entry.returned, entry.total
        );
        self.active.push_back(ActiveSpan {
            span: entry.range,
            candidates: candidates
                .iter()
                .map(|r| r.shift(entry.range.start))
                .collect(),
            next: entry.returned as usize,
        });
        Ok(true)
    }

    /// One scanning step. Returns `false` when nothing more can be done
    /// until the source grows.
    fn scan(&mut self, sink: &mut dyn ExtractionSink) -> Result<bool, EngineError> {
        self.phase = EnginePhase::Scanning;
        if let Some(range) = self.chunker.next_non_data() {
            self.tracker.mark_scanned(range)?;
            self.stats.non_data_bytes += range.len();
            trace!("engine: skipped non-data {range}");
            sink.on_state(&self.state())?;
            return Ok(true);
        }
        if let Some(span) = self.chunker.next_data() {
            self.tracker.mark_scanned(span)?;
            self.register(span, sink)?;
            sink.on_state(&self.state())?;
            return Ok(true);
        }

        let cursor = self.chunker.cursor();
        let Some(window) = self.tracker.next_unprocessed(cursor) else {
            return Ok(false);
        };
        if window.start > cursor {
            self.chunker.skip_to(window.start);
        }
        let window_buffered = self.chunker.end() >= window.end;
        let queued = self.chunker.split(
            self.span_sieve.as_ref(),
            window.end,
            self.eof || window_buffered,
        )?;
        if queued > 0 {
            return Ok(true);
        }
        if window_buffered {
            // the rest of this window can never settle; it stays unprocessed
            self.chunker.skip_to(window.end);
            return Ok(true);
        }
        if self.eof {
            return Ok(false);
        }
        self.fill()?;
        Ok(true)
    }

    fn register(&mut self, span: ByteRange, sink: &mut dyn ExtractionSink) -> Result<(), EngineError> {
        self.phase = EnginePhase::Sieving;
        let bytes = self
            .chunker
            .slice(span)
            .ok_or_else(|| RangeError::InvalidRange {
                range: span,
                reason: "span bytes are no longer buffered".to_string(),
            })?;
        match self.record_sieve.sieve(bytes) {
            Ok(relative) => {
                self.tracker.register_span(span, relative.len() as u64)?;
                self.stats.spans_registered += 1;
                debug!(
                    "engine: span {span} holds {} candidates ({} sieve)",
                    relative.len(),
                    self.record_sieve.name()
                );
                if !relative.is_empty() {
                    self.active.push_back(ActiveSpan {
                        span,
                        candidates: relative.iter().map(|r| r.shift(span.start)).collect(),
                        next: 0,
                    });
                }
            }
            Err(err) => {
                self.tracker.register_span(span, 0)?;
                self.stats.alignment_faults += 1;
                warn!("engine: span {span} discarded: {err}");
                sink.on_fault(&Fault {
                    kind: FaultKind::Alignment,
                    range: span,
                    message: err.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Pull the next block of input, releasing bytes nothing refers to anymore.
    fn fill(&mut self) -> Result<(), EngineError> {
        let mut floor = self.chunker.cursor();
        if let Some(active) = self.active.front() {
            if let Some(next) = active.candidates.get(active.next) {
                floor = floor.min(next.start);
            }
        }
        if let Some(entry) = self.rederive.front() {
            floor = floor.min(entry.range.start);
        }
        self.chunker.discard_before(floor);

        let room = self.chunker.capacity().saturating_sub(self.chunker.buffered());
        let want = self.options.read_size.min(room);
        if want == 0 {
            return Err(ChunkError::Overflow {
                buffered: self.chunker.buffered(),
                incoming: self.options.read_size,
                capacity: self.chunker.capacity(),
            }
            .into());
        }
        match self.source.read(want)? {
            Some(bytes) if !bytes.is_empty() => {
                self.stats.bytes_read += bytes.len() as u64;
                trace!(
                    "engine: read {} bytes at {}",
                    bytes.len(),
                    self.chunker.end()
                );
                self.chunker.feed(&bytes)?;
            }
            _ => {
                trace!("engine: source exhausted at {}", self.chunker.end());
                self.eof = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::testing::wfp_format;
    use crate::format::{Framing, SieveStrategy};
    use crate::sieve::sio::build_block;
    use crate::sieve::testing::{e_header, sample, status};
    use crate::source::SliceSource;

    fn sio_format() -> FormatDescriptor {
        wfp_format(
            Framing::Sio {
                instrument_id: "WE".into(),
            },
            SieveStrategy::Forward,
        )
    }

    fn we_block(seeds: std::ops::Range<u8>) -> Vec<u8> {
        let mut payload = e_header();
        for seed in seeds {
            payload.extend_from_slice(&sample(seed));
        }
        build_block("WE", 0x51F2_56B3, &payload)
    }

    fn engine(input: Vec<u8>, state: Option<CursorState>) -> ExtractionEngine<SliceSource> {
        ExtractionEngine::from_format(
            &sio_format(),
            SliceSource::new(input),
            state,
            EngineOptions {
                read_size: 64,
                ..EngineOptions::default()
            },
        )
        .expect("engine")
    }

    #[test]
    fn decodes_one_block_in_small_reads() {
        let block = we_block(0..4);
        let len = block.len() as u64;
        let mut engine = engine(block, None);
        let mut sink = CollectingSink::new();
        let records = engine.get_records(10, &mut sink).expect("records");

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].range, ByteRange::new(33 + 24, 33 + 54));
        assert!(sink.faults.is_empty());
        assert_eq!(engine.phase(), EnginePhase::Idle);
        let state = engine.state();
        assert!(state.in_process_ranges.is_empty());
        assert_eq!(state.unprocessed_ranges, vec![ByteRange::new(len, u64::MAX)]);
        assert_eq!(engine.stats().records_emitted, 4);
        assert_eq!(sink.last_state.as_ref(), Some(&state));
    }

    #[test]
    fn stops_after_n_records_mid_span() {
        let mut engine = engine(we_block(0..4), None);
        let records = engine.get_records(3, &mut NullSink).expect("records");
        assert_eq!(records.len(), 3);
        let state = engine.state();
        assert_eq!(state.in_process_ranges.len(), 1);
        assert_eq!(state.in_process_ranges[0].returned, 3);
        assert_eq!(state.in_process_ranges[0].total, 4);
    }

    #[test]
    fn status_records_are_not_emitted() {
        let mut payload = e_header();
        payload.extend_from_slice(&sample(1));
        payload.extend_from_slice(&status(false));
        payload.extend_from_slice(&sample(2));
        let mut engine = engine(build_block("WE", 1, &payload), None);
        let records = engine.get_records(10, &mut NullSink).expect("records");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn restore_rejects_span_count_mismatch() {
        let block = we_block(0..4);
        let len = block.len() as u64;
        let state = CursorState {
            unprocessed_ranges: vec![ByteRange::new(len, u64::MAX)],
            in_process_ranges: vec![InProcessSpan {
                range: ByteRange::new(0, len),
                returned: 1,
                total: 5,
            }],
            last_timestamp: 0.0,
        };
        let mut engine = engine(block, Some(state));
        let err = engine.get_records(1, &mut NullSink).unwrap_err();
        assert!(matches!(err, EngineError::Range(RangeError::CorruptState(_))));
    }

    #[test]
    fn buffer_bound_is_fatal() {
        let mut partial = build_block("WE", 1, &[0x55; 100]);
        partial.truncate(60);
        let mut engine = ExtractionEngine::from_format(
            &sio_format(),
            SliceSource::new(partial),
            None,
            EngineOptions {
                read_size: 64,
                max_buffer_bytes: 32,
            },
        )
        .expect("engine");
        let err = engine.get_records(1, &mut NullSink).unwrap_err();
        assert!(matches!(err, EngineError::BufferOverflow(_)));
    }

    #[test]
    fn non_data_streams_through_a_small_buffer() {
        let mut input = vec![0x20u8; 500];
        input.extend_from_slice(&we_block(0..2));
        let mut engine = ExtractionEngine::from_format(
            &sio_format(),
            SliceSource::new(input),
            None,
            EngineOptions {
                read_size: 48,
                max_buffer_bytes: 256,
            },
        )
        .expect("engine");
        let records = engine.get_records(5, &mut NullSink).expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(engine.stats().non_data_bytes, 500);
    }
}

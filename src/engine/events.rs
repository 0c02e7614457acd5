//! # Engine Events
//!
//! What the engine reports while it works: decoded records, faults, and cursor
//! snapshots for external persistence.

use serde::Serialize;
use thiserror::Error;

use crate::decode::Record;
use crate::ranges::{ByteRange, CursorState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// A candidate range failed to decode; the range is consumed.
    Decode,
    /// The record sieve could not partition a span; the span is discarded.
    Alignment,
    /// A record's time runs backwards; the record is still emitted.
    TimestampRegression,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Decode => "decode",
            FaultKind::Alignment => "alignment",
            FaultKind::TimestampRegression => "timestamp_regression",
        }
    }
}

/// A recoverable content error, reported out of band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fault {
    pub kind: FaultKind,
    /// Candidate range for decode faults, span range for alignment faults.
    pub range: ByteRange,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(String),
    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Receives engine output for the duration of one `get_records` call.
pub trait ExtractionSink {
    fn on_record(&mut self, _record: &Record) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_fault(&mut self, _fault: &Fault) -> Result<(), SinkError> {
        Ok(())
    }

    /// Called after every state mutation with a full snapshot.
    fn on_state(&mut self, _state: &CursorState) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl ExtractionSink for NullSink {}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub records: Vec<Record>,
    pub faults: Vec<Fault>,
    pub state_updates: usize,
    pub last_state: Option<CursorState>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults_of(&self, kind: FaultKind) -> impl Iterator<Item = &Fault> {
        self.faults.iter().filter(move |f| f.kind == kind)
    }
}

impl ExtractionSink for CollectingSink {
    fn on_record(&mut self, record: &Record) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn on_fault(&mut self, fault: &Fault) -> Result<(), SinkError> {
        self.faults.push(fault.clone());
        Ok(())
    }

    fn on_state(&mut self, state: &CursorState) -> Result<(), SinkError> {
        self.state_updates += 1;
        self.last_state = Some(state.clone());
        Ok(())
    }
}

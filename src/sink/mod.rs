//! File-backed record and fault writers used by the command-line driver.

pub mod csv;
pub mod jsonl;

use std::path::{Path, PathBuf};

use crate::decode::Record;
use crate::engine::{ExtractionSink, Fault, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputBackendKind {
    Jsonl,
    Csv,
}

/// Context stamped on every written line.
#[derive(Debug, Clone)]
pub struct OutputContext {
    pub format_id: String,
    pub config_hash: String,
    pub input_path: String,
    pub tool_version: String,
}

impl OutputContext {
    pub fn new(format_id: &str, config_hash: &str, input_path: &Path) -> Self {
        Self {
            format_id: format_id.to_string(),
            config_hash: config_hash.to_string(),
            input_path: input_path.to_string_lossy().to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The file writer selected for a run.
pub enum FileSink {
    Jsonl(jsonl::JsonlSink),
    Csv(csv::CsvSink),
}

impl FileSink {
    pub fn flush(&mut self) -> Result<(), SinkError> {
        match self {
            FileSink::Jsonl(sink) => sink.flush(),
            FileSink::Csv(sink) => sink.flush(),
        }
    }

    /// Directory the output files live in.
    pub fn dir(&self) -> &Path {
        match self {
            FileSink::Jsonl(sink) => sink.dir(),
            FileSink::Csv(sink) => sink.dir(),
        }
    }
}

impl ExtractionSink for FileSink {
    fn on_record(&mut self, record: &Record) -> Result<(), SinkError> {
        match self {
            FileSink::Jsonl(sink) => sink.on_record(record),
            FileSink::Csv(sink) => sink.on_record(record),
        }
    }

    fn on_fault(&mut self, fault: &Fault) -> Result<(), SinkError> {
        match self {
            FileSink::Jsonl(sink) => sink.on_fault(fault),
            FileSink::Csv(sink) => sink.on_fault(fault),
        }
    }
}

impl From<::csv::Error> for SinkError {
    fn from(err: ::csv::Error) -> Self {
        SinkError::Serialize(err.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Serialize(err.to_string())
    }
}

/// Output directory for one format: `<root>/<format_id>`.
pub fn format_dir(root: &Path, format_id: &str) -> PathBuf {
    root.join(format_id)
}

/// Open writers for `backend` under `<root>/<format_id>`. Existing files are
/// appended to so a resumed run continues the same output.
pub fn build_sink(
    backend: OutputBackendKind,
    root: &Path,
    ctx: OutputContext,
) -> Result<FileSink, SinkError> {
    let dir = format_dir(root, &ctx.format_id);
    std::fs::create_dir_all(&dir)?;
    match backend {
        OutputBackendKind::Jsonl => Ok(FileSink::Jsonl(jsonl::JsonlSink::new(&dir, ctx)?)),
        OutputBackendKind::Csv => Ok(FileSink::Csv(csv::CsvSink::new(&dir, ctx)?)),
    }
}

pub(crate) fn open_append(path: &Path) -> Result<(std::fs::File, bool), SinkError> {
    let existed = path.exists() && std::fs::metadata(path)?.len() > 0;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok((file, existed))
}

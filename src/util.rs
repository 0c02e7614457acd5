//! # Utility Module
//!
//! Driver helpers shared by the binary and the integration tests: output
//! directory checks, format selection, and the batch loop with checkpointing.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow, ensure};
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointState, save_checkpoint};
use crate::config::Config;
use crate::engine::{EngineStats, ExtractionEngine};
use crate::format::FormatDescriptor;
use crate::ranges::CursorState;
use crate::sink::{FileSink, OutputBackendKind};
use crate::source::ByteSource;

/// Convert CLI output backend to internal enum
pub fn backend_from_cli(backend: crate::cli::OutputBackend) -> OutputBackendKind {
    match backend {
        crate::cli::OutputBackend::Jsonl => OutputBackendKind::Jsonl,
        crate::cli::OutputBackend::Csv => OutputBackendKind::Csv,
    }
}

/// Create the output root if needed and check it accepts new files.
/// A world-writable root only warns.
pub fn ensure_output_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating output directory {}", path.display()))?;
    }
    let metadata = std::fs::metadata(path)?;
    ensure!(
        metadata.is_dir(),
        "output path is not a directory: {}",
        path.display()
    );

    let probe = path.join(".mulesieve_write_probe");
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)
        .with_context(|| format!("output directory is not writable: {}", path.display()))?;
    let _ = std::fs::remove_file(&probe);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o002 != 0 {
            warn!("output directory is world-writable: {}", path.display());
        }
    }
    Ok(())
}

/// Pick the requested format, or the config default.
pub fn select_format<'a>(cfg: &'a Config, requested: Option<&str>) -> Result<&'a FormatDescriptor> {
    let id = requested.unwrap_or(&cfg.default_format);
    cfg.format(id).ok_or_else(|| {
        let known: Vec<&str> = cfg.formats.iter().map(|f| f.id.as_str()).collect();
        anyhow!("unknown format {id}; known formats: {}", known.join(", "))
    })
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub format_id: String,
    pub config_hash: String,
    pub input_path: PathBuf,
    pub batch_size: usize,
    pub max_records: Option<u64>,
    pub checkpoint: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub records: u64,
    pub batches: u64,
    pub interrupted: bool,
    pub stats: EngineStats,
    pub state: CursorState,
}

/// Pull batches until the input is exhausted, `max_records` is reached or
/// `shutdown` is raised. Output is flushed and the checkpoint written after
/// every batch and once more on the way out.
pub fn run_extraction<S: ByteSource>(
    engine: &mut ExtractionEngine<S>,
    sink: &mut FileSink,
    opts: &RunOptions,
    shutdown: &AtomicBool,
) -> Result<RunSummary> {
    let batch_size = opts.batch_size.max(1);
    let mut records = 0u64;
    let mut batches = 0u64;
    let mut interrupted = false;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("shutdown requested; stopping after {records} records");
            interrupted = true;
            break;
        }
        let want = match opts.max_records {
            Some(max) => (max.saturating_sub(records)).min(batch_size as u64) as usize,
            None => batch_size,
        };
        if want == 0 {
            break;
        }
        let batch = engine
            .get_records(want, sink)
            .context("extraction failed")?;
        records += batch.len() as u64;
        batches += 1;
        sink.flush()?;
        write_checkpoint(opts, engine.state())?;
        debug!(
            "batch {batches}: {} records, {records} total",
            batch.len()
        );
        if batch.len() < want {
            break;
        }
    }

    let state = engine.state();
    write_checkpoint(opts, state.clone())?;
    let stats = engine.stats().clone();
    info!(
        "extracted {records} records in {batches} batches ({} bytes read, {} decode faults, {} alignment faults, {} timestamp regressions)",
        stats.bytes_read, stats.decode_faults, stats.alignment_faults, stats.timestamp_regressions
    );
    Ok(RunSummary {
        records,
        batches,
        interrupted,
        stats,
        state,
    })
}

fn write_checkpoint(opts: &RunOptions, cursor: CursorState) -> Result<()> {
    let Some(path) = &opts.checkpoint else {
        return Ok(());
    };
    let input_len = std::fs::metadata(&opts.input_path)
        .with_context(|| format!("reading length of {}", opts.input_path.display()))?
        .len();
    let state = CheckpointState::new(
        &opts.format_id,
        &opts.config_hash,
        &opts.input_path,
        input_len,
        cursor,
    );
    save_checkpoint(path, &state)
        .with_context(|| format!("writing checkpoint {}", path.display()))
}

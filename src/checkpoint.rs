//! # Checkpoints
//!
//! Durable copy of the engine cursor plus enough context to refuse resuming
//! against the wrong format or the wrong input.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::ranges::CursorState;

pub const CHECKPOINT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("checkpoint version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("checkpoint was written for format {found}, not {expected}")]
    FormatMismatch { found: String, expected: String },
    #[error("checkpoint was written for input {found}, not {expected}")]
    InputMismatch { found: PathBuf, expected: PathBuf },
    #[error("input is {actual} bytes but the checkpoint needs at least {required}")]
    InputTooShort { required: u64, actual: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub version: u32,
    pub format_id: String,
    pub config_hash: String,
    pub input_path: PathBuf,
    /// Input length when the checkpoint was written.
    pub input_len: u64,
    pub saved_at: String,
    pub cursor: CursorState,
}

impl CheckpointState {
    pub fn new(
        format_id: &str,
        config_hash: &str,
        input_path: &Path,
        input_len: u64,
        cursor: CursorState,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            format_id: format_id.to_string(),
            config_hash: config_hash.to_string(),
            input_path: input_path.to_path_buf(),
            input_len,
            saved_at: chrono::Utc::now().to_rfc3339(),
            cursor,
        }
    }

    /// Check this checkpoint can resume a run of `format_id`.
    ///
    /// A different config hash only warns; the format id must match.
    pub fn check_compatible(&self, format_id: &str, config_hash: &str) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: self.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        if self.format_id != format_id {
            return Err(CheckpointError::FormatMismatch {
                found: self.format_id.clone(),
                expected: format_id.to_string(),
            });
        }
        if self.config_hash != config_hash {
            warn!(
                "checkpoint config hash {} differs from current {}",
                self.config_hash, config_hash
            );
        }
        Ok(())
    }

    /// Check this checkpoint can resume on the input at `path`, currently
    /// `len` bytes long.
    ///
    /// The input may have grown since the checkpoint was written but never
    /// shrunk. A different path is rejected unless `allow_other_path` is set.
    pub fn check_input(
        &self,
        path: &Path,
        len: u64,
        allow_other_path: bool,
    ) -> Result<(), CheckpointError> {
        if !same_file(&self.input_path, path) {
            if !allow_other_path {
                return Err(CheckpointError::InputMismatch {
                    found: self.input_path.clone(),
                    expected: path.to_path_buf(),
                });
            }
            warn!(
                "checkpoint was written for {}, resuming on {}",
                self.input_path.display(),
                path.display()
            );
        }
        let required = self.input_len.max(self.cursor.highest_offset());
        if len < required {
            return Err(CheckpointError::InputTooShort {
                required,
                actual: len,
            });
        }
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Write `state` to `path` through a temporary file and rename.
pub fn save_checkpoint(path: &Path, state: &CheckpointState) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut file, state)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn load_checkpoint(path: &Path) -> Result<CheckpointState, CheckpointError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

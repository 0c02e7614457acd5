use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputBackend {
    Jsonl,
    Csv,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Input file (SIO mule file or raw instrument file)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory for records and faults
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Format id from the config (defaults to the config's default_format)
    #[arg(long)]
    pub format: Option<String>,

    /// Checkpoint file written after every batch
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Resume from the checkpoint file
    #[arg(long, requires = "checkpoint")]
    pub resume: bool,

    /// Accept a checkpoint written for a different input path
    #[arg(long, requires = "resume")]
    pub allow_other_input: bool,

    /// Records requested per engine call
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    /// Stop after this many records
    #[arg(long)]
    pub max_records: Option<u64>,

    /// Read size, in KiB (overrides config when set)
    #[arg(long)]
    pub read_size_kib: Option<usize>,

    /// Output backend
    #[arg(long, value_enum, default_value_t = OutputBackend::Jsonl)]
    pub output_backend: OutputBackend,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}

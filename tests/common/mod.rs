//! Shared test infrastructure: synthetic mule files and recovered E files.
//!
//! Each integration test file imports this module; not every builder is used
//! by every file.
#![allow(dead_code)]

use std::collections::HashSet;

use mulesieve::config;
use mulesieve::constants::{WFP_E_HEADER, WFP_SAMPLE_BYTES};
use mulesieve::decode::Record;
use mulesieve::engine::{CollectingSink, EngineOptions, ExtractionEngine};
use mulesieve::format::FormatDescriptor;
use mulesieve::ranges::{ByteRange, CursorState, STREAM_END};
use mulesieve::sieve::sio::build_block;
use mulesieve::source::SliceSource;

pub const SIO_FORMAT: &str = "wfp_eng_sio_mule";
pub const PADDED_FORMAT: &str = "wfp_eng_sio_mule_padded";
pub const RECOVERED_FORMAT: &str = "wfp_eng_recovered";

/// Profiler clock (unix seconds) of sample index 0.
pub const BASE_TIME: u32 = 0x51F2_572E;
pub const SIO_HEADER: usize = 33;
pub const E_HEADER: usize = 24;

// ============================================================================
// Record builders
// ============================================================================

pub fn e_header() -> Vec<u8> {
    let mut out = WFP_E_HEADER.to_vec();
    out.extend_from_slice(&(BASE_TIME - 0x7B).to_be_bytes());
    out.extend_from_slice(&BASE_TIME.to_be_bytes());
    out
}

/// One 30-byte engineering sample; values derive from `index`.
pub fn sample(index: u32) -> Vec<u8> {
    sample_at(BASE_TIME + index, index)
}

/// Sample with an explicit profiler timestamp.
pub fn sample_at(timestamp: u32, index: u32) -> Vec<u8> {
    sample_with_pressure(timestamp, index, 100.0 + index as f32)
}

pub fn sample_with_pressure(timestamp: u32, index: u32, pressure: f32) -> Vec<u8> {
    let mut out = Vec::with_capacity(WFP_SAMPLE_BYTES);
    out.extend_from_slice(&timestamp.to_be_bytes());
    out.extend_from_slice(&(0.25f32 * index as f32).to_be_bytes());
    out.extend_from_slice(&12.5f32.to_be_bytes());
    out.extend_from_slice(&pressure.to_be_bytes());
    out.extend_from_slice(&0.1f32.to_be_bytes());
    out.extend_from_slice(&(50.0f32 + index as f32).to_be_bytes());
    out.extend_from_slice(&(index as u16).to_be_bytes());
    out.extend_from_slice(&120u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    debug_assert_eq!(out.len(), WFP_SAMPLE_BYTES);
    out
}

/// Status record; `augmented` appends the two pad bytes.
pub fn status(augmented: bool) -> Vec<u8> {
    let mut out = vec![0xFF, 0xFF, 0xFF, 0xFD];
    out.extend_from_slice(&BASE_TIME.to_be_bytes());
    out.extend_from_slice(&[0x00, 0x07, 0x00, 0x00, 0x01, 0x2C, 0x00, 0x00]);
    if augmented {
        out.extend_from_slice(&[0x00, 0x00]);
    }
    out
}

/// E header followed by samples `first..first + count`.
pub fn wfp_payload(first: u32, count: u32) -> Vec<u8> {
    let mut out = e_header();
    for index in first..first + count {
        out.extend_from_slice(&sample(index));
    }
    out
}

pub fn we_block(first: u32, count: u32) -> Vec<u8> {
    build_block("WE", BASE_TIME + first, &wfp_payload(first, count))
}

/// Block for another instrument on the same mule.
pub fn other_block(id: &str, seed: u8) -> Vec<u8> {
    let payload: Vec<u8> = (0..40u8).map(|i| b'a' + (i + seed) % 26).collect();
    build_block(id, 0x5100_0000 + seed as u32, &payload)
}

/// A mule file: noise, foreign blocks and `WE` blocks of `per_block`
/// samples each. Returns the file and the absolute range of every sample.
pub fn mule_file(blocks: u32, per_block: u32) -> (Vec<u8>, Vec<ByteRange>) {
    let mut out = b"\r\n mule log start \r\n".to_vec();
    let mut ranges = Vec::new();
    for b in 0..blocks {
        out.extend_from_slice(&other_block("CS", b as u8));
        out.extend_from_slice(b"  ");
        let first = b * per_block;
        let block_start = out.len();
        out.extend_from_slice(&we_block(first, per_block));
        for i in 0..per_block as usize {
            let start = (block_start + SIO_HEADER + E_HEADER + i * WFP_SAMPLE_BYTES) as u64;
            ranges.push(ByteRange::new(start, start + WFP_SAMPLE_BYTES as u64));
        }
        out.extend_from_slice(&other_block("PS", b as u8));
    }
    out.extend_from_slice(b"\r\n");
    (out, ranges)
}

/// Recovered E file: header then samples, no framing.
pub fn recovered_file(count: u32) -> Vec<u8> {
    wfp_payload(0, count)
}

// ============================================================================
// Engine helpers
// ============================================================================

pub fn format(id: &str) -> FormatDescriptor {
    let loaded = config::load_config(None).expect("default config");
    loaded
        .config
        .format(id)
        .unwrap_or_else(|| panic!("format {id} missing from default config"))
        .clone()
}

pub fn options(read_size: usize) -> EngineOptions {
    EngineOptions {
        read_size,
        ..EngineOptions::default()
    }
}

pub fn engine(
    format: &FormatDescriptor,
    input: Vec<u8>,
    state: Option<CursorState>,
    read_size: usize,
) -> ExtractionEngine<SliceSource> {
    ExtractionEngine::from_format(format, SliceSource::new(input), state, options(read_size))
        .expect("engine")
}

/// Pull until the engine returns a short batch.
pub fn drain(
    engine: &mut ExtractionEngine<SliceSource>,
    batch: usize,
    sink: &mut CollectingSink,
) -> Vec<Record> {
    let mut out = Vec::new();
    loop {
        let records = engine.get_records(batch, sink).expect("get_records");
        let short = records.len() < batch;
        out.extend(records);
        if short {
            return out;
        }
    }
}

pub fn ranges(records: &[Record]) -> Vec<ByteRange> {
    records.iter().map(|r| r.range).collect()
}

pub fn assert_no_duplicates(records: &[Record]) {
    let mut seen = HashSet::new();
    for record in records {
        assert!(
            seen.insert(record.range),
            "range {} decoded twice",
            record.range
        );
    }
}

/// Sorted, disjoint, non-empty ranges with in-process spans outside the
/// unprocessed set.
pub fn assert_state_well_formed(state: &CursorState) {
    for pair in state.unprocessed_ranges.windows(2) {
        assert!(pair[0].end < pair[1].start, "unprocessed not disjoint: {pair:?}");
    }
    for range in &state.unprocessed_ranges {
        assert!(!range.is_empty());
        assert!(range.end <= STREAM_END);
    }
    for pair in state.in_process_ranges.windows(2) {
        assert!(pair[0].range.end <= pair[1].range.start);
    }
    for span in &state.in_process_ranges {
        assert!(span.returned < span.total);
        assert!(
            state
                .unprocessed_ranges
                .iter()
                .all(|r| !r.overlaps(&span.range)),
            "span {} is still unprocessed",
            span.range
        );
    }
}

/// Every byte of `later`'s unprocessed set was also unprocessed in `earlier`.
pub fn assert_unprocessed_shrinks(earlier: &CursorState, later: &CursorState) {
    for range in &later.unprocessed_ranges {
        assert!(
            earlier.unprocessed_ranges.iter().any(|r| r.contains(range)),
            "{range} reappeared as unprocessed"
        );
    }
}

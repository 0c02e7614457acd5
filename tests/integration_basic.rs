mod common;

use std::fs;
use std::sync::atomic::AtomicBool;

use serde_json::Value;

use mulesieve::config;
use mulesieve::engine::{CollectingSink, NullSink};
use mulesieve::ranges::ByteRange;
use mulesieve::sink::{self, OutputBackendKind, OutputContext};
use mulesieve::source::FileSource;
use mulesieve::util;

use common::*;

#[test]
fn default_config_exposes_all_formats() {
    let loaded = config::load_config(None).expect("config");
    let ids: Vec<&str> = loaded.config.formats.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec![SIO_FORMAT, PADDED_FORMAT, RECOVERED_FORMAT]);
    assert_eq!(loaded.config.default_format, SIO_FORMAT);
    assert_eq!(loaded.config_hash.len(), 64);
}

#[test]
fn four_sample_block_decodes_cleanly() {
    let block = we_block(0, 4);
    let len = block.len() as u64;
    let mut engine = engine(&format(SIO_FORMAT), block, None, 4096);
    let mut sink = CollectingSink::new();

    let records = engine.get_records(4, &mut sink).expect("records");

    assert_eq!(records.len(), 4);
    assert!(sink.faults.is_empty());
    let first = (SIO_HEADER + E_HEADER) as u64;
    for (i, record) in records.iter().enumerate() {
        let start = first + 30 * i as u64;
        assert_eq!(record.range, ByteRange::new(start, start + 30));
        assert_eq!(record.stream, "wfp_eng_sio_mule_parsed");
        assert_eq!(
            record.field("motor_current").and_then(|v| v.as_u64()),
            Some(i as u64)
        );
    }
    let expected_ntp = BASE_TIME as f64 + 2_208_988_800.0;
    assert_eq!(records[0].timestamp, expected_ntp);
    assert_eq!(records[3].timestamp, expected_ntp + 3.0);

    let state = engine.state();
    assert!(state.in_process_ranges.is_empty());
    assert_eq!(state.unprocessed_ranges, vec![ByteRange::new(len, u64::MAX)]);
    assert_eq!(state.last_timestamp, expected_ntp + 3.0);
}

#[test]
fn mule_file_yields_only_we_samples_in_order() {
    let (input, expected) = mule_file(3, 5);
    let mut engine = engine(&format(SIO_FORMAT), input, None, 512);
    let mut sink = CollectingSink::new();

    let records = drain(&mut engine, 4, &mut sink);

    assert_eq!(ranges(&records), expected);
    assert!(sink.faults.is_empty());
    assert_eq!(sink.records.len(), records.len());
    assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(engine.stats().spans_registered, 3);
    assert_eq!(engine.stats().records_emitted, 15);
}

#[test]
fn recovered_e_file_uses_header_framing() {
    let mut input = recovered_file(3);
    input.extend_from_slice(&status(false));
    input.extend_from_slice(&sample(3));
    let mut engine = engine(&format(RECOVERED_FORMAT), input, None, 64);

    let records = engine.get_records(10, &mut NullSink).expect("records");

    assert_eq!(records.len(), 4);
    assert_eq!(records[0].range, ByteRange::new(24, 54));
    assert_eq!(records[3].range, ByteRange::new(130, 160));
    assert!(records.iter().all(|r| r.stream == "wfp_eng_recovered_parsed"));
}

#[test]
fn run_extraction_writes_jsonl_and_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (data, expected) = mule_file(2, 3);
    let input_path = dir.path().join("node58p1.dat");
    fs::write(&input_path, data).expect("write input");

    let loaded = config::load_config(None).expect("config");
    let format = util::select_format(&loaded.config, None).expect("format");
    let source = FileSource::open(&input_path).expect("source");
    let mut engine = mulesieve::engine::ExtractionEngine::from_format(
        format,
        source,
        None,
        loaded.config.engine_options(),
    )
    .expect("engine");

    let out_root = dir.path().join("out");
    util::ensure_output_dir(&out_root).expect("output dir");
    let ctx = OutputContext::new(&format.id, &loaded.config_hash, &input_path);
    let mut out = sink::build_sink(OutputBackendKind::Jsonl, &out_root, ctx).expect("sink");
    let checkpoint = dir.path().join("checkpoint.json");
    let opts = util::RunOptions {
        format_id: format.id.clone(),
        config_hash: loaded.config_hash.clone(),
        input_path: input_path.clone(),
        batch_size: 2,
        max_records: None,
        checkpoint: Some(checkpoint.clone()),
    };

    let summary =
        util::run_extraction(&mut engine, &mut out, &opts, &AtomicBool::new(false)).expect("run");

    assert_eq!(summary.records, 6);
    assert!(!summary.interrupted);
    assert_eq!(out.dir(), out_root.join(SIO_FORMAT));

    let text = fs::read_to_string(out_root.join(SIO_FORMAT).join("records.jsonl")).expect("read");
    let lines: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).expect("json"))
        .collect();
    assert_eq!(lines.len(), 6);
    for (line, range) in lines.iter().zip(&expected) {
        assert_eq!(line["range"], serde_json::json!([range.start, range.end]));
        assert_eq!(line["format_id"], SIO_FORMAT);
        assert_eq!(line["config_hash"], loaded.config_hash.as_str());
        assert!(line["fields"]["prof_pressure"].is_number());
        assert!(line["timestamp_utc"].as_str().expect("utc").starts_with("2013-07-26T"));
    }

    let saved = mulesieve::checkpoint::load_checkpoint(&checkpoint).expect("checkpoint");
    assert_eq!(saved.format_id, SIO_FORMAT);
    assert_eq!(saved.cursor, summary.state);
    assert!(saved.cursor.in_process_ranges.is_empty());
}

#[test]
fn csv_backend_writes_one_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = OutputContext::new(SIO_FORMAT, "hash", std::path::Path::new("in.dat"));
    let mut out = sink::build_sink(OutputBackendKind::Csv, dir.path(), ctx).expect("sink");
    let mut engine = engine(&format(SIO_FORMAT), we_block(0, 3), None, 128);

    let records = engine.get_records(10, &mut out).expect("records");
    out.flush().expect("flush");

    assert_eq!(records.len(), 3);
    let text =
        fs::read_to_string(dir.path().join(SIO_FORMAT).join("records.csv")).expect("read csv");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("stream,start,end,timestamp,timestamp_utc,profiler_timestamp,"));
    assert!(lines[1].starts_with("wfp_eng_sio_mule_parsed,57,87,"));
}

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::decode::Record;
use crate::engine::{ExtractionSink, Fault, SinkError};
use crate::sink::{OutputContext, open_append};

pub struct JsonlSink {
    dir: PathBuf,
    ctx: OutputContext,
    records: BufWriter<File>,
    faults: BufWriter<File>,
}

#[derive(Serialize)]
struct RecordLine<'a> {
    #[serde(flatten)]
    record: &'a Record,
    timestamp_utc: Option<String>,
    format_id: &'a str,
    config_hash: &'a str,
    input_path: &'a str,
    tool_version: &'a str,
}

#[derive(Serialize)]
struct FaultLine<'a> {
    #[serde(flatten)]
    fault: &'a Fault,
    format_id: &'a str,
    input_path: &'a str,
}

impl JsonlSink {
    pub fn new(dir: &Path, ctx: OutputContext) -> Result<Self, SinkError> {
        let (records, _) = open_append(&dir.join("records.jsonl"))?;
        let (faults, _) = open_append(&dir.join("faults.jsonl"))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            ctx,
            records: BufWriter::new(records),
            faults: BufWriter::new(faults),
        })
    }
}

impl ExtractionSink for JsonlSink {
    fn on_record(&mut self, record: &Record) -> Result<(), SinkError> {
        let line = RecordLine {
            record,
            timestamp_utc: record.timestamp_utc(),
            format_id: &self.ctx.format_id,
            config_hash: &self.ctx.config_hash,
            input_path: &self.ctx.input_path,
            tool_version: &self.ctx.tool_version,
        };
        serde_json::to_writer(&mut self.records, &line)?;
        self.records.write_all(b"\n")?;
        Ok(())
    }

    fn on_fault(&mut self, fault: &Fault) -> Result<(), SinkError> {
        let line = FaultLine {
            fault,
            format_id: &self.ctx.format_id,
            input_path: &self.ctx.input_path,
        };
        serde_json::to_writer(&mut self.faults, &line)?;
        self.faults.write_all(b"\n")?;
        Ok(())
    }
}

impl JsonlSink {
    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.records.flush()?;
        self.faults.flush()?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{Field, FieldValue};
    use crate::engine::FaultKind;
    use crate::ranges::ByteRange;

    #[test]
    fn writes_one_line_per_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = OutputContext::new("fmt", "hash", Path::new("in.dat"));
        let mut sink = JsonlSink::new(dir.path(), ctx).expect("sink");
        let record = Record {
            stream: "wfp".into(),
            range: ByteRange::new(57, 87),
            timestamp: 3_583_825_326.0,
            fields: vec![Field {
                name: "status_bits".into(),
                value: FieldValue::Unsigned(7),
            }],
            raw: vec![1, 2],
        };
        sink.on_record(&record).expect("record");
        sink.on_fault(&Fault {
            kind: FaultKind::Decode,
            range: ByteRange::new(87, 117),
            message: "bad".into(),
        })
        .expect("fault");
        sink.flush().expect("flush");

        let text = std::fs::read_to_string(dir.path().join("records.jsonl")).expect("read");
        let value: serde_json::Value = serde_json::from_str(text.trim()).expect("json");
        assert_eq!(value["range"], serde_json::json!([57, 87]));
        assert_eq!(value["fields"]["status_bits"], 7);
        assert_eq!(value["raw"], "0102");
        assert_eq!(value["timestamp_utc"], "2013-07-26T11:02:06+00:00");
        assert_eq!(value["format_id"], "fmt");

        let faults = std::fs::read_to_string(dir.path().join("faults.jsonl")).expect("read");
        let fault: serde_json::Value = serde_json::from_str(faults.trim()).expect("json");
        assert_eq!(fault["kind"], "decode");
        assert_eq!(fault["range"], serde_json::json!([87, 117]));
    }
}

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::decode::Record;
use crate::engine::{ExtractionSink, Fault, SinkError};
use crate::sink::{OutputContext, open_append};

/// CSV writer. Record columns follow the first record's field order.
pub struct CsvSink {
    dir: PathBuf,
    ctx: OutputContext,
    records: csv::Writer<File>,
    records_header: bool,
    faults: csv::Writer<File>,
}

#[derive(Serialize)]
struct FaultCsv<'a> {
    kind: &'a str,
    start: u64,
    end: u64,
    message: &'a str,
    format_id: &'a str,
    input_path: &'a str,
}

impl CsvSink {
    pub fn new(dir: &Path, ctx: OutputContext) -> Result<Self, SinkError> {
        let (records, records_existed) = open_append(&dir.join("records.csv"))?;
        let (faults, faults_existed) = open_append(&dir.join("faults.csv"))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            ctx,
            records: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(records),
            records_header: records_existed,
            faults: csv::WriterBuilder::new()
                .has_headers(!faults_existed)
                .from_writer(faults),
        })
    }
}

impl ExtractionSink for CsvSink {
    fn on_record(&mut self, record: &Record) -> Result<(), SinkError> {
        if !self.records_header {
            let mut header = vec![
                "stream".to_string(),
                "start".to_string(),
                "end".to_string(),
                "timestamp".to_string(),
                "timestamp_utc".to_string(),
            ];
            header.extend(record.fields.iter().map(|f| f.name.clone()));
            header.extend(["raw".to_string(), "format_id".to_string()]);
            self.records.write_record(&header)?;
            self.records_header = true;
        }
        let mut row = vec![
            record.stream.clone(),
            record.range.start.to_string(),
            record.range.end.to_string(),
            record.timestamp.to_string(),
            record.timestamp_utc().unwrap_or_default(),
        ];
        row.extend(record.fields.iter().map(|f| f.value.to_string()));
        row.push(hex::encode(&record.raw));
        row.push(self.ctx.format_id.clone());
        self.records.write_record(&row)?;
        Ok(())
    }

    fn on_fault(&mut self, fault: &Fault) -> Result<(), SinkError> {
        self.faults.serialize(FaultCsv {
            kind: fault.kind.as_str(),
            start: fault.range.start,
            end: fault.range.end,
            message: &fault.message,
            format_id: &self.ctx.format_id,
            input_path: &self.ctx.input_path,
        })?;
        Ok(())
    }
}

impl CsvSink {
    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.records.flush()?;
        self.faults.flush()?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

//! JSON-lines telemetry sink.
//!
//! Appends one JSON object per published tick (and per cycle event) to a
//! writer, typically a file. Serialization or write failures are logged
//! and swallowed; telemetry never takes down the sampling loop.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use bmon_common::types::{CycleCompleted, Sample, Snapshot};

use super::TelemetrySink;

/// One line of JSONL output.
#[derive(Debug, Serialize)]
struct Record<'a> {
    battery: &'a str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample: Option<&'a Sample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<&'a Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a CycleCompleted>,
}

/// Telemetry sink writing JSON lines to `W`.
pub struct JsonlSink<W: Write + Send> {
    writer: W,
}

impl JsonlSink<BufWriter<File>> {
    /// Open (append) a JSONL telemetry file.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> JsonlSink<W> {
    /// Wrap an arbitrary writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consume the sink and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_record(&mut self, record: &Record<'_>) {
        if let Err(e) = serde_json::to_writer(&mut self.writer, record) {
            warn!(error = %e, "jsonl sink: serialization failed");
            return;
        }
        if let Err(e) = self
            .writer
            .write_all(b"\n")
            .and_then(|()| self.writer.flush())
        {
            warn!(error = %e, "jsonl sink: write failed");
        }
    }
}

impl<W: Write + Send> TelemetrySink for JsonlSink<W> {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn publish(&mut self, battery: &str, sample: &Sample, snapshot: &Snapshot) {
        self.write_record(&Record {
            battery,
            kind: "sample",
            sample: Some(sample),
            snapshot: Some(snapshot),
            event: None,
        });
    }

    fn cycle_completed(&mut self, battery: &str, event: &CycleCompleted) {
        self.write_record(&Record {
            battery,
            kind: "cycle",
            sample: None,
            snapshot: None,
            event: Some(event),
        });
    }
}

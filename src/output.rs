// Output handlers for reconciled samples

use std::io::{self, Write};

use chrono::{TimeZone, Utc};
use tracing::error;

use crate::reconcile::ReconciledSample;
use crate::synthetic::SyntheticSample;

pub const CSV_HEADER: &str =
    "received_at,id,radio_latency,mqtt_latency,total_latency,radio_clamped,relay_clamped,relay_provisional,approximate";

pub const SYNTHETIC_CSV_HEADER: &str = "index,radio_latency,mqtt_latency,total_latency,synthetic";

/// Trait for output handlers
pub trait OutputHandler: Send + Sync {
    /// Handle a new reconciled sample
    fn handle_sample(&mut self, sample: &ReconciledSample);

    /// Flush buffered output
    fn flush(&mut self) {}
}

/// Station receive time as RFC 3339 with milliseconds, empty if unknown
fn format_received_at(ms: Option<i64>) -> String {
    ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_default()
}

/// One CSV row (no trailing newline)
pub fn format_csv_row(sample: &ReconciledSample) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{}",
        format_received_at(sample.received_at_ms()),
        sample.id(),
        sample.radio_latency_ms(),
        sample.relay_latency_ms(),
        sample.total_latency_ms(),
        sample.radio_clamped(),
        sample.relay_clamped(),
        sample.relay_provisional(),
        sample.approximate(),
    )
}

/// CSV format output
pub struct CsvOutput<W: Write + Send + Sync> {
    writer: W,
}

impl<W: Write + Send + Sync> CsvOutput<W> {
    /// Wrap a writer and emit the header row
    pub fn new(mut writer: W) -> io::Result<Self> {
        writeln!(writer, "{}", CSV_HEADER)?;
        Ok(CsvOutput { writer })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl CsvOutput<io::BufWriter<std::fs::File>> {
    /// Append to a file, writing the header only if the file is new or empty
    pub fn create(path: &str) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let empty = file.metadata()?.len() == 0;
        let mut writer = io::BufWriter::new(file);
        if empty {
            writeln!(writer, "{}", CSV_HEADER)?;
        }
        Ok(CsvOutput { writer })
    }
}

impl<W: Write + Send + Sync> OutputHandler for CsvOutput<W> {
    fn handle_sample(&mut self, sample: &ReconciledSample) {
        if let Err(e) = writeln!(self.writer, "{}", format_csv_row(sample)) {
            error!("Failed to write CSV: {}", e);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            error!("Failed to flush CSV: {}", e);
        }
    }
}

/// JSON lines output, one object per sample
pub struct JsonOutput<W: Write + Send + Sync> {
    writer: W,
}

impl<W: Write + Send + Sync> JsonOutput<W> {
    pub fn new(writer: W) -> Self {
        JsonOutput { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonOutput<io::Stdout> {
    pub fn stdout() -> Self {
        JsonOutput::new(io::stdout())
    }
}

impl<W: Write + Send + Sync> OutputHandler for JsonOutput<W> {
    fn handle_sample(&mut self, sample: &ReconciledSample) {
        let result = serde_json::to_writer(&mut self.writer, sample)
            .map_err(io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"));
        if let Err(e) = result {
            error!("Failed to write JSON: {}", e);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            error!("Failed to flush JSON: {}", e);
        }
    }
}

/// Write a synthetic series. Every row carries `synthetic=true`.
pub fn write_synthetic_csv<W: Write>(writer: &mut W, samples: &[SyntheticSample]) -> io::Result<()> {
    writeln!(writer, "{}", SYNTHETIC_CSV_HEADER)?;
    for (i, s) in samples.iter().enumerate() {
        writeln!(
            writer,
            "{},{},{},{},{}",
            i, s.radio_latency_ms, s.relay_latency_ms, s.total_latency_ms, s.synthetic
        )?;
    }
    writer.flush()
}

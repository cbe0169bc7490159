use crate::config::WRITER_BUFFER_SIZE;
use anyhow::{Context, Result};
use csv::{QuoteStyle, Writer, WriterBuilder};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};

/// Append-only destination of finalized records.
pub trait Sink<T> {
    fn append(&mut self, record: T) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Tab-separated output with every field quoted.
pub struct CsvSink<W: Write> {
    writer: Writer<W>,
    written: u64,
}

impl CsvSink<BufWriter<File>> {
    pub fn create(path: &str) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("Failed to create output: {}", path))?;
        Ok(Self::from_writer(BufWriter::with_capacity(WRITER_BUFFER_SIZE, file)))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(inner: W) -> Self {
        let writer = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Always)
            .from_writer(inner);
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))
    }
}

impl<T: Serialize, W: Write> Sink<T> for CsvSink<W> {
    fn append(&mut self, record: T) -> Result<()> {
        self.writer
            .serialize(record)
            .context("Failed to write record")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush output")
    }
}

/// Keeps records in memory; used by tests and small runs.
#[derive(Debug)]
pub struct MemorySink<T> {
    pub records: Vec<T>,
    pub flushes: u32,
}

impl<T> Default for MemorySink<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            flushes: 0,
        }
    }
}

impl<T> Sink<T> for MemorySink<T> {
    fn append(&mut self, record: T) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampledPage;

    #[test]
    fn csv_sink_writes_quoted_tsv_with_header() {
        let mut sink = CsvSink::from_writer(Vec::new());
        sink.append(SampledPage {
            title: "Talk:Rome".to_string(),
        })
        .unwrap();
        sink.append(SampledPage {
            title: "Milan".to_string(),
        })
        .unwrap();
        Sink::<SampledPage>::flush(&mut sink).unwrap();
        assert_eq!(sink.written(), 2);

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "\"title\"\n\"Talk:Rome\"\n\"Milan\"\n");
    }

    #[test]
    fn memory_sink_counts_flushes() {
        let mut sink = MemorySink::default();
        sink.append(1).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.records, vec![1]);
        assert_eq!(sink.flushes, 1);
    }
}

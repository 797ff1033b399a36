//! Destinations for downloaded rows.
//!
//! A sink is handed one [`Row`] at a time, in delivery order, by a single
//! caller. It is never called concurrently, so implementations need no
//! internal locking. Every sink writes through to its medium before
//! returning, so a failed download leaves everything delivered so far on
//! disk.

use std::path::Path;

use chrono::SecondsFormat;
use csv_async::{AsyncWriter, AsyncWriterBuilder};
use futures::future::BoxFuture;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter, Stdout};

use crate::error::Result;
use crate::types::Row;

/// Consumer of flattened rows.
pub trait Sink: Send {
    /// Append one row to the sink's medium.
    fn write_row<'a>(&'a mut self, row: &'a Row<'a>) -> BoxFuture<'a, Result<()>>;
}

/// Human readable lines, `uuid, time, value`.
pub struct TextSink<W> {
    out: W,
}

impl TextSink<Stdout> {
    /// Print rows to standard output.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> TextSink<W> {
    /// Write rows to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: AsyncWrite + Unpin + Send> Sink for TextSink<W> {
    fn write_row<'a>(&'a mut self, row: &'a Row<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let line = format!("{}, {}, {:.2}\n", row.uuid, row.time, row.value);
            self.out.write_all(line.as_bytes()).await?;
            self.out.flush().await?;
            Ok(())
        })
    }
}

/// CSV file with a `UUID,Time,Value` header.
pub struct CsvSink {
    writer: AsyncWriter<File>,
}

impl CsvSink {
    /// Create (or truncate) `path` and write the header.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref()).await?;
        let mut writer = AsyncWriterBuilder::new().create_writer(file);
        writer.write_record(["UUID", "Time", "Value"]).await?;
        writer.flush().await?;
        Ok(Self { writer })
    }
}

impl Sink for CsvSink {
    fn write_row<'a>(&'a mut self, row: &'a Row<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let time = row.time.to_rfc3339_opts(SecondsFormat::Secs, true);
            let value = format!("{:.2}", row.value);
            self.writer
                .write_record([row.uuid, time.as_str(), value.as_str()])
                .await?;
            self.writer.flush().await?;
            Ok(())
        })
    }
}

/// One JSON object per line: `{"uuid":..,"time":..,"value":..}`.
pub struct JsonLinesSink {
    out: BufWriter<File>,
}

impl JsonLinesSink {
    /// Create (or truncate) `path`.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref()).await?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }
}

impl Sink for JsonLinesSink {
    fn write_row<'a>(&'a mut self, row: &'a Row<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut line = serde_json::to_vec(row)?;
            line.push(b'\n');
            self.out.write_all(&line).await?;
            self.out.flush().await?;
            Ok(())
        })
    }
}

//! Upload of locally staged metadata and readings to an archiver.
//!
//! Ingest runs in two phases. Metadata documents are posted one by one,
//! keyed by their path; documents without a path or uuid are skipped.
//! Readings are then streamed from a `uuid,time,value` CSV file, buffered
//! per stream, and posted whenever a stream's buffer reaches the batch
//! size. Buffers are bounded per stream but not across streams.
//!
//! Data-file timestamps are uploaded in nanoseconds (whole seconds times
//! 10^9), while downloads work with millisecond readings; a round trip
//! through an archiver has to account for the difference.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::path::Path;

use chrono::DateTime;
use csv_async::{AsyncReaderBuilder, ByteRecord};
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::reading::Reading;
use crate::transport::Transport;
use crate::types::StreamMessage;

/// Readings per upload unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(1000).unwrap();

/// Nanoseconds per second; the unit of uploaded data-file timestamps.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Counters for a metadata load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetadataSummary {
    /// Documents posted to the archiver.
    pub uploaded: usize,
    /// Documents skipped for lacking a path or uuid.
    pub skipped: usize,
}

/// Counters for a data load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataSummary {
    /// Data lines read, header excluded.
    pub lines: u64,
    /// Readings posted to the archiver.
    pub readings: usize,
    /// Upload requests issued.
    pub uploads: usize,
}

/// Uploads metadata and readings through a [`Client`].
///
/// Paths learned from metadata documents are remembered so that later
/// data uploads for the same stream are keyed by its path. Streams with
/// no known path are uploaded under the empty path.
pub struct Ingester<'a, T> {
    client: &'a Client<T>,
    batch_size: NonZeroUsize,
    paths: HashMap<String, String>,
}

impl<'a, T: Transport> Ingester<'a, T> {
    /// Create an ingester with the default batch size.
    pub fn new(client: &'a Client<T>) -> Self {
        Self {
            client,
            batch_size: DEFAULT_BATCH_SIZE,
            paths: HashMap::new(),
        }
    }

    /// Set how many readings of one stream are buffered before upload.
    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Load metadata documents from a JSON array file.
    pub async fn load_metadata_file(&mut self, path: impl AsRef<Path>) -> Result<MetadataSummary> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let documents: Vec<StreamMessage> = serde_json::from_slice(&content).map_err(|e| {
            Error::decode(format!(
                "Could not decode metadata file {}: {}",
                path.display(),
                e
            ))
        })?;
        self.load_metadata(documents).await
    }

    /// Post each document as `{path: document}`.
    ///
    /// Invalid documents are skipped with a warning. A failed upload
    /// aborts the load.
    pub async fn load_metadata(&mut self, documents: Vec<StreamMessage>) -> Result<MetadataSummary> {
        let mut summary = MetadataSummary::default();
        for doc in documents {
            if let Err(e) = doc.validate_for_ingest() {
                warn!("Skipping metadata document: {}", e);
                summary.skipped += 1;
                continue;
            }

            self.client
                .upload(&doc.path, &doc)
                .await
                .map_err(|e| e.context(format!("Could not save metadata for {}", doc.path)))?;
            self.paths.insert(doc.uuid, doc.path);
            summary.uploaded += 1;
        }

        info!(
            "Loaded {} metadata documents ({} skipped)",
            summary.uploaded, summary.skipped
        );
        Ok(summary)
    }

    /// Load readings from a `uuid,time,value` CSV file.
    pub async fn load_data_file(&mut self, path: impl AsRef<Path>) -> Result<DataSummary> {
        let file = File::open(path.as_ref()).await?;
        self.load_data(file).await
    }

    /// Load readings from CSV data. The first line is a header and is
    /// ignored.
    ///
    /// Any malformed line, invalid UTF-8 included, aborts the load before
    /// anything after it is uploaded.
    pub async fn load_data<R: AsyncRead + Unpin + Send>(&mut self, reader: R) -> Result<DataSummary> {
        let mut csv = AsyncReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .create_reader(reader);
        let mut records = csv.byte_records();

        let mut buffers: BTreeMap<String, Vec<Reading>> = BTreeMap::new();
        let mut summary = DataSummary::default();

        while let Some(record) = records.next().await {
            let record = record?;
            summary.lines += 1;
            if summary.lines % 1000 == 0 {
                debug!("Processed {} lines", summary.lines);
            }

            // Line numbers count the header.
            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(summary.lines + 1);
            let (uuid, reading) = parse_line(&record, line)?;

            let buffer = buffers.entry(uuid.clone()).or_default();
            buffer.push(reading);
            if buffer.len() >= self.batch_size.get() {
                if let Some(readings) = buffers.remove(&uuid) {
                    self.flush(&uuid, readings, &mut summary).await?;
                }
            }
        }

        for (uuid, readings) in buffers {
            if !readings.is_empty() {
                self.flush(&uuid, readings, &mut summary).await?;
            }
        }

        info!(
            "Loaded {} readings from {} lines in {} uploads",
            summary.readings, summary.lines, summary.uploads
        );
        Ok(summary)
    }

    async fn flush(&self, uuid: &str, readings: Vec<Reading>, summary: &mut DataSummary) -> Result<()> {
        let count = readings.len();
        let path = self.paths.get(uuid).map(String::as_str).unwrap_or_default();
        let message = StreamMessage::with_readings(uuid, readings);

        debug!("Uploading {} readings for {}", count, uuid);
        self.client
            .upload(path, &message)
            .await
            .map_err(|e| e.context(format!("Could not save data for {}", uuid)))?;

        summary.readings += count;
        summary.uploads += 1;
        Ok(())
    }
}

/// Parse one `uuid,time,value` record into a nanosecond reading.
fn parse_line(record: &ByteRecord, line: u64) -> Result<(String, Reading)> {
    let bad = |message: String| Error::Parse {
        line,
        content: record
            .iter()
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(","),
        message,
    };

    if record.len() != 3 {
        return Err(bad(format!("expected 3 fields, found {}", record.len())));
    }
    let fields = record
        .iter()
        .map(std::str::from_utf8)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| bad(format!("field is not valid UTF-8: {}", e)))?;

    let time = DateTime::parse_from_rfc3339(fields[1])
        .map_err(|e| bad(format!("could not parse timestamp: {}", e)))?;
    let value: f64 = fields[2]
        .parse()
        .map_err(|e| bad(format!("could not parse value as float: {}", e)))?;
    if !value.is_finite() {
        return Err(bad(format!("value {} is not finite", value)));
    }

    let time = u64::try_from(time.timestamp())
        .ok()
        .and_then(|seconds| seconds.checked_mul(NANOS_PER_SECOND))
        .ok_or_else(|| bad("timestamp is outside the supported range".to_string()))?;

    Ok((fields[0].to_string(), Reading::new(time, value)))
}

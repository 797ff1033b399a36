//! sMAP archiver client and download engine.
//!
//! This module provides the main `Client` type. A download resolves the
//! requested streams, splits them into bounded data queries, follows up on
//! pages the archiver truncated, and hands every reading to the registered
//! sinks as a [`Row`](crate::types::Row).

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::pin::Pin;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use crate::chunk::uuid_chunks;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::query::{DownloadParams, build_metadata_query};
use crate::sink::Sink;
use crate::transport::{HttpTransport, MIME_JSON, MIME_TEXT, Transport};
use crate::types::{StreamMessage, reading_time};

/// Maximum readings the archiver returns for one stream in one response.
/// A page of exactly this size is assumed to be truncated.
pub const PAGE_CAP: usize = 100_000;

/// Stream of decoded messages produced by [`Client::messages`].
pub type MessageStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamMessage>> + Send + 'a>>;

/// Untyped metadata document, as returned by `select *`.
pub type MetadataDocument = serde_json::Map<String, JsonValue>;

/// Counters for a finished download.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Messages decoded, continuation pages included.
    pub messages: usize,
    /// Rows produced (each delivered to every sink).
    pub rows: usize,
    /// Rows a sink failed to write.
    pub sink_errors: usize,
    /// Readings whose time cannot be represented, never delivered.
    pub skipped_rows: usize,
}

/// sMAP archiver client.
///
/// # Example
///
/// ```ignore
/// use smap_stream::{Client, ClientConfig, CsvSink, DownloadParams, Sink};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::new(&ClientConfig::new("http://localhost:8079/api/query")?)?;
///     client.connect().await?;
///
///     let params = DownloadParams::new(start, end).with_all(true);
///     let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(CsvSink::create("out.csv").await?)];
///     let summary = client.download(params, &mut sinks).await?;
///     println!("Wrote {} rows", summary.rows);
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client<T = HttpTransport> {
    transport: T,
}

impl Client<HttpTransport> {
    /// Create a client for the configured archiver.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new(config)?))
    }
}

impl<T: Transport> Client<T> {
    /// Create a client over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Check that the archiver answers at all.
    pub async fn connect(&self) -> Result<StatusCode> {
        let status = self.transport.head().await?;
        info!("HEAD gave response: {}", status);
        Ok(status)
    }

    /// Run a discovery query and return the matching stream identifiers.
    pub async fn discover(&self, query: String) -> Result<Vec<String>> {
        debug!("Discovery query: {}", query);
        self.query(query, "Could not post discovery query to sMAP archiver")
            .await
    }

    /// Download the readings selected by `params` into every sink.
    ///
    /// Streams are discovered first if `params` asks for it. Sink failures
    /// do not abort the download: they are logged, counted, and the row
    /// is still offered to the remaining sinks. A reading whose time is
    /// outside the representable range is skipped with a warning and
    /// counted. Any transport or decode error aborts the whole download.
    pub async fn download(
        &self,
        mut params: DownloadParams,
        sinks: &mut [Box<dyn Sink>],
    ) -> Result<DownloadSummary> {
        if let Some(query) = params.discovery_query() {
            params.uuids = self.discover(query).await?;
        }
        params.log_summary();

        let mut summary = DownloadSummary::default();
        let mut messages = self.messages(&params);
        while let Some(message) = messages.next().await {
            let message = message?;
            summary.messages += 1;

            for row in message.rows() {
                let row = match row {
                    Ok(row) => row,
                    Err(e) => {
                        summary.skipped_rows += 1;
                        warn!("Skipping reading for {}: {}", message.uuid, e);
                        continue;
                    }
                };
                summary.rows += 1;
                for sink in sinks.iter_mut() {
                    if let Err(e) = sink.write_row(&row).await {
                        summary.sink_errors += 1;
                        warn!("Could not write row for {}: {}", row.uuid, e);
                    }
                }
            }
        }

        info!(
            "Downloaded {} rows in {} messages ({} sink errors, {} skipped)",
            summary.rows, summary.messages, summary.sink_errors, summary.skipped_rows
        );
        Ok(summary)
    }

    /// Stream the messages for the identifiers already in `params`.
    ///
    /// Chunks are fetched one at a time and each page is decoded in full
    /// before its messages are yielded. A message holding exactly
    /// [`PAGE_CAP`] readings schedules a follow-up query for that stream,
    /// starting at the second of its last reading; its results are
    /// yielded after the rest of the current page. The follow-up start is
    /// inclusive, so a reading on the boundary second may be delivered
    /// twice.
    pub fn messages<'a>(&'a self, params: &'a DownloadParams) -> MessageStream<'a> {
        Box::pin(try_stream! {
            for chunk in uuid_chunks(params) {
                if chunk.uuids.is_empty() {
                    info!("No streams to download");
                    continue;
                }

                let mut pending = VecDeque::from([chunk]);
                while let Some(page) = pending.pop_front() {
                    for message in self.fetch_page(&page).await? {
                        if let Some(next) = continuation(&page, &message)? {
                            info!("Start new loop for {}", message.uuid);
                            pending.push_back(next);
                        }
                        yield message;
                    }
                }
            }
        })
    }

    /// Fetch the metadata documents matching `filter`.
    pub async fn download_metadata(&self, filter: &str) -> Result<Vec<MetadataDocument>> {
        let query = build_metadata_query(filter);
        debug!("Metadata query: {}", query);
        self.query(query, "Could not download metadata from sMAP archiver")
            .await
    }

    /// Fetch metadata matching `filter` and save it as a JSON array.
    pub async fn export_metadata(&self, filter: &str, path: impl AsRef<Path>) -> Result<usize> {
        let documents = self.download_metadata(filter).await?;
        let encoded = serde_json::to_vec(&documents)?;
        tokio::fs::write(path.as_ref(), encoded).await?;
        info!(
            "Saved {} metadata documents to {}",
            documents.len(),
            path.as_ref().display()
        );
        Ok(documents.len())
    }

    /// Upload one message, keyed by its archiver path.
    ///
    /// The archiver must answer `200 OK`.
    pub async fn upload(&self, path: &str, message: &StreamMessage) -> Result<()> {
        let payload = BTreeMap::from([(path, message)]);
        let body = serde_json::to_string(&payload)?;
        debug!("Posting data to archiver: {} bytes", body.len());

        let response = self.transport.post(MIME_JSON, body).await?;
        if response.status != StatusCode::OK {
            return Err(Error::Status {
                context: "Could not save data to sMAP archiver".to_string(),
                status: response.status,
            });
        }
        Ok(())
    }

    async fn fetch_page(&self, params: &DownloadParams) -> Result<Vec<StreamMessage>> {
        let query = params.to_query();
        debug!("Generated sMAP query: {}", query);
        self.query(query, "Could not post data query to sMAP archiver")
            .await
    }

    /// POST a query and decode the JSON answer. Undecodable bodies are
    /// logged in full.
    async fn query<D: DeserializeOwned>(&self, query: String, context: &str) -> Result<D> {
        let response = self
            .transport
            .post(MIME_TEXT, query)
            .await
            .map_err(|e| e.context(context))?;

        if !response.status.is_success() {
            error!("Got message from archiver: {}", response.body);
            return Err(Error::Status {
                context: context.to_string(),
                status: response.status,
            });
        }

        serde_json::from_str(&response.body).map_err(|e| {
            error!("Got message from archiver: {}", response.body);
            Error::decode(format!("Could not decode JSON from sMAP archiver: {}", e))
        })
    }
}

/// Follow-up parameters if `message` filled a whole page.
fn continuation(page: &DownloadParams, message: &StreamMessage) -> Result<Option<DownloadParams>> {
    if message.readings.len() != PAGE_CAP {
        return Ok(None);
    }
    let Some(last) = message.readings.last() else {
        return Ok(None);
    };

    let start = reading_time(last.time)?;
    if start <= page.start {
        return Err(Error::Stalled {
            uuid: message.uuid.clone(),
            start: page.start.timestamp(),
        });
    }
    Ok(Some(page.continuation(&message.uuid, start)))
}

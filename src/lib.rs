//! # smap-stream
//!
//! Move time-series readings between an sMAP archiver and local files.
//!
//! ## Why?
//!
//! An archiver answers a data query with at most 100 000 readings per
//! stream, and a query naming thousands of streams is slow or rejected
//! outright. `smap-stream` splits the request into bounded chunks,
//! follows up on truncated pages, and hands readings to sinks one row at
//! a time:
//!
//! ```ignore
//! let params = DownloadParams::new(start, end)
//!     .with_filter("Metadata/Location/Building = 'Soda Hall'")
//!     .with_chunk_size(NonZeroUsize::new(20).unwrap());
//! let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(CsvSink::create("out.csv").await?)];
//! client.download(params, &mut sinks).await?;
//! ```
//!
//! The reverse direction uploads metadata documents and a
//! `uuid,time,value` CSV file in batches:
//!
//! ```ignore
//! let mut ingester = Ingester::new(&client);
//! ingester.load_metadata_file("metadata.json").await?;
//! ingester.load_data_file("out.csv").await?;
//! ```
//!
//! ## Features
//!
//! - **Bounded memory**: one chunk's response is held at a time, and
//!   uploads are flushed per stream every 1000 readings
//! - **Exact chunking**: every requested stream is queried exactly once
//! - **Lenient decoding**: reading timestamps may arrive as JSON integers
//!   or floats
//! - **No silent failures**: any transport or decode error aborts the
//!   command

pub mod chunk;
pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod reading;
pub mod sink;
pub mod transport;
pub mod types;

// Re-export main types at crate root
pub use client::{Client, DownloadSummary, PAGE_CAP};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use ingest::{DataSummary, Ingester, MetadataSummary};
pub use query::DownloadParams;
pub use reading::Reading;
pub use sink::{CsvSink, JsonLinesSink, Sink, TextSink};
pub use transport::{HttpTransport, Response, Transport};
pub use types::{Row, StreamMessage};

// Re-export the chunker for callers driving their own fetch loop
pub use chunk::{UuidChunks, uuid_chunks};

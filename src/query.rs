//! Rendering of requests into the archiver's select-statement language.
//!
//! Only the small subset used for transfers is produced:
//!
//! ```text
//! select distinct uuid where <predicate>;
//! select * where <predicate>;
//! select data in (<start>, <end>) where uuid = '<id>' or uuid = '<id>' ...;
//! ```
//!
//! Identifiers are single-quoted but not escaped. They are issued by the
//! archiver and never contain quotes.

use std::fmt::Write;
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use tracing::info;

/// Predicate matching every stream on the archiver.
pub const ALL_STREAMS: &str = "has uuid";

/// Number of identifiers per data query unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = NonZeroUsize::new(10).unwrap();

/// Parameters of one download command.
///
/// Identifiers come either from an explicit list or from a server-side
/// discovery query (`all` or `filter`). Discovery overwrites `uuids`.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadParams {
    /// Streams to download, in request order.
    pub uuids: Vec<String>,
    /// Maximum identifiers per data query.
    pub chunk_size: NonZeroUsize,
    /// Discover every stream on the archiver.
    pub all: bool,
    /// Discover streams matching this predicate.
    pub filter: Option<String>,
    /// Start of the time range (inclusive).
    pub start: DateTime<Utc>,
    /// End of the time range.
    pub end: DateTime<Utc>,
    /// Render times in milliseconds, for the Python archiver 2.0.
    pub legacy: bool,
}

impl DownloadParams {
    /// Create parameters for the given time range with no streams selected.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            uuids: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            all: false,
            filter: None,
            start,
            end,
            legacy: false,
        }
    }

    /// Select streams by identifier.
    pub fn with_uuids<I, S>(mut self, uuids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uuids = uuids.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of identifiers per data query.
    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Download every stream on the archiver.
    pub fn with_all(mut self, all: bool) -> Self {
        self.all = all;
        self
    }

    /// Download streams matching a metadata predicate.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Use millisecond time ranges.
    pub fn with_legacy(mut self, legacy: bool) -> Self {
        self.legacy = legacy;
        self
    }

    /// True if identifiers must be discovered on the server.
    pub fn wants_discovery(&self) -> bool {
        self.all || self.filter.is_some()
    }

    /// The discovery query, if identifiers come from the server.
    ///
    /// `all` takes precedence over `filter`.
    pub fn discovery_query(&self) -> Option<String> {
        if self.all {
            Some(build_select_query(ALL_STREAMS))
        } else {
            self.filter.as_deref().map(build_select_query)
        }
    }

    /// The data query for the current identifiers.
    pub fn to_query(&self) -> String {
        build_data_query(self)
    }

    /// Same range and flags, different identifiers.
    pub(crate) fn for_uuids(&self, uuids: Vec<String>) -> Self {
        Self {
            uuids,
            chunk_size: self.chunk_size,
            all: self.all,
            filter: self.filter.clone(),
            start: self.start,
            end: self.end,
            legacy: self.legacy,
        }
    }

    /// Follow-up parameters fetching one stream from `start` onwards.
    pub(crate) fn continuation(&self, uuid: &str, start: DateTime<Utc>) -> Self {
        let mut next = self.for_uuids(vec![uuid.to_string()]);
        next.start = start;
        next
    }

    /// Log the effective parameters.
    pub fn log_summary(&self) {
        info!("--Generated Download Parameters--");
        info!("Start: {}", self.start.format("%-m/%-d/%Y %H:%M"));
        info!("End: {}", self.end.format("%-m/%-d/%Y %H:%M"));
        if self.wants_discovery() {
            info!("Downloading matching streams. Found {}", self.uuids.len());
        } else {
            info!("Downloading {} UUIDs", self.uuids.len());
        }
    }
}

/// Identifier discovery query for a metadata predicate.
pub fn build_select_query(filter: &str) -> String {
    format!("select distinct uuid where {};", filter)
}

/// Full metadata query for a metadata predicate.
pub fn build_metadata_query(filter: &str) -> String {
    format!("select * where {};", filter)
}

/// Data query over the identifiers of `params`.
///
/// Times are Unix seconds, or milliseconds when `params.legacy` is set.
pub fn build_data_query(params: &DownloadParams) -> String {
    let (mut start, mut end) = (params.start.timestamp(), params.end.timestamp());
    if params.legacy {
        start *= 1000;
        end *= 1000;
    }

    let mut query = format!("select data in ({}, {}) where ", start, end);
    for (i, uuid) in params.uuids.iter().enumerate() {
        if i > 0 {
            query.push_str(" or ");
        }
        // Writing to a String never fails.
        let _ = write!(query, "uuid = '{}'", uuid);
    }
    query.push(';');
    query
}

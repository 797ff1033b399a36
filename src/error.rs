//! Error types for smap-stream.

use thiserror::Error;

/// Error type for smap-stream operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed (connection refused, timeout, broken body).
    #[error("{context}: {source}")]
    Http {
        /// Which operation was in flight.
        context: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The archiver answered with something other than `200 OK`.
    #[error("{context}: archiver returned {status}")]
    Status {
        /// Which operation was in flight.
        context: String,
        /// Status line returned by the archiver.
        status: reqwest::StatusCode,
    },

    /// Response or file content could not be decoded.
    #[error("Failed to decode: {message}")]
    Decode {
        /// Description of what failed to decode.
        message: String,
    },

    /// A line of the ingest data file is malformed.
    #[error("Bad data file line {line} ({content}): {message}")]
    Parse {
        /// 1-based line number, header included.
        line: u64,
        /// Raw content of the offending line.
        content: String,
        /// Description of the problem.
        message: String,
    },

    /// A metadata document cannot be ingested. Recoverable: the
    /// document is skipped.
    #[error("Invalid metadata document: {message}")]
    InvalidDocument {
        /// Why the document was rejected.
        message: String,
    },

    /// A continuation fetch would restart at or before its own start.
    #[error("Continuation for stream {uuid} made no progress past {start}")]
    Stalled {
        /// Stream being continued.
        uuid: String,
        /// Start of the page that hit the cap, in Unix seconds.
        start: i64,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the invalid value.
        message: String,
    },

    /// Failed to read or write CSV.
    #[error("CSV error: {0}")]
    Csv(String),

    /// Failed to encode or decode JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error on a local file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn http(context: impl Into<String>, source: reqwest::Error) -> Self {
        Error::Http {
            context: context.into(),
            source,
        }
    }

    /// Replace the operation context of a transport error. Other errors
    /// are returned unchanged.
    pub fn context(self, context: impl Into<String>) -> Self {
        match self {
            Error::Http { source, .. } => Error::Http {
                context: context.into(),
                source,
            },
            Error::Status { status, .. } => Error::Status {
                context: context.into(),
                status,
            },
            other => other,
        }
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Error::Decode {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}

impl From<csv_async::Error> for Error {
    fn from(e: csv_async::Error) -> Self {
        Error::Csv(e.to_string())
    }
}

/// Result type alias for smap-stream operations.
pub type Result<T> = std::result::Result<T, Error>;

//! HTTP plumbing between the engines and the archiver.
//!
//! Every interaction with the archiver is a POST to a single query URL: a
//! `text/plain` query string, or a `application/json` upload. The
//! [`Transport`] trait captures that so the engines can be driven by
//! something other than a live archiver.

use std::future::Future;

use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Content type of query requests.
pub const MIME_TEXT: &str = "text/plain";
/// Content type of upload requests and of all responses.
pub const MIME_JSON: &str = "application/json";

/// A fully read archiver response.
#[derive(Clone, Debug)]
pub struct Response {
    /// HTTP status.
    pub status: StatusCode,
    /// Response body.
    pub body: String,
}

impl Response {
    /// A `200 OK` response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }
}

/// Request/response exchange with the archiver.
pub trait Transport: Send + Sync {
    /// POST `body` to the archiver and read the whole response.
    fn post(
        &self,
        content_type: &'static str,
        body: String,
    ) -> impl Future<Output = Result<Response>> + Send;

    /// HEAD the archiver URL.
    fn head(&self) -> impl Future<Output = Result<StatusCode>> + Send;
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    url: Url,
}

impl HttpTransport {
    /// Build a client with the configured request timeout.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::http("Could not build HTTP client", e))?;

        Ok(Self::with_http_client(http, config.url.clone()))
    }

    /// Use a preconfigured reqwest client.
    pub fn with_http_client(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }

    /// Get the archiver URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for HttpTransport {
    async fn post(&self, content_type: &'static str, body: String) -> Result<Response> {
        let response = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::http("Could not post to sMAP archiver", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http("Could not read sMAP archiver response", e))?;

        Ok(Response { status, body })
    }

    async fn head(&self) -> Result<StatusCode> {
        let response = self
            .http
            .head(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::http("Could not connect to sMAP archiver", e))?;
        Ok(response.status())
    }
}

//! Run configuration and parsing of command line values.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use go_parse_duration::parse_duration;
use reqwest::Url;

use crate::error::{Error, Result};

/// Query endpoint of a local archiver.
pub const DEFAULT_URL: &str = "http://localhost:8079/api/query";

/// Connection settings for an archiver.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Query endpoint of the archiver.
    pub url: Url,
    /// Per-request timeout; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    /// Settings for the archiver at `url`, without a timeout.
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::config(format!("invalid archiver URL '{}': {}", url, e)))?;
        Ok(Self { url, timeout: None })
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Parse a Go-style duration such as `30s` or `1h30m`. Zero means no
/// timeout.
pub fn parse_timeout(s: &str) -> Result<Option<Duration>> {
    let s = s.trim();
    if s == "0" {
        return Ok(None);
    }
    let nanos = parse_duration(s)
        .map_err(|_| Error::config(format!("invalid timeout '{}'", s)))?;
    match u64::try_from(nanos) {
        Ok(0) => Ok(None),
        Ok(nanos) => Ok(Some(Duration::from_nanos(nanos))),
        Err(_) => Err(Error::config(format!("negative timeout '{}'", s))),
    }
}

/// Parse a point in time: Unix epoch seconds, RFC3339, or a `YYYY-MM-DD`
/// date taken as midnight UTC.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(seconds) = s.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| Error::config(format!("time '{}' is out of range", s)));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    Err(Error::config(format!(
        "could not parse time '{}': expected epoch seconds, RFC3339 or YYYY-MM-DD",
        s
    )))
}

/// Split a comma separated identifier list, dropping blanks.
pub fn parse_uuids(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|uuid| !uuid.is_empty())
        .map(String::from)
        .collect()
}

/// Translate a log level name into a tracing filter directive.
///
/// Accepts the tracing level names plus `warning`, `notice` and
/// `critical`.
pub fn level_directive(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" | "notice" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("0").unwrap(), None);
        assert_eq!(parse_timeout("30s").unwrap(), Some(Duration::from_secs(30)));
        assert_eq!(
            parse_timeout("1h30m").unwrap(),
            Some(Duration::from_secs(90 * 60))
        );
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("0").unwrap().timestamp(), 0);
        assert_eq!(parse_time("1400000000").unwrap().timestamp(), 1_400_000_000);
        assert_eq!(
            parse_time("2014-05-13T16:53:20Z").unwrap().timestamp(),
            1_400_000_000
        );
        assert_eq!(parse_time("2014-05-13").unwrap().timestamp(), 1_399_939_200);
        assert!(matches!(parse_time("yesterday"), Err(Error::Config { .. })));
    }

    #[test]
    fn test_parse_uuids() {
        assert_eq!(parse_uuids("a, b,,c"), vec!["a", "b", "c"]);
        assert!(parse_uuids("").is_empty());
    }

    #[test]
    fn test_client_config() {
        let config = ClientConfig::new("http://archiver:8079/api/query")
            .unwrap()
            .with_timeout(Some(Duration::from_secs(5)));
        assert_eq!(config.url.port(), Some(8079));
        assert!(ClientConfig::new("not a url").is_err());
        assert_eq!(ClientConfig::new(DEFAULT_URL).unwrap().timeout, None);
    }

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("DEBUG"), Some("debug"));
        assert_eq!(level_directive("critical"), Some("error"));
        assert_eq!(level_directive("loud"), None);
    }
}

//! Integration tests for smap-stream.
//!
//! Most tests drive the engines through an in-memory archiver. The tests
//! in the last section need a real sMAP archiver listening on
//! localhost:8079 and skip themselves when none is reachable.
//!
//! Run tests with: `cargo test --test integration`

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::DateTime;
use futures::StreamExt;
use reqwest::StatusCode;
use smap_stream::{
    Client, ClientConfig, CsvSink, DownloadParams, Ingester, PAGE_CAP, Reading, Response, Result,
    Sink, StreamMessage, Transport,
};

const ARCHIVER_URL: &str = "http://localhost:8079/api/query";

/// Archiver double: answers from a closure and records every request.
struct FakeArchiver<F> {
    respond: F,
    requests: Mutex<Vec<String>>,
}

impl<F> FakeArchiver<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn new(respond: F) -> Self {
        Self {
            respond,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl<F> Transport for FakeArchiver<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    async fn post(&self, _content_type: &'static str, body: String) -> Result<Response> {
        let answer = (self.respond)(&body);
        self.requests.lock().unwrap().push(body);
        Ok(Response::ok(answer))
    }

    async fn head(&self) -> Result<StatusCode> {
        Ok(StatusCode::OK)
    }
}

fn range(start: i64, end: i64) -> DownloadParams {
    DownloadParams::new(
        DateTime::from_timestamp(start, 0).unwrap(),
        DateTime::from_timestamp(end, 0).unwrap(),
    )
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn test_download_to_csv() {
    let archiver = FakeArchiver::new(|_| {
        r#"[{"uuid":"u1","Readings":[[1000,2.5],[2000,3.5]]}]"#.to_string()
    });
    let client = Client::with_transport(archiver);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(CsvSink::create(&path).await.unwrap())];

    let summary = client
        .download(range(0, 100).with_uuids(["u1"]), &mut sinks)
        .await
        .unwrap();

    assert_eq!(summary.rows, 2);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "UUID,Time,Value\nu1,1970-01-01T00:00:01Z,2.50\nu1,1970-01-01T00:00:02Z,3.50\n"
    );
    assert_eq!(
        client.transport().requests(),
        vec!["select data in (0, 100) where uuid = 'u1';"]
    );
}

#[tokio::test]
async fn test_every_uuid_queried_once() {
    // Echo one reading per requested uuid.
    let archiver = FakeArchiver::new(|query| {
        let messages: Vec<StreamMessage> = query
            .split('\'')
            .skip(1)
            .step_by(2)
            .map(|uuid| StreamMessage::with_readings(uuid, vec![Reading::new(1000, 1.0)]))
            .collect();
        serde_json::to_string(&messages).unwrap()
    });
    let client = Client::with_transport(archiver);

    let uuids: Vec<String> = (0..23).map(|i| format!("stream-{:02}", i)).collect();
    let params = range(0, 100)
        .with_uuids(uuids.clone())
        .with_chunk_size(std::num::NonZeroUsize::new(5).unwrap());

    let seen: Vec<String> = client
        .messages(&params)
        .map(|message| message.unwrap().uuid)
        .collect()
        .await;

    assert_eq!(seen, uuids);
    assert_eq!(client.transport().requests().len(), 5);
}

#[tokio::test]
async fn test_truncated_page_is_completed() {
    let archiver = FakeArchiver::new(|query| {
        let readings: Vec<Reading> = if query.starts_with("select data in (0,") {
            (0..PAGE_CAP as u64).map(|i| Reading::new(i * 10, 1.0)).collect()
        } else {
            vec![Reading::new(999_990, 2.0), Reading::new(1_000_000, 3.0)]
        };
        serde_json::to_string(&[StreamMessage::with_readings("u1", readings)]).unwrap()
    });
    let client = Client::with_transport(archiver);

    let summary = client
        .download(range(0, 5_000).with_uuids(["u1"]), &mut [])
        .await
        .unwrap();

    // The last reading of the first page is at 999 990 ms.
    assert_eq!(
        client.transport().requests(),
        vec![
            "select data in (0, 5000) where uuid = 'u1';",
            "select data in (999, 5000) where uuid = 'u1';",
        ]
    );
    assert_eq!(summary.rows, PAGE_CAP + 2);
}

// ============================================================================
// Ingest
// ============================================================================

#[tokio::test]
async fn test_ingest_files() {
    let archiver = FakeArchiver::new(|_| String::new());
    let client = Client::with_transport(archiver);

    let dir = tempfile::tempdir().unwrap();
    let metadata = dir.path().join("metadata.json");
    let data = dir.path().join("data.csv");
    std::fs::write(
        &metadata,
        r#"[{"uuid":"u1","Path":"/site/meter","Properties":{"UnitofMeasure":"kW"}},{"uuid":"u2"}]"#,
    )
    .unwrap();
    std::fs::write(
        &data,
        "UUID,Time,Value\nu1,2016-01-01T00:00:00Z,2.50\nu1,2016-01-01T00:00:01Z,3.50\n",
    )
    .unwrap();

    let mut ingester = Ingester::new(&client);
    let md = ingester.load_metadata_file(&metadata).await.unwrap();
    let loaded = ingester.load_data_file(&data).await.unwrap();

    assert_eq!(md.uploaded, 1);
    assert_eq!(md.skipped, 1);
    assert_eq!(loaded.readings, 2);

    let requests = client.transport().requests();
    assert_eq!(requests.len(), 2);
    let upload: BTreeMap<String, StreamMessage> = serde_json::from_str(&requests[1]).unwrap();
    assert_eq!(
        upload["/site/meter"].readings,
        vec![
            Reading::new(1_451_606_400_000_000_000, 2.5),
            Reading::new(1_451_606_401_000_000_000, 3.5),
        ]
    );
}

#[tokio::test]
async fn test_downloaded_csv_can_be_ingested() {
    // Download writes second-resolution times; ingest reads them back as
    // nanoseconds.
    let archiver = FakeArchiver::new(|query| {
        if query.starts_with("select") {
            r#"[{"uuid":"u1","Readings":[[1451606400000,2.5]]}]"#.to_string()
        } else {
            String::new()
        }
    });
    let client = Client::with_transport(archiver);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(CsvSink::create(&path).await.unwrap())];
    client
        .download(range(0, 2_000_000_000).with_uuids(["u1"]), &mut sinks)
        .await
        .unwrap();
    drop(sinks);

    let loaded = Ingester::new(&client).load_data_file(&path).await.unwrap();
    assert_eq!(loaded.readings, 1);

    let requests = client.transport().requests();
    let upload: BTreeMap<String, StreamMessage> =
        serde_json::from_str(requests.last().unwrap()).unwrap();
    assert_eq!(
        upload[""].readings,
        vec![Reading::new(1_451_606_400 * 1_000_000_000, 2.5)]
    );
}

#[tokio::test]
async fn test_ingested_readings_download_back() {
    // Ingest stamps readings in nanoseconds; download reads milliseconds.
    let staging = Client::with_transport(FakeArchiver::new(|_| String::new()));
    let data = "UUID,Time,Value\nu1,2016-01-01T00:00:00Z,2.50\nu1,2016-01-01T00:00:01Z,3.50\n";
    Ingester::new(&staging)
        .load_data(data.as_bytes())
        .await
        .unwrap();
    let stored: Vec<StreamMessage> = staging
        .transport()
        .requests()
        .iter()
        .flat_map(|body| serde_json::from_str::<BTreeMap<String, StreamMessage>>(body).unwrap())
        .map(|(_, message)| message)
        .collect();
    assert_eq!(stored.len(), 1);

    // Served back verbatim, every reading lies past the representable range
    // and is skipped without aborting the download.
    let verbatim = serde_json::to_string(&stored).unwrap();
    let client = Client::with_transport(FakeArchiver::new(move |_| verbatim.clone()));
    let summary = client
        .download(range(0, 2_000_000_000).with_uuids(["u1"]), &mut [])
        .await
        .unwrap();
    assert_eq!(summary.rows, 0);
    assert_eq!(summary.skipped_rows, 2);

    // Rescaled to milliseconds, the original CSV comes back.
    let rescaled: Vec<StreamMessage> = stored
        .iter()
        .map(|message| {
            let readings = message
                .readings
                .iter()
                .map(|r| Reading::new(r.time / 1_000_000, r.value))
                .collect();
            StreamMessage::with_readings(message.uuid.clone(), readings)
        })
        .collect();
    let rescaled = serde_json::to_string(&rescaled).unwrap();
    let client = Client::with_transport(FakeArchiver::new(move |_| rescaled.clone()));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(CsvSink::create(&path).await.unwrap())];
    let summary = client
        .download(range(0, 2_000_000_000).with_uuids(["u1"]), &mut sinks)
        .await
        .unwrap();
    drop(sinks);

    assert_eq!(summary.rows, 2);
    assert_eq!(summary.skipped_rows, 0);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "UUID,Time,Value\nu1,2016-01-01T00:00:00Z,2.50\nu1,2016-01-01T00:00:01Z,3.50\n"
    );
}

// ============================================================================
// Live archiver
// ============================================================================

/// Helper to check if an archiver is available
async fn archiver_available() -> bool {
    let client = reqwest::Client::new();
    client
        .head(ARCHIVER_URL)
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .is_ok()
}

fn live_client() -> Client {
    let config = ClientConfig::new(ARCHIVER_URL)
        .unwrap()
        .with_timeout(Some(Duration::from_secs(30)));
    Client::new(&config).unwrap()
}

#[tokio::test]
async fn test_live_connect() {
    if !archiver_available().await {
        eprintln!("Skipping test: archiver not available");
        return;
    }

    let status = live_client().connect().await.unwrap();
    assert!(!status.is_server_error());
}

#[tokio::test]
async fn test_live_discovery() {
    if !archiver_available().await {
        eprintln!("Skipping test: archiver not available");
        return;
    }

    let client = live_client();
    let params = range(0, 1).with_all(true);
    let uuids = client
        .discover(params.discovery_query().unwrap())
        .await
        .unwrap();
    assert!(uuids.iter().all(|uuid| !uuid.is_empty()));
}

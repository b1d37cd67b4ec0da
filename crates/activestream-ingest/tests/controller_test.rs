//! Ingestion controller behavior against a scripted transport

use activestream_core::{Error, KeywordSet, Origin, Record, Result, SharedKeywords, StopToken};
use activestream_ingest::{
    Amender, ConnectRequest, InclusionFilter, IngestionController, KeywordRequest, LineStream,
    ReconnectPacer, ReplayTransport, StreamSource, Transport,
};
use activestream_telemetry::PipelineStats;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const MIN_PAUSE: Duration = Duration::from_secs(20);

/// Delivers one scripted batch of lines per connection, then idles
#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<String>>>,
    connects: Mutex<Vec<(Instant, ConnectRequest)>>,
    close_after_script: bool,
    /// Connection attempts refused before the first success
    refuse_first: usize,
}

impl ScriptedTransport {
    fn with_scripts(scripts: Vec<Vec<&str>>) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|lines| lines.into_iter().map(String::from).collect())
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn refusing(attempts: usize) -> Self {
        Self {
            refuse_first: attempts,
            ..Default::default()
        }
    }

    fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    fn connects(&self) -> Vec<(Instant, ConnectRequest)> {
        self.connects.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<LineStream> {
        let attempt = {
            let mut connects = self.connects.lock();
            connects.push((Instant::now(), request.clone()));
            connects.len()
        };
        if attempt <= self.refuse_first {
            return Err(Error::stream("connection refused"));
        }
        let lines: Vec<Result<String>> = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_default()
            .into_iter()
            .map(Ok)
            .collect();
        if self.close_after_script {
            Ok(Box::pin(stream::iter(lines)))
        } else {
            Ok(Box::pin(stream::iter(lines).chain(stream::pending())))
        }
    }
}

struct Harness {
    transport: Arc<ScriptedTransport>,
    keywords: SharedKeywords,
    requests: mpsc::Sender<KeywordRequest>,
    records: mpsc::Receiver<Record>,
    stats: PipelineStats,
    stop: StopToken,
    handle: tokio::task::JoinHandle<Result<()>>,
}

fn start(transport: ScriptedTransport, pending: Vec<KeywordRequest>) -> Harness {
    start_with_sample(transport, pending, None)
}

fn start_with_sample(
    transport: ScriptedTransport,
    pending: Vec<KeywordRequest>,
    sample: Option<Arc<ScriptedTransport>>,
) -> Harness {
    let transport = Arc::new(transport);
    let keywords = KeywordSet::from_seed(["merkel"]).into_shared();
    let (requests, request_rx) = mpsc::channel(16);
    for request in pending {
        requests.try_send(request).unwrap();
    }
    let (output, records) = mpsc::channel(4);
    let stats = PipelineStats::new();
    let source = StreamSource::new(
        transport.clone() as Arc<dyn Transport>,
        Amender::Tracked,
        InclusionFilter::new(true, &["en".to_string()]),
    );
    let mut controller = IngestionController::new(
        source,
        keywords.clone(),
        request_rx,
        output,
        ReconnectPacer::new(MIN_PAUSE, Duration::from_secs(320)),
        stats.clone(),
    );
    if let Some(sample) = sample {
        controller = controller.with_sample(StreamSource::new(
            sample as Arc<dyn Transport>,
            Amender::Sample,
            InclusionFilter::new(true, &[]),
        ));
    }
    let stop = StopToken::new();
    let handle = tokio::spawn(controller.run(stop.clone()));
    Harness {
        transport,
        keywords,
        requests,
        records,
        stats,
        stop,
        handle,
    }
}

async fn wait_for_connects(transport: &ScriptedTransport, count: usize) {
    while transport.connect_count() < count {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_lines_are_classified_filtered_and_forwarded() {
    let transport = ScriptedTransport::with_scripts(vec![vec![
        "",
        r#"{"limit": {"track": 3}}"#,
        r#"{"delete": {"status": {"id": 1}}}"#,
        r#"{"id_str": "1", "text": "nsfw", "possibly_sensitive": true}"#,
        r#"{"id_str": "2", "text": "hallo", "lang": "de"}"#,
        "{broken",
        r#"{"id_str": "3", "text": "merkel speaks", "lang": "en"}"#,
        r#"{"limit": {"track": 5}}"#,
    ]]);
    let mut h = start(transport, Vec::new());

    let record = h.records.recv().await.unwrap();
    assert_eq!(record.id, "3");
    assert_eq!(record.origin, Origin::Tracked);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = h.stats.snapshot();
    assert_eq!(stats.ingested, 1);
    assert_eq!(stats.filtered, 2);
    assert_eq!(stats.missed, 5);

    let (_, request) = &h.transport.connects()[0];
    assert_eq!(request.track, vec!["merkel"]);
    assert_eq!(request.languages, Vec::<String>::new());

    h.stop.cancel();
    h.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_keyword_change_reconnect_respects_min_pause() {
    let h = start(ScriptedTransport::default(), Vec::new());
    wait_for_connects(&h.transport, 1).await;

    h.requests.send(KeywordRequest::add("bundestag")).await.unwrap();
    wait_for_connects(&h.transport, 2).await;

    let connects = h.transport.connects();
    assert!(connects[1].0 - connects[0].0 >= MIN_PAUSE);
    assert_eq!(connects[1].1.track, vec!["bundestag", "merkel"]);

    // A second change right after the reconnect must wait out the pause again
    h.requests.send(KeywordRequest::remove("merkel")).await.unwrap();
    wait_for_connects(&h.transport, 3).await;
    let connects = h.transport.connects();
    assert!(connects[2].0 - connects[1].0 >= MIN_PAUSE);
    assert_eq!(connects[2].1.track, vec!["bundestag"]);

    h.stop.cancel();
    h.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pending_requests_are_coalesced_into_one_reconnect() {
    let h = start(
        ScriptedTransport::default(),
        vec![
            KeywordRequest::add("vote"),
            KeywordRequest::add("election"),
            KeywordRequest::remove("vote"),
        ],
    );
    wait_for_connects(&h.transport, 1).await;
    tokio::time::sleep(MIN_PAUSE * 5).await;

    assert_eq!(h.transport.connect_count(), 1);
    assert_eq!(h.transport.connects()[0].1.track, vec!["election", "merkel"]);
    let keywords = h.keywords.read();
    assert!(!keywords.get("vote").unwrap().active);
    drop(keywords);

    h.stop.cancel();
    h.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_keyword_set_does_not_reconnect() {
    let h = start(ScriptedTransport::default(), Vec::new());
    wait_for_connects(&h.transport, 1).await;

    h.requests.send(KeywordRequest::add("Merkel")).await.unwrap();
    h.requests.send(KeywordRequest::remove("unknown")).await.unwrap();
    tokio::time::sleep(MIN_PAUSE * 3).await;
    assert_eq!(h.transport.connect_count(), 1);

    h.stop.cancel();
    h.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_remote_close_reconnects_with_backoff() {
    let transport = ScriptedTransport {
        close_after_script: true,
        ..Default::default()
    };
    let h = start(transport, Vec::new());
    wait_for_connects(&h.transport, 3).await;

    let connects = h.transport.connects();
    // Empty connections double the pause
    assert!(connects[1].0 - connects[0].0 >= MIN_PAUSE * 2);
    assert!(connects[2].0 - connects[1].0 >= MIN_PAUSE * 4);

    h.stop.cancel();
    h.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_is_retried_with_backoff() {
    let mut transport = ScriptedTransport::refusing(2);
    transport.scripts = Mutex::new(VecDeque::from(vec![vec![
        r#"{"id_str": "7", "text": "merkel again", "lang": "en"}"#.to_string(),
    ]]));
    let mut h = start(transport, Vec::new());

    let record = tokio::time::timeout(Duration::from_secs(3600), h.records.recv())
        .await
        .expect("controller never retried a failed connect")
        .unwrap();
    assert_eq!(record.id, "7");

    let connects = h.transport.connects();
    assert_eq!(connects.len(), 3);
    // Each refusal doubles the pause
    assert!(connects[1].0 - connects[0].0 >= MIN_PAUSE * 2);
    assert!(connects[2].0 - connects[1].0 >= MIN_PAUSE * 4);

    h.stop.cancel();
    h.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failing_sample_stream_leaves_tracked_connection_alone() {
    let sample = Arc::new(ScriptedTransport::refusing(usize::MAX));
    let transport = ScriptedTransport::with_scripts(vec![vec![
        r#"{"id_str": "1", "text": "merkel speaks", "lang": "en"}"#,
    ]]);
    let mut h = start_with_sample(transport, Vec::new(), Some(Arc::clone(&sample)));

    assert_eq!(h.records.recv().await.unwrap().id, "1");
    wait_for_connects(&sample, 4).await;

    assert_eq!(h.transport.connect_count(), 1);
    let attempts = sample.connects();
    assert!(attempts[3].0 - attempts[2].0 >= MIN_PAUSE * 4);
    assert!(attempts.iter().all(|(_, request)| request.track.is_empty()));

    // A keyword change still reconnects the tracked stream
    h.requests.send(KeywordRequest::add("bundestag")).await.unwrap();
    wait_for_connects(&h.transport, 2).await;
    assert_eq!(h.transport.connects()[1].1.track, vec!["bundestag", "merkel"]);

    h.stop.cancel();
    h.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_blocked_on_full_queue() {
    let lines: Vec<String> = (0..10)
        .map(|i| format!(r#"{{"id_str": "{}", "text": "item"}}"#, i))
        .collect();
    let transport =
        ScriptedTransport::with_scripts(vec![lines.iter().map(String::as_str).collect()]);
    let h = start(transport, Vec::new());

    // Nobody drains the queue of capacity 4
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.stats.snapshot().ingested, 4);

    h.stop.cancel();
    tokio::time::timeout(Duration::from_secs(1), h.handle)
        .await
        .expect("controller observes stop while blocked")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_replay_transport_delivers_file_once() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"id_str": "a", "text": "first"}}"#).unwrap();
    writeln!(file).unwrap();
    writeln!(file, r#"{{"id_str": "b", "text": "second"}}"#).unwrap();

    let transport = ReplayTransport::new(file.path());
    assert!(!transport.filters_by_keyword());

    let mut first = transport.connect(&ConnectRequest::default()).await.unwrap();
    let mut lines = Vec::new();
    for _ in 0..3 {
        lines.push(first.next().await.unwrap().unwrap());
    }
    assert!(lines[1].is_empty());
    assert_eq!(lines[2], r#"{"id_str": "b", "text": "second"}"#);
    // The drained connection stays open without ending
    let idle = tokio::time::timeout(Duration::from_millis(50), first.next()).await;
    assert!(idle.is_err());

    let mut again = transport.connect(&ConnectRequest::default()).await.unwrap();
    let next = tokio::time::timeout(Duration::from_millis(50), again.next()).await;
    assert!(next.is_err(), "exhausted replay idles");
}

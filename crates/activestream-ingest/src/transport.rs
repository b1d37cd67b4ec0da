//! Line-stream transports for the streaming source

use activestream_core::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};
use url::Url;

/// Longest line accepted from a transport
const MAX_LINE_BYTES: usize = 1 << 20;

/// Lines of an open connection. Dropping it closes the connection.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Connection parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectRequest {
    /// Keyword filter; empty for an unfiltered sample stream
    pub track: Vec<String>,
    pub languages: Vec<String>,
    /// Bounding boxes as flat `[sw_lon, sw_lat, ne_lon, ne_lat, ...]`
    pub locations: Vec<f64>,
}

/// Source of line-delimited stream messages
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Whether the remote end filters by the tracked keywords.
    /// Filtering transports are not connected while no keyword is active.
    fn filters_by_keyword(&self) -> bool {
        true
    }

    /// Open a connection
    async fn connect(&self, request: &ConnectRequest) -> Result<LineStream>;
}

/// Streaming HTTP endpoint delivering newline-delimited JSON
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    bearer_token: Option<String>,
    /// Limit on waiting for the response head after connecting
    response_timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: &str, bearer_token: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("Invalid stream endpoint '{}': {}", endpoint, e)))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::stream(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            bearer_token,
            response_timeout: Duration::from_secs(30),
        })
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    fn query(request: &ConnectRequest) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if !request.track.is_empty() {
            query.push(("track", request.track.join(",")));
        }
        if !request.languages.is_empty() {
            query.push(("language", request.languages.join(",")));
        }
        if !request.locations.is_empty() {
            let boxes: Vec<String> = request.locations.iter().map(|c| c.to_string()).collect();
            query.push(("locations", boxes.join(",")));
        }
        query
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        self.endpoint.host_str().unwrap_or("http")
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<LineStream> {
        let mut builder = self
            .client
            .get(self.endpoint.clone())
            .query(&Self::query(request));
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }

        // Body reads stay unbounded; only the response head is timed
        let response = tokio::time::timeout(self.response_timeout, builder.send())
            .await
            .map_err(|_| {
                warn!(
                    endpoint = %self.endpoint,
                    timeout_ms = self.response_timeout.as_millis() as u64,
                    "Stream endpoint did not answer"
                );
                Error::Timeout
            })?
            .map_err(|e| Error::stream(format!("Connection to {} failed: {}", self.endpoint, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::stream(format!(
                "Stream endpoint {} returned {}",
                self.endpoint, status
            )));
        }
        info!(endpoint = %self.endpoint, "Stream connected");

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
        Ok(into_lines(StreamReader::new(bytes)))
    }
}

/// Replays a recorded line-delimited message file.
///
/// Keyword filters are not applied. After the first full pass, further
/// connections stay open without delivering anything unless `repeat` is set.
pub struct ReplayTransport {
    path: PathBuf,
    pace: Option<Duration>,
    repeat: bool,
    exhausted: Arc<AtomicBool>,
}

impl ReplayTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pace: None,
            repeat: false,
            exhausted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Delay between delivered lines
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = (!pace.is_zero()).then_some(pace);
        self
    }

    /// Start over from the first line on every connection
    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    fn name(&self) -> &str {
        "replay"
    }

    fn filters_by_keyword(&self) -> bool {
        false
    }

    async fn connect(&self, _request: &ConnectRequest) -> Result<LineStream> {
        if !self.repeat && self.exhausted.load(Ordering::SeqCst) {
            debug!(path = %self.path.display(), "Replay already delivered");
            return Ok(Box::pin(stream::pending()));
        }

        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            Error::stream(format!("Cannot open replay file {}: {}", self.path.display(), e))
        })?;
        info!(path = %self.path.display(), "Replaying recorded stream");

        let lines = into_lines(file);
        let lines: LineStream = match self.pace {
            Some(pace) => Box::pin(lines.then(move |line| async move {
                tokio::time::sleep(pace).await;
                line
            })),
            None => lines,
        };

        if self.repeat {
            return Ok(lines);
        }
        // Once the file is drained the connection idles instead of ending
        let exhausted = Arc::clone(&self.exhausted);
        let tail = stream::once(async move {
            exhausted.store(true, Ordering::SeqCst);
        })
        .filter_map(|()| async { None::<Result<String>> });
        Ok(Box::pin(lines.chain(tail).chain(stream::pending())))
    }
}

fn into_lines<R>(reader: R) -> LineStream
where
    R: tokio::io::AsyncRead + Send + 'static,
{
    let lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES))
        .map(|line| line.map_err(|e| Error::stream(format!("Malformed stream line: {}", e))));
    Box::pin(lines)
}

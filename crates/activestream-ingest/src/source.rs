//! Stream sources: one connection plus the way its items are amended

use crate::message::{RawItem, StreamMessage};
use crate::transport::{ConnectRequest, LineStream, Transport};
use activestream_core::{Origin, Record, Result};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// How items from a source are tagged before they enter the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amender {
    /// Primary stream filtered by the tracked keywords
    Tracked,
    /// Unfiltered background sample
    Sample,
}

impl Amender {
    pub fn origin(&self) -> Origin {
        match self {
            Self::Tracked => Origin::Tracked,
            Self::Sample => Origin::Sample,
        }
    }

    /// Convert an admitted item to a record with default relevance fields
    pub fn amend(&self, item: RawItem) -> Result<Record> {
        item.into_record(self.origin())
    }
}

/// Rejects content that should never reach the pipeline
#[derive(Debug, Clone, Default)]
pub struct InclusionFilter {
    drop_sensitive: bool,
    languages: HashSet<String>,
}

impl InclusionFilter {
    /// `languages` empty means every language is accepted
    pub fn new(drop_sensitive: bool, languages: &[String]) -> Self {
        Self {
            drop_sensitive,
            languages: languages.iter().map(|l| l.to_lowercase()).collect(),
        }
    }

    pub fn admits(&self, item: &RawItem) -> bool {
        if self.drop_sensitive && item.is_sensitive() {
            return false;
        }
        match &item.lang {
            Some(lang) if !self.languages.is_empty() => {
                self.languages.contains(&lang.to_lowercase())
            }
            _ => true,
        }
    }
}

/// Outcome of handling one line
#[derive(Debug)]
pub enum SourceEvent {
    Record(Record),
    /// Newly reported rate-limited documents
    Missed(u64),
    /// Content item rejected by the inclusion filter
    Filtered,
    /// Keep-alive, deletion notice or unknown message
    Ignored,
}

/// A connection to the streaming source and the amender for its items
pub struct StreamSource {
    transport: Arc<dyn Transport>,
    amender: Amender,
    filter: InclusionFilter,
    languages: Vec<String>,
    locations: Vec<f64>,
    stream: Option<LineStream>,
    /// Cumulative rate-limit count reported on the current connection
    missed_seen: u64,
    /// Content items delivered on the current connection
    delivered: u64,
}

impl StreamSource {
    pub fn new(transport: Arc<dyn Transport>, amender: Amender, filter: InclusionFilter) -> Self {
        Self {
            transport,
            amender,
            filter,
            languages: Vec::new(),
            locations: Vec::new(),
            stream: None,
            missed_seen: 0,
            delivered: 0,
        }
    }

    /// Auxiliary connection parameters
    pub fn with_params(mut self, languages: Vec<String>, locations: Vec<f64>) -> Self {
        self.languages = languages;
        self.locations = locations;
        self
    }

    pub fn amender(&self) -> Amender {
        self.amender
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Items delivered since the last connect
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Replace any open connection with a fresh one
    pub async fn connect(&mut self, keywords: &[String]) -> Result<()> {
        self.disconnect();

        let track = match self.amender {
            Amender::Tracked => keywords.to_vec(),
            Amender::Sample => Vec::new(),
        };
        if self.amender == Amender::Tracked
            && track.is_empty()
            && self.transport.filters_by_keyword()
        {
            info!(transport = self.transport.name(), "No active keywords, tracked stream idle");
            return Ok(());
        }

        let request = ConnectRequest {
            track,
            languages: self.languages.clone(),
            locations: self.locations.clone(),
        };
        self.stream = Some(self.transport.connect(&request).await?);
        info!(
            transport = self.transport.name(),
            origin = self.amender.origin().as_str(),
            keywords = ?request.track,
            "Connected"
        );
        Ok(())
    }

    /// Close the connection, if open
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!(origin = self.amender.origin().as_str(), "Disconnected");
        }
        self.missed_seen = 0;
        self.delivered = 0;
    }

    /// Next line from the connection. Pending forever while disconnected;
    /// `None` once the remote end closed the connection.
    pub async fn next_line(&mut self) -> Option<Result<String>> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => std::future::pending().await,
        }
    }

    /// Classify a line and, for content items, filter and amend it
    pub fn on_line(&mut self, line: &str) -> Result<SourceEvent> {
        match StreamMessage::parse(line)? {
            StreamMessage::Limit { track } => {
                let delta = track.saturating_sub(self.missed_seen);
                self.missed_seen = self.missed_seen.max(track);
                Ok(SourceEvent::Missed(delta))
            }
            StreamMessage::Item(item) => self.on_item(*item),
            StreamMessage::KeepAlive | StreamMessage::Delete | StreamMessage::Unknown => {
                Ok(SourceEvent::Ignored)
            }
        }
    }

    /// Filter then amend a content item
    pub fn on_item(&mut self, item: RawItem) -> Result<SourceEvent> {
        if !self.filter.admits(&item) {
            return Ok(SourceEvent::Filtered);
        }
        let record = self.amender.amend(item)?;
        self.delivered += 1;
        Ok(SourceEvent::Record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReplayTransport;

    fn source(amender: Amender, filter: InclusionFilter) -> StreamSource {
        StreamSource::new(Arc::new(ReplayTransport::new("unused")), amender, filter)
    }

    #[test]
    fn test_inclusion_filter() {
        let filter = InclusionFilter::new(true, &["en".to_string()]);
        let mut item: RawItem =
            serde_json::from_str(r#"{"id": 1, "text": "hello", "lang": "EN"}"#).unwrap();
        assert!(filter.admits(&item));

        item.possibly_sensitive = Some(true);
        assert!(!filter.admits(&item));

        item.possibly_sensitive = None;
        item.lang = Some("de".into());
        assert!(!filter.admits(&item));
        assert!(InclusionFilter::new(true, &[]).admits(&item));
    }

    #[test]
    fn test_amenders_tag_origin() {
        let mut tracked = source(Amender::Tracked, InclusionFilter::default());
        let mut sample = source(Amender::Sample, InclusionFilter::default());
        let line = r#"{"id_str": "5", "text": "hi"}"#;

        let SourceEvent::Record(record) = tracked.on_line(line).unwrap() else {
            panic!("expected record");
        };
        assert_eq!(record.origin, Origin::Tracked);
        let SourceEvent::Record(record) = sample.on_line(line).unwrap() else {
            panic!("expected record");
        };
        assert_eq!(record.origin, Origin::Sample);
        assert_eq!(sample.delivered(), 1);
    }

    #[test]
    fn test_missed_count_reports_deltas() {
        let mut source = source(Amender::Tracked, InclusionFilter::default());
        let deltas: Vec<u64> = [10, 25, 25, 20]
            .iter()
            .map(|n| match source.on_line(&format!(r#"{{"limit": {{"track": {}}}}}"#, n)) {
                Ok(SourceEvent::Missed(delta)) => delta,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(deltas, vec![10, 15, 0, 0]);

        source.disconnect();
        assert!(matches!(
            source.on_line(r#"{"limit": {"track": 4}}"#).unwrap(),
            SourceEvent::Missed(4)
        ));
    }

    #[test]
    fn test_filtered_and_ignored_lines() {
        let mut source = source(Amender::Tracked, InclusionFilter::new(true, &[]));
        assert!(matches!(
            source
                .on_line(r#"{"id": 1, "text": "x", "possibly_sensitive": true}"#)
                .unwrap(),
            SourceEvent::Filtered
        ));
        assert!(matches!(source.on_line("").unwrap(), SourceEvent::Ignored));
        assert!(matches!(
            source.on_line(r#"{"delete": {}}"#).unwrap(),
            SourceEvent::Ignored
        ));
        assert_eq!(source.delivered(), 0);
    }
}

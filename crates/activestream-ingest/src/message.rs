//! Wire messages delivered by the streaming source
//!
//! Each line is one JSON object: a rate-limit notice, a deletion notice or a
//! content item. Blank lines are keep-alives.

use activestream_core::{EntityKind, EntitySpan, Error, Origin, Record, Result};
use serde::Deserialize;

/// A classified stream line
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Blank line sent to hold the connection open
    KeepAlive,
    /// Documents withheld by rate limiting; cumulative for the connection
    Limit { track: u64 },
    /// A previously delivered item was deleted upstream
    Delete,
    /// Content item
    Item(Box<RawItem>),
    /// Valid JSON of an unknown shape
    Unknown,
}

impl StreamMessage {
    /// Classify one line
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::KeepAlive);
        }

        let value: serde_json::Value = serde_json::from_str(line)?;
        if let Some(limit) = value.get("limit") {
            let track = limit.get("track").and_then(|t| t.as_u64()).unwrap_or(0);
            return Ok(Self::Limit { track });
        }
        if value.get("delete").is_some() {
            return Ok(Self::Delete);
        }
        if value.get("text").is_some() || value.get("extended_tweet").is_some() {
            let item: RawItem = serde_json::from_value(value)?;
            return Ok(Self::Item(Box::new(item)));
        }
        Ok(Self::Unknown)
    }
}

/// Content item as delivered on the wire
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawItem {
    #[serde(default)]
    pub id_str: Option<String>,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub text: String,
    /// Untruncated text for long items
    #[serde(default)]
    pub extended_tweet: Option<ExtendedText>,
    #[serde(default)]
    pub user: Option<RawUser>,
    #[serde(default)]
    pub entities: RawEntities,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub possibly_sensitive: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtendedText {
    pub full_text: String,
    #[serde(default)]
    pub entities: Option<RawEntities>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawUser {
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawEntities {
    #[serde(default)]
    pub hashtags: Vec<RawTag>,
    #[serde(default)]
    pub user_mentions: Vec<RawMention>,
    #[serde(default)]
    pub urls: Vec<RawUrl>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawTag {
    pub text: String,
    pub indices: [usize; 2],
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawMention {
    pub screen_name: String,
    pub indices: [usize; 2],
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawUrl {
    pub url: String,
    #[serde(default)]
    pub expanded_url: Option<String>,
    pub indices: [usize; 2],
}

impl RawItem {
    /// Stable identifier of the item
    pub fn record_id(&self) -> Result<String> {
        self.id_str
            .clone()
            .or_else(|| self.id.map(|id| id.to_string()))
            .ok_or_else(|| Error::stream("content item without an id"))
    }

    pub fn is_sensitive(&self) -> bool {
        self.possibly_sensitive.unwrap_or(false)
    }

    /// Convert to a record with default relevance fields
    pub fn into_record(self, origin: Origin) -> Result<Record> {
        let id = self.record_id()?;
        let (text, entities) = match self.extended_tweet {
            Some(extended) => (
                extended.full_text,
                extended.entities.unwrap_or(self.entities),
            ),
            None => (self.text, self.entities),
        };

        let mut record = Record::new(id, text, origin).with_entities(entities.into_spans());
        if let Some(user) = self.user {
            record = record.with_author(user.screen_name, user.name);
        }
        if let Some(lang) = self.lang {
            record = record.with_lang(lang);
        }
        Ok(record)
    }
}

impl RawEntities {
    /// Entity spans with char offsets, ordered by start
    pub fn into_spans(self) -> Vec<EntitySpan> {
        let tags = self
            .hashtags
            .into_iter()
            .map(|t| EntitySpan::new(EntityKind::Tag, t.indices[0], t.indices[1], t.text));
        let mentions = self.user_mentions.into_iter().map(|m| {
            EntitySpan::new(EntityKind::Mention, m.indices[0], m.indices[1], m.screen_name)
        });
        let links = self.urls.into_iter().map(|u| {
            let target = u.expanded_url.unwrap_or(u.url);
            EntitySpan::new(EntityKind::Link, u.indices[0], u.indices[1], target)
        });

        let mut spans: Vec<EntitySpan> = tags.chain(mentions).chain(links).collect();
        spans.sort_by_key(|s| (s.start, s.end));
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = r#"{
        "id_str": "1001",
        "text": "@bob vote for #change https://t.co/x",
        "user": {"screen_name": "alice", "name": "Alice A"},
        "entities": {
            "hashtags": [{"text": "change", "indices": [14, 21]}],
            "user_mentions": [{"screen_name": "bob", "indices": [0, 4]}],
            "urls": [{"url": "https://t.co/x", "expanded_url": "https://example.org/news/vote", "indices": [22, 36]}]
        },
        "lang": "en"
    }"#;

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(StreamMessage::parse("  \r").unwrap(), StreamMessage::KeepAlive);
        assert_eq!(
            StreamMessage::parse(r#"{"limit": {"track": 42}}"#).unwrap(),
            StreamMessage::Limit { track: 42 }
        );
        assert_eq!(
            StreamMessage::parse(r#"{"delete": {"status": {"id": 1}}}"#).unwrap(),
            StreamMessage::Delete
        );
        assert_eq!(
            StreamMessage::parse(r#"{"warning": {}}"#).unwrap(),
            StreamMessage::Unknown
        );
        assert!(StreamMessage::parse("{not json").is_err());
    }

    #[test]
    fn test_parse_content_item() {
        let StreamMessage::Item(item) = StreamMessage::parse(ITEM).unwrap() else {
            panic!("expected content item");
        };
        let record = item.into_record(Origin::Tracked).unwrap();

        assert_eq!(record.id, "1001");
        assert_eq!(record.origin, Origin::Tracked);
        assert_eq!(record.lang.as_deref(), Some("en"));
        assert_eq!(record.author.as_ref().unwrap().handle, "alice");
        assert!(record.manual_relevant.is_none());
        assert!(record.probability_relevant.is_none());

        let kinds: Vec<_> = record.entities.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntityKind::Mention, EntityKind::Tag, EntityKind::Link]);
        assert_eq!(record.entities[2].text, "https://example.org/news/vote");
    }

    #[test]
    fn test_extended_text_wins() {
        let line = r#"{"id": 7, "text": "short…", "extended_tweet": {"full_text": "the full long text"}}"#;
        let StreamMessage::Item(item) = StreamMessage::parse(line).unwrap() else {
            panic!("expected content item");
        };
        let record = item.into_record(Origin::Sample).unwrap();
        assert_eq!(record.id, "7");
        assert_eq!(record.text, "the full long text");
    }

    #[test]
    fn test_item_without_id_is_rejected() {
        let StreamMessage::Item(item) = StreamMessage::parse(r#"{"text": "anonymous"}"#).unwrap()
        else {
            panic!("expected content item");
        };
        assert!(matches!(item.into_record(Origin::Tracked), Err(Error::Stream(_))));
    }
}

//! Core types for ActiveStream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of an ingested document
pub type RecordId = String;

/// Dense id assigned by the vocabulary index
pub type TermId = u32;

/// Sparse term-id → count representation of a document.
///
/// Ordered so that iteration (and therefore serialization and dense
/// expansion) never depends on hashing.
pub type BagOfTerms = BTreeMap<TermId, u32>;

/// Probability at which a document is considered relevant
pub const DECISION_BOUNDARY: f64 = 0.5;

/// Which connection produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Keyword-tracked stream
    Tracked,
    /// Unfiltered background sample, used for evaluation diversity
    Sample,
}

impl Origin {
    /// Label used for logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracked => "tracked",
            Self::Sample => "sample",
        }
    }
}

/// Manual annotation committed by the oracle.
///
/// An unset label is represented as `None` on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualLabel {
    Relevant,
    Irrelevant,
    /// Permanently excluded from training and re-classification
    Skipped,
}

impl ManualLabel {
    /// Training target for this label, `None` for skipped records
    pub fn target(&self) -> Option<bool> {
        match self {
            Self::Relevant => Some(true),
            Self::Irrelevant => Some(false),
            Self::Skipped => None,
        }
    }

    /// Build a training label from a boolean verdict
    pub fn from_relevance(relevant: bool) -> Self {
        if relevant {
            Self::Relevant
        } else {
            Self::Irrelevant
        }
    }
}

/// Version of the model that produced a record's current score.
///
/// Ordered: `Unscored` < `Version(_)` < `GroundTruth`, so a manual label is
/// always newer than any model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStamp {
    /// Never classified
    Unscored,
    /// Scored by the model with this version (0 = untrained baseline)
    Version(u64),
    /// Score replaced by a manual label
    GroundTruth,
}

impl ModelStamp {
    /// Numeric form used on the wire: -1, the version, or +inf
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Unscored => -1.0,
            Self::Version(v) => *v as f64,
            Self::GroundTruth => f64::INFINITY,
        }
    }
}

impl fmt::Display for ModelStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unscored => write!(f, "unscored"),
            Self::Version(v) => write!(f, "v{}", v),
            Self::GroundTruth => write!(f, "ground-truth"),
        }
    }
}

/// Kind of structured entity embedded in a document's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Mention,
    Tag,
    Link,
}

/// Entity span in character offsets `[start, end)` of the raw text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub kind: EntityKind,
    pub start: usize,
    pub end: usize,
    /// Entity payload: screen name, tag text or expanded URL
    pub text: String,
}

impl EntitySpan {
    /// Create a new entity span
    pub fn new(kind: EntityKind, start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            kind,
            start,
            end,
            text: text.into(),
        }
    }
}

/// Author of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub handle: String,
    pub display_name: String,
}

/// One ingested document with its derived classification state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,

    /// Raw document text
    pub text: String,

    #[serde(default)]
    pub author: Option<Author>,

    /// Language code reported by the source
    #[serde(default)]
    pub lang: Option<String>,

    /// Entity spans stripped before tokenization
    #[serde(default)]
    pub entities: Vec<EntitySpan>,

    /// Sparse bag-of-terms, filled by the feature extractor
    #[serde(default)]
    pub bag: BagOfTerms,

    /// Vocabulary size right after this record was vectorized
    #[serde(default)]
    pub vocab_size_at_extraction: usize,

    pub manual_relevant: Option<ManualLabel>,
    pub probability_relevant: Option<f64>,
    pub classifier_relevant: Option<bool>,

    /// `(p - 0.5)^2`; lower is more uncertain
    pub annotation_priority: Option<f64>,

    pub model_version: ModelStamp,

    pub origin: Origin,

    /// Labelled during an evaluation round
    #[serde(default)]
    pub evaluation: bool,

    pub received_at: DateTime<Utc>,
}

impl Record {
    /// Create a new, unclassified record with default relevance fields
    pub fn new(id: impl Into<RecordId>, text: impl Into<String>, origin: Origin) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            author: None,
            lang: None,
            entities: Vec::new(),
            bag: BagOfTerms::new(),
            vocab_size_at_extraction: 0,
            manual_relevant: None,
            probability_relevant: None,
            classifier_relevant: None,
            annotation_priority: None,
            model_version: ModelStamp::Unscored,
            origin,
            evaluation: false,
            received_at: Utc::now(),
        }
    }

    /// Set the author
    pub fn with_author(mut self, handle: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.author = Some(Author {
            handle: handle.into(),
            display_name: display_name.into(),
        });
        self
    }

    /// Set the entity spans
    pub fn with_entities(mut self, entities: Vec<EntitySpan>) -> Self {
        self.entities = entities;
        self
    }

    /// Set the language
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Whether the oracle has committed any label (including skip)
    pub fn is_labelled(&self) -> bool {
        self.manual_relevant.is_some()
    }

    /// Whether any model has scored this record
    pub fn is_scored(&self) -> bool {
        self.probability_relevant.is_some()
    }

    /// Classifier guess rounded to a label
    pub fn guess(&self) -> Option<bool> {
        self.probability_relevant.map(|p| p >= DECISION_BOUNDARY)
    }
}

/// Squared distance of a probability from the decision boundary
pub fn annotation_priority(probability: f64) -> f64 {
    (probability - DECISION_BOUNDARY).powi(2)
}

/// Outcome of scoring one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub probability: f64,
    pub relevant: bool,
    pub priority: f64,
}

impl Classification {
    /// Derive the relevance flag and annotation priority from a probability
    pub fn from_probability(probability: f64) -> Self {
        Self {
            probability,
            relevant: probability >= DECISION_BOUNDARY,
            priority: annotation_priority(probability),
        }
    }
}

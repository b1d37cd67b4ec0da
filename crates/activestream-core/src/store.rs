//! Document store contract and in-memory implementation
//!
//! The store is the single source of truth for record state. Workers query
//! it with predicate filters, write classification results in unordered
//! bulk, and commit manual labels one record at a time.

use crate::error::Result;
use crate::types::{Classification, ManualLabel, ModelStamp, Record, RecordId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Store shared by every worker
pub type SharedStore = Arc<dyn DocumentStore>;

/// Predicate on a record's manual label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelFilter {
    #[default]
    Any,
    /// No label committed yet
    Unlabelled,
    /// Exactly this label
    Is(ManualLabel),
    /// Relevant or irrelevant, never skipped
    Training,
}

impl LabelFilter {
    fn matches(&self, label: Option<ManualLabel>) -> bool {
        match self {
            Self::Any => true,
            Self::Unlabelled => label.is_none(),
            Self::Is(expected) => label == Some(*expected),
            Self::Training => matches!(
                label,
                Some(ManualLabel::Relevant) | Some(ManualLabel::Irrelevant)
            ),
        }
    }
}

/// Conjunction of field predicates
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub label: LabelFilter,
    /// Has (or lacks) a probability
    pub scored: Option<bool>,
    pub classifier_relevant: Option<bool>,
    /// `model_version` strictly below this stamp
    pub stamp_below: Option<ModelStamp>,
    pub evaluation: Option<bool>,
}

impl Filter {
    /// Match every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Records without a manual label
    pub fn unlabelled() -> Self {
        Self {
            label: LabelFilter::Unlabelled,
            ..Self::default()
        }
    }

    /// Records carrying a relevant/irrelevant label
    pub fn training() -> Self {
        Self {
            label: LabelFilter::Training,
            ..Self::default()
        }
    }

    /// Records carrying exactly this label
    pub fn label(label: ManualLabel) -> Self {
        Self {
            label: LabelFilter::Is(label),
            ..Self::default()
        }
    }

    pub fn scored(mut self, scored: bool) -> Self {
        self.scored = Some(scored);
        self
    }

    pub fn classifier_relevant(mut self, relevant: bool) -> Self {
        self.classifier_relevant = Some(relevant);
        self
    }

    pub fn stamp_below(mut self, stamp: ModelStamp) -> Self {
        self.stamp_below = Some(stamp);
        self
    }

    pub fn evaluation(mut self, evaluation: bool) -> Self {
        self.evaluation = Some(evaluation);
        self
    }

    /// Check a record against every predicate
    pub fn matches(&self, record: &Record) -> bool {
        self.label.matches(record.manual_relevant)
            && self.scored.map_or(true, |s| record.is_scored() == s)
            && self
                .classifier_relevant
                .map_or(true, |r| record.classifier_relevant == Some(r))
            && self.stamp_below.map_or(true, |s| record.model_version < s)
            && self.evaluation.map_or(true, |e| record.evaluation == e)
    }
}

/// Field to sort query results by, ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Unset priorities sort last
    AnnotationPriority,
    ReceivedAt,
}

/// Filtered, optionally sorted and limited query
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Filter,
    pub sort: Option<SortField>,
    /// Matches passed over before the first returned one
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort: None,
            skip: 0,
            limit: None,
        }
    }

    pub fn sort_by(mut self, field: SortField) -> Self {
        self.sort = Some(field);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Precondition for applying an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateGuard {
    #[default]
    Always,
    /// Only while the record has no manual label
    Unlabelled,
}

/// Partial field set applied to a single record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub manual_relevant: Option<ManualLabel>,
    pub probability_relevant: Option<f64>,
    pub classifier_relevant: Option<bool>,
    /// `Some(None)` clears the priority
    pub annotation_priority: Option<Option<f64>>,
    pub model_version: Option<ModelStamp>,
    pub evaluation: Option<bool>,
    pub guard: UpdateGuard,
}

impl RecordUpdate {
    /// Score written by the classifier service. Never overwrites ground truth.
    pub fn classification(classification: Classification, version: u64) -> Self {
        Self {
            probability_relevant: Some(classification.probability),
            classifier_relevant: Some(classification.relevant),
            annotation_priority: Some(Some(classification.priority)),
            model_version: Some(ModelStamp::Version(version)),
            guard: UpdateGuard::Unlabelled,
            ..Self::default()
        }
    }

    /// Label committed by the annotation loop
    pub fn annotation(label: ManualLabel, evaluation: bool) -> Self {
        Self {
            manual_relevant: Some(label),
            annotation_priority: Some(None),
            model_version: Some(ModelStamp::GroundTruth),
            evaluation: Some(evaluation),
            ..Self::default()
        }
    }

    /// Apply to a record. Returns false when the guard rejects the update.
    pub fn apply(&self, record: &mut Record) -> bool {
        if self.guard == UpdateGuard::Unlabelled && record.is_labelled() {
            return false;
        }
        if let Some(label) = self.manual_relevant {
            record.manual_relevant = Some(label);
        }
        if let Some(p) = self.probability_relevant {
            record.probability_relevant = Some(p);
        }
        if let Some(r) = self.classifier_relevant {
            record.classifier_relevant = Some(r);
        }
        if let Some(priority) = self.annotation_priority {
            record.annotation_priority = priority;
        }
        if let Some(stamp) = self.model_version {
            record.model_version = stamp;
        }
        if let Some(evaluation) = self.evaluation {
            record.evaluation = evaluation;
        }
        true
    }
}

/// Outcome of an unordered bulk update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkResult {
    /// Ids found in the store
    pub matched: usize,
    /// Updates that passed their guard
    pub modified: usize,
}

/// Queryable document collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new record. Re-inserting a known id is a no-op returning false.
    async fn insert(&self, record: Record) -> Result<bool>;

    /// Fetch one record by id
    async fn get(&self, id: &str) -> Result<Option<Record>>;

    /// Filtered query with optional ascending sort and limit
    async fn find(&self, query: &Query) -> Result<Vec<Record>>;

    /// Number of records matching a filter
    async fn count(&self, filter: &Filter) -> Result<usize>;

    /// Apply a partial update to one record. Returns whether it was modified.
    async fn update(&self, id: &str, update: &RecordUpdate) -> Result<bool>;

    /// Apply many updates in one call, in no particular order
    async fn bulk_update(&self, updates: Vec<(RecordId, RecordUpdate)>) -> Result<BulkResult>;
}

/// In-memory document store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// Insertion order
    records: Vec<Record>,
    index: HashMap<RecordId, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store ready for sharing between workers
    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compare_priority(a: &Record, b: &Record) -> Ordering {
    match (a.annotation_priority, b.annotation_priority) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, record: Record) -> Result<bool> {
        let mut inner = self.inner.write();
        if inner.index.contains_key(&record.id) {
            debug!(record_id = %record.id, "Duplicate insert ignored");
            return Ok(false);
        }
        let position = inner.records.len();
        inner.index.insert(record.id.clone(), position);
        inner.records.push(record);
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<Record>> {
        let inner = self.inner.read();
        Ok(inner.index.get(id).map(|i| inner.records[*i].clone()))
    }

    async fn find(&self, query: &Query) -> Result<Vec<Record>> {
        let inner = self.inner.read();
        let mut matches: Vec<&Record> = inner
            .records
            .iter()
            .filter(|r| query.filter.matches(r))
            .collect();

        // Stable sorts keep insertion order among ties
        match query.sort {
            Some(SortField::AnnotationPriority) => matches.sort_by(|a, b| compare_priority(a, b)),
            Some(SortField::ReceivedAt) => matches.sort_by_key(|r| r.received_at),
            None => {}
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matches
            .into_iter()
            .skip(query.skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &Filter) -> Result<usize> {
        let inner = self.inner.read();
        Ok(inner.records.iter().filter(|r| filter.matches(r)).count())
    }

    async fn update(&self, id: &str, update: &RecordUpdate) -> Result<bool> {
        let mut inner = self.inner.write();
        let Some(position) = inner.index.get(id).copied() else {
            return Ok(false);
        };
        Ok(update.apply(&mut inner.records[position]))
    }

    async fn bulk_update(&self, updates: Vec<(RecordId, RecordUpdate)>) -> Result<BulkResult> {
        let mut inner = self.inner.write();
        let mut result = BulkResult::default();
        for (id, update) in updates {
            let Some(position) = inner.index.get(&id).copied() else {
                continue;
            };
            result.matched += 1;
            if update.apply(&mut inner.records[position]) {
                result.modified += 1;
            }
        }
        Ok(result)
    }
}

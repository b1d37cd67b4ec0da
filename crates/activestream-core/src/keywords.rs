//! Tracked keywords

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Keyword set shared between the ingestion controller (writer) and readers
pub type SharedKeywords = Arc<RwLock<KeywordSet>>;

/// Activation state change in a keyword's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordTransition {
    Activated,
    Deactivated,
}

/// A term tracked on the primary stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub word: String,
    pub active: bool,
    /// Timestamped activation history
    pub history: Vec<(KeywordTransition, DateTime<Utc>)>,
    pub n_relevant: u64,
    pub n_irrelevant: u64,
    /// Supplied by the operator (seed or add request) rather than discovered
    pub user_word: bool,
}

impl Keyword {
    /// Create an inactive keyword
    pub fn new(word: impl Into<String>, user_word: bool) -> Self {
        Self {
            word: word.into(),
            active: false,
            history: Vec::new(),
            n_relevant: 0,
            n_irrelevant: 0,
            user_word,
        }
    }

    /// Start tracking this keyword
    pub fn activate(&mut self) {
        self.active = true;
        self.history.push((KeywordTransition::Activated, Utc::now()));
    }

    /// Stop tracking this keyword
    pub fn deactivate(&mut self) {
        self.active = false;
        self.history.push((KeywordTransition::Deactivated, Utc::now()));
    }
}

/// All keywords ever tracked, keyed by word
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordSet {
    keywords: BTreeMap<String, Keyword>,
}

impl KeywordSet {
    /// Create a set from seed words, each activated on creation
    pub fn from_seed<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for word in words {
            set.add(word);
        }
        set
    }

    /// Wrap for sharing between workers
    pub fn into_shared(self) -> SharedKeywords {
        Arc::new(RwLock::new(self))
    }

    /// Add (or re-activate) a keyword. Returns true if the active set changed.
    pub fn add(&mut self, word: impl Into<String>) -> bool {
        let word = normalize(&word.into());
        if word.is_empty() {
            return false;
        }
        let keyword = self
            .keywords
            .entry(word.clone())
            .or_insert_with(|| Keyword::new(word, true));
        if keyword.active {
            return false;
        }
        keyword.activate();
        true
    }

    /// Deactivate a keyword. History is kept. Returns true if the active set changed.
    pub fn remove(&mut self, word: &str) -> bool {
        match self.keywords.get_mut(&normalize(word)) {
            Some(keyword) if keyword.active => {
                keyword.deactivate();
                true
            }
            _ => false,
        }
    }

    /// Currently tracked words, sorted
    pub fn active_words(&self) -> Vec<String> {
        self.keywords
            .values()
            .filter(|k| k.active)
            .map(|k| k.word.clone())
            .collect()
    }

    /// Look up a keyword record
    pub fn get(&self, word: &str) -> Option<&Keyword> {
        self.keywords.get(&normalize(word))
    }

    /// All keyword records, active or not
    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.values()
    }

    /// Credit a verdict to every active keyword that occurs in `text`
    pub fn record_verdict(&mut self, text: &str, relevant: bool) {
        let text = text.to_lowercase();
        for keyword in self.keywords.values_mut().filter(|k| k.active) {
            if text.contains(&keyword.word) {
                if relevant {
                    keyword.n_relevant += 1;
                } else {
                    keyword.n_irrelevant += 1;
                }
            }
        }
    }
}

fn normalize(word: &str) -> String {
    word.trim().to_lowercase()
}

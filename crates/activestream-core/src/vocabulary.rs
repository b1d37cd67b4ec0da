//! Append-only vocabulary index
//!
//! A bijection between terms and dense integer ids that only ever grows.
//! Growth is serialized behind a write lock; readers always observe the
//! mapping at some completed size, never a partially inserted term.

use crate::types::{BagOfTerms, TermId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Vocabulary shared across extraction, classification and training
pub type SharedVocabulary = Arc<Vocabulary>;

/// Append-only term ↔ id mapping
#[derive(Debug, Default)]
pub struct Vocabulary {
    inner: RwLock<VocabularyInner>,
}

#[derive(Debug, Default)]
struct VocabularyInner {
    token_to_id: HashMap<String, TermId>,
    /// Reverse cache, index = id
    id_to_token: Vec<String>,
}

impl VocabularyInner {
    fn lookup_or_insert(&mut self, term: &str) -> TermId {
        if let Some(id) = self.token_to_id.get(term) {
            return *id;
        }
        let id = self.id_to_token.len() as TermId;
        self.token_to_id.insert(term.to_string(), id);
        self.id_to_token.push(term.to_string());
        id
    }
}

impl Vocabulary {
    /// Create an empty vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty vocabulary ready for sharing between workers
    pub fn shared() -> SharedVocabulary {
        Arc::new(Self::new())
    }

    /// Resolve a term, assigning the next id if it has never been seen
    pub fn lookup_or_insert(&self, term: &str) -> TermId {
        if let Some(id) = self.lookup(term) {
            return id;
        }
        self.inner.write().lookup_or_insert(term)
    }

    /// Resolve a term without growing the vocabulary
    pub fn lookup(&self, term: &str) -> Option<TermId> {
        self.inner.read().token_to_id.get(term).copied()
    }

    /// Number of terms assigned so far
    pub fn size(&self) -> usize {
        self.inner.read().id_to_token.len()
    }

    /// Term for an id, if assigned
    pub fn token_for(&self, id: TermId) -> Option<String> {
        self.inner.read().id_to_token.get(id as usize).cloned()
    }

    /// Terms for several ids, resolved against a single snapshot
    pub fn tokens_for(&self, ids: &[TermId]) -> Vec<Option<String>> {
        let inner = self.inner.read();
        ids.iter()
            .map(|id| inner.id_to_token.get(*id as usize).cloned())
            .collect()
    }

    /// Count a document's terms, growing the vocabulary as needed.
    ///
    /// Returns the bag-of-terms and the vocabulary size right after the
    /// document's terms were resolved. Both are taken under one write lock,
    /// so every id in the bag is below the returned size.
    pub fn doc_to_bag<S: AsRef<str>>(&self, terms: &[S]) -> (BagOfTerms, usize) {
        let mut inner = self.inner.write();
        let mut bag = BagOfTerms::new();
        for term in terms {
            let id = inner.lookup_or_insert(term.as_ref());
            *bag.entry(id).or_insert(0) += 1;
        }
        (bag, inner.id_to_token.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    #[test]
    fn test_lookup_or_insert_is_stable() {
        let vocab = Vocabulary::new();
        let a = vocab.lookup_or_insert("merkel");
        let b = vocab.lookup_or_insert("berlin");
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(vocab.lookup_or_insert("merkel"), a);
        assert_eq!(vocab.size(), 2);
        assert_eq!(vocab.token_for(b).as_deref(), Some("berlin"));
        assert_eq!(vocab.token_for(2), None);
    }

    #[test]
    fn test_doc_to_bag_counts_and_snapshot() {
        let vocab = Vocabulary::new();
        vocab.lookup_or_insert("existing");

        let (bag, size) = vocab.doc_to_bag(&["vote", "existing", "vote"]);
        assert_eq!(size, 2);
        assert_eq!(bag.get(&0), Some(&1));
        assert_eq!(bag.get(&1), Some(&2));
        assert!(bag.keys().all(|id| (*id as usize) < size));
    }

    #[test]
    fn test_concurrent_growth_assigns_unique_ids() {
        let vocab = Vocabulary::shared();
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let vocab = Arc::clone(&vocab);
                thread::spawn(move || {
                    for i in 0..250 {
                        // Half the terms overlap between workers
                        let term = if i % 2 == 0 {
                            format!("shared-{}", i)
                        } else {
                            format!("w{}-{}", worker, i)
                        };
                        vocab.lookup_or_insert(&term);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // 125 shared + 4 * 125 private terms
        assert_eq!(vocab.size(), 625);
        for id in 0..vocab.size() as TermId {
            let token = vocab.token_for(id).unwrap();
            assert_eq!(vocab.lookup(&token), Some(id));
        }
    }

    proptest! {
        #[test]
        fn prop_size_is_monotonic_and_ids_permanent(
            docs in prop::collection::vec(prop::collection::vec("[a-e]{1,3}", 0..8), 1..20)
        ) {
            let vocab = Vocabulary::new();
            let mut last_size = 0;
            let mut seen: HashMap<String, TermId> = HashMap::new();

            for doc in &docs {
                let (_, size) = vocab.doc_to_bag(doc);
                prop_assert!(size >= last_size);
                last_size = size;

                for term in doc {
                    let id = vocab.lookup_or_insert(term);
                    if let Some(previous) = seen.insert(term.clone(), id) {
                        prop_assert_eq!(previous, id);
                    }
                }
            }
        }
    }
}

//! Verdicts remembered by document text

use activestream_core::Verdict;
use std::collections::HashMap;

/// Maps already-judged text to its verdict so duplicates are not re-asked
#[derive(Debug, Default)]
pub struct VerdictMemo {
    verdicts: HashMap<String, Verdict>,
}

impl VerdictMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, text: &str) -> Option<Verdict> {
        self.verdicts.get(text).copied()
    }

    /// Remember a relevance verdict. Skip and refresh say nothing about the
    /// text, so they are not kept.
    pub fn remember(&mut self, text: &str, verdict: Verdict) {
        if matches!(verdict, Verdict::Relevant | Verdict::Irrelevant) {
            self.verdicts.insert(text.to_string(), verdict);
        }
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_relevance_verdicts_are_kept() {
        let mut memo = VerdictMemo::new();
        memo.remember("a", Verdict::Relevant);
        memo.remember("b", Verdict::Skip);
        memo.remember("c", Verdict::Refresh);
        assert_eq!(memo.get("a"), Some(Verdict::Relevant));
        assert_eq!(memo.get("b"), None);
        assert_eq!(memo.len(), 1);

        memo.remember("a", Verdict::Irrelevant);
        assert_eq!(memo.get("a"), Some(Verdict::Irrelevant));
    }
}

//! Text normalization: entity stripping, tokenization, lemmas and stopwords

use activestream_core::{EntityKind, EntitySpan, Error, Record, Result};
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Common English function words plus stream noise
const DEFAULT_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves", "amp", "rt", "via",
];

/// Turns a record into the ordered list of terms it contributes
#[derive(Debug, Clone)]
pub struct TextProcessor {
    token_pattern: Regex,
    stopwords: HashSet<String>,
    min_token_chars: usize,
}

impl TextProcessor {
    pub fn new(extra_stopwords: &[String], min_token_chars: usize) -> Result<Self> {
        let token_pattern = Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'’_-]*")
            .map_err(|e| Error::classifier(format!("Failed to compile token regex: {}", e)))?;
        let stopwords = DEFAULT_STOPWORDS
            .iter()
            .map(|w| w.to_string())
            .chain(extra_stopwords.iter().map(|w| w.to_lowercase()))
            .collect();
        Ok(Self {
            token_pattern,
            stopwords,
            min_token_chars,
        })
    }

    pub fn is_stopword(&self, term: &str) -> bool {
        self.stopwords.contains(term)
    }

    /// All terms of a record: text tokens, then entity pseudo-terms, then
    /// the author's handle and display name
    pub fn terms(&self, record: &Record) -> Vec<String> {
        let (remaining, pseudo_terms) = strip_entities(&record.text, &record.entities);
        let mut terms = self.tokenize(&remaining);
        terms.extend(pseudo_terms);

        if let Some(author) = &record.author {
            let handle = author.handle.trim().to_lowercase();
            if !handle.is_empty() {
                terms.push(format!("@{}", handle));
            }
            let display_name = author.display_name.trim().to_lowercase();
            if !display_name.is_empty() {
                terms.push(display_name);
            }
        }
        terms
    }

    /// Lowercased, lemmatized, stopword-filtered tokens in text order
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.token_pattern
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|t| !self.stopwords.contains(t))
            .map(|t| lemmatize(&t))
            .filter(|t| t.chars().count() >= self.min_token_chars)
            .filter(|t| !self.stopwords.contains(t))
            .collect()
    }
}

/// Remove entity spans from `text`, returning the remaining text and the
/// normalized pseudo-terms in span order.
///
/// Offsets are char positions. Spans are removed from the last to the first
/// so earlier offsets stay valid. Out-of-range and overlapping spans are
/// skipped.
pub fn strip_entities(text: &str, spans: &[EntitySpan]) -> (String, Vec<String>) {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .collect();
    let n_chars = boundaries.len() - 1;

    let mut ordered: Vec<&EntitySpan> = spans.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

    let mut remaining = text.to_string();
    let mut pseudo_terms = Vec::with_capacity(spans.len());
    let mut lowest_removed = n_chars;
    for span in ordered {
        if span.start >= span.end || span.end > lowest_removed {
            continue;
        }
        remaining.replace_range(boundaries[span.start]..boundaries[span.end], " ");
        lowest_removed = span.start;
        pseudo_terms.push(entity_terms(span));
    }

    pseudo_terms.reverse();
    (remaining, pseudo_terms.into_iter().flatten().collect())
}

/// Normalized terms for one entity
fn entity_terms(span: &EntitySpan) -> Vec<String> {
    let text = span
        .text
        .trim()
        .trim_start_matches(['#', '@'])
        .to_lowercase();
    if text.is_empty() {
        return Vec::new();
    }
    match span.kind {
        EntityKind::Tag => vec![format!("#{}", text)],
        EntityKind::Mention => vec![format!("@{}", text)],
        EntityKind::Link => url_terms(&text),
    }
}

/// Host plus path segments of a link
fn url_terms(link: &str) -> Vec<String> {
    let Ok(url) = Url::parse(link) else {
        return Vec::new();
    };
    let mut terms = Vec::new();
    if let Some(host) = url.host_str() {
        terms.push(host.trim_start_matches("www.").to_string());
    }
    if let Some(segments) = url.path_segments() {
        terms.extend(
            segments
                .filter(|s| !s.is_empty())
                .map(|s| s.to_lowercase()),
        );
    }
    terms
}

/// Light English lemmatizer: possessives and regular plurals
pub fn lemmatize(token: &str) -> String {
    let token = token.trim_end_matches(['\'', '’']);
    let token = token
        .strip_suffix("'s")
        .or_else(|| token.strip_suffix("’s"))
        .unwrap_or(token);

    let n = token.chars().count();
    if n > 4 && token.ends_with("ies") {
        return format!("{}y", &token[..token.len() - 3]);
    }
    if n > 4 && (token.ends_with("sses") || token.ends_with("xes") || token.ends_with("ches") || token.ends_with("shes")) {
        return token[..token.len() - 2].to_string();
    }
    if n > 3
        && token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("us")
        && !token.ends_with("is")
    {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

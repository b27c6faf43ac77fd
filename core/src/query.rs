//! Boolean TF-IDF search over the published index, plus the suggestion and
//! stats surfaces that read the same snapshot.

use crate::coordinator::IndexHandle;
use crate::error::QueryError;
use crate::store::DocumentStore;
use crate::tokenizer::tokenize;
use crate::types::{DocId, IndexEntry};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// How a multi-term query combines its terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    And,
    Or,
    Not,
}

impl Operator {
    /// Case-insensitive parse. Anything unrecognized falls back to `Or`,
    /// the permissive reading of a free-text `op` parameter.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Operator::And,
            "NOT" => Operator::Not,
            _ => Operator::Or,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocId,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub score: f32,
}

/// What a search produced: the ranked page of hits plus how many documents
/// matched in total before the page was cut.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub total_matched: usize,
    pub hits: Vec<SearchHit>,
}

/// An indexed term offered as a completion, with its reach in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub term: String,
    pub document_frequency: u32,
}

/// A summary of the published index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: u32,
    pub total_terms: u32,
    pub built_at: String,
    pub top_terms: Vec<Suggestion>,
}

/// Read side of the engine. Every call snapshots the published index once
/// up front, so a rebuild landing mid-query is invisible to it.
pub struct QueryEngine {
    index: Arc<IndexHandle>,
    store: Arc<dyn DocumentStore>,
}

impl QueryEngine {
    pub fn new(index: Arc<IndexHandle>, store: Arc<dyn DocumentStore>) -> Self {
        Self { index, store }
    }

    /// Ranked boolean search.
    ///
    /// Query terms go through the same normalization as documents. Terms the
    /// index has never seen are skipped for every operator; a query whose
    /// terms all normalize away returns no hits. `limit` is clamped to
    /// 1..=100. Results order by score descending, then doc id ascending, so
    /// equal corpora give equal result lists.
    pub fn search(
        &self,
        query: &str,
        op: Operator,
        limit: usize,
    ) -> Result<SearchResults, QueryError> {
        let index = self.index.current().ok_or(QueryError::IndexNotBuilt)?;

        // Distinct terms only: "cat cat" must not double-count cat's weight.
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if terms.is_empty() {
            return Ok(SearchResults::default());
        }

        let matched: Vec<&IndexEntry> = terms.iter().filter_map(|t| index.entry(t)).collect();

        let candidates: HashSet<&DocId> = match op {
            Operator::And => {
                let mut keysets = matched
                    .iter()
                    .map(|e| e.postings.keys().collect::<HashSet<_>>());
                match keysets.next() {
                    Some(first) => keysets.fold(first, |acc, s| &acc & &s),
                    None => HashSet::new(),
                }
            }
            Operator::Or => matched.iter().flat_map(|e| e.postings.keys()).collect(),
            // Complement over the index universe: documents matching none of
            // the terms. With no matched terms that is every document, which
            // keeps NOT and OR partitioning the corpus between them.
            Operator::Not => {
                let excluded: HashSet<&DocId> =
                    matched.iter().flat_map(|e| e.postings.keys()).collect();
                index
                    .documents
                    .keys()
                    .filter(|id| !excluded.contains(id))
                    .collect()
            }
        };

        let mut scored: Vec<(DocId, f32)> = candidates
            .into_iter()
            .map(|id| {
                let score = matched.iter().filter_map(|e| e.postings.get(id)).sum();
                (id.clone(), score)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        let total_matched = scored.len();
        scored.truncate(limit.clamp(1, 100));

        let mut hits = Vec::with_capacity(scored.len());
        for (id, score) in scored {
            let Some(info) = index.documents.get(&id) else {
                continue;
            };
            // Snippets come from live content; a document deleted since the
            // build drops out of the results rather than failing the query.
            match self.store.get(&id) {
                Ok(Some(doc)) => hits.push(SearchHit {
                    id,
                    title: info.title.clone(),
                    url: info.url.clone(),
                    snippet: snippet(&doc.content, query),
                    score,
                }),
                Ok(None) => {
                    warn!(doc_id = %id, "indexed document no longer in store; dropping hit");
                }
                Err(e) => {
                    warn!(doc_id = %id, error = %e, "could not load document for snippet; dropping hit");
                }
            }
        }
        Ok(SearchResults {
            total_matched,
            hits,
        })
    }

    /// Completions for a prefix, busiest terms first.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Result<Vec<Suggestion>, QueryError> {
        let index = self.index.current().ok_or(QueryError::IndexNotBuilt)?;
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        let mut suggestions: Vec<Suggestion> = index
            .entries
            .iter()
            .filter(|(term, _)| term.starts_with(&prefix))
            .map(|(term, entry)| Suggestion {
                term: term.clone(),
                document_frequency: entry.document_frequency,
            })
            .collect();
        suggestions.sort_by(|a, b| {
            b.document_frequency
                .cmp(&a.document_frequency)
                .then_with(|| a.term.cmp(&b.term))
        });
        suggestions.truncate(limit);
        Ok(suggestions)
    }

    /// Shape of the published index: sizes plus the ten widest-spread terms.
    pub fn stats(&self) -> Result<IndexStats, QueryError> {
        let index = self.index.current().ok_or(QueryError::IndexNotBuilt)?;
        let mut top_terms: Vec<Suggestion> = index
            .entries
            .iter()
            .map(|(term, entry)| Suggestion {
                term: term.clone(),
                document_frequency: entry.document_frequency,
            })
            .collect();
        top_terms.sort_by(|a, b| {
            b.document_frequency
                .cmp(&a.document_frequency)
                .then_with(|| a.term.cmp(&b.term))
        });
        top_terms.truncate(10);
        Ok(IndexStats {
            total_documents: index.total_documents,
            total_terms: index.entries.len() as u32,
            built_at: index.built_at.clone(),
            top_terms,
        })
    }
}

/// A window of `content` around the first query word it contains.
///
/// Matching is against the raw whitespace-separated query words, not the
/// stemmed terms, so the snippet centers on text the searcher actually typed.
/// 50 characters either side of the match; no word found means the first 100
/// characters.
fn snippet(content: &str, query: &str) -> String {
    for word in query.split_whitespace() {
        if let Some(pos) = find_case_insensitive(content, word) {
            return format!("{}...", window_around(content, pos));
        }
    }
    format!("{}...", leading_chars(content, 100))
}

/// Byte offset (in `haystack`) of the first case-insensitive occurrence of
/// `needle`.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    let pos = haystack.to_lowercase().find(&needle)?;
    // Lowercasing can change byte lengths, so the offset is only exact for
    // length-preserving text; clamp it onto a boundary of the original.
    let mut pos = pos.min(haystack.len());
    while pos > 0 && !haystack.is_char_boundary(pos) {
        pos -= 1;
    }
    Some(pos)
}

/// Up to 50 characters either side of the byte offset `pos`.
fn window_around(text: &str, pos: usize) -> &str {
    let start = text[..pos]
        .char_indices()
        .rev()
        .map(|(i, _)| i)
        .nth(49)
        .unwrap_or(0);
    let end = text[pos..]
        .char_indices()
        .map(|(i, _)| pos + i)
        .nth(50)
        .unwrap_or(text.len());
    &text[start..end]
}

fn leading_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_parse_is_case_insensitive_with_or_fallback() {
        assert_eq!(Operator::parse("and"), Operator::And);
        assert_eq!(Operator::parse("AND"), Operator::And);
        assert_eq!(Operator::parse("not"), Operator::Not);
        assert_eq!(Operator::parse("or"), Operator::Or);
        assert_eq!(Operator::parse("xor"), Operator::Or);
        assert_eq!(Operator::parse(""), Operator::Or);
        assert_eq!(Operator::default(), Operator::And);
    }

    #[test]
    fn snippet_centers_on_the_first_query_word() {
        let content = format!("{}needle in the middle {}", "x".repeat(200), "y".repeat(200));
        let s = snippet(&content, "missing needle");
        assert!(s.contains("needle"));
        assert!(s.ends_with("..."));
        // 50 chars of lead-in, not the whole 200-char prefix.
        assert!(!s.contains(&"x".repeat(60)));
    }

    #[test]
    fn snippet_falls_back_to_the_document_head() {
        let content = "alpha beta gamma";
        let s = snippet(content, "zeta");
        assert_eq!(s, "alpha beta gamma...");

        let long = "z".repeat(300);
        let s = snippet(&long, "absent");
        assert_eq!(s, format!("{}...", "z".repeat(100)));
    }

    #[test]
    fn snippet_respects_utf8_boundaries() {
        // Multibyte chars on both sides of the match must not split.
        let content = format!("{}fenêtre ouverte {}", "é".repeat(80), "ü".repeat(80));
        let s = snippet(&content, "fenêtre");
        assert!(s.contains("fenêtre"));
        // 50 chars of context, counted in chars not bytes.
        assert!(s.starts_with(&"é".repeat(50)));
    }

    #[test]
    fn find_is_case_insensitive() {
        assert_eq!(find_case_insensitive("The Quick Fox", "quick"), Some(4));
        assert_eq!(find_case_insensitive("abc", "d"), None);
        assert_eq!(find_case_insensitive("abc", ""), None);
    }
}

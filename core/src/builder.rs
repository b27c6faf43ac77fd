use crate::error::StoreError;
use crate::tokenizer::tokenize;
use crate::types::{now_rfc3339, DocId, DocInfo, Document, Index, IndexEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Outcome counters for one index build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub documents_indexed: u32,
    pub documents_skipped: u32,
    pub terms_indexed: u32,
}

/// Build a TF-IDF index over every readable document in `docs`.
///
/// Weights are raw term frequency times `ln(N / df)`, where `N` counts the
/// documents that made it into the build and `df` counts the distinct
/// documents containing the term. A term present in every document scores
/// zero but keeps its posting list, so boolean matching still sees it.
///
/// Records that fail to decode are logged, counted in the summary, and
/// skipped; a corpus with a few corrupt rows still yields a usable index.
/// An empty corpus yields an empty index.
pub fn build_index<I>(docs: I) -> (Index, BuildSummary)
where
    I: IntoIterator<Item = Result<Document, StoreError>>,
{
    // term -> doc -> raw occurrence count. Keyed by doc id so a duplicate
    // record collapses instead of inflating document frequency.
    let mut raw: HashMap<String, HashMap<DocId, u32>> = HashMap::new();
    let mut documents: HashMap<DocId, DocInfo> = HashMap::new();
    let mut skipped = 0u32;

    for item in docs {
        let doc = match item {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "skipping unreadable document record");
                skipped += 1;
                continue;
            }
        };
        for term in tokenize(&doc.content) {
            *raw.entry(term)
                .or_default()
                .entry(doc.id.clone())
                .or_insert(0) += 1;
        }
        // Zero-term documents still join the universe so NOT queries and
        // document counts see them.
        documents.insert(
            doc.id,
            DocInfo {
                title: doc.title,
                url: doc.url,
            },
        );
    }

    let total_documents = documents.len() as u32;
    let n = total_documents as f32;
    let mut entries: HashMap<String, IndexEntry> = HashMap::with_capacity(raw.len());
    for (term, counts) in raw {
        let df = counts.len() as u32;
        let idf = (n / df as f32).ln();
        let postings = counts
            .into_iter()
            .map(|(doc_id, count)| (doc_id, count as f32 * idf))
            .collect();
        entries.insert(
            term,
            IndexEntry {
                document_frequency: df,
                postings,
            },
        );
    }

    let summary = BuildSummary {
        documents_indexed: total_documents,
        documents_skipped: skipped,
        terms_indexed: entries.len() as u32,
    };
    debug!(
        documents = summary.documents_indexed,
        skipped = summary.documents_skipped,
        terms = summary.terms_indexed,
        "index build finished"
    );

    let index = Index {
        total_documents,
        entries,
        documents,
        built_at: now_rfc3339(),
    };
    (index, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str) -> Result<Document, StoreError> {
        Ok(Document {
            id: id.to_string(),
            url: format!("https://example.test/{id}"),
            title: format!("Doc {id}"),
            content: content.to_string(),
            html: None,
            fetched_at: "2024-01-01T00:00:00Z".into(),
        })
    }

    #[test]
    fn weights_are_tf_times_ln_n_over_df() {
        let (index, summary) = build_index(vec![
            doc("d1", "cat cat dog"),
            doc("d2", "dog bird"),
            doc("d3", "bird bird bird"),
        ]);
        assert_eq!(summary.documents_indexed, 3);

        // "cat" appears twice in one of three documents.
        let cat = index.entry("cat").unwrap();
        assert_eq!(cat.document_frequency, 1);
        let expected = 2.0 * (3.0f32 / 1.0).ln();
        assert!((cat.postings["d1"] - expected).abs() < 1e-6);

        // "bird" is in two documents with different raw counts.
        let bird = index.entry("bird").unwrap();
        assert_eq!(bird.document_frequency, 2);
        let idf = (3.0f32 / 2.0).ln();
        assert!((bird.postings["d2"] - idf).abs() < 1e-6);
        assert!((bird.postings["d3"] - 3.0 * idf).abs() < 1e-6);
    }

    #[test]
    fn term_in_every_document_keeps_postings_at_zero_weight() {
        let (index, _) = build_index(vec![doc("d1", "shared cat"), doc("d2", "shared dog")]);
        let shared = index.entry("shared").unwrap();
        assert_eq!(shared.document_frequency, 2);
        assert_eq!(shared.postings.len(), 2);
        for weight in shared.postings.values() {
            assert_eq!(*weight, 0.0);
        }
    }

    #[test]
    fn document_frequency_counts_documents_not_occurrences() {
        let (index, _) = build_index(vec![doc("d1", "echo echo echo echo"), doc("d2", "echo")]);
        let echo = index.entry("echo").unwrap();
        assert_eq!(echo.document_frequency, 2);
        assert_eq!(echo.document_frequency as usize, echo.postings.len());
    }

    #[test]
    fn unreadable_records_are_counted_and_skipped() {
        let corrupt: Result<Document, StoreError> =
            Err(StoreError::Codec(bincode::ErrorKind::Custom("bad".into()).into()));
        let (index, summary) = build_index(vec![doc("d1", "cat"), corrupt, doc("d2", "dog")]);
        assert_eq!(summary.documents_indexed, 2);
        assert_eq!(summary.documents_skipped, 1);
        assert_eq!(index.total_documents, 2);
    }

    #[test]
    fn empty_corpus_builds_empty_index() {
        let (index, summary) = build_index(Vec::new());
        assert_eq!(index.total_documents, 0);
        assert!(index.entries.is_empty());
        assert!(index.documents.is_empty());
        assert_eq!(summary, BuildSummary::default());
    }

    #[test]
    fn stopword_only_document_still_joins_the_universe() {
        let (index, summary) = build_index(vec![doc("d1", "the of and is"), doc("d2", "cat")]);
        assert_eq!(summary.documents_indexed, 2);
        assert!(index.documents.contains_key("d1"));
        assert!(index.entry("the").is_none());
    }
}

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Document identifier: hex sha1 of the document's URL.
pub type DocId = String;

/// Derive the stable identifier for a URL. Re-crawling the same URL yields
/// the same id, which is what makes upserts overwrite prior content.
pub fn doc_id(url: &str) -> DocId {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Current wall-clock time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// A crawled page as kept in the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub url: String,
    pub title: String,
    /// Plain text extracted from the page; the only field that gets indexed.
    pub content: String,
    /// Raw HTML when the producer kept it.
    pub html: Option<String>,
    pub fetched_at: String,
}

impl Document {
    /// Build a document for `url`, deriving its id and stamping the fetch time.
    pub fn new(url: &str, title: &str, content: &str, html: Option<String>) -> Self {
        Self {
            id: doc_id(url),
            url: url.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            html,
            fetched_at: now_rfc3339(),
        }
    }
}

/// Per-document metadata carried inside the index so results can be rendered
/// without consulting the store for anything but snippet text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocInfo {
    pub title: String,
    pub url: String,
}

/// One term's slice of the inverted index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Number of distinct documents containing the term; always equal to
    /// `postings.len()`.
    pub document_frequency: u32,
    /// doc id -> tf-idf weight of the term in that document.
    pub postings: HashMap<DocId, f32>,
}

/// A complete inverted index over one snapshot of the document store.
///
/// Immutable once built: a rebuild produces a whole new value that replaces
/// the published one in a single pointer swap, so readers never observe a
/// half-written index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Index {
    pub total_documents: u32,
    pub entries: HashMap<String, IndexEntry>,
    /// Every document the build observed, including ones that yielded zero
    /// terms. NOT queries subtract from this universe.
    pub documents: HashMap<DocId, DocInfo>,
    pub built_at: String,
}

impl Index {
    pub fn entry(&self, term: &str) -> Option<&IndexEntry> {
        self.entries.get(term)
    }
}

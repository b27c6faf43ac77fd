//! Document storage: the trait the engine is written against, the sled-backed
//! default, and an in-memory variant for tests and embedding.

use crate::error::StoreError;
use crate::types::{DocId, Document};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;

/// Access to the crawled corpus.
///
/// `upsert` is idempotent by document id: writing the same URL twice fully
/// replaces the earlier record. Each write is atomic; a failed upsert leaves
/// the prior version intact.
pub trait DocumentStore: Send + Sync {
    /// Insert or fully replace a document keyed by its id.
    fn upsert(&self, doc: Document) -> Result<Document, StoreError>;

    /// Fetch one document.
    fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Remove a document; returns whether it existed.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Documents in id order, for paging through the corpus.
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Document>, StoreError>;

    /// Number of stored documents.
    fn count(&self) -> Result<usize, StoreError>;

    /// Snapshot the whole corpus for an index build. Damage is reported per
    /// record so one corrupt value cannot hide the rest of the corpus.
    fn scan(&self) -> Result<Vec<Result<Document, StoreError>>, StoreError>;
}

/// Sled-backed store: document ids as keys, bincode-encoded values.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open (or create) the store under `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Block until all writes so far have reached disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl DocumentStore for SledStore {
    fn upsert(&self, doc: Document) -> Result<Document, StoreError> {
        let bytes = bincode::serialize(&doc)?;
        self.db.insert(doc.id.as_bytes(), bytes)?;
        Ok(doc)
    }

    fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        match self.db.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.db.remove(id.as_bytes())?.is_some())
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Document>, StoreError> {
        let mut docs = Vec::new();
        for item in self.db.iter().skip(offset).take(limit) {
            let (_, bytes) = item?;
            docs.push(bincode::deserialize(&bytes)?);
        }
        Ok(docs)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.db.len())
    }

    fn scan(&self) -> Result<Vec<Result<Document, StoreError>>, StoreError> {
        let mut out = Vec::new();
        for item in self.db.iter() {
            out.push(match item {
                Ok((_, bytes)) => bincode::deserialize(&bytes).map_err(StoreError::from),
                Err(e) => Err(e.into()),
            });
        }
        Ok(out)
    }
}

/// In-memory store; the BTreeMap keeps documents in id order.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocId, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn upsert(&self, doc: Document) -> Result<Document, StoreError> {
        self.docs.write().insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.docs.read().get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.docs.write().remove(id).is_some())
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .docs
            .read()
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.docs.read().len())
    }

    fn scan(&self) -> Result<Vec<Result<Document, StoreError>>, StoreError> {
        Ok(self.docs.read().values().cloned().map(Ok).collect())
    }
}

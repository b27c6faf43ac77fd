//! The engine behind scour: text normalization, document storage, TF-IDF
//! index building, boolean ranked queries, and coordinated index rebuilds.

pub mod builder;
pub mod coordinator;
pub mod error;
pub mod persist;
pub mod query;
pub mod store;
pub mod tokenizer;
pub mod types;

pub use builder::{build_index, BuildSummary};
pub use coordinator::{BuildId, BuildState, BuildStatus, IndexHandle, RebuildCoordinator};
pub use error::{BuildError, PersistError, QueryError, StoreError};
pub use persist::IndexStorage;
pub use query::{IndexStats, Operator, QueryEngine, SearchHit, SearchResults, Suggestion};
pub use store::{DocumentStore, MemoryStore, SledStore};
pub use tokenizer::tokenize;
pub use types::{doc_id, now_rfc3339, DocId, DocInfo, Document, Index, IndexEntry};

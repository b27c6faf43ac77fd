//! Error types for the scour engine.

use thiserror::Error;

/// Errors from the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying storage failure.
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),

    /// A stored record failed to decode.
    #[error("corrupt document record: {0}")]
    Codec(#[from] bincode::Error),
}

/// Errors while saving or loading a persisted index.
#[derive(Error, Debug)]
pub enum PersistError {
    /// I/O failure while writing or reading the index file.
    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The index blob failed to encode or decode.
    #[error("index encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Errors surfaced by the rebuild coordinator.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Another build holds the single-writer slot; recoverable by retrying
    /// once the running build finishes.
    #[error("a rebuild is already running")]
    InProgress,

    /// Listing the document store failed before any work was done.
    #[error("could not read the document store: {0}")]
    Store(#[from] StoreError),

    /// The built index could not be persisted; the previously published
    /// index remains live.
    #[error("could not persist the index: {0}")]
    Persist(#[from] PersistError),
}

/// Errors surfaced by the query engine.
#[derive(Error, Debug)]
pub enum QueryError {
    /// No index has been built or loaded yet. Distinct from a query that
    /// matches nothing, which is an empty result list.
    #[error("index not built")]
    IndexNotBuilt,
}

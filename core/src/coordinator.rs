//! Index publication and the single-writer rebuild machinery.

use crate::builder::{build_index, BuildSummary};
use crate::error::{BuildError, PersistError};
use crate::persist::IndexStorage;
use crate::store::DocumentStore;
use crate::types::{now_rfc3339, Index};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Identifier of one rebuild run.
pub type BuildId = String;

fn new_build_id() -> BuildId {
    uuid::Uuid::new_v4().to_string()
}

/// The published index.
///
/// Readers clone the `Arc` once at the start of a call and work against that
/// snapshot for the rest of it. `install` replaces the pointer in one swap,
/// so a query sees either the whole old index or the whole new one.
#[derive(Default)]
pub struct IndexHandle {
    current: RwLock<Option<Arc<Index>>>,
}

impl IndexHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Index>> {
        self.current.read().clone()
    }

    pub fn install(&self, index: Arc<Index>) {
        *self.current.write() = Some(index);
    }
}

/// Where a build currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// The current (or last finished) build, as reported to operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStatus {
    pub id: Option<BuildId>,
    pub state: BuildState,
    pub summary: Option<BuildSummary>,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl Default for BuildStatus {
    fn default() -> Self {
        Self {
            id: None,
            state: BuildState::Idle,
            summary: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Owns rebuilds end to end: snapshot the store, build, persist, publish.
///
/// At most one build runs at a time. The writer slot is claimed under the
/// state lock, so under racing triggers exactly one caller wins and the rest
/// get [`BuildError::InProgress`], which is retryable once the running build
/// finishes. Builds are not cancellable.
pub struct RebuildCoordinator {
    store: Arc<dyn DocumentStore>,
    storage: IndexStorage,
    handle: Arc<IndexHandle>,
    state: Mutex<BuildStatus>,
}

impl RebuildCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>, storage: IndexStorage, handle: Arc<IndexHandle>) -> Self {
        Self {
            store,
            storage,
            handle,
            state: Mutex::new(BuildStatus::default()),
        }
    }

    pub fn handle(&self) -> Arc<IndexHandle> {
        Arc::clone(&self.handle)
    }

    /// Install a previously persisted index, if one exists. Startup hook.
    pub fn load_persisted(&self) -> Result<bool, PersistError> {
        match self.storage.load()? {
            Some(index) => {
                info!(
                    total_documents = index.total_documents,
                    built_at = %index.built_at,
                    "installed persisted index"
                );
                self.handle.install(Arc::new(index));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Start a rebuild on a background thread and return its id immediately.
    pub fn trigger(self: &Arc<Self>) -> Result<BuildId, BuildError> {
        let id = self.claim()?;
        let me = Arc::clone(self);
        let run_id = id.clone();
        std::thread::spawn(move || {
            let _ = me.run_and_record(&run_id);
        });
        Ok(id)
    }

    /// Run a rebuild on the calling thread. The CLI-facing variant.
    pub fn rebuild(&self) -> Result<(BuildId, BuildSummary), BuildError> {
        let id = self.claim()?;
        let summary = self.run_and_record(&id)?;
        Ok((id, summary))
    }

    /// The current (or most recently finished) build.
    pub fn status(&self) -> BuildStatus {
        self.state.lock().clone()
    }

    /// Status for one specific build id. Only the latest run is retained, so
    /// a superseded or never-issued id answers `None`.
    pub fn status_of(&self, id: &str) -> Option<BuildStatus> {
        let status = self.state.lock();
        (status.id.as_deref() == Some(id)).then(|| status.clone())
    }

    /// Claim the writer slot. Any state but `Running` may be claimed.
    fn claim(&self) -> Result<BuildId, BuildError> {
        let mut status = self.state.lock();
        if status.state == BuildState::Running {
            return Err(BuildError::InProgress);
        }
        let id = new_build_id();
        *status = BuildStatus {
            id: Some(id.clone()),
            state: BuildState::Running,
            summary: None,
            error: None,
            started_at: Some(now_rfc3339()),
            finished_at: None,
        };
        Ok(id)
    }

    fn run_and_record(&self, id: &BuildId) -> Result<BuildSummary, BuildError> {
        let outcome = self.run_build(id);
        let mut status = self.state.lock();
        status.finished_at = Some(now_rfc3339());
        match &outcome {
            Ok(summary) => {
                status.state = BuildState::Succeeded;
                status.summary = Some(*summary);
            }
            Err(e) => {
                warn!(build_id = %id, error = %e, "rebuild failed; previous index stays live");
                status.state = BuildState::Failed;
                status.error = Some(e.to_string());
            }
        }
        outcome
    }

    /// Snapshot, build, persist, publish. Publication comes last: a failure
    /// anywhere leaves the previously published index untouched.
    fn run_build(&self, id: &BuildId) -> Result<BuildSummary, BuildError> {
        info!(build_id = %id, "rebuild started");
        let snapshot = self.store.scan()?;
        let (index, summary) = build_index(snapshot);
        self.storage.save(&index)?;
        self.handle.install(Arc::new(index));
        info!(
            build_id = %id,
            documents = summary.documents_indexed,
            skipped = summary.documents_skipped,
            terms = summary.terms_indexed,
            "rebuild complete"
        );
        Ok(summary)
    }
}

//! Persistence boundary for the knowledge store.
//!
//! The orchestration kernel depends on the [`StoreBackend`] trait, never on
//! a file format directly, mirroring the teacher's `storage::StorageBackend`
//! split between the trait and its concrete implementations. This crate
//! ships one real backend, [`JsonStoreBackend`]: a single JSON document,
//! written atomically via a temp-file-then-rename so a crash mid-write never
//! corrupts the on-disk snapshot. A corrupt file on *read* is treated as an
//! empty store rather than a hard failure.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Lesson, RelationGraph};

/// Abstraction over where lessons and the relation graph live.
pub trait StoreBackend: Send + Sync {
    /// Load the full store. A missing or corrupt file yields an empty
    /// store rather than an error; the backend's own I/O failures (e.g. a
    /// permission error) are propagated.
    ///
    /// # Errors
    /// Propagates an I/O failure distinct from "file missing or unparsable".
    fn load(&self) -> crate::Result<(Vec<Lesson>, RelationGraph)>;

    /// Persist the full store, replacing whatever was there before.
    ///
    /// # Errors
    /// Propagates an I/O or serialization failure.
    fn save(&self, lessons: &[Lesson], graph: &RelationGraph) -> crate::Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct OnDiskStore {
    lessons: Vec<Lesson>,
    graph: RelationGraph,
}

/// JSON-file-backed [`StoreBackend`], one document per data directory.
pub struct JsonStoreBackend {
    path: PathBuf,
}

impl JsonStoreBackend {
    #[must_use]
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self { path: data_dir.as_ref().join("knowledge_store.json") }
    }
}

impl StoreBackend for JsonStoreBackend {
    fn load(&self) -> crate::Result<(Vec<Lesson>, RelationGraph)> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Vec::new(), RelationGraph::new()))
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<OnDiskStore>(&raw) {
            Ok(store) => Ok((store.lessons, store.graph)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "knowledge store file is corrupt, starting empty");
                Ok((Vec::new(), RelationGraph::new()))
            }
        }
    }

    fn save(&self, lessons: &[Lesson], graph: &RelationGraph) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = OnDiskStore { lessons: lessons.to_vec(), graph: graph.clone() };
        let body = serde_json::to_string_pretty(&store)?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, body)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

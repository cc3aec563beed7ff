//! Optional persistence capability for graph stores.
//!
//! A store either implements [`Persistable`] or it does not; nothing is
//! attached at runtime. [`DocumentGraphStore`] implements it with a JSON
//! snapshot carrying documents, embeddings and neighbour lists.

use crate::embedding::Embedder;
use crate::graph::document::EntityDocument;
use crate::graph::store::{DocumentGraphStore, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Save/load capability.
pub trait Persistable: Sized {
    /// Write the full state to `path`.
    fn save(&self, path: &Path) -> Result<(), StoreError>;

    /// Read a previously saved state from `path`.
    fn load(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError>;
}

#[derive(Debug, Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    created_at: String,
    documents: Vec<&'a EntityDocument>,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    created_at: Option<String>,
    documents: Vec<EntityDocument>,
}

impl Persistable for DocumentGraphStore {
    fn save(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
            documents: self.documents().collect(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &snapshot)?;

        info!(
            name: "store.saved",
            path = %path.display(),
            documents = self.len(),
            "Graph store snapshot written"
        );
        Ok(())
    }

    fn load(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        let file = std::fs::File::open(path)?;
        let snapshot: Snapshot = serde_json::from_reader(std::io::BufReader::new(file))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedVersion(snapshot.version));
        }

        let store = DocumentGraphStore::from_documents(embedder, snapshot.documents)?;
        info!(
            name: "store.loaded",
            path = %path.display(),
            documents = store.len(),
            created_at = ?snapshot.created_at,
            "Graph store snapshot loaded"
        );
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::document::EntityMetadata;
    use crate::graph::store::tests::{FixedEmbedder, store_with};

    #[test]
    fn test_save_then_load_preserves_graph() {
        let mut store = store_with(&["a", "b", "c"]);
        store.add_edge("a", "b", "P89_falls_within", 1.0);
        store
            .add_document("c", "updated", EntityMetadata::new("C", "E53_Place"), vec![7.0])
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        store.save(&path).unwrap();

        let loaded = DocumentGraphStore::load(&path, Arc::new(FixedEmbedder(vec![0.0]))).unwrap();
        assert_eq!(loaded.ids(), vec!["a", "b", "c"]);
        assert_eq!(loaded.get("b").unwrap().neighbors.len(), 1);
        assert_eq!(loaded.get("c").unwrap().label(), "C");
        assert!(loaded.is_index_stale());
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"version": 99, "documents": []}"#).unwrap();

        let err = DocumentGraphStore::load(&path, Arc::new(FixedEmbedder(vec![0.0]))).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion(99)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DocumentGraphStore::load(
            Path::new("/nonexistent/store.json"),
            Arc::new(FixedEmbedder(vec![0.0])),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}

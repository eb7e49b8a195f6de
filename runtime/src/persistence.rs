//! Checkpoint persistence.
//!
//! One document per workflow instance, keyed by its id. The driver saves after
//! every node; `load` is the only way back into a workflow, so a checkpoint is
//! the single source of truth for resumption.

use async_trait::async_trait;
use escrowflow_core::state::WorkflowState;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint for `{id}` could not be (de)serialized: {source}")]
    Serde {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No checkpoint for `{0}`")]
    NotFound(String),

    #[error("Checkpoint `{id}` is at `{actual}`, patch expected `{expected}`")]
    PositionMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Patch on `{id}` rejected: {reason}")]
    PatchRejected { id: String, reason: String },
}

/// A field-level update applied to a persisted checkpoint.
///
/// A patch may only touch user-visible fields. Changes to the cursor or to
/// anything [`WorkflowState::check_patch`] protects are rejected.
pub trait Patch<S>: Send + Sync {
    fn apply(&self, state: &mut S);
}

/// Validate and apply `patch` to the checkpoint `current`.
pub fn apply_patch<S: WorkflowState>(
    current: &S,
    patch: &dyn Patch<S>,
    as_of_node: &str,
) -> Result<S, CheckpointError> {
    let id = current.workflow_id();
    let actual = &current.cursor().current_node;
    if actual != as_of_node {
        return Err(CheckpointError::PositionMismatch {
            id: id.to_string(),
            expected: as_of_node.to_string(),
            actual: actual.clone(),
        });
    }

    let mut next = current.clone();
    patch.apply(&mut next);

    if next.cursor() != current.cursor() || next.workflow_id() != id {
        return Err(CheckpointError::PatchRejected {
            id: id.to_string(),
            reason: "patch touched engine bookkeeping".to_string(),
        });
    }
    next.check_patch(current)
        .map_err(|reason| CheckpointError::PatchRejected {
            id: id.to_string(),
            reason,
        })?;
    Ok(next)
}

#[async_trait]
pub trait CheckpointStore<S: WorkflowState>: Send + Sync {
    async fn save(&self, id: &str, state: &S) -> Result<(), CheckpointError>;

    async fn load(&self, id: &str) -> Result<Option<S>, CheckpointError>;

    /// Merge `patch` into the checkpoint for `id`, which must currently sit
    /// at `as_of_node`. Returns the stored result. Never runs a node.
    async fn patch(
        &self,
        id: &str,
        patch: &dyn Patch<S>,
        as_of_node: &str,
    ) -> Result<S, CheckpointError>;

    /// Ids of every stored checkpoint, sorted.
    async fn list(&self) -> Result<Vec<String>, CheckpointError>;

    async fn contains(&self, id: &str) -> Result<bool, CheckpointError> {
        Ok(self.load(id).await?.is_some())
    }
}

/// Process-local store. Checkpoints are kept as JSON so what comes back from
/// `load` went through the same serialization as the file store.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    documents: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn encode<S: WorkflowState>(id: &str, state: &S) -> Result<serde_json::Value, CheckpointError> {
    serde_json::to_value(state).map_err(|source| CheckpointError::Serde {
        id: id.to_string(),
        source,
    })
}

fn decode<S: WorkflowState>(id: &str, value: serde_json::Value) -> Result<S, CheckpointError> {
    serde_json::from_value(value).map_err(|source| CheckpointError::Serde {
        id: id.to_string(),
        source,
    })
}

#[async_trait]
impl<S: WorkflowState> CheckpointStore<S> for InMemoryCheckpointStore {
    async fn save(&self, id: &str, state: &S) -> Result<(), CheckpointError> {
        let doc = encode(id, state)?;
        self.documents.lock().insert(id.to_string(), doc);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<S>, CheckpointError> {
        let doc = self.documents.lock().get(id).cloned();
        doc.map(|value| decode(id, value)).transpose()
    }

    async fn patch(
        &self,
        id: &str,
        patch: &dyn Patch<S>,
        as_of_node: &str,
    ) -> Result<S, CheckpointError> {
        let mut documents = self.documents.lock();
        let doc = documents
            .get(id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(id.to_string()))?;
        let current: S = decode(id, doc)?;
        let next = apply_patch(&current, patch, as_of_node)?;
        documents.insert(id.to_string(), encode(id, &next)?);
        Ok(next)
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        Ok(self.documents.lock().keys().cloned().collect())
    }

    async fn contains(&self, id: &str) -> Result<bool, CheckpointError> {
        Ok(self.documents.lock().contains_key(id))
    }
}

/// One pretty-printed JSON file per checkpoint under a directory.
///
/// Writes go to a temporary sibling and are renamed into place, so a reader
/// never sees a half-written document. Writers are serialized by an async
/// mutex, which also makes `patch` a read-modify-write without lost updates
/// within one process.
pub struct JsonFileCheckpointStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

const EXTENSION: &str = "json";

impl JsonFileCheckpointStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| CheckpointError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", escape_id(id)))
    }

    async fn read<S: WorkflowState>(&self, id: &str) -> Result<Option<S>, CheckpointError> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| CheckpointError::Serde {
                    id: id.to_string(),
                    source,
                }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }

    async fn write<S: WorkflowState>(&self, id: &str, state: &S) -> Result<(), CheckpointError> {
        let bytes = serde_json::to_vec_pretty(state).map_err(|source| CheckpointError::Serde {
            id: id.to_string(),
            source,
        })?;
        let path = self.path_for(id);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| CheckpointError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(%id, path = %path.display(), "Checkpoint written");
        Ok(())
    }
}

#[async_trait]
impl<S: WorkflowState> CheckpointStore<S> for JsonFileCheckpointStore {
    async fn save(&self, id: &str, state: &S) -> Result<(), CheckpointError> {
        let _guard = self.write_lock.lock().await;
        self.write(id, state).await
    }

    async fn load(&self, id: &str) -> Result<Option<S>, CheckpointError> {
        self.read(id).await
    }

    async fn patch(
        &self,
        id: &str,
        patch: &dyn Patch<S>,
        as_of_node: &str,
    ) -> Result<S, CheckpointError> {
        let _guard = self.write_lock.lock().await;
        let current: S = self
            .read(id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(id.to_string()))?;
        let next = apply_patch(&current, patch, as_of_node)?;
        self.write(id, &next).await?;
        Ok(next)
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let io = |source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io)?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(unescape_id)
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn contains(&self, id: &str) -> Result<bool, CheckpointError> {
        let path = self.path_for(id);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| CheckpointError::Io { path, source })
    }
}

/// Ids are opaque strings; file names keep `[A-Za-z0-9_-]` and percent-encode
/// every other byte.
fn escape_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn unescape_id(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MoveCursor, RewriteLog, SetNote, Tally};

    fn at(node: &str) -> Tally {
        let mut state = Tally::new("tx/1");
        state.cursor.current_node = node.into();
        state.log.push("started".into());
        state
    }

    async fn exercise(store: &dyn CheckpointStore<Tally>) {
        assert!(store.load("tx/1").await.unwrap().is_none());
        assert!(!store.contains("tx/1").await.unwrap());

        store.save("tx/1", &at("second")).await.unwrap();
        assert_eq!(store.load("tx/1").await.unwrap(), Some(at("second")));
        assert_eq!(store.list().await.unwrap(), vec!["tx/1".to_string()]);

        let patched = store.patch("tx/1", &SetNote("proof.pdf"), "second").await.unwrap();
        assert_eq!(patched.note.as_deref(), Some("proof.pdf"));
        assert_eq!(patched.cursor, at("second").cursor);
        assert_eq!(store.load("tx/1").await.unwrap(), Some(patched.clone()));

        assert!(matches!(
            store.patch("tx/1", &SetNote("x"), "first").await,
            Err(CheckpointError::PositionMismatch { ref actual, .. }) if actual == "second"
        ));
        assert!(matches!(
            store.patch("tx/1", &RewriteLog, "second").await,
            Err(CheckpointError::PatchRejected { .. })
        ));
        assert!(matches!(
            store.patch("tx/1", &MoveCursor, "second").await,
            Err(CheckpointError::PatchRejected { .. })
        ));
        assert!(matches!(
            store.patch("tx/2", &SetNote("x"), "second").await,
            Err(CheckpointError::NotFound(_))
        ));

        // Rejected patches leave the checkpoint alone.
        assert_eq!(store.load("tx/1").await.unwrap(), Some(patched));
    }

    #[tokio::test]
    async fn in_memory_store_contract() {
        exercise(&InMemoryCheckpointStore::new()).await;
    }

    #[tokio::test]
    async fn json_file_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpointStore::open(dir.path().join("checkpoints"))
            .await
            .unwrap();
        exercise(&store).await;

        // Survives reopening, and leaves no temp files behind.
        let reopened = JsonFileCheckpointStore::open(store.dir()).await.unwrap();
        let loaded: Option<Tally> = reopened.load("tx/1").await.unwrap();
        assert_eq!(loaded.unwrap().note.as_deref(), Some("proof.pdf"));
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["tx%2F1.json".to_string()]);
    }

    #[test]
    fn id_escaping_round_trips() {
        for id in ["plain", "tx/1", "a b.c", "ünï"] {
            assert_eq!(unescape_id(&escape_id(id)).as_deref(), Some(id));
        }
        assert_eq!(escape_id("tx/1"), "tx%2F1");
        assert_eq!(unescape_id("%zz"), None);
    }
}

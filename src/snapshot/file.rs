//! JSON snapshot files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::{MemoryHeap, NodeSpec};
use crate::types::NodeId;

/// On-disk layout: node `i` in `nodes` receives identifier `#i`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Node descriptions in identifier order.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Garbage-collection roots.
    #[serde(default)]
    pub roots: Vec<NodeId>,
}

/// Failures while reading or validating a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// File could not be read.
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        /// Snapshot path.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },
    /// File is not valid snapshot JSON.
    #[error("failed to parse snapshot {path}: {source}")]
    Parse {
        /// Snapshot path.
        path: PathBuf,
        /// JSON failure.
        source: serde_json::Error,
    },
    /// Snapshot content is inconsistent.
    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

impl SnapshotFile {
    /// Builds the in-memory heap described by this file.
    pub fn into_heap(self) -> Result<MemoryHeap, SnapshotError> {
        MemoryHeap::from_parts(self.nodes, self.roots)
    }
}

impl MemoryHeap {
    /// Loads and validates a JSON snapshot file.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let contents = fs::read_to_string(path).map_err(|source| SnapshotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: SnapshotFile =
            serde_json::from_str(&contents).map_err(|source| SnapshotError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let heap = file.into_heap()?;
        info!(
            path = %path.display(),
            nodes = heap.nodes.len(),
            roots = heap.roots.len(),
            "snapshot.loaded"
        );
        Ok(heap)
    }
}

//! Persistent image → layers metadata.
//!
//! The index maps each image reference to its ordered layer list and is
//! persisted as a single JSON file under the store root. Writes go through
//! a temp file and rename, so a recovery after a clean `put` always sees
//! the full record.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use dockyard_core::error::{DockError, Result};

use crate::paths;
use crate::reference::ImageName;

/// One materialized layer: its id and extracted rootfs directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLayer {
    pub id: String,
    pub path: PathBuf,
}

/// Persisted record for one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageRecord {
    /// Canonical image reference
    reference: String,
    /// Layer ids, base layer first
    layer_ids: Vec<String>,
}

/// Persistent index stored as JSON on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    images: Vec<ImageRecord>,
}

/// Owns the image → layers mapping for a store directory.
pub struct MetadataManager {
    store_dir: PathBuf,
    /// In-memory index: canonical reference → record
    index: RwLock<HashMap<String, ImageRecord>>,
}

impl MetadataManager {
    /// Create a manager over `store_dir`. No I/O happens until `recover`.
    pub fn new(store_dir: &Path) -> Self {
        Self {
            store_dir: store_dir.to_path_buf(),
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild the in-memory index from disk.
    ///
    /// A missing index file means nothing to recover. Records whose layer
    /// rootfs directories have vanished are dropped with a warning.
    pub async fn recover(&self) -> Result<()> {
        let index_path = paths::index_file(&self.store_dir);

        let data = match tokio::fs::read_to_string(&index_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    store = %self.store_dir.display(),
                    "No metadata index to recover"
                );
                return Ok(());
            }
            Err(e) => {
                return Err(DockError::StoreIo(format!(
                    "failed to read metadata index {}: {}",
                    index_path.display(),
                    e
                )))
            }
        };

        let store_index: StoreIndex = serde_json::from_str(&data).map_err(|e| {
            DockError::Serialization(format!("failed to parse metadata index: {}", e))
        })?;

        let mut index = self.index.write().await;
        index.clear();
        for record in store_index.images {
            let complete = record
                .layer_ids
                .iter()
                .all(|id| paths::layer_rootfs(&self.store_dir, id).exists());

            if complete {
                index.insert(record.reference.clone(), record);
            } else {
                tracing::warn!(
                    image = %record.reference,
                    "Dropping metadata record with missing layers"
                );
            }
        }

        tracing::info!(images = index.len(), "Recovered metadata index");
        Ok(())
    }

    /// Look up the cached layers for `name`, base layer first.
    pub async fn get(&self, name: &ImageName) -> Option<Vec<ImageLayer>> {
        let index = self.index.read().await;
        index.get(&name.canonical()).map(|record| {
            record
                .layer_ids
                .iter()
                .map(|id| ImageLayer {
                    id: id.clone(),
                    path: paths::layer_rootfs(&self.store_dir, id),
                })
                .collect()
        })
    }

    /// Persist the layer list for `name`, replacing any prior record.
    pub async fn put(&self, name: &ImageName, layers: &[ImageLayer]) -> Result<()> {
        let record = ImageRecord {
            reference: name.canonical(),
            layer_ids: layers.iter().map(|layer| layer.id.clone()).collect(),
        };

        // The write lock is held across the save so concurrent puts cannot
        // persist stale snapshots out of order.
        let mut index = self.index.write().await;
        index.insert(record.reference.clone(), record);
        let store_index = StoreIndex {
            images: index.values().cloned().collect(),
        };

        self.save(&store_index).await
    }

    /// Write the index atomically: temp file, then rename into place.
    async fn save(&self, store_index: &StoreIndex) -> Result<()> {
        let index_path = paths::index_file(&self.store_dir);
        let tmp_path = index_path.with_extension("json.tmp");

        let data = serde_json::to_string_pretty(store_index)?;

        tokio::fs::write(&tmp_path, data).await.map_err(|e| {
            DockError::StoreIo(format!(
                "failed to write metadata index {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        tokio::fs::rename(&tmp_path, &index_path).await.map_err(|e| {
            DockError::StoreIo(format!(
                "failed to replace metadata index {}: {}",
                index_path.display(),
                e
            ))
        })?;

        Ok(())
    }
}

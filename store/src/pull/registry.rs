//! Remote registry pull strategy.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use dockyard_core::error::{DockError, Result};

use crate::metadata::ImageLayer;
use crate::paths;
use crate::reference::ImageName;
use crate::registry::RegistryClient;

use super::{Extractor, Puller};

/// Pulls images from a remote registry.
///
/// Walks the manifest history from the last entry to the first, so layers
/// materialize base first. Each layer blob lands in `<dir>/<id>.tar`, is
/// extracted into `<dir>/<id>/rootfs/`, and the raw archive is removed.
pub struct RegistryPuller {
    client: RegistryClient,
    extractor: Arc<dyn Extractor>,
}

impl RegistryPuller {
    /// Create a puller over an existing registry client.
    pub fn new(client: RegistryClient, extractor: Arc<dyn Extractor>) -> Self {
        Self { client, extractor }
    }
}

#[async_trait]
impl Puller for RegistryPuller {
    async fn pull(&self, name: &ImageName, directory: &Path) -> Result<Vec<ImageLayer>> {
        let manifest = self.client.get_manifest(name).await?;

        tracing::info!(
            image = %name,
            layers = manifest.fs_layers.len(),
            "Pulling image from registry"
        );

        let mut layers = Vec::with_capacity(manifest.fs_layers.len());

        // The manifest lists the top layer first; apply bottom-up.
        for (fs_layer, history) in manifest
            .fs_layers
            .iter()
            .zip(manifest.history.iter())
            .rev()
        {
            let layer_id = &history.v1_compatibility.id;
            let archive = paths::staged_layer_archive(directory, layer_id);

            tracing::debug!(
                layer = %layer_id,
                blob = %fs_layer.blob_sum,
                "Downloading layer"
            );

            let written = self
                .client
                .get_blob(name, &fs_layer.blob_sum, &archive)
                .await?;

            // The registry never legitimately returns an empty blob, even
            // for empty layers.
            if written == 0 {
                return Err(DockError::RegistryResponse(format!(
                    "no content for layer '{}'",
                    layer_id
                )));
            }

            let rootfs = paths::staged_layer_rootfs(directory, layer_id);
            self.extractor.extract(&archive, &rootfs).await?;

            tokio::fs::remove_file(&archive).await.map_err(|e| {
                DockError::StoreIo(format!(
                    "failed to remove layer archive {}: {}",
                    archive.display(),
                    e
                ))
            })?;

            layers.push(ImageLayer {
                id: layer_id.clone(),
                path: rootfs,
            });
        }

        Ok(layers)
    }
}


//! Local `docker save` archive pull strategy.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use dockyard_core::error::{DockError, Result};

use crate::metadata::ImageLayer;
use crate::paths;
use crate::reference::ImageName;

use super::{Extractor, Puller};

/// Pulls images from locally stored `docker save` archives.
///
/// The archive `<archives_dir>/<name>.tar` is extracted into the scratch
/// directory; its `repositories` file maps the repository and tag to the
/// top layer id, and each layer's `json` manifest links to its parent.
pub struct LocalPuller {
    archives_dir: std::path::PathBuf,
    extractor: Arc<dyn Extractor>,
}

impl LocalPuller {
    /// Create a puller reading archives from `archives_dir`.
    pub fn new(archives_dir: std::path::PathBuf, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            archives_dir,
            extractor,
        }
    }

    /// Resolve the top layer id for `name` from the `repositories` file.
    async fn top_layer_id(&self, name: &ImageName, directory: &Path) -> Result<String> {
        let repositories_path = paths::archive_repositories(directory);
        let data = tokio::fs::read_to_string(&repositories_path)
            .await
            .map_err(|e| {
                DockError::LocalArchive(format!(
                    "failed to read {}: {}",
                    repositories_path.display(),
                    e
                ))
            })?;

        let repositories: serde_json::Value = serde_json::from_str(&data).map_err(|e| {
            DockError::LocalArchive(format!("repositories file is not JSON: {}", e))
        })?;

        let tags = repositories
            .get(&name.repository)
            .and_then(|v| v.as_object())
            .ok_or_else(|| {
                DockError::LocalArchive(format!(
                    "repository '{}' not found in archive",
                    name.repository
                ))
            })?;

        // Tags may contain dots, so this must stay a plain map lookup.
        let layer_id = tags.get(&name.tag).and_then(|v| v.as_str()).ok_or_else(|| {
            DockError::LocalArchive(format!(
                "tag '{}' not found for repository '{}'",
                name.tag, name.repository
            ))
        })?;

        Ok(layer_id.to_string())
    }

    /// Read the parent id of `layer_id`, if any.
    async fn parent_id(&self, directory: &Path, layer_id: &str) -> Result<Option<String>> {
        let manifest_path = paths::archive_layer_manifest(directory, layer_id);
        let data = tokio::fs::read_to_string(&manifest_path).await.map_err(|e| {
            DockError::LocalArchive(format!(
                "failed to read layer manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })?;

        let manifest: serde_json::Value = serde_json::from_str(&data).map_err(|e| {
            DockError::LocalArchive(format!(
                "layer manifest '{}' is not JSON: {}",
                layer_id, e
            ))
        })?;

        match manifest.get("parent").and_then(|v| v.as_str()) {
            Some("") | None => Ok(None),
            Some(parent) => Ok(Some(parent.to_string())),
        }
    }

    /// Build the base-to-top layer chain starting from the top layer.
    async fn layer_chain(&self, directory: &Path, top_id: String) -> Result<Vec<String>> {
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(top_id.clone());

        let mut chain = vec![top_id];
        while let Some(parent) = self.parent_id(directory, &chain[0]).await? {
            if !seen.insert(parent.clone()) {
                return Err(DockError::LocalArchive(format!(
                    "layer parent chain contains a cycle at '{}'",
                    parent
                )));
            }
            chain.insert(0, parent);
        }

        Ok(chain)
    }
}

#[async_trait]
impl Puller for LocalPuller {
    async fn pull(&self, name: &ImageName, directory: &Path) -> Result<Vec<ImageLayer>> {
        let tar_path = paths::local_archive_tar(&self.archives_dir, &name.canonical());

        if !tar_path.exists() {
            return Err(DockError::LocalArchive(format!(
                "no archive for image '{}' at '{}'",
                name,
                tar_path.display()
            )));
        }

        tracing::info!(
            image = %name,
            archive = %tar_path.display(),
            "Pulling image from local archive"
        );

        self.extractor.extract(&tar_path, directory).await?;

        let top_id = self.top_layer_id(name, directory).await?;
        let layer_ids = self.layer_chain(directory, top_id).await?;

        let mut layers = Vec::with_capacity(layer_ids.len());
        for layer_id in layer_ids {
            let layer_tar = paths::archive_layer_tar(directory, &layer_id);
            if !layer_tar.exists() {
                return Err(DockError::LocalArchive(format!(
                    "layer archive missing for layer '{}'",
                    layer_id
                )));
            }

            let rootfs = paths::staged_layer_rootfs(directory, &layer_id);
            self.extractor.extract(&layer_tar, &rootfs).await?;

            layers.push(ImageLayer {
                id: layer_id,
                path: rootfs,
            });
        }

        Ok(layers)
    }
}

//! Cache-first image store with request coalescing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use dockyard_core::config::StoreConfig;
use dockyard_core::error::{DockError, Result};

use crate::metadata::{ImageLayer, MetadataManager};
use crate::paths;
use crate::pull::{self, Puller};
use crate::reference::ImageName;

/// Outcome delivered to every caller of a coalesced pull.
type PullOutcome = std::result::Result<Vec<ImageLayer>, DockError>;

/// The public entry point: resolves an image to its ordered layer rootfs
/// directories.
///
/// Cache hits return immediately from the metadata index. On a miss, at
/// most one pull per image identity runs at a time; concurrent callers
/// attach to the in-flight pull and observe the same outcome, success or
/// failure. A pull runs to completion even if every caller goes away.
pub struct Store {
    store_dir: PathBuf,
    metadata: Arc<MetadataManager>,
    puller: Arc<dyn Puller>,
    /// In-flight pulls: canonical reference → completion channel
    inflight: Arc<DashMap<String, broadcast::Sender<PullOutcome>>>,
}

impl Store {
    /// Create a store over `config.store_dir` with an explicit puller.
    pub fn new(config: &StoreConfig, puller: Arc<dyn Puller>) -> Result<Self> {
        for dir in [
            config.store_dir.clone(),
            paths::layers_dir(&config.store_dir),
            paths::staging_dir(&config.store_dir),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                DockError::StoreIo(format!(
                    "failed to create store directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            store_dir: config.store_dir.clone(),
            metadata: Arc::new(MetadataManager::new(&config.store_dir)),
            puller,
            inflight: Arc::new(DashMap::new()),
        })
    }

    /// Create a store with the puller selected by `config`.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let puller = pull::create(config)?;
        Self::new(config, puller)
    }

    /// Rebuild the metadata index from a previous run.
    pub async fn recover(&self) -> Result<()> {
        self.metadata.recover().await
    }

    /// Resolve `name` to its layer rootfs directories, base layer first.
    pub async fn get(&self, name: &ImageName) -> Result<Vec<PathBuf>> {
        if let Some(layers) = self.metadata.get(name).await {
            tracing::debug!(image = %name, "Using cached image");
            return Ok(layers.into_iter().map(|layer| layer.path).collect());
        }

        let mut receiver = self.attach_or_spawn(name);

        match receiver.recv().await {
            Ok(Ok(layers)) => Ok(layers.into_iter().map(|layer| layer.path).collect()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DockError::Pull(format!(
                "pull of '{}' terminated without an outcome",
                name
            ))),
        }
    }

    /// Attach to the in-flight pull for `name`, starting one if none
    /// exists. The per-key entry lock makes attach-or-insert atomic.
    fn attach_or_spawn(&self, name: &ImageName) -> broadcast::Receiver<PullOutcome> {
        let key = name.canonical();

        match self.inflight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                tracing::debug!(image = %name, "Attaching to in-flight pull");
                entry.get().subscribe()
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (sender, receiver) = broadcast::channel(1);
                entry.insert(sender.clone());

                let name = name.clone();
                let store_dir = self.store_dir.clone();
                let metadata = Arc::clone(&self.metadata);
                let puller = Arc::clone(&self.puller);
                let inflight = Arc::clone(&self.inflight);

                tokio::spawn(async move {
                    let outcome =
                        Self::fill(&name, &store_dir, &metadata, puller.as_ref()).await;

                    if let Err(ref e) = outcome {
                        tracing::warn!(image = %name, error = %e, "Pull failed");
                    }

                    // Remove the entry before broadcasting: anyone who
                    // subscribed while the entry existed will receive, and
                    // anyone later starts a fresh pull.
                    inflight.remove(&key);
                    let _ = sender.send(outcome);
                });

                receiver
            }
        }
    }

    /// Pull `name` into a staging directory, promote its layers into the
    /// store, and persist the metadata record. Persistence completes
    /// before any waiter observes success.
    async fn fill(
        name: &ImageName,
        store_dir: &Path,
        metadata: &MetadataManager,
        puller: &dyn Puller,
    ) -> PullOutcome {
        let pull_id = uuid::Uuid::new_v4().to_string();
        let staging = paths::pull_staging_dir(store_dir, &pull_id);

        tokio::fs::create_dir_all(&staging).await.map_err(|e| {
            DockError::StoreIo(format!(
                "failed to create staging directory {}: {}",
                staging.display(),
                e
            ))
        })?;

        tracing::info!(
            image = %name,
            staging = %staging.display(),
            "Pulling image"
        );

        let staged = puller.pull(name, &staging).await?;

        let mut layers = Vec::with_capacity(staged.len());
        for staged_layer in &staged {
            let rootfs = Self::promote_layer(store_dir, staged_layer).await?;
            layers.push(ImageLayer {
                id: staged_layer.id.clone(),
                path: rootfs,
            });
        }

        metadata.put(name, &layers).await?;

        // Scratch space is only removed on success; a failed pull leaves
        // its artifacts in place.
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            tracing::warn!(
                staging = %staging.display(),
                error = %e,
                "Failed to remove staging directory"
            );
        }

        tracing::info!(image = %name, layers = layers.len(), "Image pulled");

        Ok(layers)
    }

    /// Move one staged layer rootfs into the permanent layer directory.
    /// A layer already present in the store (a base layer shared with
    /// another image) is kept and the staged copy discarded.
    async fn promote_layer(store_dir: &Path, staged: &ImageLayer) -> Result<PathBuf> {
        let target = paths::layer_rootfs(store_dir, &staged.id);

        if target.exists() {
            tracing::debug!(layer = %staged.id, "Layer already in store");
            let _ = tokio::fs::remove_dir_all(&staged.path).await;
            return Ok(target);
        }

        let layer_dir = paths::layer_dir(store_dir, &staged.id);
        tokio::fs::create_dir_all(&layer_dir).await.map_err(|e| {
            DockError::StoreIo(format!(
                "failed to create layer directory {}: {}",
                layer_dir.display(),
                e
            ))
        })?;

        match tokio::fs::rename(&staged.path, &target).await {
            Ok(()) => Ok(target),
            // Lost a race against another pull promoting the same layer.
            Err(_) if target.exists() => {
                let _ = tokio::fs::remove_dir_all(&staged.path).await;
                Ok(target)
            }
            Err(e) => Err(DockError::StoreIo(format!(
                "failed to move layer '{}' into store: {}",
                staged.id, e
            ))),
        }
    }
}

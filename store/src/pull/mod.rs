//! Image pull strategies.
//!
//! A `Puller` materializes the layers of an image into a scratch directory
//! and reports them base layer first, since filesystem layers are applied
//! bottom-up. Two strategies exist: `RegistryPuller` fetches manifests and
//! blobs from a remote registry; `LocalPuller` reads a `docker save`
//! archive without touching the network. The strategy is selected by
//! configuration.

mod archive;
mod local;
mod registry;

pub use archive::{Extractor, TarExtractor};
pub use local::LocalPuller;
pub use registry::RegistryPuller;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use dockyard_core::config::{PullerKind, StoreConfig};
use dockyard_core::error::Result;

use crate::metadata::ImageLayer;
use crate::reference::ImageName;
use crate::registry::RegistryClient;

/// A pull strategy.
#[async_trait]
pub trait Puller: Send + Sync {
    /// Materialize the layers of `name` under `directory`.
    ///
    /// Returns the layers base first. Fails fast on the first broken
    /// layer; already-materialized layers are left in place for the caller
    /// to clean up.
    async fn pull(&self, name: &ImageName, directory: &Path) -> Result<Vec<ImageLayer>>;
}

/// Build the puller selected by `config`, using the subprocess `tar`
/// extractor.
pub fn create(config: &StoreConfig) -> Result<Arc<dyn Puller>> {
    let extractor: Arc<dyn Extractor> = Arc::new(TarExtractor);

    match config.puller {
        PullerKind::Registry => {
            let client = RegistryClient::new(
                config.registry_url.clone(),
                config.auth_url.clone(),
                config.account.clone(),
            )?;
            Ok(Arc::new(RegistryPuller::new(client, extractor)))
        }
        PullerKind::Local => Ok(Arc::new(LocalPuller::new(
            config.local_archives_dir.clone(),
            extractor,
        ))),
    }
}

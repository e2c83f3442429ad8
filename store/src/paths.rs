//! On-disk layout of the image store and of local image archives.
//!
//! Store layout:
//!
//! ```text
//! <store_root>/images.json             metadata index
//! <store_root>/staging/<uuid>/         per-pull scratch directory
//! <store_root>/layers/<id>/rootfs/     extracted layer content
//! ```
//!
//! Local archive layout (a `docker save` tree):
//!
//! ```text
//! <archives_dir>/<name>.tar            image archive
//!   repositories                       {repository: {tag: top layer id}}
//!   <id>/json                          layer manifest (id, parent)
//!   <id>/layer.tar                     layer filesystem archive
//! ```

use std::path::{Path, PathBuf};

/// Metadata index file under the store root.
pub fn index_file(store_dir: &Path) -> PathBuf {
    store_dir.join("images.json")
}

/// Scratch area for in-flight pulls.
pub fn staging_dir(store_dir: &Path) -> PathBuf {
    store_dir.join("staging")
}

/// Scratch directory for one pull.
pub fn pull_staging_dir(store_dir: &Path, pull_id: &str) -> PathBuf {
    staging_dir(store_dir).join(pull_id)
}

/// Directory holding all extracted layers.
pub fn layers_dir(store_dir: &Path) -> PathBuf {
    store_dir.join("layers")
}

/// Directory for one extracted layer.
pub fn layer_dir(store_dir: &Path, layer_id: &str) -> PathBuf {
    layers_dir(store_dir).join(layer_id)
}

/// Rootfs directory of one extracted layer.
pub fn layer_rootfs(store_dir: &Path, layer_id: &str) -> PathBuf {
    layer_dir(store_dir, layer_id).join("rootfs")
}

/// Rootfs directory a puller extracts one layer into.
pub fn staged_layer_rootfs(directory: &Path, layer_id: &str) -> PathBuf {
    directory.join(layer_id).join("rootfs")
}

/// Raw blob download path for one layer.
pub fn staged_layer_archive(directory: &Path, layer_id: &str) -> PathBuf {
    directory.join(format!("{}.tar", layer_id))
}

/// Archive file for a saved image.
pub fn local_archive_tar(archives_dir: &Path, name: &str) -> PathBuf {
    archives_dir.join(format!("{}.tar", name))
}

/// `repositories` file inside an extracted saved image.
pub fn archive_repositories(directory: &Path) -> PathBuf {
    directory.join("repositories")
}

/// Layer manifest inside an extracted saved image.
pub fn archive_layer_manifest(directory: &Path, layer_id: &str) -> PathBuf {
    directory.join(layer_id).join("json")
}

/// Layer filesystem archive inside an extracted saved image.
pub fn archive_layer_tar(directory: &Path, layer_id: &str) -> PathBuf {
    directory.join(layer_id).join("layer.tar")
}

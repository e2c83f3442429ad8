//! Archive extraction capability.
//!
//! Extraction is injected into the pullers so their logic stays testable
//! without a real archive tool.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use dockyard_core::error::{DockError, Result};

/// Extracts an archive into a directory.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, archive: &Path, directory: &Path) -> Result<()>;
}

/// Extraction via the system `tar` binary.
///
/// `tar -x` detects compression on its own, so plain and gzip-compressed
/// layer archives both extract.
pub struct TarExtractor;

#[async_trait]
impl Extractor for TarExtractor {
    async fn extract(&self, archive: &Path, directory: &Path) -> Result<()> {
        tokio::fs::create_dir_all(directory).await.map_err(|e| {
            DockError::Extraction(format!(
                "failed to create directory {}: {}",
                directory.display(),
                e
            ))
        })?;

        let output = Command::new("tar")
            .arg("-C")
            .arg(directory)
            .arg("-x")
            .arg("-f")
            .arg(archive)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                DockError::Extraction(format!(
                    "failed to spawn tar for '{}': {}",
                    archive.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockError::Extraction(format!(
                "tar failed for '{}' ({}): {}",
                archive.display(),
                output.status,
                stderr.trim()
            )));
        }

        tracing::debug!(
            archive = %archive.display(),
            directory = %directory.display(),
            "Extracted archive"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn create_tar(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);

        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }

        builder.finish().unwrap();
    }

    #[tokio::test]
    async fn test_extract_plain_tar() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("layer.tar");
        let target = tmp.path().join("rootfs");

        create_tar(&archive, &[("etc/hostname", b"busybox"), ("bin/sh", b"#!")]);

        TarExtractor.extract(&archive, &target).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(target.join("etc/hostname")).unwrap(),
            "busybox"
        );
        assert!(target.join("bin/sh").exists());
    }

    #[tokio::test]
    async fn test_extract_gzipped_tar() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("layer.tar.gz");
        let target = tmp.path().join("rootfs");

        let file = File::create(&archive).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "data.txt", &b"hello"[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        TarExtractor.extract(&archive, &target).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(target.join("data.txt")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_extract_missing_archive() {
        let tmp = TempDir::new().unwrap();
        let result = TarExtractor
            .extract(&tmp.path().join("missing.tar"), &tmp.path().join("out"))
            .await;

        assert!(matches!(result, Err(DockError::Extraction(_))));
    }
}

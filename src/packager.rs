//! Code packaging: bundled code string in, deployable archive out.
//!
//! Packaging is a collaborator of the pipeline, not part of it, so it sits
//! behind the [`Packager`] trait. One instance exists per provider; the
//! bundle and the archive formats are the only provider-specific parts.

use crate::config::Provider;
use crate::errors::{DeployError, Result};
use crate::runtime::BoxFuture;
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A deployable archive produced for one file and one provider.
///
/// Owned by the pipeline stage that produced it and consumed by exactly one
/// provisioning call; artifacts are never cached across runs.
#[derive(Debug, Clone)]
pub struct PackageArtifact {
    pub provider: Provider,
    pub archive_path: PathBuf,
}

/// Collapses a module into deployable code and packages it into an archive.
///
/// Object-safe in the same style as the provisioning seams so fakes can be
/// substituted in tests.
pub trait Packager: Send + Sync + Debug {
    /// Produce a single-file code blob for the module at `path`.
    fn bundle(&self, path: &Path) -> BoxFuture<'_, Result<String>>;

    /// Package a code string into a deployable archive on disk.
    fn archive(&self, code: &str) -> BoxFuture<'_, Result<PackageArtifact>>;
}

/// A cloneable, type-erased packager handle.
pub type DynPackager = Arc<dyn Packager>;

// ---------------------------------------------------------------------------
// Zip packager
// ---------------------------------------------------------------------------

/// Packager for Node function sources: reads a self-contained entry module
/// and stages it as `index.js` inside a zip archive.
///
/// Collapsing a multi-module graph into the entry file is delegated to an
/// upstream bundler; this packager expects its input to already be
/// self-contained.
#[derive(Debug, Clone)]
pub struct ZipPackager {
    provider: Provider,
}

impl ZipPackager {
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }
}

impl Packager for ZipPackager {
    fn bundle(&self, path: &Path) -> BoxFuture<'_, Result<String>> {
        let path = path.to_path_buf();
        let provider = self.provider;
        Box::pin(async move {
            tokio::fs::read_to_string(&path).await.map_err(|e| {
                DeployError::packaging(provider, format!("cannot read {}: {}", path.display(), e))
            })
        })
    }

    fn archive(&self, code: &str) -> BoxFuture<'_, Result<PackageArtifact>> {
        let code = code.to_string();
        let provider = self.provider;
        Box::pin(async move {
            let archive_path = tokio::task::spawn_blocking(move || write_zip(&code))
                .await
                .map_err(|e| DeployError::packaging(provider, format!("archive task: {e}")))?
                .map_err(|e| DeployError::packaging(provider, e.to_string()))?;

            Ok(PackageArtifact {
                provider,
                archive_path,
            })
        })
    }
}

fn write_zip(code: &str) -> std::io::Result<PathBuf> {
    let dir = tempfile::Builder::new().prefix("skylift-").tempdir()?;
    let dir = dir.keep();
    let archive_path = dir.join("function.zip");

    let file = std::fs::File::create(&archive_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    writer
        .start_file("index.js", options)
        .map_err(std::io::Error::other)?;
    writer.write_all(code.as_bytes())?;
    writer.finish().map_err(std::io::Error::other)?;

    Ok(archive_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bundles_entry_file() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("fn.js");
        std::fs::write(&entry, "exports.endpoint_hi = async () => 'hi'\n").unwrap();

        let packager = ZipPackager::new(Provider::Amazon);
        let code = packager.bundle(&entry).await.unwrap();
        assert!(code.contains("endpoint_hi"));
    }

    #[tokio::test]
    async fn bundle_failure_is_a_packaging_error() {
        let packager = ZipPackager::new(Provider::Google);
        let err = packager.bundle(Path::new("/nonexistent.js")).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Packaging {
                provider: Provider::Google,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn archives_code_into_zip() {
        let packager = ZipPackager::new(Provider::Amazon);
        let artifact = packager.archive("exports.f = () => 1").await.unwrap();

        assert_eq!(artifact.provider, Provider::Amazon);
        assert!(artifact.archive_path.exists());
        let bytes = std::fs::read(&artifact.archive_path).unwrap();
        // Zip local file header magic.
        assert_eq!(&bytes[..4], b"PK\x03\x04");
    }
}

// rust/rendezvous-core/src/discovery.rs

//! Discovery artifact publishing.
//!
//! Once the rendezvous endpoint is listening, the driver writes the
//! allocation plan to `<dir>/<port><suffix>` so that external orchestration
//! can find both the port and the plan. The artifact is removed on shutdown.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::config::DiscoveryConfig;
use crate::error::{Result, RendezvousError};
use crate::plan::AllocationPlan;

/// Writes and removes discovery artifacts in a well-known directory.
#[derive(Debug, Clone)]
pub struct DiscoveryPublisher {
    dir: PathBuf,
    suffix: String,
}

impl DiscoveryPublisher {
    pub fn new(dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.into(),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(config.dir.clone(), config.suffix.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `port`.
    pub fn artifact_path(&self, port: u16) -> PathBuf {
        self.dir.join(format!("{}{}", port, self.suffix))
    }

    /// Serialize `plan` to the artifact for `port`, replacing any previous
    /// artifact. The file is written next to its final location and renamed
    /// into place so readers never see a partial plan.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::ArtifactIo`] if the directory cannot be
    /// created or the file cannot be written.
    pub async fn publish(&self, port: u16, plan: &AllocationPlan) -> Result<PathBuf> {
        let path = self.artifact_path(port);

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            RendezvousError::artifact_io_with_source(
                &self.dir,
                "failed to create discovery directory",
                e,
            )
        })?;

        let json = serde_json::to_vec_pretty(plan)
            .map_err(|e| RendezvousError::serialization(e.to_string()))?;

        let tmp_path = self.dir.join(format!(".{}{}.tmp", port, self.suffix));
        if let Err(e) = write_and_rename(&tmp_path, &path, &json).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(RendezvousError::artifact_io_with_source(
                &path,
                "failed to write discovery artifact",
                e,
            ));
        }

        tracing::info!(port, path = %path.display(), entries = plan.len(), "Published discovery artifact");
        Ok(path)
    }

    /// Load the plan published for `port`.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::ArtifactIo`] if the artifact is missing or
    /// unreadable, and a serialization error if it is not a valid plan.
    pub fn read(&self, port: u16) -> Result<AllocationPlan> {
        let path = self.artifact_path(port);
        let content = fs::read(&path).map_err(|e| {
            RendezvousError::artifact_io_with_source(&path, "failed to read discovery artifact", e)
        })?;
        serde_json::from_slice(&content).map_err(|e| {
            RendezvousError::serialization(format!("invalid plan in {}: {}", path.display(), e))
        })
    }

    /// Remove the artifact for `port`, reporting whether a file was deleted.
    ///
    /// A missing artifact is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::ArtifactCleanup`] for any other failure.
    pub fn try_cleanup(&self, port: u16) -> Result<bool> {
        let path = self.artifact_path(port);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RendezvousError::ArtifactCleanup { path, source: e }),
        }
    }

    /// Remove the artifact for `port`. Never fails: this runs on the
    /// shutdown path, so errors are logged and dropped.
    pub fn cleanup(&self, port: u16) {
        match self.try_cleanup(port) {
            Ok(true) => {
                tracing::info!(port, path = %self.artifact_path(port).display(), "Removed discovery artifact");
            }
            Ok(false) => {
                tracing::debug!(port, "No discovery artifact to remove");
            }
            Err(e) => {
                tracing::warn!(port, error = %e, "Failed to remove discovery artifact");
            }
        }
    }
}

async fn write_and_rename(tmp_path: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp_path, path).await
}

use std::path::PathBuf;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::model::Deployment;

/// Persists uploaded build bundles keyed by deployment id, so a rollout can
/// later be rolled back or re-scaled without re-uploading. Artifacts are
/// copied, never moved: the source deployment keeps its bundle.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    sites: PathBuf,
}

impl ArtifactStore {
    pub fn new(artifacts_root: impl Into<PathBuf>, sites_root: impl Into<PathBuf>) -> Self {
        Self {
            root: artifacts_root.into(),
            sites: sites_root.into(),
        }
    }

    /// `{root}/{application_id}/deployments/{deployment_id}.tar.gz`
    pub fn artifact_path(&self, deployment: &Deployment) -> PathBuf {
        self.root
            .join(deployment.application_id.to_string())
            .join("deployments")
            .join(format!("{}.tar.gz", deployment.id))
    }

    /// Directory a frontend deployment's static bundle is extracted into.
    pub fn site_dir(&self, deployment: &Deployment) -> PathBuf {
        self.sites.join(deployment.id_simple())
    }

    #[tracing::instrument(skip(self, content), fields(deployment_id = %deployment.id, bytes = content.len()), err)]
    pub async fn save(&self, deployment: &Deployment, content: &[u8]) -> std::io::Result<()> {
        let path = self.artifact_path(deployment);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, content).await
    }

    /// Copy `from`'s bundle to `to`'s path. Used by rollback, scale and
    /// variable updates to re-release a version without a new upload.
    #[tracing::instrument(skip(self), fields(from = %from.id, to = %to.id), err)]
    pub async fn copy(&self, from: &Deployment, to: &Deployment) -> std::io::Result<()> {
        let dest = self.artifact_path(to);
        if let Some(dir) = dest.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::copy(self.artifact_path(from), dest).await?;
        Ok(())
    }

    pub async fn remove(&self, deployment: &Deployment) -> std::io::Result<()> {
        tokio::fs::remove_file(self.artifact_path(deployment)).await
    }

    /// Unpack a frontend deployment's `.tar.gz` bundle into its content
    /// directory and return that directory.
    #[tracing::instrument(skip(self), fields(deployment_id = %deployment.id), err)]
    pub async fn extract_site(&self, deployment: &Deployment) -> anyhow::Result<PathBuf> {
        let bundle = self.artifact_path(deployment);
        let target = self.site_dir(deployment);
        tokio::fs::create_dir_all(&target).await?;

        let unpack_target = target.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let file = std::fs::File::open(&bundle)?;
            let mut archive = Archive::new(GzDecoder::new(file));
            archive.unpack(&unpack_target)?;
            Ok(())
        })
        .await??;

        Ok(target)
    }

    pub async fn remove_site(&self, deployment: &Deployment) -> std::io::Result<()> {
        tokio::fs::remove_dir_all(self.site_dir(deployment)).await
    }
}

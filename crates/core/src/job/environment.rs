//! Job-scoped environments.
//!
//! The auth phase writes its token into the environment and the update phase
//! reads it back. With isolation enabled every job works on its own copy, so
//! concurrent jobs cannot overwrite each other's token. The copy lives in a
//! temporary directory that is removed when the [`JobEnvironment`] drops.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::config::IsolationConfig;

use super::types::{JobError, PhaseParams};

/// The environment file one job's phases run against.
#[derive(Debug)]
pub struct JobEnvironment {
    path: PathBuf,
    scratch: Option<TempDir>,
}

impl JobEnvironment {
    /// Prepares the environment for `job_id` according to `isolation`.
    pub async fn provision(
        source: &Path,
        job_id: &str,
        isolation: &IsolationConfig,
    ) -> Result<Self, JobError> {
        if !isolation.enabled {
            return Ok(Self::shared(source));
        }

        let env_err = |reason: String| JobError::Environment {
            path: source.to_path_buf(),
            reason,
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix("batchman-env-");
        let scratch = match &isolation.work_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| env_err(format!("cannot create {}: {}", dir.display(), e)))?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| env_err(format!("cannot create scratch directory: {}", e)))?;

        let path = scratch
            .path()
            .join(format!("{}.postman_environment.json", job_id));
        tokio::fs::copy(source, &path)
            .await
            .map_err(|e| env_err(e.to_string()))?;

        debug!(job_id, environment = %path.display(), "Provisioned job environment");

        Ok(Self {
            path,
            scratch: Some(scratch),
        })
    }

    /// Uses `source` directly; writes are visible to every job.
    pub fn shared(source: &Path) -> Self {
        Self {
            path: source.to_path_buf(),
            scratch: None,
        }
    }

    /// The file both phases read (and the auth phase writes).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_isolated(&self) -> bool {
        self.scratch.is_some()
    }

    /// Points `params` at this environment.
    pub fn apply(&self, params: &PhaseParams) -> PhaseParams {
        let mut params = params.clone();
        params.environment = self.path.clone();
        if params.export_environment.is_some() {
            params.export_environment = Some(self.path.clone());
        }
        params
    }
}

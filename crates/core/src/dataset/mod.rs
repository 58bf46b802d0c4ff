//! Input datasets and iteration counting.
//!
//! A dataset is a delimited text file whose first line is a header. Each
//! dataset becomes one job; its row count is the advisory iteration count of
//! the job's update phase.

mod counter;

pub use counter::{count_data_rows, count_iterations};

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::OnceCell;

/// Errors reading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The file could not be opened or is not valid UTF-8.
    #[error("Failed to read input file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

/// One configured input file.
#[derive(Debug)]
pub struct InputDataset {
    path: PathBuf,
    job_id: String,
    row_count: OnceCell<u64>,
}

impl InputDataset {
    /// Creates a dataset; the job id is the file name without its extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let job_id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            path,
            job_id,
            row_count: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Human readable job identifier.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Number of data rows (header excluded). Read once, then cached.
    pub async fn row_count(&self) -> Result<u64, DatasetError> {
        self.row_count
            .get_or_try_init(|| count_iterations(&self.path))
            .await
            .copied()
    }

    /// Row count if it has already been read.
    pub fn cached_row_count(&self) -> Option<u64> {
        self.row_count.get().copied()
    }
}

//! Input checks and result files shared by the commands

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CliError, Result};

/// Reject inputs that are missing or not regular files
pub async fn check_input(path: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| CliError::invalid_input(path, e.to_string()))?;
    if !metadata.is_file() {
        return Err(CliError::invalid_input(path, "not a regular file"));
    }
    debug!(path = %path.display(), bytes = metadata.len(), "Input accepted");
    Ok(())
}

/// Create the output directory if missing
pub async fn prepare_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| CliError::WriteOutput {
            path: dir.to_path_buf(),
            source,
        })
}

/// Write one sink result into `dir`
pub async fn write_output(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.join(file_name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| CliError::WriteOutput {
            path: path.clone(),
            source,
        })?;
    info!(path = %path.display(), bytes = bytes.len(), "Output written");
    Ok(path)
}

//! Tar archives exchanged with the helper pod

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{StagingError, StagingResult};

/// Archive `source` so that `tar xvf - -C / --absolute-names` writes it to
/// `destination` on the volume
pub fn pack(source: &Path, destination: &str) -> StagingResult<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let entry_name = destination.trim_start_matches('/');
    builder
        .append_path_with_name(source, entry_name)
        .map_err(|e| StagingError::Archive(format!("{}: {}", source.display(), e)))?;
    builder
        .into_inner()
        .map_err(|e| StagingError::Archive(e.to_string()))
}

/// Unpack every regular file of `archive` directly into `destination`,
/// dropping its directory components. Returns the written paths.
pub fn unpack_flat(archive: &[u8], destination: &Path) -> StagingResult<Vec<PathBuf>> {
    fs::create_dir_all(destination)?;

    let mut reader = tar::Archive::new(archive);
    let entries = reader
        .entries()
        .map_err(|e| StagingError::Archive(e.to_string()))?;

    let mut written = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| StagingError::Archive(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| StagingError::Archive(e.to_string()))?
            .into_owned();
        let Some(file_name) = path.file_name() else {
            continue;
        };

        let target = destination.join(file_name);
        entry
            .unpack(&target)
            .map_err(|e| StagingError::Archive(format!("{}: {}", target.display(), e)))?;
        debug!("Unpacked {} to {}", path.display(), target.display());
        written.push(target);
    }
    Ok(written)
}

//! Startup maintenance: the per-run log files are truncated rather than
//! rotated, so each run starts from a clean slate.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Truncate every regular file in `dir`. Returns how many files were cleared.
/// Fails if the directory does not exist.
pub fn clear_dir_files(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        anyhow::bail!("directory does not exist: {}", dir.display());
    }

    let mut cleared = 0;
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() {
            fs::OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&path)
                .with_context(|| format!("failed to clear {}", path.display()))?;
            cleared += 1;
        }
    }

    Ok(cleared)
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

const ROOT_MARKERS: [&str; 2] = ["pyproject.toml", "setup.py"];

/// Nearest directory at or above `start` that holds a Python project manifest.
///
/// `pyproject.toml` wins over `setup.py` when both appear at different levels.
/// The returned root is absolute, whatever form `start` was given in.
///
/// # Errors
/// Returns an error when `start` cannot be resolved or no ancestor carries
/// either manifest.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let resolved = fs::canonicalize(start)
        .with_context(|| format!("resolving project directory {}", start.display()))?;
    for marker in ROOT_MARKERS {
        if let Some(root) = find_dir_with_leaf(&resolved, marker) {
            return Ok(root);
        }
    }
    bail!(
        "no pyproject.toml or setup.py found in {} or its parents",
        start.display()
    )
}

fn find_dir_with_leaf(start: &Path, leaf: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(leaf).is_file())
        .map(Path::to_path_buf)
}

/// True when `root` is a git checkout, as opposed to an unpacked release archive.
#[must_use]
pub fn is_git_checkout(root: &Path) -> bool {
    root.join(".git").join("config").exists()
}

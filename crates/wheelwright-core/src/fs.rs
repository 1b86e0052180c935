use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Grant the owner write access throughout a scratch tree. The working copy
/// carries `.git/objects`, whose files are read-only.
fn unlock_scratch_tree(root: &Path) {
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if entry.path_is_symlink() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            unlock_entry(entry.path(), &meta);
        }
    }
}

#[cfg(unix)]
fn unlock_entry(path: &Path, meta: &fs::Metadata) {
    use std::os::unix::fs::PermissionsExt;
    let mode = meta.permissions().mode();
    let owner = if meta.is_dir() { 0o700 } else { 0o600 };
    if mode & owner != owner {
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode | owner));
    }
}

#[cfg(not(unix))]
fn unlock_entry(path: &Path, meta: &fs::Metadata) {
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        let _ = fs::set_permissions(path, perms);
    }
}

/// Delete a scratch directory, read-only content included. Already gone is
/// not an error.
pub(crate) fn remove_scratch_tree(path: &Path) -> Result<()> {
    if let Err(err) = fs::symlink_metadata(path) {
        if err.kind() == io::ErrorKind::NotFound {
            return Ok(());
        }
        return Err(err)
            .with_context(|| format!("inspecting scratch directory {}", path.display()));
    }
    unlock_scratch_tree(path);
    fs::remove_dir_all(path)
        .with_context(|| format!("removing scratch directory {}", path.display()))
}

/// A fresh temporary directory removed when the value is dropped.
///
/// Removal failures are logged and swallowed so they never replace an error
/// that is already propagating out of the owning scope.
#[derive(Debug)]
pub(crate) struct ScratchDir {
    inner: Option<tempfile::TempDir>,
    path: PathBuf,
}

impl ScratchDir {
    pub(crate) fn new(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .context("failed to create temporary build directory")?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            inner: Some(dir),
            path,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let Some(dir) = self.inner.take() else {
            return;
        };
        if let Err(err) = remove_scratch_tree(dir.path()) {
            warn!(
                path = %self.path.display(),
                error = %format!("{err:#}"),
                "failed to remove temporary build directory"
            );
            // Leave what is left for inspection instead of a silent second attempt.
            let _ = dir.keep();
            return;
        }
        debug!(path = %self.path.display(), "removed temporary build directory");
    }
}

/// Recursively copy `from` into `to`, following symlinks the way a plain
/// directory copy would.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.with_context(|| format!("walking {}", from.display()))?;
        let path = entry.path();
        let relative = path.strip_prefix(from).unwrap_or(path);
        let dest = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
                .with_context(|| format!("creating {}", dest.display()))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::copy(path, &dest)
                .with_context(|| format!("copying {} to {}", path.display(), dest.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_dir_is_removed_on_drop() -> Result<()> {
        let scratch = ScratchDir::new("wheelwright-test-")?;
        let path = scratch.path().to_path_buf();
        fs::create_dir_all(path.join("nested"))?;
        fs::write(path.join("nested").join("file.txt"), b"data")?;
        assert!(path.exists());
        drop(scratch);
        assert!(!path.exists(), "scratch dir should be gone after drop");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn scratch_dir_removes_read_only_content() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let scratch = ScratchDir::new("wheelwright-test-")?;
        let path = scratch.path().to_path_buf();
        let locked = path.join("objects");
        fs::create_dir_all(&locked)?;
        fs::write(locked.join("pack"), b"data")?;
        fs::set_permissions(locked.join("pack"), fs::Permissions::from_mode(0o444))?;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555))?;
        drop(scratch);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn removing_a_missing_scratch_tree_is_not_an_error() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        remove_scratch_tree(&tmp.path().join("missing"))?;
        Ok(())
    }

    #[test]
    fn copy_tree_mirrors_nested_files() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("pkg").join("sub"))?;
        fs::create_dir_all(src.join("empty"))?;
        fs::write(src.join("pyproject.toml"), b"[project]\n")?;
        fs::write(src.join("pkg").join("sub").join("mod.py"), b"x = 1\n")?;

        let dest = tmp.path().join("copy");
        copy_tree(&src, &dest)?;

        assert_eq!(fs::read(dest.join("pyproject.toml"))?, b"[project]\n");
        assert_eq!(fs::read(dest.join("pkg").join("sub").join("mod.py"))?, b"x = 1\n");
        assert!(dest.join("empty").is_dir());
        Ok(())
    }
}

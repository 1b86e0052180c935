use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::effects::Effects;
use crate::error::BuildError;
use crate::fs::copy_tree;
use crate::version::ProjectVersion;

const WORKING_COPY_DIR: &str = "working-copy";

/// Turns a project tree into exactly one wheel inside a scratch directory.
pub struct WheelBuilder<'a> {
    effects: &'a dyn Effects,
    version_marker: &'a Path,
    verbose: bool,
}

impl<'a> WheelBuilder<'a> {
    /// `version_marker` is relative to the project root.
    pub fn new(effects: &'a dyn Effects, version_marker: &'a Path, verbose: bool) -> Self {
        Self {
            effects,
            version_marker,
            verbose,
        }
    }

    /// Build a wheel for `project_root` into `tmp_dir` and return its path.
    ///
    /// Unreleased versions of a git checkout are built from a copy whose
    /// version marker is rewritten; the original tree is never touched.
    ///
    /// # Errors
    /// Returns an error when the version marker is not a plain relative path
    /// or the working copy cannot be prepared, and a [`BuildError`] when the
    /// packaging tool fails or produces no wheel.
    pub fn build(
        &self,
        project_root: &Path,
        tmp_dir: &Path,
        version: &ProjectVersion,
    ) -> Result<PathBuf> {
        ensure_contained_marker(self.version_marker)?;
        let source = if version.is_unreleased() && self.effects.git().is_repository(project_root) {
            self.prepare_working_copy(project_root, tmp_dir, version)?
        } else {
            project_root.to_path_buf()
        };
        debug!(
            source = %source.display(),
            out_dir = %tmp_dir.display(),
            "building wheel"
        );
        let output = self
            .effects
            .packager()
            .build_wheel(&source, tmp_dir, self.verbose)
            .with_context(|| format!("running packaging tool for {}", source.display()))?;
        if !output.success() {
            return Err(BuildError::ToolFailed {
                project_root: source,
                code: output.code,
                diagnostics: output.diagnostics(),
            }
            .into());
        }
        select_wheel(tmp_dir)
    }

    fn prepare_working_copy(
        &self,
        project_root: &Path,
        tmp_dir: &Path,
        version: &ProjectVersion,
    ) -> Result<PathBuf> {
        let copy = tmp_dir.join(WORKING_COPY_DIR);
        copy_tree(project_root, &copy).with_context(|| {
            format!(
                "copying {} into {}",
                project_root.display(),
                copy.display()
            )
        })?;
        let marker = copy.join(self.version_marker);
        fs::write(&marker, version_marker_contents(version))
            .with_context(|| format!("writing version marker {}", marker.display()))?;
        debug!(marker = %marker.display(), version = %version, "patched version marker");
        Ok(copy)
    }
}

/// The marker is joined onto the working copy, so it may only name a path
/// beneath it.
fn ensure_contained_marker(marker: &Path) -> Result<()> {
    let escapes = marker.as_os_str().is_empty()
        || marker
            .components()
            .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir));
    if escapes {
        bail!(
            "version marker `{}` must be a relative path inside the project",
            marker.display()
        );
    }
    Ok(())
}

pub(crate) fn version_marker_contents(version: &ProjectVersion) -> String {
    format!("__version__ = \"{version}\"")
}

/// First `.whl` directly inside `dir`, in file-name order.
pub(crate) fn select_wheel(dir: &Path) -> Result<PathBuf> {
    let mut wheels = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && has_case_insensitive_extension(&path, "whl") {
            wheels.push(path);
        }
    }
    wheels.sort();
    let mut wheels = wheels.into_iter();
    let Some(first) = wheels.next() else {
        return Err(BuildError::MissingArtifact {
            out_dir: dir.to_path_buf(),
        }
        .into());
    };
    let ignored: Vec<_> = wheels.collect();
    if !ignored.is_empty() {
        warn!(
            selected = %first.display(),
            ignored = ?ignored,
            "packaging tool produced several wheels; using the first by name"
        );
    }
    Ok(first)
}

fn has_case_insensitive_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

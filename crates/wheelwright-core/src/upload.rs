use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

/// How the workspace should interpret an imported file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportFormat {
    Auto,
    Source,
    Html,
    Jupyter,
    Dbc,
    RMarkdown,
    Raw,
}

/// DBFS-style file storage.
pub trait DbfsApi {
    fn mkdirs(&self, path: &str) -> Result<()>;
    fn upload(&self, path: &str, contents: &mut dyn Read, overwrite: bool) -> Result<()>;
}

/// The workspace file tree.
pub trait WorkspaceApi {
    fn mkdirs(&self, path: &str) -> Result<()>;
    fn upload(
        &self,
        path: &str,
        contents: &mut dyn Read,
        overwrite: bool,
        format: ImportFormat,
    ) -> Result<()>;
}

pub trait RemoteStorage {
    fn dbfs(&self) -> &dyn DbfsApi;
    fn workspace(&self) -> &dyn WorkspaceApi;
}

/// Remote location of a wheel: `<install folder>/wheels/<file name>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteTarget {
    path: String,
    parent: String,
}

impl RemoteTarget {
    #[must_use]
    pub fn for_wheel(install_folder: &str, wheel_name: &str) -> Self {
        let parent = format!("{}/wheels", install_folder.trim_end_matches('/'));
        Self {
            path: format!("{parent}/{wheel_name}"),
            parent,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn parent(&self) -> &str {
        &self.parent
    }
}

/// Copy the local wheel to DBFS, replacing any earlier upload.
///
/// # Errors
/// Returns an error if the wheel cannot be opened or the storage client fails.
pub fn upload_to_dbfs(
    storage: &dyn RemoteStorage,
    local_wheel: &Path,
    target: &RemoteTarget,
) -> Result<String> {
    let mut file = open_wheel(local_wheel)?;
    let dbfs = storage.dbfs();
    dbfs.mkdirs(target.parent())
        .with_context(|| format!("creating dbfs:{}", target.parent()))?;
    info!("Uploading wheel to dbfs:{}", target.path());
    dbfs.upload(target.path(), &mut file, true)
        .with_context(|| format!("uploading {} to dbfs:{}", local_wheel.display(), target.path()))?;
    Ok(target.path().to_string())
}

/// Copy the local wheel into the workspace tree, replacing any earlier upload.
///
/// # Errors
/// Returns an error if the wheel cannot be opened or the storage client fails.
pub fn upload_to_wsfs(
    storage: &dyn RemoteStorage,
    local_wheel: &Path,
    target: &RemoteTarget,
) -> Result<String> {
    let mut file = open_wheel(local_wheel)?;
    let workspace = storage.workspace();
    workspace
        .mkdirs(target.parent())
        .with_context(|| format!("creating /Workspace{}", target.parent()))?;
    info!("Uploading wheel to /Workspace{}", target.path());
    workspace
        .upload(target.path(), &mut file, true, ImportFormat::Auto)
        .with_context(|| {
            format!(
                "uploading {} to /Workspace{}",
                local_wheel.display(),
                target.path()
            )
        })?;
    Ok(target.path().to_string())
}

fn open_wheel(local_wheel: &Path) -> Result<File> {
    File::open(local_wheel)
        .with_context(|| format!("opening built wheel {}", local_wheel.display()))
}

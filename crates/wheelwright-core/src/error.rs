use std::path::PathBuf;

/// The unreleased version of a source checkout could not be derived.
///
/// Carries the remediation links shown to the person running the installer.
#[derive(thiserror::Error, Debug)]
#[error(
    "Cannot determine unreleased version. Please report this error message that you see on \
     {issues_url}. Meanwhile, download, unpack, and install the latest released version from \
     {releases_url}. Original error is: {cause}"
)]
pub struct VersionError {
    issues_url: String,
    releases_url: String,
    cause: String,
}

impl VersionError {
    pub fn new(github_org: &str, product: &str, cause: &anyhow::Error) -> Self {
        Self {
            issues_url: format!("https://github.com/{github_org}/{product}/issues/new"),
            releases_url: format!("https://github.com/{github_org}/{product}/releases"),
            cause: format!("{cause:#}"),
        }
    }

    #[must_use]
    pub fn issues_url(&self) -> &str {
        &self.issues_url
    }

    #[must_use]
    pub fn releases_url(&self) -> &str {
        &self.releases_url
    }

    #[must_use]
    pub fn cause(&self) -> &str {
        &self.cause
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error(
        "packaging tool exited with code {code} while building {}{}",
        .project_root.display(),
        render_diagnostics(.diagnostics)
    )]
    ToolFailed {
        project_root: PathBuf,
        code: i32,
        diagnostics: String,
    },
    #[error("packaging tool produced no .whl file in {}", .out_dir.display())]
    MissingArtifact { out_dir: PathBuf },
}

fn render_diagnostics(diagnostics: &str) -> String {
    if diagnostics.is_empty() {
        " (rerun with verbose output for the tool's diagnostics)".to_string()
    } else {
        format!(":\n{diagnostics}")
    }
}

//! Version strings for released installs and source checkouts.
//!
//! A checkout builds as `<major>.<minor>.<patch + 1>+<commits><timestamp>`,
//! which is at once a semver build-metadata version and a PEP 440 local
//! version, and never collides with the release it was tagged from.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use once_cell::unsync::OnceCell;
use serde::Serialize;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::debug;

use crate::effects::Effects;
use crate::error::VersionError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProjectVersion(String);

impl ProjectVersion {
    /// A version taken verbatim from a release.
    pub fn released(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Computed from source control rather than pinned by a release tag.
    #[must_use]
    pub fn is_unreleased(&self) -> bool {
        self.0.contains('+')
    }
}

impl fmt::Display for ProjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolves the project version once and hands out the cached value after.
///
/// The cache is deliberately not `Sync`: one resolver serves one installer run.
pub struct VersionResolver {
    effects: Arc<dyn Effects>,
    released_version: String,
    product: String,
    github_org: String,
    cached: OnceCell<ProjectVersion>,
}

impl VersionResolver {
    pub fn new(
        effects: Arc<dyn Effects>,
        released_version: impl Into<String>,
        product: impl Into<String>,
        github_org: impl Into<String>,
    ) -> Self {
        Self {
            effects,
            released_version: released_version.into(),
            product: product.into(),
            github_org: github_org.into(),
            cached: OnceCell::new(),
        }
    }

    /// The project version, computed on first call.
    ///
    /// # Errors
    /// Returns an error if the project root cannot be located, or a
    /// [`VersionError`] when a checkout's version cannot be derived from git.
    pub fn resolve(&self) -> Result<&ProjectVersion> {
        self.cached.get_or_try_init(|| self.compute())
    }

    fn compute(&self) -> Result<ProjectVersion> {
        let root = self
            .effects
            .locator()
            .find_project_root()
            .context("locating project root")?;
        if !self.effects.git().is_repository(&root) {
            debug!(
                root = %root.display(),
                version = %self.released_version,
                "no git metadata; using released version"
            );
            return Ok(ProjectVersion::released(self.released_version.clone()));
        }
        let version = self
            .unreleased_version(&root)
            .map_err(|err| VersionError::new(&self.github_org, &self.product, &err))?;
        debug!(root = %root.display(), version = %version, "derived unreleased version");
        Ok(version)
    }

    fn unreleased_version(&self, root: &Path) -> Result<ProjectVersion> {
        let output = self.effects.git().describe_tags(root)?;
        if !output.success() {
            let detail = output.diagnostics();
            if detail.is_empty() {
                bail!("git describe --tags exited with code {}", output.code);
            }
            bail!("git describe --tags exited with code {}: {detail}", output.code);
        }
        let described = parse_described_tag(&output.stdout)?;
        let stamp = format_timestamp(self.effects.clock().now_local())?;
        compose_unreleased(&described, &stamp).map(ProjectVersion)
    }
}

/// Parse `git describe --tags` output such as `v0.4.0-12-g3f2a9c1`.
pub(crate) fn parse_described_tag(raw: &str) -> Result<semver::Version> {
    let trimmed = raw.trim();
    let candidate = trimmed.strip_prefix('v').unwrap_or(trimmed);
    semver::Version::parse(candidate)
        .with_context(|| format!("`{trimmed}` is not a semantic version"))
}

/// Commits since the tag, i.e. the pre-release up to its first `-`; empty on
/// an exact tag.
pub(crate) fn commits_since_tag(described: &semver::Version) -> &str {
    described.pre.as_str().split('-').next().unwrap_or_default()
}

pub(crate) fn compose_unreleased(described: &semver::Version, stamp: &str) -> Result<String> {
    let Some(next_patch) = described.patch.checked_add(1) else {
        bail!("patch version of `{described}` cannot be incremented");
    };
    let composed = format!(
        "{}.{}.{next_patch}+{}{}",
        described.major,
        described.minor,
        commits_since_tag(described),
        stamp
    );
    semver::Version::parse(&composed)
        .with_context(|| format!("`{composed}` is not a semantic version"))?;
    pep440_rs::Version::from_str(&composed)
        .map_err(|err| anyhow!("`{composed}` is not a PEP 440 version: {err}"))?;
    Ok(composed)
}

pub(crate) fn format_timestamp(now: OffsetDateTime) -> Result<String> {
    let format = format_description!("[year][month][day][hour][minute][second]");
    now.format(&format).context("formatting build timestamp")
}

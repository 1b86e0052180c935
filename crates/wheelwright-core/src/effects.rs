use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use time::OffsetDateTime;
use tracing::debug;

use crate::config::Config;
use crate::process::{run_command, run_command_silent, run_command_streaming, RunOutput};
use crate::project::{find_project_root, is_git_checkout};

pub trait ProjectLocator {
    fn find_project_root(&self) -> Result<PathBuf>;
}

pub trait GitClient {
    /// Whether `root` carries git metadata at all.
    fn is_repository(&self, root: &Path) -> bool;
    /// Raw `git describe --tags` for the checkout at `root`.
    fn describe_tags(&self, root: &Path) -> Result<RunOutput>;
}

pub trait PackagingTool {
    /// Build one dependency-free wheel for `source` into `out_dir`.
    fn build_wheel(&self, source: &Path, out_dir: &Path, verbose: bool) -> Result<RunOutput>;
}

pub trait Clock {
    fn now_local(&self) -> OffsetDateTime;
}

pub trait Effects {
    fn locator(&self) -> &dyn ProjectLocator;
    fn git(&self) -> &dyn GitClient;
    fn packager(&self) -> &dyn PackagingTool;
    fn clock(&self) -> &dyn Clock;
}

pub struct SystemEffects {
    locator: SystemProjectLocator,
    git: SystemGit,
    packager: PipWheel,
    clock: SystemClock,
}

impl SystemEffects {
    /// Production collaborators; project discovery starts at `start_dir`.
    #[must_use]
    pub fn new(config: &Config, start_dir: PathBuf) -> Self {
        Self {
            locator: SystemProjectLocator { start: start_dir },
            git: SystemGit,
            packager: PipWheel {
                python: config.build().python.clone(),
            },
            clock: SystemClock,
        }
    }
}

impl Effects for SystemEffects {
    fn locator(&self) -> &dyn ProjectLocator {
        &self.locator
    }

    fn git(&self) -> &dyn GitClient {
        &self.git
    }

    fn packager(&self) -> &dyn PackagingTool {
        &self.packager
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }
}

struct SystemProjectLocator {
    start: PathBuf,
}

impl ProjectLocator for SystemProjectLocator {
    fn find_project_root(&self) -> Result<PathBuf> {
        find_project_root(&self.start)
    }
}

struct SystemGit;

impl GitClient for SystemGit {
    fn is_repository(&self, root: &Path) -> bool {
        is_git_checkout(root)
    }

    fn describe_tags(&self, root: &Path) -> Result<RunOutput> {
        run_command("git", &["describe".to_string(), "--tags".to_string()], root)
    }
}

struct PipWheel {
    python: Option<String>,
}

impl PipWheel {
    fn interpreter(&self) -> Result<String> {
        if let Some(explicit) = &self.python {
            return Ok(explicit.clone());
        }
        for candidate in ["python3", "python"] {
            if let Ok(path) = which::which(candidate) {
                return Ok(path.to_string_lossy().into_owned());
            }
        }
        bail!("no python interpreter found; set WHEELWRIGHT_PYTHON");
    }
}

impl PackagingTool for PipWheel {
    fn build_wheel(&self, source: &Path, out_dir: &Path, verbose: bool) -> Result<RunOutput> {
        let python = self.interpreter()?;
        let args = pip_wheel_args(source, out_dir);
        debug!(python = %python, args = ?args, "invoking pip wheel");
        if verbose {
            run_command_streaming(&python, &args, source)
        } else {
            run_command_silent(&python, &args, source)
        }
    }
}

fn pip_wheel_args(source: &Path, out_dir: &Path) -> Vec<String> {
    vec![
        "-m".to_string(),
        "pip".to_string(),
        "wheel".to_string(),
        "--no-deps".to_string(),
        "--wheel-dir".to_string(),
        out_dir.to_string_lossy().into_owned(),
        source.to_string_lossy().into_owned(),
    ]
}

struct SystemClock;

impl Clock for SystemClock {
    fn now_local(&self) -> OffsetDateTime {
        OffsetDateTime::now_local().unwrap_or_else(|_| {
            debug!("local UTC offset unavailable; timestamping in UTC");
            OffsetDateTime::now_utc()
        })
    }
}

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::artifacts::WheelSummary;
use crate::build::WheelBuilder;
use crate::config::DEFAULT_GITHUB_ORG;
use crate::effects::Effects;
use crate::fs::ScratchDir;
use crate::install::InstallState;
use crate::upload::{self, RemoteStorage, RemoteTarget};
use crate::version::{ProjectVersion, VersionResolver};

const SCRATCH_PREFIX: &str = "wheelwright-";

#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub verbose: bool,
    pub github_org: String,
    /// Relative to the project root; defaults to the product's `__about__.py`.
    pub version_marker: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            github_org: DEFAULT_GITHUB_ORG.to_string(),
            version_marker: None,
        }
    }
}

/// Builds the installer's wheel and hands out scoped access to it.
pub struct Wheels {
    effects: Arc<dyn Effects>,
    storage: Arc<dyn RemoteStorage>,
    install_state: InstallState,
    options: BuildOptions,
    resolver: VersionResolver,
}

impl Wheels {
    pub fn new(
        effects: Arc<dyn Effects>,
        storage: Arc<dyn RemoteStorage>,
        install_state: InstallState,
        released_version: impl Into<String>,
        options: BuildOptions,
    ) -> Self {
        let resolver = VersionResolver::new(
            Arc::clone(&effects),
            released_version,
            install_state.product(),
            options.github_org.clone(),
        );
        Self {
            effects,
            storage,
            install_state,
            options,
            resolver,
        }
    }

    /// Current version of the project.
    ///
    /// # Errors
    /// See [`VersionResolver::resolve`].
    pub fn version(&self) -> Result<&ProjectVersion> {
        self.resolver.resolve()
    }

    /// Build the wheel in a fresh temporary directory.
    ///
    /// The directory lives exactly as long as the returned [`BuiltWheel`]; it
    /// is also removed when the build fails.
    ///
    /// # Errors
    /// Propagates version, build and I/O errors.
    pub fn build(&self) -> Result<BuiltWheel<'_>> {
        let scratch = ScratchDir::new(SCRATCH_PREFIX)?;
        let version = self.version()?.clone();
        let project_root = self
            .effects
            .locator()
            .find_project_root()
            .context("locating project root")?;
        let marker = self
            .options
            .version_marker
            .clone()
            .unwrap_or_else(|| self.install_state.version_marker());
        let builder = WheelBuilder::new(self.effects.as_ref(), &marker, self.options.verbose);
        let local_wheel = builder.build(&project_root, scratch.path(), &version)?;
        let wheel_name = local_wheel
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = RemoteTarget::for_wheel(self.install_state.install_folder(), &wheel_name);
        debug!(
            wheel = %local_wheel.display(),
            remote = %target.path(),
            "built wheel"
        );
        Ok(BuiltWheel {
            storage: self.storage.as_ref(),
            version,
            local_wheel,
            target,
            scratch,
        })
    }
}

/// A wheel built into a temporary directory that is deleted on drop.
pub struct BuiltWheel<'w> {
    storage: &'w dyn RemoteStorage,
    version: ProjectVersion,
    local_wheel: PathBuf,
    target: RemoteTarget,
    // Declared last so it is dropped after everything that points into it.
    scratch: ScratchDir,
}

impl fmt::Debug for BuiltWheel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltWheel")
            .field("version", &self.version)
            .field("local_wheel", &self.local_wheel)
            .field("target", &self.target)
            .field("scratch", &self.scratch)
            .finish_non_exhaustive()
    }
}

impl BuiltWheel<'_> {
    #[must_use]
    pub fn version(&self) -> &ProjectVersion {
        &self.version
    }

    #[must_use]
    pub fn local_wheel(&self) -> &Path {
        &self.local_wheel
    }

    /// `<install folder>/wheels/<wheel file name>`
    #[must_use]
    pub fn remote_wheel(&self) -> &str {
        self.target.path()
    }

    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// # Errors
    /// Returns an error if the wheel cannot be read.
    pub fn summary(&self) -> Result<WheelSummary> {
        WheelSummary::describe(&self.local_wheel)
    }

    /// # Errors
    /// See [`upload::upload_to_dbfs`].
    pub fn upload_to_dbfs(&self) -> Result<String> {
        upload::upload_to_dbfs(self.storage, &self.local_wheel, &self.target)
    }

    /// # Errors
    /// See [`upload::upload_to_wsfs`].
    pub fn upload_to_wsfs(&self) -> Result<String> {
        upload::upload_to_wsfs(self.storage, &self.local_wheel, &self.target)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::io::Read;

    use anyhow::bail;
    use time::OffsetDateTime;

    use super::*;
    use crate::effects::{Clock, GitClient, PackagingTool, ProjectLocator};
    use crate::error::BuildError;
    use crate::process::RunOutput;
    use crate::upload::{DbfsApi, ImportFormat, WorkspaceApi};

    struct FakeEffects {
        root: PathBuf,
        fail_build: bool,
        out_dirs: RefCell<Vec<PathBuf>>,
    }

    impl ProjectLocator for FakeEffects {
        fn find_project_root(&self) -> Result<PathBuf> {
            Ok(self.root.clone())
        }
    }

    impl GitClient for FakeEffects {
        fn is_repository(&self, root: &Path) -> bool {
            root.join(".git").join("config").exists()
        }

        fn describe_tags(&self, _root: &Path) -> Result<RunOutput> {
            Ok(RunOutput {
                code: 0,
                stdout: "v0.3.0-2-g0123abc\n".to_string(),
                stderr: String::new(),
            })
        }
    }

    impl PackagingTool for FakeEffects {
        fn build_wheel(&self, source: &Path, out_dir: &Path, _verbose: bool) -> Result<RunOutput> {
            self.out_dirs.borrow_mut().push(out_dir.to_path_buf());
            if self.fail_build {
                return Ok(RunOutput {
                    code: 1,
                    ..RunOutput::default()
                });
            }
            let marker = fs::read_to_string(source.join("src/databricks/labs/demo/__about__.py"))?;
            let version = marker
                .trim()
                .trim_start_matches("__version__ = \"")
                .trim_end_matches('"')
                .to_string();
            fs::write(out_dir.join(format!("demo-{version}-py3-none-any.whl")), b"PK\x03\x04")?;
            Ok(RunOutput::default())
        }
    }

    impl Clock for FakeEffects {
        fn now_local(&self) -> OffsetDateTime {
            OffsetDateTime::UNIX_EPOCH
        }
    }

    impl Effects for FakeEffects {
        fn locator(&self) -> &dyn ProjectLocator {
            self
        }

        fn git(&self) -> &dyn GitClient {
            self
        }

        fn packager(&self) -> &dyn PackagingTool {
            self
        }

        fn clock(&self) -> &dyn Clock {
            self
        }
    }

    #[derive(Default)]
    struct RecordingStorage {
        mkdirs: RefCell<Vec<String>>,
        uploads: RefCell<Vec<(String, usize, Option<ImportFormat>)>>,
        fail_uploads: bool,
    }

    impl DbfsApi for RecordingStorage {
        fn mkdirs(&self, path: &str) -> Result<()> {
            self.mkdirs.borrow_mut().push(format!("dbfs:{path}"));
            Ok(())
        }

        fn upload(&self, path: &str, contents: &mut dyn Read, overwrite: bool) -> Result<()> {
            assert!(overwrite, "wheel uploads always overwrite");
            if self.fail_uploads {
                bail!("RESOURCE_DOES_NOT_EXIST: no access");
            }
            let mut bytes = Vec::new();
            contents.read_to_end(&mut bytes)?;
            self.uploads
                .borrow_mut()
                .push((format!("dbfs:{path}"), bytes.len(), None));
            Ok(())
        }
    }

    impl WorkspaceApi for RecordingStorage {
        fn mkdirs(&self, path: &str) -> Result<()> {
            self.mkdirs.borrow_mut().push(format!("ws:{path}"));
            Ok(())
        }

        fn upload(
            &self,
            path: &str,
            contents: &mut dyn Read,
            overwrite: bool,
            format: ImportFormat,
        ) -> Result<()> {
            assert!(overwrite, "wheel uploads always overwrite");
            let mut bytes = Vec::new();
            contents.read_to_end(&mut bytes)?;
            self.uploads
                .borrow_mut()
                .push((format!("ws:{path}"), bytes.len(), Some(format)));
            Ok(())
        }
    }

    impl RemoteStorage for RecordingStorage {
        fn dbfs(&self) -> &dyn DbfsApi {
            self
        }

        fn workspace(&self) -> &dyn WorkspaceApi {
            self
        }
    }

    fn sample_project(root: &Path, git: bool) -> Result<()> {
        fs::create_dir_all(root.join("src/databricks/labs/demo"))?;
        fs::write(root.join("pyproject.toml"), "[project]\nname = \"demo\"\n")?;
        fs::write(
            root.join("src/databricks/labs/demo/__about__.py"),
            "__version__ = \"0.3.0\"",
        )?;
        if git {
            fs::create_dir_all(root.join(".git"))?;
            fs::write(root.join(".git/config"), "[core]\n")?;
        }
        Ok(())
    }

    fn wheels(
        root: &Path,
        fail_build: bool,
        storage: &Arc<RecordingStorage>,
    ) -> (Arc<FakeEffects>, Wheels) {
        let effects = Arc::new(FakeEffects {
            root: root.to_path_buf(),
            fail_build,
            out_dirs: RefCell::new(Vec::new()),
        });
        let wheels = Wheels::new(
            Arc::clone(&effects) as Arc<dyn Effects>,
            Arc::clone(storage) as Arc<dyn RemoteStorage>,
            InstallState::new("demo", "/Users/me@example.com/.demo"),
            "0.3.0",
            BuildOptions::default(),
        );
        (effects, wheels)
    }

    #[test]
    fn released_build_uploads_to_both_targets_repeatedly() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        sample_project(tmp.path(), false)?;
        let storage = Arc::new(RecordingStorage::default());
        let (_effects, wheels) = wheels(tmp.path(), false, &storage);

        assert_eq!(wheels.version()?.as_str(), "0.3.0");
        let scratch;
        {
            let built = wheels.build()?;
            scratch = built.scratch_dir().to_path_buf();
            assert!(built.local_wheel().starts_with(&scratch));
            let expected = "/Users/me@example.com/.demo/wheels/demo-0.3.0-py3-none-any.whl";
            assert_eq!(built.remote_wheel(), expected);
            assert_eq!(built.upload_to_dbfs()?, expected);
            assert_eq!(built.upload_to_dbfs()?, expected);
            assert_eq!(built.upload_to_wsfs()?, expected);
            assert_eq!(built.upload_to_wsfs()?, expected);
            assert_eq!(built.summary()?.bytes, 4);
        }
        assert!(!scratch.exists(), "temporary directory must be removed");

        let mkdirs = storage.mkdirs.borrow();
        assert_eq!(
            mkdirs.as_slice(),
            [
                "dbfs:/Users/me@example.com/.demo/wheels",
                "dbfs:/Users/me@example.com/.demo/wheels",
                "ws:/Users/me@example.com/.demo/wheels",
                "ws:/Users/me@example.com/.demo/wheels",
            ]
        );
        let uploads = storage.uploads.borrow();
        assert_eq!(uploads.len(), 4);
        assert!(uploads.iter().all(|(_, bytes, _)| *bytes == 4));
        assert_eq!(uploads[2].2, Some(ImportFormat::Auto));
        assert_eq!(uploads[0].2, None);
        Ok(())
    }

    #[test]
    fn unreleased_build_names_wheel_after_patched_version() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        sample_project(tmp.path(), true)?;
        let storage = Arc::new(RecordingStorage::default());
        let (_effects, wheels) = wheels(tmp.path(), false, &storage);

        let built = wheels.build()?;
        assert_eq!(built.version().as_str(), "0.3.1+219700101000000");
        assert!(built
            .remote_wheel()
            .ends_with("/wheels/demo-0.3.1+219700101000000-py3-none-any.whl"));
        assert_eq!(
            fs::read_to_string(tmp.path().join("src/databricks/labs/demo/__about__.py"))?,
            "__version__ = \"0.3.0\""
        );
        Ok(())
    }

    #[test]
    fn scratch_dir_is_removed_when_the_scope_fails() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        sample_project(tmp.path(), false)?;
        let storage = Arc::new(RecordingStorage {
            fail_uploads: true,
            ..RecordingStorage::default()
        });
        let (_effects, wheels) = wheels(tmp.path(), false, &storage);

        let mut scratch = PathBuf::new();
        let outcome = (|| -> Result<String> {
            let built = wheels.build()?;
            scratch = built.scratch_dir().to_path_buf();
            built.upload_to_dbfs()
        })();

        let err = outcome.expect_err("upload failure propagates");
        assert!(format!("{err:#}").contains("RESOURCE_DOES_NOT_EXIST"));
        assert!(!scratch.as_os_str().is_empty());
        assert!(!scratch.exists(), "temporary directory must be removed");
        Ok(())
    }

    #[test]
    fn scratch_dir_is_removed_when_the_build_fails() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        sample_project(tmp.path(), false)?;
        let storage = Arc::new(RecordingStorage::default());
        let (effects, wheels) = wheels(tmp.path(), true, &storage);

        let err = wheels.build().expect_err("build failure propagates");
        assert!(err.downcast_ref::<BuildError>().is_some());
        let out_dirs = effects.out_dirs.borrow();
        assert_eq!(out_dirs.len(), 1);
        assert!(!out_dirs[0].exists(), "temporary directory must be removed");
        assert!(storage.mkdirs.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn explicit_version_marker_overrides_default() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        sample_project(tmp.path(), true)?;
        fs::write(tmp.path().join("version.py"), "__version__ = \"0.0.0\"")?;
        let effects = Arc::new(FakeEffects {
            root: tmp.path().to_path_buf(),
            fail_build: false,
            out_dirs: RefCell::new(Vec::new()),
        });
        let wheels = Wheels::new(
            Arc::clone(&effects) as Arc<dyn Effects>,
            Arc::new(RecordingStorage::default()) as Arc<dyn RemoteStorage>,
            InstallState::global("demo"),
            "0.3.0",
            BuildOptions {
                version_marker: Some(PathBuf::from("version.py")),
                ..BuildOptions::default()
            },
        );

        let built = wheels.build()?;
        let copy = built.scratch_dir().join("working-copy");
        assert_eq!(
            fs::read_to_string(copy.join("version.py"))?,
            "__version__ = \"0.3.1+219700101000000\""
        );
        // The fake packager reads the default marker, which the copy left as is.
        assert!(built.local_wheel().ends_with("demo-0.3.0-py3-none-any.whl"));
        Ok(())
    }

    #[test]
    fn absolute_version_marker_never_touches_the_checkout() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        sample_project(tmp.path(), true)?;
        let original = tmp.path().join("src/databricks/labs/demo/__about__.py");
        let effects = Arc::new(FakeEffects {
            root: tmp.path().to_path_buf(),
            fail_build: false,
            out_dirs: RefCell::new(Vec::new()),
        });
        let wheels = Wheels::new(
            Arc::clone(&effects) as Arc<dyn Effects>,
            Arc::new(RecordingStorage::default()) as Arc<dyn RemoteStorage>,
            InstallState::global("demo"),
            "0.3.0",
            BuildOptions {
                version_marker: Some(original.clone()),
                ..BuildOptions::default()
            },
        );

        let err = wheels.build().expect_err("absolute marker must be rejected");
        assert!(err.to_string().contains("must be a relative path"));
        assert_eq!(fs::read_to_string(&original)?, "__version__ = \"0.3.0\"");
        assert!(effects.out_dirs.borrow().is_empty());
        Ok(())
    }
}

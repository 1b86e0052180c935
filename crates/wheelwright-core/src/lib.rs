#![deny(clippy::all)]

mod artifacts;
mod build;
mod config;
mod effects;
mod error;
mod fs;
mod install;
mod lifecycle;
mod process;
mod project;
mod storage;
mod upload;
mod version;

pub use crate::artifacts::WheelSummary;
pub use crate::build::WheelBuilder;
pub use crate::config::{BuildConfig, Config, DatabricksConfig, EnvSnapshot, DEFAULT_GITHUB_ORG};
pub use crate::effects::{
    Clock, Effects, GitClient, PackagingTool, ProjectLocator, SystemEffects,
};
pub use crate::error::{BuildError, VersionError};
pub use crate::install::InstallState;
pub use crate::lifecycle::{BuildOptions, BuiltWheel, Wheels};
pub use crate::process::RunOutput;
pub use crate::project::find_project_root;
pub use crate::storage::HttpStorageClient;
pub use crate::upload::{
    upload_to_dbfs, upload_to_wsfs, DbfsApi, ImportFormat, RemoteStorage, RemoteTarget,
    WorkspaceApi,
};
pub use crate::version::{ProjectVersion, VersionResolver};

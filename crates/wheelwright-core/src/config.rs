use std::collections::HashMap;
use std::env;

pub const DEFAULT_GITHUB_ORG: &str = "databrickslabs";

#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    /// Snapshot built from explicit pairs instead of the process environment.
    #[must_use]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        matches!(
            self.var(key).map(str::to_ascii_lowercase).as_deref(),
            Some("1" | "true" | "yes" | "on")
        )
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) build: BuildConfig,
    pub(crate) databricks: DatabricksConfig,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    #[must_use]
    pub fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        Self {
            build: BuildConfig {
                python: snapshot.var("WHEELWRIGHT_PYTHON").map(ToOwned::to_owned),
                github_org: snapshot
                    .var("WHEELWRIGHT_GITHUB_ORG")
                    .unwrap_or(DEFAULT_GITHUB_ORG)
                    .to_string(),
                verbose: snapshot.flag_is_enabled("WHEELWRIGHT_VERBOSE"),
            },
            databricks: DatabricksConfig {
                host: snapshot
                    .var("DATABRICKS_HOST")
                    .map(|host| host.trim_end_matches('/').to_string()),
                token: snapshot.var("DATABRICKS_TOKEN").map(ToOwned::to_owned),
            },
        }
    }

    #[must_use]
    pub fn build(&self) -> &BuildConfig {
        &self.build
    }

    #[must_use]
    pub fn databricks(&self) -> &DatabricksConfig {
        &self.databricks
    }

    /// Stream packaging tool output regardless of the environment.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.build.verbose = verbose;
    }
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub python: Option<String>,
    pub github_org: String,
    pub verbose: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DatabricksConfig {
    pub host: Option<String>,
    pub token: Option<String>,
}

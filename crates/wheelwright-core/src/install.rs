use std::path::PathBuf;

/// Where an installer places a product on the remote workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallState {
    product: String,
    install_folder: String,
}

impl InstallState {
    pub fn new(product: impl Into<String>, install_folder: impl Into<String>) -> Self {
        let install_folder = install_folder.into();
        let trimmed = install_folder.trim_end_matches('/');
        Self {
            product: product.into(),
            install_folder: if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            },
        }
    }

    /// Per-user install under `/Users/<user>/.<product>`.
    pub fn user(product: impl Into<String>, user_name: &str) -> Self {
        let product = product.into();
        let folder = format!("/Users/{user_name}/.{product}");
        Self::new(product, folder)
    }

    /// Shared install under `/Applications/<product>`.
    pub fn global(product: impl Into<String>) -> Self {
        let product = product.into();
        let folder = format!("/Applications/{product}");
        Self::new(product, folder)
    }

    #[must_use]
    pub fn product(&self) -> &str {
        &self.product
    }

    #[must_use]
    pub fn install_folder(&self) -> &str {
        &self.install_folder
    }

    /// In-tree module holding `__version__`, relative to the project root.
    #[must_use]
    pub fn version_marker(&self) -> PathBuf {
        PathBuf::from("src")
            .join("databricks")
            .join("labs")
            .join(&self.product)
            .join("__about__.py")
    }
}

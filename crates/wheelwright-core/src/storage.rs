//! REST client for the two remote stores a wheel can land in.

use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::DatabricksConfig;
use crate::upload::{DbfsApi, ImportFormat, RemoteStorage, WorkspaceApi};

const DBFS_BLOCK_BYTES: u64 = 1024 * 1024;

pub struct HttpStorageClient {
    dbfs: HttpDbfs,
    workspace: HttpWorkspace,
}

impl HttpStorageClient {
    /// Client for the configured host. Missing credentials surface on first use.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &DatabricksConfig) -> Result<Self> {
        let api = ApiClient {
            client: build_http_client()?,
            host: config.host.clone(),
            token: config.token.clone(),
        };
        Ok(Self {
            dbfs: HttpDbfs { api: api.clone() },
            workspace: HttpWorkspace { api },
        })
    }
}

impl RemoteStorage for HttpStorageClient {
    fn dbfs(&self) -> &dyn DbfsApi {
        &self.dbfs
    }

    fn workspace(&self) -> &dyn WorkspaceApi {
        &self.workspace
    }
}

fn build_http_client() -> Result<Client> {
    Client::builder()
        .user_agent(format!("wheelwright/{}", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to build HTTP client")
}

#[derive(Clone)]
struct ApiClient {
    client: Client,
    host: Option<String>,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error_code: Option<String>,
    message: Option<String>,
}

impl ApiClient {
    fn post<B: Serialize, R: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<R> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| anyhow!("DATABRICKS_HOST is not set"))?;
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("DATABRICKS_TOKEN is not set"))?;
        let url = format!("{host}{endpoint}");
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .with_context(|| format!("request to {endpoint} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let detail = match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(ApiErrorBody {
                    error_code: Some(code),
                    message,
                }) => format!("{code}: {}", message.unwrap_or_default()),
                Ok(ApiErrorBody {
                    message: Some(message),
                    ..
                }) => message,
                _ => text,
            };
            bail!("{endpoint} returned {status}: {detail}");
        }
        response
            .json::<R>()
            .with_context(|| format!("decoding response from {endpoint}"))
    }
}

#[derive(Deserialize)]
struct Empty {}

struct HttpDbfs {
    api: ApiClient,
}

#[derive(Deserialize)]
struct CreateHandle {
    handle: i64,
}

impl DbfsApi for HttpDbfs {
    fn mkdirs(&self, path: &str) -> Result<()> {
        self.api
            .post::<_, Empty>("/api/2.0/dbfs/mkdirs", &json!({ "path": path }))?;
        Ok(())
    }

    fn upload(&self, path: &str, contents: &mut dyn Read, overwrite: bool) -> Result<()> {
        let CreateHandle { handle } = self.api.post(
            "/api/2.0/dbfs/create",
            &json!({ "path": path, "overwrite": overwrite }),
        )?;
        if let Err(err) = self.add_blocks(handle, path, contents) {
            // The stream is abandoned; still release the handle on the server.
            if let Err(close_err) = self.close(handle) {
                warn!(
                    handle,
                    path,
                    error = %format!("{close_err:#}"),
                    "failed to close dbfs handle after an interrupted upload"
                );
            }
            return Err(err);
        }
        self.close(handle)
    }
}

impl HttpDbfs {
    fn add_blocks(&self, handle: i64, path: &str, contents: &mut dyn Read) -> Result<()> {
        let mut block = Vec::new();
        loop {
            block.clear();
            (&mut *contents)
                .take(DBFS_BLOCK_BYTES)
                .read_to_end(&mut block)
                .with_context(|| format!("reading content for {path}"))?;
            if block.is_empty() {
                return Ok(());
            }
            self.api.post::<_, Empty>(
                "/api/2.0/dbfs/add-block",
                &json!({ "handle": handle, "data": STANDARD.encode(&block) }),
            )?;
        }
    }

    fn close(&self, handle: i64) -> Result<()> {
        self.api
            .post::<_, Empty>("/api/2.0/dbfs/close", &json!({ "handle": handle }))?;
        Ok(())
    }
}

struct HttpWorkspace {
    api: ApiClient,
}

impl WorkspaceApi for HttpWorkspace {
    fn mkdirs(&self, path: &str) -> Result<()> {
        self.api
            .post::<_, Empty>("/api/2.0/workspace/mkdirs", &json!({ "path": path }))?;
        Ok(())
    }

    fn upload(
        &self,
        path: &str,
        contents: &mut dyn Read,
        overwrite: bool,
        format: ImportFormat,
    ) -> Result<()> {
        let mut bytes = Vec::new();
        contents
            .read_to_end(&mut bytes)
            .with_context(|| format!("reading content for {path}"))?;
        self.api.post::<_, Empty>(
            "/api/2.0/workspace/import",
            &json!({
                "path": path,
                "format": format,
                "overwrite": overwrite,
                "content": STANDARD.encode(&bytes),
            }),
        )?;
        Ok(())
    }
}

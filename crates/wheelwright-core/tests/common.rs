#![allow(dead_code)]

use std::io::{self, Read};

use anyhow::Result;
use wheelwright_core::{DbfsApi, ImportFormat, RemoteStorage, WorkspaceApi};

/// Accepts every upload and drains the content.
pub struct DiscardingStorage;

impl DbfsApi for DiscardingStorage {
    fn mkdirs(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn upload(&self, _path: &str, contents: &mut dyn Read, _overwrite: bool) -> Result<()> {
        io::copy(contents, &mut io::sink())?;
        Ok(())
    }
}

impl WorkspaceApi for DiscardingStorage {
    fn mkdirs(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn upload(
        &self,
        _path: &str,
        contents: &mut dyn Read,
        _overwrite: bool,
        _format: ImportFormat,
    ) -> Result<()> {
        io::copy(contents, &mut io::sink())?;
        Ok(())
    }
}

impl RemoteStorage for DiscardingStorage {
    fn dbfs(&self) -> &dyn DbfsApi {
        self
    }

    fn workspace(&self) -> &dyn WorkspaceApi {
        self
    }
}

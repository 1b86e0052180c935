use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, Serialize)]
pub struct WheelSummary {
    pub file_name: String,
    pub bytes: u64,
    pub sha256: String,
}

impl WheelSummary {
    pub(crate) fn describe(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("invalid wheel path {}", path.display()))?
            .to_string();
        let bytes = fs::metadata(path)
            .with_context(|| format!("metadata for {}", path.display()))?
            .len();
        Ok(Self {
            file_name,
            bytes,
            sha256: compute_file_sha256(path)?,
        })
    }

    /// `demo.whl (1.5 KB, sha256=0123456789ab…)`
    #[must_use]
    pub fn label(&self) -> String {
        let sha_short: String = self.sha256.chars().take(12).collect();
        format!(
            "{} ({}, sha256={sha_short}…)",
            self.file_name,
            format_bytes(self.bytes)
        )
    }
}

pub(crate) fn compute_file_sha256(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    fn format_scaled(value: u64, unit: u64, suffix: &str) -> String {
        let whole = value / unit;
        let remainder = value % unit;
        let tenths = (remainder * 10) / unit;
        format!("{whole}.{tenths} {suffix}")
    }

    if bytes >= MB {
        format_scaled(bytes, MB, "MB")
    } else if bytes >= KB {
        format_scaled(bytes, KB, "KB")
    } else {
        format!("{bytes} B")
    }
}

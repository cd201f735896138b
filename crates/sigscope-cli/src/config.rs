//! Optional TOML configuration for the CLI.
//!
//! ```toml
//! process_name = "RobloxPlayerBeta.exe"
//! poll_interval_ms = 250
//! cache_path = "offsets-cache.json"
//!
//! [scan]
//! main_module_only = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use sigscope_core::{DetectorConfig, ReadLimits, ScanOptions, SignatureTable};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub process_name: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub error_backoff_ms: Option<u64>,
    pub cache_path: Option<PathBuf>,
    pub signatures: Option<PathBuf>,
    pub limits: Option<ReadLimits>,
    pub scan: Option<ScanOptions>,
}

impl CliConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        let mut builder = DetectorConfig::builder();
        if let Some(name) = &self.process_name {
            builder = builder.process_name(name.clone());
        }
        if let Some(ms) = self.poll_interval_ms {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.error_backoff_ms {
            builder = builder.error_backoff(Duration::from_millis(ms));
        }
        if let Some(limits) = self.limits {
            builder = builder.limits(limits);
        }
        if let Some(scan) = self.scan {
            builder = builder.scan(scan);
        }
        if let Some(path) = &self.cache_path {
            builder = builder.cache_path(path.clone());
        }
        builder.build()
    }

    /// The configured signature table, or the builtin one
    pub fn signature_table(&self) -> Result<SignatureTable> {
        match &self.signatures {
            Some(path) => sigscope_core::load_signatures(path)
                .with_context(|| format!("Failed to load signatures from {}", path.display())),
            None => Ok(sigscope_core::builtin_signatures()?),
        }
    }
}

//! Detector configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::memory::ReadLimits;

pub mod timing {
    /// Interval between detector ticks (ms)
    pub const POLL_INTERVAL_MS: u64 = 500;

    /// Delay after a failed or panicking tick (ms)
    pub const ERROR_BACKOFF_MS: u64 = 1000;
}

pub const DEFAULT_PROCESS_NAME: &str = "RobloxPlayerBeta.exe";

/// Bounds on how much target memory a resolution may copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Size of each read while snapshotting a region
    pub chunk_size: usize,
    /// Total bytes copied across all regions
    pub max_scan_bytes: usize,
    /// Restrict the scan to regions of the main module
    pub main_module_only: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            max_scan_bytes: 256 * 1024 * 1024,
            main_module_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Executable name of the target
    pub process_name: String,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub limits: ReadLimits,
    pub scan: ScanOptions,
    /// Where resolved offsets are cached between runs, if anywhere
    pub cache_path: Option<PathBuf>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            poll_interval: Duration::from_millis(timing::POLL_INTERVAL_MS),
            error_backoff: Duration::from_millis(timing::ERROR_BACKOFF_MS),
            limits: ReadLimits::default(),
            scan: ScanOptions::default(),
            cache_path: None,
        }
    }
}

impl DetectorConfig {
    pub fn builder() -> DetectorConfigBuilder {
        DetectorConfigBuilder::default()
    }
}

/// Builder for DetectorConfig
#[derive(Debug, Clone, Default)]
pub struct DetectorConfigBuilder {
    process_name: Option<String>,
    poll_interval: Option<Duration>,
    error_backoff: Option<Duration>,
    limits: Option<ReadLimits>,
    scan: Option<ScanOptions>,
    cache_path: Option<PathBuf>,
}

impl DetectorConfigBuilder {
    pub fn process_name<S: Into<String>>(mut self, name: S) -> Self {
        self.process_name = Some(name.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = Some(backoff);
        self
    }

    pub fn limits(mut self, limits: ReadLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn scan(mut self, scan: ScanOptions) -> Self {
        self.scan = Some(scan);
        self
    }

    pub fn cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn build(self) -> DetectorConfig {
        let default = DetectorConfig::default();
        DetectorConfig {
            process_name: self.process_name.unwrap_or(default.process_name),
            // a zero interval would spin the poller
            poll_interval: self
                .poll_interval
                .filter(|d| !d.is_zero())
                .unwrap_or(default.poll_interval),
            error_backoff: self
                .error_backoff
                .filter(|d| !d.is_zero())
                .unwrap_or(default.error_backoff),
            limits: self.limits.unwrap_or(default.limits),
            scan: self.scan.unwrap_or(default.scan),
            cache_path: self.cache_path.or(default.cache_path),
        }
    }
}

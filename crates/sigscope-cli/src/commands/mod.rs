//! CLI command implementations.

pub mod hex_utils;
pub mod hexdump;
pub mod resolve;
pub mod scan;
pub mod signatures;
pub mod watch;

use anyhow::{Result, bail};
use sigscope_core::{MemoryAccessor, NativeProvider, ProcessProvider};

use crate::config::CliConfig;

/// Open the target by pid, or find it by the configured name
pub fn attach(config: &CliConfig, pid: Option<u32>) -> Result<MemoryAccessor> {
    let detector_config = config.detector_config();
    let provider = NativeProvider::new(detector_config.process_name.clone());
    provider.initialize()?;

    let process = match pid {
        Some(pid) => provider.open(pid)?,
        None => match provider.find()? {
            Some(process) => process,
            None => bail!("{} is not running", provider.process_name()),
        },
    };

    println!(
        "Attached to PID {} (base: {})",
        process.pid(),
        process.base_address()
    );
    Ok(MemoryAccessor::with_limits(process, detector_config.limits))
}

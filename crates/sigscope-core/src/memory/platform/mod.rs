//! OS-specific process backends.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::{find_pid, initialize, open};
#[cfg(target_os = "windows")]
pub use windows::{find_pid, initialize, open};

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
mod unsupported {
    use std::sync::Arc;

    use crate::error::{Error, InitializationError, Result};
    use crate::memory::ProcessMemory;

    pub fn initialize() -> std::result::Result<(), InitializationError> {
        Err(InitializationError(
            "no process backend for this platform".to_string(),
        ))
    }

    pub fn find_pid(_process_name: &str) -> Result<Option<u32>> {
        Ok(None)
    }

    pub fn open(pid: u32) -> Result<Arc<dyn ProcessMemory>> {
        Err(Error::ProcessOpenFailed(format!(
            "pid {}: unsupported platform",
            pid
        )))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub use unsupported::{find_pid, initialize, open};

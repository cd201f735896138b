//! Process capability traits.
//!
//! The engine never talks to the OS itself. A [`ProcessProvider`] finds the
//! target and hands out a [`ProcessMemory`] capability; everything above the
//! [`MemoryAccessor`](super::MemoryAccessor) works on bytes it was handed.

use std::sync::Arc;

use crate::error::{InitializationError, ReadFault, Result, WriteFault};
use crate::memory::{Address, MemoryRegion};

/// Raw read/write access to one incarnation of the target process.
pub trait ProcessMemory: Send + Sync {
    fn pid(&self) -> u32;

    /// Load address of the main module
    fn base_address(&self) -> Address;

    /// Mapped regions, in ascending address order
    fn regions(&self) -> std::result::Result<Vec<MemoryRegion>, ReadFault>;

    /// Whether this incarnation of the process is still running.
    ///
    /// Must return `false` once the process exited, even if the pid has since
    /// been reused by another process.
    fn is_alive(&self) -> bool;

    /// Fill `buf` from `address`. Either the whole buffer is read or an error
    /// is returned.
    fn read_raw(&self, address: Address, buf: &mut [u8]) -> std::result::Result<(), ReadFault>;

    fn write_raw(&self, address: Address, data: &[u8]) -> std::result::Result<(), WriteFault>;
}

/// Locates the target process.
pub trait ProcessProvider: Send + Sync {
    /// Set up the memory-access subsystem (privileges, procfs, ...).
    fn initialize(&self) -> std::result::Result<(), InitializationError>;

    /// Find and open the target, `Ok(None)` when it is not running
    fn find(&self) -> Result<Option<Arc<dyn ProcessMemory>>>;
}

/// Provider backed by the host OS, matching processes by executable name.
#[derive(Debug, Clone)]
pub struct NativeProvider {
    process_name: String,
}

impl NativeProvider {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Open a specific process by pid, bypassing name matching
    pub fn open(&self, pid: u32) -> Result<Arc<dyn ProcessMemory>> {
        super::platform::open(pid)
    }
}

impl ProcessProvider for NativeProvider {
    fn initialize(&self) -> std::result::Result<(), InitializationError> {
        super::platform::initialize()
    }

    fn find(&self) -> Result<Option<Arc<dyn ProcessMemory>>> {
        match super::platform::find_pid(&self.process_name)? {
            Some(pid) => super::platform::open(pid).map(Some),
            None => Ok(None),
        }
    }
}

/// Compare a running executable's name against the configured target name.
///
/// Case-insensitive, and tolerant of a missing `.exe` suffix on either side.
pub fn process_name_matches(candidate: &str, target: &str) -> bool {
    fn stem(name: &str) -> &str {
        let name = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
        match name.len().checked_sub(4) {
            Some(idx) if name.is_char_boundary(idx) && name[idx..].eq_ignore_ascii_case(".exe") => {
                &name[..idx]
            }
            _ => name,
        }
    }

    let candidate = stem(candidate.trim());
    let target = stem(target.trim());
    !target.is_empty() && candidate.eq_ignore_ascii_case(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_name_matches_exact() {
        assert!(process_name_matches("RobloxPlayerBeta.exe", "RobloxPlayerBeta.exe"));
        assert!(process_name_matches("robloxplayerbeta.EXE", "RobloxPlayerBeta.exe"));
    }

    #[test]
    fn test_process_name_matches_without_suffix() {
        assert!(process_name_matches("RobloxPlayerBeta", "RobloxPlayerBeta.exe"));
        assert!(process_name_matches("RobloxPlayerBeta.exe", "RobloxPlayerBeta"));
    }

    #[test]
    fn test_process_name_matches_path() {
        assert!(process_name_matches(
            r"C:\Games\Roblox\RobloxPlayerBeta.exe",
            "RobloxPlayerBeta.exe"
        ));
        assert!(process_name_matches("/opt/target/bin/target", "target"));
    }

    #[test]
    fn test_process_name_mismatch() {
        assert!(!process_name_matches("RobloxStudio.exe", "RobloxPlayerBeta.exe"));
        assert!(!process_name_matches("anything", ""));
    }
}

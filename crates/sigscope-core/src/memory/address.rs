//! Addresses in the target process.
//!
//! An [`Address`] is never dereferenced locally. The only place it is turned
//! into something the OS understands is [`Address::to_local`], which is
//! crate-private and used by the platform backends alone.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A location in the target process's address space.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Address(u64);

impl Address {
    pub const NULL: Address = Address(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, offset: u64) -> Option<Self> {
        self.0.checked_add(offset).map(Self)
    }

    pub fn checked_offset(self, offset: i64) -> Option<Self> {
        self.0.checked_add_signed(offset).map(Self)
    }

    /// Distance from `base` to `self`, if `self` is not below `base`
    pub fn offset_from(self, base: Address) -> Option<u64> {
        self.0.checked_sub(base.0)
    }

    pub(crate) fn to_local(self) -> LocalAddress {
        LocalAddress(self.0 as usize)
    }

    pub(crate) fn from_local(local: LocalAddress) -> Self {
        Self(local.0 as u64)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Backend-facing form of an [`Address`].
///
/// On Windows this becomes the `lpBaseAddress` pointer argument, on Linux the
/// file offset into `/proc/<pid>/mem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LocalAddress(usize);

impl LocalAddress {
    #[cfg(target_os = "windows")]
    pub(crate) fn from_ptr(ptr: *const std::ffi::c_void) -> Self {
        Self(ptr as usize)
    }

    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    pub(crate) fn as_ptr(self) -> *const std::ffi::c_void {
        self.0 as *const std::ffi::c_void
    }

    #[cfg_attr(target_os = "windows", allow(dead_code))]
    pub(crate) fn as_file_offset(self) -> u64 {
        self.0 as u64
    }
}

/// A mapped region of the target process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub start: Address,
    pub size: u64,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    /// Backing file or module name, if any
    pub path: Option<String>,
}

impl MemoryRegion {
    pub fn end(&self) -> Address {
        Address::new(self.start.value().saturating_add(self.size))
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.end()
    }
}

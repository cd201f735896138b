//! Win32 backend: Toolhelp snapshots for discovery, `ReadProcessMemory` /
//! `WriteProcessMemory` for I/O, `VirtualQueryEx` for the region map.

use std::ffi::c_void;
use std::mem::size_of;
use std::sync::Arc;

use tracing::debug;
use windows::Win32::Foundation::{CloseHandle, HANDLE, STILL_ACTIVE};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, PROCESSENTRY32W, Process32FirstW,
    Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE, PAGE_EXECUTE_READ,
    PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_GUARD, PAGE_NOACCESS, PAGE_READONLY,
    PAGE_READWRITE, PAGE_WRITECOPY, VirtualQueryEx,
};
use windows::Win32::System::Threading::{
    GetCurrentProcessId, GetExitCodeProcess, OpenProcess, PROCESS_QUERY_INFORMATION,
    PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

use crate::error::{Error, InitializationError, ReadFault, Result, WriteFault};
use crate::memory::address::LocalAddress;
use crate::memory::{Address, MemoryRegion, ProcessMemory, process_name_matches};

/// Highest user-mode address on x64 Windows
const USER_SPACE_END: u64 = 0x7FFF_FFFF_FFFF;

pub fn initialize() -> std::result::Result<(), InitializationError> {
    // SAFETY: querying our own pid with the least-privileged access right.
    let handle = unsafe {
        OpenProcess(
            PROCESS_QUERY_LIMITED_INFORMATION,
            false,
            GetCurrentProcessId(),
        )
    }
    .map_err(|e| InitializationError(format!("OpenProcess on self failed: {}", e)))?;

    // SAFETY: handle was returned by OpenProcess above.
    let _ = unsafe { CloseHandle(handle) };
    Ok(())
}

fn wide_to_string(buffer: &[u16]) -> String {
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..len])
}

pub fn find_pid(process_name: &str) -> Result<Option<u32>> {
    // SAFETY: snapshot handle is closed before returning.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
        .map_err(|e| Error::ProcessNotFound(format!("process snapshot failed: {}", e)))?;

    let mut entry = PROCESSENTRY32W {
        dwSize: size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    let mut found = None;
    // SAFETY: entry.dwSize is initialized as the API requires.
    let mut more = unsafe { Process32FirstW(snapshot, &mut entry) }.is_ok();
    while more {
        if process_name_matches(&wide_to_string(&entry.szExeFile), process_name) {
            found = Some(entry.th32ProcessID);
            break;
        }
        // SAFETY: same snapshot and entry as above.
        more = unsafe { Process32NextW(snapshot, &mut entry) }.is_ok();
    }

    // SAFETY: snapshot was returned by CreateToolhelp32Snapshot.
    let _ = unsafe { CloseHandle(snapshot) };
    Ok(found)
}

/// Base, image size and name of the executable module
fn main_module(pid: u32) -> Option<(Address, u64, String)> {
    // SAFETY: snapshot handle is closed before returning.
    let snapshot =
        unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }.ok()?;

    let mut entry = MODULEENTRY32W {
        dwSize: size_of::<MODULEENTRY32W>() as u32,
        ..Default::default()
    };
    // SAFETY: entry.dwSize is initialized; the first module is the executable.
    let base = unsafe { Module32FirstW(snapshot, &mut entry) }
        .ok()
        .map(|_| {
            (
                Address::from_local_ptr(entry.modBaseAddr as *const c_void),
                entry.modBaseSize as u64,
                wide_to_string(&entry.szModule),
            )
        });

    // SAFETY: snapshot was returned by CreateToolhelp32Snapshot.
    let _ = unsafe { CloseHandle(snapshot) };
    base
}

pub fn open(pid: u32) -> Result<Arc<dyn ProcessMemory>> {
    let access = PROCESS_VM_READ
        | PROCESS_VM_WRITE
        | PROCESS_VM_OPERATION
        | PROCESS_QUERY_INFORMATION;
    // SAFETY: the returned handle is owned by WindowsProcess and closed on drop.
    let handle = unsafe { OpenProcess(access, false, pid) }
        .map_err(|e| Error::ProcessOpenFailed(format!("pid {}: {}", pid, e)))?;

    let (base, module_size, module_name) =
        main_module(pid).unwrap_or((Address::NULL, 0, String::new()));
    debug!(
        "Opened pid {} ({}, base: {}, size: {:#x})",
        pid, module_name, base, module_size
    );

    Ok(Arc::new(WindowsProcess {
        pid,
        handle,
        base,
        module_size,
        module_name,
    }))
}

pub struct WindowsProcess {
    pid: u32,
    handle: HANDLE,
    base: Address,
    module_size: u64,
    module_name: String,
}

// SAFETY: process HANDLEs are process-wide and usable from any thread; all
// calls made through it are thread-safe Win32 APIs.
unsafe impl Send for WindowsProcess {}
unsafe impl Sync for WindowsProcess {}

impl Drop for WindowsProcess {
    fn drop(&mut self) {
        // SAFETY: handle came from OpenProcess and is closed exactly once.
        let _ = unsafe { CloseHandle(self.handle) };
    }
}

impl WindowsProcess {
    fn module_contains(&self, address: Address) -> bool {
        address
            .offset_from(self.base)
            .is_some_and(|offset| offset < self.module_size)
    }
}

fn is_readable(protect: u32) -> bool {
    let readable = PAGE_READONLY.0
        | PAGE_READWRITE.0
        | PAGE_WRITECOPY.0
        | PAGE_EXECUTE_READ.0
        | PAGE_EXECUTE_READWRITE.0
        | PAGE_EXECUTE_WRITECOPY.0;
    protect & readable != 0 && protect & (PAGE_GUARD.0 | PAGE_NOACCESS.0) == 0
}

impl ProcessMemory for WindowsProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn base_address(&self) -> Address {
        self.base
    }

    fn regions(&self) -> std::result::Result<Vec<MemoryRegion>, ReadFault> {
        let mut regions = Vec::new();
        let mut cursor: u64 = 0;

        while cursor < USER_SPACE_END {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            // SAFETY: info is a valid out-buffer of the size passed.
            let written = unsafe {
                VirtualQueryEx(
                    self.handle,
                    Some(Address::new(cursor).to_local().as_ptr()),
                    &mut info,
                    size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if written == 0 || info.RegionSize == 0 {
                break;
            }

            let start = Address::from_local_ptr(info.BaseAddress as *const c_void);
            let size = info.RegionSize as u64;
            let protect = info.Protect.0;

            if info.State == MEM_COMMIT {
                regions.push(MemoryRegion {
                    start,
                    size,
                    readable: is_readable(protect),
                    writable: protect
                        & (PAGE_READWRITE.0
                            | PAGE_WRITECOPY.0
                            | PAGE_EXECUTE_READWRITE.0
                            | PAGE_EXECUTE_WRITECOPY.0)
                        != 0,
                    executable: protect
                        & (PAGE_EXECUTE.0
                            | PAGE_EXECUTE_READ.0
                            | PAGE_EXECUTE_READWRITE.0
                            | PAGE_EXECUTE_WRITECOPY.0)
                        != 0,
                    path: self.module_contains(start).then(|| self.module_name.clone()),
                });
            }

            match start.value().checked_add(size) {
                Some(next) if next > cursor => cursor = next,
                _ => break,
            }
        }

        Ok(regions)
    }

    fn is_alive(&self) -> bool {
        let mut code = 0u32;
        // SAFETY: handle is valid for the lifetime of self.
        unsafe { GetExitCodeProcess(self.handle, &mut code) }.is_ok()
            && code == STILL_ACTIVE.0 as u32
    }

    fn read_raw(&self, address: Address, buf: &mut [u8]) -> std::result::Result<(), ReadFault> {
        let mut read = 0usize;
        // SAFETY: buf is a valid writable buffer of buf.len() bytes.
        unsafe {
            ReadProcessMemory(
                self.handle,
                address.to_local().as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                Some(&mut read as *mut usize),
            )
        }
        .map_err(|e| ReadFault::Os {
            address,
            len: buf.len(),
            message: e.to_string(),
        })?;

        if read != buf.len() {
            return Err(ReadFault::Partial {
                address,
                expected: buf.len(),
                actual: read,
            });
        }
        Ok(())
    }

    fn write_raw(&self, address: Address, data: &[u8]) -> std::result::Result<(), WriteFault> {
        let mut written = 0usize;
        // SAFETY: data is a valid readable buffer of data.len() bytes.
        unsafe {
            WriteProcessMemory(
                self.handle,
                address.to_local().as_ptr(),
                data.as_ptr().cast(),
                data.len(),
                Some(&mut written as *mut usize),
            )
        }
        .map_err(|e| WriteFault::Os {
            address,
            len: data.len(),
            message: e.to_string(),
        })?;

        if written != data.len() {
            return Err(WriteFault::Partial {
                address,
                expected: data.len(),
                actual: written,
            });
        }
        Ok(())
    }
}

impl Address {
    fn from_local_ptr(ptr: *const c_void) -> Self {
        Address::from_local(LocalAddress::from_ptr(ptr))
    }
}

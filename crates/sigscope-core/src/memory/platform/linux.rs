//! procfs backend: `/proc/<pid>/maps` for layout, `/proc/<pid>/mem` for I/O.

use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, InitializationError, ReadFault, Result, WriteFault};
use crate::memory::{Address, MemoryRegion, ProcessMemory, process_name_matches};

const PTRACE_SCOPE_PATH: &str = "/proc/sys/kernel/yama/ptrace_scope";

pub fn initialize() -> std::result::Result<(), InitializationError> {
    if fs::metadata("/proc/self/maps").is_err() {
        return Err(InitializationError("procfs is not mounted".to_string()));
    }

    // 3 = no process may be traced, which also blocks /proc/<pid>/mem
    if let Ok(scope) = fs::read_to_string(PTRACE_SCOPE_PATH)
        && scope.trim() == "3"
    {
        return Err(InitializationError(
            "ptrace is disabled (kernel.yama.ptrace_scope = 3)".to_string(),
        ));
    }

    Ok(())
}

pub fn find_pid(process_name: &str) -> Result<Option<u32>> {
    let mut pids: Vec<u32> = fs::read_dir("/proc")?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter(|pid| pid_matches(*pid, process_name))
        .collect();

    pids.sort_unstable();
    Ok(pids.first().copied())
}

fn pid_matches(pid: u32, process_name: &str) -> bool {
    if let Ok(exe) = fs::read_link(format!("/proc/{}/exe", pid))
        && process_name_matches(&exe.to_string_lossy(), process_name)
    {
        return true;
    }

    // Wine processes show up as wine64-preloader; the Windows image name is argv[0]
    if let Ok(cmdline) = fs::read(format!("/proc/{}/cmdline", pid)) {
        let argv0 = cmdline.split(|&b| b == 0).next().unwrap_or_default();
        if process_name_matches(&String::from_utf8_lossy(argv0), process_name) {
            return true;
        }
    }

    fs::read_to_string(format!("/proc/{}/comm", pid))
        .map(|comm| process_name_matches(&comm, process_name))
        .unwrap_or(false)
}

pub fn open(pid: u32) -> Result<Arc<dyn ProcessMemory>> {
    let mem = File::open(format!("/proc/{}/mem", pid))
        .map_err(|e| Error::ProcessOpenFailed(format!("pid {}: {}", pid, e)))?;
    let start_time = read_start_time(pid)
        .ok_or_else(|| Error::ProcessNotFound(format!("pid {} has no stat entry", pid)))?;
    let exe = fs::read_link(format!("/proc/{}/exe", pid)).ok();

    let regions = parse_maps(&fs::read_to_string(format!("/proc/{}/maps", pid))?);
    let base = main_module_base(&regions, exe.as_ref()).unwrap_or(Address::NULL);
    debug!("Opened pid {} (base: {}, {} regions)", pid, base, regions.len());

    Ok(Arc::new(LinuxProcess {
        pid,
        mem,
        start_time,
        base,
    }))
}

pub struct LinuxProcess {
    pid: u32,
    mem: File,
    start_time: u64,
    base: Address,
}

impl ProcessMemory for LinuxProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn base_address(&self) -> Address {
        self.base
    }

    fn regions(&self) -> std::result::Result<Vec<MemoryRegion>, ReadFault> {
        fs::read_to_string(format!("/proc/{}/maps", self.pid))
            .map(|content| parse_maps(&content))
            .map_err(|e| ReadFault::Os {
                address: Address::NULL,
                len: 0,
                message: format!("maps: {}", e),
            })
    }

    fn is_alive(&self) -> bool {
        read_start_time(self.pid) == Some(self.start_time)
    }

    fn read_raw(&self, address: Address, buf: &mut [u8]) -> std::result::Result<(), ReadFault> {
        let offset = address.to_local().as_file_offset();
        self.mem
            .read_exact_at(buf, offset)
            .map_err(|e| ReadFault::Os {
                address,
                len: buf.len(),
                message: e.to_string(),
            })
    }

    fn write_raw(&self, address: Address, data: &[u8]) -> std::result::Result<(), WriteFault> {
        let os_fault = |e: std::io::Error| WriteFault::Os {
            address,
            len: data.len(),
            message: e.to_string(),
        };

        let file = OpenOptions::new()
            .write(true)
            .open(format!("/proc/{}/mem", self.pid))
            .map_err(os_fault)?;
        file.write_all_at(data, address.to_local().as_file_offset())
            .map_err(os_fault)
    }
}

/// Field 22 of `/proc/<pid>/stat`, in clock ticks since boot.
///
/// Together with the pid this identifies one process incarnation.
fn read_start_time(pid: u32) -> Option<u64> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // comm may contain spaces and parens; fields resume after the last ')'
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?;
    if state == "Z" || state == "X" {
        return None;
    }
    // state is field 3, starttime is field 22
    fields.nth(18)?.parse().ok()
}

fn main_module_base(regions: &[MemoryRegion], exe: Option<&PathBuf>) -> Option<Address> {
    let exe = exe.map(|p| p.to_string_lossy().into_owned());
    regions
        .iter()
        .find(|region| region.path.is_some() && region.path == exe)
        .or_else(|| regions.iter().find(|region| region.path.is_some()))
        .map(|region| region.start)
}

/// Parse the text of `/proc/<pid>/maps`.
pub(crate) fn parse_maps(content: &str) -> Vec<MemoryRegion> {
    content.lines().filter_map(parse_maps_line).collect()
}

fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
    let mut parts = line.split_whitespace();
    let range = parts.next()?;
    let perms = parts.next()?.as_bytes();
    // offset, dev, inode
    let path = parts.nth(3).map(|first| {
        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() {
            first.to_string()
        } else {
            format!("{} {}", first, rest.join(" "))
        }
    });

    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    if perms.len() < 3 || end <= start {
        return None;
    }

    Some(MemoryRegion {
        start: Address::new(start),
        size: end - start,
        readable: perms[0] == b'r',
        writable: perms[1] == b'w',
        executable: perms[2] == b'x',
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55d0c1a00000-55d0c1a02000 r--p 00000000 08:01 1234 /usr/bin/target
55d0c1a02000-55d0c1a08000 r-xp 00002000 08:01 1234 /usr/bin/target
55d0c2b00000-55d0c2b21000 rw-p 00000000 00:00 0 [heap]
7f1e2c000000-7f1e2c021000 rw-p 00000000 00:00 0
7ffd5a1b0000-7ffd5a1d1000 ---p 00000000 00:00 0 /tmp/with space.bin
";

    #[test]
    fn test_parse_maps() {
        let regions = parse_maps(MAPS);
        assert_eq!(regions.len(), 5);

        assert_eq!(regions[0].start, Address::new(0x55d0c1a00000));
        assert_eq!(regions[0].size, 0x2000);
        assert!(regions[0].readable);
        assert!(!regions[0].executable);
        assert_eq!(regions[0].path.as_deref(), Some("/usr/bin/target"));

        assert!(regions[1].executable);
        assert!(regions[2].writable);
        assert_eq!(regions[2].path.as_deref(), Some("[heap]"));
        assert_eq!(regions[3].path, None);
        assert!(!regions[4].readable);
        assert_eq!(regions[4].path.as_deref(), Some("/tmp/with space.bin"));
    }

    #[test]
    fn test_parse_maps_skips_garbage() {
        assert!(parse_maps("not a maps line\nzz-yy r--p").is_empty());
    }

    #[test]
    fn test_main_module_base_prefers_exe() {
        let regions = parse_maps(MAPS);
        let exe = PathBuf::from("/usr/bin/target");
        assert_eq!(
            main_module_base(&regions, Some(&exe)),
            Some(Address::new(0x55d0c1a00000))
        );
    }

    #[test]
    fn test_own_process_is_alive() {
        let pid = std::process::id();
        let process = open(pid).unwrap();
        assert!(process.is_alive());
        assert_eq!(process.pid(), pid);
        assert!(!process.regions().unwrap().is_empty());
    }

    #[test]
    fn test_read_own_memory() {
        let value: u64 = 0x1122_3344_5566_7788;
        let address = Address::new(&value as *const u64 as u64);
        let process = open(std::process::id()).unwrap();

        let mut buf = [0u8; 8];
        process.read_raw(address, &mut buf).unwrap();
        assert_eq!(u64::from_le_bytes(buf), value);
    }
}

//! In-memory stand-ins for a target process, for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{Error, InitializationError, ReadFault, Result, WriteFault};
use crate::memory::{Address, MemoryRegion, ProcessMemory, ProcessProvider};

pub const MOCK_MODULE: &str = "target.exe";

#[derive(Debug, Clone)]
struct MockRegion {
    info: MemoryRegion,
    data: Vec<u8>,
}

impl MockRegion {
    fn range(&self, address: Address, len: usize) -> Option<std::ops::Range<usize>> {
        let start = address.offset_from(self.info.start)? as usize;
        let end = start.checked_add(len)?;
        (end <= self.data.len()).then_some(start..end)
    }
}

/// Builder for a [`MockProcess`] whose main module starts at `base`.
pub struct MockMemoryBuilder {
    pid: u32,
    base: u64,
    regions: Vec<MockRegion>,
}

impl MockMemoryBuilder {
    pub fn new(base: u64) -> Self {
        Self {
            pid: 4242,
            base,
            regions: vec![MockRegion {
                info: MemoryRegion {
                    start: Address::new(base),
                    size: 0x1000,
                    readable: true,
                    writable: false,
                    executable: true,
                    path: Some(MOCK_MODULE.to_string()),
                },
                data: vec![0; 0x1000],
            }],
        }
    }

    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Resize the main module region
    pub fn with_size(mut self, size: usize) -> Self {
        self.regions[0].data.resize(size, 0);
        self.regions[0].info.size = size as u64;
        self
    }

    pub fn with_region(mut self, start: u64, size: usize, path: Option<&str>, executable: bool) -> Self {
        self.regions.push(MockRegion {
            info: MemoryRegion {
                start: Address::new(start),
                size: size as u64,
                readable: true,
                writable: !executable,
                executable,
                path: path.map(str::to_string),
            },
            data: vec![0; size],
        });
        self.regions.sort_by_key(|r| r.info.start);
        self
    }

    pub fn write_bytes(mut self, address: u64, bytes: &[u8]) -> Self {
        let address = Address::new(address);
        let region = self
            .regions
            .iter_mut()
            .find(|r| r.range(address, bytes.len()).is_some())
            .unwrap_or_else(|| panic!("mock write at {} is outside every region", address));
        let range = region.range(address, bytes.len()).unwrap();
        region.data[range].copy_from_slice(bytes);
        self
    }

    pub fn write_u32(self, address: u64, value: u32) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn write_i32(self, address: u64, value: i32) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn write_u64(self, address: u64, value: u64) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn build(self) -> MockProcess {
        MockProcess {
            pid: self.pid,
            base: Address::new(self.base),
            regions: RwLock::new(self.regions),
            alive: Arc::new(AtomicBool::new(true)),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn build_arc(self) -> Arc<dyn ProcessMemory> {
        Arc::new(self.build())
    }
}

pub struct MockProcess {
    pid: u32,
    base: Address,
    regions: RwLock<Vec<MockRegion>>,
    alive: Arc<AtomicBool>,
    reads: AtomicUsize,
}

impl MockProcess {
    /// Shared liveness flag; store `false` to simulate the process exiting
    pub fn alive_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Patch memory after construction
    pub fn poke(&self, address: u64, bytes: &[u8]) {
        self.write_raw(Address::new(address), bytes)
            .expect("mock poke outside every region");
    }
}

impl ProcessMemory for MockProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn base_address(&self) -> Address {
        self.base
    }

    fn regions(&self) -> std::result::Result<Vec<MemoryRegion>, ReadFault> {
        let regions = self.regions.read().unwrap();
        Ok(regions.iter().map(|r| r.info.clone()).collect())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn read_raw(&self, address: Address, buf: &mut [u8]) -> std::result::Result<(), ReadFault> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.is_alive() {
            return Err(ReadFault::Os {
                address,
                len: buf.len(),
                message: "process exited".to_string(),
            });
        }

        let regions = self.regions.read().unwrap();
        for region in regions.iter() {
            if let Some(range) = region.range(address, buf.len()) {
                buf.copy_from_slice(&region.data[range]);
                return Ok(());
            }
        }
        Err(ReadFault::Os {
            address,
            len: buf.len(),
            message: "unmapped".to_string(),
        })
    }

    fn write_raw(&self, address: Address, data: &[u8]) -> std::result::Result<(), WriteFault> {
        let mut regions = self.regions.write().unwrap();
        for region in regions.iter_mut() {
            if let Some(range) = region.range(address, data.len()) {
                region.data[range].copy_from_slice(data);
                return Ok(());
            }
        }
        Err(WriteFault::Os {
            address,
            len: data.len(),
            message: "unmapped".to_string(),
        })
    }
}

/// Provider whose "running process" is set by the test.
#[derive(Default)]
pub struct MockProvider {
    process: Mutex<Option<Arc<dyn ProcessMemory>>>,
    init_error: Option<String>,
    find_error: Mutex<Option<Error>>,
    finds: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_init(message: &str) -> Self {
        Self {
            init_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn set_process(&self, process: Option<Arc<dyn ProcessMemory>>) {
        *self.process.lock().unwrap() = process;
    }

    /// Make the next `find` fail with `error`
    pub fn fail_next_find(&self, error: Error) {
        *self.find_error.lock().unwrap() = Some(error);
    }

    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }
}

impl ProcessProvider for MockProvider {
    fn initialize(&self) -> std::result::Result<(), InitializationError> {
        match &self.init_error {
            Some(message) => Err(InitializationError(message.clone())),
            None => Ok(()),
        }
    }

    fn find(&self) -> Result<Option<Arc<dyn ProcessMemory>>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.find_error.lock().unwrap().take() {
            return Err(error);
        }
        let process = self.process.lock().unwrap();
        Ok(process.as_ref().filter(|p| p.is_alive()).cloned())
    }
}

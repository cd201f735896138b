mod accessor;
mod address;
mod platform;
mod process;
mod snapshot;

#[cfg(test)]
pub mod mock;

pub use accessor::{
    DEFAULT_MAX_READ_LEN, DEFAULT_MAX_STRING_LEN, MemoryAccessor, Primitive, ReadLimits,
    TextEncoding,
};
pub use address::{Address, MemoryRegion};
pub use process::{NativeProvider, ProcessMemory, ProcessProvider, process_name_matches};
pub use snapshot::Snapshot;

#[cfg(test)]
pub use mock::{MockMemoryBuilder, MockProcess, MockProvider};

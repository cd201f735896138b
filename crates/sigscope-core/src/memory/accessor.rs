//! Bounds-checked access to the target's address space.
//!
//! Every request is validated against [`ReadLimits`] before anything is
//! allocated or sent to the OS, so a corrupted pointer or length field in the
//! target cannot trigger a runaway allocation here.

use std::sync::Arc;

use encoding_rs::{Encoding, UTF_8, UTF_16LE};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ReadFault, WriteFault};
use crate::memory::{Address, MemoryRegion, ProcessMemory, Snapshot};

/// Longest string accepted by [`MemoryAccessor::read_string`] (code units)
pub const DEFAULT_MAX_STRING_LEN: usize = 1024;
/// Largest single read or write
pub const DEFAULT_MAX_READ_LEN: usize = 64 * 1024 * 1024;

const CSTRING_CHUNK: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadLimits {
    pub max_string_len: usize,
    pub max_read_len: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_read_len: DEFAULT_MAX_READ_LEN,
        }
    }
}

/// Fixed-width little-endian values readable from the target.
pub trait Primitive: Copy + Sized {
    const SIZE: usize;

    /// Decode from exactly `SIZE` bytes
    fn from_le_slice(bytes: &[u8]) -> Self;

    fn to_le_vec(self) -> Vec<u8>;
}

macro_rules! impl_primitive {
    ($($t:ty),* $(,)?) => {
        $(
            impl Primitive for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }

                fn to_le_vec(self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }
        )*
    };
}

impl_primitive!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Character encoding of a string stored in the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
}

impl TextEncoding {
    fn unit_size(self) -> usize {
        match self {
            Self::Utf8 => 1,
            Self::Utf16Le => 2,
        }
    }

    fn encoding(self) -> &'static Encoding {
        match self {
            Self::Utf8 => UTF_8,
            Self::Utf16Le => UTF_16LE,
        }
    }
}

/// Reads and writes the memory of one target process incarnation.
#[derive(Clone)]
pub struct MemoryAccessor {
    process: Arc<dyn ProcessMemory>,
    limits: ReadLimits,
}

impl std::fmt::Debug for MemoryAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAccessor")
            .field("pid", &self.process.pid())
            .field("base", &self.process.base_address())
            .field("limits", &self.limits)
            .finish()
    }
}

impl MemoryAccessor {
    pub fn new(process: Arc<dyn ProcessMemory>) -> Self {
        Self::with_limits(process, ReadLimits::default())
    }

    pub fn with_limits(process: Arc<dyn ProcessMemory>, limits: ReadLimits) -> Self {
        Self { process, limits }
    }

    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    pub fn base_address(&self) -> Address {
        self.process.base_address()
    }

    pub fn is_alive(&self) -> bool {
        self.process.is_alive()
    }

    pub fn limits(&self) -> ReadLimits {
        self.limits
    }

    pub fn regions(&self) -> Result<Vec<MemoryRegion>, ReadFault> {
        self.process.regions()
    }

    fn check_read(&self, address: Address, len: usize) -> Result<(), ReadFault> {
        if address.is_null() {
            return Err(ReadFault::NullAddress);
        }
        if len > self.limits.max_read_len {
            return Err(ReadFault::LengthExceeded {
                requested: len,
                limit: self.limits.max_read_len,
            });
        }
        if address.checked_add(len as u64).is_none() {
            return Err(ReadFault::Overflow { address, len });
        }
        Ok(())
    }

    pub fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>, ReadFault> {
        self.check_read(address, len)?;
        let mut buf = vec![0u8; len];
        if len > 0 {
            self.process.read_raw(address, &mut buf)?;
        }
        trace!("read {} bytes at {}", len, address);
        Ok(buf)
    }

    pub fn write_bytes(&self, address: Address, data: &[u8]) -> Result<(), WriteFault> {
        if address.is_null() {
            return Err(WriteFault::NullAddress);
        }
        if data.len() > self.limits.max_read_len {
            return Err(WriteFault::LengthExceeded {
                requested: data.len(),
                limit: self.limits.max_read_len,
            });
        }
        if address.checked_add(data.len() as u64).is_none() {
            return Err(WriteFault::Overflow {
                address,
                len: data.len(),
            });
        }
        if data.is_empty() {
            return Ok(());
        }
        self.process.write_raw(address, data)
    }

    pub fn read<T: Primitive>(&self, address: Address) -> Result<T, ReadFault> {
        let bytes = self.read_bytes(address, T::SIZE)?;
        Ok(T::from_le_slice(&bytes))
    }

    pub fn write<T: Primitive>(&self, address: Address, value: T) -> Result<(), WriteFault> {
        self.write_bytes(address, &value.to_le_vec())
    }

    /// Read a 64-bit pointer. A null pointer is reported as a fault.
    pub fn read_pointer(&self, address: Address) -> Result<Address, ReadFault> {
        let target = Address::new(self.read::<u64>(address)?);
        if target.is_null() {
            return Err(ReadFault::NullAddress);
        }
        Ok(target)
    }

    /// Follow `base -> [+off0] -> [+off1] ...`, dereferencing at each step
    pub fn read_pointer_chain(&self, base: Address, offsets: &[u64]) -> Result<Address, ReadFault> {
        offsets.iter().try_fold(base, |current, &offset| {
            let slot = current
                .checked_add(offset)
                .ok_or(ReadFault::Overflow {
                    address: current,
                    len: offset as usize,
                })?;
            self.read_pointer(slot)
        })
    }

    /// Read a length-prefixed string: a `u32` count of code units followed by
    /// the units themselves.
    ///
    /// The count is checked against `max_string_len` before the payload is
    /// read, so an oversized count fails instead of being truncated.
    pub fn read_string(&self, address: Address, encoding: TextEncoding) -> Result<String, ReadFault> {
        let count = self.read::<u32>(address)? as usize;
        if count > self.limits.max_string_len {
            return Err(ReadFault::LengthExceeded {
                requested: count,
                limit: self.limits.max_string_len,
            });
        }
        if count == 0 {
            return Ok(String::new());
        }

        let payload = address
            .checked_add(u32::SIZE as u64)
            .ok_or(ReadFault::Overflow { address, len: count })?;
        let bytes = self.read_bytes(payload, count * encoding.unit_size())?;
        decode(&bytes, encoding, payload)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes
    pub fn read_cstring(&self, address: Address, max_len: usize) -> Result<String, ReadFault> {
        let max_len = max_len.min(self.limits.max_string_len);
        let mut collected = Vec::new();

        while collected.len() < max_len {
            let want = CSTRING_CHUNK.min(max_len - collected.len());
            let at = address
                .checked_add(collected.len() as u64)
                .ok_or(ReadFault::Overflow { address, len: max_len })?;
            let chunk = self.read_bytes(at, want)?;

            if let Some(end) = memchr::memchr(0, &chunk) {
                collected.extend_from_slice(&chunk[..end]);
                return decode(&collected, TextEncoding::Utf8, address);
            }
            collected.extend_from_slice(&chunk);
        }

        Err(ReadFault::LengthExceeded {
            requested: max_len + 1,
            limit: max_len,
        })
    }

    /// Copy `len` bytes starting at `start` in `chunk_size` pieces.
    ///
    /// Stops at the first unreadable chunk and keeps what was read before it;
    /// only a failure on the very first chunk is an error.
    pub fn snapshot(
        &self,
        start: Address,
        len: usize,
        chunk_size: usize,
    ) -> Result<Snapshot, ReadFault> {
        let chunk_size = chunk_size.clamp(1, self.limits.max_read_len.max(1));
        let mut bytes = Vec::with_capacity(len.min(chunk_size));

        while bytes.len() < len {
            let want = chunk_size.min(len - bytes.len());
            let at = start
                .checked_add(bytes.len() as u64)
                .ok_or(ReadFault::Overflow { address: start, len })?;
            match self.read_bytes(at, want) {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(e) if bytes.is_empty() => return Err(e),
                Err(e) => {
                    trace!("snapshot of {} truncated at {}: {}", start, at, e);
                    break;
                }
            }
        }

        Ok(Snapshot::new(start, bytes))
    }
}

fn decode(bytes: &[u8], encoding: TextEncoding, address: Address) -> Result<String, ReadFault> {
    let (text, had_errors) = encoding
        .encoding()
        .decode_without_bom_handling(bytes);
    if had_errors {
        return Err(ReadFault::InvalidString {
            address,
            message: format!("not valid {:?}", encoding),
        });
    }
    Ok(text.into_owned())
}

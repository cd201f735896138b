use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::error::ReadFault;
use crate::memory::{Address, MemoryAccessor};

/// Bytes copied from the target at a known address
#[derive(Debug, Clone, Serialize)]
pub struct MemoryDump {
    pub address: Address,
    pub bytes: Vec<u8>,
}

impl MemoryDump {
    pub fn capture(memory: &MemoryAccessor, address: Address, size: usize) -> Result<Self, ReadFault> {
        Ok(Self {
            address,
            bytes: memory.read_bytes(address, size)?,
        })
    }
}

impl fmt::Display for MemoryDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hexdump(&self.bytes, self.address, true))
    }
}

/// Format bytes sixteen per line:
///
/// ```text
/// 0x14000000: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|
/// ```
pub fn format_hexdump(bytes: &[u8], base: Address, ascii: bool) -> String {
    let mut out = String::new();

    for (i, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:#010x}: ", base.value().wrapping_add(i as u64 * 16));

        for j in 0..16 {
            if j == 8 {
                out.push(' ');
            }
            match chunk.get(j) {
                Some(byte) => {
                    let _ = write!(out, "{:02X} ", byte);
                }
                None => out.push_str("   "),
            }
        }

        if ascii {
            out.push_str(" |");
            for &byte in chunk {
                out.push(if (0x20..0x7F).contains(&byte) { byte as char } else { '.' });
            }
            for _ in chunk.len()..16 {
                out.push(' ');
            }
            out.push('|');
        }

        out.push('\n');
    }
    out
}

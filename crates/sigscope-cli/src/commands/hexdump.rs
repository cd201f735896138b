//! Hexdump command implementation.

use anyhow::Result;
use sigscope_core::debug::{MemoryDump, format_hexdump};

use super::hex_utils::parse_hex_address;
use crate::config::CliConfig;

pub fn run(config: &CliConfig, address: &str, size: usize, ascii: bool, pid: Option<u32>) -> Result<()> {
    let address = parse_hex_address(address)?;
    let memory = super::attach(config, pid)?;
    let dump = MemoryDump::capture(&memory, address, size)?;

    println!("Hexdump at {} ({} bytes):", dump.address, dump.bytes.len());
    println!();
    print!("{}", format_hexdump(&dump.bytes, dump.address, ascii));
    Ok(())
}

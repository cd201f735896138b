//! Scan command implementation.

use anyhow::Result;
use sigscope_core::Signature;
use sigscope_core::debug::scan_process;

use crate::config::CliConfig;

pub fn run(config: &CliConfig, pattern: &str, pid: Option<u32>, all_regions: bool, limit: usize) -> Result<()> {
    let signature = Signature::parse(pattern)?;
    let memory = super::attach(config, pid)?;

    let mut options = config.detector_config().scan;
    if all_regions {
        options.main_module_only = false;
    }

    println!(
        "Searching for {} ({} bytes, {} wildcards)",
        signature,
        signature.len(),
        signature.wildcard_count()
    );
    let result = scan_process(&memory, &signature, &options, limit)?;

    let base = memory.base_address();
    for address in &result.matches {
        match address.offset_from(base) {
            Some(rva) => println!("  {} (base+{:#x})", address, rva),
            None => println!("  {}", address),
        }
    }

    println!();
    println!(
        "{} matches in {} regions ({} bytes scanned){}",
        result.matches.len(),
        result.regions_scanned,
        result.bytes_scanned,
        if result.truncated { ", stopped at limit" } else { "" }
    );
    Ok(())
}

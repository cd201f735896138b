//! Resolve command implementation.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use sigscope_core::debug::{OffsetStatus, OffsetValidation, validate_offsets};
use sigscope_core::{OffsetRegistry, ResolvedOffsets};

use crate::config::CliConfig;

#[derive(Serialize)]
struct ResolveReport<'a> {
    offsets: &'a ResolvedOffsets,
    validation: &'a [OffsetValidation],
}

pub fn run(config: &CliConfig, pid: Option<u32>, json: bool) -> Result<()> {
    let detector_config = config.detector_config();
    let table = config.signature_table()?;
    let memory = super::attach(config, pid)?;

    // Always scan here; the cache is for the watcher
    let registry = OffsetRegistry::new(table).with_scan_options(detector_config.scan);
    let offsets = registry.resolve(&memory, 1)?;
    let validation = validate_offsets(&memory, &offsets, registry.table());

    if json {
        let report = ResolveReport {
            offsets: &offsets,
            validation: &validation,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Signature table {} against base {}:",
            offsets.table_version(),
            offsets.base()
        );
        for field in &validation {
            let address = field
                .address
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "-".to_string());
            let rva = field
                .rva
                .map(|rva| format!("base+{:#x}", rva))
                .unwrap_or_default();
            let status = match field.status {
                OffsetStatus::Ok => "ok".green().to_string(),
                OffsetStatus::Unreadable => "unreadable".yellow().to_string(),
                OffsetStatus::Missing => "missing".dimmed().to_string(),
                OffsetStatus::MissingRequired => "MISSING".red().bold().to_string(),
            };
            println!("  {:<20} {:<18} {:<14} {}", field.name, address, rva, status);
        }
    }

    offsets.ensure_required(registry.table())?;
    Ok(())
}

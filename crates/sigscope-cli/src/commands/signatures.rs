//! Signatures command implementation.

use std::path::Path;

use anyhow::Result;
use sigscope_core::save_signatures;

use crate::config::CliConfig;

pub fn run(config: &CliConfig, output: Option<&Path>) -> Result<()> {
    let table = config.signature_table()?;

    match output {
        Some(path) => {
            save_signatures(path, &table)?;
            println!(
                "Wrote {} entries (version {}) to {}",
                table.entries.len(),
                table.version,
                path.display()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&table)?),
    }
    Ok(())
}

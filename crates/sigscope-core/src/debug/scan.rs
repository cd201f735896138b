use serde::Serialize;
use tracing::debug;

use crate::config::ScanOptions;
use crate::error::ReadFault;
use crate::memory::{Address, MemoryAccessor};
use crate::scan::{Signature, find_all};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub matches: Vec<Address>,
    pub regions_scanned: usize,
    pub bytes_scanned: usize,
    /// Whether `limit` cut the match list short
    pub truncated: bool,
}

/// Find up to `limit` occurrences of `signature` in the target.
///
/// With `main_module_only`, only regions backed by the same file as the
/// region at the base address are searched.
pub fn scan_process(
    memory: &MemoryAccessor,
    signature: &Signature,
    options: &ScanOptions,
    limit: usize,
) -> Result<ScanResult, ReadFault> {
    let base = memory.base_address();
    let regions = memory.regions()?;
    let main_path = regions
        .iter()
        .find(|region| region.contains(base))
        .and_then(|region| region.path.clone());

    let mut result = ScanResult::default();
    let mut budget = options.max_scan_bytes;

    for region in regions.iter().filter(|region| region.readable) {
        if options.main_module_only && main_path.is_some() && region.path != main_path {
            continue;
        }
        if budget == 0 {
            break;
        }

        let len = region.size.min(budget as u64) as usize;
        let snapshot = match memory.snapshot(region.start, len, options.chunk_size) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("Skipping region {}: {}", region.start, e);
                continue;
            }
        };
        budget = budget.saturating_sub(snapshot.len());
        result.regions_scanned += 1;
        result.bytes_scanned += snapshot.len();

        for offset in find_all(snapshot.bytes(), signature) {
            if result.matches.len() >= limit {
                result.truncated = true;
                return Ok(result);
            }
            result.matches.push(snapshot.address_of(offset));
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemoryBuilder;

    fn memory() -> MemoryAccessor {
        MemoryAccessor::new(
            MockMemoryBuilder::new(0x1000)
                .with_region(0x8000, 0x100, None, false)
                .write_bytes(0x1100, &[0xCA, 0xFE, 0x01])
                .write_bytes(0x1200, &[0xCA, 0xFE, 0x02])
                .write_bytes(0x8010, &[0xCA, 0xFE, 0x03])
                .build_arc(),
        )
    }

    #[test]
    fn test_main_module_only() {
        let sig = Signature::parse("CA FE ??").unwrap();
        let result = scan_process(&memory(), &sig, &ScanOptions::default(), 100).unwrap();
        assert_eq!(result.matches, vec![Address::new(0x1100), Address::new(0x1200)]);
        assert_eq!(result.regions_scanned, 1);
        assert!(!result.truncated);
    }

    #[test]
    fn test_all_regions_with_limit() {
        let sig = Signature::parse("CA FE").unwrap();
        let options = ScanOptions {
            main_module_only: false,
            ..ScanOptions::default()
        };

        let all = scan_process(&memory(), &sig, &options, 100).unwrap();
        assert_eq!(all.matches.len(), 3);
        assert_eq!(all.matches[2], Address::new(0x8010));

        let limited = scan_process(&memory(), &sig, &options, 2).unwrap();
        assert_eq!(limited.matches.len(), 2);
        assert!(limited.truncated);
    }
}

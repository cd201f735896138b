//! Offset cache for faster attach
//!
//! Stores module-relative offsets so a restarted target, loaded at a new
//! base, can skip the signature scan when the build is unchanged.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ResolvedOffsets;
use crate::memory::Address;

/// Maximum age for cache validity (24 hours)
const MAX_CACHE_AGE_SECS: u64 = 24 * 60 * 60;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCache {
    /// Signature table version the offsets were resolved with
    pub table_version: String,
    /// Size of the main module; a different build changes it
    pub module_size: u64,
    /// Field name to module-relative offset
    pub rvas: BTreeMap<String, Option<u64>>,
    /// Unix seconds
    pub created_at: u64,
}

impl OffsetCache {
    /// Capture `offsets` relative to their base.
    ///
    /// Returns `None` if a found field lies below the module base, which
    /// cannot be expressed as an RVA.
    pub fn from_offsets(offsets: &ResolvedOffsets, module_size: u64) -> Option<Self> {
        let mut rvas = BTreeMap::new();
        for (name, addr) in offsets.fields() {
            let rva = match addr {
                Some(addr) => Some(addr.offset_from(offsets.base())?),
                None => None,
            };
            rvas.insert(name.to_string(), rva);
        }

        Some(Self {
            table_version: offsets.table_version().to_string(),
            module_size,
            rvas,
            created_at: unix_now(),
        })
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!("Cache file not found or unreadable: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<OffsetCache>(&content) {
            Ok(cache) => {
                debug!(
                    "Loaded cache: table={}, module_size={:#x}, created_at={}",
                    cache.table_version, cache.module_size, cache.created_at
                );
                Some(cache)
            }
            Err(e) => {
                warn!("Failed to parse cache file: {}", e);
                None
            }
        }
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&path, content)?;
        info!("Saved offset cache to {}", path.as_ref().display());
        Ok(())
    }

    pub fn age_secs(&self) -> u64 {
        unix_now().saturating_sub(self.created_at)
    }

    /// Check if the cache matches the table version and running build
    pub fn is_valid_for(&self, table_version: &str, module_size: u64) -> bool {
        if self.table_version != table_version {
            debug!(
                "Cache table mismatch: cached={}, current={}",
                self.table_version, table_version
            );
            return false;
        }

        if self.module_size != module_size {
            debug!(
                "Cache module size mismatch: cached={:#x}, current={:#x}",
                self.module_size, module_size
            );
            return false;
        }

        let age = self.age_secs();
        if age > MAX_CACHE_AGE_SECS {
            debug!("Cache expired: age={} seconds", age);
            return false;
        }

        if self.rvas.values().all(Option::is_none) {
            debug!("Cache holds no offsets");
            return false;
        }

        true
    }

    /// Rebuild absolute offsets for a module loaded at `base`
    pub fn to_offsets(&self, base: Address, epoch: u64) -> ResolvedOffsets {
        let fields = self
            .rvas
            .iter()
            .map(|(name, rva)| (name.clone(), rva.and_then(|rva| base.checked_add(rva))))
            .collect();
        ResolvedOffsets::new(epoch, base, self.table_version.clone(), fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_offsets() -> ResolvedOffsets {
        let fields = [
            ("data_model".to_string(), Some(Address::new(0x1400_3000))),
            ("task_scheduler".to_string(), None),
        ]
        .into_iter()
        .collect();
        ResolvedOffsets::new(1, Address::new(0x1400_0000), "builtin-test", fields)
    }

    #[test]
    fn test_cache_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        let cache = OffsetCache::from_offsets(&sample_offsets(), 0x20_0000).unwrap();
        cache.save_to_path(&path).unwrap();

        let loaded = OffsetCache::load_from_path(&path).unwrap();
        assert_eq!(loaded, cache);
        assert_eq!(loaded.rvas["data_model"], Some(0x3000));
        assert_eq!(loaded.rvas["task_scheduler"], None);
    }

    #[test]
    fn test_cache_rebases_to_new_base() {
        let cache = OffsetCache::from_offsets(&sample_offsets(), 0x20_0000).unwrap();
        let rebased = cache.to_offsets(Address::new(0x7FF6_0000_0000), 2);

        assert_eq!(rebased.epoch(), 2);
        assert_eq!(rebased.get("data_model"), Some(Address::new(0x7FF6_0000_3000)));
        assert_eq!(rebased.get("task_scheduler"), None);
        assert_eq!(rebased.table_version(), "builtin-test");
    }

    #[test]
    fn test_cache_validity() {
        let cache = OffsetCache::from_offsets(&sample_offsets(), 0x20_0000).unwrap();
        assert!(cache.is_valid_for("builtin-test", 0x20_0000));
        assert!(!cache.is_valid_for("builtin-other", 0x20_0000));
        assert!(!cache.is_valid_for("builtin-test", 0x21_0000));
    }

    #[test]
    fn test_cache_expired() {
        let mut cache = OffsetCache::from_offsets(&sample_offsets(), 0x20_0000).unwrap();
        cache.created_at = cache.created_at.saturating_sub(MAX_CACHE_AGE_SECS + 60);
        assert!(!cache.is_valid_for("builtin-test", 0x20_0000));
    }

    #[test]
    fn test_cache_rejects_field_below_base() {
        let fields = [("odd".to_string(), Some(Address::new(0x1000)))]
            .into_iter()
            .collect();
        let offsets = ResolvedOffsets::new(1, Address::new(0x1400_0000), "t", fields);
        assert!(OffsetCache::from_offsets(&offsets, 0x1000).is_none());
    }

    #[test]
    fn test_load_garbage_is_none() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "not json").unwrap();
        assert!(OffsetCache::load_from_path(temp_file.path()).is_none());
    }
}

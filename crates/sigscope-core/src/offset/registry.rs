//! Turns signature matches into named field addresses.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ScanOptions;
use crate::error::ResolutionError;
use crate::memory::{Address, MemoryAccessor, MemoryRegion, Primitive, Snapshot};
use crate::offset::{
    AddressMode, CodeSignature, OffsetCache, OffsetSignatureEntry, ResolvedOffsets,
    SignatureTable,
};
use crate::scan::{find_all, find_near};

/// A copied region plus the attribute fields are filtered on
struct ScannedRegion {
    snapshot: Snapshot,
    executable: bool,
}

/// Regions chosen for a scan and the extent of the main module
struct ScanPlan {
    regions: Vec<MemoryRegion>,
    module_size: u64,
}

/// Resolves the fields of a [`SignatureTable`] against a live process.
#[derive(Debug, Clone)]
pub struct OffsetRegistry {
    table: Arc<SignatureTable>,
    scan: ScanOptions,
    cache_path: Option<PathBuf>,
}

impl OffsetRegistry {
    pub fn new(table: SignatureTable) -> Self {
        if table.entry(&table.session.root_field).is_none() {
            warn!(
                "Signature table {} has no entry for session root '{}'",
                table.version, table.session.root_field
            );
        }
        Self {
            table: Arc::new(table),
            scan: ScanOptions::default(),
            cache_path: None,
        }
    }

    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_cache_path(mut self, path: Option<PathBuf>) -> Self {
        self.cache_path = path;
        self
    }

    pub fn table(&self) -> &SignatureTable {
        &self.table
    }

    /// Resolve every field of the table for the process behind `memory`.
    ///
    /// Fields whose signatures find nothing are recorded as absent; only an
    /// unreadable target is an error. Callers decide whether the absent
    /// fields are acceptable via [`ResolvedOffsets::ensure_required`].
    pub fn resolve(
        &self,
        memory: &MemoryAccessor,
        epoch: u64,
    ) -> Result<ResolvedOffsets, ResolutionError> {
        let base = memory.base_address();
        let plan = self.plan(memory)?;
        debug!(
            "Resolving {} fields for pid {} (base: {}, module size: {:#x}, {} regions)",
            self.table.entries.len(),
            memory.pid(),
            base,
            plan.module_size,
            plan.regions.len()
        );

        if let Some(offsets) = self.try_cache(memory, plan.module_size, epoch) {
            info!("Using cached offsets: {}", offsets.summary());
            return Ok(offsets);
        }

        let regions = self.snapshot_regions(memory, &plan.regions)?;
        let fields = self
            .table
            .entries
            .iter()
            .map(|entry| (entry.name.clone(), resolve_entry(entry, &regions, memory)))
            .collect();

        let offsets = ResolvedOffsets::new(epoch, base, self.table.version.clone(), fields);
        info!("Resolved offsets: {}", offsets.summary());

        if offsets.ensure_required(&self.table).is_ok() {
            self.save_cache(&offsets, plan.module_size);
        }
        Ok(offsets)
    }

    fn plan(&self, memory: &MemoryAccessor) -> Result<ScanPlan, ResolutionError> {
        let base = memory.base_address();
        let readable: Vec<MemoryRegion> = memory
            .regions()?
            .into_iter()
            .filter(|region| region.readable && region.size > 0)
            .collect();

        let main_path = readable
            .iter()
            .find(|region| region.contains(base))
            .and_then(|region| region.path.clone());
        let module: Vec<MemoryRegion> = match &main_path {
            Some(path) => readable
                .iter()
                .filter(|region| region.path.as_ref() == Some(path))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let module_size = module
            .iter()
            .map(MemoryRegion::end)
            .max()
            .and_then(|end| end.offset_from(base))
            .unwrap_or(0);

        let regions = if self.scan.main_module_only && !module.is_empty() {
            module
        } else {
            readable
        };

        if regions.is_empty() {
            return Err(ResolutionError::NoReadableRegions);
        }
        Ok(ScanPlan {
            regions,
            module_size,
        })
    }

    fn snapshot_regions(
        &self,
        memory: &MemoryAccessor,
        regions: &[MemoryRegion],
    ) -> Result<Vec<ScannedRegion>, ResolutionError> {
        let mut budget = self.scan.max_scan_bytes;
        let mut scanned = Vec::new();

        for region in regions {
            if budget == 0 {
                debug!("Scan budget exhausted before {}", region.start);
                break;
            }

            let len = region.size.min(budget as u64) as usize;
            match memory.snapshot(region.start, len, self.scan.chunk_size) {
                Ok(snapshot) => {
                    budget = budget.saturating_sub(snapshot.len());
                    scanned.push(ScannedRegion {
                        snapshot,
                        executable: region.executable,
                    });
                }
                Err(e) => debug!("Skipping region {} ({:#x} bytes): {}", region.start, region.size, e),
            }
        }

        if scanned.is_empty() {
            return Err(ResolutionError::NoReadableRegions);
        }
        debug!(
            "Captured {} regions, {:#x} bytes",
            scanned.len(),
            self.scan.max_scan_bytes - budget
        );
        Ok(scanned)
    }

    fn try_cache(
        &self,
        memory: &MemoryAccessor,
        module_size: u64,
        epoch: u64,
    ) -> Option<ResolvedOffsets> {
        let path = self.cache_path.as_ref()?;
        let cache = OffsetCache::load_from_path(path)?;
        if !cache.is_valid_for(&self.table.version, module_size) {
            return None;
        }

        if let Some(entry) = self
            .table
            .entries
            .iter()
            .find(|entry| !cache.rvas.contains_key(&entry.name))
        {
            debug!("Cache has no entry for '{}'", entry.name);
            return None;
        }

        let offsets = cache.to_offsets(memory.base_address(), epoch);
        for (name, addr) in offsets.fields() {
            if let Some(addr) = addr
                && let Err(e) = memory.read::<u8>(addr)
            {
                debug!("Cached '{}' at {} is unreadable: {}", name, addr, e);
                return None;
            }
        }

        if offsets.ensure_required(&self.table).is_err() {
            return None;
        }
        Some(offsets)
    }

    fn save_cache(&self, offsets: &ResolvedOffsets, module_size: u64) {
        let Some(path) = &self.cache_path else {
            return;
        };
        let Some(cache) = OffsetCache::from_offsets(offsets, module_size) else {
            debug!("Offsets outside the main module, not caching");
            return;
        };
        if let Err(e) = cache.save_to_path(path) {
            warn!("Failed to save offset cache: {}", e);
        }
    }
}

fn resolve_entry(
    entry: &OffsetSignatureEntry,
    regions: &[ScannedRegion],
    memory: &MemoryAccessor,
) -> Option<Address> {
    let candidates: Vec<&ScannedRegion> = regions
        .iter()
        .filter(|region| entry.region.accepts(region.executable))
        .collect();

    for (idx, signature) in entry.signatures.iter().enumerate() {
        match resolve_signature_target(signature, &candidates, memory) {
            Some(target) => {
                debug!("{}: signature #{} -> {}", entry.name, idx, target);
                return Some(target);
            }
            None => debug!("{}: signature #{} not found", entry.name, idx),
        }
    }
    None
}

/// Pick one match of `signature` and derive the field address from it.
///
/// With an anchor, only matches that have the anchor within `max_distance`
/// count and the one with the closest anchor wins. Ties, and signatures
/// without an anchor, go to the lowest address.
fn resolve_signature_target(
    signature: &CodeSignature,
    regions: &[&ScannedRegion],
    memory: &MemoryAccessor,
) -> Option<Address> {
    let mut best: Option<(usize, Address)> = None;

    for region in regions {
        let bytes = region.snapshot.bytes();
        for pos in find_all(bytes, &signature.pattern) {
            let distance = match &signature.anchor {
                Some(anchor) => match find_near(bytes, &anchor.pattern, pos, anchor.max_distance) {
                    Some(anchor_pos) => anchor_pos.abs_diff(pos),
                    None => continue,
                },
                None => 0,
            };

            if best.is_some_and(|(best_distance, _)| best_distance <= distance) {
                continue;
            }

            let match_addr = region.snapshot.address_of(pos);
            match derive_target(signature, match_addr, &region.snapshot, memory) {
                Some(target) => {
                    best = Some((distance, target));
                    if distance == 0 {
                        return Some(target);
                    }
                }
                None => debug!("  Rejecting match at {}", match_addr),
            }
        }
    }

    best.map(|(_, target)| target)
}

fn derive_target(
    signature: &CodeSignature,
    match_addr: Address,
    snapshot: &Snapshot,
    memory: &MemoryAccessor,
) -> Option<Address> {
    let mut target = match signature.mode {
        AddressMode::Direct => match_addr,
        AddressMode::RipRelative {
            instr_offset,
            disp_offset,
            instr_len,
        } => {
            let instr_addr = match_addr.checked_add(instr_offset as u64)?;
            let disp: i32 = read_at(snapshot, memory, instr_addr.checked_add(disp_offset as u64)?)?;
            instr_addr
                .checked_add(instr_len as u64)?
                .checked_offset(disp as i64)?
        }
        AddressMode::Absolute { disp_offset } => {
            let raw: u64 = read_at(snapshot, memory, match_addr.checked_add(disp_offset as u64)?)?;
            Address::new(raw)
        }
    };

    if signature.deref {
        target = memory.read_pointer(target).ok()?;
    }
    target = target.checked_offset(signature.addend)?;

    (!target.is_null()).then_some(target)
}

/// Read from the snapshot when it covers `address`, else from the target
fn read_at<T: Primitive>(snapshot: &Snapshot, memory: &MemoryAccessor, address: Address) -> Option<T> {
    match snapshot.slice_at(address, T::SIZE) {
        Some(bytes) => Some(T::from_le_slice(bytes)),
        None => memory.read::<T>(address).ok(),
    }
}

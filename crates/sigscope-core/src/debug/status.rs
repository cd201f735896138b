use serde::Serialize;

use crate::memory::{Address, MemoryAccessor};
use crate::offset::{ResolvedOffsets, SignatureTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetStatus {
    /// Resolved and the address can be read
    Ok,
    /// Resolved but reading the address fails
    Unreadable,
    /// Signature found nothing, field is optional
    Missing,
    /// Signature found nothing, field is required
    MissingRequired,
}

#[derive(Debug, Clone, Serialize)]
pub struct OffsetValidation {
    pub name: String,
    pub address: Option<Address>,
    /// Offset from the module base
    pub rva: Option<u64>,
    pub status: OffsetStatus,
}

/// Check every table field of `offsets` against live memory.
pub fn validate_offsets(
    memory: &MemoryAccessor,
    offsets: &ResolvedOffsets,
    table: &SignatureTable,
) -> Vec<OffsetValidation> {
    table
        .entries
        .iter()
        .map(|entry| {
            let address = offsets.get(&entry.name);
            let status = match address {
                Some(addr) if memory.read::<u64>(addr).is_ok() => OffsetStatus::Ok,
                Some(_) => OffsetStatus::Unreadable,
                None if entry.required => OffsetStatus::MissingRequired,
                None => OffsetStatus::Missing,
            };
            OffsetValidation {
                name: entry.name.clone(),
                address,
                rva: offsets.rva(&entry.name),
                status,
            }
        })
        .collect()
}

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;
use crate::memory::Address;
use crate::offset::SignatureTable;

/// Field addresses resolved for one process epoch.
///
/// Never patched in place: a restart or re-resolution produces a new value
/// that replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOffsets {
    epoch: u64,
    base: Address,
    table_version: String,
    resolved_at: DateTime<Utc>,
    fields: BTreeMap<String, Option<Address>>,
}

impl ResolvedOffsets {
    pub fn new(
        epoch: u64,
        base: Address,
        table_version: impl Into<String>,
        fields: BTreeMap<String, Option<Address>>,
    ) -> Self {
        Self {
            epoch,
            base,
            table_version: table_version.into(),
            resolved_at: Utc::now(),
            fields,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn base(&self) -> Address {
        self.base
    }

    pub fn table_version(&self) -> &str {
        &self.table_version
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    /// Address of a field, `None` when unknown or not found
    pub fn get(&self, name: &str) -> Option<Address> {
        self.fields.get(name).copied().flatten()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<Address>)> {
        self.fields.iter().map(|(name, addr)| (name.as_str(), *addr))
    }

    pub fn found_count(&self) -> usize {
        self.fields.values().filter(|addr| addr.is_some()).count()
    }

    /// Fields that were searched for but not found
    pub fn missing(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, addr)| addr.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Fail with every required field of `table` that has no address.
    pub fn ensure_required(&self, table: &SignatureTable) -> Result<(), ResolutionError> {
        let missing: Vec<String> = table
            .required_fields()
            .filter(|name| self.get(name).is_none())
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ResolutionError::MissingRequired(missing))
        }
    }

    /// Module-relative offset of a field
    pub fn rva(&self, name: &str) -> Option<u64> {
        self.get(name)?.offset_from(self.base)
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "epoch {} base {} ({}/{} fields, table {})",
            self.epoch,
            self.base,
            self.found_count(),
            self.fields.len(),
            self.table_version
        );
        for (name, addr) in &self.fields {
            match addr {
                Some(addr) => {
                    let _ = write!(out, "\n  {:<20} {}", name, addr);
                }
                None => {
                    let _ = write!(out, "\n  {:<20} <not found>", name);
                }
            }
        }
        out
    }
}

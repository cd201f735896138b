//! Debug utilities for inspecting a target process
//!
//! This module provides tools for:
//! - Dumping raw memory as a hexdump (`MemoryDump`)
//! - Ad-hoc signature scans (`ScanResult`)
//! - Checking resolved offsets against live memory (`OffsetValidation`)

mod dump;
mod scan;
mod status;

pub use dump::{MemoryDump, format_hexdump};
pub use scan::{ScanResult, scan_process};
pub use status::{OffsetStatus, OffsetValidation, validate_offsets};

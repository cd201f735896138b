//! # sigscope-core
//!
//! Signature-based memory introspection and state detection for a running
//! third-party application.
//!
//! This crate provides:
//! - Wildcard byte-pattern scanning (`scan`)
//! - Bounds-checked cross-process memory access (`memory`)
//! - Offset resolution from a versioned signature table (`offset`)
//! - A background-polled state detector (`detector`)
//!
//! ## Feature Flags
//!
//! - `debug-tools`: Enables hexdump, ad-hoc scan and offset validation helpers.
//!   This feature is intended for CLI tools and development, not production use.

pub mod config;
#[cfg(feature = "debug-tools")]
pub mod debug;
pub mod detector;
pub mod error;
pub mod memory;
pub mod offset;
pub mod scan;

pub use config::{DetectorConfig, DetectorConfigBuilder, ScanOptions};
pub use detector::{
    DetectorStatus, GameDetector, GameDetectorBuilder, GameState, Observation, Probe,
    ProcessProbe, SessionInfo, ShutdownSignal, StateMachine,
};
pub use error::{Error, InitializationError, ReadFault, ResolutionError, Result, WriteFault};
pub use memory::{
    Address, MemoryAccessor, MemoryRegion, NativeProvider, ProcessMemory, ProcessProvider,
    ReadLimits, TextEncoding,
};
pub use offset::{
    CodeSignature, OffsetCache, OffsetRegistry, OffsetSignatureEntry, ResolvedOffsets,
    SignatureTable, builtin_signatures, load_signatures, save_signatures,
};
pub use scan::Signature;

// Debug utilities (requires debug-tools feature)
#[cfg(feature = "debug-tools")]
pub use debug::{MemoryDump, OffsetStatus, OffsetValidation, ScanResult};

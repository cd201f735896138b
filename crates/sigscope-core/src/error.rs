use thiserror::Error;

use crate::memory::Address;

/// A single failed read from the target process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadFault {
    #[error("Null address")]
    NullAddress,

    #[error("Address range {address} + {len:#x} overflows the address space")]
    Overflow { address: Address, len: usize },

    #[error("Read of {requested} bytes exceeds limit of {limit}")]
    LengthExceeded { requested: usize, limit: usize },

    #[error("Failed to read {len} bytes at {address}: {message}")]
    Os {
        address: Address,
        len: usize,
        message: String,
    },

    #[error("Short read at {address}: expected {expected} bytes, got {actual}")]
    Partial {
        address: Address,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid string data at {address}: {message}")]
    InvalidString { address: Address, message: String },
}

/// A single failed write to the target process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteFault {
    #[error("Null address")]
    NullAddress,

    #[error("Address range {address} + {len:#x} overflows the address space")]
    Overflow { address: Address, len: usize },

    #[error("Write of {requested} bytes exceeds limit of {limit}")]
    LengthExceeded { requested: usize, limit: usize },

    #[error("Failed to write {len} bytes at {address}: {message}")]
    Os {
        address: Address,
        len: usize,
        message: String,
    },

    #[error("Short write at {address}: expected {expected} bytes, wrote {actual}")]
    Partial {
        address: Address,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Required fields not resolved: {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    #[error("No readable memory regions in target")]
    NoReadableRegions,

    #[error("Failed to read target memory: {0}")]
    Read(#[from] ReadFault),
}

/// The memory-access subsystem could not be set up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Memory access unavailable: {0}")]
pub struct InitializationError(pub String);

#[derive(Debug, Error)]
pub enum Error {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error(transparent)]
    Read(#[from] ReadFault),

    #[error(transparent)]
    Write(#[from] WriteFault),

    #[error("Failed to resolve offsets: {0}")]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "not found" error, for files or the process
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ProcessNotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

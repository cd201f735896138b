mod cache;
mod layout;
mod registry;
mod resolved;
mod signature;

pub use cache::OffsetCache;
pub use layout::{SessionLayout, data_model};
pub use registry::OffsetRegistry;
pub use resolved::ResolvedOffsets;
pub use signature::{
    AddressMode, Anchor, CodeSignature, OffsetSignatureEntry, RegionKind, SignatureTable,
    builtin_signatures, load_signatures, save_signatures,
};

use crate::memory::Address;

/// A local copy of a contiguous range of target memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    base: Address,
    bytes: Vec<u8>,
}

impl Snapshot {
    pub fn new(base: Address, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    pub fn base(&self) -> Address {
        self.base
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn end(&self) -> Address {
        Address::new(self.base.value().saturating_add(self.bytes.len() as u64))
    }

    /// Target address of a buffer offset
    pub fn address_of(&self, offset: usize) -> Address {
        Address::new(self.base.value().saturating_add(offset as u64))
    }

    /// Buffer offset of a target address, if it lies inside the snapshot
    pub fn offset_of(&self, address: Address) -> Option<usize> {
        let offset = address.offset_from(self.base)?;
        (offset < self.bytes.len() as u64).then_some(offset as usize)
    }

    /// Bytes at `address`, if the whole range was captured
    pub fn slice_at(&self, address: Address, len: usize) -> Option<&[u8]> {
        let start = self.offset_of(address)?;
        self.bytes.get(start..start.checked_add(len)?)
    }
}

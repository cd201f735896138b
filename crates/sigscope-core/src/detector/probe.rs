//! Turning a live process into one [`Observation`] per tick.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::detector::{Observation, SessionMarkers};
use crate::error::{InitializationError, ReadFault};
use crate::memory::{MemoryAccessor, ProcessProvider, ReadLimits};
use crate::offset::{OffsetRegistry, ResolvedOffsets};

/// Source of observations for the detector.
pub trait Probe: Send {
    /// Prepare whatever the probe needs before the first tick
    fn initialize(&mut self) -> Result<(), InitializationError> {
        Ok(())
    }

    fn observe(&mut self) -> Observation;

    /// Offsets in use, if any
    fn offsets(&self) -> Option<Arc<ResolvedOffsets>> {
        None
    }

    /// Incarnation counter of the target, bumped on every new attach
    fn epoch(&self) -> u64 {
        0
    }

    /// Drop the attachment and anything derived from it
    fn release(&mut self) {}
}

/// Probe that attaches to the target through a [`ProcessProvider`].
pub struct ProcessProbe {
    provider: Arc<dyn ProcessProvider>,
    registry: OffsetRegistry,
    limits: ReadLimits,
    memory: Option<MemoryAccessor>,
    offsets: Option<Arc<ResolvedOffsets>>,
    epoch: u64,
}

impl ProcessProbe {
    pub fn new(provider: Arc<dyn ProcessProvider>, registry: OffsetRegistry, limits: ReadLimits) -> Self {
        Self {
            provider,
            registry,
            limits,
            memory: None,
            offsets: None,
            epoch: 0,
        }
    }

    pub fn registry(&self) -> &OffsetRegistry {
        &self.registry
    }

    pub fn memory(&self) -> Option<&MemoryAccessor> {
        self.memory.as_ref()
    }

    /// Make sure `self.memory` refers to a live process.
    ///
    /// Returns `Some(observation)` when the tick cannot go further.
    fn attach(&mut self) -> Option<Observation> {
        if let Some(memory) = &self.memory
            && !memory.is_alive()
        {
            info!("Target process {} exited (epoch {})", memory.pid(), self.epoch);
            self.release();
        }

        if self.memory.is_some() {
            return None;
        }

        match self.provider.find() {
            Ok(Some(process)) => {
                self.epoch += 1;
                info!(
                    "Attached to pid {} (base: {}, epoch {})",
                    process.pid(),
                    process.base_address(),
                    self.epoch
                );
                self.memory = Some(MemoryAccessor::with_limits(process, self.limits));
                None
            }
            Ok(None) => Some(Observation::Absent),
            // exited between lookup and open
            Err(e) if e.is_not_found() => {
                debug!("Target vanished while attaching: {}", e);
                Some(Observation::Absent)
            }
            Err(e) => {
                warn!("Process lookup failed: {}", e);
                Some(Observation::Inconclusive)
            }
        }
    }

    /// Resolve offsets for the current epoch if not done yet
    fn ensure_resolved(&mut self) -> Option<Arc<ResolvedOffsets>> {
        if let Some(offsets) = &self.offsets {
            return Some(Arc::clone(offsets));
        }

        let memory = self.memory.as_ref()?;
        let result = self
            .registry
            .resolve(memory, self.epoch)
            .and_then(|offsets| {
                offsets.ensure_required(self.registry.table())?;
                Ok(offsets)
            });

        match result {
            Ok(offsets) => {
                let offsets = Arc::new(offsets);
                self.offsets = Some(Arc::clone(&offsets));
                Some(offsets)
            }
            Err(e) => {
                warn!("Offset resolution failed (epoch {}): {}", self.epoch, e);
                None
            }
        }
    }

    fn read_session(&self, memory: &MemoryAccessor, offsets: &ResolvedOffsets) -> Observation {
        let layout = &self.registry.table().session;
        let Some(field) = offsets.get(&layout.root_field) else {
            return Observation::Unresolved;
        };

        let root = match memory.read_pointer_chain(field, &layout.root_chain) {
            Ok(root) => root,
            // data model not created yet
            Err(ReadFault::NullAddress) => return Observation::Menu,
            Err(e) => {
                debug!("Data model unreadable: {}", e);
                return Observation::Inconclusive;
            }
        };

        let read = || -> Result<Option<SessionMarkers>, ReadFault> {
            let at = |offset: u64| {
                root.checked_add(offset).ok_or(ReadFault::Overflow {
                    address: root,
                    len: offset as usize,
                })
            };

            if let Some(flag) = layout.loaded_flag
                && memory.read::<u8>(at(flag)?)? == 0
            {
                return Ok(None);
            }

            let id = memory.read::<u64>(at(layout.session_id)?)?;
            if id == 0 {
                return Ok(None);
            }

            let name = memory.read_string(at(layout.session_name)?, layout.name_encoding)?;
            Ok(Some(SessionMarkers { name, id }))
        };

        match read() {
            Ok(Some(markers)) => Observation::Session(markers),
            Ok(None) => Observation::Menu,
            Err(e) => {
                debug!("Session markers unreadable: {}", e);
                Observation::Inconclusive
            }
        }
    }
}

impl Probe for ProcessProbe {
    fn initialize(&mut self) -> Result<(), InitializationError> {
        self.provider.initialize()
    }

    fn observe(&mut self) -> Observation {
        if let Some(observation) = self.attach() {
            return observation;
        }

        let Some(offsets) = self.ensure_resolved() else {
            return Observation::Unresolved;
        };
        let Some(memory) = self.memory.as_ref() else {
            return Observation::Absent;
        };
        self.read_session(memory, &offsets)
    }

    fn offsets(&self) -> Option<Arc<ResolvedOffsets>> {
        self.offsets.clone()
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    fn release(&mut self) {
        self.memory = None;
        self.offsets = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::{Address, MockMemoryBuilder, MockProvider, ProcessMemory};
    use crate::offset::{
        CodeSignature, OffsetSignatureEntry, RegionKind, SessionLayout, SignatureTable, data_model,
    };
    use crate::scan::Signature;
    use std::sync::atomic::Ordering;

    pub(crate) const BASE: u64 = 0x1400_0000;
    const DATA: u64 = 0x2000_0000;
    const ROOT: u64 = DATA + 0x100;

    pub(crate) fn table() -> SignatureTable {
        SignatureTable {
            version: "probe-test".to_string(),
            entries: vec![OffsetSignatureEntry {
                name: "data_model".to_string(),
                required: true,
                region: RegionKind::Code,
                signatures: vec![
                    CodeSignature::new(Signature::parse("48 8B 0D ?? ?? ?? ?? 48 85 C9").unwrap())
                        .rip_relative(0, 3, 7),
                ],
            }],
            session: SessionLayout::default(),
        }
    }

    /// Module at `base` whose data-model global points at a root in a data region
    pub(crate) fn target(base: u64, session: Option<(u64, &str)>) -> MockMemoryBuilder {
        let global = base + 0x800;
        let disp = (global - (base + 0x100 + 7)) as i32;
        let mut code = vec![0x48, 0x8B, 0x0D];
        code.extend_from_slice(&disp.to_le_bytes());
        code.extend_from_slice(&[0x48, 0x85, 0xC9]);

        let mut builder = MockMemoryBuilder::new(base)
            .with_region(DATA, 0x1000, None, false)
            .write_bytes(base + 0x100, &code)
            .write_u64(global, DATA)
            .write_u64(DATA + data_model::ROOT_POINTER, ROOT)
            .write_bytes(ROOT + data_model::LOADED_FLAG, &[1]);

        if let Some((id, name)) = session {
            builder = builder
                .write_u64(ROOT + data_model::SESSION_ID, id)
                .write_u32(ROOT + data_model::SESSION_NAME, name.len() as u32)
                .write_bytes(ROOT + data_model::SESSION_NAME + 4, name.as_bytes());
        }
        builder
    }

    fn probe(provider: &Arc<MockProvider>) -> ProcessProbe {
        ProcessProbe::new(
            Arc::clone(provider) as Arc<dyn ProcessProvider>,
            OffsetRegistry::new(table()),
            ReadLimits::default(),
        )
    }

    #[test]
    fn test_absent_without_process() {
        let provider = Arc::new(MockProvider::new());
        let mut probe = probe(&provider);
        assert_eq!(probe.observe(), Observation::Absent);
        assert_eq!(probe.epoch(), 0);
        assert!(probe.offsets().is_none());
    }

    #[test]
    fn test_session_observed() {
        let provider = Arc::new(MockProvider::new());
        provider.set_process(Some(target(BASE, Some((1234, "Lobby"))).build_arc()));
        let mut probe = probe(&provider);

        assert_eq!(
            probe.observe(),
            Observation::Session(SessionMarkers {
                name: "Lobby".to_string(),
                id: 1234
            })
        );
        assert_eq!(probe.epoch(), 1);
        assert_eq!(
            probe.offsets().unwrap().get("data_model"),
            Some(Address::new(BASE + 0x800))
        );
    }

    #[test]
    fn test_menu_when_no_session_id() {
        let provider = Arc::new(MockProvider::new());
        provider.set_process(Some(target(BASE, None).build_arc()));
        let mut probe = probe(&provider);
        assert_eq!(probe.observe(), Observation::Menu);
    }

    #[test]
    fn test_menu_when_root_is_null() {
        let provider = Arc::new(MockProvider::new());
        let process = target(BASE, Some((1, "x"))).write_u64(BASE + 0x800, 0).build_arc();
        provider.set_process(Some(process));
        let mut probe = probe(&provider);
        assert_eq!(probe.observe(), Observation::Menu);
    }

    #[test]
    fn test_menu_while_loading() {
        let provider = Arc::new(MockProvider::new());
        let process = target(BASE, Some((1, "x")))
            .write_bytes(ROOT + data_model::LOADED_FLAG, &[0])
            .build_arc();
        provider.set_process(Some(process));
        let mut probe = probe(&provider);
        assert_eq!(probe.observe(), Observation::Menu);
    }

    #[test]
    fn test_unresolved_without_signature() {
        let provider = Arc::new(MockProvider::new());
        provider.set_process(Some(MockMemoryBuilder::new(BASE).build_arc()));
        let mut probe = probe(&provider);

        assert_eq!(probe.observe(), Observation::Unresolved);
        assert_eq!(probe.epoch(), 1);
        assert!(probe.offsets().is_none());
    }

    #[test]
    fn test_oversized_name_is_inconclusive() {
        let provider = Arc::new(MockProvider::new());
        let process = target(BASE, Some((1, "x")))
            .write_u32(ROOT + data_model::SESSION_NAME, 5000)
            .build_arc();
        provider.set_process(Some(process));
        let mut probe = probe(&provider);
        assert_eq!(probe.observe(), Observation::Inconclusive);
    }

    #[test]
    fn test_restart_bumps_epoch_and_invalidates_offsets() {
        let provider = Arc::new(MockProvider::new());
        let first = target(BASE, Some((1, "first"))).pid(100).build();
        let first_alive = first.alive_flag();
        provider.set_process(Some(Arc::new(first) as Arc<dyn ProcessMemory>));

        let mut probe = probe(&provider);
        assert!(matches!(probe.observe(), Observation::Session(_)));
        let before = probe.offsets().unwrap();
        assert_eq!(before.epoch(), 1);

        // Same name, new incarnation at a different base
        first_alive.store(false, Ordering::SeqCst);
        let new_base = 0x1500_0000;
        provider.set_process(Some(target(new_base, Some((2, "second"))).pid(100).build_arc()));

        assert_eq!(
            probe.observe(),
            Observation::Session(SessionMarkers {
                name: "second".to_string(),
                id: 2
            })
        );
        let after = probe.offsets().unwrap();
        assert_eq!(probe.epoch(), 2);
        assert_eq!(after.epoch(), 2);
        assert_eq!(after.base(), Address::new(new_base));
        assert_eq!(after.get("data_model"), Some(Address::new(new_base + 0x800)));
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_exit_without_restart_is_absent() {
        let provider = Arc::new(MockProvider::new());
        let process = target(BASE, None).build();
        let alive = process.alive_flag();
        provider.set_process(Some(Arc::new(process) as Arc<dyn ProcessMemory>));

        let mut probe = probe(&provider);
        assert_eq!(probe.observe(), Observation::Menu);

        alive.store(false, Ordering::SeqCst);
        assert_eq!(probe.observe(), Observation::Absent);
        assert!(probe.offsets().is_none());
    }

    #[test]
    fn test_lookup_errors() {
        let provider = Arc::new(MockProvider::new());
        let mut probe = probe(&provider);

        provider.fail_next_find(crate::error::Error::ProcessNotFound("pid 7 has no stat entry".to_string()));
        assert_eq!(probe.observe(), Observation::Absent);

        provider.fail_next_find(crate::error::Error::ProcessOpenFailed("pid 7: denied".to_string()));
        assert_eq!(probe.observe(), Observation::Inconclusive);
        assert_eq!(probe.epoch(), 0);
    }

    #[test]
    fn test_initialize_delegates_to_provider() {
        let provider = Arc::new(MockProvider::failing_init("no access"));
        let mut probe = probe(&provider);
        assert!(probe.initialize().is_err());
    }
}

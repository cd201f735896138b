//! Background-polled detector.
//!
//! One poller thread feeds [`Observation`](crate::detector::Observation)s from a [`Probe`] into a
//! [`StateMachine`] and publishes the result. Readers never block the poller
//! for longer than a snapshot clone.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::DetectorConfig;
use crate::detector::{
    AtomicGameState, GameState, Probe, ProcessProbe, SessionInfo, ShutdownSignal, StateMachine,
};
use crate::error::Result;
use crate::memory::{NativeProvider, ProcessProvider};
use crate::offset::{OffsetRegistry, ResolvedOffsets, SignatureTable, builtin_signatures};

pub const POLLER_THREAD_NAME: &str = "sigscope-poller";

/// Notification sink for state changes
pub type StateCallback = Arc<dyn Fn(GameState) + Send + Sync>;

/// Consistent view of everything the detector publishes
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectorStatus {
    pub state: GameState,
    pub session: Option<SessionInfo>,
    pub epoch: u64,
    pub offsets: Option<Arc<ResolvedOffsets>>,
    pub running: bool,
}

#[derive(Debug, Default)]
struct Committed {
    state: GameState,
    session: Option<SessionInfo>,
    epoch: u64,
    offsets: Option<Arc<ResolvedOffsets>>,
}

thread_local! {
    /// Address of the `Shared` the current thread polls for, 0 elsewhere
    static POLLING: Cell<usize> = const { Cell::new(0) };
}

#[derive(Default)]
struct Shared {
    state: AtomicGameState,
    committed: Mutex<Committed>,
    callback: RwLock<Option<StateCallback>>,
    running: AtomicBool,
    /// Poller threads that have not finished their exit cleanup
    live_pollers: Mutex<usize>,
    poller_exited: Condvar,
}

impl Shared {
    fn id(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }

    fn has_live_poller(&self) -> bool {
        *lock(&self.live_pollers) > 0
    }

    fn wait_pollers_exited(&self) {
        let live = lock(&self.live_pollers);
        let _live = self
            .poller_exited
            .wait_while(live, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn committed(&self) -> MutexGuard<'_, Committed> {
        lock(&self.committed)
    }

    fn reset(&self) {
        let mut committed = self.committed();
        *committed = Committed {
            epoch: committed.epoch,
            ..Committed::default()
        };
        self.state.store(GameState::Unknown);
    }

    fn commit(&self, machine: &StateMachine, epoch: u64, offsets: Option<Arc<ResolvedOffsets>>) {
        let mut committed = self.committed();
        committed.state = machine.state();
        committed.session = machine.session().cloned();
        committed.epoch = epoch;
        committed.offsets = offsets;
        self.state.store(machine.state());
    }

    fn notify(&self, state: GameState) {
        let callback = self
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(state);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts one poller as live from spawn until its exit cleanup is done
struct LiveToken(Arc<Shared>);

impl LiveToken {
    fn new(shared: &Arc<Shared>) -> Self {
        *lock(&shared.live_pollers) += 1;
        Self(Arc::clone(shared))
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        let mut live = lock(&self.0.live_pollers);
        *live = live.saturating_sub(1);
        self.0.poller_exited.notify_all();
    }
}

#[derive(Default)]
struct Lifecycle {
    poller: Option<JoinHandle<()>>,
    shutdown: Option<Arc<ShutdownSignal>>,
}

/// Tracks the target application's state on a background thread.
pub struct GameDetector {
    shared: Arc<Shared>,
    probe: Arc<Mutex<Box<dyn Probe>>>,
    lifecycle: Mutex<Lifecycle>,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl GameDetector {
    pub fn builder() -> GameDetectorBuilder {
        GameDetectorBuilder::default()
    }

    /// Start polling. Returns `false` if memory access could not be set up.
    ///
    /// Calling `start` on a running detector does nothing and returns `true`.
    /// A poller that is still shutting down after `stop` is waited for, so
    /// at most one poller thread exists at a time. From inside that retiring
    /// poller (a state-change callback after `stop`) waiting is impossible,
    /// and `start` returns `false`.
    pub fn start(&self) -> bool {
        let Some(mut lifecycle) = self.idle_lifecycle() else {
            warn!("start() from a stopping poller is ignored");
            return false;
        };
        if lifecycle.poller.is_some() {
            return true;
        }

        if let Err(e) = lock(&self.probe).initialize() {
            error!("Cannot start detector: {}", e);
            return false;
        }

        self.shared.reset();
        let shutdown = Arc::new(ShutdownSignal::new());
        let poller = Poller {
            live: LiveToken::new(&self.shared),
            shared: Arc::clone(&self.shared),
            probe: Arc::clone(&self.probe),
            shutdown: Arc::clone(&shutdown),
            poll_interval: self.poll_interval,
            error_backoff: self.error_backoff,
        };

        self.shared.running.store(true, Ordering::SeqCst);
        match thread::Builder::new()
            .name(POLLER_THREAD_NAME.to_string())
            .spawn(move || poller.run())
        {
            Ok(handle) => {
                lifecycle.poller = Some(handle);
                lifecycle.shutdown = Some(shutdown);
                info!("Detector started");
                true
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                error!("Failed to spawn poller thread: {}", e);
                false
            }
        }
    }

    /// Lifecycle guard once no retired poller is left, or with a running one.
    ///
    /// `None` when called from this detector's own retiring poller.
    fn idle_lifecycle(&self) -> Option<MutexGuard<'_, Lifecycle>> {
        loop {
            let lifecycle = lock(&self.lifecycle);
            if lifecycle.poller.is_some() || !self.shared.has_live_poller() {
                return Some(lifecycle);
            }
            if POLLING.with(Cell::get) == self.shared.id() {
                return None;
            }

            // the retiring poller may need the lifecycle lock from a callback
            drop(lifecycle);
            debug!("Waiting for the previous poller to exit");
            self.shared.wait_pollers_exited();
        }
    }

    /// Stop polling and wait for the poller to exit.
    ///
    /// From inside the poller (a state-change callback), the poller is told
    /// to exit after the current tick and not waited for.
    pub fn stop(&self) {
        let (poller, shutdown) = {
            let mut lifecycle = lock(&self.lifecycle);
            (lifecycle.poller.take(), lifecycle.shutdown.take())
        };

        let Some(poller) = poller else {
            return;
        };
        if let Some(shutdown) = shutdown {
            shutdown.trigger();
        }
        self.shared.running.store(false, Ordering::SeqCst);

        if poller.thread().id() == thread::current().id() {
            debug!("stop() called from the poller, detaching");
            return;
        }
        if poller.join().is_err() {
            warn!("Poller thread panicked");
        }
        info!("Detector stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn current_state(&self) -> GameState {
        self.shared.state.load()
    }

    pub fn current_session(&self) -> Option<SessionInfo> {
        self.shared.committed().session.clone()
    }

    pub fn current_offsets(&self) -> Option<Arc<ResolvedOffsets>> {
        self.shared.committed().offsets.clone()
    }

    pub fn status(&self) -> DetectorStatus {
        let committed = self.shared.committed();
        DetectorStatus {
            state: committed.state,
            session: committed.session.clone(),
            epoch: committed.epoch,
            offsets: committed.offsets.clone(),
            running: self.is_running(),
        }
    }

    /// Replace the state-change callback. Only the last one set is called.
    pub fn set_on_state_change<F>(&self, callback: F)
    where
        F: Fn(GameState) + Send + Sync + 'static,
    {
        *self
            .shared
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }
}

impl Drop for GameDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Poller {
    live: LiveToken,
    shared: Arc<Shared>,
    probe: Arc<Mutex<Box<dyn Probe>>>,
    shutdown: Arc<ShutdownSignal>,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl Poller {
    fn run(self) {
        debug!("Poller running");
        POLLING.with(|polling| polling.set(self.shared.id()));
        let mut machine = StateMachine::new();

        while !self.shutdown.is_shutdown() {
            let started = Instant::now();
            // regular ticks keep their cadence; backoff counts from the failure
            let stopped = match panic::catch_unwind(AssertUnwindSafe(|| self.tick(&mut machine))) {
                Ok(false) => self.shutdown.wait_until(started + self.poll_interval),
                Ok(true) => self.shutdown.wait(self.error_backoff),
                Err(payload) => {
                    error!("Detector tick panicked: {}", panic_message(payload.as_ref()));
                    self.shutdown.wait(self.error_backoff)
                }
            };
            if stopped {
                break;
            }
        }

        lock(&self.probe).release();
        self.shared.committed().offsets = None;
        POLLING.with(|polling| polling.set(0));
        debug!("Poller exited");
        drop(self.live);
    }

    /// One observation, commit, notify. Returns whether to back off.
    fn tick(&self, machine: &mut StateMachine) -> bool {
        let (observation, epoch, offsets) = {
            let mut probe = lock(&self.probe);
            let observation = probe.observe();
            (observation, probe.epoch(), probe.offsets())
        };
        let backoff = observation.wants_backoff();

        let previous = machine.state();
        let changed = machine.advance(observation, Local::now());
        self.shared.commit(machine, epoch, offsets);

        if let Some(state) = changed {
            info!("State changed: {} -> {}", previous, state);
            self.shared.notify(state);
        }
        backoff
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Builder for GameDetector
#[derive(Default)]
pub struct GameDetectorBuilder {
    config: Option<DetectorConfig>,
    provider: Option<Arc<dyn ProcessProvider>>,
    table: Option<SignatureTable>,
    probe: Option<Box<dyn Probe>>,
    callback: Option<StateCallback>,
}

impl GameDetectorBuilder {
    pub fn config(mut self, config: DetectorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Provider used to find the target; defaults to the host OS
    pub fn provider(mut self, provider: Arc<dyn ProcessProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Signature table; defaults to the builtin one
    pub fn signatures(mut self, table: SignatureTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Replace the process-backed probe entirely
    pub fn probe(mut self, probe: Box<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn on_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(GameState) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<GameDetector> {
        let config = self.config.unwrap_or_default();

        let probe = match self.probe {
            Some(probe) => probe,
            None => {
                let table = match self.table {
                    Some(table) => table,
                    None => builtin_signatures()?,
                };
                let provider = self
                    .provider
                    .unwrap_or_else(|| Arc::new(NativeProvider::new(config.process_name.clone())));
                let registry = OffsetRegistry::new(table)
                    .with_scan_options(config.scan)
                    .with_cache_path(config.cache_path.clone());
                Box::new(ProcessProbe::new(provider, registry, config.limits)) as Box<dyn Probe>
            }
        };

        let shared = Shared {
            callback: RwLock::new(self.callback),
            ..Shared::default()
        };

        Ok(GameDetector {
            shared: Arc::new(shared),
            probe: Arc::new(Mutex::new(probe)),
            lifecycle: Mutex::new(Lifecycle::default()),
            poll_interval: config.poll_interval,
            error_backoff: config.error_backoff,
        })
    }
}

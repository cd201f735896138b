mod game_detector;
mod machine;
mod probe;
mod session;
mod shutdown;
mod state;

pub use game_detector::{
    DetectorStatus, GameDetector, GameDetectorBuilder, POLLER_THREAD_NAME, StateCallback,
};
pub use machine::{Observation, StateMachine};
pub use probe::{Probe, ProcessProbe};
pub use session::{SessionInfo, SessionMarkers};
pub use shutdown::ShutdownSignal;
pub use state::{AtomicGameState, GameState};

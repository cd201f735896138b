//! Pure transition logic of the detector.
//!
//! Knows nothing about processes or threads: it is fed one [`Observation`]
//! per tick and reports when the coarse state changed.

use chrono::{DateTime, Local};

use crate::detector::{GameState, SessionInfo, SessionMarkers};

/// What one tick saw in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// No target process
    Absent,
    /// Process present but required offsets are not resolved
    Unresolved,
    /// Resolved, no session joined
    Menu,
    /// Resolved and inside a session
    Session(SessionMarkers),
    /// A read failed; nothing can be concluded
    Inconclusive,
}

impl Observation {
    /// Whether the next tick should come after the error backoff
    pub fn wants_backoff(&self) -> bool {
        matches!(self, Self::Unresolved | Self::Inconclusive)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    state: GameState,
    session: Option<SessionInfo>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    pub fn reset(&mut self) {
        self.state = GameState::Unknown;
        self.session = None;
    }

    /// Apply one observation. Returns the new state if it changed.
    pub fn advance(&mut self, observation: Observation, now: DateTime<Local>) -> Option<GameState> {
        use GameState::*;

        let previous = self.state;
        let next = match (previous, observation) {
            (_, Observation::Inconclusive) => previous,

            (_, Observation::Absent) => {
                self.session = None;
                NotRunning
            }

            // A present target always passes through Connecting first
            (Unknown | NotRunning, _) => Connecting,

            (_, Observation::Unresolved) => {
                self.session = None;
                Connecting
            }

            (_, Observation::Menu) => {
                self.session = None;
                InMenu
            }

            (InGame, Observation::Session(markers)) => {
                match self.session.as_mut() {
                    Some(session) if session.id == markers.id => session.name = markers.name,
                    _ => self.session = Some(SessionInfo::join(markers, now)),
                }
                InGame
            }

            (Connecting | InMenu, Observation::Session(markers)) => {
                self.session = Some(SessionInfo::join(markers, now));
                InGame
            }
        };

        self.state = next;
        (next != previous).then_some(next)
    }
}

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

/// Coarse state of the target application
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    FromRepr,
    IntoStaticStr,
    Display,
)]
#[repr(u8)]
pub enum GameState {
    #[default]
    Unknown = 0,
    NotRunning = 1,
    /// Process found, offsets not yet usable
    Connecting = 2,
    InMenu = 3,
    InGame = 4,
}

/// A [`GameState`] readable without taking a lock
#[derive(Debug, Default)]
pub struct AtomicGameState(AtomicU8);

impl AtomicGameState {
    pub fn new(state: GameState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> GameState {
        GameState::from_repr(self.0.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn store(&self, state: GameState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_roundtrip() {
        for state in [
            GameState::Unknown,
            GameState::NotRunning,
            GameState::Connecting,
            GameState::InMenu,
            GameState::InGame,
        ] {
            assert_eq!(GameState::from_repr(state as u8), Some(state));
        }
        assert_eq!(GameState::from_repr(5), None);
    }

    #[test]
    fn test_atomic_state() {
        let state = AtomicGameState::default();
        assert_eq!(state.load(), GameState::Unknown);
        state.store(GameState::InGame);
        assert_eq!(state.load(), GameState::InGame);
    }

    #[test]
    fn test_display() {
        assert_eq!(GameState::InMenu.to_string(), "InMenu");
        let name: &'static str = GameState::NotRunning.into();
        assert_eq!(name, "NotRunning");
    }
}

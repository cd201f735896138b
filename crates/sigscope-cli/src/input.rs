//! Keyboard controls for `watch`.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use sigscope_core::ShutdownSignal;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

const KEY_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Esc, q/Q, or Ctrl+C (raw-mode terminals do not deliver it as a signal)
    Quit,
    /// s/S: print the detector status
    Status,
}

impl KeyAction {
    pub fn from_event(event: &KeyEvent) -> Option<Self> {
        if event.kind == KeyEventKind::Release {
            return None;
        }
        match event.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Some(Self::Quit),
            KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Self::Quit)
            }
            KeyCode::Char('s') | KeyCode::Char('S') => Some(Self::Status),
            _ => None,
        }
    }
}

/// Watch the keyboard until `shutdown` fires, triggering it on a quit key
/// and calling `on_status` for the status key.
pub fn spawn_keyboard_monitor<F>(shutdown: Arc<ShutdownSignal>, on_status: F) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    thread::spawn(move || {
        debug!("Keyboard monitor started");

        while !shutdown.is_shutdown() {
            if !event::poll(KEY_POLL).unwrap_or(false) {
                continue;
            }
            let Ok(Event::Key(key_event)) = event::read() else {
                continue;
            };

            match KeyAction::from_event(&key_event) {
                Some(KeyAction::Quit) => {
                    debug!("Quit key pressed: {:?}", key_event.code);
                    shutdown.trigger();
                }
                Some(KeyAction::Status) => on_status(),
                None => {}
            }
        }

        debug!("Keyboard monitor stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(code: KeyCode, modifiers: KeyModifiers) -> Option<KeyAction> {
        KeyAction::from_event(&KeyEvent::new(code, modifiers))
    }

    #[test]
    fn test_quit_keys() {
        assert_eq!(action(KeyCode::Esc, KeyModifiers::NONE), Some(KeyAction::Quit));
        assert_eq!(action(KeyCode::Char('q'), KeyModifiers::NONE), Some(KeyAction::Quit));
        assert_eq!(action(KeyCode::Char('Q'), KeyModifiers::SHIFT), Some(KeyAction::Quit));
        assert_eq!(action(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(KeyAction::Quit));
    }

    #[test]
    fn test_status_key() {
        assert_eq!(action(KeyCode::Char('s'), KeyModifiers::NONE), Some(KeyAction::Status));
        assert_eq!(action(KeyCode::Char('S'), KeyModifiers::SHIFT), Some(KeyAction::Status));
    }

    #[test]
    fn test_other_keys_ignored() {
        assert_eq!(action(KeyCode::Char('a'), KeyModifiers::NONE), None);
        assert_eq!(action(KeyCode::Enter, KeyModifiers::NONE), None);
        assert_eq!(action(KeyCode::Char('c'), KeyModifiers::NONE), None);
    }

    #[test]
    fn test_key_release_ignored() {
        let mut event = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        event.kind = KeyEventKind::Release;
        assert_eq!(KeyAction::from_event(&event), None);
    }
}

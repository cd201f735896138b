use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One-shot stop flag with interruptible sleeps.
///
/// The poller sleeps on it between ticks, so `stop` does not have to wait out
/// a full poll interval. Once triggered it stays triggered.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: Mutex<bool>,
    wake: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.triggered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Trigger the signal and wake every sleeper.
    pub fn trigger(&self) {
        *self.flag() = true;
        self.wake.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        *self.flag()
    }

    /// Sleep for `duration` unless triggered first.
    ///
    /// Returns `true` if the signal is triggered, `false` if the full
    /// duration elapsed.
    pub fn wait(&self, duration: Duration) -> bool {
        let triggered = self.flag();
        let (triggered, _) = self
            .wake
            .wait_timeout_while(triggered, duration, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *triggered
    }

    /// Like [`wait`](Self::wait), up to an absolute deadline
    pub fn wait_until(&self, deadline: Instant) -> bool {
        self.wait(deadline.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_trigger_is_sticky() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_shutdown());
        signal.trigger();
        signal.trigger();
        assert!(signal.is_shutdown());
    }

    #[test]
    fn test_wait_runs_full_duration() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();
        assert!(!signal.wait(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_trigger_wakes_every_sleeper() {
        let signal = Arc::new(ShutdownSignal::new());
        let sleepers: Vec<_> = (0..3)
            .map(|_| {
                let signal = Arc::clone(&signal);
                thread::spawn(move || {
                    let start = Instant::now();
                    (signal.wait(Duration::from_secs(10)), start.elapsed())
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        signal.trigger();

        for sleeper in sleepers {
            let (woken, elapsed) = sleeper.join().unwrap();
            assert!(woken);
            assert!(elapsed < Duration::from_secs(5));
        }
    }

    #[test]
    fn test_triggered_signal_does_not_sleep() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        let start = Instant::now();
        assert!(signal.wait(Duration::from_secs(10)));
        assert!(signal.wait_until(start + Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_until_past_deadline_returns_at_once() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_until(start));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

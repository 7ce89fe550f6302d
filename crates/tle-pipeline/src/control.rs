//! Cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared stop flag, checked between files, objects and requests.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Block for `duration` in short slices. Returns `false` if the signal
    /// fired before the time was up.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Clears an "in progress" flag when a run ends, however it ends.
pub(crate) struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    /// `None` if a run already holds the flag.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_runs_to_completion() {
        let signal = StopSignal::new();
        assert!(signal.sleep(Duration::from_millis(20)));
    }

    #[test]
    fn test_stop_interrupts_sleep() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        let started = Instant::now();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.stop();
        });

        assert!(!signal.sleep(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_run_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = RunGuard::acquire(&flag).unwrap();
        assert!(RunGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(RunGuard::acquire(&flag).is_some());
    }
}

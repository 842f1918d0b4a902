//! Per-call controller state: timeout budget, failure/cancel flags.
//!
//! A fresh [`Controller`] is created per call. It is not safe for two
//! threads to mutate it concurrently in general, but the cancel flag is
//! specifically designed to be observable and settable from a different
//! thread than the one driving the call — `Controller` is cheap to clone
//! (it's an `Arc` handle) so a watchdog thread can hold its own clone and
//! call `start_cancel()` while the call is in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT_MS: u64 = 15_000;

struct Inner {
    failed: AtomicBool,
    canceled: AtomicBool,
    timeout_ms: AtomicU64,
    start_time: Mutex<Option<Instant>>,
    err_text: Mutex<String>,
    #[allow(clippy::type_complexity)]
    cancel_hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            failed: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
            timeout_ms: AtomicU64::new(DEFAULT_TIMEOUT_MS),
            start_time: Mutex::new(None),
            err_text: Mutex::new(String::new()),
            cancel_hooks: Mutex::new(Vec::new()),
        }
    }
}

/// Per-call state object. Clone to share a handle with a canceling thread.
///
/// - Why: a call needs one place to carry its timeout budget, its
///   terminal failure/cancel flags, and a way for code outside the call's
///   own task (a watchdog, a supervisor) to abort it without holding a
///   `&mut` reference to anything the call itself owns.
/// - What: `new` starts a fresh, un-started controller with the default
///   timeout; `set_start_time` marks the clock running; `is_timeout`,
///   `failed`, `is_canceled` are the three boolean questions callers poll;
///   `set_failed`/`start_cancel` are the two ways a controller moves into
///   a terminal state, and `reset` is the only way back out.
/// - Trade-offs: cloning shares the same `Arc<Inner>`, so two clones are
///   the same controller, not two independent ones — callers that want
///   per-retry-attempt isolation must build a fresh `Controller`, not
///   clone and reset an old one mid-flight.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self { inner: Arc::new(Inner::default()) }
    }

    pub fn set_timeout(&self, ms: u64) {
        self.inner.timeout_ms.store(ms, Ordering::Relaxed);
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.inner.timeout_ms.load(Ordering::Relaxed))
    }

    /// Samples the monotonic clock. Callers invoke this at the start of
    /// `CallMethod`, before any I/O.
    pub fn set_start_time(&self) {
        *self.inner.start_time.lock().unwrap() = Some(Instant::now());
    }

    /// True iff elapsed time since `set_start_time` is at least the
    /// configured timeout. False if the call hasn't started yet.
    pub fn is_timeout(&self) -> bool {
        match *self.inner.start_time.lock().unwrap() {
            Some(start) => start.elapsed() >= self.timeout(),
            None => false,
        }
    }

    pub fn failed(&self) -> bool {
        self.inner.failed.load(Ordering::Acquire)
    }

    pub fn error_text(&self) -> String {
        self.inner.err_text.lock().unwrap().clone()
    }

    /// Single-shot error channel: once set, stays set until `reset`.
    ///
    /// - Contract: the first call wins the error text for the life of the
    ///   controller (later calls still overwrite it — there is no
    ///   compare-and-swap here — but callers are expected to call this at
    ///   most once per terminal outcome, since a call only fails once).
    pub fn set_failed(&self, reason: impl Into<String>) {
        *self.inner.err_text.lock().unwrap() = reason.into();
        self.inner.failed.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.inner.failed.store(false, Ordering::Release);
        self.inner.canceled.store(false, Ordering::Release);
        self.inner.timeout_ms.store(DEFAULT_TIMEOUT_MS, Ordering::Relaxed);
        *self.inner.start_time.lock().unwrap() = None;
        self.inner.err_text.lock().unwrap().clear();
    }

    /// Requests abort. Safe to call from a thread other than the one
    /// driving the call.
    ///
    /// - Why: a watchdog holding a cloned `Controller` needs to be able
    ///   to tear a call down without synchronizing with the task actually
    ///   running it.
    /// - What: flips the cancel flag, records `"canceled"` as the failure
    ///   text, then drains and runs every hook registered via
    ///   `notify_on_cancel` — each hook runs at most once, in registration
    ///   order, on whichever thread calls `start_cancel`.
    pub fn start_cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
        self.set_failed("canceled");
        let hooks = std::mem::take(&mut *self.inner.cancel_hooks.lock().unwrap());
        for hook in hooks {
            hook();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    /// Runs `cb` immediately if already canceled; otherwise remembers it
    /// for when `start_cancel` runs. Best-effort — not required for
    /// correctness, so a hook registered concurrently with cancellation
    /// may or may not fire.
    pub fn notify_on_cancel(&self, cb: impl FnOnce() + Send + 'static) {
        if self.is_canceled() {
            cb();
            return;
        }
        self.inner.cancel_hooks.lock().unwrap().push(Box::new(cb));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn timeout_fires_after_elapsed_budget() {
        let ctl = Controller::new();
        ctl.set_timeout(100);
        ctl.set_start_time();
        assert!(!ctl.is_timeout());
        thread::sleep(Duration::from_millis(200));
        assert!(ctl.is_timeout());
    }

    #[test]
    fn no_timeout_without_sleep() {
        let ctl = Controller::new();
        ctl.set_timeout(1_000);
        ctl.set_start_time();
        assert!(!ctl.is_timeout());
    }

    #[test]
    fn start_cancel_sets_failed_and_canceled() {
        let ctl = Controller::new();
        ctl.start_cancel();
        assert!(ctl.failed());
        assert!(ctl.is_canceled());
        assert_eq!(ctl.error_text(), "canceled");
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let ctl = Controller::new();
        ctl.set_timeout(42);
        ctl.set_start_time();
        ctl.start_cancel();
        ctl.reset();
        assert!(!ctl.failed());
        assert!(!ctl.is_canceled());
        assert_eq!(ctl.error_text(), "");
        assert_eq!(ctl.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn cancel_observable_from_another_thread() {
        let ctl = Controller::new();
        let canceller = ctl.clone();
        let handle = thread::spawn(move || canceller.start_cancel());
        handle.join().unwrap();
        assert!(ctl.is_canceled());
    }

    #[test]
    fn notify_on_cancel_runs_immediately_when_already_canceled() {
        let ctl = Controller::new();
        ctl.start_cancel();
        let (tx, rx) = std::sync::mpsc::channel();
        ctl.notify_on_cancel(move || tx.send(()).unwrap());
        rx.try_recv().expect("hook ran synchronously");
    }
}

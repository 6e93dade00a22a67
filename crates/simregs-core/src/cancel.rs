//! Cooperative cancellation for blocking waits.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Wakes a blocked waiter so it can observe cancellation.
pub trait Interrupt: Send + Sync {
    /// Unparks every waiter that may be blocked on this object.
    fn interrupt(&self);
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    hooks: Mutex<Vec<(u64, Weak<dyn Interrupt>)>>,
    gate: Mutex<()>,
    wake: Condvar,
}

/// Shared cancellation flag handed to blocking calls.
///
/// Cloning yields a handle to the same flag. Once cancelled, a token stays
/// cancelled.
#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl CancelToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Sets the flag and interrupts every registered waiter.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        {
            let _gate = self.state.gate.lock();
            self.state.wake.notify_all();
        }
        let hooks: Vec<_> = self
            .state
            .hooks
            .lock()
            .iter()
            .filter_map(|(_, hook)| hook.upgrade())
            .collect();
        for hook in hooks {
            hook.interrupt();
        }
    }

    /// Sleeps for `timeout` or until cancelled; returns the cancelled flag.
    pub fn sleep(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut gate = self.state.gate.lock();
        while !self.is_cancelled() {
            if self.state.wake.wait_until(&mut gate, deadline).timed_out() {
                break;
            }
        }
        self.is_cancelled()
    }

    /// Registers `hook` until the returned guard is dropped.
    ///
    /// Callers must re-check [`is_cancelled`](Self::is_cancelled) after
    /// registering, since a cancel racing the registration does not call the
    /// hook.
    #[must_use = "the hook is deregistered when the guard drops"]
    pub fn register(&self, hook: Weak<dyn Interrupt>) -> CancelRegistration {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.hooks.lock().push((id, hook));
        CancelRegistration {
            token: self.clone(),
            id,
        }
    }
}

/// Guard that removes an interrupt hook from its token on drop.
#[derive(Debug)]
pub struct CancelRegistration {
    token: CancelToken,
    id: u64,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        self.token
            .state
            .hooks
            .lock()
            .retain(|(id, _)| *id != self.id);
    }
}

//! Long-running observer loop over committed cycles.

use std::time::Duration;

use tracing::{debug, warn};

use crate::{AddressSpace, CancelToken, CycleObserver, RegisterError};

/// Default bound on a single SETTLED wait before the loop re-evaluates.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(1);
/// Default pause after a transport failure.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Observer loop timing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ObserverConfig {
    /// Wall-clock bound of each phase wait.
    pub refresh: Duration,
    /// Fixed delay before retrying after a transport failure.
    pub retry_backoff: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            refresh: DEFAULT_REFRESH,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Counters reported when a loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverStats {
    /// Committed cycles handed to the callback.
    pub cycles: u64,
    /// Phase waits that hit the refresh bound.
    pub refreshes: u64,
    /// Transport failures recovered from.
    pub retries: u64,
}

/// Wait-SETTLED, sample, wait-SETTLING loop.
///
/// Transport failures never end the loop: they are logged, followed by a
/// fixed backoff, and the loop resynchronizes with the sentinels. Only
/// cancellation or a non-transport error returns.
#[derive(Debug, Clone, Default)]
pub struct ObserverLoop {
    config: ObserverConfig,
}

impl ObserverLoop {
    /// Creates a loop with the given timing.
    #[must_use]
    pub const fn new(config: ObserverConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Runs until `cancel` fires, calling `on_settled` once per committed cycle
    /// with that cycle's SETTLED sentinel.
    ///
    /// # Errors
    ///
    /// Address and access errors from the space or the callback.
    pub fn run<F>(
        &self,
        space: &dyn AddressSpace,
        cancel: &CancelToken,
        mut on_settled: F,
    ) -> Result<ObserverStats, RegisterError>
    where
        F: FnMut(u32) -> Result<(), RegisterError>,
    {
        let refresh_ms = u64::try_from(self.config.refresh.as_millis()).unwrap_or(u64::MAX);
        let mut stats = ObserverStats::default();
        let mut observer: Option<CycleObserver<'_>> = None;

        while !cancel.is_cancelled() {
            let result = match observer.take() {
                Some(mut current) => {
                    let step = Self::observe(&mut current, cancel, &mut on_settled, &mut stats);
                    observer = Some(current);
                    step
                }
                None => CycleObserver::new(space, refresh_ms).map(|fresh| {
                    debug!(sentinel = fresh.last_settled(), "observer synchronized");
                    observer = Some(fresh);
                }),
            };

            match result {
                Ok(()) | Err(RegisterError::Interrupted) => {}
                Err(err) if err.is_recoverable() => {
                    warn!(%err, backoff = ?self.config.retry_backoff, "update loop failed");
                    stats.retries += 1;
                    observer = None;
                    cancel.sleep(self.config.retry_backoff);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(stats)
    }

    fn observe<F>(
        observer: &mut CycleObserver<'_>,
        cancel: &CancelToken,
        on_settled: &mut F,
        stats: &mut ObserverStats,
    ) -> Result<(), RegisterError>
    where
        F: FnMut(u32) -> Result<(), RegisterError>,
    {
        let Some(sentinel) = observer.next_settled(Some(cancel))? else {
            stats.refreshes += 1;
            return Ok(());
        };
        stats.cycles += 1;
        on_settled(sentinel)?;
        if !observer.next_settling(Some(cancel))? {
            stats.refreshes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::{ObserverConfig, ObserverLoop};
    use crate::{
        AddressSpace, CancelToken, DirectAddressSpace, RegisterError, WaitCondition, WaitOutcome,
    };

    /// Address space whose every call fails with a transport error.
    struct Severed(AtomicUsize);

    impl AddressSpace for Severed {
        fn read(&self, _address: u32) -> Result<u32, RegisterError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(RegisterError::transport("connection reset"))
        }

        fn write(&self, _address: u32, _value: u32) -> Result<(), RegisterError> {
            Err(RegisterError::transport("connection reset"))
        }

        fn wait(
            &self,
            _condition: &WaitCondition,
            _cancel: Option<&CancelToken>,
        ) -> Result<WaitOutcome, RegisterError> {
            Err(RegisterError::transport("connection reset"))
        }

        fn provides_address(&self, _address: u32) -> Result<bool, RegisterError> {
            Err(RegisterError::transport("connection reset"))
        }

        fn describe(&self, _address: u32) -> Result<String, RegisterError> {
            Err(RegisterError::transport("connection reset"))
        }
    }

    fn fast_config() -> ObserverConfig {
        ObserverConfig {
            refresh: Duration::from_millis(20),
            retry_backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn transport_failures_back_off_and_retry() {
        let space = Severed(AtomicUsize::new(0));
        let cancel = CancelToken::new();
        let stopper = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                cancel.cancel();
            })
        };
        let stats = ObserverLoop::new(fast_config())
            .run(&space, &cancel, |_| Ok(()))
            .expect("loop ends on cancel");
        stopper.join().expect("stopper thread");
        assert!(stats.retries >= 2);
        assert_eq!(stats.cycles, 0);
        assert!(space.0.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn each_commit_is_observed_once() {
        let space = Arc::new(DirectAddressSpace::default());
        let cancel = CancelToken::new();
        let engine = {
            let space = Arc::clone(&space);
            let cancel = cancel.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    space.step(true).expect("step");
                    thread::sleep(Duration::from_millis(2));
                }
                thread::sleep(Duration::from_millis(20));
                cancel.cancel();
            })
        };

        let mut seen = Vec::new();
        let stats = ObserverLoop::new(fast_config())
            .run(space.as_ref(), &cancel, |sentinel| {
                seen.push(sentinel);
                Ok(())
            })
            .expect("loop ends on cancel");
        engine.join().expect("engine thread");

        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(stats.cycles as usize, seen.len());
    }

    #[test]
    fn non_transport_errors_end_the_loop() {
        let space = Arc::new(DirectAddressSpace::default());
        let cancel = CancelToken::new();
        let engine = {
            let space = Arc::clone(&space);
            let cancel = cancel.clone();
            thread::spawn(move || {
                while !cancel.is_cancelled() {
                    space.step(false).expect("step");
                    thread::sleep(Duration::from_millis(2));
                }
            })
        };
        let result = ObserverLoop::new(fast_config()).run(space.as_ref(), &cancel, |_| {
            Err(RegisterError::ReadOnly { address: 0 })
        });
        cancel.cancel();
        engine.join().expect("engine thread");
        assert_eq!(result, Err(RegisterError::ReadOnly { address: 0 }));
    }
}

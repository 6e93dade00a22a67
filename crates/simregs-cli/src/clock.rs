//! Free-running engine clock for `simregs serve`.

use std::time::Duration;

use simregs_core::{CancelToken, DirectAddressSpace};
use tracing::{debug, warn};

/// Default interval between cycles.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(10);

/// Engine clock settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub period: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
        }
    }
}

/// Steps a direct address space until cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    config: ClockConfig,
}

impl Clock {
    /// Creates a clock.
    #[must_use]
    pub const fn new(config: ClockConfig) -> Self {
        Self { config }
    }

    /// Runs SETTLING/SETTLED cycles, waiting for observer acknowledgment on
    /// every commit. Returns the number of completed cycles.
    pub fn run(&self, space: &DirectAddressSpace, stop: &CancelToken) -> u64 {
        let mut cycles = 0;
        while !stop.is_cancelled() {
            match space.step(true) {
                Ok(outcome) => {
                    cycles += 1;
                    if !outcome.acknowledged && outcome.watchers > 0 {
                        debug!(cycle = outcome.cycle, "observers slow to acknowledge");
                    }
                }
                Err(err) => warn!(%err, "engine step failed"),
            }
            stop.sleep(self.config.period);
        }
        cycles
    }
}

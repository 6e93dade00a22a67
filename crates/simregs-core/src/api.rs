//! Address-space contract shared by the direct and remote implementations.

use std::sync::Arc;
use std::time::Duration;

use crate::{CancelToken, RegisterError, ALL_BITS};

/// Default bound on how long a trigger waits for an observer acknowledgment.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Blocking condition `(value & mask) == (expected & mask)` with dual bounds.
///
/// A timeout of zero is unbounded in that dimension; when both are zero the
/// wait blocks until the condition holds, the caller cancels, or the
/// transport fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct WaitCondition {
    /// Register to watch.
    pub address: u32,
    /// Value to compare against under `mask`.
    pub expected: u32,
    /// Bits participating in the comparison.
    pub mask: u32,
    /// Bound in committed cycles, `0` for none.
    pub cycles_timeout: u64,
    /// Bound in wall-clock milliseconds, `0` for none.
    pub millis_timeout: u64,
}

impl WaitCondition {
    /// Full-mask, unbounded condition.
    #[must_use]
    pub const fn new(address: u32, expected: u32) -> Self {
        Self {
            address,
            expected,
            mask: ALL_BITS,
            cycles_timeout: 0,
            millis_timeout: 0,
        }
    }

    /// Restricts the comparison to `mask`.
    #[must_use]
    pub const fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    /// Bounds the wait by committed cycles.
    #[must_use]
    pub const fn with_cycles_timeout(mut self, cycles: u64) -> Self {
        self.cycles_timeout = cycles;
        self
    }

    /// Bounds the wait by wall-clock milliseconds.
    #[must_use]
    pub const fn with_millis_timeout(mut self, millis: u64) -> Self {
        self.millis_timeout = millis;
        self
    }

    /// Returns `true` when `value` satisfies the condition.
    #[must_use]
    pub const fn matches(&self, value: u32) -> bool {
        value & self.mask == self.expected & self.mask
    }

    /// Wall-clock bound, if any.
    #[must_use]
    pub const fn time_limit(&self) -> Option<Duration> {
        if self.millis_timeout == 0 {
            None
        } else {
            Some(Duration::from_millis(self.millis_timeout))
        }
    }

    /// Returns `true` when `elapsed` committed cycles exhaust the cycle bound.
    #[must_use]
    pub const fn cycles_exhausted(&self, elapsed: u64) -> bool {
        self.cycles_timeout != 0 && elapsed >= self.cycles_timeout
    }
}

/// Result of a wait that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum WaitOutcome {
    /// Condition held.
    Satisfied {
        /// Committed cycles between the start of the wait and success.
        cycles: u64,
    },
    /// A bound elapsed first. This is an expected outcome, not a failure.
    TimedOut {
        /// Committed cycles that elapsed before giving up.
        cycles: u64,
    },
}

impl WaitOutcome {
    /// Cycles elapsed during the wait.
    #[must_use]
    pub const fn cycles(self) -> u64 {
        match self {
            Self::Satisfied { cycles } | Self::TimedOut { cycles } => cycles,
        }
    }

    /// Returns `true` when the condition held.
    #[must_use]
    pub const fn is_satisfied(self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }
}

/// Uniform read/write/wait access to simulation registers.
///
/// Implementations are location transparent: the same contract holds for an
/// in-process register file and for a connection to a remote server. Only the
/// remote side ever returns [`RegisterError::Transport`].
///
/// On the two phase-sentinel addresses a full-mask wait is satisfied once the
/// counter has reached or passed `expected` (wrapping sequence comparison), so
/// back-to-back transitions cannot strand a waiter that asked for `n + 1`.
pub trait AddressSpace: Send + Sync {
    /// Reads one register.
    ///
    /// # Errors
    ///
    /// [`RegisterError::Unmapped`] or [`RegisterError::Misaligned`] for bad
    /// addresses, [`RegisterError::Transport`] for remote failures.
    fn read(&self, address: u32) -> Result<u32, RegisterError>;

    /// Writes one register.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read), plus [`RegisterError::ReadOnly`].
    fn write(&self, address: u32, value: u32) -> Result<(), RegisterError>;

    /// Blocks until `condition` holds or one of its bounds elapses.
    ///
    /// # Errors
    ///
    /// [`RegisterError::Interrupted`] when `cancel` fires,
    /// [`RegisterError::Transport`] when the connection fails mid-wait, and
    /// the address errors of [`read`](Self::read).
    fn wait(
        &self,
        condition: &WaitCondition,
        cancel: Option<&CancelToken>,
    ) -> Result<WaitOutcome, RegisterError>;

    /// Returns `true` when `address` names a register.
    ///
    /// # Errors
    ///
    /// [`RegisterError::Transport`] for remote failures.
    fn provides_address(&self, address: u32) -> Result<bool, RegisterError>;

    /// Diagnostic label for `address`.
    ///
    /// # Errors
    ///
    /// [`RegisterError::Transport`] for remote failures.
    fn describe(&self, address: u32) -> Result<String, RegisterError>;
}

impl<T: AddressSpace + ?Sized> AddressSpace for Arc<T> {
    fn read(&self, address: u32) -> Result<u32, RegisterError> {
        (**self).read(address)
    }

    fn write(&self, address: u32, value: u32) -> Result<(), RegisterError> {
        (**self).write(address, value)
    }

    fn wait(
        &self,
        condition: &WaitCondition,
        cancel: Option<&CancelToken>,
    ) -> Result<WaitOutcome, RegisterError> {
        (**self).wait(condition, cancel)
    }

    fn provides_address(&self, address: u32) -> Result<bool, RegisterError> {
        (**self).provides_address(address)
    }

    fn describe(&self, address: u32) -> Result<String, RegisterError> {
        (**self).describe(address)
    }
}

/// Top-level configuration for an in-process address space.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SpaceConfig {
    /// How long a phase trigger waits for an observer acknowledgment;
    /// [`Duration::ZERO`] waits without bound.
    pub ack_timeout: Duration,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

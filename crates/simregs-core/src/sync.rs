//! Two-phase cycle synchronization.
//!
//! Every simulated cycle is split into SETTLING (register writes in flight)
//! and SETTLED (all writes of the cycle committed). Each phase owns a sentinel
//! register holding a monotonically increasing counter that the driving
//! engine bumps through [`PhaseClock::trigger`]. Observers block on the
//! sentinel registers through the ordinary [`AddressSpace::wait`] operation,
//! so the same protocol works in-process and across a connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{trace, warn};

use crate::{
    AddressSpace, CancelToken, Interrupt, RegisterError, RegisterFile, RegisterSlot,
    WaitCondition, WaitOutcome, ALL_BITS, CYCLE_COUNT_ADDR, PHASE_ADDR, SETTLED_SENTINEL_ADDR,
    SETTLING_SENTINEL_ADDR, TRIGGER_SETTLED_ADDR, TRIGGER_SETTLING_ADDR,
};

/// One half of a simulated cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CyclePhase {
    /// Writes of the current cycle may be in flight.
    Settling,
    /// All writes of the current cycle are committed.
    Settled,
}

impl CyclePhase {
    /// Address of this phase's sentinel counter.
    #[must_use]
    pub const fn sentinel_address(self) -> u32 {
        match self {
            Self::Settling => SETTLING_SENTINEL_ADDR,
            Self::Settled => SETTLED_SENTINEL_ADDR,
        }
    }

    /// Maps a sentinel address back to its phase.
    #[must_use]
    pub const fn from_sentinel_address(address: u32) -> Option<Self> {
        match address {
            SETTLING_SENTINEL_ADDR => Some(Self::Settling),
            SETTLED_SENTINEL_ADDR => Some(Self::Settled),
            _ => None,
        }
    }

    /// Address of the register whose writes publish this phase.
    #[must_use]
    pub const fn trigger_address(self) -> u32 {
        match self {
            Self::Settling => TRIGGER_SETTLING_ADDR,
            Self::Settled => TRIGGER_SETTLED_ADDR,
        }
    }

    /// Maps a trigger address back to its phase.
    #[must_use]
    pub const fn from_trigger_address(address: u32) -> Option<Self> {
        match address {
            TRIGGER_SETTLING_ADDR => Some(Self::Settling),
            TRIGGER_SETTLED_ADDR => Some(Self::Settled),
            _ => None,
        }
    }

    /// Value exposed through the `PHASE` register.
    #[must_use]
    pub const fn register_value(self) -> u32 {
        match self {
            Self::Settling => 0,
            Self::Settled => 1,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Returns `true` when the wrapping counter `current` has reached `target`.
#[must_use]
pub const fn sentinel_reached(current: u32, target: u32) -> bool {
    current.wrapping_sub(target) < 0x8000_0000
}

/// Result of publishing one phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerOutcome {
    /// Phase entered.
    pub phase: CyclePhase,
    /// New sentinel value of that phase.
    pub sentinel: u64,
    /// Committed cycles after the transition.
    pub cycle: u64,
    /// Waiters parked on the sentinel when it was published.
    pub watchers: usize,
    /// Whether a parked waiter observed the new sentinel before return.
    pub acknowledged: bool,
}

#[derive(Debug)]
struct ClockState {
    phase: CyclePhase,
    cycle: u64,
    sentinels: [u64; 2],
    parked: [usize; 2],
    observed: [u64; 2],
}

/// Sentinel counters plus the notification primitive behind waits.
///
/// One mutex guards the counters; `changed` wakes waiters on any transition
/// or write, `acknowledged` wakes a trigger once a parked waiter has seen the
/// sentinel it published.
#[derive(Debug)]
pub struct PhaseClock {
    state: Mutex<ClockState>,
    changed: Condvar,
    acknowledged: Condvar,
    triggers: Mutex<()>,
    waiting: AtomicUsize,
}

impl Default for PhaseClock {
    fn default() -> Self {
        Self::new()
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PhaseClock {
    /// Creates a clock at cycle zero in the SETTLING phase.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                phase: CyclePhase::Settling,
                cycle: 0,
                sentinels: [0; 2],
                parked: [0; 2],
                observed: [0; 2],
            }),
            changed: Condvar::new(),
            acknowledged: Condvar::new(),
            triggers: Mutex::new(()),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        self.state.lock().phase
    }

    /// Committed cycles so far.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.state.lock().cycle
    }

    /// Current sentinel counter of `phase`.
    #[must_use]
    pub fn sentinel(&self, phase: CyclePhase) -> u64 {
        self.state.lock().sentinels[phase.index()]
    }

    /// Wakes waiters after a register changed outside a transition.
    ///
    /// Must be called after the new value is stored. Skips locking while no
    /// wait is in progress.
    pub fn notify_write(&self) {
        if self.waiting.load(Ordering::SeqCst) > 0 {
            let _state = self.state.lock();
            self.changed.notify_all();
        }
    }

    /// Publishes a transition into `phase`.
    ///
    /// Concurrent triggers are serialized; only one transition is in flight at
    /// a time. With `await_ack`, returns only after a waiter parked on the
    /// sentinel has observed the new value, or after `ack_timeout` elapses
    /// ([`Duration::ZERO`] waits without bound). Without parked waiters there
    /// is nobody to acknowledge and the call returns at once.
    ///
    /// # Errors
    ///
    /// [`RegisterError::Unmapped`] if `registers` lacks the emulator block.
    pub fn trigger(
        &self,
        registers: &RegisterFile,
        phase: CyclePhase,
        await_ack: bool,
        ack_timeout: Duration,
    ) -> Result<TriggerOutcome, RegisterError> {
        let _serial = self.triggers.lock();
        let sentinel_slot = registers.resolve(phase.sentinel_address())?;
        let trigger_slot = registers.resolve(phase.trigger_address())?;
        let phase_slot = registers.resolve(PHASE_ADDR)?;
        let cycle_slot = registers.resolve(CYCLE_COUNT_ADDR)?;

        let mut state = self.state.lock();
        let index = phase.index();
        state.phase = phase;
        state.sentinels[index] = state.sentinels[index].wrapping_add(1);
        if phase == CyclePhase::Settled {
            state.cycle += 1;
        }
        let sentinel = state.sentinels[index];
        let cycle = state.cycle;
        #[allow(clippy::cast_possible_truncation)]
        {
            sentinel_slot.store(sentinel as u32);
            trigger_slot.store(sentinel as u32);
            cycle_slot.store(cycle as u32);
        }
        phase_slot.store(phase.register_value());
        self.changed.notify_all();

        let watchers = state.parked[index];
        trace!(?phase, sentinel, cycle, watchers, "phase transition published");

        let acknowledged = if await_ack && watchers > 0 {
            self.await_acknowledgment(&mut state, index, sentinel, ack_timeout)
        } else {
            state.observed[index] >= sentinel
        };
        if await_ack && watchers > 0 && !acknowledged {
            warn!(?phase, sentinel, ?ack_timeout, "phase transition not acknowledged");
        }

        Ok(TriggerOutcome {
            phase,
            sentinel,
            cycle,
            watchers,
            acknowledged,
        })
    }

    fn await_acknowledgment(
        &self,
        state: &mut MutexGuard<'_, ClockState>,
        index: usize,
        sentinel: u64,
        ack_timeout: Duration,
    ) -> bool {
        let deadline = (!ack_timeout.is_zero()).then(|| Instant::now() + ack_timeout);
        while state.observed[index] < sentinel {
            match deadline {
                Some(deadline) => {
                    if self.acknowledged.wait_until(state, deadline).timed_out() {
                        return state.observed[index] >= sentinel;
                    }
                }
                None => self.acknowledged.wait(state),
            }
        }
        true
    }

    /// Blocks until `slot` satisfies `condition`.
    ///
    /// `slot` must be the register at `condition.address`. Cycle bounds count
    /// SETTLED commits; both bounds are independent and whichever elapses
    /// first ends the wait with [`WaitOutcome::TimedOut`].
    ///
    /// # Errors
    ///
    /// [`RegisterError::Interrupted`] once `cancel` fires. The caller must
    /// register this clock as the token's interrupt hook beforehand.
    pub fn wait(
        &self,
        slot: &RegisterSlot,
        condition: &WaitCondition,
        cancel: Option<&CancelToken>,
    ) -> Result<WaitOutcome, RegisterError> {
        let deadline = condition.time_limit().map(|limit| Instant::now() + limit);
        let sentinel = CyclePhase::from_sentinel_address(condition.address)
            .filter(|_| condition.mask == ALL_BITS);

        let mut state = self.state.lock();
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let _waiting = WaitingGuard(&self.waiting);
        let start_cycle = state.cycle;

        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(RegisterError::Interrupted);
            }
            let cycles = state.cycle - start_cycle;
            let value = slot.load();
            let satisfied = match sentinel {
                Some(_) => sentinel_reached(value, condition.expected),
                None => condition.matches(value),
            };
            if satisfied {
                return Ok(WaitOutcome::Satisfied { cycles });
            }
            if condition.cycles_exhausted(cycles)
                || deadline.is_some_and(|deadline| Instant::now() >= deadline)
            {
                return Ok(WaitOutcome::TimedOut { cycles });
            }

            if let Some(phase) = sentinel {
                state.parked[phase.index()] += 1;
            }
            match deadline {
                Some(deadline) => {
                    self.changed.wait_until(&mut state, deadline);
                }
                None => self.changed.wait(&mut state),
            }
            if let Some(phase) = sentinel {
                let index = phase.index();
                state.parked[index] -= 1;
                if state.observed[index] < state.sentinels[index] {
                    state.observed[index] = state.sentinels[index];
                    self.acknowledged.notify_all();
                }
            }
        }
    }
}

impl Interrupt for PhaseClock {
    fn interrupt(&self) {
        let _state = self.state.lock();
        self.changed.notify_all();
    }
}

/// Reads the current sentinel counter of `phase` through any address space.
///
/// # Errors
///
/// Propagates the address space's read failure.
pub fn read_sentinel(space: &dyn AddressSpace, phase: CyclePhase) -> Result<u32, RegisterError> {
    space.read(phase.sentinel_address())
}

/// Waits until the sentinel of `phase` moves past `last_seen`.
///
/// `millis_timeout` of zero waits without bound.
///
/// # Errors
///
/// Propagates the address space's wait failure.
pub fn await_phase(
    space: &dyn AddressSpace,
    phase: CyclePhase,
    last_seen: u32,
    millis_timeout: u64,
    cancel: Option<&CancelToken>,
) -> Result<WaitOutcome, RegisterError> {
    let condition = WaitCondition::new(phase.sentinel_address(), last_seen.wrapping_add(1))
        .with_millis_timeout(millis_timeout);
    space.wait(&condition, cancel)
}

/// Observer-side cursor over committed cycles.
///
/// Remembers the last SETTLED sentinel it returned so a cycle is never
/// observed twice, however quickly the engine flips phases.
pub struct CycleObserver<'a> {
    space: &'a dyn AddressSpace,
    last_settled: u32,
    millis_timeout: u64,
}

impl std::fmt::Debug for CycleObserver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleObserver")
            .field("last_settled", &self.last_settled)
            .field("millis_timeout", &self.millis_timeout)
            .finish_non_exhaustive()
    }
}

impl<'a> CycleObserver<'a> {
    /// Starts observing after the currently committed cycle.
    ///
    /// # Errors
    ///
    /// Propagates the initial sentinel read failure.
    pub fn new(space: &'a dyn AddressSpace, millis_timeout: u64) -> Result<Self, RegisterError> {
        let last_settled = read_sentinel(space, CyclePhase::Settled)?;
        Ok(Self {
            space,
            last_settled,
            millis_timeout,
        })
    }

    /// Last SETTLED sentinel this observer returned or started from.
    #[must_use]
    pub const fn last_settled(&self) -> u32 {
        self.last_settled
    }

    /// Blocks until the next commit; returns its sentinel, or `None` on timeout.
    ///
    /// # Errors
    ///
    /// Propagates wait and read failures.
    pub fn next_settled(
        &mut self,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<u32>, RegisterError> {
        let outcome = await_phase(
            self.space,
            CyclePhase::Settled,
            self.last_settled,
            self.millis_timeout,
            cancel,
        )?;
        if !outcome.is_satisfied() {
            return Ok(None);
        }
        self.last_settled = read_sentinel(self.space, CyclePhase::Settled)?;
        Ok(Some(self.last_settled))
    }

    /// Blocks until the engine leaves the committed phase; `false` on timeout.
    ///
    /// # Errors
    ///
    /// Propagates wait and read failures.
    pub fn next_settling(&mut self, cancel: Option<&CancelToken>) -> Result<bool, RegisterError> {
        let settling = read_sentinel(self.space, CyclePhase::Settling)?;
        if self.space.read(PHASE_ADDR)? == CyclePhase::Settling.register_value() {
            return Ok(true);
        }
        let outcome = await_phase(
            self.space,
            CyclePhase::Settling,
            settling,
            self.millis_timeout,
            cancel,
        )?;
        Ok(outcome.is_satisfied())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::{sentinel_reached, CyclePhase, PhaseClock};
    use crate::{
        RegisterFile, WaitCondition, WaitOutcome, PHASE_ADDR, SETTLED_SENTINEL_ADDR,
        SETTLING_SENTINEL_ADDR,
    };

    #[test]
    fn sentinel_comparison_wraps() {
        assert!(sentinel_reached(5, 5));
        assert!(sentinel_reached(6, 5));
        assert!(!sentinel_reached(4, 5));
        assert!(sentinel_reached(1, u32::MAX));
        assert!(!sentinel_reached(u32::MAX, 1));
    }

    #[test]
    fn phase_addresses_roundtrip() {
        for phase in [CyclePhase::Settling, CyclePhase::Settled] {
            assert_eq!(
                CyclePhase::from_sentinel_address(phase.sentinel_address()),
                Some(phase)
            );
        }
        assert_eq!(CyclePhase::from_sentinel_address(PHASE_ADDR), None);
    }

    #[test]
    fn trigger_updates_registers_and_counts_cycles() {
        let registers = RegisterFile::new();
        let clock = PhaseClock::new();
        clock
            .trigger(&registers, CyclePhase::Settling, false, Duration::ZERO)
            .expect("settling");
        let outcome = clock
            .trigger(&registers, CyclePhase::Settled, false, Duration::ZERO)
            .expect("settled");

        assert_eq!(outcome.sentinel, 1);
        assert_eq!(outcome.cycle, 1);
        assert_eq!(outcome.watchers, 0);
        assert_eq!(clock.cycle(), 1);
        assert_eq!(clock.phase(), CyclePhase::Settled);
        let read = |addr| registers.resolve(addr).expect("mapped").load();
        assert_eq!(read(SETTLED_SENTINEL_ADDR), 1);
        assert_eq!(read(SETTLING_SENTINEL_ADDR), 1);
        assert_eq!(read(PHASE_ADDR), 1);
    }

    #[test]
    fn acknowledged_trigger_returns_after_parked_waiter_observes() {
        let registers = Arc::new(RegisterFile::new());
        let clock = Arc::new(PhaseClock::new());

        let waiter = {
            let registers = Arc::clone(&registers);
            let clock = Arc::clone(&clock);
            thread::spawn(move || {
                let slot = registers.resolve(SETTLED_SENTINEL_ADDR).expect("mapped");
                clock.wait(slot, &WaitCondition::new(SETTLED_SENTINEL_ADDR, 1), None)
            })
        };

        while clock.state.lock().parked[CyclePhase::Settled as usize] == 0 {
            thread::yield_now();
        }
        let outcome = clock
            .trigger(&registers, CyclePhase::Settled, true, Duration::ZERO)
            .expect("settled");

        assert_eq!(outcome.watchers, 1);
        assert!(outcome.acknowledged);
        assert_eq!(
            waiter.join().expect("waiter thread"),
            Ok(WaitOutcome::Satisfied { cycles: 1 })
        );
    }
}

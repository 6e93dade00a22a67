//! In-process address space over a [`RegisterFile`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    validate_write_access, AddressSpace, CancelToken, CyclePhase, Interrupt, PhaseClock,
    RegisterError, RegisterFile, SpaceConfig, TriggerOutcome, WaitCondition, WaitOutcome,
    PWR_UP_ADDR, PWR_UP_VALUE,
};

/// Address space backed by local atomic registers.
///
/// Host accesses go through [`AddressSpace`]; the driving engine uses
/// [`store`](Self::store) to update read-only state and
/// [`trigger`](Self::trigger) to publish phase transitions. Hosts reach the
/// same transitions by writing the `TRIGGER_*` registers.
#[derive(Debug)]
pub struct DirectAddressSpace {
    config: SpaceConfig,
    registers: RegisterFile,
    clock: Arc<PhaseClock>,
}

impl Default for DirectAddressSpace {
    fn default() -> Self {
        Self::new(SpaceConfig::default())
    }
}

impl DirectAddressSpace {
    /// Creates a device at power-up state.
    #[must_use]
    pub fn new(config: SpaceConfig) -> Self {
        Self {
            config,
            registers: RegisterFile::new(),
            clock: Arc::new(PhaseClock::new()),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SpaceConfig {
        &self.config
    }

    /// Underlying register storage.
    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Phase bookkeeping shared with waiters.
    #[must_use]
    pub fn clock(&self) -> &PhaseClock {
        &self.clock
    }

    /// Engine-side write that bypasses the read-only policy.
    ///
    /// # Errors
    ///
    /// [`RegisterError::Unmapped`] or [`RegisterError::Misaligned`].
    pub fn store(&self, address: u32, value: u32) -> Result<(), RegisterError> {
        self.registers.resolve(address)?.store(value);
        self.clock.notify_write();
        Ok(())
    }

    /// Publishes a transition into `phase`.
    ///
    /// With `await_ack` the call blocks until a waiter parked on the phase
    /// sentinel has observed it, bounded by [`SpaceConfig::ack_timeout`].
    ///
    /// # Errors
    ///
    /// Never fails for the standard register layout.
    pub fn trigger(
        &self,
        phase: CyclePhase,
        await_ack: bool,
    ) -> Result<TriggerOutcome, RegisterError> {
        self.clock
            .trigger(&self.registers, phase, await_ack, self.config.ack_timeout)
    }

    /// Runs one full cycle: SETTLING then SETTLED.
    ///
    /// Returns the SETTLED outcome.
    ///
    /// # Errors
    ///
    /// As [`trigger`](Self::trigger).
    pub fn step(&self, await_ack: bool) -> Result<TriggerOutcome, RegisterError> {
        self.trigger(CyclePhase::Settling, await_ack)?;
        self.trigger(CyclePhase::Settled, await_ack)
    }
}

impl AddressSpace for DirectAddressSpace {
    fn read(&self, address: u32) -> Result<u32, RegisterError> {
        Ok(self.registers.resolve(address)?.load())
    }

    fn write(&self, address: u32, value: u32) -> Result<(), RegisterError> {
        let slot = self.registers.resolve(address)?;
        validate_write_access(slot.access(), address)?;
        if let Some(phase) = CyclePhase::from_trigger_address(address) {
            let outcome = self.trigger(phase, value != 0)?;
            debug!(?phase, sentinel = outcome.sentinel, "host-triggered transition");
            return Ok(());
        }
        if address == PWR_UP_ADDR && value == PWR_UP_VALUE {
            self.registers.power_up();
            info!("power-up reset");
        }
        slot.store(value);
        self.clock.notify_write();
        Ok(())
    }

    fn wait(
        &self,
        condition: &WaitCondition,
        cancel: Option<&CancelToken>,
    ) -> Result<WaitOutcome, RegisterError> {
        let slot = self.registers.resolve(condition.address)?;
        let hook: Arc<dyn Interrupt> = self.clock.clone();
        let _registration = cancel.map(|token| token.register(Arc::downgrade(&hook)));
        let outcome = self.clock.wait(slot, condition, cancel);
        debug!(address = condition.address, ?outcome, "wait finished");
        outcome
    }

    fn provides_address(&self, address: u32) -> Result<bool, RegisterError> {
        Ok(self.registers.provides(address))
    }

    fn describe(&self, address: u32) -> Result<String, RegisterError> {
        Ok(self.registers.describe(address))
    }
}

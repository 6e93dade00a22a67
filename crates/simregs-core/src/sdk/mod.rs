//! Typed facade over an [`AddressSpace`].
//!
//! Nothing is cached here: every accessor is a fresh round trip, so the
//! address space stays the single source of truth whether it is local or
//! remote.

use std::sync::Arc;

use crate::{
    await_phase, read_sentinel, AddressSpace, BitRange, CancelToken, CyclePhase, RegisterError,
    WaitCondition, WaitOutcome, PWR_UP_ADDR, PWR_UP_VALUE,
};

/// GPIO block accessor.
pub mod gpio;
/// PIO block accessors and program loading.
pub mod pio;

pub use gpio::GpioAccessor;
pub use pio::{LoadError, LoadedProgram, PioAccessor, PioBlock, StateMachine};

/// Shared entry point for consoles, loaders and probes.
#[derive(Clone)]
pub struct Sdk {
    space: Arc<dyn AddressSpace>,
}

impl std::fmt::Debug for Sdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sdk").finish_non_exhaustive()
    }
}

impl Sdk {
    /// Wraps an address space.
    #[must_use]
    pub fn new(space: Arc<dyn AddressSpace>) -> Self {
        Self { space }
    }

    /// Underlying address space.
    #[must_use]
    pub fn space(&self) -> &dyn AddressSpace {
        self.space.as_ref()
    }

    /// Reads a whole register.
    ///
    /// # Errors
    ///
    /// Propagates [`AddressSpace::read`] failures.
    pub fn read(&self, address: u32) -> Result<u32, RegisterError> {
        self.space.read(address)
    }

    /// Reads bits `[msb:lsb]` of a register, right-aligned.
    ///
    /// # Errors
    ///
    /// [`RegisterError::InvalidBitRange`] before any access, otherwise as
    /// [`read`](Self::read).
    pub fn read_bits(&self, address: u32, msb: u8, lsb: u8) -> Result<u32, RegisterError> {
        self.read_field(address, BitRange::new(msb, lsb)?)
    }

    /// Reads a pre-validated bit field.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read).
    pub fn read_field(&self, address: u32, range: BitRange) -> Result<u32, RegisterError> {
        self.space.read(address).map(|value| range.extract(value))
    }

    /// Writes a whole register.
    ///
    /// # Errors
    ///
    /// Propagates [`AddressSpace::write`] failures.
    pub fn write(&self, address: u32, value: u32) -> Result<(), RegisterError> {
        self.space.write(address, value)
    }

    /// Replaces bits `[msb:lsb]` of a register, keeping the others.
    ///
    /// This is a read-modify-write and is not atomic against other writers.
    ///
    /// # Errors
    ///
    /// As [`read_bits`](Self::read_bits) and [`write`](Self::write).
    pub fn write_bits(
        &self,
        address: u32,
        msb: u8,
        lsb: u8,
        field: u32,
    ) -> Result<(), RegisterError> {
        let range = BitRange::new(msb, lsb)?;
        let word = self.space.read(address)?;
        self.space.write(address, range.insert(word, field))
    }

    /// Blocks on `condition`.
    ///
    /// # Errors
    ///
    /// Propagates [`AddressSpace::wait`] failures.
    pub fn wait(
        &self,
        condition: &WaitCondition,
        cancel: Option<&CancelToken>,
    ) -> Result<WaitOutcome, RegisterError> {
        self.space.wait(condition, cancel)
    }

    /// Blocks until one full SETTLING, SETTLED, SETTLING sequence has passed.
    ///
    /// Returns the SETTLED sentinel of the committed cycle. The engine bumps
    /// both sentinels once per cycle, so the SETTLING that ends commit `n`
    /// is the one that brings its sentinel to `n + 1`.
    ///
    /// # Errors
    ///
    /// [`RegisterError::Interrupted`] on cancel, or any transport failure.
    pub fn await_next_cycle(&self, cancel: Option<&CancelToken>) -> Result<u32, RegisterError> {
        let space = self.space();
        let settled = read_sentinel(space, CyclePhase::Settled)?;
        await_phase(space, CyclePhase::Settled, settled, 0, cancel)?;
        let committed = read_sentinel(space, CyclePhase::Settled)?;
        await_phase(space, CyclePhase::Settling, committed, 0, cancel)?;
        Ok(committed)
    }

    /// Publishes a phase transition through the address space.
    ///
    /// With `await_ack` the write returns only once an observer parked on the
    /// phase sentinel has seen the transition, or the space's acknowledgment
    /// bound elapsed. Returns the sentinel read back from the trigger register.
    ///
    /// # Errors
    ///
    /// Propagates write and read failures.
    pub fn trigger_cycle_phase(
        &self,
        phase: CyclePhase,
        await_ack: bool,
    ) -> Result<u32, RegisterError> {
        let address = phase.trigger_address();
        self.space.write(address, u32::from(await_ack))?;
        self.space.read(address)
    }

    /// Restores every peripheral register to its power-up value.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write).
    pub fn reset(&self) -> Result<(), RegisterError> {
        self.space.write(PWR_UP_ADDR, PWR_UP_VALUE)
    }

    /// See [`AddressSpace::provides_address`].
    ///
    /// # Errors
    ///
    /// Transport failures only.
    pub fn provides_address(&self, address: u32) -> Result<bool, RegisterError> {
        self.space.provides_address(address)
    }

    /// See [`AddressSpace::describe`].
    ///
    /// # Errors
    ///
    /// Transport failures only.
    pub fn describe(&self, address: u32) -> Result<String, RegisterError> {
        self.space.describe(address)
    }

    /// GPIO block.
    #[must_use]
    pub const fn gpio(&self) -> GpioAccessor<'_> {
        GpioAccessor::new(self)
    }

    /// One of the PIO blocks.
    #[must_use]
    pub const fn pio(&self, block: PioBlock) -> PioAccessor<'_> {
        PioAccessor::new(self, block)
    }
}

//! Register address space and cycle-phase synchronization for simregs.

/// Register storage, fixed region map and access policies.
pub mod memory;
pub use memory::{
    decode_region, validate_word_alignment, validate_write_access, Access, Region, RegisterBlock,
    RegisterDef, RegisterFile, RegisterSlot, CYCLE_COUNT_ADDR, CYCLE_COUNT_OFFSET, EMULATOR_BASE,
    EMULATOR_END, GPIO_BASE, GPIO_END, GPIO_IN_OFFSET, GPIO_OE_OFFSET, GPIO_OUT_OFFSET,
    INSTR_MEM_SIZE, PHASE_ADDR, PHASE_OFFSET, PIO0_BASE, PIO0_END, PIO1_BASE, PIO1_END,
    PIO_CTRL_OFFSET, PIO_FLEVEL_OFFSET, PIO_FSTAT_OFFSET, PIO_INSTR_MEM_OFFSET, PIO_IRQ_OFFSET,
    PIO_SM_COUNT, PIO_SM_OFFSET, PIO_SM_STRIDE, PWR_UP_ADDR, PWR_UP_OFFSET, PWR_UP_VALUE,
    SETTLED_SENTINEL_ADDR, SETTLED_SENTINEL_OFFSET, SETTLING_SENTINEL_ADDR,
    SETTLING_SENTINEL_OFFSET, SM_ADDR_OFFSET, SM_CLKDIV_OFFSET, SM_EXECCTRL_OFFSET,
    SM_INSTR_OFFSET, SM_PINCTRL_OFFSET, SM_SHIFTCTRL_OFFSET, TRIGGER_SETTLED_ADDR,
    TRIGGER_SETTLED_OFFSET, TRIGGER_SETTLING_ADDR, TRIGGER_SETTLING_OFFSET, WORD_ACCESS_BYTES,
};

/// Error taxonomy for register access and program placement.
pub mod error;
pub use error::{ErrorClass, ProgramError, RegisterError};

/// Bit-field extraction and insertion.
pub mod bits;
pub use bits::{extract_bits, BitRange, ALL_BITS};

/// Cooperative cancellation of blocking waits.
pub mod cancel;
pub use cancel::{CancelRegistration, CancelToken, Interrupt};

/// Address-space contract shared by every implementation.
pub mod api;
pub use api::{AddressSpace, SpaceConfig, WaitCondition, WaitOutcome, DEFAULT_ACK_TIMEOUT};

/// Two-phase cycle synchronizer.
pub mod sync;
pub use sync::{
    await_phase, read_sentinel, sentinel_reached, CycleObserver, CyclePhase, PhaseClock,
    TriggerOutcome,
};

/// In-process address space.
pub mod direct;
pub use direct::DirectAddressSpace;

/// Typed facade with peripheral accessors.
pub mod sdk;
pub use sdk::{GpioAccessor, LoadError, LoadedProgram, PioAccessor, PioBlock, Sdk, StateMachine};

/// Loadable programs and instruction-memory allocation masks.
pub mod program;
pub use program::{Program, PROGRAM_CAPACITY, RELOCATABLE};

/// Run-length encoded signal timelines.
pub mod signal;
pub use signal::{RegisterProbe, Signal, SignalRecorder};

/// Long-running observer loop.
pub mod observer;
pub use observer::{
    ObserverConfig, ObserverLoop, ObserverStats, DEFAULT_REFRESH, DEFAULT_RETRY_BACKOFF,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;

//! Register storage, region map and access policies.

/// Register access policy helpers.
pub mod access;
/// Atomic register storage backing the direct address space.
pub mod file;
/// Fixed region map and register layouts.
pub mod map;

pub use access::{validate_word_alignment, validate_write_access, Access, WORD_ACCESS_BYTES};
pub use file::{RegisterBlock, RegisterFile, RegisterSlot};
pub use map::{
    decode_region, Region, RegisterDef, CYCLE_COUNT_ADDR, CYCLE_COUNT_OFFSET, EMULATOR_BASE,
    EMULATOR_END, GPIO_BASE, GPIO_END, GPIO_IN_OFFSET, GPIO_OE_OFFSET, GPIO_OUT_OFFSET,
    INSTR_MEM_SIZE, PHASE_ADDR, PHASE_OFFSET, PIO0_BASE, PIO0_END, PIO1_BASE, PIO1_END,
    PIO_CTRL_OFFSET, PIO_FLEVEL_OFFSET, PIO_FSTAT_OFFSET, PIO_INSTR_MEM_OFFSET, PIO_IRQ_OFFSET,
    PIO_SM_COUNT, PIO_SM_OFFSET, PIO_SM_STRIDE, PWR_UP_ADDR, PWR_UP_OFFSET, PWR_UP_VALUE,
    SETTLED_SENTINEL_ADDR, SETTLED_SENTINEL_OFFSET, SETTLING_SENTINEL_ADDR,
    SETTLING_SENTINEL_OFFSET, SM_ADDR_OFFSET, SM_CLKDIV_OFFSET, SM_EXECCTRL_OFFSET,
    SM_INSTR_OFFSET, SM_PINCTRL_OFFSET, SM_SHIFTCTRL_OFFSET, TRIGGER_SETTLED_ADDR,
    TRIGGER_SETTLED_OFFSET, TRIGGER_SETTLING_ADDR, TRIGGER_SETTLING_OFFSET,
};

use thiserror::Error;
use tracing::debug;

use crate::{
    Program, ProgramError, Region, RegisterError, Sdk, INSTR_MEM_SIZE, PIO_CTRL_OFFSET,
    PIO_FLEVEL_OFFSET, PIO_FSTAT_OFFSET, PIO_INSTR_MEM_OFFSET, PIO_IRQ_OFFSET, PIO_SM_OFFSET,
    PIO_SM_STRIDE, SM_ADDR_OFFSET, SM_CLKDIV_OFFSET, SM_EXECCTRL_OFFSET, SM_INSTR_OFFSET,
    SM_PINCTRL_OFFSET, SM_SHIFTCTRL_OFFSET,
};

/// PIO block selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PioBlock {
    /// First block.
    Pio0,
    /// Second block.
    Pio1,
}

impl PioBlock {
    /// Both blocks in address order.
    pub const ALL: [Self; 2] = [Self::Pio0, Self::Pio1];

    /// Region backing this block.
    #[must_use]
    pub const fn region(self) -> Region {
        match self {
            Self::Pio0 => Region::Pio0,
            Self::Pio1 => Region::Pio1,
        }
    }

    /// Block base address.
    #[must_use]
    pub const fn base(self) -> u32 {
        self.region().base()
    }
}

/// State machine selector within a PIO block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StateMachine {
    /// State machine 0.
    Sm0,
    /// State machine 1.
    Sm1,
    /// State machine 2.
    Sm2,
    /// State machine 3.
    Sm3,
}

impl StateMachine {
    /// All state machines in index order.
    pub const ALL: [Self; 4] = [Self::Sm0, Self::Sm1, Self::Sm2, Self::Sm3];

    /// Numeric index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Offset of this state machine's register block.
    #[must_use]
    pub const fn block_offset(self) -> u32 {
        PIO_SM_OFFSET + PIO_SM_STRIDE * self.index() as u32
    }
}

/// Where a program ended up and which slots are now taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadedProgram {
    /// Slot of the first instruction.
    pub origin: u8,
    /// Previously used slots plus the program's own.
    pub used_mask: u32,
}

/// Program load failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Placement failed; nothing was written.
    #[error(transparent)]
    Program(#[from] ProgramError),
    /// A register access failed part way through the load.
    #[error(transparent)]
    Register(#[from] RegisterError),
}

/// Address-computing view of one PIO block.
#[derive(Debug, Clone, Copy)]
pub struct PioAccessor<'a> {
    sdk: &'a Sdk,
    block: PioBlock,
}

impl<'a> PioAccessor<'a> {
    pub(crate) const fn new(sdk: &'a Sdk, block: PioBlock) -> Self {
        Self { sdk, block }
    }

    /// Selected block.
    #[must_use]
    pub const fn block(&self) -> PioBlock {
        self.block
    }

    /// Address of `INSTR_MEM<slot>`; `slot` wraps modulo 32.
    #[must_use]
    pub const fn instr_mem_address(&self, slot: u32) -> u32 {
        self.block.base() + PIO_INSTR_MEM_OFFSET + 4 * (slot % INSTR_MEM_SIZE)
    }

    /// Address of a state-machine register given its offset in the block.
    #[must_use]
    pub const fn sm_address(&self, sm: StateMachine, offset: u32) -> u32 {
        self.block.base() + sm.block_offset() + offset
    }

    /// `CTRL` register.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn ctrl(&self) -> Result<u32, RegisterError> {
        self.sdk.read(self.block.base() + PIO_CTRL_OFFSET)
    }

    /// Enables or disables one state machine through `CTRL.SM_ENABLE`.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn set_sm_enabled(&self, sm: StateMachine, enabled: bool) -> Result<(), RegisterError> {
        let bit = sm.index();
        self.sdk.write_bits(
            self.block.base() + PIO_CTRL_OFFSET,
            bit,
            bit,
            u32::from(enabled),
        )
    }

    /// Returns `true` when `sm` is enabled.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn sm_enabled(&self, sm: StateMachine) -> Result<bool, RegisterError> {
        let bit = sm.index();
        self.sdk
            .read_bits(self.block.base() + PIO_CTRL_OFFSET, bit, bit)
            .map(|value| value != 0)
    }

    /// `FSTAT` register.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn fstat(&self) -> Result<u32, RegisterError> {
        self.sdk.read(self.block.base() + PIO_FSTAT_OFFSET)
    }

    /// `FLEVEL` register.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn flevel(&self) -> Result<u32, RegisterError> {
        self.sdk.read(self.block.base() + PIO_FLEVEL_OFFSET)
    }

    /// `IRQ` flags.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn irq(&self) -> Result<u32, RegisterError> {
        self.sdk.read(self.block.base() + PIO_IRQ_OFFSET)
    }

    /// Instruction word at `slot`.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn instruction(&self, slot: u32) -> Result<u16, RegisterError> {
        self.sdk
            .read_bits(self.instr_mem_address(slot), 15, 0)
            .map(|word| (word & 0xFFFF) as u16)
    }

    /// Stores one instruction word.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn write_instruction(&self, slot: u32, word: u16) -> Result<(), RegisterError> {
        self.sdk
            .write(self.instr_mem_address(slot), u32::from(word))
    }

    /// Program counter of `sm` (`SMx_ADDR`).
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn sm_pc(&self, sm: StateMachine) -> Result<u32, RegisterError> {
        self.sdk
            .read_bits(self.sm_address(sm, SM_ADDR_OFFSET), 4, 0)
    }

    /// Instruction currently executed by `sm` (`SMx_INSTR`).
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn sm_instruction(&self, sm: StateMachine) -> Result<u32, RegisterError> {
        self.sdk
            .read_bits(self.sm_address(sm, SM_INSTR_OFFSET), 15, 0)
    }

    /// Clock divider of `sm` as `(integer, fraction)`.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn sm_clkdiv(&self, sm: StateMachine) -> Result<(u32, u32), RegisterError> {
        let raw = self.sdk.read(self.sm_address(sm, SM_CLKDIV_OFFSET))?;
        Ok((raw >> 16, (raw >> 8) & 0xFF))
    }

    /// Raw `EXECCTRL`, `SHIFTCTRL` and `PINCTRL` of `sm`, in that order.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn sm_config(&self, sm: StateMachine) -> Result<[u32; 3], RegisterError> {
        Ok([
            self.sdk.read(self.sm_address(sm, SM_EXECCTRL_OFFSET))?,
            self.sdk.read(self.sm_address(sm, SM_SHIFTCTRL_OFFSET))?,
            self.sdk.read(self.sm_address(sm, SM_PINCTRL_OFFSET))?,
        ])
    }

    /// Places `program` in free slots and writes its instruction words.
    ///
    /// Slots wrap modulo 32 for fixed programs placed near the top of
    /// instruction memory.
    ///
    /// # Errors
    ///
    /// [`LoadError::Program`] when placement fails, before any write;
    /// [`LoadError::Register`] when a write fails.
    pub fn load_program(
        &self,
        program: &Program,
        used_mask: u32,
    ) -> Result<LoadedProgram, LoadError> {
        let origin = program.find_origin(used_mask)?;
        for (slot, word) in (u32::from(origin)..).zip(program.instructions()) {
            self.write_instruction(slot, *word)?;
        }
        let placed = if program.is_relocatable() {
            program.allocation_mask() << origin
        } else {
            program.allocation_mask()
        };
        debug!(block = ?self.block, origin, %program, "program loaded");
        Ok(LoadedProgram {
            origin,
            used_mask: used_mask | placed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{LoadError, LoadedProgram, PioBlock, StateMachine};
    use crate::{
        DirectAddressSpace, Program, ProgramError, Sdk, PIO1_BASE, PIO_INSTR_MEM_OFFSET,
    };

    fn sdk() -> Sdk {
        Sdk::new(Arc::new(DirectAddressSpace::default()))
    }

    #[test]
    fn instruction_addresses_wrap() {
        let sdk = sdk();
        let pio = sdk.pio(PioBlock::Pio1);
        assert_eq!(pio.instr_mem_address(0), PIO1_BASE + PIO_INSTR_MEM_OFFSET);
        assert_eq!(pio.instr_mem_address(33), PIO1_BASE + PIO_INSTR_MEM_OFFSET + 4);
        assert_eq!(
            sdk.describe(pio.instr_mem_address(31)).as_deref(),
            Ok("PIO1_INSTR_MEM31")
        );
    }

    #[test]
    fn enable_bits_are_independent() {
        let sdk = sdk();
        let pio = sdk.pio(PioBlock::Pio0);
        pio.set_sm_enabled(StateMachine::Sm2, true).expect("enable");
        pio.set_sm_enabled(StateMachine::Sm0, true).expect("enable");
        pio.set_sm_enabled(StateMachine::Sm2, false).expect("disable");
        assert_eq!(pio.ctrl(), Ok(0b0001));
        assert_eq!(pio.sm_enabled(StateMachine::Sm0), Ok(true));
    }

    #[test]
    fn defaults_match_power_up_values() {
        let sdk = sdk();
        let pio = sdk.pio(PioBlock::Pio0);
        assert_eq!(pio.fstat(), Ok(0x0F00_0F00));
        assert_eq!(pio.sm_clkdiv(StateMachine::Sm3), Ok((1, 0)));
        assert_eq!(
            pio.sm_config(StateMachine::Sm1),
            Ok([0x0001_F000, 0x000C_0000, 0x1400_0000])
        );
    }

    #[test]
    fn fixed_program_wraps_around_instruction_memory() {
        let sdk = sdk();
        let pio = sdk.pio(PioBlock::Pio0);
        let program = Program::new(vec![0xA001, 0xA002, 0xA003], 31).expect("program");
        let loaded = pio.load_program(&program, 0).expect("load");
        assert_eq!(
            loaded,
            LoadedProgram {
                origin: 31,
                used_mask: 0x8000_0003
            }
        );
        assert_eq!(pio.instruction(31), Ok(0xA001));
        assert_eq!(pio.instruction(0), Ok(0xA002));
        assert_eq!(pio.instruction(1), Ok(0xA003));
    }

    #[test]
    fn relocatable_programs_stack_downwards() {
        let sdk = sdk();
        let pio = sdk.pio(PioBlock::Pio0);
        let program = Program::relocatable(vec![0xE081; 8]).expect("program");
        let first = pio.load_program(&program, 0).expect("first");
        let second = pio.load_program(&program, first.used_mask).expect("second");
        assert_eq!(first.origin, 24);
        assert_eq!(second.origin, 16);
        assert_eq!(second.used_mask, 0xFFFF_0000);
    }

    #[test]
    fn failed_placement_writes_nothing() {
        let sdk = sdk();
        let pio = sdk.pio(PioBlock::Pio0);
        let program = Program::new(vec![0x1234], 5).expect("program");
        assert_eq!(
            pio.load_program(&program, 1 << 5),
            Err(LoadError::Program(ProgramError::SlotsOccupied { conflict: 1 << 5 }))
        );
        assert_eq!(pio.instruction(5), Ok(0));
    }
}

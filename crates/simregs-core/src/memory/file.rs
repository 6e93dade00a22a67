//! Atomic register storage for the in-process address space.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::{decode_region, validate_word_alignment, Access, Region, RegisterDef, RegisterError};

/// One 32-bit register whose value is always read and written whole.
#[derive(Debug)]
pub struct RegisterSlot {
    def: RegisterDef,
    label: String,
    value: AtomicU32,
}

impl RegisterSlot {
    fn new(region: Region, def: RegisterDef) -> Self {
        let label = format!("{}_{}", region.label(), def.name);
        let value = AtomicU32::new(def.reset);
        Self { def, label, value }
    }

    /// Current register value.
    #[must_use]
    pub fn load(&self) -> u32 {
        self.value.load(Ordering::SeqCst)
    }

    /// Replaces the register value, ignoring access policy.
    pub fn store(&self, value: u32) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Host access policy.
    #[must_use]
    pub const fn access(&self) -> Access {
        self.def.access
    }

    /// Fully qualified label, e.g. `PIO0_SM1_EXECCTRL`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    fn restore(&self) {
        self.store(self.def.reset);
    }
}

/// Registers of one region, indexed by word offset.
#[derive(Debug)]
pub struct RegisterBlock {
    region: Region,
    slots: Vec<RegisterSlot>,
    index: Vec<Option<usize>>,
}

impl RegisterBlock {
    /// Builds a block from the region's fixed layout.
    #[must_use]
    pub fn new(region: Region) -> Self {
        let (start, end) = region.bounds();
        let words = ((end - start) / 4 + 1) as usize;
        let mut index = vec![None; words];
        let slots: Vec<_> = region
            .layout()
            .into_iter()
            .map(|def| RegisterSlot::new(region, def))
            .collect();
        for (position, slot) in slots.iter().enumerate() {
            index[(slot.def.offset / 4) as usize] = Some(position);
        }
        Self {
            region,
            slots,
            index,
        }
    }

    /// Region owning this block.
    #[must_use]
    pub const fn region(&self) -> Region {
        self.region
    }

    /// Number of mapped registers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when no registers are mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, addr: u32) -> Option<&RegisterSlot> {
        let word = ((addr - self.region.base()) / 4) as usize;
        self.index
            .get(word)
            .copied()
            .flatten()
            .map(|position| &self.slots[position])
    }

    fn power_up(&self) {
        for slot in &self.slots {
            slot.restore();
        }
    }
}

/// All register blocks of the simulated device.
#[derive(Debug)]
pub struct RegisterFile {
    blocks: Vec<RegisterBlock>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Builds the standard device with every region of [`Region::ALL`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: Region::ALL.into_iter().map(RegisterBlock::new).collect(),
        }
    }

    /// Resolves an address to its register slot.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::Misaligned`] for partial-word addresses and
    /// [`RegisterError::Unmapped`] when no register lives at `addr`.
    pub fn resolve(&self, addr: u32) -> Result<&RegisterSlot, RegisterError> {
        validate_word_alignment(addr)?;
        decode_region(addr)
            .and_then(|region| self.blocks.iter().find(|block| block.region == region))
            .and_then(|block| block.slot(addr))
            .ok_or(RegisterError::Unmapped { address: addr })
    }

    /// Returns `true` when `addr` resolves to a register.
    #[must_use]
    pub fn provides(&self, addr: u32) -> bool {
        self.resolve(addr).is_ok()
    }

    /// Diagnostic label for an address.
    #[must_use]
    pub fn describe(&self, addr: u32) -> String {
        self.resolve(addr).map_or_else(
            |_| format!("unmapped {addr:#010x}"),
            |slot| slot.label().to_string(),
        )
    }

    /// Restores every peripheral register to its reset value.
    ///
    /// Regions excluded by [`Region::resets_on_power_up`] are left untouched.
    pub fn power_up(&self) {
        for block in &self.blocks {
            if block.region.resets_on_power_up() {
                block.power_up();
            }
        }
    }

    /// Iterates over all blocks in address order.
    pub fn blocks(&self) -> impl Iterator<Item = &RegisterBlock> {
        self.blocks.iter()
    }
}

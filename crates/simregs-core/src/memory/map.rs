//! Fixed peripheral-region map and per-region register layouts.

use crate::Access;

/// Inclusive start address of the GPIO region.
pub const GPIO_BASE: u32 = 0x4001_4000;
/// Inclusive end address of the GPIO region.
pub const GPIO_END: u32 = 0x4001_4FFF;
/// Inclusive start address of the first PIO block.
pub const PIO0_BASE: u32 = 0x5020_0000;
/// Inclusive end address of the first PIO block.
pub const PIO0_END: u32 = 0x5020_0FFF;
/// Inclusive start address of the second PIO block.
pub const PIO1_BASE: u32 = 0x5030_0000;
/// Inclusive end address of the second PIO block.
pub const PIO1_END: u32 = 0x5030_0FFF;
/// Inclusive start address of the emulator control region.
pub const EMULATOR_BASE: u32 = 0x5800_0000;
/// Inclusive end address of the emulator control region.
pub const EMULATOR_END: u32 = 0x5800_0FFF;

/// `GPIO_IN` offset: pin input levels, engine-owned.
pub const GPIO_IN_OFFSET: u32 = 0x00;
/// `GPIO_OUT` offset: pin output levels.
pub const GPIO_OUT_OFFSET: u32 = 0x04;
/// `GPIO_OE` offset: pin output enables.
pub const GPIO_OE_OFFSET: u32 = 0x08;

/// `CTRL` offset within a PIO block.
pub const PIO_CTRL_OFFSET: u32 = 0x000;
/// `FSTAT` offset within a PIO block.
pub const PIO_FSTAT_OFFSET: u32 = 0x004;
/// `FLEVEL` offset within a PIO block.
pub const PIO_FLEVEL_OFFSET: u32 = 0x00C;
/// `IRQ` offset within a PIO block.
pub const PIO_IRQ_OFFSET: u32 = 0x030;
/// Offset of `INSTR_MEM0`; slot `n` lives at `+ 4 * n`.
pub const PIO_INSTR_MEM_OFFSET: u32 = 0x048;
/// Offset of the first state-machine register block.
pub const PIO_SM_OFFSET: u32 = 0x0C8;
/// Byte stride between state-machine register blocks.
pub const PIO_SM_STRIDE: u32 = 0x18;
/// Number of state machines per PIO block.
pub const PIO_SM_COUNT: u32 = 4;
/// Number of instruction-memory slots per PIO block.
pub const INSTR_MEM_SIZE: u32 = 32;

/// `SMx_CLKDIV` offset within a state-machine block.
pub const SM_CLKDIV_OFFSET: u32 = 0x00;
/// `SMx_EXECCTRL` offset within a state-machine block.
pub const SM_EXECCTRL_OFFSET: u32 = 0x04;
/// `SMx_SHIFTCTRL` offset within a state-machine block.
pub const SM_SHIFTCTRL_OFFSET: u32 = 0x08;
/// `SMx_ADDR` offset within a state-machine block.
pub const SM_ADDR_OFFSET: u32 = 0x0C;
/// `SMx_INSTR` offset within a state-machine block.
pub const SM_INSTR_OFFSET: u32 = 0x10;
/// `SMx_PINCTRL` offset within a state-machine block.
pub const SM_PINCTRL_OFFSET: u32 = 0x14;

/// `PWR_UP` offset: writing [`PWR_UP_VALUE`] resets all peripherals.
pub const PWR_UP_OFFSET: u32 = 0x00;
/// `CYCLE_COUNT` offset: number of committed cycles (low 32 bits).
pub const CYCLE_COUNT_OFFSET: u32 = 0x04;
/// `PHASE` offset: `0` while settling, `1` once settled.
pub const PHASE_OFFSET: u32 = 0x08;
/// `SETTLING_SENTINEL` offset: counter bumped on every SETTLED→SETTLING flip.
pub const SETTLING_SENTINEL_OFFSET: u32 = 0x0C;
/// `SETTLED_SENTINEL` offset: counter bumped on every SETTLING→SETTLED commit.
pub const SETTLED_SENTINEL_OFFSET: u32 = 0x10;
/// `TRIGGER_SETTLING` offset: a write publishes a SETTLING transition.
pub const TRIGGER_SETTLING_OFFSET: u32 = 0x14;
/// `TRIGGER_SETTLED` offset: a write publishes a SETTLED commit.
pub const TRIGGER_SETTLED_OFFSET: u32 = 0x18;

/// Absolute address of `PWR_UP`.
pub const PWR_UP_ADDR: u32 = EMULATOR_BASE + PWR_UP_OFFSET;
/// Absolute address of `CYCLE_COUNT`.
pub const CYCLE_COUNT_ADDR: u32 = EMULATOR_BASE + CYCLE_COUNT_OFFSET;
/// Absolute address of `PHASE`.
pub const PHASE_ADDR: u32 = EMULATOR_BASE + PHASE_OFFSET;
/// Absolute address of the SETTLING sentinel.
pub const SETTLING_SENTINEL_ADDR: u32 = EMULATOR_BASE + SETTLING_SENTINEL_OFFSET;
/// Absolute address of the SETTLED sentinel.
pub const SETTLED_SENTINEL_ADDR: u32 = EMULATOR_BASE + SETTLED_SENTINEL_OFFSET;
/// Absolute address of the SETTLING trigger.
///
/// Writing any value runs the transition; a nonzero value also waits for
/// observer acknowledgment. Reads return the sentinel last published.
pub const TRIGGER_SETTLING_ADDR: u32 = EMULATOR_BASE + TRIGGER_SETTLING_OFFSET;
/// Absolute address of the SETTLED trigger; see [`TRIGGER_SETTLING_ADDR`].
pub const TRIGGER_SETTLED_ADDR: u32 = EMULATOR_BASE + TRIGGER_SETTLED_OFFSET;

/// Magic power-up value accepted by `PWR_UP`.
pub const PWR_UP_VALUE: u32 = 0xA55A_5AA5;

/// Peripheral region classification for register addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Region {
    /// GPIO bank (`0x4001_4000..=0x4001_4FFF`).
    Gpio,
    /// First PIO block (`0x5020_0000..=0x5020_0FFF`).
    Pio0,
    /// Second PIO block (`0x5030_0000..=0x5030_0FFF`).
    Pio1,
    /// Emulator control block (`0x5800_0000..=0x5800_0FFF`).
    Emulator,
}

impl Region {
    /// All regions in ascending address order.
    pub const ALL: [Self; 4] = [Self::Gpio, Self::Pio0, Self::Pio1, Self::Emulator];

    /// Returns the inclusive bounds for this region.
    #[must_use]
    pub const fn bounds(self) -> (u32, u32) {
        match self {
            Self::Gpio => (GPIO_BASE, GPIO_END),
            Self::Pio0 => (PIO0_BASE, PIO0_END),
            Self::Pio1 => (PIO1_BASE, PIO1_END),
            Self::Emulator => (EMULATOR_BASE, EMULATOR_END),
        }
    }

    /// Returns the base address of this region.
    #[must_use]
    pub const fn base(self) -> u32 {
        self.bounds().0
    }

    /// Returns `true` when `addr` belongs to this region.
    #[must_use]
    pub const fn contains(self, addr: u32) -> bool {
        let (start, end) = self.bounds();
        addr >= start && addr <= end
    }

    /// Label prefix used by `describe`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Gpio => "GPIO",
            Self::Pio0 => "PIO0",
            Self::Pio1 => "PIO1",
            Self::Emulator => "EMU",
        }
    }

    /// Whether a power-up reset restores this region's registers.
    #[must_use]
    pub const fn resets_on_power_up(self) -> bool {
        !matches!(self, Self::Emulator)
    }

    /// Returns the register layout of this region in ascending offset order.
    #[must_use]
    pub fn layout(self) -> Vec<RegisterDef> {
        match self {
            Self::Gpio => gpio_layout(),
            Self::Pio0 | Self::Pio1 => pio_layout(),
            Self::Emulator => emulator_layout(),
        }
    }
}

/// Decodes an address into the region whose window contains it.
#[must_use]
pub const fn decode_region(addr: u32) -> Option<Region> {
    match addr {
        GPIO_BASE..=GPIO_END => Some(Region::Gpio),
        PIO0_BASE..=PIO0_END => Some(Region::Pio0),
        PIO1_BASE..=PIO1_END => Some(Region::Pio1),
        EMULATOR_BASE..=EMULATOR_END => Some(Region::Emulator),
        _ => None,
    }
}

/// Static description of one register slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDef {
    /// Byte offset from the region base.
    pub offset: u32,
    /// Register name without the region prefix.
    pub name: String,
    /// Host access policy.
    pub access: Access,
    /// Value after power-up.
    pub reset: u32,
}

impl RegisterDef {
    fn new(offset: u32, name: impl Into<String>, access: Access, reset: u32) -> Self {
        Self {
            offset,
            name: name.into(),
            access,
            reset,
        }
    }
}

fn gpio_layout() -> Vec<RegisterDef> {
    vec![
        RegisterDef::new(GPIO_IN_OFFSET, "IN", Access::ReadOnly, 0),
        RegisterDef::new(GPIO_OUT_OFFSET, "OUT", Access::ReadWrite, 0),
        RegisterDef::new(GPIO_OE_OFFSET, "OE", Access::ReadWrite, 0),
    ]
}

fn pio_layout() -> Vec<RegisterDef> {
    let mut layout = vec![
        RegisterDef::new(PIO_CTRL_OFFSET, "CTRL", Access::ReadWrite, 0),
        RegisterDef::new(PIO_FSTAT_OFFSET, "FSTAT", Access::ReadOnly, 0x0F00_0F00),
        RegisterDef::new(PIO_FLEVEL_OFFSET, "FLEVEL", Access::ReadOnly, 0),
        RegisterDef::new(PIO_IRQ_OFFSET, "IRQ", Access::ReadWrite, 0),
    ];
    for slot in 0..INSTR_MEM_SIZE {
        layout.push(RegisterDef::new(
            PIO_INSTR_MEM_OFFSET + 4 * slot,
            format!("INSTR_MEM{slot}"),
            Access::ReadWrite,
            0,
        ));
    }
    for sm in 0..PIO_SM_COUNT {
        let base = PIO_SM_OFFSET + PIO_SM_STRIDE * sm;
        let fields = [
            (SM_CLKDIV_OFFSET, "CLKDIV", Access::ReadWrite, 0x0001_0000),
            (SM_EXECCTRL_OFFSET, "EXECCTRL", Access::ReadWrite, 0x0001_F000),
            (SM_SHIFTCTRL_OFFSET, "SHIFTCTRL", Access::ReadWrite, 0x000C_0000),
            (SM_ADDR_OFFSET, "ADDR", Access::ReadOnly, 0),
            (SM_INSTR_OFFSET, "INSTR", Access::ReadWrite, 0),
            (SM_PINCTRL_OFFSET, "PINCTRL", Access::ReadWrite, 0x1400_0000),
        ];
        for (offset, name, access, reset) in fields {
            layout.push(RegisterDef::new(
                base + offset,
                format!("SM{sm}_{name}"),
                access,
                reset,
            ));
        }
    }
    layout
}

fn emulator_layout() -> Vec<RegisterDef> {
    vec![
        RegisterDef::new(PWR_UP_OFFSET, "PWR_UP", Access::ReadWrite, 0),
        RegisterDef::new(CYCLE_COUNT_OFFSET, "CYCLE_COUNT", Access::ReadOnly, 0),
        RegisterDef::new(PHASE_OFFSET, "PHASE", Access::ReadOnly, 0),
        RegisterDef::new(
            SETTLING_SENTINEL_OFFSET,
            "SETTLING_SENTINEL",
            Access::ReadOnly,
            0,
        ),
        RegisterDef::new(
            SETTLED_SENTINEL_OFFSET,
            "SETTLED_SENTINEL",
            Access::ReadOnly,
            0,
        ),
        RegisterDef::new(
            TRIGGER_SETTLING_OFFSET,
            "TRIGGER_SETTLING",
            Access::ReadWrite,
            0,
        ),
        RegisterDef::new(TRIGGER_SETTLED_OFFSET, "TRIGGER_SETTLED", Access::ReadWrite, 0),
    ]
}

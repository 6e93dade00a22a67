use crate::{
    BitRange, CancelToken, RegisterError, Sdk, WaitCondition, WaitOutcome, GPIO_BASE,
    GPIO_IN_OFFSET, GPIO_OE_OFFSET, GPIO_OUT_OFFSET,
};

/// Address-computing view of the GPIO block.
#[derive(Debug, Clone, Copy)]
pub struct GpioAccessor<'a> {
    sdk: &'a Sdk,
}

impl<'a> GpioAccessor<'a> {
    pub(crate) const fn new(sdk: &'a Sdk) -> Self {
        Self { sdk }
    }

    /// Sampled input levels.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn pins(&self) -> Result<u32, RegisterError> {
        self.sdk.read(GPIO_BASE + GPIO_IN_OFFSET)
    }

    /// Output levels.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn out(&self) -> Result<u32, RegisterError> {
        self.sdk.read(GPIO_BASE + GPIO_OUT_OFFSET)
    }

    /// Replaces all output levels.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn set_out(&self, levels: u32) -> Result<(), RegisterError> {
        self.sdk.write(GPIO_BASE + GPIO_OUT_OFFSET, levels)
    }

    /// Output-enable bits.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn output_enable(&self) -> Result<u32, RegisterError> {
        self.sdk.read(GPIO_BASE + GPIO_OE_OFFSET)
    }

    /// Replaces all output-enable bits.
    ///
    /// # Errors
    ///
    /// Propagates address-space failures.
    pub fn set_output_enable(&self, mask: u32) -> Result<(), RegisterError> {
        self.sdk.write(GPIO_BASE + GPIO_OE_OFFSET, mask)
    }

    /// Input level of one pin.
    ///
    /// # Errors
    ///
    /// [`RegisterError::InvalidBitRange`] for `pin >= 32`.
    pub fn pin(&self, pin: u8) -> Result<bool, RegisterError> {
        let bit = BitRange::bit(pin)?;
        self.sdk
            .read_field(GPIO_BASE + GPIO_IN_OFFSET, bit)
            .map(|level| level != 0)
    }

    /// Drives one output pin, leaving the others as they are.
    ///
    /// # Errors
    ///
    /// [`RegisterError::InvalidBitRange`] for `pin >= 32`.
    pub fn set_pin_out(&self, pin: u8, high: bool) -> Result<(), RegisterError> {
        self.sdk
            .write_bits(GPIO_BASE + GPIO_OUT_OFFSET, pin, pin, u32::from(high))
    }

    /// Blocks until the input pins under `mask` equal `levels`.
    ///
    /// # Errors
    ///
    /// Propagates wait failures.
    pub fn wait_pins(
        &self,
        levels: u32,
        mask: u32,
        millis_timeout: u64,
        cancel: Option<&CancelToken>,
    ) -> Result<WaitOutcome, RegisterError> {
        let condition = WaitCondition::new(GPIO_BASE + GPIO_IN_OFFSET, levels)
            .with_mask(mask)
            .with_millis_timeout(millis_timeout);
        self.sdk.wait(&condition, cancel)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{DirectAddressSpace, RegisterError, Sdk, WaitOutcome, GPIO_BASE, GPIO_IN_OFFSET};

    #[test]
    fn pin_helpers_touch_single_bits() {
        let space = Arc::new(DirectAddressSpace::default());
        let sdk = Sdk::new(space.clone());
        let gpio = sdk.gpio();
        gpio.set_out(0b1000).expect("set out");
        gpio.set_pin_out(0, true).expect("pin 0");
        gpio.set_pin_out(3, false).expect("pin 3");
        assert_eq!(gpio.out(), Ok(0b0001));

        space.store(GPIO_BASE + GPIO_IN_OFFSET, 1 << 7).expect("drive input");
        assert_eq!(gpio.pin(7), Ok(true));
        assert_eq!(gpio.pin(6), Ok(false));
        assert_eq!(
            gpio.pin(32),
            Err(RegisterError::InvalidBitRange { msb: 32, lsb: 32 })
        );
    }

    #[test]
    fn wait_pins_uses_mask() {
        let space = Arc::new(DirectAddressSpace::default());
        let sdk = Sdk::new(space.clone());
        space.store(GPIO_BASE + GPIO_IN_OFFSET, 0xF0).expect("drive input");
        assert_eq!(
            sdk.gpio().wait_pins(0x30, 0x30, 10, None),
            Ok(WaitOutcome::Satisfied { cycles: 0 })
        );
        assert_eq!(
            sdk.gpio().wait_pins(0x01, 0x01, 10, None),
            Ok(WaitOutcome::TimedOut { cycles: 0 })
        );
    }
}

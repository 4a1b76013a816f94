use crate::{OneWireError, OneWireResult, Rom, consts::ONEWIRE_MATCH_ROM_CMD};

/// Trait for the status returned by a bus reset.
pub trait OneWireStatus {
    /// Whether at least one device answered the reset with a presence pulse.
    fn presence(&self) -> bool;

    /// Whether the bus appeared to be shorted during the reset.
    fn shortcircuit(&self) -> bool {
        false
    }
}

impl OneWireStatus for bool {
    fn presence(&self) -> bool {
        *self
    }
}

/// Trait for 1-Wire communication.
///
/// The only primitives a bus master has to provide are the reset pulse and
/// [`touch_bits`](OneWire::touch_bits): every other operation (bit and byte I/O,
/// device selection, the search algorithm) is composed from them.
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the underlying transport.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// # Returns
    /// A result containing the status of the bus after the reset operation.
    /// A reset that completes without any presence pulse is not an error here;
    /// the caller decides whether presence is required.
    ///
    /// # Errors
    /// This method returns an error if the reset operation fails.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Performs one time slot per element of `bits`.
    ///
    /// A `true` bit is a write-one slot, which doubles as a read slot; a `false`
    /// bit is a write-zero slot. On return every element holds the level sampled
    /// on the line during its own slot, in the same order.
    ///
    /// # Errors
    /// This method returns an error if the transport fails.
    fn touch_bits(&mut self, bits: &mut [bool]) -> OneWireResult<(), Self::BusError>;

    /// Writes a single bit to the 1-Wire bus.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.touch_bits(&mut [bit])
    }

    /// Reads a single bit from the 1-Wire bus.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        let mut bit = [true];
        self.touch_bits(&mut bit)?;
        Ok(bit[0])
    }

    /// Writes a byte to the 1-Wire bus, least significant bit first.
    /// # Arguments
    /// * `byte` - The byte to write to the bus.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        let mut bits = [false; 8];
        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = (byte >> i) & 1 == 1;
        }
        self.touch_bits(&mut bits)
    }

    /// Reads a byte from the 1-Wire bus, least significant bit first.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        let mut bits = [true; 8];
        self.touch_bits(&mut bits)?;
        Ok(bits
            .iter()
            .enumerate()
            .fold(0u8, |byte, (i, &bit)| byte | ((bit as u8) << i)))
    }

    /// Reads `buf.len()` bytes from the 1-Wire bus.
    fn read_bytes(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        for b in buf.iter_mut() {
            *b = self.read_byte()?;
        }
        Ok(())
    }

    /// Addresses a single device on the bus with the Match ROM command.
    ///
    /// Must directly follow a [reset](OneWire::reset) that reported presence;
    /// otherwise the state of the devices on the bus is undefined.
    fn select(&mut self, rom: &Rom) -> OneWireResult<(), Self::BusError> {
        self.write_byte(ONEWIRE_MATCH_ROM_CMD)?;
        for &b in rom.iter() {
            self.write_byte(b)?; // Write each byte of the ROM address
        }
        Ok(())
    }

    /// Resets the bus, requires a presence pulse and selects `rom`.
    ///
    /// # Errors
    /// [`OneWireError::NoDevicePresent`] if nothing answered the reset.
    fn reset_select(&mut self, rom: &Rom) -> OneWireResult<(), Self::BusError> {
        if !self.reset()?.presence() {
            return Err(OneWireError::NoDevicePresent);
        }
        self.select(rom)
    }
}

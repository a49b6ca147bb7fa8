use crate::{
    ONEWIRE_MATCH_ROM_CMD, ONEWIRE_SKIP_ROM_CMD, OneWireAddress, OneWireError, OneWireResult,
};

/// Status of the bus after a reset/presence-detect cycle.
pub trait OneWireStatus {
    /// Whether at least one device answered with a presence pulse.
    fn presence(&self) -> bool;
    /// Whether the bus master detected a short on the 1-Wire line.
    fn shortcircuit(&self) -> bool;
    /// Logic level of the 1-Wire line, if the bus master reports it.
    fn logic_level(&self) -> Option<bool> {
        None
    }
    /// Branch direction taken by the last triplet, if the bus master reports it.
    fn direction(&self) -> Option<bool> {
        None
    }
}

/// Trait for 1-Wire communication.
/// This trait defines the basic operations required for 1-Wire communication, such as resetting the bus,
/// writing and reading bytes, and writing and reading bits.
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// # Returns
    /// A result containing the status of the bus after the reset operation.
    ///
    /// # Errors
    /// This method returns an error if the reset operation fails. Bus masters may
    /// report an empty bus either through [`OneWireStatus::presence`] or as
    /// [`OneWireError::NoDevicePresent`].
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus.
    /// # Arguments
    /// * `byte` - The byte to write to the bus.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus.
    /// # Returns
    /// Byte read from the bus.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Writes a single bit to the 1-Wire bus.
    /// # Arguments
    ///
    /// * `bit` - The bit to write.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads a single bit from the 1-Wire bus.
    /// # Returns
    /// The bit read from the bus.
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// # Note: Not intended for public API use.
    /// ## This method is internally used by the [search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html).
    ///
    /// Generates three time slots: two read time slots and one write time slot at the 1-Wire line. The
    /// direction argument determines the type of write time slot if both read time slots are 0 (a typical
    /// case). In this case, a write-one time slot is generated if `direction` is true and a write-zero time
    /// slot otherwise.
    /// If the read time slots are 0 and 1, they are followed by a write-zero time slot.
    /// If the read time slots are 1 and 0, they are followed by a write-one time slot.
    /// If the read time slots are both 1 (error case), the subsequent write time slot is a write-one.
    ///
    /// # Arguments
    /// * `direction` - Branch to take when devices disagree on the current bit.
    ///
    /// # Returns
    /// A result containing a tuple of three booleans: the id bit, the complement bit, and
    /// the direction that was written.
    ///
    /// # Errors
    /// Returns [`OneWireError::Unimplemented`] by default, in which case the search falls back to
    /// [`read_bit`](OneWire::read_bit) and [`write_bit`](OneWire::write_bit).
    fn read_triplet(&mut self, _direction: bool) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Reads bytes from the bus into the buffer.
    fn read_bytes(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        for b in buf.iter_mut() {
            *b = self.read_byte()?;
        }
        Ok(())
    }

    /// Writes all bytes of the buffer to the bus.
    fn write_bytes(&mut self, buf: &[u8]) -> OneWireResult<(), Self::BusError> {
        for &b in buf.iter() {
            self.write_byte(b)?;
        }
        Ok(())
    }

    /// Writes a 64-bit value, least significant byte first.
    fn write_u64(&mut self, value: u64) -> OneWireResult<(), Self::BusError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Reads a 64-bit value, least significant byte first.
    fn read_u64(&mut self) -> OneWireResult<u64, Self::BusError> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Addresses devices on the 1-Wire bus.
    /// The first [`OneWire::read_byte`], [`OneWire::read_bit`], [`OneWire::write_byte`], [`OneWire::write_bit`] operation should be preceded by this method to address devices on the bus.
    /// Note: A [`OneWire::read_byte`] or [`OneWire::read_bit`] call will return garbage data if this method is called without specifying a ROM address on a bus with multiple devices.
    /// # Arguments
    /// * `rom` - The ROM address of the device to address. Pass [`None`] to skip ROM addressing and address all devices on the bus.
    ///
    /// # Returns
    /// A result indicating the success or failure of the operation.
    /// If the device is successfully addressed, the method returns `Ok(())`.
    ///
    /// # Errors
    /// [`OneWireError::NoDevicePresent`] if no presence pulse follows the reset.
    fn address(&mut self, rom: Option<OneWireAddress>) -> OneWireResult<(), Self::BusError> {
        let status = self.reset()?;
        if status.shortcircuit() {
            return Err(OneWireError::ShortCircuit);
        }
        if !status.presence() {
            return Err(OneWireError::NoDevicePresent);
        }
        match rom {
            Some(rom) => {
                self.write_byte(ONEWIRE_MATCH_ROM_CMD)?;
                self.write_u64(rom.raw())
            }
            None => self.write_byte(ONEWIRE_SKIP_ROM_CMD),
        }
    }
}

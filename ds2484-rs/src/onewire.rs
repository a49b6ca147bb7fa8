use crate::{
    Ds2484, Ds2484Error,
    registers::{DeviceStatus, READ_PTR_CMD},
};
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use embedded_onewire::{OneWire, OneWireError, OneWireResult, OneWireStatus};

pub(crate) const ONEWIRE_RESET_CMD: u8 = 0xb4;
pub(crate) const ONEWIRE_WRITE_BYTE: u8 = 0xa5;
pub(crate) const ONEWIRE_READ_BYTE: u8 = 0x96;
pub(crate) const ONEWIRE_READ_DATA_PTR: u8 = 0xe1;
pub(crate) const ONEWIRE_SINGLE_BIT: u8 = 0x87;
pub(crate) const ONEWIRE_TRIPLET: u8 = 0x78;

const fn bit_byte(bit: bool) -> u8 {
    if bit { 0x80 } else { 0x00 }
}

impl<I2C: I2c<SevenBitAddress>, D: DelayNs> Ds2484<I2C, D> {
    fn command(&mut self, cmd: &[u8]) -> OneWireResult<DeviceStatus, Ds2484Error<I2C::Error>> {
        if self.reset {
            return Err(OneWireError::BusUninitialized);
        }
        self.i2c.write(self.addr, cmd).map_err(Ds2484Error::from)?;
        Ok(self.onewire_wait()?)
    }
}

impl<I2C: I2c<SevenBitAddress>, D: DelayNs> OneWire for Ds2484<I2C, D> {
    type Status = DeviceStatus;

    type BusError = Ds2484Error<I2C::Error>;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        let status = self.command(&[ONEWIRE_RESET_CMD])?;
        if status.short_detect() {
            Err(OneWireError::ShortCircuit)
        } else if !status.presence() {
            Err(OneWireError::NoDevicePresent)
        } else {
            Ok(status)
        }
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.command(&[ONEWIRE_WRITE_BYTE, byte])?;
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        self.command(&[ONEWIRE_READ_BYTE])?;
        let mut val = [0; 1];
        self.i2c
            .write_read(self.addr, &[READ_PTR_CMD, ONEWIRE_READ_DATA_PTR], &mut val)
            .map_err(Ds2484Error::from)?;
        Ok(val[0])
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.command(&[ONEWIRE_SINGLE_BIT, bit_byte(bit)])?;
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        // A read slot is a write-one slot sampled by the bridge.
        Ok(self
            .command(&[ONEWIRE_SINGLE_BIT, bit_byte(true)])?
            .single_bit_result())
    }

    fn read_triplet(&mut self, direction: bool) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        let status = self.command(&[ONEWIRE_TRIPLET, bit_byte(direction)])?;
        Ok((
            status.single_bit_result(),
            status.triplet_second_bit(),
            status.branch_dir_taken(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::built;
    use embedded_hal_mock::eh1::i2c::Transaction;
    use embedded_onewire::{
        OneWire, OneWireAddress, OneWireError, OneWireSearch, OneWireSearchKind,
    };

    const ADDR: u8 = 0x18;

    #[test]
    fn reset_reports_presence() {
        let (mut dev, mut i2c) = built(&[
            Transaction::write(ADDR, vec![0xb4]),
            Transaction::read(ADDR, vec![0x03]),
            Transaction::read(ADDR, vec![0x02]),
            Transaction::write(ADDR, vec![0xb4]),
            Transaction::read(ADDR, vec![0x00]),
            Transaction::write(ADDR, vec![0xb4]),
            Transaction::read(ADDR, vec![0x06]),
        ]);
        assert!(dev.reset().is_ok());
        assert!(matches!(dev.reset(), Err(OneWireError::NoDevicePresent)));
        assert!(matches!(dev.reset(), Err(OneWireError::ShortCircuit)));
        i2c.done();
    }

    #[test]
    fn byte_transfers() {
        let (mut dev, mut i2c) = built(&[
            Transaction::write(ADDR, vec![0xa5, 0x44]),
            Transaction::read(ADDR, vec![0x00]),
            Transaction::write(ADDR, vec![0x96]),
            Transaction::read(ADDR, vec![0x00]),
            Transaction::write_read(ADDR, vec![0xe1, 0xe1], vec![0x5a]),
        ]);
        dev.write_byte(0x44).unwrap();
        assert_eq!(dev.read_byte().unwrap(), 0x5a);
        i2c.done();
    }

    #[test]
    fn triplet_decodes_status() {
        let (mut dev, mut i2c) = built(&[
            Transaction::write(ADDR, vec![0x78, 0x80]),
            Transaction::read(ADDR, vec![0xa0]),
            Transaction::write(ADDR, vec![0x78, 0x00]),
            Transaction::read(ADDR, vec![0x40]),
        ]);
        assert_eq!(dev.read_triplet(true).unwrap(), (true, false, true));
        assert_eq!(dev.read_triplet(false).unwrap(), (false, true, false));
        i2c.done();
    }

    #[test]
    fn busy_line_times_out() {
        let mut busy = vec![Transaction::write(ADDR, vec![0xa5, 0x00])];
        busy.extend((0..crate::DEFAULT_RETRIES).map(|_| Transaction::read(ADDR, vec![0x01])));
        let (mut dev, mut i2c) = built(&busy);
        assert!(matches!(
            dev.write_byte(0x00),
            Err(OneWireError::Other(crate::Ds2484Error::RetriesExceeded))
        ));
        i2c.done();
    }

    #[test]
    fn search_single_device_with_triplets() {
        let rom = OneWireAddress::from_family_serial(0x28, 0x0102_0304_0506);
        let mut expectations = vec![
            Transaction::write(ADDR, vec![0xb4]),
            Transaction::read(ADDR, vec![0x02]),
            Transaction::write(ADDR, vec![0xa5, 0xf0]),
            Transaction::read(ADDR, vec![0x00]),
        ];
        for bit in 0..64 {
            let b = (rom.raw() >> bit) & 1 == 1;
            // Lone device: id bit, complement of it, and the forced direction.
            let status = if b { 0xa0 } else { 0x40 };
            expectations.push(Transaction::write(ADDR, vec![0x78, 0x00]));
            expectations.push(Transaction::read(ADDR, vec![status]));
        }
        let (mut dev, mut i2c) = built(&expectations);
        let mut search = OneWireSearch::new(&mut dev, OneWireSearchKind::Normal);
        assert_eq!(search.next().unwrap(), Some(rom));
        assert_eq!(search.next().unwrap(), None);
        drop(search);
        i2c.done();
    }
}

use bitfield_struct::bitfield;
use embedded_onewire::{FamilyCode, OneWire, OneWireAddress, OneWireError, OneWireResult};
use fixed::types::I8F8;

use crate::{CONVERT_T, COPY_SCRATCH, READ_SCRATCH, WRITE_SCRATCH, read_checked};

const CONVERT_V: u8 = 0xb4;
const RECALL_MEMORY: u8 = 0xb8;

/// Temperature in degrees Celsius, 0.03125 °C resolution.
pub type Ds2438Temperature = I8F8;

/// Status/configuration register, byte 0 of page 0.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct Ds2438Config {
    /// Current A/D and ICA enabled.
    pub iad: bool,
    /// Current accumulator configuration.
    pub ca: bool,
    /// Shadow accumulator data to EEPROM.
    pub ee: bool,
    /// Voltage A/D input: VDD when set, VAD otherwise.
    pub ad: bool,
    /// Temperature conversion busy.
    pub tb: bool,
    /// Non-volatile memory busy.
    pub nvb: bool,
    /// A/D converter busy.
    pub adb: bool,
    #[bits(1)]
    __: u8,
}

/// Voltage A/D input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoltageInput {
    Vad,
    Vdd,
}

/// DS2438 smart battery monitor: temperature plus two voltage inputs.
#[derive(Debug, Clone)]
pub struct Ds2438 {
    address: OneWireAddress,
    page0: [u8; 9],
}

impl Ds2438 {
    /// Family code of the DS2438.
    pub const FAMILY: FamilyCode = 0x26;

    /// Temperature and voltage conversions complete within this time.
    pub const CONVERSION_TIME_MS: u32 = 10;

    /// Create a driver for the device at `address`.
    pub fn new(address: OneWireAddress) -> Self {
        Self {
            address,
            page0: [0; 9],
        }
    }

    /// ROM code of the device.
    pub fn address(&self) -> OneWireAddress {
        self.address
    }

    /// Configuration register from the last page 0 read.
    pub fn config(&self) -> Ds2438Config {
        Ds2438Config::from_bits(self.page0[0])
    }

    /// Read page 0 and check its CRC.
    pub fn begin<O: OneWire>(&mut self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        if self.address.family() != Self::FAMILY {
            return Err(OneWireError::InvalidFamily);
        }
        self.read_page0(bus)
    }

    /// Start a temperature conversion on this device.
    pub fn sample_temperature<O: OneWire>(&self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        bus.address(Some(self.address))?;
        bus.write_byte(CONVERT_T)
    }

    /// Start a temperature conversion on every device of the bus.
    pub fn sample_temperature_all<O: OneWire>(bus: &mut O) -> OneWireResult<(), O::BusError> {
        bus.address(None)?;
        bus.write_byte(CONVERT_T)
    }

    /// Select the VAD input and start a voltage conversion.
    pub fn sample_vad<O: OneWire>(&mut self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        self.sample_voltage(bus, VoltageInput::Vad)
    }

    /// Select the VDD input and start a voltage conversion.
    pub fn sample_vdd<O: OneWire>(&mut self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        self.sample_voltage(bus, VoltageInput::Vdd)
    }

    /// Read the last temperature conversion.
    pub fn temperature<O: OneWire>(
        &mut self,
        bus: &mut O,
    ) -> OneWireResult<Ds2438Temperature, O::BusError> {
        self.read_page0(bus)?;
        // 13-bit two's complement, left aligned
        let raw = i16::from_le_bytes([self.page0[1], self.page0[2]]) & !0x07;
        Ok(Ds2438Temperature::from_bits(raw))
    }

    /// Read the last voltage conversion in volts, from whichever input was sampled.
    pub fn voltage<O: OneWire>(&mut self, bus: &mut O) -> OneWireResult<f32, O::BusError> {
        self.read_page0(bus)?;
        let raw = u16::from(self.page0[4] & 0x03) << 8 | u16::from(self.page0[3]);
        Ok(raw as f32 * 0.01)
    }

    fn sample_voltage<O: OneWire>(
        &mut self,
        bus: &mut O,
        input: VoltageInput,
    ) -> OneWireResult<(), O::BusError> {
        self.read_page0(bus)?;
        let mut config = self.config();
        let vdd = input == VoltageInput::Vdd;
        if config.ad() != vdd {
            config.set_ad(vdd);
            self.page0[0] = config.into_bits();
            self.write_page0(bus)?;
        }
        bus.address(Some(self.address))?;
        bus.write_byte(CONVERT_V)
    }

    fn read_page0<O: OneWire>(&mut self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        bus.address(Some(self.address))?;
        bus.write_bytes(&[RECALL_MEMORY, 0x00])?;
        let mut buf = [0u8; 9];
        read_checked(bus, self.address, &[READ_SCRATCH, 0x00], &mut buf)?;
        self.page0 = buf;
        Ok(())
    }

    fn write_page0<O: OneWire>(&mut self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        bus.address(Some(self.address))?;
        bus.write_bytes(&[WRITE_SCRATCH, 0x00])?;
        bus.write_bytes(&self.page0[..8])?;
        bus.address(Some(self.address))?;
        bus.write_bytes(&[COPY_SCRATCH, 0x00])
    }
}

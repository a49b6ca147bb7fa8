use embedded_onewire::{FamilyCode, OneWire, OneWireAddress, OneWireError, OneWireResult};
use fixed::types::I12F4;

use crate::{CONVERT_T, COPY_SCRATCH, READ_SCRATCH, WRITE_SCRATCH, read_checked};

/// Temperature in degrees Celsius with 1/16 degree steps.
pub type Temperature = I12F4;

/// Conversion resolution, encoded as the configuration register value.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Resolution {
    /// 0.5 °C steps.
    Bits9 = 0x1f,
    /// 0.25 °C steps.
    Bits10 = 0x3f,
    /// 0.125 °C steps.
    Bits11 = 0x5f,
    /// 0.0625 °C steps.
    #[default]
    Bits12 = 0x7f,
}

impl Resolution {
    /// Maximum conversion time in milliseconds.
    pub const fn conversion_time_ms(&self) -> u32 {
        match self {
            Resolution::Bits9 => 94,
            Resolution::Bits10 => 188,
            Resolution::Bits11 => 375,
            Resolution::Bits12 => 750,
        }
    }

    /// Mask of the temperature bits that are defined at this resolution.
    const fn mask(&self) -> i16 {
        match self {
            Resolution::Bits9 => !0x07,
            Resolution::Bits10 => !0x03,
            Resolution::Bits11 => !0x01,
            Resolution::Bits12 => !0x00,
        }
    }
}

impl TryFrom<u8> for Resolution {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x1f => Ok(Resolution::Bits9),
            0x3f => Ok(Resolution::Bits10),
            0x5f => Ok(Resolution::Bits11),
            0x7f => Ok(Resolution::Bits12),
            other => Err(other),
        }
    }
}

/// DS18B20 programmable resolution digital thermometer.
#[derive(Debug, Clone)]
pub struct Ds18b20 {
    address: OneWireAddress,
    resolution: Resolution,
    scratchpad: [u8; 9],
}

impl Ds18b20 {
    /// Family code of the DS18B20.
    pub const FAMILY: FamilyCode = 0x28;

    /// Conversion time at 12-bit resolution; applies to family-wide conversions.
    pub const WORST_CASE_CONVERSION_MS: u32 = Resolution::Bits12.conversion_time_ms();

    /// Create a driver for the device at `address`. Nothing is sent on the bus
    /// until [`begin`](Ds18b20::begin).
    pub fn new(address: OneWireAddress, resolution: Resolution) -> Self {
        Self {
            address,
            resolution,
            scratchpad: [0; 9],
        }
    }

    /// ROM code of the device.
    pub fn address(&self) -> OneWireAddress {
        self.address
    }

    /// Resolution requested for this device.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Time to wait between [`sample`](Ds18b20::sample) and
    /// [`temperature`](Ds18b20::temperature).
    pub fn conversion_time_ms(&self) -> u32 {
        self.resolution.conversion_time_ms()
    }

    /// Last scratchpad read from the device.
    pub fn scratchpad(&self) -> &[u8; 9] {
        &self.scratchpad
    }

    /// Read the scratchpad and program the requested resolution.
    ///
    /// The configuration is written and copied to EEPROM only when the device
    /// reports a different resolution.
    ///
    /// # Errors
    /// * [`OneWireError::InvalidFamily`] if the address is not a DS18B20.
    /// * [`OneWireError::InvalidCrc`] if the scratchpad fails its CRC.
    pub fn begin<O: OneWire>(&mut self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        if self.address.family() != Self::FAMILY {
            return Err(OneWireError::InvalidFamily);
        }
        self.read_scratchpad(bus)?;
        let config = self.resolution as u8;
        if self.scratchpad[4] != config {
            self.scratchpad[4] = config;
            bus.address(Some(self.address))?;
            bus.write_byte(WRITE_SCRATCH)?;
            // TH, TL, configuration
            bus.write_bytes(&self.scratchpad[2..5])?;
            bus.address(Some(self.address))?;
            bus.write_byte(COPY_SCRATCH)?;
        }
        Ok(())
    }

    /// Start a temperature conversion on this device.
    pub fn sample<O: OneWire>(&self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        bus.address(Some(self.address))?;
        bus.write_byte(CONVERT_T)
    }

    /// Start a temperature conversion on every device of the bus.
    pub fn sample_all<O: OneWire>(bus: &mut O) -> OneWireResult<(), O::BusError> {
        bus.address(None)?;
        bus.write_byte(CONVERT_T)
    }

    /// Read the result of the last conversion.
    ///
    /// Bits that are undefined at the configured resolution are cleared.
    pub fn temperature<O: OneWire>(&mut self, bus: &mut O) -> OneWireResult<Temperature, O::BusError> {
        self.read_scratchpad(bus)?;
        let raw = i16::from_le_bytes([self.scratchpad[0], self.scratchpad[1]]);
        Ok(Temperature::from_bits(raw & self.resolution.mask()))
    }

    fn read_scratchpad<O: OneWire>(&mut self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        let mut buf = [0u8; 9];
        read_checked(bus, self.address, &[READ_SCRATCH], &mut buf)?;
        self.scratchpad = buf;
        Ok(())
    }
}

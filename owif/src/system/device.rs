use core::fmt;

use embedded_onewire::{FamilyCode, OneWire, OneWireAddress, OneWireError, OneWireResult};
use onewire_devices::{Ds18b20, Ds2411, Ds2438, Resolution};

use super::ChannelId;

/// A readable device attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    /// Whether the device answers on its bus.
    Presence,
    /// Temperature in °C.
    Temperature,
    /// DS2438 general purpose A/D input, in V.
    Vad,
    /// DS2438 supply voltage, in V.
    Vdd,
}

impl Attribute {
    /// Name of the attribute in requests and responses.
    pub const fn name(self) -> &'static str {
        match self {
            Attribute::Presence => "presence",
            Attribute::Temperature => "temperature",
            Attribute::Vad => "VAD",
            Attribute::Vdd => "VDD",
        }
    }

    /// Inverse of [`name`](Attribute::name).
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Attribute::Presence,
            Attribute::Temperature,
            Attribute::Vad,
            Attribute::Vdd,
        ]
        .into_iter()
        .find(|a| a.name() == name)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered list of the measurable attributes of a family. Presence is implied
/// for every family and not listed; unknown families have none.
pub fn attributes(family: FamilyCode) -> &'static [Attribute] {
    match family {
        Ds18b20::FAMILY => &[Attribute::Temperature],
        Ds2438::FAMILY => &[Attribute::Temperature, Attribute::Vad, Attribute::Vdd],
        _ => &[],
    }
}

/// Part name of a supported family.
pub fn family_name(family: FamilyCode) -> Option<&'static str> {
    match family {
        Ds18b20::FAMILY => Some("DS18B20"),
        Ds2438::FAMILY => Some("DS2438"),
        Ds2411::FAMILY => Some("DS2411"),
        _ => None,
    }
}

/// Time to wait after a family-wide conversion, which cannot know the
/// resolution of the individual devices.
pub fn family_conversion_time_ms(family: FamilyCode) -> u32 {
    match family {
        Ds18b20::FAMILY => Ds18b20::WORST_CASE_CONVERSION_MS,
        Ds2438::FAMILY => Ds2438::CONVERSION_TIME_MS,
        _ => 0,
    }
}

/// Protocol of one device, chosen from its family code.
#[derive(Debug, Clone)]
pub enum FamilyDevice {
    /// DS2411 and every family without a driver.
    PresenceOnly(Ds2411),
    /// DS18B20 thermometer.
    Ds18b20(Ds18b20),
    /// DS2438 battery monitor.
    Ds2438(Ds2438),
}

/// A registered device and the channel it was discovered on.
#[derive(Debug, Clone)]
pub struct OneWireDevice {
    channel: ChannelId,
    device: FamilyDevice,
}

impl OneWireDevice {
    /// Pick the driver for `address`. DS18B20s run at 12 bits.
    pub fn create(channel: ChannelId, address: OneWireAddress) -> Self {
        let device = match address.family() {
            Ds18b20::FAMILY => FamilyDevice::Ds18b20(Ds18b20::new(address, Resolution::Bits12)),
            Ds2438::FAMILY => FamilyDevice::Ds2438(Ds2438::new(address)),
            _ => FamilyDevice::PresenceOnly(Ds2411::new(address)),
        };
        Self { channel, device }
    }

    /// Initialize the device on its bus.
    pub fn begin<O: OneWire>(&mut self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        match &mut self.device {
            FamilyDevice::PresenceOnly(_) => Ok(()),
            FamilyDevice::Ds18b20(dev) => dev.begin(bus),
            FamilyDevice::Ds2438(dev) => dev.begin(bus),
        }
    }

    /// ROM code of the device.
    pub fn address(&self) -> OneWireAddress {
        match &self.device {
            FamilyDevice::PresenceOnly(dev) => dev.address(),
            FamilyDevice::Ds18b20(dev) => dev.address(),
            FamilyDevice::Ds2438(dev) => dev.address(),
        }
    }

    /// Channel the device was discovered on.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Family code of the device.
    pub fn family(&self) -> FamilyCode {
        self.address().family()
    }

    /// The family driver.
    pub fn device(&self) -> &FamilyDevice {
        &self.device
    }

    /// Whether `attribute` can be sampled on this device.
    pub fn supports(&self, attribute: Attribute) -> bool {
        attributes(self.family()).contains(&attribute)
    }

    /// Start a conversion of `attribute` and return how long to wait before
    /// [`read`](OneWireDevice::read).
    ///
    /// # Errors
    /// [`OneWireError::Unimplemented`] if the family lacks the attribute.
    pub fn sample<O: OneWire>(
        &mut self,
        bus: &mut O,
        attribute: Attribute,
    ) -> OneWireResult<u32, O::BusError> {
        match (&mut self.device, attribute) {
            (FamilyDevice::Ds18b20(dev), Attribute::Temperature) => {
                dev.sample(bus)?;
                Ok(dev.conversion_time_ms())
            }
            (FamilyDevice::Ds2438(dev), Attribute::Temperature) => {
                dev.sample_temperature(bus)?;
                Ok(Ds2438::CONVERSION_TIME_MS)
            }
            (FamilyDevice::Ds2438(dev), Attribute::Vad) => {
                dev.sample_vad(bus)?;
                Ok(Ds2438::CONVERSION_TIME_MS)
            }
            (FamilyDevice::Ds2438(dev), Attribute::Vdd) => {
                dev.sample_vdd(bus)?;
                Ok(Ds2438::CONVERSION_TIME_MS)
            }
            _ => Err(OneWireError::Unimplemented),
        }
    }

    /// Read the result of the last conversion of `attribute`.
    ///
    /// The voltage attributes return whichever input the last
    /// [`sample`](OneWireDevice::sample) selected.
    pub fn read<O: OneWire>(
        &mut self,
        bus: &mut O,
        attribute: Attribute,
    ) -> OneWireResult<f32, O::BusError> {
        match (&mut self.device, attribute) {
            (FamilyDevice::Ds18b20(dev), Attribute::Temperature) => {
                Ok(dev.temperature(bus)?.to_num::<f32>())
            }
            (FamilyDevice::Ds2438(dev), Attribute::Temperature) => {
                Ok(dev.temperature(bus)?.to_num::<f32>())
            }
            (FamilyDevice::Ds2438(dev), Attribute::Vad | Attribute::Vdd) => dev.voltage(bus),
            _ => Err(OneWireError::Unimplemented),
        }
    }

    /// Start a temperature conversion on every device of `family` on the bus.
    pub fn sample_family_temperature<O: OneWire>(
        bus: &mut O,
        family: FamilyCode,
    ) -> OneWireResult<u32, O::BusError> {
        match family {
            Ds18b20::FAMILY => Ds18b20::sample_all(bus)?,
            Ds2438::FAMILY => Ds2438::sample_temperature_all(bus)?,
            _ => return Err(OneWireError::Unimplemented),
        }
        Ok(family_conversion_time_ms(family))
    }
}

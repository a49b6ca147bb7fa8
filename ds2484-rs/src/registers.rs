use crate::{Ds2484, Ds2484Error, Ds2484Result, InvalidPortParameter};
use bitfield_struct::bitfield;
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use embedded_onewire::OneWireStatus;

pub(crate) const READ_PTR_CMD: u8 = 0xe1; // Set the read pointer
pub(crate) const DEVICE_RST_CMD: u8 = 0xf0; // Reset the device
pub(crate) const WRITE_CONFIG_CMD: u8 = 0xd2;
pub(crate) const ADJUST_PORT_CMD: u8 = 0xc3;

/// A DS2484 register selected with the Set Read Pointer command.
pub trait Register: Sized {
    /// Read pointer code of the register.
    const READ_PTR: u8;
    /// Number of bytes one read returns.
    const LEN: usize;

    /// Decode the bytes returned by a read.
    fn decode(bytes: &[u8]) -> Self;
}

/// Status register for DS2484.
///
/// All 1-Wire commands and the Device Reset command leave the read pointer at
/// this register, so it can be polled with a bare I2C read. It reports bit-type
/// results from the 1-Wire side, the busy flag and the reset state of the bridge
/// ([datasheet, Table 3](https://www.analog.com/media/en/technical-documentation/data-sheets/ds2484.pdf)).
#[bitfield(u8)]
pub struct DeviceStatus {
    /// 1WB: a 1-Wire command is in progress.
    pub(crate) onewire_busy: bool,
    /// PPD: a presence pulse was seen during the last 1-Wire Reset.
    present_pulse_detect: bool,
    /// SD: the line was low at tSI during the last 1-Wire Reset.
    pub(crate) short_detect: bool,
    /// LL: logic level of the 1-Wire line sampled while reading this register.
    pub logic_level: bool,
    /// RST: the bridge went through an internal reset and needs its
    /// configuration written again.
    pub device_reset: bool,
    /// SBR: line state sampled during a Single Bit command or the first
    /// slot of a Triplet.
    pub(crate) single_bit_result: bool,
    /// TSB: line state sampled during the second slot of a Triplet.
    pub(crate) triplet_second_bit: bool,
    /// DIR: branch direction written by the third slot of a Triplet.
    pub(crate) branch_dir_taken: bool,
}

impl OneWireStatus for DeviceStatus {
    fn presence(&self) -> bool {
        self.present_pulse_detect()
    }

    fn shortcircuit(&self) -> bool {
        self.short_detect()
    }

    fn logic_level(&self) -> Option<bool> {
        Some(self.logic_level())
    }

    fn direction(&self) -> Option<bool> {
        Some(self.branch_dir_taken())
    }
}

impl Register for DeviceStatus {
    const READ_PTR: u8 = 0xf0;
    const LEN: usize = 1;

    fn decode(bytes: &[u8]) -> Self {
        Self::from_bits(bytes[0])
    }
}

/// # Device configuration register
///
/// Selects the active pullup (APU), 1-Wire power-down (PDN), strong pullup (SPU)
/// and 1-Wire speed (1WS). The register reads 00h after a device reset.
///
/// Writes carry the one's complement of the four configuration bits in the upper
/// nibble; the bridge answers with the lower nibble only.
#[bitfield(u8)]
pub struct DeviceConfiguration {
    /// APU: drive rising edges through the low impedance pullup instead of R_WPU.
    pub active_pullup: bool,
    /// PDN: remove power from the 1-Wire port.
    pub power_down_1wire: bool,
    /// SPU: strong pullup after the next Write Byte or Single Bit command.
    pub strong_pullup: bool,
    /// 1WS: overdrive timing.
    pub onewire_speed: bool,
    #[bits(4)]
    __: u8,
}

impl DeviceConfiguration {
    /// Byte written with the Write Device Configuration command.
    pub const fn encoded(&self) -> u8 {
        let cfg = self.into_bits() & 0x0f;
        cfg | ((!cfg & 0x0f) << 4)
    }
}

impl Register for DeviceConfiguration {
    const READ_PTR: u8 = 0xc3;
    const LEN: usize = 1;

    fn decode(bytes: &[u8]) -> Self {
        Self::from_bits(bytes[0] & 0x0f)
    }
}

/// Adjustable 1-Wire port parameters.
///
/// The discriminant is the parameter selector placed in bits 7..5 of an Adjust
/// 1-Wire Port control byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortParameter {
    /// tRSTL, reset low time.
    ResetLow = 0,
    /// tMSP, presence-detect sampling time.
    PresenceDetect = 1,
    /// tW0L, write zero low time.
    WriteZeroLow = 2,
    /// tREC0, write zero recovery time. No overdrive variant.
    WriteZeroRecovery = 3,
    /// R_WPU, weak pullup resistor. No overdrive variant.
    WeakPullup = 4,
}

impl PortParameter {
    /// Position of the parameter in the eight bytes returned by a port read.
    pub const fn index(self, overdrive: bool) -> Option<usize> {
        match (self, overdrive) {
            (PortParameter::ResetLow, od) => Some(od as usize),
            (PortParameter::PresenceDetect, od) => Some(2 + od as usize),
            (PortParameter::WriteZeroLow, od) => Some(4 + od as usize),
            (PortParameter::WriteZeroRecovery, false) => Some(6),
            (PortParameter::WeakPullup, false) => Some(7),
            _ => None,
        }
    }

    /// Build the control byte `PPP O VVVV`.
    pub const fn control_byte(self, overdrive: bool, code: u8) -> u8 {
        ((self as u8) << 5) | ((overdrive as u8) << 4) | (code & 0x0f)
    }
}

const PORT_ORDER: [(PortParameter, bool); 8] = [
    (PortParameter::ResetLow, false),
    (PortParameter::ResetLow, true),
    (PortParameter::PresenceDetect, false),
    (PortParameter::PresenceDetect, true),
    (PortParameter::WriteZeroLow, false),
    (PortParameter::WriteZeroLow, true),
    (PortParameter::WriteZeroRecovery, false),
    (PortParameter::WeakPullup, false),
];

/// 1-Wire port parameters.
///
/// Affects the 1-Wire timing or pull-up resistors. Each parameter is a 4-bit code.
///
/// # Note: Upon a power-on reset or after a
/// Device Reset command, every code reads `0110b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneWirePortConfiguration {
    codes: [u8; 8],
}

impl Default for OneWirePortConfiguration {
    fn default() -> Self {
        Self { codes: [0x06; 8] }
    }
}

impl Register for OneWirePortConfiguration {
    const READ_PTR: u8 = 0xb4;
    const LEN: usize = 8;

    fn decode(bytes: &[u8]) -> Self {
        let mut codes = [0u8; 8];
        for (code, byte) in codes.iter_mut().zip(bytes) {
            *code = byte & 0x0f;
        }
        Self { codes }
    }
}

impl OneWirePortConfiguration {
    /// Construct from the eight bytes returned by a port read.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self::decode(&bytes)
    }

    /// The eight parameter codes in read order.
    pub fn codes(&self) -> [u8; 8] {
        self.codes
    }

    /// Whether every parameter holds its power-on default.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// The code for one parameter, if it exists.
    pub fn get(&self, param: PortParameter, overdrive: bool) -> Option<u8> {
        param.index(overdrive).map(|i| self.codes[i])
    }

    /// Set the code for one parameter.
    pub fn set(
        &mut self,
        param: PortParameter,
        overdrive: bool,
        code: u8,
    ) -> Result<(), InvalidPortParameter> {
        let idx = param.index(overdrive).ok_or(InvalidPortParameter)?;
        if code > 0x0f {
            return Err(InvalidPortParameter);
        }
        self.codes[idx] = code;
        Ok(())
    }

    /// Write every parameter that differs from `current`, then read the port back
    /// and compare.
    pub(crate) fn write_changes<I: I2c<SevenBitAddress>, D: DelayNs>(
        &self,
        dev: &mut Ds2484<I, D>,
        current: &Self,
    ) -> Ds2484Result<(), I::Error> {
        let mut buf = [0u8; 9];
        buf[0] = ADJUST_PORT_CMD;
        let mut len = 1;
        for (i, (param, od)) in PORT_ORDER.iter().enumerate() {
            if self.codes[i] != current.codes[i] {
                buf[len] = param.control_byte(*od, self.codes[i]);
                len += 1;
            }
        }
        if len == 1 {
            return Ok(());
        }
        dev.i2c.write(dev.addr, &buf[..len])?;
        let readback: Self = dev.read_register()?;
        if readback != *self {
            return Err(Ds2484Error::PortConfigMismatch);
        }
        Ok(())
    }

    /// Standard speed reset low time (tRSTL) in ns: 440 µs plus 20 µs per step.
    pub fn reset_time(&self) -> u32 {
        (440 + 20 * u32::from(self.codes[0])) * 1000
    }

    /// Standard speed presence-detect sampling time (tMSP) in ns.
    ///
    /// Codes 2 to 12 step by 2 µs from 60 µs; the codes below and above clamp.
    pub fn presence_detect_time(&self) -> u32 {
        let code = u32::from(self.codes[2]).clamp(1, 13);
        (56 + 2 * code).clamp(58, 76) * 1000
    }

    /// Standard speed write zero low time (tW0L) in ns, 52 µs to 70 µs.
    pub fn write_zero_low_time(&self) -> u32 {
        (52 + 2 * u32::from(self.codes[4]).min(9)) * 1000
    }

    /// Write zero recovery time (tREC0) in ns, 2.75 µs to 25.25 µs.
    pub fn write_zero_recovery_time(&self) -> u32 {
        let steps = u32::from(self.codes[6]).clamp(5, 14) - 5;
        2750 + 2500 * steps
    }

    /// Weak pull-up resistor (R_WPU) in ohms.
    pub fn weak_pullup_resistor(&self) -> u16 {
        match self.codes[7] {
            0..=5 => 500,
            _ => 1000,
        }
    }
}

/// Builder for configuring the 1-Wire port parameters.
#[derive(Debug, Default)]
pub struct OneWireConfigurationBuilder {
    cfg: OneWirePortConfiguration,
}

impl From<OneWirePortConfiguration> for OneWireConfigurationBuilder {
    fn from(cfg: OneWirePortConfiguration) -> Self {
        Self { cfg }
    }
}

impl OneWireConfigurationBuilder {
    /// Set a raw 4-bit parameter code.
    pub fn parameter(
        mut self,
        param: PortParameter,
        overdrive: bool,
        code: u8,
    ) -> Result<Self, InvalidPortParameter> {
        self.cfg.set(param, overdrive, code)?;
        Ok(self)
    }

    /// Build the configuration.
    pub fn build(self) -> OneWirePortConfiguration {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_complement() {
        let cfg = DeviceConfiguration::new().with_active_pullup(true);
        assert_eq!(cfg.encoded(), 0xe1);
        let cfg = cfg.with_strong_pullup(true);
        assert_eq!(cfg.encoded(), 0xa5);
    }

    #[test]
    fn control_bytes() {
        assert_eq!(PortParameter::ResetLow.control_byte(false, 0x06), 0x06);
        assert_eq!(PortParameter::PresenceDetect.control_byte(true, 0x06), 0x36);
        assert_eq!(PortParameter::WriteZeroRecovery.control_byte(false, 0x06), 0x66);
        assert_eq!(PortParameter::WeakPullup.control_byte(false, 0x06), 0x86);
    }

    #[test]
    fn default_timing() {
        let port = OneWirePortConfiguration::default();
        assert!(port.is_default());
        assert_eq!(port.reset_time(), 560000);
        assert_eq!(port.presence_detect_time(), 68000);
        assert_eq!(port.write_zero_low_time(), 64000);
        assert_eq!(port.write_zero_recovery_time(), 5250);
        assert_eq!(port.weak_pullup_resistor(), 1000);
    }

    #[test]
    fn timing_limits() {
        let port = OneWirePortConfiguration::from_bytes([0xff, 0, 0x00, 0, 0x0f, 0, 0x0f, 0x00]);
        assert_eq!(port.reset_time(), 740000);
        assert_eq!(port.presence_detect_time(), 58000);
        assert_eq!(port.write_zero_low_time(), 70000);
        assert_eq!(port.write_zero_recovery_time(), 25250);
        assert_eq!(port.weak_pullup_resistor(), 500);
        let port = OneWirePortConfiguration::from_bytes([0, 0, 0x0f, 0, 0, 0, 0x02, 0]);
        assert_eq!(port.reset_time(), 440000);
        assert_eq!(port.presence_detect_time(), 76000);
        assert_eq!(port.write_zero_low_time(), 52000);
        assert_eq!(port.write_zero_recovery_time(), 2750);
    }

    #[test]
    fn builder_ranges() {
        let port = OneWireConfigurationBuilder::default()
            .parameter(PortParameter::ResetLow, false, 3)
            .unwrap()
            .parameter(PortParameter::WeakPullup, false, 0)
            .unwrap()
            .build();
        assert_eq!(port.get(PortParameter::ResetLow, false), Some(3));
        assert_eq!(port.get(PortParameter::WeakPullup, false), Some(0));
        assert_eq!(port.get(PortParameter::WeakPullup, true), None);
        assert!(
            OneWireConfigurationBuilder::default()
                .parameter(PortParameter::WriteZeroLow, true, 0x12)
                .is_err()
        );
    }
}

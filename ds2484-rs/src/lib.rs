#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

/*! # DS2484
 *
 * Driver for the Analog Devices DS2484 single-channel I2C to 1-Wire bridge.
 *
 * [`Ds2484Builder`] resets the bridge, writes the device configuration, then
 * checks the 1-Wire port timing and corrects the codes that differ. The resulting [`Ds2484`] implements the
 * [`OneWire`] trait, including the hardware triplet used by the search algorithm.
 */

pub use embedded_onewire::{OneWire, OneWireError, OneWireResult};
mod error;
mod onewire;
mod registers;

pub use error::{Ds2484Error, InvalidPortParameter};
pub use registers::{
    DeviceConfiguration, DeviceStatus, OneWireConfigurationBuilder, OneWirePortConfiguration,
    PortParameter, Register,
};

use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use registers::{DEVICE_RST_CMD, READ_PTR_CMD, WRITE_CONFIG_CMD};

/// Results of DS2484-specific function calls.
pub type Ds2484Result<T, E> = Result<T, Ds2484Error<E>>;

/// Fixed 7-bit I2C address of the DS2484.
pub const DS2484_I2C_ADDRESS: u8 = 0x18;

/// Default number of status polls before an operation times out.
pub const DEFAULT_RETRIES: u8 = 10;

/// A DS2484 I2C to 1-Wire bridge device.
///
/// Takes ownership of an I2C bus (implementing [`I2c`](embedded_hal::i2c::I2c) trait)
/// and a timer object implementing the [`DelayNs`](embedded_hal::delay::DelayNs) trait.
pub struct Ds2484<I, D> {
    pub(crate) i2c: I,
    pub(crate) addr: u8,
    pub(crate) delay: D,
    pub(crate) retries: u8,
    pub(crate) reset: bool, // Device reset, configuration not yet written
    pub(crate) port: OneWirePortConfiguration,
}

/// Builder for creating a [`Ds2484`] instance with custom configuration.
pub struct Ds2484Builder {
    pub(crate) retries: u8,
    pub(crate) config: DeviceConfiguration,
    pub(crate) port: OneWirePortConfiguration,
}

impl Default for Ds2484Builder {
    fn default() -> Self {
        Ds2484Builder {
            retries: DEFAULT_RETRIES,
            config: DeviceConfiguration::new().with_active_pullup(true),
            port: OneWirePortConfiguration::default(),
        }
    }
}

impl Ds2484Builder {
    /// Sets the retry count for the device.
    ///
    /// The retry count is the number of status register polls, spaced 1 ms
    /// apart, before an operation on the 1-Wire or I2C bus times out.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the device configuration.
    pub fn with_config(mut self, config: DeviceConfiguration) -> Self {
        self.config = config;
        self
    }

    /// Sets the 1-Wire port timing enforced during [`build`](Ds2484Builder::build).
    /// Defaults to the power-on codes.
    ///
    /// Only parameters that differ from what the device reports are written.
    pub fn with_port_configuration(mut self, port: OneWirePortConfiguration) -> Self {
        self.port = port;
        self
    }

    /// Builds a new `Ds2484` instance with the specified configuration.
    ///
    /// # Errors
    /// * [`Ds2484Error::RetriesExceeded`] if the device reset never completes.
    /// * [`Ds2484Error::ConfigMismatch`] if the configuration read back differs.
    /// * [`Ds2484Error::PortConfigMismatch`] if the port timing read back differs.
    pub fn build<I: I2c<SevenBitAddress>, D: DelayNs>(
        self,
        i2c: I,
        delay: D,
    ) -> Ds2484Result<Ds2484<I, D>, I::Error> {
        let mut dev = Ds2484 {
            i2c,
            addr: DS2484_I2C_ADDRESS,
            delay,
            retries: self.retries,
            reset: true,
            port: self.port,
        };
        dev.device_reset()?;
        dev.write_configuration(self.config)?;
        let current = dev.port_configuration()?;
        if current != dev.port {
            let wanted = dev.port.clone();
            wanted.write_changes(&mut dev, &current)?;
        }
        Ok(dev)
    }
}

impl<I: I2c<SevenBitAddress>, D: DelayNs> Ds2484<I, D> {
    /// Point the read pointer at `R` and read it.
    pub fn read_register<R: Register>(&mut self) -> Ds2484Result<R, I::Error> {
        let mut buf = [0u8; 8];
        let buf = &mut buf[..R::LEN];
        self.i2c
            .write_read(self.addr, &[READ_PTR_CMD, R::READ_PTR], buf)?;
        Ok(R::decode(buf))
    }

    /// Get the status of the device.
    pub fn get_status(&mut self) -> Ds2484Result<DeviceStatus, I::Error> {
        self.read_register()
    }

    /// Read the device configuration register.
    pub fn configuration(&mut self) -> Ds2484Result<DeviceConfiguration, I::Error> {
        self.read_register()
    }

    /// Write the device configuration and check the echo.
    ///
    /// # Errors
    /// [`Ds2484Error::ConfigMismatch`] if the bridge answers with other bits.
    pub fn write_configuration(
        &mut self,
        config: DeviceConfiguration,
    ) -> Ds2484Result<(), I::Error> {
        let mut echo = [0u8; 1];
        self.i2c
            .write_read(self.addr, &[WRITE_CONFIG_CMD, config.encoded()], &mut echo)?;
        if echo[0] != config.into_bits() & 0x0f {
            return Err(Ds2484Error::ConfigMismatch);
        }
        self.reset = false;
        Ok(())
    }

    /// Read the eight 1-Wire port parameters.
    pub fn port_configuration(&mut self) -> Ds2484Result<OneWirePortConfiguration, I::Error> {
        self.read_register()
    }

    /// Port timing verified by the last [`build`](Ds2484Builder::build) or
    /// [`adjust_port`](Ds2484::adjust_port).
    pub fn timing(&self) -> &OneWirePortConfiguration {
        &self.port
    }

    /// Adjust a single 1-Wire port parameter and verify it by reading the port back.
    ///
    /// # Errors
    /// * [`Ds2484Error::InvalidPortParameter`] if `code` exceeds 4 bits or the parameter
    ///   has no overdrive variant.
    /// * [`Ds2484Error::PortConfigMismatch`] if the device does not report the new value.
    pub fn adjust_port(
        &mut self,
        param: PortParameter,
        overdrive: bool,
        code: u8,
    ) -> Ds2484Result<(), I::Error> {
        if code > 0x0f || param.index(overdrive).is_none() {
            return Err(Ds2484Error::InvalidPortParameter);
        }
        let current = self.port_configuration()?;
        let mut port = current.clone();
        port.set(param, overdrive, code)
            .map_err(|_| Ds2484Error::InvalidPortParameter)?;
        port.write_changes(self, &current)?;
        self.port = port;
        Ok(())
    }

    /// Reset the device.
    ///
    /// Performs a global reset of device state machine logic. Terminates any ongoing 1-Wire
    /// communication. The device configuration must be written again afterwards.
    pub fn device_reset(&mut self) -> Ds2484Result<DeviceStatus, I::Error> {
        self.i2c.write(self.addr, &[DEVICE_RST_CMD])?;
        self.reset = true;
        let mut buf = [0u8; 1];
        for _ in 0..self.retries {
            self.i2c.read(self.addr, &mut buf)?;
            let status = DeviceStatus::from_bits(buf[0]);
            if status.device_reset() {
                return Ok(status);
            }
            self.delay.delay_ms(1);
        }
        Err(Ds2484Error::RetriesExceeded)
    }

    /// Poll the status register until the 1-Wire busy flag clears.
    ///
    /// Every 1-Wire command leaves the read pointer at the status register.
    pub(crate) fn onewire_wait(&mut self) -> Ds2484Result<DeviceStatus, I::Error> {
        let mut buf = [0u8; 1];
        for _ in 0..self.retries {
            self.i2c.read(self.addr, &mut buf)?;
            let status = DeviceStatus::from_bits(buf[0]);
            if !status.onewire_busy() {
                return Ok(status);
            }
            self.delay.delay_ms(1);
        }
        Err(Ds2484Error::RetriesExceeded)
    }

    /// Give back the I2C bus and the delay.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::{
        delay::NoopDelay,
        i2c::{Mock as I2cMock, Transaction},
    };

    const ADDR: u8 = DS2484_I2C_ADDRESS;

    fn reset_and_configure() -> Vec<Transaction> {
        vec![
            Transaction::write(ADDR, vec![0xf0]),
            Transaction::read(ADDR, vec![0x18]),
            // APU only: 0x01 with its complement in the upper nibble
            Transaction::write_read(ADDR, vec![0xd2, 0xe1], vec![0x01]),
            Transaction::write_read(ADDR, vec![0xe1, 0xb4], vec![0x06; 8]),
        ]
    }

    pub(crate) fn built(extra: &[Transaction]) -> (Ds2484<I2cMock, NoopDelay>, I2cMock) {
        let mut expectations = reset_and_configure();
        expectations.extend_from_slice(extra);
        let i2c = I2cMock::new(&expectations);
        let dev = Ds2484Builder::default()
            .build(i2c.clone(), NoopDelay::new())
            .unwrap();
        (dev, i2c)
    }

    #[test]
    fn build_resets_and_configures() {
        let (dev, mut i2c) = built(&[]);
        assert!(!dev.reset);
        i2c.done();
    }

    #[test]
    fn build_waits_for_reset_flag() {
        let expectations = [
            Transaction::write(ADDR, vec![0xf0]),
            Transaction::read(ADDR, vec![0x00]),
            Transaction::read(ADDR, vec![0x10]),
            Transaction::write_read(ADDR, vec![0xd2, 0xe1], vec![0x01]),
            Transaction::write_read(ADDR, vec![0xe1, 0xb4], vec![0x06; 8]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        Ds2484Builder::default()
            .build(i2c.clone(), NoopDelay::new())
            .unwrap();
        i2c.done();
    }

    #[test]
    fn reset_timeout() {
        let expectations = [
            Transaction::write(ADDR, vec![0xf0]),
            Transaction::read(ADDR, vec![0x00]),
            Transaction::read(ADDR, vec![0x00]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let res = Ds2484Builder::default()
            .with_retries(2)
            .build(i2c.clone(), NoopDelay::new());
        assert!(matches!(res, Err(Ds2484Error::RetriesExceeded)));
        i2c.done();
    }

    #[test]
    fn configuration_echo_mismatch() {
        let expectations = [
            Transaction::write(ADDR, vec![0xf0]),
            Transaction::read(ADDR, vec![0x10]),
            Transaction::write_read(ADDR, vec![0xd2, 0xe1], vec![0x00]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let res = Ds2484Builder::default().build(i2c.clone(), NoopDelay::new());
        assert!(matches!(res, Err(Ds2484Error::ConfigMismatch)));
        i2c.done();
    }

    #[test]
    fn port_configuration_writes_only_changes() {
        let port = OneWireConfigurationBuilder::default()
            .parameter(PortParameter::ResetLow, false, 0x0a)
            .unwrap()
            .build();
        let mut expectations = reset_and_configure();
        expectations.extend_from_slice(&[
            Transaction::write(ADDR, vec![0xc3, 0x0a]),
            Transaction::write_read(
                ADDR,
                vec![0xe1, 0xb4],
                vec![0x0a, 0x06, 0x06, 0x06, 0x06, 0x06, 0x06, 0x06],
            ),
        ]);
        let mut i2c = I2cMock::new(&expectations);
        let dev = Ds2484Builder::default()
            .with_port_configuration(port)
            .build(i2c.clone(), NoopDelay::new())
            .unwrap();
        assert_eq!(dev.timing().reset_time(), 640000);
        drop(dev);
        i2c.done();
    }

    #[test]
    fn leftover_port_codes_are_corrected() {
        let leftover = vec![0x0a, 0x06, 0x06, 0x06, 0x02, 0x06, 0x06, 0x06];
        let expectations = [
            Transaction::write(ADDR, vec![0xf0]),
            Transaction::read(ADDR, vec![0x18]),
            Transaction::write_read(ADDR, vec![0xd2, 0xe1], vec![0x01]),
            Transaction::write_read(ADDR, vec![0xe1, 0xb4], leftover),
            // tRSTL and tW0L back to their power-on codes
            Transaction::write(ADDR, vec![0xc3, 0x06, 0x46]),
            Transaction::write_read(ADDR, vec![0xe1, 0xb4], vec![0x06; 8]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let dev = Ds2484Builder::default()
            .build(i2c.clone(), NoopDelay::new())
            .unwrap();
        assert!(dev.timing().is_default());
        drop(dev);
        i2c.done();
    }

    #[test]
    fn port_correction_is_verified() {
        let mut expectations = vec![
            Transaction::write(ADDR, vec![0xf0]),
            Transaction::read(ADDR, vec![0x18]),
            Transaction::write_read(ADDR, vec![0xd2, 0xe1], vec![0x01]),
        ];
        let stuck = vec![0x06, 0x06, 0x06, 0x06, 0x06, 0x06, 0x06, 0x00];
        expectations.extend_from_slice(&[
            Transaction::write_read(ADDR, vec![0xe1, 0xb4], stuck.clone()),
            Transaction::write(ADDR, vec![0xc3, 0x86]),
            Transaction::write_read(ADDR, vec![0xe1, 0xb4], stuck),
        ]);
        let mut i2c = I2cMock::new(&expectations);
        let res = Ds2484Builder::default().build(i2c.clone(), NoopDelay::new());
        assert!(matches!(res, Err(Ds2484Error::PortConfigMismatch)));
        i2c.done();
    }

    #[test]
    fn adjust_port_skips_unchanged() {
        let (mut dev, mut i2c) = built(&[Transaction::write_read(
            ADDR,
            vec![0xe1, 0xb4],
            vec![0x06; 8],
        )]);
        assert!(dev.adjust_port(PortParameter::WeakPullup, false, 0x06).is_ok());
        i2c.done();
    }

    #[test]
    fn adjust_port_verifies() {
        let (mut dev, mut i2c) = built(&[
            Transaction::write_read(ADDR, vec![0xe1, 0xb4], vec![0x06; 8]),
            Transaction::write(ADDR, vec![0xc3, 0x32]),
            Transaction::write_read(ADDR, vec![0xe1, 0xb4], vec![0x06; 8]),
        ]);
        let res = dev.adjust_port(PortParameter::PresenceDetect, true, 0x02);
        assert!(matches!(res, Err(Ds2484Error::PortConfigMismatch)));
        i2c.done();
    }

    #[test]
    fn adjust_port_rejects_invalid() {
        let (mut dev, mut i2c) = built(&[]);
        let res = dev.adjust_port(PortParameter::ResetLow, false, 0x10);
        assert!(matches!(res, Err(Ds2484Error::InvalidPortParameter)));
        let res = dev.adjust_port(PortParameter::WriteZeroRecovery, true, 0x01);
        assert!(matches!(res, Err(Ds2484Error::InvalidPortParameter)));
        i2c.done();
    }
}

use core::fmt;

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
};

/// Half of one recovery clock period, in microseconds (100 kHz).
const HALF_PERIOD_US: u32 = 5;
/// Clock-stretch polls after each recovery pulse, one microsecond apart.
const STRETCH_CHECKS: u32 = 250;
/// A peer can be at most one byte and its acknowledge into a transfer.
const RECOVERY_PULSES: u8 = 9;

/// Bus recovery failures. Each one is fatal to the initialization of that bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryError {
    /// SCL is held low by a peer.
    SclLow,
    /// SDA is still held low after the clock pulses.
    SdaLow,
    /// A recovery pin could not be driven or read.
    Pin,
}

impl fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryError::SclLow => f.write_str("SCL held low"),
            RecoveryError::SdaLow => f.write_str("SDA held low"),
            RecoveryError::Pin => f.write_str("recovery pin failure"),
        }
    }
}

/// Frees a bus that a peer left in the middle of a transfer.
pub trait BusRecovery {
    /// Run the recovery sequence once.
    fn recover(&mut self) -> Result<(), RecoveryError>;
}

/// For peripherals that recover the bus themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRecovery;

impl BusRecovery for NoRecovery {
    fn recover(&mut self) -> Result<(), RecoveryError> {
        Ok(())
    }
}

/// Bit-banged recovery on the open-drain SCL and SDA pins.
///
/// Setting a pin high releases the line to its pull-up.
pub struct PinRecovery<SCL, SDA, D> {
    scl: SCL,
    sda: SDA,
    delay: D,
}

impl<SCL, SDA, D> PinRecovery<SCL, SDA, D>
where
    SCL: InputPin + OutputPin,
    SDA: InputPin + OutputPin,
    D: DelayNs,
{
    /// Take the two bus pins, configured as open-drain outputs.
    pub fn new(scl: SCL, sda: SDA, delay: D) -> Self {
        Self { scl, sda, delay }
    }

    /// Give back the pins and the delay, so they can be handed to the peripheral.
    pub fn release(self) -> (SCL, SDA, D) {
        (self.scl, self.sda, self.delay)
    }

    fn clock_pulse(&mut self) -> Result<(), RecoveryError> {
        self.scl.set_low().map_err(pin)?;
        self.delay.delay_us(HALF_PERIOD_US);
        self.scl.set_high().map_err(pin)?;
        self.delay.delay_us(HALF_PERIOD_US);
        for _ in 0..STRETCH_CHECKS {
            if self.scl.is_high().map_err(pin)? {
                return Ok(());
            }
            self.delay.delay_us(1);
        }
        Err(RecoveryError::SclLow)
    }
}

fn pin<E>(_: E) -> RecoveryError {
    RecoveryError::Pin
}

impl<SCL, SDA, D> BusRecovery for PinRecovery<SCL, SDA, D>
where
    SCL: InputPin + OutputPin,
    SDA: InputPin + OutputPin,
    D: DelayNs,
{
    fn recover(&mut self) -> Result<(), RecoveryError> {
        self.sda.set_high().map_err(pin)?;
        self.scl.set_high().map_err(pin)?;
        self.delay.delay_us(HALF_PERIOD_US);
        if !self.scl.is_high().map_err(pin)? {
            return Err(RecoveryError::SclLow);
        }
        for _ in 0..RECOVERY_PULSES {
            if self.sda.is_high().map_err(pin)? {
                break;
            }
            self.clock_pulse()?;
        }
        if !self.sda.is_high().map_err(pin)? {
            return Err(RecoveryError::SdaLow);
        }
        // START then STOP, both with SCL high
        self.sda.set_low().map_err(pin)?;
        self.delay.delay_us(HALF_PERIOD_US);
        self.sda.set_high().map_err(pin)?;
        self.delay.delay_us(HALF_PERIOD_US);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::{
        delay::NoopDelay,
        digital::{Mock as PinMock, State, Transaction as Pin},
    };

    fn pulse(scl: &mut Vec<Pin>) {
        scl.extend([Pin::set(State::Low), Pin::set(State::High), Pin::get(State::High)]);
    }

    fn run(scl: &[Pin], sda: &[Pin]) -> Result<(), RecoveryError> {
        let mut rec = PinRecovery::new(PinMock::new(scl), PinMock::new(sda), NoopDelay::new());
        let res = rec.recover();
        let (mut scl, mut sda, _) = rec.release();
        scl.done();
        sda.done();
        res
    }

    #[test]
    fn idle_bus_gets_start_stop() {
        let scl = [Pin::set(State::High), Pin::get(State::High)];
        let sda = [
            Pin::set(State::High),
            Pin::get(State::High),
            Pin::get(State::High),
            Pin::set(State::Low),
            Pin::set(State::High),
        ];
        assert_eq!(run(&scl, &sda), Ok(()));
    }

    #[test]
    fn stuck_clock_fails_at_once() {
        let scl = [Pin::set(State::High), Pin::get(State::Low)];
        let sda = [Pin::set(State::High)];
        assert_eq!(run(&scl, &sda), Err(RecoveryError::SclLow));
    }

    #[test]
    fn pulses_until_data_released() {
        let mut scl = vec![Pin::set(State::High), Pin::get(State::High)];
        pulse(&mut scl);
        pulse(&mut scl);
        let sda = [
            Pin::set(State::High),
            Pin::get(State::Low),
            Pin::get(State::Low),
            Pin::get(State::High),
            Pin::get(State::High),
            Pin::set(State::Low),
            Pin::set(State::High),
        ];
        assert_eq!(run(&scl, &sda), Ok(()));
    }

    #[test]
    fn data_held_after_nine_pulses() {
        let mut scl = vec![Pin::set(State::High), Pin::get(State::High)];
        let mut sda = vec![Pin::set(State::High)];
        for _ in 0..RECOVERY_PULSES {
            pulse(&mut scl);
            sda.push(Pin::get(State::Low));
        }
        sda.push(Pin::get(State::Low));
        assert_eq!(run(&scl, &sda), Err(RecoveryError::SdaLow));
    }

    #[test]
    fn clock_stretch_budget_is_bounded() {
        let mut scl = vec![
            Pin::set(State::High),
            Pin::get(State::High),
            Pin::set(State::Low),
            Pin::set(State::High),
        ];
        scl.extend((0..STRETCH_CHECKS).map(|_| Pin::get(State::Low)));
        let sda = [Pin::set(State::High), Pin::get(State::Low)];
        assert_eq!(run(&scl, &sda), Err(RecoveryError::SclLow));
    }
}

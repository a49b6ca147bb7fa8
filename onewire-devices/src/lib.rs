#![cfg_attr(not(test), no_std)]
//! Drivers for the 1-Wire devices carried by the bridge.
//!
//! Every driver owns its [`OneWireAddress`] and a copy of the last scratchpad it
//! read, and borrows the bus for each operation. Scratchpad reads are CRC checked.
//! Sampling and reading are split: the caller starts a conversion, waits for the
//! advertised conversion time, then reads the result.

mod ds18b20;
mod ds2411;
mod ds2438;

pub use ds18b20::{Ds18b20, Resolution, Temperature};
pub use ds2411::Ds2411;
pub use ds2438::{Ds2438, Ds2438Config, Ds2438Temperature};

use embedded_onewire::{OneWire, OneWireAddress, OneWireCrc, OneWireError, OneWireResult};

pub(crate) const READ_SCRATCH: u8 = 0xbe;
pub(crate) const WRITE_SCRATCH: u8 = 0x4e;
pub(crate) const COPY_SCRATCH: u8 = 0x48;
pub(crate) const CONVERT_T: u8 = 0x44;

/// Read `buf.len()` bytes following `cmd` from the addressed device and check
/// the trailing CRC byte.
pub(crate) fn read_checked<O: OneWire>(
    bus: &mut O,
    rom: OneWireAddress,
    cmd: &[u8],
    buf: &mut [u8],
) -> OneWireResult<(), O::BusError> {
    bus.address(Some(rom))?;
    bus.write_bytes(cmd)?;
    bus.read_bytes(buf)?;
    if OneWireCrc::validate(buf) {
        Ok(())
    } else {
        Err(OneWireError::InvalidCrc)
    }
}

#[cfg(test)]
pub(crate) mod testbus {
    use embedded_onewire::{OneWire, OneWireCrc, OneWireResult, OneWireStatus};
    use std::collections::VecDeque;

    pub struct Present;

    impl OneWireStatus for Present {
        fn presence(&self) -> bool {
            true
        }

        fn shortcircuit(&self) -> bool {
            false
        }
    }

    /// Records written bytes and answers reads from a queue.
    #[derive(Default)]
    pub struct ScriptBus {
        pub written: Vec<u8>,
        pub reads: VecDeque<u8>,
        pub resets: usize,
    }

    impl ScriptBus {
        pub fn answer(&mut self, bytes: &[u8]) {
            self.reads.extend(bytes.iter().copied());
        }

        /// Queue a scratchpad with its CRC appended.
        pub fn answer_scratchpad(&mut self, bytes: [u8; 8]) {
            self.answer(&bytes);
            self.answer(&[OneWireCrc::compute(&bytes)]);
        }
    }

    impl OneWire for ScriptBus {
        type Status = Present;
        type BusError = ();

        fn reset(&mut self) -> OneWireResult<Present, ()> {
            self.resets += 1;
            Ok(Present)
        }

        fn write_byte(&mut self, byte: u8) -> OneWireResult<(), ()> {
            self.written.push(byte);
            Ok(())
        }

        fn read_byte(&mut self) -> OneWireResult<u8, ()> {
            Ok(self.reads.pop_front().unwrap_or(0xff))
        }

        fn write_bit(&mut self, _bit: bool) -> OneWireResult<(), ()> {
            Ok(())
        }

        fn read_bit(&mut self) -> OneWireResult<bool, ()> {
            Ok(true)
        }
    }
}

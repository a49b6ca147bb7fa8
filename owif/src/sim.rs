//! In-memory 1-Wire bus with DS18B20, DS2438 and DS2411 models.
//!
//! Search follows wired-AND semantics: a slot reads 1 only when every device
//! still taking part sends 1.

use alloc::{collections::VecDeque, vec::Vec};
use core::convert::Infallible;

use embedded_onewire::{OneWire, OneWireAddress, OneWireCrc, OneWireResult, OneWireStatus};

const MATCH_ROM: u8 = 0x55;
const SKIP_ROM: u8 = 0xcc;
const SEARCH_ROM: u8 = 0xf0;
const ALARM_SEARCH: u8 = 0xec;
const CONVERT_T: u8 = 0x44;
const CONVERT_V: u8 = 0xb4;
const READ_SCRATCH: u8 = 0xbe;
const WRITE_SCRATCH: u8 = 0x4e;
const COPY_SCRATCH: u8 = 0x48;
const RECALL_MEMORY: u8 = 0xb8;

const DS18B20_POWER_ON: [u8; 8] = [0x50, 0x05, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10];
const DS2438_POWER_ON: [u8; 8] = [0x0f, 0, 0, 0, 0, 0, 0, 0];
const AD_BIT: u8 = 0x08;

/// Reset result of a [`SimBus`].
#[derive(Debug, Clone, Copy)]
pub struct SimStatus {
    presence: bool,
}

impl OneWireStatus for SimStatus {
    fn presence(&self) -> bool {
        self.presence
    }

    fn shortcircuit(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
enum Model {
    PresenceOnly,
    Ds18b20 { celsius: f32, pad: [u8; 8] },
    Ds2438 { celsius: f32, vad: f32, vdd: f32, page0: [u8; 8] },
}

#[derive(Debug, Clone)]
struct SimDevice {
    address: OneWireAddress,
    model: Model,
    corrupt: bool,
    conversions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Rom,
    MatchRom { rom: [u8; 8], len: usize },
    Search { bit: u8, step: u8 },
    Function,
    Page(u8),
    WriteScratch { offset: usize },
}

fn rom_bit(address: OneWireAddress, bit: u8) -> bool {
    (address.raw() >> bit) & 1 == 1
}

/// Simulated bus.
#[derive(Debug, Clone)]
pub struct SimBus {
    devices: Vec<SimDevice>,
    selected: Vec<usize>,
    phase: Phase,
    skipped: bool,
    out: VecDeque<u8>,
    broadcasts: u32,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            selected: Vec::new(),
            phase: Phase::Idle,
            skipped: false,
            out: VecDeque::new(),
            broadcasts: 0,
        }
    }

    /// Attach a device that only answers search and presence.
    pub fn add_device(&mut self, address: OneWireAddress) {
        self.attach(address, Model::PresenceOnly);
    }

    /// Attach a DS2411.
    pub fn add_ds2411(&mut self, address: OneWireAddress) {
        self.attach(address, Model::PresenceOnly);
    }

    /// Attach a DS18B20 measuring `celsius`. Its register holds the power-on
    /// 85 °C until the first conversion.
    pub fn add_ds18b20(&mut self, address: OneWireAddress, celsius: f32) {
        self.attach(
            address,
            Model::Ds18b20 {
                celsius,
                pad: DS18B20_POWER_ON,
            },
        );
    }

    /// Attach a DS2438 with its two voltage inputs.
    pub fn add_ds2438(&mut self, address: OneWireAddress, celsius: f32, vad: f32, vdd: f32) {
        self.attach(
            address,
            Model::Ds2438 {
                celsius,
                vad,
                vdd,
                page0: DS2438_POWER_ON,
            },
        );
    }

    /// Detach a device. Returns whether it was attached.
    pub fn remove_device(&mut self, address: OneWireAddress) -> bool {
        let before = self.devices.len();
        self.devices.retain(|d| d.address != address);
        self.selected.clear();
        self.phase = Phase::Idle;
        before != self.devices.len()
    }

    /// Change the temperature a device will convert next.
    pub fn set_temperature(&mut self, address: OneWireAddress, value: f32) {
        if let Some(dev) = self.find(address) {
            match &mut dev.model {
                Model::Ds18b20 { celsius, .. } | Model::Ds2438 { celsius, .. } => *celsius = value,
                Model::PresenceOnly => {}
            }
        }
    }

    /// Change the voltages a DS2438 will convert next.
    pub fn set_voltages(&mut self, address: OneWireAddress, new_vad: f32, new_vdd: f32) {
        if let Some(Model::Ds2438 { vad, vdd, .. }) = self.find(address).map(|d| &mut d.model) {
            *vad = new_vad;
            *vdd = new_vdd;
        }
    }

    /// Flip a bit in every scratchpad the device sends from now on, keeping its CRC.
    pub fn corrupt_scratchpad(&mut self, address: OneWireAddress) {
        if let Some(dev) = self.find(address) {
            dev.corrupt = true;
        }
    }

    /// Send intact scratchpads again.
    pub fn restore_scratchpad(&mut self, address: OneWireAddress) {
        if let Some(dev) = self.find(address) {
            dev.corrupt = false;
        }
    }

    /// Conversions the device has run.
    pub fn conversions(&self, address: OneWireAddress) -> u32 {
        self.devices
            .iter()
            .find(|d| d.address == address)
            .map_or(0, |d| d.conversions)
    }

    /// Temperature conversions started with skip ROM.
    pub fn broadcasts(&self) -> u32 {
        self.broadcasts
    }

    /// Voltage input a DS2438 converts, `true` for VDD.
    pub fn vdd_selected(&self, address: OneWireAddress) -> Option<bool> {
        self.devices.iter().find(|d| d.address == address).and_then(|d| match d.model {
            Model::Ds2438 { page0, .. } => Some(page0[0] & AD_BIT != 0),
            _ => None,
        })
    }

    fn attach(&mut self, address: OneWireAddress, model: Model) {
        self.devices.retain(|d| d.address != address);
        self.devices.push(SimDevice {
            address,
            model,
            corrupt: false,
            conversions: 0,
        });
    }

    fn find(&mut self, address: OneWireAddress) -> Option<&mut SimDevice> {
        self.devices.iter_mut().find(|d| d.address == address)
    }

    fn single(&mut self) -> Option<&mut SimDevice> {
        match self.selected.as_slice() {
            [idx] => self.devices.get_mut(*idx),
            _ => None,
        }
    }

    fn rom_command(&mut self, byte: u8) {
        self.skipped = false;
        self.phase = match byte {
            MATCH_ROM => Phase::MatchRom {
                rom: [0; 8],
                len: 0,
            },
            SKIP_ROM => {
                self.selected = (0..self.devices.len()).collect();
                self.skipped = true;
                Phase::Function
            }
            SEARCH_ROM => {
                self.selected = (0..self.devices.len()).collect();
                Phase::Search { bit: 0, step: 0 }
            }
            // no alarm model, nobody takes part
            ALARM_SEARCH => Phase::Search { bit: 0, step: 0 },
            _ => Phase::Idle,
        };
    }

    fn function_command(&mut self, byte: u8) {
        self.phase = Phase::Idle;
        match byte {
            CONVERT_T => {
                if self.skipped {
                    self.broadcasts += 1;
                }
                for idx in self.selected.clone() {
                    convert_temperature(&mut self.devices[idx]);
                }
            }
            CONVERT_V => {
                for idx in self.selected.clone() {
                    convert_voltage(&mut self.devices[idx]);
                }
            }
            READ_SCRATCH | WRITE_SCRATCH | COPY_SCRATCH | RECALL_MEMORY => {
                let Some(dev) = self.single() else {
                    return;
                };
                match (dev.model, byte) {
                    (Model::Ds2438 { .. }, _) => self.phase = Phase::Page(byte),
                    (Model::Ds18b20 { pad, .. }, READ_SCRATCH) => {
                        let corrupt = dev.corrupt;
                        self.send(pad, corrupt);
                    }
                    (Model::Ds18b20 { .. }, WRITE_SCRATCH) => {
                        self.phase = Phase::WriteScratch { offset: 2 }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn page_command(&mut self, cmd: u8, page: u8) {
        self.phase = Phase::Idle;
        if page != 0 {
            return;
        }
        let Some(dev) = self.single() else {
            return;
        };
        match (dev.model, cmd) {
            (Model::Ds2438 { page0, .. }, READ_SCRATCH) => {
                let corrupt = dev.corrupt;
                self.send(page0, corrupt);
            }
            (_, WRITE_SCRATCH) => self.phase = Phase::WriteScratch { offset: 0 },
            _ => {}
        }
    }

    fn write_scratch(&mut self, offset: usize, byte: u8) {
        self.phase = Phase::Idle;
        let Some(dev) = self.single() else {
            return;
        };
        let (regs, end) = match &mut dev.model {
            Model::Ds18b20 { pad, .. } => (pad, 5),
            Model::Ds2438 { page0, .. } => (page0, 8),
            Model::PresenceOnly => return,
        };
        if offset < end {
            regs[offset] = byte;
            if offset + 1 < end {
                self.phase = Phase::WriteScratch { offset: offset + 1 };
            }
        }
    }

    fn send(&mut self, regs: [u8; 8], corrupt: bool) {
        let crc = OneWireCrc::compute(&regs);
        self.out.clear();
        self.out.extend(regs);
        self.out.push_back(crc);
        if corrupt {
            self.out[0] ^= 0x01;
        }
    }

    /// Wired-AND of the id bit and of its complement over the taking-part devices.
    fn search_bits(&self, bit: u8) -> (bool, bool) {
        let mut any_zero = false;
        let mut any_one = false;
        for &idx in &self.selected {
            if rom_bit(self.devices[idx].address, bit) {
                any_one = true;
            } else {
                any_zero = true;
            }
        }
        (!any_zero, !any_one)
    }
}

fn convert_temperature(dev: &mut SimDevice) {
    match &mut dev.model {
        Model::Ds18b20 { celsius, pad } => {
            let mask: i16 = match (pad[4] >> 5) & 0x03 {
                0 => !0x07,
                1 => !0x03,
                2 => !0x01,
                _ => !0x00,
            };
            let raw = ((*celsius * 16.0) as i16) & mask;
            pad[..2].copy_from_slice(&raw.to_le_bytes());
        }
        Model::Ds2438 { celsius, page0, .. } => {
            let raw = ((*celsius * 256.0) as i16) & !0x07;
            page0[1..3].copy_from_slice(&raw.to_le_bytes());
        }
        Model::PresenceOnly => return,
    }
    dev.conversions += 1;
}

fn convert_voltage(dev: &mut SimDevice) {
    if let Model::Ds2438 { vad, vdd, page0, .. } = &mut dev.model {
        let volts = if page0[0] & AD_BIT != 0 { *vdd } else { *vad };
        let raw = ((volts * 100.0 + 0.5) as u16) & 0x03ff;
        page0[3..5].copy_from_slice(&raw.to_le_bytes());
        dev.conversions += 1;
    }
}

impl OneWire for SimBus {
    type Status = SimStatus;
    type BusError = Infallible;

    fn reset(&mut self) -> OneWireResult<SimStatus, Infallible> {
        self.out.clear();
        self.selected.clear();
        self.skipped = false;
        self.phase = Phase::Rom;
        Ok(SimStatus {
            presence: !self.devices.is_empty(),
        })
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Infallible> {
        match self.phase {
            Phase::Rom => self.rom_command(byte),
            Phase::MatchRom { mut rom, len } => {
                rom[len] = byte;
                if len + 1 < rom.len() {
                    self.phase = Phase::MatchRom { rom, len: len + 1 };
                } else {
                    let address = OneWireAddress::from_le_bytes(rom);
                    self.selected = self
                        .devices
                        .iter()
                        .position(|d| d.address == address)
                        .into_iter()
                        .collect();
                    self.phase = Phase::Function;
                }
            }
            Phase::Function => self.function_command(byte),
            Phase::Page(cmd) => self.page_command(cmd, byte),
            Phase::WriteScratch { offset } => self.write_scratch(offset, byte),
            Phase::Idle | Phase::Search { .. } => {}
        }
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Infallible> {
        Ok(self.out.pop_front().unwrap_or(0xff))
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Infallible> {
        if let Phase::Search { bit: pos, .. } = self.phase {
            let devices = &self.devices;
            self.selected.retain(|&idx| rom_bit(devices[idx].address, pos) == bit);
            self.phase = if pos == 63 {
                Phase::Function
            } else {
                Phase::Search {
                    bit: pos + 1,
                    step: 0,
                }
            };
        }
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Infallible> {
        match self.phase {
            Phase::Search { bit, step } => {
                let (id, complement) = self.search_bits(bit);
                self.phase = Phase::Search {
                    bit,
                    step: step + 1,
                };
                Ok(if step == 0 { id } else { complement })
            }
            _ => Ok(true),
        }
    }

    fn read_triplet(&mut self, direction: bool) -> OneWireResult<(bool, bool, bool), Infallible> {
        if !matches!(self.phase, Phase::Search { .. }) {
            return Ok((true, true, true));
        }
        let id = self.read_bit()?;
        let complement = self.read_bit()?;
        let taken = match (id, complement) {
            (true, true) => true,
            (false, false) => direction,
            (id, _) => id,
        };
        if !(id && complement) {
            self.write_bit(taken)?;
        }
        Ok((id, complement, taken))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_onewire::{OneWireSearch, OneWireSearchKind};
    use onewire_devices::{Ds18b20, Ds2438, Resolution};
    use rand::seq::SliceRandom;

    fn discover(bus: &mut SimBus) -> Vec<OneWireAddress> {
        let mut search = OneWireSearch::new(bus, OneWireSearchKind::Normal);
        let mut found = Vec::new();
        while let Some(address) = search.next().unwrap() {
            found.push(address);
        }
        found.sort();
        found
    }

    #[test]
    fn search_is_independent_of_attach_order() {
        let mut roms: Vec<OneWireAddress> = (1..=12u64)
            .map(|i| OneWireAddress::from_family_serial(if i % 2 == 0 { 0x28 } else { 0x26 }, i * 0x1111))
            .collect();
        roms.shuffle(&mut rand::rng());
        let mut bus = SimBus::new();
        for rom in &roms {
            bus.add_device(*rom);
        }
        roms.sort();
        assert_eq!(discover(&mut bus), roms);
        assert_eq!(discover(&mut bus), roms);
    }

    #[test]
    fn thermometer_converts_on_request() {
        let rom = OneWireAddress::from_family_serial(0x28, 0x42);
        let mut bus = SimBus::new();
        bus.add_ds18b20(rom, -10.125);
        let mut dev = Ds18b20::new(rom, Resolution::Bits12);
        dev.begin(&mut bus).unwrap();
        assert_eq!(dev.temperature(&mut bus).unwrap().to_num::<f32>(), 85.0);
        dev.sample(&mut bus).unwrap();
        assert_eq!(dev.temperature(&mut bus).unwrap().to_num::<f32>(), -10.125);
        assert_eq!(bus.conversions(rom), 1);
    }

    #[test]
    fn monitor_switches_voltage_input() {
        let rom = OneWireAddress::from_family_serial(0x26, 0x42);
        let mut bus = SimBus::new();
        bus.add_ds2438(rom, 22.5, 1.25, 4.98);
        let mut dev = Ds2438::new(rom);
        dev.begin(&mut bus).unwrap();
        dev.sample_vad(&mut bus).unwrap();
        assert_eq!(bus.vdd_selected(rom), Some(false));
        assert!((dev.voltage(&mut bus).unwrap() - 1.25).abs() < 1e-4);
        dev.sample_vdd(&mut bus).unwrap();
        assert!((dev.voltage(&mut bus).unwrap() - 4.98).abs() < 1e-4);
        dev.sample_temperature(&mut bus).unwrap();
        assert_eq!(dev.temperature(&mut bus).unwrap().to_num::<f32>(), 22.5);
    }
}

use crate::{
    FamilyCode, ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_SEARCH_CMD, OneWire, OneWireAddress,
    OneWireStatus, error::OneWireError,
};

/// A structure for searching devices on a 1-Wire bus.
/// This structure implements the search algorithm for discovering devices on the 1-Wire bus.
/// It maintains the state of the search.
pub struct OneWireSearch<'a, T> {
    onewire: &'a mut T,
    cmd: u8,
    last_device: bool,
    last_discrepancy: u8,
    family: Option<FamilyCode>,
    rom: [u8; 8],
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Type of search performed using [`OneWireSearch`].
pub enum OneWireSearchKind {
    /// Normal search
    Normal = ONEWIRE_SEARCH_CMD,
    /// Search only for devices with alarm
    Alarmed = ONEWIRE_CONDITIONAL_SEARCH_CMD,
}

impl<'a, T> OneWireSearch<'a, T> {
    /// Creates a new [`OneWireSearch`] instance.
    ///
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    /// * `cmd` - The command to use for the search operation (e.g., `0xf0` for normal search, `0xec` for search in alarm state).
    pub fn new(onewire: &'a mut T, cmd: OneWireSearchKind) -> Self {
        Self {
            onewire,
            cmd: cmd as _,
            last_device: false,
            last_discrepancy: 0,
            family: None,
            rom: [0; 8],
        }
    }

    /// Creates a new [`OneWireSearch`] instance restricted to one family code.
    ///
    /// The ROM is seeded with the family code and the search starts as if the last
    /// discrepancy was at bit 64, so the first pass follows the family's path.
    ///
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    /// * `cmd` - The command to use for the search operation (e.g., `0xf0` for normal search, `0xec` for search in alarm state).
    /// * `family` - The family code of the devices to search for.
    pub fn with_family(onewire: &'a mut T, cmd: OneWireSearchKind, family: FamilyCode) -> Self {
        let mut search = Self::new(onewire, cmd);
        search.family = Some(family);
        search.reset();
        search
    }

    /// Resets the search state.
    fn reset(&mut self) {
        self.last_device = false;
        match self.family {
            Some(family) => {
                self.rom = [family, 0, 0, 0, 0, 0, 0, 0];
                self.last_discrepancy = 64;
            }
            None => {
                self.rom = [0; 8];
                self.last_discrepancy = 0;
            }
        }
    }
}

impl<T: OneWire> OneWireSearch<'_, T> {
    /// Searches for devices on the 1-Wire bus.
    /// This method implements the [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html) to discover devices connected to the bus.
    /// The [next](OneWireSearch::next) method can be called repeatedly to find all devices on the bus.
    /// At the end of the search, calling this method will return `None` to indicate that no more devices are present.
    /// An empty bus also ends the search with `None`.
    /// The search state is reset if the [verify](OneWireSearch::verify) method is called.
    ///
    /// # Returns
    /// A result containing the ROM code of the found device.
    ///
    /// # Errors
    /// [`OneWireError::InvalidCrc`] if the ROM read on this pass fails its CRC. The search
    /// state has already advanced, so calling [next](OneWireSearch::next) again continues with the
    /// following device.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<OneWireAddress>, OneWireError<T::BusError>> {
        if self.last_device {
            return Ok(None);
        }
        let status = match self.onewire.reset() {
            Ok(status) => status,
            Err(OneWireError::NoDevicePresent) => {
                self.last_device = true;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if status.shortcircuit() {
            return Err(OneWireError::ShortCircuit);
        }
        if !status.presence() {
            self.last_device = true;
            return Ok(None);
        }
        let mut id_bit_num: u8 = 1;
        let mut last_zero: u8 = 0;
        let mut idx: usize = 0; // Index in the ROM array
        let mut rom_mask: u8 = 1; // Mask for the current bit in the ROM byte
        self.onewire.write_byte(self.cmd)?;
        let res = loop {
            let dir = if id_bit_num < self.last_discrepancy {
                self.rom[idx] & rom_mask > 0
            } else {
                id_bit_num == self.last_discrepancy
            };
            let (id_bit, complement_bit, taken) = match self.onewire.read_triplet(dir) {
                Ok(triplet) => triplet,
                Err(OneWireError::Unimplemented) => {
                    let id_bit = self.onewire.read_bit()?;
                    let complement_bit = self.onewire.read_bit()?;
                    let taken = if id_bit != complement_bit { id_bit } else { dir };
                    if !(id_bit && complement_bit) {
                        self.onewire.write_bit(taken)?;
                    }
                    (id_bit, complement_bit, taken)
                }
                Err(e) => return Err(e),
            };
            if id_bit && complement_bit {
                // Nobody drove the line low: every device dropped out.
                break false;
            }
            if !id_bit && !complement_bit && !taken {
                last_zero = id_bit_num;
            }
            if taken {
                self.rom[idx] |= rom_mask;
            } else {
                self.rom[idx] &= !rom_mask;
            }

            id_bit_num += 1;
            rom_mask <<= 1;

            if rom_mask == 0 {
                idx += 1;
                rom_mask = 1;
            }
            if id_bit_num > 64 {
                break true;
            }
        };

        if !res {
            self.last_device = true;
            return Ok(None);
        }
        self.last_discrepancy = last_zero;
        self.last_device = last_zero == 0;

        let address = OneWireAddress::from_le_bytes(self.rom);
        if address.raw() == 0 {
            self.last_device = true;
            return Ok(None);
        }
        if let Some(family) = self.family {
            if address.family() != family {
                // Past the end of the family's branch.
                self.last_device = true;
                return Ok(None);
            }
        }
        if !address.is_valid() {
            return Err(OneWireError::InvalidCrc);
        }
        Ok(Some(address))
    }

    /// Verifies if the device with the given ROM code is present on the 1-Wire bus.
    ///
    /// This functions resets the search state, and calling [next](OneWireSearch::next) after this call will start a new search.
    pub fn verify(&mut self, rom: OneWireAddress) -> Result<bool, OneWireError<T::BusError>> {
        let family = self.family.take();
        self.reset();
        self.rom = rom.to_le_bytes();
        self.last_discrepancy = 64;
        let res = match self.next() {
            Ok(found) => Ok(found == Some(rom)),
            Err(OneWireError::InvalidCrc) => Ok(false),
            Err(e) => Err(e),
        };
        self.family = family;
        self.reset();
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OneWireResult, OneWireStatus};
    use rand::seq::SliceRandom;

    struct Status(bool);

    impl OneWireStatus for Status {
        fn presence(&self) -> bool {
            self.0
        }

        fn shortcircuit(&self) -> bool {
            false
        }
    }

    /// Wired-AND bus answering search slots for a set of ROM codes.
    struct FakeBus {
        roms: Vec<u64>,
        active: Vec<bool>,
        bit: u32,
        slot: u8,
        triplet: bool,
    }

    impl FakeBus {
        fn new(roms: Vec<u64>, triplet: bool) -> Self {
            let active = vec![true; roms.len()];
            Self {
                roms,
                active,
                bit: 0,
                slot: 0,
                triplet,
            }
        }

        fn line(&self, complement: bool) -> bool {
            self.roms
                .iter()
                .zip(&self.active)
                .filter(|(_, a)| **a)
                .all(|(rom, _)| ((rom >> self.bit) & 1 == 1) != complement)
        }

        fn select(&mut self, dir: bool) {
            for (rom, active) in self.roms.iter().zip(self.active.iter_mut()) {
                if ((rom >> self.bit) & 1 == 1) != dir {
                    *active = false;
                }
            }
            self.bit += 1;
        }
    }

    impl OneWire for FakeBus {
        type Status = Status;
        type BusError = ();

        fn reset(&mut self) -> OneWireResult<Status, ()> {
            self.active.iter_mut().for_each(|a| *a = true);
            self.bit = 0;
            self.slot = 0;
            Ok(Status(!self.roms.is_empty()))
        }

        fn write_byte(&mut self, _byte: u8) -> OneWireResult<(), ()> {
            Ok(())
        }

        fn read_byte(&mut self) -> OneWireResult<u8, ()> {
            Ok(0xff)
        }

        fn write_bit(&mut self, bit: bool) -> OneWireResult<(), ()> {
            self.slot = 0;
            self.select(bit);
            Ok(())
        }

        fn read_bit(&mut self) -> OneWireResult<bool, ()> {
            let complement = self.slot == 1;
            self.slot += 1;
            Ok(self.line(complement))
        }

        fn read_triplet(&mut self, direction: bool) -> OneWireResult<(bool, bool, bool), ()> {
            if !self.triplet {
                return Err(OneWireError::Unimplemented);
            }
            let id = self.line(false);
            let cmp = self.line(true);
            let taken = if id != cmp { id } else { id || direction };
            self.select(taken);
            Ok((id, cmp, taken))
        }
    }

    fn collect(bus: &mut FakeBus, family: Option<u8>) -> Vec<OneWireAddress> {
        let mut search = match family {
            Some(f) => OneWireSearch::with_family(bus, OneWireSearchKind::Normal, f),
            None => OneWireSearch::new(bus, OneWireSearchKind::Normal),
        };
        let mut found = Vec::new();
        for _ in 0..64 {
            match search.next() {
                Ok(Some(addr)) => found.push(addr),
                Ok(None) => break,
                Err(OneWireError::InvalidCrc) => continue,
                Err(e) => panic!("search failed: {e:?}"),
            }
        }
        found
    }

    fn population() -> Vec<OneWireAddress> {
        let mut roms = vec![
            OneWireAddress::from_family_serial(0x28, 0x0000_1302_1645),
            OneWireAddress::from_family_serial(0x28, 0x0000_1302_1646),
            OneWireAddress::from_family_serial(0x26, 0x0000_0a0b_0c0d),
            OneWireAddress::from_family_serial(0x01, 0x0000_0000_0001),
            OneWireAddress::from_family_serial(0x28, 0x8000_0000_0000),
        ];
        roms.shuffle(&mut rand::rng());
        roms
    }

    #[test]
    fn finds_every_device() {
        for triplet in [true, false] {
            let roms = population();
            let mut bus = FakeBus::new(roms.iter().map(|a| a.raw()).collect(), triplet);
            let mut found = collect(&mut bus, None);
            found.sort();
            let mut expected = roms.clone();
            expected.sort();
            assert_eq!(found, expected, "triplet={triplet}");
        }
    }

    #[test]
    fn repeated_searches_agree() {
        let a = OneWireAddress::from_family_serial(0x28, 0x11);
        let b = OneWireAddress::from_family_serial(0x28, 0x12);
        let mut bus = FakeBus::new(vec![a.raw(), b.raw()], true);
        let first = collect(&mut bus, None);
        let second = collect(&mut bus, None);
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn family_search_stays_in_family() {
        let roms = population();
        let mut bus = FakeBus::new(roms.iter().map(|a| a.raw()).collect(), true);
        let found = collect(&mut bus, Some(0x28));
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|a| a.family() == 0x28));

        let found = collect(&mut bus, Some(0x10));
        assert!(found.is_empty());
    }

    #[test]
    fn mixed_family_bus_is_deterministic() {
        let serial = OneWireAddress::from_family_serial(0x01, 0);
        let sensor = OneWireAddress::from_family_serial(0x28, 0);
        for triplet in [true, false] {
            for roms in [[serial, sensor], [sensor, serial]] {
                let mut bus = FakeBus::new(roms.iter().map(|a| a.raw()).collect(), triplet);
                let first = collect(&mut bus, None);
                let second = collect(&mut bus, None);
                // lowest bit first: 0x01 branches off at bit 0
                assert_eq!(first, vec![sensor, serial], "triplet={triplet}");
                assert_eq!(first, second);
                assert_eq!(collect(&mut bus, Some(0x28)), vec![sensor]);
                assert_eq!(collect(&mut bus, Some(0x01)), vec![serial]);
            }
        }
    }

    #[test]
    fn corrupt_rom_is_skipped() {
        let good = OneWireAddress::from_family_serial(0x28, 0x42);
        let bad = good.raw() ^ (0x5a << 56);
        let mut bus = FakeBus::new(vec![good.raw(), bad], true);
        assert_eq!(collect(&mut bus, None), vec![good]);
    }

    #[test]
    fn empty_bus_ends_search() {
        let mut bus = FakeBus::new(Vec::new(), true);
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        assert_eq!(search.next(), Ok(None));
        assert_eq!(search.next(), Ok(None));
    }

    #[test]
    fn verify_single_device() {
        let roms = population();
        let mut bus = FakeBus::new(roms.iter().map(|a| a.raw()).collect(), true);
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        for rom in &roms {
            assert_eq!(search.verify(*rom), Ok(true));
        }
        let absent = OneWireAddress::from_family_serial(0x28, 0x7777);
        assert_eq!(search.verify(absent), Ok(false));
    }
}

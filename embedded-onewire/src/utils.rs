#[derive(Debug, Default)]
/// Calculate CRC-8 used in 1-Wire communications.
///
/// The Maxim/Dallas polynomial `x^8 + x^5 + x^4 + 1` is processed in its
/// reflected form `0x8c`, least significant bit first.
pub struct OneWireCrc(u8);

#[cfg(feature = "crc-table")]
const CRC_TABLE: [u8; 256] = crc_table();

#[cfg(feature = "crc-table")]
const fn crc_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x1 == 0x1 {
                (crc >> 1) ^ 0x8c
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

impl OneWireCrc {
    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Update the CRC with the incoming byte.
    #[cfg(feature = "crc-table")]
    pub fn update(&mut self, byte: u8) {
        self.0 = CRC_TABLE[(self.0 ^ byte) as usize];
    }

    /// Update the CRC with the incoming byte.
    #[cfg(not(feature = "crc-table"))]
    pub fn update(&mut self, byte: u8) {
        let mut crc = self.0 ^ byte;
        for _ in 0..8 {
            if crc & 0x1 == 0x1 {
                crc = (crc >> 1) ^ 0x8c;
            } else {
                crc >>= 1;
            }
        }
        self.0 = crc;
    }

    /// Compute the CRC of a byte sequence.
    pub fn compute(sequence: &[u8]) -> u8 {
        let mut crc = OneWireCrc(0);
        for &byte in sequence.iter() {
            crc.update(byte);
        }
        crc.0
    }

    /// Validate a sequence of bytes where the last byte is the 1-Wire CRC of
    /// the previous bytes.
    pub fn validate(sequence: &[u8]) -> bool {
        // Feeding the trailing CRC byte through the register leaves it at zero.
        Self::compute(sequence) == 0x0
    }
}

#[cfg(test)]
mod tests {
    use super::OneWireCrc;

    #[test]
    fn crc_of_known_rom() {
        // ROM code printed on the DS18B20 application note
        let rom = [0x28, 0x8f, 0x09, 0x45, 0x16, 0x13, 0x02];
        let crc = OneWireCrc::compute(&rom);
        let mut full = [0u8; 8];
        full[..7].copy_from_slice(&rom);
        full[7] = crc;
        assert!(OneWireCrc::validate(&full));
        full[3] ^= 0x10;
        assert!(!OneWireCrc::validate(&full));
    }

    #[test]
    fn matches_maxim_check_value() {
        // CRC-8/MAXIM check value for "123456789"
        assert_eq!(OneWireCrc::compute(b"123456789"), 0xa1);
    }
}

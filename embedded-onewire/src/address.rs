use core::{fmt, str::FromStr};

use crate::OneWireCrc;

/// The 8-bit family code found in the least significant byte of a ROM code.
pub type FamilyCode = u8;

/// 64-bit ROM code of a 1-Wire device.
///
/// | Bit | Description |
/// |-----|-------------|
/// | 0-7 | Family code (e.g., 0x28 for DS18B20) |
/// | 8-55 | Serial number, least significant byte first |
/// | 56-63 | CRC-8 of the first seven bytes |
///
/// Addresses order by their numeric value, which keeps registries built on
/// [`BTreeMap`](https://doc.rust-lang.org/alloc/collections/struct.BTreeMap.html)
/// deterministic.
///
/// The textual form follows the OWFS convention: the family code, a dot, then the
/// six serial bytes in transmission order, e.g. `28.8F0945161302`. The CRC byte is
/// not printed and is recomputed when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OneWireAddress(u64);

/// Errors produced when parsing a [`OneWireAddress`] from text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressParseError {
    /// The string is not 15 characters long.
    InvalidLength,
    /// The third character is not a `.` separator.
    MissingSeparator,
    /// A character is not a hexadecimal digit.
    InvalidDigit,
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressParseError::InvalidLength => f.write_str("address must be 15 characters"),
            AddressParseError::MissingSeparator => f.write_str("address must be FF.SSSSSSSSSSSS"),
            AddressParseError::InvalidDigit => f.write_str("address contains a non-hex digit"),
        }
    }
}

impl OneWireAddress {
    /// Construct an address from its raw little-endian 64-bit value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Construct an address from the eight bytes in transmission order.
    pub const fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// Build a valid address from a family code and a 48-bit serial number,
    /// computing the CRC byte.
    pub fn from_family_serial(family: FamilyCode, serial: u64) -> Self {
        let mut bytes = ((serial & 0xffff_ffff_ffff) << 8 | family as u64).to_le_bytes();
        bytes[7] = OneWireCrc::compute(&bytes[..7]);
        Self::from_le_bytes(bytes)
    }

    /// Raw 64-bit value.
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Bytes in transmission order.
    pub const fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Family code of the device.
    pub const fn family(&self) -> FamilyCode {
        (self.0 & 0xff) as u8
    }

    /// 48-bit serial number.
    pub const fn serial(&self) -> u64 {
        (self.0 >> 8) & 0xffff_ffff_ffff
    }

    /// CRC byte carried in the most significant byte.
    pub const fn crc(&self) -> u8 {
        (self.0 >> 56) as u8
    }

    /// Check the CRC byte against the first seven bytes.
    pub fn is_valid(&self) -> bool {
        OneWireCrc::validate(&self.to_le_bytes())
    }
}

impl From<OneWireAddress> for u64 {
    fn from(value: OneWireAddress) -> Self {
        value.0
    }
}

impl fmt::Display for OneWireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_le_bytes();
        write!(f, "{:02X}.", bytes[0])?;
        for b in &bytes[1..7] {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for OneWireAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.as_bytes();
        if s.len() != 15 {
            return Err(AddressParseError::InvalidLength);
        }
        if s[2] != b'.' {
            return Err(AddressParseError::MissingSeparator);
        }
        let mut bytes = [0u8; 8];
        bytes[0] = hex_pair(s[0], s[1])?;
        for (i, pair) in s[3..].chunks_exact(2).enumerate() {
            bytes[i + 1] = hex_pair(pair[0], pair[1])?;
        }
        bytes[7] = OneWireCrc::compute(&bytes[..7]);
        Ok(Self::from_le_bytes(bytes))
    }
}

fn hex_pair(hi: u8, lo: u8) -> Result<u8, AddressParseError> {
    Ok(hex_digit(hi)? << 4 | hex_digit(lo)?)
}

fn hex_digit(c: u8) -> Result<u8, AddressParseError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(AddressParseError::InvalidDigit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_owfs_style() {
        let addr = OneWireAddress::from_le_bytes([0x28, 0x8f, 0x09, 0x45, 0x16, 0x13, 0x02, 0x00]);
        assert_eq!(addr.to_string(), "28.8F0945161302");
        assert_eq!(addr.family(), 0x28);
    }

    #[test]
    fn parse_recomputes_crc() {
        let addr: OneWireAddress = "28.8f0945161302".parse().unwrap();
        assert!(addr.is_valid());
        assert_eq!(addr.family(), 0x28);
        assert_eq!(addr.serial(), 0x02_13_16_45_09_8f);
        assert_eq!(addr, OneWireAddress::from_family_serial(0x28, 0x02_13_16_45_09_8f));
        assert_eq!(addr.to_string(), "28.8F0945161302");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(
            "28.8F09451613".parse::<OneWireAddress>(),
            Err(AddressParseError::InvalidLength)
        );
        assert_eq!(
            "288F0945161302A".parse::<OneWireAddress>(),
            Err(AddressParseError::MissingSeparator)
        );
        assert_eq!(
            "28.8F09451613ZZ".parse::<OneWireAddress>(),
            Err(AddressParseError::InvalidDigit)
        );
    }

    #[test]
    fn orders_by_raw_value() {
        let a = OneWireAddress::from_family_serial(0x28, 1);
        let b = OneWireAddress::from_family_serial(0x01, 2);
        assert_eq!(a < b, a.raw() < b.raw());
    }
}

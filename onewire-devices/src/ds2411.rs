use embedded_onewire::{FamilyCode, OneWireAddress};

/// DS2411 silicon serial number. Carries nothing but its ROM code, so the only
/// observable attribute is presence on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ds2411 {
    address: OneWireAddress,
}

impl Ds2411 {
    /// Family code of the DS2411.
    pub const FAMILY: FamilyCode = 0x01;

    /// Wrap a discovered ROM code.
    pub fn new(address: OneWireAddress) -> Self {
        Self { address }
    }

    /// ROM code of the device.
    pub fn address(&self) -> OneWireAddress {
        self.address
    }
}

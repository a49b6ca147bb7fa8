use core::fmt;

/// One wire communication error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying hardware.
    Other(E),
    /// Indicates that no device is present on the bus.
    NoDevicePresent,
    /// Indicates that a short circuit was detected on the bus.
    ShortCircuit,
    /// The bus master has not been configured yet.
    BusUninitialized,
    /// Indicates that the operation is not implemented, such as reading a triplet when not supported.
    Unimplemented,
    /// A ROM code or a scratchpad failed its CRC-8 check.
    InvalidCrc,
    /// The addressed device does not belong to the family the driver expects.
    InvalidFamily,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}

impl<E: fmt::Debug> fmt::Display for OneWireError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OneWireError::Other(e) => write!(f, "bus master error: {e:?}"),
            OneWireError::NoDevicePresent => f.write_str("no presence pulse"),
            OneWireError::ShortCircuit => f.write_str("short circuit on the 1-Wire line"),
            OneWireError::BusUninitialized => f.write_str("bus master not configured"),
            OneWireError::Unimplemented => f.write_str("operation not supported by the bus master"),
            OneWireError::InvalidCrc => f.write_str("CRC mismatch"),
            OneWireError::InvalidFamily => f.write_str("unexpected device family"),
        }
    }
}

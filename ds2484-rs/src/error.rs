use core::fmt;

#[derive(Debug)]
/// DS2484 Hardware Errors
pub enum Ds2484Error<E> {
    /// I2C bus errors.
    I2c(E),
    /// Busy wait retries exceeded.
    RetriesExceeded,
    /// The device configuration read back after a write does not match.
    ConfigMismatch,
    /// The 1-Wire port parameters read back after an adjustment do not match.
    PortConfigMismatch,
    /// A port parameter code wider than 4 bits, or an overdrive variant that does not exist.
    InvalidPortParameter,
}

impl<E> From<E> for Ds2484Error<E> {
    fn from(value: E) -> Self {
        Self::I2c(value)
    }
}

impl<E: fmt::Debug> fmt::Display for Ds2484Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ds2484Error::I2c(e) => write!(f, "I2C error: {e:?}"),
            Ds2484Error::RetriesExceeded => f.write_str("busy wait retries exceeded"),
            Ds2484Error::ConfigMismatch => f.write_str("device configuration not applied"),
            Ds2484Error::PortConfigMismatch => f.write_str("1-Wire port configuration not applied"),
            Ds2484Error::InvalidPortParameter => f.write_str("invalid 1-Wire port parameter"),
        }
    }
}

/// A port parameter selector or code outside its valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPortParameter;

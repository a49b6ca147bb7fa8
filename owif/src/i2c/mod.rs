//! Two-wire transport, bus recovery and the TCA9548A sub-bus multiplexer.

mod recovery;
mod tca9548a;
mod transport;

pub use recovery::{BusRecovery, NoRecovery, PinRecovery, RecoveryError};
pub use tca9548a::{MuxChannel, MuxError, SelectChannel, TCA9548A_I2C_ADDRESS, Tca9548a};
pub use transport::{MAX_TRANSFER_LEN, Transport, TransportError};

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]
//! # embedded-onewire
//! 1-Wire bus primitives for `no_std` targets.
//!
//! A bus master implements [OneWire]: reset with presence detect, bit and byte
//! slots, and optionally the hardware triplet. On top of that the crate offers
//! ROM addressing, the [OneWireSearch] discovery (all devices, alarmed devices,
//! or one family), [OneWireAddress] with its dotted text form, and the
//! CRC-8 used by ROM codes and scratchpads ([OneWireCrc]).

mod address;
mod error;
mod search;
mod traits;
mod utils;
pub use address::{AddressParseError, FamilyCode, OneWireAddress};
pub use error::OneWireError;
pub use search::{OneWireSearch, OneWireSearchKind};
pub use traits::{OneWire, OneWireStatus};
pub use utils::OneWireCrc;

/// Result of a 1-Wire operation on a bus master with error `E`.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;

/// Match ROM: the following 64 bits select one device.
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Skip ROM: the following function command goes to every device.
pub const ONEWIRE_SKIP_ROM_CMD: u8 = 0xcc;

/// Search ROM.
pub const ONEWIRE_SEARCH_CMD: u8 = 0xf0;

/// Conditional search: only devices with an alarm flag take part.
pub const ONEWIRE_CONDITIONAL_SEARCH_CMD: u8 = 0xec;

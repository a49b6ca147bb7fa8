use alloc::rc::Rc;
use core::{cell::RefCell, fmt};

use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};

/// Default 7-bit address of the TCA9548A (A2..A0 low).
pub const TCA9548A_I2C_ADDRESS: u8 = 0x70;

const CHANNELS: u8 = 8;

/// Multiplexer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxError<E> {
    /// Error of the upstream bus.
    I2c(E),
    /// [`Tca9548a::begin`] has not found the multiplexer.
    NotInitialized,
    /// Channel number out of range.
    InvalidChannel(u8),
}

impl<E> From<E> for MuxError<E> {
    fn from(value: E) -> Self {
        MuxError::I2c(value)
    }
}

impl<E: fmt::Debug> fmt::Display for MuxError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxError::I2c(e) => write!(f, "upstream bus error: {e:?}"),
            MuxError::NotInitialized => f.write_str("multiplexer not initialized"),
            MuxError::InvalidChannel(ch) => write!(f, "invalid channel {ch}"),
        }
    }
}

impl<E: i2c::Error> i2c::Error for MuxError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            MuxError::I2c(e) => e.kind(),
            _ => ErrorKind::Other,
        }
    }
}

/// Anything that can route the shared bus to one of its sub-buses.
pub trait SelectChannel: I2c<SevenBitAddress> {
    /// Route subsequent transactions to `channel` (0-based).
    fn select_channel(&mut self, channel: u8) -> Result<(), Self::Error>;
}

/// TI TCA9548A eight-channel I2C switch.
///
/// Acts as an [`I2c`] bus forwarding to whichever channel was selected last.
pub struct Tca9548a<I> {
    i2c: I,
    addr: SevenBitAddress,
    initialized: bool,
}

impl<I: I2c<SevenBitAddress>> Tca9548a<I> {
    /// Create a driver for the switch at `addr`.
    pub fn new(i2c: I, addr: SevenBitAddress) -> Self {
        Self {
            i2c,
            addr,
            initialized: false,
        }
    }

    /// Probe the switch by reading its control register.
    pub fn begin(&mut self) -> Result<u8, MuxError<I::Error>> {
        let mut ctrl = [0u8; 1];
        if let Err(e) = self.i2c.read(self.addr, &mut ctrl) {
            log::error!("[TCA9548A] No multiplexer at 0x{:02x}", self.addr);
            return Err(MuxError::I2c(e));
        }
        self.initialized = true;
        Ok(ctrl[0])
    }

    /// Connect `channel` (0-based) and disconnect all others.
    pub fn select(&mut self, channel: u8) -> Result<(), MuxError<I::Error>> {
        if channel >= CHANNELS {
            return Err(MuxError::InvalidChannel(channel));
        }
        self.write_control(1 << channel)
    }

    /// Disconnect every channel.
    pub fn disable_all(&mut self) -> Result<(), MuxError<I::Error>> {
        self.write_control(0)
    }

    /// Share the switch between channel handles.
    pub fn into_shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    fn write_control(&mut self, ctrl: u8) -> Result<(), MuxError<I::Error>> {
        if !self.initialized {
            return Err(MuxError::NotInitialized);
        }
        self.i2c.write(self.addr, &[ctrl]).map_err(|e| {
            log::error!("[TCA9548A] Failed to write control register 0x{ctrl:02x}");
            MuxError::I2c(e)
        })
    }
}

impl<I: I2c<SevenBitAddress>> ErrorType for Tca9548a<I> {
    type Error = MuxError<I::Error>;
}

impl<I: I2c<SevenBitAddress>> I2c<SevenBitAddress> for Tca9548a<I> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if !self.initialized {
            return Err(MuxError::NotInitialized);
        }
        Ok(self.i2c.transaction(address, operations)?)
    }

    fn read(&mut self, address: SevenBitAddress, read: &mut [u8]) -> Result<(), Self::Error> {
        if !self.initialized {
            return Err(MuxError::NotInitialized);
        }
        Ok(self.i2c.read(address, read)?)
    }

    fn write(&mut self, address: SevenBitAddress, write: &[u8]) -> Result<(), Self::Error> {
        if !self.initialized {
            return Err(MuxError::NotInitialized);
        }
        Ok(self.i2c.write(address, write)?)
    }

    fn write_read(
        &mut self,
        address: SevenBitAddress,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        if !self.initialized {
            return Err(MuxError::NotInitialized);
        }
        Ok(self.i2c.write_read(address, write, read)?)
    }
}

impl<I: I2c<SevenBitAddress>> SelectChannel for Tca9548a<I> {
    fn select_channel(&mut self, channel: u8) -> Result<(), Self::Error> {
        self.select(channel)
    }
}

/// One sub-bus of a shared switch.
///
/// The switch keeps its last selection for every handle, so each transaction
/// selects this handle's channel first.
pub struct MuxChannel<S> {
    selector: Rc<RefCell<S>>,
    channel: u8,
}

impl<S: SelectChannel> MuxChannel<S> {
    /// Handle for `channel` (0-based) of `selector`.
    pub fn new(selector: Rc<RefCell<S>>, channel: u8) -> Self {
        Self { selector, channel }
    }

    /// Channel number on the switch, 0-based.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    fn with_selected<T>(
        &mut self,
        f: impl FnOnce(&mut S) -> Result<T, S::Error>,
    ) -> Result<T, S::Error> {
        let mut sel = self.selector.borrow_mut();
        sel.select_channel(self.channel)?;
        f(&mut *sel)
    }
}

impl<S: SelectChannel> ErrorType for MuxChannel<S> {
    type Error = S::Error;
}

impl<S: SelectChannel> I2c<SevenBitAddress> for MuxChannel<S> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.with_selected(|bus| bus.transaction(address, operations))
    }

    fn read(&mut self, address: SevenBitAddress, read: &mut [u8]) -> Result<(), Self::Error> {
        self.with_selected(|bus| bus.read(address, read))
    }

    fn write(&mut self, address: SevenBitAddress, write: &[u8]) -> Result<(), Self::Error> {
        self.with_selected(|bus| bus.write(address, write))
    }

    fn write_read(
        &mut self,
        address: SevenBitAddress,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.with_selected(|bus| bus.write_read(address, write, read))
    }
}

use core::fmt;

use embedded_hal::i2c::{
    self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress,
};

use super::{BusRecovery, RecoveryError};

/// Longest single read or write the transport accepts.
pub const MAX_TRANSFER_LEN: usize = 128;

/// Transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// [`Transport::begin`] has not completed.
    NotInitialized,
    /// The bus did not complete the transfer in time.
    Timeout,
    /// The peer did not acknowledge its address or data.
    NotAcknowledged,
    /// Any other failure of the peripheral.
    Unknown,
    /// The transfer exceeds [`MAX_TRANSFER_LEN`].
    TooLarge,
}

impl TransportError {
    /// Classify an error of the underlying peripheral.
    pub fn from_hal<E: i2c::Error>(err: E) -> Self {
        match err.kind() {
            ErrorKind::NoAcknowledge(_) => TransportError::NotAcknowledged,
            // a peer holding the bus is reported by most drivers as a bus error
            ErrorKind::Bus | ErrorKind::ArbitrationLoss => TransportError::Timeout,
            ErrorKind::Overrun => TransportError::TooLarge,
            _ => TransportError::Unknown,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TransportError::NotInitialized => "bus not initialized",
            TransportError::Timeout => "bus timeout",
            TransportError::NotAcknowledged => "transfer not acknowledged",
            TransportError::Unknown => "unknown bus failure",
            TransportError::TooLarge => "transfer too large",
        };
        f.write_str(msg)
    }
}

impl i2c::Error for TransportError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransportError::NotAcknowledged => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            TransportError::Timeout => ErrorKind::Bus,
            TransportError::TooLarge => ErrorKind::Overrun,
            TransportError::NotInitialized | TransportError::Unknown => ErrorKind::Other,
        }
    }
}

/// Write held back until the next read, issued as a repeated-start transfer.
struct PendingWrite {
    addr: SevenBitAddress,
    len: usize,
    buf: [u8; MAX_TRANSFER_LEN],
}

/// Shared two-wire transport.
///
/// No transfer is accepted before [`begin`](Transport::begin) has run bus
/// recovery once.
pub struct Transport<I> {
    i2c: I,
    initialized: bool,
    pending: Option<PendingWrite>,
}

impl<I: I2c<SevenBitAddress>> Transport<I> {
    /// Wrap an I2C peripheral.
    pub fn new(i2c: I) -> Self {
        Self {
            i2c,
            initialized: false,
            pending: None,
        }
    }

    /// Recover the bus and accept transfers from now on.
    ///
    /// A failed recovery leaves the transport uninitialized; it is not retried.
    pub fn begin<R: BusRecovery>(&mut self, recovery: &mut R) -> Result<(), RecoveryError> {
        if let Err(e) = recovery.recover() {
            log::error!("[I2C] Bus recovery failed: {e}");
            return Err(e);
        }
        log::debug!("[I2C] Bus recovered");
        self.initialized = true;
        Ok(())
    }

    /// Whether [`begin`](Transport::begin) succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Read `buf.len()` bytes from `addr`.
    ///
    /// A write to the same address held back with `stop == false` is sent first,
    /// without a STOP in between. A write held for another address is sent on
    /// its own before the read.
    pub fn read(&mut self, addr: SevenBitAddress, buf: &mut [u8]) -> Result<(), TransportError> {
        self.check(buf.len())?;
        let res = match self.pending.take() {
            Some(pending) if pending.addr == addr => {
                self.i2c.write_read(addr, &pending.buf[..pending.len], buf)
            }
            other => {
                self.pending = other;
                self.flush()?;
                self.i2c.read(addr, buf)
            }
        };
        res.map_err(|e| self.fail(addr, e))
    }

    /// Write `bytes` to `addr`.
    ///
    /// With `stop == false` the bytes are held until the next [`read`](Transport::read).
    /// Any write still held is sent first.
    pub fn write(
        &mut self,
        addr: SevenBitAddress,
        bytes: &[u8],
        stop: bool,
    ) -> Result<(), TransportError> {
        self.check(bytes.len())?;
        self.flush()?;
        if !stop {
            let mut buf = [0u8; MAX_TRANSFER_LEN];
            buf[..bytes.len()].copy_from_slice(bytes);
            self.pending = Some(PendingWrite {
                addr,
                len: bytes.len(),
                buf,
            });
            return Ok(());
        }
        self.i2c.write(addr, bytes).map_err(|e| self.fail(addr, e))
    }

    /// Send a held write as a complete transfer.
    pub fn flush(&mut self) -> Result<(), TransportError> {
        match self.pending.take() {
            Some(pending) => self
                .i2c
                .write(pending.addr, &pending.buf[..pending.len])
                .map_err(|e| self.fail(pending.addr, e)),
            None => Ok(()),
        }
    }

    /// Give back the peripheral.
    pub fn release(self) -> I {
        self.i2c
    }

    fn check(&self, len: usize) -> Result<(), TransportError> {
        if !self.initialized {
            return Err(TransportError::NotInitialized);
        }
        if len > MAX_TRANSFER_LEN {
            return Err(TransportError::TooLarge);
        }
        Ok(())
    }

    fn fail<E: i2c::Error>(&self, addr: SevenBitAddress, err: E) -> TransportError {
        let err = TransportError::from_hal(err);
        log::error!("[I2C] Transfer to 0x{addr:02x} failed: {err}");
        err
    }
}

impl<I> ErrorType for Transport<I> {
    type Error = TransportError;
}

impl<I: I2c<SevenBitAddress>> I2c<SevenBitAddress> for Transport<I> {
    fn read(&mut self, address: SevenBitAddress, read: &mut [u8]) -> Result<(), Self::Error> {
        Transport::read(self, address, read)
    }

    fn write(&mut self, address: SevenBitAddress, write: &[u8]) -> Result<(), Self::Error> {
        Transport::write(self, address, write, true)
    }

    fn write_read(
        &mut self,
        address: SevenBitAddress,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.check(write.len().max(read.len()))?;
        self.flush()?;
        self.i2c
            .write_read(address, write, read)
            .map_err(|e| self.fail(address, e))
    }

    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let longest = operations
            .iter()
            .map(|op| match op {
                Operation::Read(buf) => buf.len(),
                Operation::Write(buf) => buf.len(),
            })
            .max()
            .unwrap_or(0);
        self.check(longest)?;
        self.flush()?;
        self.i2c
            .transaction(address, operations)
            .map_err(|e| self.fail(address, e))
    }
}

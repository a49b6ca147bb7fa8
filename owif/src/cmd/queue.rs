use alloc::collections::{TryReserveError, VecDeque};
use core::fmt;

use super::{Command, CommandError, ErrorResponse};

/// Failure to reserve the queue storage at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAllocError(TryReserveError);

impl fmt::Display for QueueAllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to allocate the command queue: {}", self.0)
    }
}

/// Bounded FIFO of pending commands. Storage is reserved once and never grows.
#[derive(Debug)]
pub struct CommandQueue {
    items: VecDeque<Command>,
    capacity: usize,
}

impl CommandQueue {
    /// Reserve room for `capacity` commands.
    pub fn new(capacity: usize) -> Result<Self, QueueAllocError> {
        let mut items = VecDeque::new();
        items.try_reserve_exact(capacity).map_err(QueueAllocError)?;
        Ok(Self { items, capacity })
    }

    /// Append `cmd`, or hand it back as [`CommandError::QueueFull`].
    pub fn push(&mut self, cmd: Command) -> Result<(), CommandError> {
        if self.items.len() >= self.capacity {
            return Err(CommandError::QueueFull);
        }
        self.items.push_back(cmd);
        Ok(())
    }

    /// Append a command the dispatcher already accepted. A full queue is
    /// reported through the command's error sink.
    pub(crate) fn resubmit(&mut self, cmd: Command) {
        if let Err(e) = self.push(cmd) {
            log::error!("[CmdHandler] Write to command queue failed!");
            cmd.on_error.call(&ErrorResponse::for_command(&e, &cmd));
        }
    }

    /// Take the oldest command.
    pub fn pop(&mut self) -> Option<Command> {
        self.items.pop_front()
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of queued commands.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate the queued commands, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.items.iter()
    }
}

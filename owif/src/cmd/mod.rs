//! Command model and the cooperative dispatcher.
//!
//! A [`Command`] is a plain value moved through a bounded queue. Multi-phase
//! reads mutate their [`SubAction`], re-arm their [`Timer`] and go back to the
//! tail of the queue instead of blocking.

mod dispatcher;
mod error;
mod queue;
mod read;
mod response;
mod subscriptions;
mod timer;

pub use dispatcher::{Dispatcher, SystemControl};
pub use error::{CommandError, ScanScope};
pub use queue::{CommandQueue, QueueAllocError};
pub use response::{
    CommandEcho, DeviceReport, ErrorDetail, ErrorResponse, RequestEcho, Response, Severity,
};
pub use subscriptions::Subscriptions;
pub use timer::Timer;

use embedded_onewire::{FamilyCode, OneWireAddress};
use serde::Serialize;

use crate::system::Attribute;

/// What a command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Acknowledge, then restart the bridge.
    Restart,
    /// Discover devices.
    Scan,
    /// Sample and read an attribute.
    Read,
    /// Read an attribute periodically.
    Subscribe,
    /// Stop a periodic read.
    Unsubscribe,
}

impl Action {
    /// Name of the action in requests and responses.
    pub const fn name(self) -> &'static str {
        match self {
            Action::Restart => "restart",
            Action::Scan => "scan",
            Action::Read => "read",
            Action::Subscribe => "subscribe",
            Action::Unsubscribe => "unsubscribe",
        }
    }

    /// Inverse of [`name`](Action::name).
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Action::Restart,
            Action::Scan,
            Action::Read,
            Action::Subscribe,
            Action::Unsubscribe,
        ]
        .into_iter()
        .find(|a| a.name() == name)
    }
}

/// Phase of a multi-phase read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubAction {
    /// Not started.
    #[default]
    None,
    /// Start the conversion.
    TriggerSampling,
    /// Fetch the converted value.
    ReadResult,
}

/// Success sink: a function and the context it is called with.
#[derive(Debug, Clone, Copy)]
pub struct ResultCallback {
    /// Called with `ctx` and the response.
    pub func: fn(usize, &Response),
    /// Caller context, typically a client id.
    pub ctx: usize,
}

impl ResultCallback {
    /// Bundle a sink.
    pub const fn new(func: fn(usize, &Response), ctx: usize) -> Self {
        Self { func, ctx }
    }

    /// Deliver `response`.
    pub fn call(&self, response: &Response) {
        (self.func)(self.ctx, response)
    }
}

/// Error sink: a function and the context it is called with.
#[derive(Debug, Clone, Copy)]
pub struct ErrorCallback {
    /// Called with `ctx` and the error.
    pub func: fn(usize, &ErrorResponse),
    /// Caller context, typically a client id.
    pub ctx: usize,
}

impl ErrorCallback {
    /// Bundle a sink.
    pub const fn new(func: fn(usize, &ErrorResponse), ctx: usize) -> Self {
        Self { func, ctx }
    }

    /// Deliver `error`.
    pub fn call(&self, error: &ErrorResponse) {
        (self.func)(self.ctx, error)
    }
}

/// One request to the bridge.
///
/// `device` and `family` are mutually exclusive selectors.
#[derive(Debug, Clone, Copy)]
pub struct Command {
    /// Requested action.
    pub action: Action,
    /// Phase of a read.
    pub sub_action: SubAction,
    /// Single-device selector.
    pub device: Option<OneWireAddress>,
    /// Family selector.
    pub family: Option<FamilyCode>,
    /// Attribute to read.
    pub attribute: Option<Attribute>,
    /// Subscription period in milliseconds.
    pub interval_ms: Option<u32>,
    /// Earliest time of the next phase.
    pub timer: Timer,
    /// Success sink.
    pub on_result: ResultCallback,
    /// Error sink.
    pub on_error: ErrorCallback,
}

const _: () = {
    const fn copyable<T: Copy>() {}
    copyable::<Command>();
};

impl Command {
    /// A command without parameters, due immediately.
    pub fn new(action: Action, on_result: ResultCallback, on_error: ErrorCallback) -> Self {
        Self {
            action,
            sub_action: SubAction::None,
            device: None,
            family: None,
            attribute: None,
            interval_ms: None,
            timer: Timer::default(),
            on_result,
            on_error,
        }
    }

    /// Select one device.
    pub fn with_device(mut self, address: OneWireAddress) -> Self {
        self.device = Some(address);
        self
    }

    /// Select a whole family.
    pub fn with_family(mut self, family: FamilyCode) -> Self {
        self.family = Some(family);
        self
    }

    /// Set the attribute.
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attribute = Some(attribute);
        self
    }

    /// Set the subscription period.
    pub fn with_interval(mut self, interval_ms: u32) -> Self {
        self.interval_ms = Some(interval_ms);
        self
    }

    /// The plain read a subscription re-submits every period.
    pub fn read_template(&self) -> Self {
        Self {
            action: Action::Read,
            sub_action: SubAction::None,
            interval_ms: None,
            timer: Timer::default(),
            ..*self
        }
    }

    /// Check the parameters `action` requires.
    pub fn validate(&self) -> Result<(), CommandError> {
        if self.device.is_some() && self.family.is_some() {
            return Err(CommandError::ConflictingSelector);
        }
        let selected = self.device.is_some() || self.family.is_some();
        match self.action {
            Action::Restart | Action::Scan => Ok(()),
            Action::Read | Action::Unsubscribe => {
                if self.attribute.is_none() {
                    Err(CommandError::MissingAttribute)
                } else if !selected {
                    Err(CommandError::MissingSelector)
                } else {
                    Ok(())
                }
            }
            Action::Subscribe => {
                if self.attribute.is_none() || self.interval_ms.is_none() {
                    Err(CommandError::MissingAttributeOrInterval)
                } else if !selected {
                    Err(CommandError::MissingSelector)
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod capture {
    //! Sinks recording every delivery of the current test thread.

    use super::*;
    use alloc::vec::Vec;
    use std::cell::RefCell;

    std::thread_local! {
        static RESULTS: RefCell<Vec<(usize, Response)>> = const { RefCell::new(Vec::new()) };
        static ERRORS: RefCell<Vec<(usize, ErrorResponse)>> = const { RefCell::new(Vec::new()) };
    }

    fn on_result(ctx: usize, response: &Response) {
        RESULTS.with(|r| r.borrow_mut().push((ctx, response.clone())));
    }

    fn on_error(ctx: usize, error: &ErrorResponse) {
        ERRORS.with(|e| e.borrow_mut().push((ctx, error.clone())));
    }

    pub fn command(action: Action) -> Command {
        Command::new(
            action,
            ResultCallback::new(on_result, 1),
            ErrorCallback::new(on_error, 1),
        )
    }

    pub fn results() -> Vec<Response> {
        RESULTS.with(|r| r.borrow_mut().drain(..).map(|(_, v)| v).collect())
    }

    pub fn errors() -> Vec<ErrorResponse> {
        ERRORS.with(|e| e.borrow_mut().drain(..).map(|(_, v)| v).collect())
    }
}

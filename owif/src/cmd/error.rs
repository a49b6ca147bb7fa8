use core::fmt;

use embedded_onewire::FamilyCode;

use super::response::Severity;
use crate::system::{Attribute, family_name};

/// Which discovery a failed scan ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanScope {
    /// Presence check of one address.
    Device,
    /// Discovery of one family.
    Family,
    /// Full discovery.
    All,
}

/// Application-level failure of a command, as delivered to its error sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The request text is not a JSON object.
    Deserialize,
    /// `action` is missing or unknown.
    UnknownAction,
    /// `device_id` or `family_code` is malformed or missing.
    InvalidSelector,
    /// `attribute` is malformed or missing.
    InvalidAttribute,
    /// `interval` is malformed or missing.
    InvalidInterval,
    /// Both selectors are set.
    ConflictingSelector,
    /// Neither selector is set.
    MissingSelector,
    /// No attribute given.
    MissingAttribute,
    /// Subscribe without attribute or interval.
    MissingAttributeOrInterval,
    /// No read protocol for the family.
    FamilyNotSupported,
    /// The family lacks the attribute.
    UnsupportedAttribute(FamilyCode),
    /// The device is not registered.
    DeviceNotFound,
    /// No registered device of the family.
    NoFamilyDevices,
    /// Starting a conversion failed.
    SampleFailed(FamilyCode, Attribute),
    /// Reading a converted value failed.
    ReadFailed(FamilyCode, Attribute),
    /// Discovery failed.
    ScanFailed(ScanScope),
    /// A subscription for the key existed and was replaced.
    AlreadySubscribed {
        /// Keyed by family rather than device.
        family: bool,
    },
    /// Nothing to unsubscribe.
    NotSubscribed {
        /// Keyed by family rather than device.
        family: bool,
    },
    /// The dispatch queue is full.
    QueueFull,
}

impl CommandError {
    /// Classification of the delivery.
    pub fn severity(&self) -> Severity {
        match self {
            CommandError::AlreadySubscribed { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Deserialize => f.write_str("Failed to deserialize message."),
            CommandError::UnknownAction => f.write_str("Unknown/Unsupported action."),
            CommandError::InvalidSelector => {
                f.write_str("Missing or invalid JSON attributes 'device_id' or 'family_code'.")
            }
            CommandError::InvalidAttribute => {
                f.write_str("Missing or invalid JSON attribute 'attribute'.")
            }
            CommandError::InvalidInterval => f.write_str("Missing or invalid JSON attribute 'interval'."),
            CommandError::ConflictingSelector => {
                f.write_str("device_id or family_code must be exclusively set")
            }
            CommandError::MissingSelector => f.write_str("Missing device_id or family_code parameter"),
            CommandError::MissingAttribute => f.write_str("Missing device_attribute parameter"),
            CommandError::MissingAttributeOrInterval => {
                f.write_str("Missing device_attribute or interval parameter")
            }
            CommandError::FamilyNotSupported => {
                f.write_str("Action 'read' for device family not supported")
            }
            CommandError::UnsupportedAttribute(family) => match family_name(*family) {
                Some(name) => write!(f, "Unsupported device attribute for {name}."),
                None => f.write_str("Unsupported device attribute."),
            },
            CommandError::DeviceNotFound => f.write_str(
                "1-Wire device not found / available. Manual scan might be necessary before.",
            ),
            CommandError::NoFamilyDevices => {
                f.write_str("No 1-Wire devices of the requested family available.")
            }
            CommandError::SampleFailed(family, attribute) => write!(
                f,
                "Failed to start {} {attribute} sampling.",
                family_name(*family).unwrap_or("1-Wire")
            ),
            CommandError::ReadFailed(family, attribute) => write!(
                f,
                "Failed to get {} {attribute}.",
                family_name(*family).unwrap_or("1-Wire")
            ),
            CommandError::ScanFailed(ScanScope::Device) => {
                f.write_str("Failed to scan 1-wire device availability.")
            }
            CommandError::ScanFailed(ScanScope::Family) => {
                f.write_str("Failed to scan 1-wire device family availability.")
            }
            CommandError::ScanFailed(ScanScope::All) => {
                f.write_str("Failed to scan 1-wire devices availability.")
            }
            CommandError::AlreadySubscribed { family: false } => {
                f.write_str("WARN: Already subscribed to device / attribute. Updating subscription.")
            }
            CommandError::AlreadySubscribed { family: true } => f.write_str(
                "WARN: Already subscribed to device family / attribute. Updating subscription.",
            ),
            CommandError::NotSubscribed { family: false } => {
                f.write_str("No subscription for requested device / attribute found.")
            }
            CommandError::NotSubscribed { family: true } => {
                f.write_str("No subscription for requested device family / attribute found.")
            }
            CommandError::QueueFull => f.write_str("Command queue full."),
        }
    }
}

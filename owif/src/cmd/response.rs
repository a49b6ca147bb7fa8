use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;

use embedded_onewire::{FamilyCode, OneWireAddress};
use serde::{Serialize, Serializer};

use super::{Action, Command, CommandError};
use crate::system::{Attribute, ChannelId, attributes};

fn as_display<T: fmt::Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

/// One device in a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    /// Channel the device was found on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelId>,
    /// Address in dotted form.
    #[serde(serialize_with = "as_display")]
    pub device_id: OneWireAddress,
    /// Whether the device answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<bool>,
    /// Temperature in °C.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// DS2438 A/D input in V.
    #[serde(rename = "VAD", skip_serializing_if = "Option::is_none")]
    pub vad: Option<f32>,
    /// DS2438 supply in V.
    #[serde(rename = "VDD", skip_serializing_if = "Option::is_none")]
    pub vdd: Option<f32>,
    /// Attribute names of the family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<&'static str>>,
}

impl DeviceReport {
    /// A report carrying only the address.
    pub fn new(device_id: OneWireAddress) -> Self {
        Self {
            channel: None,
            device_id,
            presence: None,
            temperature: None,
            vad: None,
            vdd: None,
            attributes: None,
        }
    }

    /// Add the channel.
    pub fn on_channel(mut self, channel: ChannelId) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Add presence.
    pub fn present(mut self, presence: bool) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Add the attribute names of the device's family.
    pub fn with_attributes(mut self) -> Self {
        self.attributes = Some(attributes(self.device_id.family()).iter().map(|a| a.name()).collect());
        self
    }

    /// Add a measured value.
    pub fn with_value(mut self, attribute: Attribute, value: f32) -> Self {
        match attribute {
            Attribute::Temperature => self.temperature = Some(value),
            Attribute::Vad => self.vad = Some(value),
            Attribute::Vdd => self.vdd = Some(value),
            Attribute::Presence => self.presence = Some(value != 0.0),
        }
        self
    }
}

/// Success payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Action answered.
    pub action: Action,
    /// Set for restart and (un)subscribe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledge: Option<bool>,
    /// Family of a family-wide request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_code: Option<FamilyCode>,
    /// Single-device result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceReport>,
    /// Family or full-scan result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DeviceReport>>,
}

impl Response {
    /// An empty response to `action`.
    pub fn new(action: Action) -> Self {
        Self {
            action,
            acknowledge: None,
            family_code: None,
            device: None,
            devices: None,
        }
    }

    /// An acknowledgement of `action`.
    pub fn acknowledged(action: Action) -> Self {
        Self {
            acknowledge: Some(true),
            ..Self::new(action)
        }
    }

    /// Attach a single-device result.
    pub fn with_device(mut self, device: DeviceReport) -> Self {
        self.device = Some(device);
        self
    }

    /// Attach the family code.
    pub fn with_family(mut self, family: FamilyCode) -> Self {
        self.family_code = Some(family);
        self
    }

    /// Attach a device list.
    pub fn with_devices(mut self, devices: Vec<DeviceReport>) -> Self {
        self.devices = Some(devices);
        self
    }
}

/// Classification of an error-sink delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The command failed.
    Error,
    /// The command succeeded with a remark.
    Warning,
}

/// Parameters of a command, echoed with its error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandEcho {
    /// Requested action.
    pub action: Action,
    /// Device selector in dotted form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Family selector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_code: Option<FamilyCode>,
    /// Attribute name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<&'static str>,
    /// Subscription period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
}

impl From<&Command> for CommandEcho {
    fn from(cmd: &Command) -> Self {
        Self {
            action: cmd.action,
            device_id: cmd.device.map(|d| d.to_string()),
            family_code: cmd.family,
            attribute: cmd.attribute.map(Attribute::name),
            interval: cmd.interval_ms,
        }
    }
}

/// The offending request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestEcho {
    /// Request text that could not be parsed.
    Raw(String),
    /// Parameters of a parsed command.
    Command(CommandEcho),
}

/// Body of an [`ErrorResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    /// Error or warning.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// The request that caused it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestEcho>,
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// Details.
    pub error: ErrorDetail,
}

impl ErrorResponse {
    /// Describe `err`.
    pub fn new(err: &CommandError, request: Option<RequestEcho>) -> Self {
        Self {
            error: ErrorDetail {
                severity: err.severity(),
                message: err.to_string(),
                request,
            },
        }
    }

    /// Describe `err` raised by `cmd`.
    pub fn for_command(err: &CommandError, cmd: &Command) -> Self {
        Self::new(err, Some(RequestEcho::Command(CommandEcho::from(cmd))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn sensor() -> OneWireAddress {
        OneWireAddress::from_family_serial(0x28, 0x1234_5678)
    }

    #[test]
    fn single_device_read() {
        let res = Response::new(Action::Read).with_device(
            DeviceReport::new(sensor())
                .on_channel(2)
                .with_value(Attribute::Temperature, 21.5),
        );
        assert_eq!(
            serde_json::to_string(&res).unwrap(),
            r#"{"action":"read","device":{"channel":2,"device_id":"28.785634120000","temperature":21.5}}"#
        );
    }

    #[test]
    fn family_scan_lists_attributes() {
        let monitor = OneWireAddress::from_family_serial(0x26, 0xab);
        let res = Response::new(Action::Scan)
            .with_family(0x26)
            .with_devices(vec![DeviceReport::new(monitor).present(true).with_attributes()]);
        assert_eq!(
            serde_json::to_string(&res).unwrap(),
            r#"{"action":"scan","family_code":38,"devices":[{"device_id":"26.AB0000000000","presence":true,"attributes":["temperature","VAD","VDD"]}]}"#
        );
    }

    #[test]
    fn voltages_use_upper_case_keys() {
        let res = Response::new(Action::Read).with_device(
            DeviceReport::new(OneWireAddress::from_family_serial(0x26, 1))
                .with_value(Attribute::Vdd, 5.0)
                .with_value(Attribute::Vad, 0.5),
        );
        let json = serde_json::to_string(&res).unwrap();
        assert!(json.contains(r#""VAD":0.5,"VDD":5.0"#));
    }

    #[test]
    fn warning_echoes_command() {
        let cmd = crate::cmd::capture::command(Action::Subscribe)
            .with_family(0x28)
            .with_attribute(Attribute::Temperature)
            .with_interval(1000);
        let err = ErrorResponse::for_command(&CommandError::AlreadySubscribed { family: true }, &cmd);
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            concat!(
                r#"{"error":{"severity":"warning","#,
                r#""message":"WARN: Already subscribed to device family / attribute. Updating subscription.","#,
                r#""request":{"action":"subscribe","family_code":40,"attribute":"temperature","interval":1000}}}"#
            )
        );
    }
}

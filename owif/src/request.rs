//! JSON requests.
//!
//! ```json
//! {"action": "subscribe", "family_code": 40, "attribute": "temperature", "interval": 5000}
//! ```
//!
//! `device_id` takes the dotted address form, e.g. `"28.785634120000"`.

use alloc::string::ToString;

use serde_json::{Map, Value};

use crate::{
    cmd::{Action, Command, CommandError, ErrorCallback, ErrorResponse, RequestEcho, ResultCallback},
    system::Attribute,
};

/// Build a [`Command`] from the request text.
///
/// Errors carry the request text as their echo.
pub fn parse_request(
    text: &str,
    on_result: ResultCallback,
    on_error: ErrorCallback,
) -> Result<Command, ErrorResponse> {
    let fail = |error: CommandError| {
        log::error!("[JsonParser] {error}");
        ErrorResponse::new(&error, Some(RequestEcho::Raw(text.to_string())))
    };

    let value: Value = serde_json::from_str(text).map_err(|_| fail(CommandError::Deserialize))?;
    let obj = value
        .as_object()
        .ok_or_else(|| fail(CommandError::Deserialize))?;
    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .and_then(Action::from_name)
        .ok_or_else(|| fail(CommandError::UnknownAction))?;

    let mut cmd = Command::new(action, on_result, on_error);
    if action == Action::Restart {
        return Ok(cmd);
    }

    parse_selector(obj, &mut cmd, action != Action::Scan).map_err(fail)?;
    if action == Action::Scan {
        return Ok(cmd);
    }

    let attribute = obj
        .get("attribute")
        .and_then(Value::as_str)
        .and_then(Attribute::from_name)
        .ok_or_else(|| fail(CommandError::InvalidAttribute))?;
    cmd.attribute = Some(attribute);

    if action == Action::Subscribe {
        let interval = obj
            .get("interval")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| fail(CommandError::InvalidInterval))?;
        cmd.interval_ms = Some(interval);
    }
    Ok(cmd)
}

fn parse_selector(
    obj: &Map<alloc::string::String, Value>,
    cmd: &mut Command,
    required: bool,
) -> Result<(), CommandError> {
    match (obj.get("device_id"), obj.get("family_code")) {
        (Some(_), Some(_)) => Err(CommandError::ConflictingSelector),
        (Some(device), None) => {
            let address = device
                .as_str()
                .and_then(|s| s.parse().ok())
                .ok_or(CommandError::InvalidSelector)?;
            cmd.device = Some(address);
            Ok(())
        }
        (None, Some(family)) => {
            let family = family
                .as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or(CommandError::InvalidSelector)?;
            cmd.family = Some(family);
            Ok(())
        }
        (None, None) if required => Err(CommandError::InvalidSelector),
        (None, None) => Ok(()),
    }
}

//! `read` handling for single devices and whole families.

use alloc::vec::Vec;
use core::fmt;

use embedded_onewire::{FamilyCode, OneWire, OneWireAddress};

use super::{Action, Command, CommandError, DeviceReport, Response, SubAction, ScanScope};
use crate::system::{Attribute, OneWireDevice, OneWireSystem, attributes};

/// What a read step produced.
pub(super) enum Outcome {
    /// The read is complete.
    Respond(Response),
    /// A conversion is running; the command waits in the queue.
    Pending(Command),
}

fn logged<E: fmt::Debug>(error: CommandError) -> impl FnOnce(E) -> CommandError {
    move |cause| {
        log::error!("[CmdHandler] {error} ({cause:?})");
        error
    }
}

/// Run the next phase of a `read` command.
pub(super) fn step<B>(
    system: &mut OneWireSystem<B>,
    mut cmd: Command,
    now_ms: u64,
) -> Result<Outcome, CommandError>
where
    B: OneWire,
    B::BusError: fmt::Debug,
{
    let attribute = cmd.attribute.ok_or(CommandError::MissingAttribute)?;
    match (cmd.device, cmd.family) {
        (Some(address), None) => {
            log::debug!(
                "[CmdHandler] Processing command 'read' [sub_action={:?}][device_id={address}]",
                cmd.sub_action
            );
            read_device(system, &mut cmd, address, attribute, now_ms)
        }
        (None, Some(family)) => {
            log::debug!(
                "[CmdHandler] Processing command 'read' [sub_action={:?}][family_code={family:X}]",
                cmd.sub_action
            );
            read_family(system, &mut cmd, family, attribute, now_ms)
        }
        (Some(_), Some(_)) => Err(CommandError::ConflictingSelector),
        (None, None) => Err(CommandError::MissingSelector),
    }
}

fn check_attribute(family: FamilyCode, attribute: Attribute) -> Result<(), CommandError> {
    let supported = attributes(family);
    if supported.is_empty() {
        Err(CommandError::FamilyNotSupported)
    } else if !supported.contains(&attribute) {
        Err(CommandError::UnsupportedAttribute(family))
    } else {
        Ok(())
    }
}

fn read_device<B>(
    system: &mut OneWireSystem<B>,
    cmd: &mut Command,
    address: OneWireAddress,
    attribute: Attribute,
    now_ms: u64,
) -> Result<Outcome, CommandError>
where
    B: OneWire,
    B::BusError: fmt::Debug,
{
    if attribute == Attribute::Presence {
        let channel = system
            .scan_address(address)
            .map_err(logged(CommandError::ScanFailed(ScanScope::Device)))?;
        let mut report = DeviceReport::new(address).present(channel.is_some());
        if let Some(id) = channel {
            report = report.on_channel(id);
        }
        return Ok(Outcome::Respond(Response::new(Action::Read).with_device(report)));
    }

    let family = address.family();
    check_attribute(family, attribute)?;
    let handle = system
        .available_device(address)
        .ok_or(CommandError::DeviceNotFound)?;
    let mut dev = handle.borrow_mut();
    let channel = dev.channel();
    let bus = system
        .bus_mut(channel)
        .map_err(logged(CommandError::DeviceNotFound))?;

    match cmd.sub_action {
        SubAction::None | SubAction::TriggerSampling => {
            let wait_ms = dev
                .sample(bus, attribute)
                .map_err(logged(CommandError::SampleFailed(family, attribute)))?;
            cmd.sub_action = SubAction::ReadResult;
            cmd.timer.rearm(wait_ms, now_ms);
            Ok(Outcome::Pending(*cmd))
        }
        SubAction::ReadResult => {
            let value = dev
                .read(bus, attribute)
                .map_err(logged(CommandError::ReadFailed(family, attribute)))?;
            let report = DeviceReport::new(address)
                .on_channel(channel)
                .with_value(attribute, value);
            Ok(Outcome::Respond(Response::new(Action::Read).with_device(report)))
        }
    }
}

fn read_family<B>(
    system: &mut OneWireSystem<B>,
    cmd: &mut Command,
    family: FamilyCode,
    attribute: Attribute,
    now_ms: u64,
) -> Result<Outcome, CommandError>
where
    B: OneWire,
    B::BusError: fmt::Debug,
{
    if attribute == Attribute::Presence {
        system
            .scan_family(family)
            .map_err(logged(CommandError::ScanFailed(ScanScope::Family)))?;
        let reports = system
            .available_devices_of(family)
            .values()
            .map(|dev| {
                let dev = dev.borrow();
                DeviceReport::new(dev.address())
                    .on_channel(dev.channel())
                    .present(true)
            })
            .collect();
        return Ok(Outcome::Respond(
            Response::new(Action::Read)
                .with_family(family)
                .with_devices(reports),
        ));
    }

    check_attribute(family, attribute)?;
    let devices = system.available_devices_of(family);
    if devices.is_empty() {
        return Err(CommandError::NoFamilyDevices);
    }

    match cmd.sub_action {
        SubAction::None | SubAction::TriggerSampling => {
            let sample_failed = CommandError::SampleFailed(family, attribute);
            let mut wait_ms = 0;
            if attribute == Attribute::Temperature {
                // one skip-ROM conversion per channel, timed for the slowest resolution
                for id in system.channels_hosting(family) {
                    log::trace!("[CmdHandler] Trigger temperature sampling on 1-wire bus {id}");
                    let bus = system.bus_mut(id).map_err(logged(sample_failed))?;
                    wait_ms = OneWireDevice::sample_family_temperature(bus, family)
                        .map_err(logged(sample_failed))?;
                }
            } else {
                for dev in devices.values() {
                    let mut dev = dev.borrow_mut();
                    let bus = system.bus_mut(dev.channel()).map_err(logged(sample_failed))?;
                    wait_ms = wait_ms.max(dev.sample(bus, attribute).map_err(logged(sample_failed))?);
                }
            }
            cmd.sub_action = SubAction::ReadResult;
            cmd.timer.rearm(wait_ms, now_ms);
            Ok(Outcome::Pending(*cmd))
        }
        SubAction::ReadResult => {
            let read_failed = CommandError::ReadFailed(family, attribute);
            let mut reports = Vec::with_capacity(devices.len());
            for dev in devices.values() {
                let mut dev = dev.borrow_mut();
                let channel = dev.channel();
                let bus = system.bus_mut(channel).map_err(logged(read_failed))?;
                let value = dev.read(bus, attribute).map_err(logged(read_failed))?;
                reports.push(
                    DeviceReport::new(dev.address())
                        .on_channel(channel)
                        .with_value(attribute, value),
                );
            }
            Ok(Outcome::Respond(
                Response::new(Action::Read)
                    .with_family(family)
                    .with_devices(reports),
            ))
        }
    }
}

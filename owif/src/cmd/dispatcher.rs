use core::fmt;

use embedded_onewire::OneWire;

use super::{
    Action, Command, CommandError, CommandQueue, DeviceReport, ErrorResponse, QueueAllocError,
    Response, Subscriptions,
    ScanScope,
    read::{self, Outcome},
};
use crate::system::OneWireSystem;

/// Platform hook for the `restart` action.
pub trait SystemControl {
    /// Restart the bridge. Called after the acknowledgement was delivered.
    fn restart(&mut self);
}

/// Owns the registry, the command queue and the subscriptions, and runs
/// one command per [`poll`](Dispatcher::poll).
pub struct Dispatcher<B, C> {
    system: OneWireSystem<B>,
    queue: CommandQueue,
    subscriptions: Subscriptions,
    control: C,
}

impl<B, C> Dispatcher<B, C>
where
    B: OneWire,
    B::BusError: fmt::Debug,
    C: SystemControl,
{
    /// Take over `system` with a queue of `capacity` commands.
    pub fn new(system: OneWireSystem<B>, capacity: usize, control: C) -> Result<Self, QueueAllocError> {
        log::debug!("[CmdHandler] Setup...");
        Ok(Self {
            system,
            queue: CommandQueue::new(capacity)?,
            subscriptions: Subscriptions::new(),
            control,
        })
    }

    /// Submit a command.
    ///
    /// A command missing a parameter its action needs is answered through its
    /// error sink right away and never queued. A full queue is returned to the
    /// caller as [`CommandError::QueueFull`].
    pub fn enqueue(&mut self, cmd: Command) -> Result<(), CommandError> {
        if let Err(e) = cmd.validate() {
            cmd.on_error.call(&ErrorResponse::for_command(&e, &cmd));
            return Err(e);
        }
        self.queue.push(cmd).inspect_err(|_| {
            log::error!("[CmdHandler] Write to command queue failed!");
        })
    }

    /// Process at most one queued command, then check the subscription timers.
    pub fn poll(&mut self, now_ms: u64) {
        if let Some(cmd) = self.queue.pop() {
            if cmd.timer.is_expired(now_ms) {
                self.dispatch(cmd, now_ms);
            } else {
                self.queue.resubmit(cmd);
            }
        }
        self.subscriptions.poll(now_ms, &mut self.queue);
    }

    /// The device registry.
    pub fn system(&self) -> &OneWireSystem<B> {
        &self.system
    }

    /// The device registry.
    pub fn system_mut(&mut self) -> &mut OneWireSystem<B> {
        &mut self.system
    }

    /// The stored subscriptions.
    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Number of queued commands.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn dispatch(&mut self, cmd: Command, now_ms: u64) {
        match cmd.action {
            Action::Restart => {
                cmd.on_result.call(&Response::acknowledged(Action::Restart));
                log::info!("[CmdHandler] >> RESTART Hardware << (requested via remote command)");
                self.control.restart();
            }
            Action::Scan => match self.scan(&cmd) {
                Ok(res) => cmd.on_result.call(&res),
                Err(e) => cmd.on_error.call(&ErrorResponse::for_command(&e, &cmd)),
            },
            Action::Read => match read::step(&mut self.system, cmd, now_ms) {
                Ok(Outcome::Respond(res)) => cmd.on_result.call(&res),
                Ok(Outcome::Pending(next)) => self.queue.resubmit(next),
                Err(e) => cmd.on_error.call(&ErrorResponse::for_command(&e, &cmd)),
            },
            Action::Subscribe => {
                log::debug!("[CmdHandler] Processing command 'subscribe'");
                self.subscriptions.subscribe(&cmd, now_ms, &mut self.queue);
            }
            Action::Unsubscribe => {
                log::debug!("[CmdHandler] Processing command 'unsubscribe'");
                self.subscriptions.unsubscribe(&cmd);
            }
        }
    }

    fn scan(&mut self, cmd: &Command) -> Result<Response, CommandError> {
        let res = Response::new(Action::Scan);
        match (cmd.device, cmd.family) {
            (Some(address), _) => {
                log::debug!("[CmdHandler] Processing command 'Scan' [device_id={address}]");
                let channel = self.system.scan_address(address).map_err(|e| {
                    log::error!("[CmdHandler] {e}");
                    CommandError::ScanFailed(ScanScope::Device)
                })?;
                let report = DeviceReport::new(address)
                    .present(channel.is_some())
                    .with_attributes();
                Ok(res.with_device(report))
            }
            (None, Some(family)) => {
                log::debug!("[CmdHandler] Processing command 'Scan' [family_code={family:X}]");
                self.system.scan_family(family).map_err(|e| {
                    log::error!("[CmdHandler] {e}");
                    CommandError::ScanFailed(ScanScope::Family)
                })?;
                let reports = self
                    .system
                    .available_devices_of(family)
                    .keys()
                    .map(|address| DeviceReport::new(*address).present(true).with_attributes())
                    .collect();
                Ok(res.with_family(family).with_devices(reports))
            }
            (None, None) => {
                log::debug!("[CmdHandler] Processing command 'Scan' [all]");
                self.system.scan().map_err(|e| {
                    log::error!("[CmdHandler] {e}");
                    CommandError::ScanFailed(ScanScope::All)
                })?;
                let reports = self
                    .system
                    .available_devices()
                    .keys()
                    .map(|address| DeviceReport::new(*address).present(true).with_attributes())
                    .collect();
                Ok(res.with_devices(reports))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cmd::{Severity, capture},
        sim::SimBus,
        system::{Attribute, OneWireChannel},
    };
    use alloc::vec;
    use embedded_onewire::OneWireAddress;

    #[derive(Default)]
    struct Restarts(u32);

    impl SystemControl for Restarts {
        fn restart(&mut self) {
            self.0 += 1;
        }
    }

    fn sensor() -> OneWireAddress {
        OneWireAddress::from_family_serial(0x28, 0x0102_0304)
    }

    fn monitor() -> OneWireAddress {
        OneWireAddress::from_family_serial(0x26, 0x0a0b)
    }

    fn serial() -> OneWireAddress {
        OneWireAddress::from_family_serial(0x01, 0x77)
    }

    /// Sensor and serial on channel 1, monitor on channel 2, all registered.
    fn dispatcher() -> Dispatcher<SimBus, Restarts> {
        let mut first = SimBus::new();
        first.add_ds18b20(sensor(), 21.5);
        first.add_ds2411(serial());
        let mut second = SimBus::new();
        second.add_ds2438(monitor(), 19.0, 1.5, 4.9);
        let mut system = OneWireSystem::new(vec![
            OneWireChannel::new(1, first),
            OneWireChannel::new(2, second),
        ]);
        system.scan().unwrap();
        Dispatcher::new(system, 16, Restarts::default()).unwrap()
    }

    fn bus(d: &mut Dispatcher<SimBus, Restarts>, id: u8) -> &mut SimBus {
        d.system_mut().bus_mut(id).unwrap()
    }

    #[test]
    fn read_waits_for_conversion() {
        let mut d = dispatcher();
        let read = capture::command(Action::Read)
            .with_device(sensor())
            .with_attribute(Attribute::Temperature);
        d.enqueue(read).unwrap();

        d.poll(100);
        assert_eq!(bus(&mut d, 1).conversions(sensor()), 1);
        assert_eq!(d.pending(), 1);
        assert!(capture::results().is_empty());

        // 12-bit conversion, not due before 850
        for now in [101, 500, 849] {
            d.poll(now);
            assert_eq!(d.pending(), 1);
            assert!(capture::results().is_empty());
        }
        assert_eq!(bus(&mut d, 1).conversions(sensor()), 1);

        d.poll(850);
        assert_eq!(d.pending(), 0);
        let results = capture::results();
        assert_eq!(results.len(), 1);
        let device = results[0].device.as_ref().unwrap();
        assert_eq!(device.device_id, sensor());
        assert_eq!(device.channel, Some(1));
        assert_eq!(device.temperature, Some(21.5));
        assert!(capture::errors().is_empty());
    }

    #[test]
    fn unsupported_attribute_is_rejected_once() {
        let mut d = dispatcher();
        let read = capture::command(Action::Read)
            .with_device(sensor())
            .with_attribute(Attribute::Vdd);
        d.enqueue(read).unwrap();
        d.poll(0);
        assert_eq!(d.pending(), 0);
        let errors = capture::errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error.message, "Unsupported device attribute for DS18B20.");
        assert_eq!(bus(&mut d, 1).conversions(sensor()), 0);
    }

    #[test]
    fn incomplete_commands_never_enter_the_queue() {
        let mut d = dispatcher();
        let read = capture::command(Action::Read).with_device(sensor());
        assert_eq!(d.enqueue(read), Err(CommandError::MissingAttribute));
        assert_eq!(d.pending(), 0);
        assert_eq!(capture::errors().len(), 1);
    }

    #[test]
    fn corrupted_scratchpad_fails_the_read() {
        let mut d = dispatcher();
        let read = capture::command(Action::Read)
            .with_device(monitor())
            .with_attribute(Attribute::Vad);
        d.enqueue(read).unwrap();
        d.poll(0);
        bus(&mut d, 2).corrupt_scratchpad(monitor());
        d.poll(10);
        assert!(capture::results().is_empty());
        let errors = capture::errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error.message, "Failed to get DS2438 VAD.");
    }

    #[test]
    fn family_temperature_broadcasts_on_hosting_channels() {
        let mut d = dispatcher();
        let read = capture::command(Action::Read)
            .with_family(0x28)
            .with_attribute(Attribute::Temperature);
        d.enqueue(read).unwrap();
        d.poll(0);
        assert_eq!(bus(&mut d, 1).broadcasts(), 1);
        assert_eq!(bus(&mut d, 2).broadcasts(), 0);
        d.poll(749);
        assert!(capture::results().is_empty());
        d.poll(750);
        let results = capture::results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].family_code, Some(0x28));
        let devices = results[0].devices.as_ref().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].temperature, Some(21.5));
    }

    #[test]
    fn family_read_aborts_on_any_failure() {
        let mut d = dispatcher();
        let other = OneWireAddress::from_family_serial(0x26, 0x0c0d);
        bus(&mut d, 1).add_ds2438(other, 22.0, 2.0, 5.0);
        d.system_mut().scan().unwrap();
        let read = capture::command(Action::Read)
            .with_family(0x26)
            .with_attribute(Attribute::Vdd);
        d.enqueue(read).unwrap();
        d.poll(0);
        bus(&mut d, 1).corrupt_scratchpad(other);
        d.poll(10);
        assert!(capture::results().is_empty());
        assert_eq!(capture::errors().len(), 1);
    }

    #[test]
    fn family_without_devices() {
        let mut d = dispatcher();
        d.system_mut().bus_mut(2).unwrap().remove_device(monitor());
        d.system_mut().scan().unwrap();
        let read = capture::command(Action::Read)
            .with_family(0x26)
            .with_attribute(Attribute::Temperature);
        d.enqueue(read).unwrap();
        d.poll(0);
        let errors = capture::errors();
        assert_eq!(errors[0].error.message, "No 1-Wire devices of the requested family available.");
    }

    #[test]
    fn evicted_device_is_not_found_on_next_phase() {
        let mut d = dispatcher();
        let read = capture::command(Action::Read)
            .with_device(sensor())
            .with_attribute(Attribute::Temperature);
        d.enqueue(read).unwrap();
        d.poll(0);
        bus(&mut d, 1).remove_device(sensor());
        d.system_mut().scan().unwrap();
        d.poll(750);
        let errors = capture::errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].error.message,
            "1-Wire device not found / available. Manual scan might be necessary before."
        );
    }

    #[test]
    fn presence_read_reports_channel() {
        let mut d = dispatcher();
        let present = capture::command(Action::Read)
            .with_device(monitor())
            .with_attribute(Attribute::Presence);
        let absent = present.with_device(OneWireAddress::from_family_serial(0x28, 0xdead));
        d.enqueue(present).unwrap();
        d.enqueue(absent).unwrap();
        d.poll(0);
        d.poll(0);
        let results = capture::results();
        let first = results[0].device.as_ref().unwrap();
        assert_eq!((first.presence, first.channel), (Some(true), Some(2)));
        let second = results[1].device.as_ref().unwrap();
        assert_eq!((second.presence, second.channel), (Some(false), None));
    }

    #[test]
    fn scan_modes() {
        let mut d = dispatcher();
        d.enqueue(capture::command(Action::Scan)).unwrap();
        d.enqueue(capture::command(Action::Scan).with_family(0x26)).unwrap();
        d.enqueue(capture::command(Action::Scan).with_device(serial())).unwrap();
        d.poll(0);
        d.poll(0);
        d.poll(0);
        let results = capture::results();
        assert_eq!(results[0].devices.as_ref().map(Vec::len), Some(3));
        let family = results[1].devices.as_ref().unwrap();
        assert_eq!(family.len(), 1);
        assert_eq!(
            family[0].attributes.as_deref(),
            Some(&["temperature", "VAD", "VDD"][..])
        );
        let single = results[2].device.as_ref().unwrap();
        assert_eq!(single.presence, Some(true));
        assert_eq!(single.attributes.as_deref(), Some(&[][..]));
    }

    #[test]
    fn subscription_triggers_reads() {
        let mut d = dispatcher();
        let sub = capture::command(Action::Subscribe)
            .with_device(sensor())
            .with_attribute(Attribute::Temperature)
            .with_interval(2000);
        d.enqueue(sub).unwrap();
        d.enqueue(sub.with_interval(3000)).unwrap();
        // subscribe, update, then the first read starts sampling
        d.poll(0);
        d.poll(0);
        d.poll(0);
        assert_eq!(capture::results().len(), 1);
        let warnings = capture::errors();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].error.severity, Severity::Warning);
        assert_eq!(d.subscriptions().device_interval(sensor(), Attribute::Temperature), Some(3000));
        assert_eq!(bus(&mut d, 1).conversions(sensor()), 1);

        d.poll(750);
        assert_eq!(capture::results().len(), 1);
        d.poll(3000);
        d.poll(3000);
        assert_eq!(bus(&mut d, 1).conversions(sensor()), 2);
    }

    #[test]
    fn restart_acknowledges_first() {
        let mut d = dispatcher();
        d.enqueue(capture::command(Action::Restart)).unwrap();
        d.poll(0);
        assert_eq!(d.control.0, 1);
        let results = capture::results();
        assert_eq!(results[0].action, Action::Restart);
        assert_eq!(results[0].acknowledge, Some(true));
    }

    #[test]
    fn full_queue_is_reported_to_the_caller() {
        let system = OneWireSystem::new(vec![OneWireChannel::new(1, SimBus::new())]);
        let mut d = Dispatcher::new(system, 1, Restarts::default()).unwrap();
        d.enqueue(capture::command(Action::Scan)).unwrap();
        assert_eq!(d.enqueue(capture::command(Action::Scan)), Err(CommandError::QueueFull));
        assert_eq!(d.pending(), 1);
    }
}

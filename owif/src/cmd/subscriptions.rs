use alloc::collections::BTreeMap;

use embedded_onewire::{FamilyCode, OneWireAddress};

use super::{
    Action, Command, CommandError, CommandQueue, DeviceReport, ErrorResponse, Response, Timer,
};
use crate::system::Attribute;

#[derive(Debug, Clone, Copy)]
struct Subscription {
    timer: Timer,
    template: Command,
}

/// Periodic reads, keyed by device or by family and attribute.
///
/// Each entry stores a plain `read` template. Every period a copy of the
/// template is queued; the template itself never enters the queue.
#[derive(Debug, Default)]
pub struct Subscriptions {
    by_device: BTreeMap<(OneWireAddress, Attribute), Subscription>,
    by_family: BTreeMap<(FamilyCode, Attribute), Subscription>,
}

impl Subscriptions {
    /// No subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored subscriptions.
    pub fn len(&self) -> usize {
        self.by_device.len() + self.by_family.len()
    }

    /// Whether nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Period of the subscription for a device, if any.
    pub fn device_interval(&self, address: OneWireAddress, attribute: Attribute) -> Option<u32> {
        self.by_device
            .get(&(address, attribute))
            .map(|s| s.timer.delay_ms())
    }

    /// Period of the subscription for a family, if any.
    pub fn family_interval(&self, family: FamilyCode, attribute: Attribute) -> Option<u32> {
        self.by_family
            .get(&(family, attribute))
            .map(|s| s.timer.delay_ms())
    }

    /// Store a subscription.
    ///
    /// A new key is acknowledged and its first read is queued at once. An
    /// existing key is replaced and answered with a warning; its next read
    /// follows the new period.
    pub fn subscribe(&mut self, cmd: &Command, now_ms: u64, queue: &mut CommandQueue) {
        let (Some(attribute), Some(interval_ms)) = (cmd.attribute, cmd.interval_ms) else {
            report(cmd, CommandError::MissingAttributeOrInterval);
            return;
        };
        let entry = Subscription {
            timer: Timer::new(interval_ms, now_ms),
            template: cmd.read_template(),
        };
        let (fresh, family) = match (cmd.device, cmd.family) {
            (Some(address), None) => (self.by_device.insert((address, attribute), entry).is_none(), false),
            (None, Some(family)) => (self.by_family.insert((family, attribute), entry).is_none(), true),
            (Some(_), Some(_)) => return report(cmd, CommandError::ConflictingSelector),
            (None, None) => return report(cmd, CommandError::MissingSelector),
        };
        if fresh {
            log::info!("[Subscriptions] Subscribed to {attribute} every {interval_ms} ms");
            cmd.on_result.call(&acknowledge(cmd, Action::Subscribe));
            queue.resubmit(entry.template);
        } else {
            log::warn!("[Subscriptions] Already subscribed, updating to every {interval_ms} ms");
            report(cmd, CommandError::AlreadySubscribed { family });
        }
    }

    /// Drop a subscription.
    pub fn unsubscribe(&mut self, cmd: &Command) {
        let Some(attribute) = cmd.attribute else {
            return report(cmd, CommandError::MissingAttribute);
        };
        let (removed, family) = match (cmd.device, cmd.family) {
            (Some(address), None) => (self.by_device.remove(&(address, attribute)).is_some(), false),
            (None, Some(family)) => (self.by_family.remove(&(family, attribute)).is_some(), true),
            (Some(_), Some(_)) => return report(cmd, CommandError::ConflictingSelector),
            (None, None) => return report(cmd, CommandError::MissingSelector),
        };
        if removed {
            log::info!("[Subscriptions] Unsubscribed from {attribute}");
            cmd.on_result.call(&acknowledge(cmd, Action::Unsubscribe));
        } else {
            report(cmd, CommandError::NotSubscribed { family });
        }
    }

    /// Queue a read for every subscription whose period elapsed.
    pub fn poll(&mut self, now_ms: u64, queue: &mut CommandQueue) {
        let entries = self
            .by_device
            .values_mut()
            .chain(self.by_family.values_mut());
        for entry in entries {
            if entry.timer.is_expired(now_ms) {
                queue.resubmit(entry.template);
                entry.timer.reset(now_ms);
            }
        }
    }
}

fn acknowledge(cmd: &Command, action: Action) -> Response {
    let res = Response::acknowledged(action);
    match (cmd.device, cmd.family) {
        (Some(address), _) => res.with_device(DeviceReport::new(address)),
        (None, Some(family)) => res.with_family(family),
        (None, None) => res,
    }
}

fn report(cmd: &Command, error: CommandError) {
    cmd.on_error.call(&ErrorResponse::for_command(&error, cmd));
}

//! Device registry: the enabled channels and every device they host.

mod channel;
mod device;
mod setup;

pub use channel::OneWireChannel;
pub use device::{
    Attribute, FamilyDevice, OneWireDevice, attributes, family_conversion_time_ms, family_name,
};
pub use setup::{Ds2484Channel, SetupError, setup_ds2484_channels};

use alloc::{collections::BTreeMap, rc::Rc, vec::Vec};
use core::{cell::RefCell, fmt};

use embedded_onewire::{FamilyCode, OneWire, OneWireAddress, OneWireError};

use crate::config::OneWireConfig;

/// 1-based channel number.
pub type ChannelId = u8;

/// Shared handle on a registered device.
pub type DeviceHandle = Rc<RefCell<OneWireDevice>>;

/// Registered devices by address.
pub type DeviceMap = BTreeMap<OneWireAddress, DeviceHandle>;

/// Registry failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemError<E> {
    /// Discovery failed on a channel.
    Channel {
        /// Failing channel.
        channel: ChannelId,
        /// Error of the bus.
        error: OneWireError<E>,
    },
    /// No channel with this id.
    UnknownChannel(ChannelId),
}

impl<E: fmt::Debug> fmt::Display for SystemError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::Channel { channel, error } => write!(f, "channel {channel}: {error}"),
            SystemError::UnknownChannel(channel) => write!(f, "no channel {channel}"),
        }
    }
}

/// The enabled channels and the devices found on them.
pub struct OneWireSystem<B> {
    channels: Vec<OneWireChannel<B>>,
    devices: DeviceMap,
}

impl<B: OneWire> OneWireSystem<B>
where
    B::BusError: fmt::Debug,
{
    /// Take ownership of the channels.
    pub fn new(channels: Vec<OneWireChannel<B>>) -> Self {
        Self {
            channels,
            devices: DeviceMap::new(),
        }
    }

    /// Drop the channels `config` disables and run the startup discovery if requested.
    pub fn begin(&mut self, config: &OneWireConfig) -> Result<(), SystemError<B::BusError>> {
        self.channels.retain(|ch| {
            let enabled = config.channel_enabled(ch.id());
            if !enabled {
                log::info!("[OneWireSystem] Channel {} disabled", ch.id());
            }
            enabled
        });
        log::debug!("[OneWireSystem] {} channels enabled", self.channels.len());
        if config.run_initial_scan {
            self.scan()?;
            log::info!("[OneWireSystem] Initial 1-wire bus scan: found {} devices", self.devices.len());
            for (address, dev) in &self.devices {
                log::info!("[OneWireSystem]   1-wire device: {address} (channel {})", dev.borrow().channel());
            }
        }
        Ok(())
    }

    /// Discover every device on every channel.
    ///
    /// Devices no longer found are dropped and new ones are created and initialized.
    /// A failing channel keeps its registered devices; the first failure is returned
    /// after all channels were scanned.
    pub fn scan(&mut self) -> Result<(), SystemError<B::BusError>> {
        self.scan_filtered(None)
    }

    /// Discover the devices of one family. Devices of other families are left alone.
    pub fn scan_family(&mut self, family: FamilyCode) -> Result<(), SystemError<B::BusError>> {
        self.scan_filtered(Some(family))
    }

    /// Check a single device on every channel.
    ///
    /// A present device is (re)created on the channel that answered; an absent one
    /// is removed from the registry.
    pub fn scan_address(
        &mut self,
        address: OneWireAddress,
    ) -> Result<Option<ChannelId>, SystemError<B::BusError>> {
        let mut failure = None;
        for ch in self.channels.iter_mut() {
            match ch.verify(address) {
                Ok(true) => {
                    let id = ch.id();
                    match Self::create_device(ch, address) {
                        Some(dev) => {
                            self.devices.insert(address, dev);
                        }
                        None => {
                            self.devices.remove(&address);
                        }
                    }
                    return Ok(Some(id));
                }
                Ok(false) => {}
                Err(error) => {
                    log::error!("[OneWireSystem] Channel {}: presence check failed: {error}", ch.id());
                    failure.get_or_insert(SystemError::Channel {
                        channel: ch.id(),
                        error,
                    });
                }
            }
        }
        self.devices.remove(&address);
        match failure {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Handle on a registered device.
    pub fn available_device(&self, address: OneWireAddress) -> Option<DeviceHandle> {
        self.devices.get(&address).cloned()
    }

    /// Every registered device.
    pub fn available_devices(&self) -> &DeviceMap {
        &self.devices
    }

    /// The registered devices of one family.
    pub fn available_devices_of(&self, family: FamilyCode) -> DeviceMap {
        self.devices
            .iter()
            .filter(|(address, _)| address.family() == family)
            .map(|(address, dev)| (*address, dev.clone()))
            .collect()
    }

    /// The enabled channels.
    pub fn available_buses(&mut self) -> &mut [OneWireChannel<B>] {
        &mut self.channels
    }

    /// Ids of the channels hosting at least one registered device of `family`.
    pub fn channels_hosting(&self, family: FamilyCode) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self
            .devices
            .iter()
            .filter(|(address, _)| address.family() == family)
            .map(|(_, dev)| dev.borrow().channel())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// The bus of channel `id`.
    pub fn bus_mut(&mut self, id: ChannelId) -> Result<&mut B, SystemError<B::BusError>> {
        self.channels
            .iter_mut()
            .find(|ch| ch.id() == id)
            .map(OneWireChannel::bus_mut)
            .ok_or(SystemError::UnknownChannel(id))
    }

    /// Ordered attribute names of a family, see [`attributes`].
    pub fn get_attributes(family: FamilyCode) -> Vec<&'static str> {
        attributes(family).iter().map(|a| a.name()).collect()
    }

    fn scan_filtered(&mut self, family: Option<FamilyCode>) -> Result<(), SystemError<B::BusError>> {
        let mut seen: Vec<(OneWireAddress, usize)> = Vec::with_capacity(self.devices.len());
        let mut failed: Vec<ChannelId> = Vec::new();
        let mut failure = None;
        for (idx, ch) in self.channels.iter_mut().enumerate() {
            let res = match family {
                Some(family) => ch.search_family(family),
                None => ch.search(),
            };
            match res {
                Ok(()) => seen.extend(ch.devices().iter().map(|address| (*address, idx))),
                Err(error) => {
                    failed.push(ch.id());
                    failure.get_or_insert(SystemError::Channel {
                        channel: ch.id(),
                        error,
                    });
                }
            }
        }

        self.devices.retain(|address, dev| {
            let keep = family.is_some_and(|f| address.family() != f)
                || failed.contains(&dev.borrow().channel())
                || seen.iter().any(|(a, _)| a == address);
            if !keep {
                log::debug!("[OneWireSystem] Device {address} gone");
            }
            keep
        });

        for (address, idx) in seen {
            let id = self.channels[idx].id();
            if self
                .devices
                .get(&address)
                .is_some_and(|dev| dev.borrow().channel() == id)
            {
                continue;
            }
            match Self::create_device(&mut self.channels[idx], address) {
                Some(dev) => {
                    self.devices.insert(address, dev);
                }
                None => {
                    self.devices.remove(&address);
                }
            }
        }

        if failure.is_some() {
            log::error!("[OneWireSystem] 1-wire bus search failed.");
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn create_device(ch: &mut OneWireChannel<B>, address: OneWireAddress) -> Option<DeviceHandle> {
        let mut dev = OneWireDevice::create(ch.id(), address);
        match dev.begin(ch.bus_mut()) {
            Ok(()) => {
                log::debug!("[OneWireSystem] Device {address} on channel {}", ch.id());
                Some(Rc::new(RefCell::new(dev)))
            }
            Err(e) => {
                log::error!("[OneWireSystem] Failed to setup 1-wire device with address '{address}': {e}");
                None
            }
        }
    }
}

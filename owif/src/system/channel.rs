use alloc::vec::Vec;
use core::fmt;

use embedded_onewire::{
    FamilyCode, OneWire, OneWireAddress, OneWireError, OneWireResult, OneWireSearch,
    OneWireSearchKind,
};

use super::ChannelId;

/// Upper bound on search passes per discovery, so a bus returning garbage
/// cannot stall the caller.
const MAX_SEARCH_PASSES: usize = 128;

/// One 1-Wire bus and the addresses its last discovery found.
pub struct OneWireChannel<B> {
    id: ChannelId,
    bus: B,
    devices: Vec<OneWireAddress>,
}

impl<B: OneWire> OneWireChannel<B>
where
    B::BusError: fmt::Debug,
{
    /// Wrap a bus as channel `id` (1-based).
    pub fn new(id: ChannelId, bus: B) -> Self {
        Self {
            id,
            bus,
            devices: Vec::new(),
        }
    }

    /// Channel number, 1-based.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Addresses found by the last [`search`](OneWireChannel::search) or
    /// [`search_family`](OneWireChannel::search_family).
    pub fn devices(&self) -> &[OneWireAddress] {
        &self.devices
    }

    /// The bus of this channel.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Discover every device on the bus.
    pub fn search(&mut self) -> OneWireResult<(), B::BusError> {
        self.collect(None)
    }

    /// Discover the devices of one family.
    pub fn search_family(&mut self, family: FamilyCode) -> OneWireResult<(), B::BusError> {
        self.collect(Some(family))
    }

    /// Check whether `address` answers on the bus.
    pub fn verify(&mut self, address: OneWireAddress) -> OneWireResult<bool, B::BusError> {
        OneWireSearch::new(&mut self.bus, OneWireSearchKind::Normal).verify(address)
    }

    /// Address a single device.
    pub fn select(&mut self, address: OneWireAddress) -> OneWireResult<(), B::BusError> {
        self.bus.address(Some(address))
    }

    /// Address every device of the bus at once.
    pub fn skip(&mut self) -> OneWireResult<(), B::BusError> {
        self.bus.address(None)
    }

    fn collect(&mut self, family: Option<FamilyCode>) -> OneWireResult<(), B::BusError> {
        self.devices.clear();
        let mut search = match family {
            Some(family) => {
                OneWireSearch::with_family(&mut self.bus, OneWireSearchKind::Normal, family)
            }
            None => OneWireSearch::new(&mut self.bus, OneWireSearchKind::Normal),
        };
        for _ in 0..MAX_SEARCH_PASSES {
            match search.next() {
                Ok(Some(address)) => {
                    if !self.devices.contains(&address) {
                        self.devices.push(address);
                    }
                }
                Ok(None) => return Ok(()),
                Err(OneWireError::InvalidCrc) => {
                    log::warn!("[OneWireSystem] Channel {}: discarded ROM code with bad CRC", self.id);
                }
                Err(e) => {
                    log::error!("[OneWireSystem] Channel {}: search aborted: {e}", self.id);
                    return Err(e);
                }
            }
        }
        log::warn!(
            "[OneWireSystem] Channel {}: search stopped after {MAX_SEARCH_PASSES} passes",
            self.id
        );
        Ok(())
    }
}

use alloc::{rc::Rc, vec::Vec};
use core::{cell::RefCell, fmt};

use ds2484::{
    DeviceConfiguration, Ds2484, Ds2484Builder, Ds2484Error, InvalidPortParameter,
    OneWireConfigurationBuilder, OneWirePortConfiguration, PortParameter,
};
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};

use super::{ChannelId, OneWireChannel};
use crate::{
    config::{ONEWIRE_CHANNELS, OneWireConfig, PortTiming},
    i2c::{MuxChannel, MuxError, Tca9548a},
};

/// A DS2484 behind one TCA9548A channel.
pub type Ds2484Channel<I, D> = Ds2484<MuxChannel<Tca9548a<I>>, D>;

/// Bus-master setup failures.
#[derive(Debug)]
pub enum SetupError<E> {
    /// The multiplexer did not answer.
    Mux(MuxError<E>),
    /// A configured timing code does not fit its parameter.
    InvalidTiming,
}

impl<E: fmt::Debug> fmt::Display for SetupError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::Mux(e) => write!(f, "multiplexer: {e}"),
            SetupError::InvalidTiming => f.write_str("invalid 1-Wire port timing code"),
        }
    }
}

impl<E> From<InvalidPortParameter> for SetupError<E> {
    fn from(_: InvalidPortParameter) -> Self {
        SetupError::InvalidTiming
    }
}

fn port_configuration(timing: &PortTiming) -> Result<OneWirePortConfiguration, InvalidPortParameter> {
    Ok(OneWireConfigurationBuilder::default()
        .parameter(PortParameter::ResetLow, false, timing.reset_low)?
        .parameter(PortParameter::PresenceDetect, false, timing.presence_detect)?
        .parameter(PortParameter::WriteZeroLow, false, timing.write_zero_low)?
        .parameter(PortParameter::WriteZeroRecovery, false, timing.write_zero_recovery)?
        .parameter(PortParameter::WeakPullup, false, timing.weak_pullup)?
        .build())
}

/// Probe the multiplexer on `i2c` and bring up one DS2484 per enabled channel.
///
/// Channel `n` is TCA9548A output `n - 1`. A bus master that fails its reset or
/// configuration is logged and left out.
pub fn setup_ds2484_channels<I, D>(
    i2c: I,
    mux_addr: SevenBitAddress,
    config: &OneWireConfig,
    delay: D,
) -> Result<Vec<OneWireChannel<Ds2484Channel<I, D>>>, SetupError<I::Error>>
where
    I: I2c<SevenBitAddress>,
    D: DelayNs + Clone,
{
    let mut mux = Tca9548a::new(i2c, mux_addr);
    mux.begin().map_err(SetupError::Mux)?;
    let mux = Rc::new(RefCell::new(mux));

    let device_config = DeviceConfiguration::new()
        .with_active_pullup(config.active_pullup)
        .with_strong_pullup(config.strong_pullup);
    let port = port_configuration(&config.timing)?;
    if !port.is_default() {
        log::warn!("[OneWireSystem] Non-default 1-Wire port timing: {:02x?}", port.codes());
    }

    let mut channels = Vec::with_capacity(ONEWIRE_CHANNELS);
    for id in 1..=ONEWIRE_CHANNELS as ChannelId {
        if !config.channel_enabled(id) {
            continue;
        }
        let bus = MuxChannel::new(mux.clone(), id - 1);
        let builder = Ds2484Builder::default()
            .with_config(device_config)
            .with_port_configuration(port.clone());
        match builder.build(bus, delay.clone()) {
            Ok(master) => {
                log_timing(id, master.timing());
                channels.push(OneWireChannel::new(id, master));
            }
            Err(e) => log_master_failure(id, &e),
        }
    }
    Ok(channels)
}

fn log_timing(id: ChannelId, port: &OneWirePortConfiguration) {
    log::debug!(
        "[OneWireSystem] DS2484 ready on channel {id}: tRSTL {} ns, tMSP {} ns, tW0L {} ns, tREC0 {} ns, RWPU {} ohm",
        port.reset_time(),
        port.presence_detect_time(),
        port.write_zero_low_time(),
        port.write_zero_recovery_time(),
        port.weak_pullup_resistor(),
    );
}

fn log_master_failure<E: fmt::Debug>(id: ChannelId, err: &Ds2484Error<E>) {
    log::error!("[OneWireSystem] DS2484 on channel {id} failed: {err}");
}

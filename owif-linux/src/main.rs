use std::{
    fmt, fs,
    io::{self, BufRead, Write},
    path::PathBuf,
    process,
    sync::mpsc::{self, TryRecvError},
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWire;
use owif::{
    Dispatcher, ErrorCallback, ErrorResponse, OneWireAddress, OneWireChannel, OneWireConfig,
    OneWireSystem, Response, ResultCallback, SystemControl,
    cmd::{CommandError, RequestEcho},
    config::ONEWIRE_CHANNELS,
    i2c::{NoRecovery, TCA9548A_I2C_ADDRESS, Transport},
    parse_request,
    sim::SimBus,
    system::setup_ds2484_channels,
};

/// 1-Wire bridge: JSON requests on stdin, JSON responses on stdout
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to I2C bus (e.g., /dev/i2c-1)
    #[arg(short, long, default_value = "/dev/i2c-1")]
    path: String,
    /// I2C address of the TCA9548A multiplexer
    #[arg(short, long, default_value_t = TCA9548A_I2C_ADDRESS, value_parser = parse_i2c_address)]
    mux_address: u8,
    /// JSON file with the bridge configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Do not discover devices at startup
    #[arg(long)]
    no_initial_scan: bool,
    /// Run on simulated buses instead of the I2C hardware
    #[arg(long)]
    simulate: bool,
}

fn parse_i2c_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid I2C address '{s}': {e}"))
}

/// DelayNs on top of thread::sleep.
#[derive(Debug, Clone, Copy, Default)]
struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        linux_embedded_hal::Delay.delay_ns(ns);
    }
}

/// Restart is left to the supervisor.
struct ExitOnRestart;

impl SystemControl for ExitOnRestart {
    fn restart(&mut self) {
        let _ = io::stdout().flush();
        process::exit(0);
    }
}

fn print_result(_ctx: usize, response: &Response) {
    match serde_json::to_string(response) {
        Ok(line) => println!("{line}"),
        Err(e) => log::error!("Failed to serialize response: {e}"),
    }
}

fn print_error(_ctx: usize, error: &ErrorResponse) {
    match serde_json::to_string(error) {
        Ok(line) => println!("{line}"),
        Err(e) => log::error!("Failed to serialize error: {e}"),
    }
}

const ON_RESULT: ResultCallback = ResultCallback::new(print_result, 0);
const ON_ERROR: ErrorCallback = ErrorCallback::new(print_error, 0);

fn fatal(what: &str, err: impl fmt::Display) -> ! {
    log::error!("{what}: {err}");
    process::exit(1);
}

fn load_config(args: &Args) -> OneWireConfig {
    let config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .unwrap_or_else(|e| fatal(&format!("Failed to read {}", path.display()), e));
            serde_json::from_str(&text).unwrap_or_else(|e| fatal("Invalid configuration", e))
        }
        None => OneWireConfig::default(),
    };
    if args.no_initial_scan {
        config.with_initial_scan(false)
    } else {
        config
    }
}

/// Channel 1 hosts a thermometer and a serial number, channel 2 a battery monitor.
fn simulated_channels() -> Vec<OneWireChannel<SimBus>> {
    let mut buses: Vec<SimBus> = (0..ONEWIRE_CHANNELS).map(|_| SimBus::new()).collect();
    buses[0].add_ds18b20(OneWireAddress::from_family_serial(0x28, 0x0001_0203), 21.5);
    buses[0].add_ds2411(OneWireAddress::from_family_serial(0x01, 0x00c0_ffee));
    buses[1].add_ds2438(OneWireAddress::from_family_serial(0x26, 0x0004_0506), 23.0, 1.25, 4.98);
    buses
        .into_iter()
        .enumerate()
        .map(|(i, bus)| OneWireChannel::new(i as u8 + 1, bus))
        .collect()
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::error!("Failed to read stdin: {e}");
                    break;
                }
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn run<B>(channels: Vec<OneWireChannel<B>>, config: &OneWireConfig) -> !
where
    B: OneWire,
    B::BusError: fmt::Debug,
{
    let mut system = OneWireSystem::new(channels);
    if let Err(e) = system.begin(config) {
        log::error!("Initial scan incomplete: {e}");
    }
    let mut dispatcher = Dispatcher::new(system, config.queue_capacity, ExitOnRestart)
        .unwrap_or_else(|e| fatal("Startup failed", e));

    let requests = spawn_stdin_reader();
    let start = Instant::now();
    let mut closed = false;
    loop {
        loop {
            match requests.try_recv() {
                Ok(line) => submit(&mut dispatcher, line.trim()),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }
        dispatcher.poll(start.elapsed().as_millis() as u64);
        if closed && dispatcher.pending() == 0 && dispatcher.subscriptions().is_empty() {
            process::exit(0);
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn submit<B, C>(dispatcher: &mut Dispatcher<B, C>, line: &str)
where
    B: OneWire,
    B::BusError: fmt::Debug,
    C: SystemControl,
{
    if line.is_empty() {
        return;
    }
    match parse_request(line, ON_RESULT, ON_ERROR) {
        // invalid commands were already answered by the dispatcher
        Ok(cmd) => {
            if let Err(e @ CommandError::QueueFull) = dispatcher.enqueue(cmd) {
                print_error(0, &ErrorResponse::new(&e, Some(RequestEcho::Raw(line.to_owned()))));
            }
        }
        Err(e) => print_error(0, &e),
    }
}

fn main() {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args);

    if args.simulate {
        log::info!("Running on simulated 1-Wire buses");
        run(simulated_channels(), &config);
    }

    let i2c = linux_embedded_hal::I2cdev::new(&args.path)
        .unwrap_or_else(|e| fatal(&format!("Failed to open {}", args.path), e));
    let mut transport = Transport::new(i2c);
    transport
        .begin(&mut NoRecovery)
        .unwrap_or_else(|e| fatal("I2C bus recovery failed", e));
    let channels = setup_ds2484_channels(transport, args.mux_address, &config, HostDelay)
        .unwrap_or_else(|e| fatal("Failed to set up the 1-Wire channels", e));
    log::info!("{} 1-Wire channels ready", channels.len());
    run(channels, &config);
}

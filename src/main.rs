use std::error::Error;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::SignalFd;

use padlink::dongle::{Dongle, SUPPORTED_DEVICES};
use padlink::drivers::mt76::firmware::Firmware;
use padlink::drivers::mt76::radio::Mt76Radio;
use padlink::sync::interrupt::InterruptibleReader;
use padlink::usb::DeviceWatcher;

/// Single-instance lock, path overridable at build time.
const LOCK_FILE: &str = match option_env!("PADLINK_LOCK_PATH") {
    Some(path) => path,
    None => "/var/lock/padlink.lock",
};

#[derive(Parser)]
#[command(
    version,
    disable_version_flag = true,
    about = "User space driver for Xbox One wireless gamepads"
)]
struct Args {
    /// Print version
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,
}

fn main() -> ExitCode {
    Args::parse();

    let log_level = Env::new().filter_or("LOG_LEVEL", "info");
    env_logger::Builder::from_env(log_level).init();

    log::info!("padlink v{}", env!("CARGO_PKG_VERSION"));

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");

            ExitCode::FAILURE
        }
    }
}

fn acquire_lock() -> Result<Flock<File>, Box<dyn Error>> {
    let file = File::options()
        .create(true)
        .read(true)
        .write(true)
        .open(LOCK_FILE)?;

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => Ok(lock),
        Err((_, Errno::EWOULDBLOCK)) => Err("another instance is already running".into()),
        Err((_, e)) => Err(format!("failed to lock {LOCK_FILE}: {e}").into()),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let _lock = acquire_lock()?;

    // Block the signals consumed through the signal descriptor; spawned
    // threads inherit the mask
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    mask.add(Signal::SIGUSR1);
    mask.thread_block()?;

    let mut signal_fd = SignalFd::new(&mask)?;
    let signals = Arc::new(InterruptibleReader::new(signal_fd.as_raw_fd())?);

    let firmware = Firmware::load()?;

    // Fatal transport errors unblock the signal wait below
    let terminate = {
        let signals = signals.clone();

        Box::new(move || signals.interrupt())
    };

    let watcher = DeviceWatcher::new()?;
    let usb = Arc::new(watcher.wait_for_device(&SUPPORTED_DEVICES, terminate)?);

    let radio = Arc::new(Mt76Radio::new(usb.clone(), &firmware)?);
    let dongle = Dongle::new(usb, radio);

    dongle.start();

    log::info!("Dongle initialized");

    let mut transport_failed = false;

    loop {
        match signals.wait() {
            Ok(true) => {}
            // A USB failure interrupted the wait
            Ok(false) => {
                transport_failed = true;

                break;
            }
            Err(e) => {
                dongle.shutdown();

                return Err(e.into());
            }
        }

        match signal_fd.read_signal() {
            Ok(Some(siginfo)) if siginfo.ssi_signo == Signal::SIGUSR1 as u32 => {
                dongle.toggle_pairing();
            }
            Ok(Some(_)) => break,
            Ok(None) => {}
            Err(e) => {
                dongle.shutdown();

                return Err(e.into());
            }
        }
    }

    log::info!("Shutting down...");

    dongle.shutdown();

    if transport_failed {
        return Err("shut down after a transport failure".into());
    }

    Ok(())
}

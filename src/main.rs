// Main application entry point.
// Orchestrates command-line parsing, signal handling, component wiring
// and the daemon's event loop.

use std::os::unix::io::RawFd;
use std::path::Path;
use std::process::exit;
use std::time::Duration;

use clap::CommandFactory;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use easy_switcher::cli::{self, Args};
use easy_switcher::config::{Settings, CONFIG_FILE};
use easy_switcher::converter::Converter;
use easy_switcher::event_loop::{EventLoop, LoopCtl};
use easy_switcher::keys;
use easy_switcher::monitor::{DeviceMonitor, INPUT_DEVICE_DIR};
use easy_switcher::reader::InputReader;
use easy_switcher::vkbd::{VirtualKeyboard, VIRTUAL_KEYBOARD_NAME};
use easy_switcher::wizard;

/// Everything the event-loop callbacks operate on. Single-threaded by
/// design: one `&mut App` is threaded through every callback, so no
/// locking exists anywhere in the daemon.
struct App {
    monitor: DeviceMonitor,
    reader: InputReader,
    vkbd: VirtualKeyboard,
    converter: Converter,
}

/// Drains the input reader for a ready device, feeds the converter and,
/// when a trigger matched, plays the conversion back through the virtual
/// keyboard. The reader is flushed afterwards so the injected events do
/// not re-enter the buffer.
fn input_handler(app: &mut App, _ctl: &mut LoopCtl<App>, fd: RawFd) {
    while let Some((code, value)) = app.reader.fetch(fd) {
        app.converter.push(code, value);
        debug!(
            "input event: {} {} from: {}",
            keys::key_name(code),
            keys::key_state_name(value),
            app.reader.get_device_name(fd).unwrap_or("")
        );
        debug!("buffer: {}", app.converter.buffer_dump());

        if let Some(action) = app.converter.process() {
            for ev in app.converter.convert(action) {
                if let Err(err) = app.vkbd.emit_key(ev.code, ev.value) {
                    warn!("{err}");
                }
                debug!(
                    "output: {} {}",
                    keys::key_name(ev.code),
                    keys::key_state_name(ev.value)
                );
            }
            app.reader.flush();
            debug!("buffer: {}", app.converter.buffer_dump());
        }
    }
}

/// Reacts to hot-plug events: opens newly connected devices and registers
/// them with the loop, unregisters and closes removed ones. Rejected
/// devices (no key capability, blacklisted) are only a debug-level note.
fn device_handler(app: &mut App, ctl: &mut LoopCtl<App>, _fd: RawFd) {
    while let Some((path, connected)) = app.monitor.fetch() {
        if connected {
            match app.reader.add_device(&path) {
                Ok(fd) => {
                    debug!(
                        "added device {}: {}, UID={}",
                        path.display(),
                        app.reader.get_device_name(fd).unwrap_or(""),
                        app.reader.get_device_uid(fd).unwrap_or("")
                    );
                    ctl.add_handler(fd, Box::new(input_handler));
                }
                Err(err) => {
                    debug!("skipped device {}: {err}", path.display());
                }
            }
        } else if let Some(fd) = app.reader.get_device_fd(&path) {
            ctl.remove_handler(fd);
            let _ = app.reader.remove_device(&path);
            debug!("removed device: {}", path.display());
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    info!("Easy Switcher v{} started", env!("CARGO_PKG_VERSION"));

    let mut event_loop: EventLoop<App> = EventLoop::new()?;

    for signal in [SIGINT, SIGHUP, SIGQUIT, SIGTERM] {
        signal_hook::low_level::pipe::register_raw(signal, event_loop.stop_fd())?;
    }
    debug!("signal handlers set");

    // The monitor must exist before the virtual keyboard: the synthetic
    // node's creation is the inotify wake-up that flushes the monitor's
    // startup queue on the first loop iteration.
    let monitor = DeviceMonitor::open(INPUT_DEVICE_DIR)?;
    let monitor_fd = monitor.fd();
    debug!("device monitor initialized");

    let settings = Settings::load(CONFIG_FILE)
        .map_err(|err| format!("failed to parse configuration file {CONFIG_FILE}: {err}"))?;
    debug!(
        "configuration loaded: layout-switch={}+{}, convert-key={}, delay={}",
        settings.ls_keys[0], settings.ls_keys[1], settings.conv_key, settings.delay_ms
    );

    let mut reader = InputReader::new();

    let vkbd = VirtualKeyboard::create(Duration::from_millis(settings.delay_ms))?;
    reader.add_to_blacklist(vkbd.uid());
    debug!(
        "virtual keyboard created: {}, UID={}",
        VIRTUAL_KEYBOARD_NAME,
        vkbd.uid()
    );

    for uid in &settings.blacklist {
        reader.add_to_blacklist(uid.clone());
        debug!("added to blacklist: {uid}");
    }

    let mut converter = Converter::new();
    converter.conv_key = settings.conv_key;
    converter.ls_keys = settings.ls_keys;

    event_loop.add_handler(monitor_fd, Box::new(device_handler))?;

    let mut app = App {
        monitor,
        reader,
        vkbd,
        converter,
    };

    debug!("starting event loop");
    event_loop.run(&mut app, -1)?;

    info!("Got exit signal. Bye.");
    Ok(())
}

fn init_logging(debug_mode: bool) {
    let default_level = if debug_mode { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();
}

fn main() {
    let args = cli::parse_args();

    if args.configure {
        init_logging(false);
        if let Err(err) = wizard::configure(Path::new(CONFIG_FILE)) {
            eprintln!("{err}");
            eprintln!("Configuration failed, exiting.");
            exit(1);
        }
    } else if args.run || args.debug {
        init_logging(args.debug);
        if let Err(err) = run() {
            eprintln!("{err}");
            eprintln!("Easy Switcher failed, exiting.");
            exit(1);
        }
    } else {
        let _ = Args::command().print_help();
    }
}

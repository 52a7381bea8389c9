//! Interactive first-run configuration.
//!
//! Scans the attached keyboards, lets the user pick the trigger and
//! record the layout-switch shortcut by pressing it, and writes the
//! commented configuration file. An existing file's delay and blacklist
//! survive a re-run.

use std::io::{BufRead, Write};
use std::os::unix::io::RawFd;
use std::path::Path;

use thiserror::Error;

use crate::config::{IniConfig, CONFIG_SECTION};
use crate::converter::{KEY_DOWN, KEY_UP};
use crate::event_loop::{EventLoop, LoopCtl, LoopError};
use crate::keys;
use crate::monitor::{DeviceMonitor, MonitorError, INPUT_DEVICE_DIR};
use crate::reader::InputReader;
use crate::vkbd::DEFAULT_DELAY_MS;

/// How long each "press a key" prompt waits before giving up.
const CAPTURE_TIMEOUT_MS: i32 = 60_000;

#[derive(Debug, Error)]
pub enum WizardError {
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("no keyboards found")]
    NoKeyboardsFound,
    #[error("no keyboards opened for reading; are you root?")]
    NoKeyboardsOpened,
    #[error("timeout reached waiting for a key")]
    CaptureTimeout,
    #[error("failed to read input: {0}")]
    Stdin(#[source] std::io::Error),
    #[error("failed to write config file {path}: {source}")]
    Save {
        path: String,
        source: std::io::Error,
    },
}

struct CaptureCtx {
    reader: InputReader,
    captured: Vec<u16>,
}

/// Records pressed keys; the first release ends the capture. Autorepeat
/// is ignored so a held key cannot masquerade as a combination.
fn capture_handler(ctx: &mut CaptureCtx, ctl: &mut LoopCtl<CaptureCtx>, fd: RawFd) {
    while let Some((code, value)) = ctx.reader.fetch(fd) {
        match value {
            KEY_DOWN => {
                println!("  {} ({})", keys::key_name(code), code);
                ctx.captured.push(code);
            }
            KEY_UP => ctl.stop(),
            _ => {}
        }
    }
}

pub fn configure(config_path: &Path) -> Result<(), WizardError> {
    // Preserve tunables from an existing installation.
    print!("Checking existing config...");
    flush_stdout();
    let (delay, blacklist) = match IniConfig::load(config_path) {
        Ok(ini) => {
            let delay = ini.get_int(CONFIG_SECTION, "delay");
            let blacklist = ini.get_str(CONFIG_SECTION, "blacklist");
            if let (Some(delay), Some(blacklist)) = (delay, blacklist) {
                println!("Done.");
                (delay, blacklist.to_string())
            } else {
                println!(
                    "Failed.\n{} is corrupt. A new config file will be created.",
                    config_path.display()
                );
                (DEFAULT_DELAY_MS as i64, String::new())
            }
        }
        Err(err) => {
            println!("Failed.\n{err}\nA new config file will be created.");
            (DEFAULT_DELAY_MS as i64, String::new())
        }
    };

    // Open every keyboard and point it at the capture handler.
    print!("Scanning keyboards...");
    flush_stdout();

    let mut event_loop: EventLoop<CaptureCtx> = EventLoop::new()?;
    let mut monitor = DeviceMonitor::open(INPUT_DEVICE_DIR)?;
    if monitor.is_empty() {
        println!("Error.");
        return Err(WizardError::NoKeyboardsFound);
    }

    let mut reader = InputReader::new();
    while let Some((path, connected)) = monitor.fetch() {
        if !connected {
            continue;
        }
        match reader.add_device(&path) {
            Ok(fd) => {
                event_loop.add_handler(fd, Box::new(capture_handler))?;
            }
            Err(err) => {
                tracing::debug!("skipped device {}: {err}", path.display());
            }
        }
    }

    if reader.is_empty() {
        println!("Error.");
        return Err(WizardError::NoKeyboardsOpened);
    }
    println!("Done.\n");

    let mut ctx = CaptureCtx {
        reader,
        captured: Vec::new(),
    };

    // Trigger selection.
    println!("Please set the key combination you will use to correct text.");
    println!("You can use the default combination or define your own.");
    println!("The default combination is:");
    println!(" - double SHIFT to correct the last word;");
    println!(" - double SHIFT while holding the other SHIFT to correct the whole text.\n");
    print!("Do you want to use the default combination? (y,n) ");
    flush_stdout();

    let conv_key = loop {
        match read_choice()?.as_str() {
            "y" | "Y" => break 0u16,
            "n" | "N" => {
                println!();
                println!("Press the key you want to use to correct text.");
                println!("Please DO NOT use:");
                println!("  - Letters and numbers: A-Z, 0-9");
                println!("  - Special characters: ~ - = {{ }} ; \" , . / * + etc.");
                println!("  - Keys that move the cursor: arrows TAB PAGEUP PAGEDOWN etc.");
                println!("  - Special keys: CTRL ALT SHIFT BACKSPACE DEL etc.\n");
                println!("Waiting for your input...");
                ctx.reader.flush();
                event_loop.run(&mut ctx, CAPTURE_TIMEOUT_MS)?;
                let Some(&key) = ctx.captured.first() else {
                    println!("Timeout reached.");
                    return Err(WizardError::CaptureTimeout);
                };
                break key;
            }
            _ => {
                print!("Invalid input. Please enter 'y' or 'n': ");
                flush_stdout();
            }
        }
    };

    if conv_key == 0 {
        println!("Easy Switcher will use the default combination to correct the text - double SHIFT.\n");
    } else {
        println!("Captured key: {}\n", keys::key_name(conv_key));
    }

    // Layout-switch capture.
    println!("Please specify the key that is currently used to switch the keyboard layout in your system.");
    println!("Press the key or key combination.");
    println!("Waiting for your input...");
    ctx.captured.clear();
    ctx.reader.flush();
    event_loop.run(&mut ctx, CAPTURE_TIMEOUT_MS)?;

    let ls_keys: [u16; 2] = match ctx.captured.as_slice() {
        [] => {
            println!("Timeout reached.");
            return Err(WizardError::CaptureTimeout);
        }
        [only] => {
            println!("Captured key: {}\n", keys::key_name(*only));
            [*only, 0]
        }
        [first, second, ..] => {
            println!(
                "Captured key combination: {}+{}\n",
                keys::key_name(*first),
                keys::key_name(*second)
            );
            [*first, *second]
        }
    };

    println!("Saving configuration...");
    save_config(config_path, ls_keys, conv_key, delay, &blacklist)?;

    println!("Configuration is successfully saved.");
    println!(
        "See {} to edit additional parameters.",
        config_path.display()
    );
    Ok(())
}

fn read_choice() -> Result<String, WizardError> {
    let mut line = String::new();
    let read = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(WizardError::Stdin)?;
    if read == 0 {
        return Err(WizardError::Stdin(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "end of input",
        )));
    }
    Ok(line.trim().to_string())
}

fn flush_stdout() {
    let _ = std::io::stdout().flush();
}

fn save_config(
    path: &Path,
    ls_keys: [u16; 2],
    conv_key: u16,
    delay: i64,
    blacklist: &str,
) -> Result<(), WizardError> {
    let save_err = |source: std::io::Error| WizardError::Save {
        path: path.display().to_string(),
        source,
    };

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(save_err)?;
    }

    let layout_switch = if ls_keys[1] > 0 {
        format!("{}+{}", ls_keys[0], ls_keys[1])
    } else {
        ls_keys[0].to_string()
    };

    let contents = format!(
        "[Easy Switcher]\n\
         # Easy Switcher configuration file.\n\n\
         # Scancode of the key or key combination used to switch\n\
         # the keyboard layout in your system.\n\
         # Key combinations are supported; use '+' as a delimiter.\n\
         # Run 'sudo showkey' to find your key scancodes.\n\
         # Examples:\n\
         # layout-switch=125\n\
         # layout-switch=29+42\n\n\
         layout-switch={layout_switch}\n\n\n\
         # Scancode of the key used to correct the entered text.\n\
         # Key combinations are not supported.\n\
         # Double SHIFT is used by default; set 0 to use it.\n\
         # Run 'sudo showkey' to find your key scancodes.\n\
         # Example:\n\
         # convert-key=0\n\n\
         convert-key={conv_key}\n\n\n\
         # Easy Switcher waits a small delay before sending keys.\n\
         # This helps your system handle all events correctly.\n\
         # Smaller delay makes switching faster, but may cause errors.\n\
         # If you see wrong or mixed symbols, try to increase the delay.\n\
         # Default delay value is 10 ms.\n\
         # Example:\n\
         # delay=10\n\n\
         delay={delay}\n\n\n\
         # If you get unwanted input from a specific device,\n\
         # add its UID to the blacklist below.\n\
         # Easy Switcher will ignore all blacklisted devices.\n\
         # Use commas (,) to separate multiple UIDs.\n\
         # Run 'sudo easy-switcher --debug' to list your devices' UIDs.\n\
         # Examples:\n\
         # blacklist=0000:0000:0000:0000:0000000000000000\n\
         # blacklist=0000:0000:0000:0000:0000000000000000,0000:0000:0000:0000:0000000000000000\n\n\
         blacklist={blacklist}\n"
    );

    std::fs::write(path, contents).map_err(save_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn saved_config_round_trips_through_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("conf.d").join("default.conf");

        save_config(&path, [29, 42], 70, 25, "").expect("save");

        let settings = Settings::load(&path).expect("load saved config");
        assert_eq!(settings.ls_keys, [29, 42]);
        assert_eq!(settings.conv_key, 70);
        assert_eq!(settings.delay_ms, 25);
        assert!(settings.blacklist.is_empty());
    }

    #[test]
    fn saved_config_preserves_blacklist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("default.conf");
        let uid = "0003:046d:c31c:0111:00000000deadbeef";

        save_config(&path, [125, 0], 0, 10, uid).expect("save");

        let settings = Settings::load(&path).expect("load saved config");
        assert_eq!(settings.ls_keys, [125, 0]);
        assert_eq!(settings.blacklist, vec![uid.to_string()]);
    }
}

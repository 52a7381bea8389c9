//! The synthetic keyboard used to inject the replay.
//!
//! One process-wide uinput device with a fixed identity. The identity
//! matters twice: its UID goes straight onto the blacklist so the replay
//! cannot feed back into the buffer, and it must stay stable across
//! versions so existing blacklists keep matching.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, Key};
use thiserror::Error;

use crate::uid::device_uid;

pub const VIRTUAL_KEYBOARD_NAME: &str = "Easy Switcher virtual keyboard";
const BUS_VIRTUAL: u16 = 0x06; // matches BusType::BUS_VIRTUAL
const VENDOR: u16 = 0x0777;
const PRODUCT: u16 = 0x0777;
const VERSION: u16 = 1;

/// Default pause after each injected event, in milliseconds.
pub const DEFAULT_DELAY_MS: u64 = 10;

// The node appears asynchronously after device creation; poll up to ~10 s.
const NODE_POLL_ATTEMPTS: u32 = 100;
const NODE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum VkbdError {
    #[error("failed to initialize virtual keyboard: {0}")]
    Create(#[source] std::io::Error),
    #[error("failed to emit key event: {0}")]
    Emit(#[source] std::io::Error),
    #[error("timed out waiting for virtual keyboard to be ready")]
    NodeTimeout,
}

pub struct VirtualKeyboard {
    device: VirtualDevice,
    /// Pause after each injected event. Tuned by the user when the
    /// desktop environment mangles the replay order.
    pub delay: Duration,
}

impl VirtualKeyboard {
    /// Creates the device, advertising every key code in `0..=255`, and
    /// waits for its node to become visible on the filesystem.
    pub fn create(delay: Duration) -> Result<Self, VkbdError> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 0..=255u16 {
            keys.insert(Key::new(code));
        }

        let mut device = VirtualDeviceBuilder::new()
            .map_err(VkbdError::Create)?
            .name(VIRTUAL_KEYBOARD_NAME)
            .input_id(InputId::new(
                BusType::BUS_VIRTUAL,
                VENDOR,
                PRODUCT,
                VERSION,
            ))
            .with_keys(&keys)
            .map_err(VkbdError::Create)?
            .build()
            .map_err(VkbdError::Create)?;

        wait_for_node(&mut device)?;

        Ok(VirtualKeyboard { device, delay })
    }

    /// The blacklist entry for this device, derived exactly like a real
    /// device's UID from the fixed identity.
    #[must_use]
    pub fn uid(&self) -> String {
        device_uid(BUS_VIRTUAL, VENDOR, PRODUCT, VERSION, VIRTUAL_KEYBOARD_NAME)
    }

    /// Writes one key event (the device appends the synchronisation
    /// report), then sleeps for the configured delay so the desktop
    /// environment observes events in order.
    pub fn emit_key(&mut self, code: u16, value: i32) -> Result<(), VkbdError> {
        let event = InputEvent::new(EventType::KEY, code, value);
        self.device.emit(&[event]).map_err(VkbdError::Emit)?;

        thread::sleep(self.delay);
        Ok(())
    }
}

/// Polls until the created node exists on the filesystem.
fn wait_for_node(device: &mut VirtualDevice) -> Result<(), VkbdError> {
    for _ in 0..NODE_POLL_ATTEMPTS {
        let node: Option<PathBuf> = device
            .enumerate_dev_nodes_blocking()
            .ok()
            .and_then(|mut nodes| nodes.next())
            .and_then(Result::ok);
        if let Some(path) = node {
            if path.exists() {
                return Ok(());
            }
        }
        thread::sleep(NODE_POLL_INTERVAL);
    }
    Err(VkbdError::NodeTimeout)
}

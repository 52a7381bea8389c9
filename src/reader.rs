//! Open input devices and the key-event stream they produce.
//!
//! The reader owns every open device, keyed by file descriptor. A device
//! is accepted only if it advertises key events and carries at least the
//! `A` key or the left mouse button, i.e. some keyboard or a pointer whose
//! clicks must invalidate the buffer. Everything else (LEDs, joysticks,
//! lid switches) is refused with a diagnostic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::ErrorKind;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use evdev::{Device, EventType, Key};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use thiserror::Error;

use crate::uid::device_uid;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("failed to open device {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("device {path} is not a keyboard or mouse")]
    NotKeyboardOrMouse { path: PathBuf },
    #[error("device is blacklisted, {name}, UID={uid}")]
    Blacklisted { name: String, uid: String },
    #[error("device not found: {path}")]
    DeviceNotFound { path: PathBuf },
}

struct DeviceRecord {
    dev: Device,
    path: PathBuf,
    uid: String,
    name: String,
    pending: VecDeque<(u16, i32)>,
}

#[derive(Default)]
pub struct InputReader {
    devices: HashMap<RawFd, DeviceRecord>,
    blacklist: HashSet<String>,
}

impl InputReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens and probes a device node. On success the device joins the
    /// map and its fd is returned for event-loop registration.
    pub fn add_device(&mut self, path: &Path) -> Result<RawFd, ReaderError> {
        let dev = Device::open(path).map_err(|source| ReaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        // evdev opens blocking; all reads must go through the readiness
        // loop, so flip the fd to non-blocking.
        let fd = dev.as_raw_fd();
        let _ = fcntl(fd, FcntlArg::F_GETFL).and_then(|flags| {
            fcntl(
                fd,
                FcntlArg::F_SETFL(OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK),
            )
        });

        let has_keys = dev.supported_events().contains(EventType::KEY);
        let looks_usable = dev
            .supported_keys()
            .is_some_and(|keys| keys.contains(Key::KEY_A) || keys.contains(Key::BTN_LEFT));
        if !(has_keys && looks_usable) {
            return Err(ReaderError::NotKeyboardOrMouse {
                path: path.to_path_buf(),
            });
        }

        let name = dev.name().unwrap_or("").to_string();
        let id = dev.input_id();
        let uid = device_uid(
            id.bus_type().0,
            id.vendor(),
            id.product(),
            id.version(),
            &name,
        );

        if self.blacklist.contains(&uid) {
            return Err(ReaderError::Blacklisted { name, uid });
        }

        self.devices.insert(
            fd,
            DeviceRecord {
                dev,
                path: path.to_path_buf(),
                uid,
                name,
                pending: VecDeque::new(),
            },
        );
        Ok(fd)
    }

    /// Closes and forgets the device at `path`.
    pub fn remove_device(&mut self, path: &Path) -> Result<(), ReaderError> {
        let fd = self
            .get_device_fd(path)
            .ok_or_else(|| ReaderError::DeviceNotFound {
                path: path.to_path_buf(),
            })?;
        // Dropping the record closes the fd.
        self.devices.remove(&fd);
        Ok(())
    }

    /// Pops the next key event for `fd`, refilling the pending queue from
    /// the device when it runs dry. Only `EV_KEY` events are kept; the
    /// evdev fetch folds the kernel's dropped-event re-sync into the same
    /// iterator, so a `SYN_DROPPED` burst is drained transparently.
    pub fn fetch(&mut self, fd: RawFd) -> Option<(u16, i32)> {
        let record = self.devices.get_mut(&fd)?;

        if record.pending.is_empty() {
            match record.dev.fetch_events() {
                Ok(events) => {
                    for event in events {
                        if event.event_type() == EventType::KEY {
                            record.pending.push_back((event.code(), event.value()));
                        }
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                Err(err) => {
                    tracing::debug!("read from {} failed: {err}", record.path.display());
                }
            }
        }

        record.pending.pop_front()
    }

    /// Drains every device to end-of-stream, discarding everything.
    /// Called after a replay so the injected events do not loop back into
    /// the buffer.
    pub fn flush(&mut self) {
        for record in self.devices.values_mut() {
            record.pending.clear();
            while let Ok(events) = record.dev.fetch_events() {
                for _ in events {}
            }
        }
    }

    pub fn add_to_blacklist(&mut self, uid: impl Into<String>) {
        self.blacklist.insert(uid.into());
    }

    pub fn get_device_fd(&self, path: &Path) -> Option<RawFd> {
        self.devices
            .iter()
            .find(|(_, record)| record.path == path)
            .map(|(&fd, _)| fd)
    }

    pub fn get_device_uid(&self, fd: RawFd) -> Option<&str> {
        self.devices.get(&fd).map(|record| record.uid.as_str())
    }

    pub fn get_device_name(&self, fd: RawFd) -> Option<&str> {
        self.devices.get(&fd).map(|record| record.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

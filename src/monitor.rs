//! Hot-plug discovery of input devices.
//!
//! Watches the input device directory with inotify and queues
//! `(path, connected)` events. Devices already present when the watch is
//! set up are queued as synthetic connected events, so startup and
//! hot-plug take the same path through the daemon.

use std::collections::VecDeque;
use std::os::fd::AsFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
use thiserror::Error;

/// Directory the daemon watches in production.
pub const INPUT_DEVICE_DIR: &str = "/dev/input";

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to initialize inotify: {0}")]
    Init(#[source] nix::Error),
    #[error("failed to watch {dir}: {source}")]
    Watch { dir: PathBuf, source: nix::Error },
    #[error("failed to read input devices directory {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        source: std::io::Error,
    },
}

pub struct DeviceMonitor {
    inotify: Inotify,
    dir: PathBuf,
    queue: VecDeque<(PathBuf, bool)>,
}

impl DeviceMonitor {
    /// Sets up a non-blocking watch on `dir` and queues every existing
    /// `event*` entry as connected.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let dir = dir.as_ref().to_path_buf();

        let inotify = Inotify::init(InitFlags::IN_NONBLOCK).map_err(MonitorError::Init)?;
        inotify
            .add_watch(dir.as_path(), AddWatchFlags::IN_CREATE | AddWatchFlags::IN_DELETE)
            .map_err(|source| MonitorError::Watch {
                dir: dir.clone(),
                source,
            })?;

        let mut queue = VecDeque::new();
        let entries = std::fs::read_dir(&dir).map_err(|source| MonitorError::ReadDir {
            dir: dir.clone(),
            source,
        })?;
        for entry in entries.flatten() {
            if is_event_node(&entry.file_name()) {
                queue.push_back((entry.path(), true));
            }
        }

        Ok(DeviceMonitor {
            inotify,
            dir,
            queue,
        })
    }

    /// The watch descriptor to register with the event loop.
    pub fn fd(&self) -> RawFd {
        self.inotify.as_fd().as_raw_fd()
    }

    /// Pops the oldest pending event. When the queue is empty, pending
    /// inotify notifications are drained first; `None` means nothing is
    /// pending at all.
    pub fn fetch(&mut self) -> Option<(PathBuf, bool)> {
        if self.queue.is_empty() {
            match self.inotify.read_events() {
                Ok(events) => {
                    for event in events {
                        let created = event.mask.contains(AddWatchFlags::IN_CREATE);
                        let deleted = event.mask.contains(AddWatchFlags::IN_DELETE);
                        if !(created || deleted) || event.mask.contains(AddWatchFlags::IN_ISDIR) {
                            continue;
                        }
                        if let Some(name) = &event.name {
                            if is_event_node(name) {
                                self.queue.push_back((self.dir.join(name), created));
                            }
                        }
                    }
                }
                Err(Errno::EAGAIN) => {}
                Err(err) => {
                    tracing::debug!("inotify read failed: {err}");
                }
            }
        }

        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

fn is_event_node(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with("event"))
}

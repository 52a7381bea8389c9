//! Single-threaded readiness multiplexer.
//!
//! One epoll instance owns every file descriptor the daemon cares about.
//! Callbacks are registered per fd and run synchronously, in readiness
//! order, when their fd becomes readable. A non-blocking self-pipe acts as
//! the stop signaller: its write end can be handed to an async signal
//! handler, and a single byte written there ends the loop.
//!
//! Callbacks may not touch the loop directly while it is dispatching;
//! instead they receive a [`LoopCtl`] that queues handler additions,
//! removals and a stop request. Queued changes are applied between
//! readiness batches, so every callback of the current batch runs against
//! the registration set it started with.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::fd::BorrowedFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use thiserror::Error;

const MAX_BATCH: usize = 512;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("failed to initialize event loop: {0}")]
    Create(#[source] nix::Error),
    #[error("failed to create stop signaller: {0}")]
    StopPipe(#[source] std::io::Error),
    #[error("failed to register fd {fd}: {source}")]
    Register { fd: RawFd, source: nix::Error },
    #[error("event wait failed: {0}")]
    Wait(#[source] nix::Error),
}

/// A read-readiness callback. Receives the shared context, the deferred
/// loop-control handle and the fd that became ready.
pub type Callback<C> = Box<dyn FnMut(&mut C, &mut LoopCtl<C>, RawFd)>;

enum LoopOp<C> {
    Add(RawFd, Callback<C>),
    Remove(RawFd),
}

/// Deferred loop mutations requested from inside callbacks.
pub struct LoopCtl<C> {
    ops: Vec<LoopOp<C>>,
    stop: bool,
}

impl<C> LoopCtl<C> {
    fn new() -> Self {
        LoopCtl {
            ops: Vec::new(),
            stop: false,
        }
    }

    /// Registers `cb` for `fd` once the current batch completes.
    pub fn add_handler(&mut self, fd: RawFd, cb: Callback<C>) {
        self.ops.push(LoopOp::Add(fd, cb));
    }

    /// Unregisters `fd` once the current batch completes.
    pub fn remove_handler(&mut self, fd: RawFd) {
        self.ops.push(LoopOp::Remove(fd));
    }

    /// Ends the loop once the current batch completes.
    pub fn stop(&mut self) {
        self.stop = true;
    }
}

pub struct EventLoop<C> {
    epoll: Epoll,
    stop_rx: UnixStream,
    stop_tx: UnixStream,
    handlers: HashMap<RawFd, Callback<C>>,
}

impl<C> EventLoop<C> {
    pub fn new() -> Result<Self, LoopError> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(LoopError::Create)?;

        let (stop_rx, stop_tx) = UnixStream::pair().map_err(LoopError::StopPipe)?;
        stop_rx.set_nonblocking(true).map_err(LoopError::StopPipe)?;
        stop_tx.set_nonblocking(true).map_err(LoopError::StopPipe)?;

        let rx_fd = stop_rx.as_raw_fd();
        epoll
            .add(&stop_rx, EpollEvent::new(EpollFlags::EPOLLIN, rx_fd as u64))
            .map_err(|source| LoopError::Register { fd: rx_fd, source })?;

        Ok(EventLoop {
            epoll,
            stop_rx,
            stop_tx,
            handlers: HashMap::new(),
        })
    }

    /// Registers a read-readiness callback for `fd`. The fd stays owned by
    /// the caller; unregister before closing it (a closed fd drops out of
    /// the epoll set by itself, so a missed removal is not fatal).
    pub fn add_handler(&mut self, fd: RawFd, cb: Callback<C>) -> Result<(), LoopError> {
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        self.epoll
            .add(borrowed, EpollEvent::new(EpollFlags::EPOLLIN, fd as u64))
            .map_err(|source| LoopError::Register { fd, source })?;
        self.handlers.insert(fd, cb);
        Ok(())
    }

    /// Unregisters `fd`. Idempotent; unknown fds are ignored.
    pub fn remove_handler(&mut self, fd: RawFd) {
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let _ = self.epoll.delete(borrowed);
        self.handlers.remove(&fd);
    }

    /// The write end of the stop signaller, for
    /// `signal_hook::low_level::pipe` registration.
    pub fn stop_fd(&self) -> RawFd {
        self.stop_tx.as_raw_fd()
    }

    /// Requests the loop to finish. A single non-blocking write; safe to
    /// call from signal context via the raw fd, and from callbacks.
    pub fn stop(&self) {
        let _ = (&self.stop_tx).write(&[1u8]);
    }

    /// Blocks on readiness and dispatches callbacks until stopped.
    ///
    /// `timeout_ms < 0` waits forever. A timeout that expires with nothing
    /// ready ends the loop normally. Interrupted waits are retried. When
    /// the stop signaller fires, it is drained and the loop returns
    /// without running the remainder of the batch.
    pub fn run(&mut self, ctx: &mut C, timeout_ms: i32) -> Result<(), LoopError> {
        let timeout = if timeout_ms < 0 {
            EpollTimeout::NONE
        } else {
            EpollTimeout::from(timeout_ms.min(i32::from(u16::MAX)) as u16)
        };

        let mut ready = [EpollEvent::empty(); MAX_BATCH];
        let stop_fd = self.stop_rx.as_raw_fd();

        loop {
            let count = match self.epoll.wait(&mut ready, timeout) {
                Ok(count) => count,
                Err(Errno::EINTR) => continue,
                Err(err) => return Err(LoopError::Wait(err)),
            };

            if count == 0 {
                // Timed out with nothing ready.
                return Ok(());
            }

            let mut ctl = LoopCtl::new();
            let mut stopped = false;

            for event in &ready[..count] {
                let fd = event.data() as RawFd;
                if fd == stop_fd {
                    self.drain_stop();
                    stopped = true;
                    break;
                }
                if let Some(cb) = self.handlers.get_mut(&fd) {
                    cb(ctx, &mut ctl, fd);
                }
            }

            stopped |= ctl.stop;
            self.apply(ctl);

            if stopped {
                return Ok(());
            }
        }
    }

    fn apply(&mut self, ctl: LoopCtl<C>) {
        for op in ctl.ops {
            match op {
                LoopOp::Add(fd, cb) => {
                    if let Err(err) = self.add_handler(fd, cb) {
                        tracing::warn!("failed to register fd {fd}: {err}");
                    }
                }
                LoopOp::Remove(fd) => self.remove_handler(fd),
            }
        }
    }

    fn drain_stop(&mut self) {
        let mut buf = [0u8; 16];
        while matches!((&self.stop_rx).read(&mut buf), Ok(n) if n > 0) {}
    }
}

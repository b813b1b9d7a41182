use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InterruptError {
    #[error("failed to create interrupt pipe: {0}")]
    Pipe(nix::Error),
    #[error("failed to poll file descriptor: {0}")]
    Poll(nix::Error),
    #[error("failed to read file descriptor: {0}")]
    Read(nix::Error),
}

/// Blocking wait on a file descriptor that another thread can unblock.
///
/// An internal pipe is polled alongside the target descriptor; `interrupt`
/// writes a byte into the pipe. Once interrupted, every further wait or read
/// fails. Used for the signal descriptor in the main thread (so fatal USB
/// errors can break it out of its wait) and for the uinput event readers.
pub struct InterruptibleReader {
    target: RawFd,
    pipe_read: OwnedFd,
    pipe_write: OwnedFd,
    interrupted: AtomicBool,
}

impl InterruptibleReader {
    /// Wraps the given descriptor. The caller keeps ownership of `target` and
    /// must keep it open for the lifetime of the reader.
    pub fn new(target: RawFd) -> Result<Self, InterruptError> {
        let (pipe_read, pipe_write) = unistd::pipe().map_err(InterruptError::Pipe)?;

        Ok(Self {
            target,
            pipe_read,
            pipe_write,
            interrupted: AtomicBool::new(false),
        })
    }

    /// Unblocks a pending or future wait from another thread.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);

        if let Err(e) = unistd::write(&self.pipe_write, &[1u8]) {
            log::error!("Failed to write interrupt byte: {e}");
        }
    }

    /// Waits until the wrapped descriptor is readable. Returns `false` once
    /// the reader has been interrupted.
    pub fn wait(&self) -> Result<bool, InterruptError> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let target = unsafe { BorrowedFd::borrow_raw(self.target) };
        let mut fds = [
            PollFd::new(self.pipe_read.as_fd(), PollFlags::POLLIN),
            PollFd::new(target, PollFlags::POLLIN),
        ];

        poll(&mut fds, PollTimeout::NONE).map_err(InterruptError::Poll)?;

        if fds[0]
            .revents()
            .is_some_and(|flags| flags.contains(PollFlags::POLLIN))
        {
            self.interrupted.store(true, Ordering::SeqCst);

            return Ok(false);
        }

        Ok(fds[1]
            .revents()
            .is_some_and(|flags| flags.contains(PollFlags::POLLIN)))
    }

    /// Waits for data and reads it into `buf`. Returns `false` once the
    /// reader has been interrupted.
    pub fn read(&self, buf: &mut [u8]) -> Result<bool, InterruptError> {
        if !self.wait()? {
            return Ok(false);
        }

        let target = unsafe { BorrowedFd::borrow_raw(self.target) };
        let count = unistd::read(target, buf).map_err(InterruptError::Read)?;

        Ok(count == buf.len())
    }
}

impl AsRawFd for InterruptibleReader {
    fn as_raw_fd(&self) -> RawFd {
        self.target
    }
}

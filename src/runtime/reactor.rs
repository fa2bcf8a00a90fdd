// src/runtime/reactor.rs

use crate::error::ZmqError;

use bitflags::bitflags;
use std::os::fd::RawFd;

/// Registration token handed out by a reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub(crate) usize);

impl Handle {
  pub fn id(&self) -> usize {
    self.0
  }
}

bitflags! {
    /// Readiness a registered descriptor is subscribed to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Interest: u8 {
        const POLLIN = 0b01;
        const POLLOUT = 0b10;
    }
}

/// Single-threaded readiness dispatcher an engine plugs into.
///
/// Registration starts with no interest; the engine subscribes explicitly. The
/// interest toggles never fail from the caller's point of view: an
/// implementation that hits an OS error logs it and the connection stalls
/// until the next toggle.
pub trait Reactor {
  fn register(&self, fd: RawFd) -> Result<Handle, ZmqError>;
  fn deregister(&self, handle: Handle);
  fn set_read_interest(&self, handle: Handle);
  fn clear_read_interest(&self, handle: Handle);
  fn set_write_interest(&self, handle: Handle);
  fn clear_write_interest(&self, handle: Handle);
}

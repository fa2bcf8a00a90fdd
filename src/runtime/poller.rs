// src/runtime/poller.rs

use crate::error::ZmqError;
use crate::runtime::reactor::{Handle, Interest, Reactor};

use mio::unix::SourceFd;
use mio::{Registry, Token};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::os::fd::RawFd;

#[derive(Debug)]
struct Entry {
  fd: RawFd,
  interest: Interest,
  // Whether the fd is currently known to the OS poller. mio cannot hold an
  // empty interest set, so an entry with no interest is deregistered.
  registered: bool,
}

/// [`Reactor`] implementation over a mio registry.
///
/// mio reports readiness edge-triggered. The owning loop calls
/// [`Poller::rearm`] after dispatching a handle so readiness that is still
/// pending fires again, which gives the engine the level-triggered behaviour it
/// expects (one read or write per callback).
pub struct Poller {
  registry: Registry,
  entries: RefCell<HashMap<Handle, Entry>>,
  next_id: Cell<usize>,
}

impl fmt::Debug for Poller {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Poller")
      .field("entries", &self.entries.borrow().len())
      .field("next_id", &self.next_id.get())
      .finish()
  }
}

impl Poller {
  pub fn new(registry: Registry) -> Self {
    Self {
      registry,
      entries: RefCell::new(HashMap::new()),
      next_id: Cell::new(0),
    }
  }

  pub fn token(handle: Handle) -> Token {
    Token(handle.0)
  }

  pub fn handle_for(token: Token) -> Handle {
    Handle(token.0)
  }

  /// Current subscription of a handle, `None` if it is not registered.
  pub fn interest(&self, handle: Handle) -> Option<Interest> {
    self.entries.borrow().get(&handle).map(|entry| entry.interest)
  }

  pub fn len(&self) -> usize {
    self.entries.borrow().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.borrow().is_empty()
  }

  /// Re-submits the current interest so still-pending readiness is reported again.
  pub fn rearm(&self, handle: Handle) {
    let mut entries = self.entries.borrow_mut();
    if let Some(entry) = entries.get_mut(&handle) {
      if entry.registered {
        if let Some(interest) = to_mio(entry.interest) {
          if let Err(e) = self.registry.reregister(&mut SourceFd(&entry.fd), Self::token(handle), interest) {
            tracing::warn!(handle = handle.0, fd = entry.fd, error = %e, "Failed to re-arm registration");
          }
        }
      }
    }
  }

  fn update(&self, handle: Handle, change: impl FnOnce(&mut Interest)) {
    let mut entries = self.entries.borrow_mut();
    let Some(entry) = entries.get_mut(&handle) else {
      tracing::warn!(handle = handle.0, "Interest change for unknown handle");
      return;
    };
    change(&mut entry.interest);
    if let Err(e) = self.sync(handle, entry) {
      tracing::warn!(handle = handle.0, fd = entry.fd, error = %e, "Failed to update poller interest");
    }
  }

  fn sync(&self, handle: Handle, entry: &mut Entry) -> std::io::Result<()> {
    let token = Self::token(handle);
    match (to_mio(entry.interest), entry.registered) {
      (Some(interest), false) => {
        self.registry.register(&mut SourceFd(&entry.fd), token, interest)?;
        entry.registered = true;
      }
      (Some(interest), true) => {
        self.registry.reregister(&mut SourceFd(&entry.fd), token, interest)?;
      }
      (None, true) => {
        self.registry.deregister(&mut SourceFd(&entry.fd))?;
        entry.registered = false;
      }
      (None, false) => {}
    }
    Ok(())
  }
}

fn to_mio(interest: Interest) -> Option<mio::Interest> {
  match (interest.contains(Interest::POLLIN), interest.contains(Interest::POLLOUT)) {
    (true, true) => Some(mio::Interest::READABLE | mio::Interest::WRITABLE),
    (true, false) => Some(mio::Interest::READABLE),
    (false, true) => Some(mio::Interest::WRITABLE),
    (false, false) => None,
  }
}

impl Reactor for Poller {
  fn register(&self, fd: RawFd) -> Result<Handle, ZmqError> {
    if fd < 0 {
      return Err(ZmqError::InvalidArgument(format!("invalid descriptor {}", fd)));
    }
    let handle = Handle(self.next_id.get());
    self.next_id.set(handle.0 + 1);
    self.entries.borrow_mut().insert(
      handle,
      Entry {
        fd,
        interest: Interest::empty(),
        registered: false,
      },
    );
    tracing::trace!(handle = handle.0, fd, "Registered fd");
    Ok(handle)
  }

  fn deregister(&self, handle: Handle) {
    let Some(entry) = self.entries.borrow_mut().remove(&handle) else {
      tracing::warn!(handle = handle.0, "Deregister of unknown handle");
      return;
    };
    if entry.registered {
      if let Err(e) = self.registry.deregister(&mut SourceFd(&entry.fd)) {
        tracing::warn!(handle = handle.0, fd = entry.fd, error = %e, "Failed to deregister fd");
      }
    }
    tracing::trace!(handle = handle.0, fd = entry.fd, "Deregistered fd");
  }

  fn set_read_interest(&self, handle: Handle) {
    self.update(handle, |interest| interest.insert(Interest::POLLIN));
  }

  fn clear_read_interest(&self, handle: Handle) {
    self.update(handle, |interest| interest.remove(Interest::POLLIN));
  }

  fn set_write_interest(&self, handle: Handle) {
    self.update(handle, |interest| interest.insert(Interest::POLLOUT));
  }

  fn clear_write_interest(&self, handle: Handle) {
    self.update(handle, |interest| interest.remove(Interest::POLLOUT));
  }
}

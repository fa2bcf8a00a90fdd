// src/session/pipe.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::options::EngineOptions;
use crate::session::Session;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_SESSION_HANDLE: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Default)]
struct InboundPipe {
  // Written by the decoder but not yet published by flush().
  unflushed: VecDeque<Msg>,
  // Visible to recv().
  ready: VecDeque<Msg>,
}

impl InboundPipe {
  fn len(&self) -> usize {
    self.unflushed.len() + self.ready.len()
  }
}

/// In-memory session with bounded inbound and outbound queues.
///
/// Inbound messages follow the write-then-flush discipline of a ZeroMQ pipe:
/// the decoder writes them, and they become visible to [`PipeSession::recv`]
/// only once the engine flushes.
#[derive(Debug)]
pub struct PipeSession {
  handle: usize,
  rcvhwm: usize,
  sndhwm: usize,
  inbound: RefCell<InboundPipe>,
  outbound: RefCell<VecDeque<Msg>>,
  // Set when a write was refused; cleared by the owner once capacity is back.
  stalled: Cell<bool>,
  detached: Cell<bool>,
  flush_count: Cell<usize>,
}

impl PipeSession {
  pub fn new(options: &EngineOptions) -> Self {
    Self::with_capacity(options.rcvhwm, options.sndhwm)
  }

  pub fn with_capacity(rcvhwm: usize, sndhwm: usize) -> Self {
    Self {
      handle: NEXT_SESSION_HANDLE.fetch_add(1, Ordering::Relaxed),
      rcvhwm,
      sndhwm,
      inbound: RefCell::new(InboundPipe::default()),
      outbound: RefCell::new(VecDeque::new()),
      stalled: Cell::new(false),
      detached: Cell::new(false),
      flush_count: Cell::new(0),
    }
  }

  pub fn handle(&self) -> usize {
    self.handle
  }

  /// Queues a message for the engine to send.
  pub fn send(&self, msg: Msg) -> Result<(), ZmqError> {
    if self.detached.get() {
      return Err(ZmqError::ConnectionClosed);
    }
    let mut outbound = self.outbound.borrow_mut();
    if outbound.len() >= self.sndhwm {
      tracing::trace!(handle = self.handle, sndhwm = self.sndhwm, "Outbound queue full");
      return Err(ZmqError::ResourceLimitReached);
    }
    outbound.push_back(msg);
    Ok(())
  }

  /// Takes the next flushed inbound message.
  ///
  /// This does not resume a stalled engine. Owners draining the session
  /// directly must follow up with `Engine::activate_in` once
  /// [`PipeSession::take_reader_wakeup`] says so; `IoThread::recv` does both.
  pub fn recv(&self) -> Option<Msg> {
    self.inbound.borrow_mut().ready.pop_front()
  }

  /// Returns true once, after a refused write, as soon as the inbound pipe has room again.
  /// The owner answers it with `Engine::activate_in`.
  pub fn take_reader_wakeup(&self) -> bool {
    if self.stalled.get() && self.inbound.borrow().len() < self.rcvhwm {
      self.stalled.set(false);
      return true;
    }
    false
  }

  pub fn is_detached(&self) -> bool {
    self.detached.get()
  }

  pub fn has_outbound(&self) -> bool {
    !self.outbound.borrow().is_empty()
  }

  /// Number of flushed messages waiting for `recv`.
  pub fn ready_len(&self) -> usize {
    self.inbound.borrow().ready.len()
  }

  /// Number of written messages still waiting for a flush.
  pub fn unflushed_len(&self) -> usize {
    self.inbound.borrow().unflushed.len()
  }

  pub fn flush_count(&self) -> usize {
    self.flush_count.get()
  }
}

impl Session for PipeSession {
  fn write(&self, msg: Msg) -> Result<(), Msg> {
    let mut inbound = self.inbound.borrow_mut();
    if inbound.len() >= self.rcvhwm {
      self.stalled.set(true);
      return Err(msg);
    }
    inbound.unflushed.push_back(msg);
    Ok(())
  }

  fn read(&self) -> Option<Msg> {
    self.outbound.borrow_mut().pop_front()
  }

  fn flush(&self) {
    self.flush_count.set(self.flush_count.get() + 1);
    let mut inbound = self.inbound.borrow_mut();
    let InboundPipe { unflushed, ready } = &mut *inbound;
    if !unflushed.is_empty() {
      tracing::trace!(handle = self.handle, count = unflushed.len(), "Publishing inbound messages");
      ready.extend(unflushed.drain(..));
    }
  }

  fn detach(&self) {
    tracing::debug!(handle = self.handle, "Session detached by its engine");
    self.detached.set(true);
  }
}

// src/runtime/io_thread.rs

use crate::engine::{Engine, EngineStatus};
use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::poller::Poller;
use crate::runtime::reactor::{Handle, Interest};
use crate::session::PipeSession;

use mio::{Events, Poll};
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::time::Duration;

const EVENTS_CAPACITY: usize = 256;

/// An attached connection: the engine plus the session it feeds.
#[derive(Debug)]
struct Connection {
  engine: Engine,
  session: Rc<PipeSession>,
}

/// Single-threaded event loop owning a mio poll, its [`Poller`] and the
/// engines plugged into it.
///
/// The loop is the engines' owner: when an entry point reports
/// [`EngineStatus::Errored`] the connection is removed and the engine dropped.
/// Sessions are shared with the caller, so messages already flushed to a
/// detached session stay readable through the caller's `Rc<PipeSession>`.
pub struct IoThread {
  poll: Poll,
  events: Events,
  poller: Rc<Poller>,
  connections: HashMap<Handle, Connection>,
}

impl std::fmt::Debug for IoThread {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("IoThread")
      .field("poller", &self.poller)
      .field("connections", &self.connections.len())
      .finish()
  }
}

impl IoThread {
  pub fn new() -> Result<Self, ZmqError> {
    let poll = Poll::new()?;
    let registry = poll.registry().try_clone()?;
    Ok(Self {
      poll,
      events: Events::with_capacity(EVENTS_CAPACITY),
      poller: Rc::new(Poller::new(registry)),
      connections: HashMap::new(),
    })
  }

  pub fn poller(&self) -> Rc<Poller> {
    self.poller.clone()
  }

  /// Plugs `engine` into this loop, bound to `session`.
  ///
  /// Fails with `ConnectionClosed` if the engine dies during its initial input pass.
  pub fn attach(&mut self, mut engine: Engine, session: Rc<PipeSession>) -> Result<Handle, ZmqError> {
    let status = engine.plug(self.poller.clone(), session.clone())?;
    if let EngineStatus::Errored(reason) = status {
      tracing::info!(session = session.handle(), ?reason, "Engine failed while plugging");
      return Err(ZmqError::ConnectionClosed);
    }
    let handle = engine
      .handle()
      .ok_or_else(|| ZmqError::Internal("plugged engine has no handle".into()))?;
    tracing::debug!(handle = handle.id(), session = session.handle(), "Connection attached");
    self.connections.insert(handle, Connection { engine, session });
    Ok(handle)
  }

  pub fn is_attached(&self, handle: Handle) -> bool {
    self.connections.contains_key(&handle)
  }

  pub fn connection_count(&self) -> usize {
    self.connections.len()
  }

  /// Waits for readiness once and dispatches it. Returns the number of events handled.
  ///
  /// Events are dispatched only for the interest a handle currently holds. A
  /// connection whose input is paused by backpressure therefore does not see a
  /// peer close or socket error until [`IoThread::recv`] frees room and resumes
  /// input; the failure is picked up by that resumed pass.
  pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<usize, ZmqError> {
    match self.poll.poll(&mut self.events, timeout) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(0),
      Err(e) => return Err(e.into()),
    }

    let ready: Vec<(Handle, bool, bool)> = self
      .events
      .iter()
      .map(|event| {
        let readable = event.is_readable() || event.is_read_closed() || event.is_error();
        let writable = event.is_writable() || event.is_write_closed();
        (Poller::handle_for(event.token()), readable, writable)
      })
      .collect();

    let mut dispatched = 0;
    for (handle, readable, writable) in ready {
      // A connection closed earlier in this batch may still have events queued.
      let Some(connection) = self.connections.get_mut(&handle) else {
        tracing::trace!(handle = handle.id(), "Event for detached handle dropped");
        continue;
      };
      dispatched += 1;

      let mut status = EngineStatus::Alive;
      if readable && self.poller.interest(handle).is_some_and(|i| i.contains(Interest::POLLIN)) {
        status = connection.engine.on_readable();
      }
      if status.is_alive() && writable && self.poller.interest(handle).is_some_and(|i| i.contains(Interest::POLLOUT)) {
        status = connection.engine.on_writable();
      }
      self.settle(handle, status);
    }
    Ok(dispatched)
  }

  /// Queues `msg` on the connection's session and writes speculatively.
  pub fn send(&mut self, handle: Handle, msg: Msg) -> Result<(), ZmqError> {
    let connection = self.connection_mut(handle)?;
    connection.session.send(msg)?;
    let status = connection.engine.activate_out();
    self.settle(handle, status);
    Ok(())
  }

  /// Takes the next inbound message, resuming input if this freed room for a stalled decoder.
  pub fn recv(&mut self, handle: Handle) -> Result<Option<Msg>, ZmqError> {
    let connection = self.connection_mut(handle)?;
    let msg = connection.session.recv();
    if connection.session.take_reader_wakeup() {
      tracing::trace!(handle = handle.id(), "Inbound pipe has room again, resuming input");
      let status = connection.engine.activate_in();
      self.settle(handle, status);
    }
    Ok(msg)
  }

  /// Unplugs a connection and hands it back, e.g. to plug it into another loop.
  pub fn detach(&mut self, handle: Handle) -> Result<(Engine, Rc<PipeSession>), ZmqError> {
    let Connection { mut engine, session } = self.connections.remove(&handle).ok_or(ZmqError::UnknownHandle(handle.id()))?;
    engine.unplug()?;
    tracing::debug!(handle = handle.id(), "Connection detached");
    Ok((engine, session))
  }

  /// Orderly close of one connection.
  pub fn close(&mut self, handle: Handle) -> Result<(), ZmqError> {
    let connection = self.connections.remove(&handle).ok_or(ZmqError::UnknownHandle(handle.id()))?;
    tracing::debug!(handle = handle.id(), "Closing connection");
    connection.engine.terminate()
  }

  fn connection_mut(&mut self, handle: Handle) -> Result<&mut Connection, ZmqError> {
    self
      .connections
      .get_mut(&handle)
      .ok_or(ZmqError::UnknownHandle(handle.id()))
  }

  /// Drops dead engines, re-arms live ones.
  fn settle(&mut self, handle: Handle, status: EngineStatus) {
    match status {
      EngineStatus::Alive => self.poller.rearm(handle),
      EngineStatus::Errored(reason) => {
        if let Some(connection) = self.connections.remove(&handle) {
          tracing::info!(
            handle = handle.id(),
            session = connection.session.handle(),
            ?reason,
            "Connection failed, dropping engine"
          );
        }
      }
    }
  }
}

// src/engine/core.rs

use crate::engine::{EngineStatus, Termination};
use crate::error::ZmqError;
use crate::options::EngineOptions;
use crate::protocol::zmtp::{ZmtpDecoder, ZmtpEncoder};
use crate::protocol::{Decoder, Encoder, Window};
use crate::runtime::{Handle, Reactor};
use crate::session::Session;
use crate::transport::{ReadOutcome, TransportSocket};

use std::fmt;
use std::mem;
use std::os::fd::RawFd;
use std::rc::Rc;

// Callbacks for one engine all run on the reactor thread that owns it.
static_assertions::assert_not_impl_any!(Engine: Send, Sync);

/// Live registration: present exactly while plugged.
struct Plug {
  reactor: Rc<dyn Reactor>,
  handle: Handle,
  session: Rc<dyn Session>,
}

/// What the engine is currently bound to. Live session and drain target are
/// separate variants, so at most one of them exists at a time.
enum Binding {
  Unplugged,
  Plugged(Plug),
  /// Unplugged, but the session it was bound to still gets one final flush.
  Draining(Rc<dyn Session>),
  Errored(Termination),
}

/// Moves bytes between one connected socket and one session.
///
/// The engine owns its transport and codecs for its whole life. A reactor and a
/// session are attached with [`Engine::plug`] and released with
/// [`Engine::unplug`]; the read and write cursors are windows into the codec
/// buffers and survive an unplug/plug cycle.
pub struct Engine {
  fd: RawFd,
  transport: Box<dyn TransportSocket>,
  decoder: Box<dyn Decoder>,
  encoder: Box<dyn Encoder>,
  inbound: Window,
  outbound: Window,
  binding: Binding,
}

impl fmt::Debug for Engine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Engine")
      .field("fd", &self.fd)
      .field("handle", &self.handle())
      .field("inbound", &self.inbound)
      .field("outbound", &self.outbound)
      .field("status", &self.status())
      .finish_non_exhaustive()
  }
}

impl Engine {
  pub fn new(transport: Box<dyn TransportSocket>, decoder: Box<dyn Decoder>, encoder: Box<dyn Encoder>) -> Self {
    Self {
      fd: transport.raw_fd(),
      transport,
      decoder,
      encoder,
      inbound: Window::EMPTY,
      outbound: Window::EMPTY,
      binding: Binding::Unplugged,
    }
  }

  /// Builds an engine speaking ZMTP/1.0 framing, sized from `options`.
  pub fn with_zmtp(transport: Box<dyn TransportSocket>, options: &EngineOptions) -> Result<Self, ZmqError> {
    options.validate()?;
    Ok(Self::new(
      transport,
      Box::new(ZmtpDecoder::new(options.in_batch_size, options.maxmsgsize)),
      Box::new(ZmtpEncoder::new(options.out_batch_size)),
    ))
  }

  pub fn is_plugged(&self) -> bool {
    matches!(self.binding, Binding::Plugged(_))
  }

  /// Reactor handle, valid only while plugged.
  pub fn handle(&self) -> Option<Handle> {
    match &self.binding {
      Binding::Plugged(plug) => Some(plug.handle),
      _ => None,
    }
  }

  pub fn status(&self) -> EngineStatus {
    match self.binding {
      Binding::Errored(reason) => EngineStatus::Errored(reason),
      _ => EngineStatus::Alive,
    }
  }

  /// Read bytes the decoder has not taken yet.
  pub fn pending_input(&self) -> usize {
    self.inbound.len
  }

  /// Encoded bytes the socket has not taken yet.
  pub fn pending_output(&self) -> usize {
    self.outbound.len
  }

  /// Attaches the engine to a reactor and a session, then runs one input pass
  /// for data that may have arrived before registration.
  pub fn plug(&mut self, reactor: Rc<dyn Reactor>, session: Rc<dyn Session>) -> Result<EngineStatus, ZmqError> {
    match self.binding {
      Binding::Plugged(_) => return Err(ZmqError::InvalidState("engine is already plugged")),
      Binding::Errored(_) => return Err(ZmqError::InvalidState("engine has failed")),
      Binding::Unplugged | Binding::Draining(_) => {}
    }

    let handle = reactor.register(self.fd)?;
    reactor.set_read_interest(handle);
    reactor.set_write_interest(handle);

    self.encoder.bind(Some(session.clone()));
    self.decoder.bind(Some(session.clone()));
    // Replacing the binding also discards any drain target left from a previous unplug.
    self.binding = Binding::Plugged(Plug {
      reactor,
      handle,
      session,
    });
    tracing::debug!(fd = self.fd, handle = handle.id(), "Engine plugged");

    Ok(self.on_readable())
  }

  /// Detaches from reactor and session. Codecs and cursors are kept, and the
  /// session stays reachable for one final flush.
  pub fn unplug(&mut self) -> Result<(), ZmqError> {
    match mem::replace(&mut self.binding, Binding::Unplugged) {
      Binding::Plugged(plug) => {
        plug.reactor.deregister(plug.handle);
        self.encoder.bind(None);
        self.decoder.bind(None);
        tracing::debug!(fd = self.fd, handle = plug.handle.id(), "Engine unplugged");
        self.binding = Binding::Draining(plug.session);
        Ok(())
      }
      other => {
        self.binding = other;
        Err(ZmqError::InvalidState("engine is not plugged"))
      }
    }
  }

  /// Orderly shutdown: unplug, then drop.
  pub fn terminate(mut self) -> Result<(), ZmqError> {
    let result = self.unplug();
    tracing::debug!(fd = self.fd, "Engine terminated");
    result
  }

  /// Abnormal shutdown requested by the owner: detach the session, unplug, drop.
  pub fn error(mut self) -> Result<(), ZmqError> {
    if !self.is_plugged() {
      return Err(ZmqError::InvalidState("error() requires a bound session"));
    }
    match self.fail(Termination::Aborted) {
      EngineStatus::Errored(reason) => {
        tracing::debug!(fd = self.fd, ?reason, "Engine aborted by owner");
        Ok(())
      }
      EngineStatus::Alive => Err(ZmqError::Internal("engine survived error()".into())),
    }
  }

  /// Re-subscribes read readiness and tries to make progress right away.
  pub fn activate_in(&mut self) -> EngineStatus {
    match &self.binding {
      Binding::Plugged(plug) => plug.reactor.set_read_interest(plug.handle),
      Binding::Errored(reason) => return EngineStatus::Errored(*reason),
      Binding::Unplugged | Binding::Draining(_) => {
        tracing::trace!(fd = self.fd, "activate_in on unplugged engine ignored");
        return EngineStatus::Alive;
      }
    }
    self.on_readable()
  }

  /// Re-subscribes write readiness and writes speculatively: a message was
  /// just queued and the socket is most likely writable, so skipping the wait
  /// for the next poll saves a round trip in request/reply traffic.
  pub fn activate_out(&mut self) -> EngineStatus {
    match &self.binding {
      Binding::Plugged(plug) => plug.reactor.set_write_interest(plug.handle),
      Binding::Errored(reason) => return EngineStatus::Errored(*reason),
      Binding::Unplugged | Binding::Draining(_) => {
        tracing::trace!(fd = self.fd, "activate_out on unplugged engine ignored");
        return EngineStatus::Alive;
      }
    }
    self.on_writable()
  }

  /// Input pass: at most one socket read, one decode, one flush.
  pub fn on_readable(&mut self) -> EngineStatus {
    match &self.binding {
      Binding::Plugged(_) | Binding::Draining(_) => {}
      Binding::Unplugged => {
        tracing::trace!(fd = self.fd, "Input event on unplugged engine ignored");
        return EngineStatus::Alive;
      }
      Binding::Errored(reason) => return EngineStatus::Errored(*reason),
    }

    let mut disconnected = false;
    let mut decode_failed = false;

    // Bytes read while draining stay in the unbound decoder for a later plug.
    if self.inbound.is_empty() {
      let window = self.decoder.next_buffer();
      match self.transport.read(self.decoder.region_mut(window)) {
        ReadOutcome::Bytes(n) => {
          tracing::trace!(fd = self.fd, bytes = n, "Read from socket");
          self.inbound = Window::new(window.offset, n);
        }
        ReadOutcome::Closed => {
          tracing::debug!(fd = self.fd, "Peer closed the connection");
          self.inbound = Window::EMPTY;
          disconnected = true;
        }
      }
    }

    match self.decoder.consume(self.inbound) {
      Ok(consumed) => {
        if consumed < self.inbound.len {
          // Downstream is full. Stop polling until the owner calls activate_in.
          if let Binding::Plugged(plug) = &self.binding {
            tracing::trace!(
              fd = self.fd,
              consumed,
              offered = self.inbound.len,
              "Decoder stalled, pausing input"
            );
            plug.reactor.clear_read_interest(plug.handle);
          }
        }
        self.inbound.advance(consumed);
      }
      Err(e) => {
        tracing::warn!(fd = self.fd, error = %ZmqError::from(e), "Malformed data from peer");
        decode_failed = true;
      }
    }

    // One flush per pass keeps delivery batched.
    if matches!(self.binding, Binding::Draining(_)) {
      self.finish_drain();
    } else if let Binding::Plugged(plug) = &self.binding {
      plug.session.flush();
    }

    if decode_failed {
      if self.is_plugged() {
        return self.fail(Termination::DecodeFailed);
      }
    } else if disconnected && self.is_plugged() {
      return self.fail(Termination::Disconnected);
    }
    EngineStatus::Alive
  }

  /// Output pass: refill from the encoder if needed, then at most one socket write.
  pub fn on_writable(&mut self) -> EngineStatus {
    match &self.binding {
      Binding::Plugged(_) | Binding::Draining(_) => {}
      Binding::Unplugged => {
        tracing::trace!(fd = self.fd, "Output event on unplugged engine ignored");
        return EngineStatus::Alive;
      }
      Binding::Errored(reason) => return EngineStatus::Errored(*reason),
    }

    if self.outbound.is_empty() {
      self.outbound = self.encoder.next_chunk();
    }

    // Write interest went away with the reactor binding: flush, never write.
    if matches!(self.binding, Binding::Draining(_)) {
      self.finish_drain();
      return EngineStatus::Alive;
    }

    if self.outbound.is_empty() {
      if let Binding::Plugged(plug) = &self.binding {
        tracing::trace!(fd = self.fd, "Nothing to send, pausing output");
        plug.reactor.clear_write_interest(plug.handle);
      }
      return EngineStatus::Alive;
    }

    match self.transport.write(self.encoder.chunk(self.outbound)) {
      Ok(n) => {
        tracing::trace!(fd = self.fd, bytes = n, remaining = self.outbound.len - n, "Wrote to socket");
        self.outbound.advance(n);
        EngineStatus::Alive
      }
      Err(e) => {
        if e.is_disconnect() {
          tracing::debug!(fd = self.fd, "Peer went away during write");
        } else {
          tracing::warn!(fd = self.fd, error = %e, "Socket write failed");
        }
        self.fail(Termination::WriteFailed)
      }
    }
  }

  /// Final flush to the drain target; afterwards the engine is plainly unplugged.
  fn finish_drain(&mut self) {
    match mem::replace(&mut self.binding, Binding::Unplugged) {
      Binding::Draining(session) => {
        session.flush();
        tracing::debug!(fd = self.fd, "Flushed detached session");
      }
      other => self.binding = other,
    }
  }

  /// Terminal path: notify the session, unplug, and mark the engine dead.
  fn fail(&mut self, reason: Termination) -> EngineStatus {
    let session = match &self.binding {
      Binding::Plugged(plug) => plug.session.clone(),
      _ => return self.status(),
    };
    tracing::info!(fd = self.fd, ?reason, "Engine failed, detaching session");
    session.detach();
    if let Err(e) = self.unplug() {
      tracing::error!(fd = self.fd, error = %e, "Unplug during failure did not succeed");
    }
    self.binding = Binding::Errored(reason);
    EngineStatus::Errored(reason)
  }
}

impl Drop for Engine {
  fn drop(&mut self) {
    if self.is_plugged() {
      tracing::warn!(fd = self.fd, "Engine dropped while plugged, deregistering");
      if let Err(e) = self.unplug() {
        tracing::error!(fd = self.fd, error = %e, "Unplug on drop did not succeed");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::message::Msg;
  use crate::protocol::DecodeError;
  use crate::runtime::Interest;
  use crate::session::PipeSession;

  use std::cell::{Cell, RefCell};
  use std::collections::{HashMap, VecDeque};

  // --- Test doubles ---

  enum ReadStep {
    Data(Vec<u8>),
    Closed,
  }

  #[derive(Default)]
  struct Wire {
    incoming: VecDeque<ReadStep>,
    reads: usize,
    written: Vec<u8>,
    writes: usize,
    write_limit: Option<usize>,
    write_fails: bool,
  }

  struct ScriptedTransport(Rc<RefCell<Wire>>);

  impl TransportSocket for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> ReadOutcome {
      let mut wire = self.0.borrow_mut();
      wire.reads += 1;
      match wire.incoming.pop_front() {
        Some(ReadStep::Data(mut data)) => {
          let n = data.len().min(buf.len());
          buf[..n].copy_from_slice(&data[..n]);
          if n < data.len() {
            wire.incoming.push_front(ReadStep::Data(data.split_off(n)));
          }
          ReadOutcome::Bytes(n)
        }
        Some(ReadStep::Closed) => ReadOutcome::Closed,
        None => ReadOutcome::Bytes(0),
      }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, ZmqError> {
      let mut wire = self.0.borrow_mut();
      wire.writes += 1;
      if wire.write_fails {
        return Err(ZmqError::ConnectionClosed);
      }
      let n = wire.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
      wire.written.extend_from_slice(&buf[..n]);
      Ok(n)
    }

    fn raw_fd(&self) -> RawFd {
      42
    }
  }

  enum ConsumeStep {
    Upto(usize),
    Fatal,
  }

  #[derive(Default)]
  struct Codec {
    steps: VecDeque<ConsumeStep>,
    offered: Vec<Vec<u8>>,
    outgoing: VecDeque<Vec<u8>>,
  }

  /// Consumes per script (everything by default) and emits one message per consumed run.
  struct ScriptedDecoder {
    buffer: Vec<u8>,
    codec: Rc<RefCell<Codec>>,
    sink: Option<Rc<dyn Session>>,
  }

  impl Decoder for ScriptedDecoder {
    fn bind(&mut self, sink: Option<Rc<dyn Session>>) {
      self.sink = sink;
    }

    fn next_buffer(&mut self) -> Window {
      Window::new(0, self.buffer.len())
    }

    fn region_mut(&mut self, window: Window) -> &mut [u8] {
      &mut self.buffer[window.range()]
    }

    fn consume(&mut self, window: Window) -> Result<usize, DecodeError> {
      if window.is_empty() {
        return Ok(0);
      }
      let bytes = self.buffer[window.range()].to_vec();
      let mut codec = self.codec.borrow_mut();
      codec.offered.push(bytes.clone());
      let n = match codec.steps.pop_front() {
        None => bytes.len(),
        Some(ConsumeStep::Upto(limit)) => limit.min(bytes.len()),
        Some(ConsumeStep::Fatal) => return Err(DecodeError::ZeroLength),
      };
      if let Some(sink) = &self.sink {
        if n > 0 {
          let _ = sink.write(Msg::from_vec(bytes[..n].to_vec()));
        }
      }
      Ok(n)
    }
  }

  struct ScriptedEncoder {
    buffer: Vec<u8>,
    codec: Rc<RefCell<Codec>>,
    source: Option<Rc<dyn Session>>,
  }

  impl Encoder for ScriptedEncoder {
    fn bind(&mut self, source: Option<Rc<dyn Session>>) {
      self.source = source;
    }

    fn next_chunk(&mut self) -> Window {
      let queued = self.codec.borrow_mut().outgoing.pop_front();
      self.buffer = match queued {
        Some(chunk) => chunk,
        None => self
          .source
          .as_ref()
          .and_then(|source| source.read())
          .map(|msg| msg.data().to_vec())
          .unwrap_or_default(),
      };
      Window::new(0, self.buffer.len())
    }

    fn chunk(&self, window: Window) -> &[u8] {
      &self.buffer[window.range()]
    }
  }

  #[derive(Default)]
  struct MockReactor {
    next: Cell<usize>,
    interest: RefCell<HashMap<Handle, Interest>>,
    deregistered: RefCell<Vec<Handle>>,
  }

  impl MockReactor {
    fn interest(&self, handle: Handle) -> Option<Interest> {
      self.interest.borrow().get(&handle).copied()
    }

    fn change(&self, handle: Handle, f: impl FnOnce(&mut Interest)) {
      if let Some(interest) = self.interest.borrow_mut().get_mut(&handle) {
        f(interest);
      }
    }
  }

  impl Reactor for MockReactor {
    fn register(&self, _fd: RawFd) -> Result<Handle, ZmqError> {
      let handle = Handle(self.next.get());
      self.next.set(handle.0 + 1);
      self.interest.borrow_mut().insert(handle, Interest::empty());
      Ok(handle)
    }

    fn deregister(&self, handle: Handle) {
      self.interest.borrow_mut().remove(&handle);
      self.deregistered.borrow_mut().push(handle);
    }

    fn set_read_interest(&self, handle: Handle) {
      self.change(handle, |i| i.insert(Interest::POLLIN));
    }

    fn clear_read_interest(&self, handle: Handle) {
      self.change(handle, |i| i.remove(Interest::POLLIN));
    }

    fn set_write_interest(&self, handle: Handle) {
      self.change(handle, |i| i.insert(Interest::POLLOUT));
    }

    fn clear_write_interest(&self, handle: Handle) {
      self.change(handle, |i| i.remove(Interest::POLLOUT));
    }
  }

  struct Harness {
    engine: Engine,
    wire: Rc<RefCell<Wire>>,
    codec: Rc<RefCell<Codec>>,
    reactor: Rc<MockReactor>,
    session: Rc<PipeSession>,
  }

  impl Harness {
    fn new() -> Self {
      let wire = Rc::new(RefCell::new(Wire::default()));
      let codec = Rc::new(RefCell::new(Codec::default()));
      let engine = Engine::new(
        Box::new(ScriptedTransport(wire.clone())),
        Box::new(ScriptedDecoder {
          buffer: vec![0; 32],
          codec: codec.clone(),
          sink: None,
        }),
        Box::new(ScriptedEncoder {
          buffer: Vec::new(),
          codec: codec.clone(),
          source: None,
        }),
      );
      Self {
        engine,
        wire,
        codec,
        reactor: Rc::new(MockReactor::default()),
        session: Rc::new(PipeSession::with_capacity(16, 16)),
      }
    }

    fn incoming(&self, bytes: &[u8]) {
      self.wire.borrow_mut().incoming.push_back(ReadStep::Data(bytes.to_vec()));
    }

    fn plug(&mut self) -> EngineStatus {
      self
        .engine
        .plug(self.reactor.clone(), self.session.clone())
        .expect("plug should succeed")
    }

    fn interest(&self) -> Interest {
      let handle = self.engine.handle().expect("engine should be plugged");
      self.reactor.interest(handle).expect("handle should be registered")
    }

    fn reads(&self) -> usize {
      self.wire.borrow().reads
    }

    fn writes(&self) -> usize {
      self.wire.borrow().writes
    }
  }

  // --- Lifecycle ---

  #[test]
  fn test_plug_subscribes_both_directions() {
    let mut h = Harness::new();
    assert_eq!(h.plug(), EngineStatus::Alive);
    assert!(h.engine.is_plugged());
    assert_eq!(h.interest(), Interest::POLLIN | Interest::POLLOUT);
    // Synchronous input pass on plug.
    assert_eq!(h.reads(), 1);
    assert_eq!(h.session.flush_count(), 1);
  }

  #[test]
  fn test_double_plug_and_stray_unplug_rejected() {
    let mut h = Harness::new();
    assert!(matches!(h.engine.unplug(), Err(ZmqError::InvalidState(_))));
    let _ = h.plug();
    let second = h.engine.plug(h.reactor.clone(), h.session.clone());
    assert!(matches!(second, Err(ZmqError::InvalidState(_))));
    // The rejected plug left the original binding in place.
    assert_eq!(h.interest(), Interest::POLLIN | Interest::POLLOUT);
    h.engine.unplug().unwrap();
    assert!(matches!(h.engine.unplug(), Err(ZmqError::InvalidState(_))));
  }

  #[test]
  fn test_unplug_then_replug_gets_new_handle() {
    let mut h = Harness::new();
    let _ = h.plug();
    let first = h.engine.handle().unwrap();
    h.engine.unplug().unwrap();
    assert!(h.engine.handle().is_none());
    assert_eq!(h.reactor.deregistered.borrow().as_slice(), &[first]);

    let _ = h.plug();
    let second = h.engine.handle().unwrap();
    assert_ne!(first, second);
    assert!(h.engine.is_plugged());
  }

  #[test]
  fn test_terminate_deregisters() {
    let mut h = Harness::new();
    let _ = h.plug();
    let handle = h.engine.handle().unwrap();
    let Harness { engine, reactor, session, .. } = h;
    engine.terminate().unwrap();
    assert_eq!(reactor.deregistered.borrow().as_slice(), &[handle]);
    assert!(!session.is_detached());
  }

  #[test]
  fn test_owner_error_detaches_session() {
    let mut h = Harness::new();
    let _ = h.plug();
    let Harness { engine, reactor, session, .. } = h;
    engine.error().unwrap();
    assert!(session.is_detached());
    assert_eq!(reactor.deregistered.borrow().len(), 1);
  }

  #[test]
  fn test_error_without_session_rejected() {
    let h = Harness::new();
    assert!(matches!(h.engine.error(), Err(ZmqError::InvalidState(_))));
  }

  #[test]
  fn test_drop_while_plugged_deregisters() {
    let mut h = Harness::new();
    let _ = h.plug();
    let Harness { engine, reactor, .. } = h;
    drop(engine);
    assert_eq!(reactor.deregistered.borrow().len(), 1);
  }

  // --- Input path ---

  #[test]
  fn test_full_consumption_keeps_reading() {
    let mut h = Harness::new();
    h.incoming(b"0123456789");
    let _ = h.plug();

    assert_eq!(h.engine.pending_input(), 0);
    assert_eq!(h.session.flush_count(), 1);
    assert!(h.interest().contains(Interest::POLLIN));
    assert_eq!(h.session.recv().unwrap().data(), b"0123456789");
  }

  #[test]
  fn test_partial_consumption_pauses_input_and_keeps_remainder() {
    let mut h = Harness::new();
    h.incoming(b"0123456789");
    h.codec.borrow_mut().steps.push_back(ConsumeStep::Upto(4));
    let _ = h.plug();

    assert_eq!(h.engine.pending_input(), 6);
    assert!(!h.interest().contains(Interest::POLLIN));
    assert!(h.interest().contains(Interest::POLLOUT));
    assert_eq!(h.session.flush_count(), 1);

    // More data arrives, but the remainder must be finished first.
    h.incoming(b"abc");
    assert_eq!(h.engine.activate_in(), EngineStatus::Alive);
    assert!(h.interest().contains(Interest::POLLIN));
    assert_eq!(h.reads(), 1, "leftover bytes are drained before the socket is read again");
    assert_eq!(h.codec.borrow().offered.last().unwrap(), b"456789");
    assert_eq!(h.engine.pending_input(), 0);

    let _ = h.engine.on_readable();
    assert_eq!(h.reads(), 2);
    assert_eq!(h.codec.borrow().offered.last().unwrap(), b"abc");
  }

  #[test]
  fn test_leftover_is_offered_verbatim_across_stalls() {
    let mut h = Harness::new();
    h.incoming(b"abcdefghij");
    {
      let mut codec = h.codec.borrow_mut();
      codec.steps.push_back(ConsumeStep::Upto(3));
      codec.steps.push_back(ConsumeStep::Upto(0));
      codec.steps.push_back(ConsumeStep::Upto(2));
    }
    let _ = h.plug();
    assert_eq!(h.engine.pending_input(), 7);
    let _ = h.engine.activate_in();
    assert_eq!(h.engine.pending_input(), 7);
    let _ = h.engine.activate_in();
    assert_eq!(h.engine.pending_input(), 5);

    let offered = h.codec.borrow().offered.clone();
    assert_eq!(offered, vec![b"abcdefghij".to_vec(), b"defghij".to_vec(), b"defghij".to_vec()]);
    assert_eq!(h.reads(), 1);
  }

  #[test]
  fn test_no_reads_while_input_paused() {
    let mut h = Harness::new();
    h.incoming(b"0123456789");
    h.codec.borrow_mut().steps.push_back(ConsumeStep::Upto(1));
    let _ = h.plug();
    assert!(!h.interest().contains(Interest::POLLIN));

    // Output activity must not sneak a read in.
    h.codec.borrow_mut().outgoing.push_back(b"out".to_vec());
    let _ = h.engine.on_writable();
    let _ = h.engine.activate_out();
    assert_eq!(h.reads(), 1);
    assert_eq!(h.engine.pending_input(), 9);
  }

  #[test]
  fn test_peer_close_errors_and_detaches_once() {
    let mut h = Harness::new();
    h.wire.borrow_mut().incoming.push_back(ReadStep::Closed);
    let status = h.plug();

    assert_eq!(status, EngineStatus::Errored(Termination::Disconnected));
    assert!(h.session.is_detached());
    assert_eq!(h.reactor.deregistered.borrow().len(), 1);
    assert!(h.engine.handle().is_none());
    assert_eq!(h.engine.status(), EngineStatus::Errored(Termination::Disconnected));

    // Dead engines stay dead and quiet.
    assert_eq!(h.engine.on_readable(), EngineStatus::Errored(Termination::Disconnected));
    assert_eq!(h.engine.activate_out(), EngineStatus::Errored(Termination::Disconnected));
    assert_eq!(h.reads(), 1);
    assert_eq!(h.reactor.deregistered.borrow().len(), 1);
    assert!(matches!(
      h.engine.plug(h.reactor.clone(), h.session.clone()),
      Err(ZmqError::InvalidState(_))
    ));
  }

  #[test]
  fn test_messages_read_before_close_are_flushed() {
    let mut h = Harness::new();
    h.incoming(b"last words");
    let _ = h.plug();
    h.wire.borrow_mut().incoming.push_back(ReadStep::Closed);
    assert_eq!(h.engine.on_readable(), EngineStatus::Errored(Termination::Disconnected));
    assert_eq!(h.session.recv().unwrap().data(), b"last words");
  }

  #[test]
  fn test_fatal_decode_errors() {
    let mut h = Harness::new();
    h.incoming(b"garbage");
    h.codec.borrow_mut().steps.push_back(ConsumeStep::Fatal);
    assert_eq!(h.plug(), EngineStatus::Errored(Termination::DecodeFailed));
    assert!(h.session.is_detached());
    // Flush still happened for the pass.
    assert_eq!(h.session.flush_count(), 1);
  }

  // --- Output path ---

  #[test]
  fn test_idle_output_withdraws_interest() {
    let mut h = Harness::new();
    let _ = h.plug();
    let _ = h.engine.on_writable();
    assert!(!h.interest().contains(Interest::POLLOUT));
    assert_eq!(h.writes(), 0);

    h.session.send(Msg::from_static(b"request")).unwrap();
    assert_eq!(h.engine.activate_out(), EngineStatus::Alive);
    assert!(h.interest().contains(Interest::POLLOUT));
    assert_eq!(h.writes(), 1, "activate_out writes speculatively");
    assert_eq!(h.wire.borrow().written, b"request");
  }

  #[test]
  fn test_partial_write_resumes_from_cursor() {
    let mut h = Harness::new();
    let _ = h.plug();
    h.wire.borrow_mut().write_limit = Some(3);
    h.codec.borrow_mut().outgoing.push_back(b"abcdefgh".to_vec());

    let _ = h.engine.on_writable();
    assert_eq!(h.engine.pending_output(), 5);
    let _ = h.engine.on_writable();
    let _ = h.engine.on_writable();
    assert_eq!(h.engine.pending_output(), 0);
    assert_eq!(h.wire.borrow().written, b"abcdefgh");

    // Next writable event finds nothing queued.
    let _ = h.engine.on_writable();
    assert!(!h.interest().contains(Interest::POLLOUT));
    assert_eq!(h.writes(), 3);
  }

  #[test]
  fn test_write_failure_errors() {
    let mut h = Harness::new();
    let _ = h.plug();
    h.wire.borrow_mut().write_fails = true;
    h.codec.borrow_mut().outgoing.push_back(b"doomed".to_vec());
    assert_eq!(h.engine.on_writable(), EngineStatus::Errored(Termination::WriteFailed));
    assert!(h.session.is_detached());
    assert!(!h.engine.is_plugged());
  }

  // --- Teardown drain ---

  #[test]
  fn test_writable_after_unplug_flushes_without_writing() {
    let mut h = Harness::new();
    let _ = h.plug();
    let flushes = h.session.flush_count();
    h.codec.borrow_mut().outgoing.push_back(b"pending".to_vec());

    h.engine.unplug().unwrap();
    assert_eq!(h.engine.on_writable(), EngineStatus::Alive);
    assert_eq!(h.session.flush_count(), flushes + 1);
    assert_eq!(h.writes(), 0);

    // The drain target is spent.
    let _ = h.engine.on_writable();
    assert_eq!(h.session.flush_count(), flushes + 1);
  }

  #[test]
  fn test_decoded_messages_delivered_once_after_unplug() {
    let mut h = Harness::new();
    let _ = h.plug();
    // Decoded during the in-flight pass, not yet flushed.
    h.session.write(Msg::from_static(b"in flight")).unwrap();
    h.engine.unplug().unwrap();
    assert!(h.session.recv().is_none());

    let _ = h.engine.on_readable();
    assert_eq!(h.session.recv().unwrap().data(), b"in flight");
    assert_eq!(h.reads(), 2, "the drain pass still reads once");

    let _ = h.engine.on_readable();
    let _ = h.engine.on_writable();
    assert!(h.session.recv().is_none());
    assert!(!h.session.is_detached());
  }

  #[test]
  fn test_drain_pass_reads_into_unbound_decoder() {
    let mut h = Harness::new();
    let _ = h.plug();
    h.engine.unplug().unwrap();
    h.incoming(b"after unplug");

    assert_eq!(h.engine.on_readable(), EngineStatus::Alive);
    assert_eq!(h.reads(), 2);
    assert_eq!(h.codec.borrow().offered.last().unwrap(), b"after unplug");
    // Unbound decoder: nothing reaches the session.
    assert!(h.session.recv().is_none());
  }

  #[test]
  fn test_close_seen_while_draining_does_not_detach() {
    let mut h = Harness::new();
    let _ = h.plug();
    let flushes = h.session.flush_count();
    h.engine.unplug().unwrap();
    h.wire.borrow_mut().incoming.push_back(ReadStep::Closed);

    assert_eq!(h.engine.on_readable(), EngineStatus::Alive);
    assert_eq!(h.reads(), 2);
    assert!(!h.session.is_detached());
    assert_eq!(h.session.flush_count(), flushes + 1);
    assert_eq!(h.engine.status(), EngineStatus::Alive);
    assert_eq!(h.reactor.deregistered.borrow().len(), 1);
  }

  #[test]
  fn test_activation_ignored_while_unplugged() {
    let mut h = Harness::new();
    let _ = h.plug();
    h.engine.unplug().unwrap();
    let flushes = h.session.flush_count();
    assert_eq!(h.engine.activate_in(), EngineStatus::Alive);
    assert_eq!(h.engine.activate_out(), EngineStatus::Alive);
    assert_eq!(h.session.flush_count(), flushes);
    assert_eq!(h.reads(), 1);
  }
}

// tests/common.rs
#![allow(dead_code)] // Not every test file uses every helper

use rzmq_engine::runtime::{Handle, IoThread};
use rzmq_engine::session::PipeSession;
use rzmq_engine::transport::IpcTransport;
use rzmq_engine::{Engine, EngineOptions, Msg, ZmqError};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::sync::Once;
use std::time::{Duration, Instant};

pub const POLL_TICK: Duration = Duration::from_millis(10);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(2);

// Use std::sync::Once for one-time initialization
static TRACING_INIT: Once = Once::new();

// Setup function to initialize tracing
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Can be overridden by RUST_LOG env variable
    let default_filter = "rzmq_engine=debug,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE) // Allow all levels down to TRACE
      .with_env_filter(env_filter)
      .with_target(true) // Show module path
      .with_line_number(true) // Show line numbers
      .with_span_events(FmtSpan::CLOSE)
      .with_test_writer() // Write to test output capture
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

pub fn test_io_thread() -> IoThread {
  setup_tracing();
  IoThread::new().expect("Failed to create I/O thread")
}

/// Attaches an engine over one end of a unix socket pair; returns the raw (blocking) other end.
pub fn attach_raw_peer(io: &mut IoThread, options: &EngineOptions) -> Result<(Handle, Rc<PipeSession>, UnixStream), ZmqError> {
  let (ours, theirs) = UnixStream::pair()?;
  let engine = Engine::with_zmtp(Box::new(IpcTransport::open(ours, options)?), options)?;
  let session = Rc::new(PipeSession::new(options));
  let handle = io.attach(engine, session.clone())?;
  Ok((handle, session, theirs))
}

/// Attaches two engines talking to each other over a unix socket pair.
pub fn attach_engine_pair(io: &mut IoThread, options: &EngineOptions) -> Result<[(Handle, Rc<PipeSession>); 2], ZmqError> {
  let (a, b) = IpcTransport::pair(options)?;
  let mut out = Vec::with_capacity(2);
  for transport in [a, b] {
    let engine = Engine::with_zmtp(Box::new(transport), options)?;
    let session = Rc::new(PipeSession::new(options));
    let handle = io.attach(engine, session.clone())?;
    out.push((handle, session));
  }
  let second = out.pop().expect("two connections attached");
  let first = out.pop().expect("two connections attached");
  Ok([first, second])
}

/// Runs the loop until `done` holds or `timeout` passes. Returns whether `done` held.
pub fn pump_until(io: &mut IoThread, timeout: Duration, mut done: impl FnMut(&mut IoThread) -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if done(io) {
      return true;
    }
    io.run_once(Some(POLL_TICK)).expect("poll failed");
  }
  done(io)
}

/// Receives one message through the loop, pumping until it shows up.
pub fn recv_timeout(io: &mut IoThread, handle: Handle, timeout: Duration) -> Result<Msg, ZmqError> {
  let mut received = None;
  let found = pump_until(io, timeout, |io| {
    if received.is_none() {
      received = io.recv(handle).ok().flatten();
    }
    received.is_some()
  });
  match (found, received) {
    (true, Some(msg)) => Ok(msg),
    _ => Err(ZmqError::Internal("timed out waiting for message".into())),
  }
}

/// ZMTP/1.0 encoding of a short single-part frame, for raw peers.
pub fn short_frame(body: &[u8]) -> Vec<u8> {
  assert!(body.len() < 254);
  let mut frame = vec![body.len() as u8 + 1, 0];
  frame.extend_from_slice(body);
  frame
}

// src/transport/mod.rs

//! The duplex byte channel under an engine, plus its mio-backed implementations.

#[cfg(feature = "mio-poll")]
pub mod tcp;
#[cfg(feature = "ipc")]
pub mod ipc;

#[cfg(feature = "mio-poll")]
pub use tcp::TcpTransport;
#[cfg(feature = "ipc")]
pub use ipc::IpcTransport;

use crate::error::ZmqError;

use std::io::{self, Read, Write};
use std::os::fd::RawFd;

/// Result of one non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
  /// Bytes placed in the buffer. Zero means the read would have blocked.
  Bytes(usize),
  /// The peer closed the stream, or the OS reported it dead.
  Closed,
}

/// A connected, non-blocking socket owned by one engine.
pub trait TransportSocket {
  fn read(&mut self, buf: &mut [u8]) -> ReadOutcome;

  /// Writes what the socket accepts right now. `Ok(0)` means it would block.
  fn write(&mut self, buf: &[u8]) -> Result<usize, ZmqError>;

  /// Descriptor used to register with a reactor.
  fn raw_fd(&self) -> RawFd;
}

/// Shared read semantics for stream sockets: EOF and hard errors close, EAGAIN/EINTR are no progress.
pub(crate) fn read_stream<S: Read>(stream: &mut S, buf: &mut [u8]) -> ReadOutcome {
  match stream.read(buf) {
    Ok(0) if !buf.is_empty() => ReadOutcome::Closed,
    Ok(n) => ReadOutcome::Bytes(n),
    Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => ReadOutcome::Bytes(0),
    Err(e) => {
      tracing::debug!(error = %e, "Socket read failed, treating as disconnect");
      ReadOutcome::Closed
    }
  }
}

pub(crate) fn write_stream<S: Write>(stream: &mut S, buf: &[u8]) -> Result<usize, ZmqError> {
  match stream.write(buf) {
    Ok(n) => Ok(n),
    Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => Ok(0),
    Err(e) => Err(ZmqError::from_io(e)),
  }
}

// src/transport/ipc.rs

use crate::error::ZmqError;
use crate::options::EngineOptions;
use crate::transport::{read_stream, write_stream, ReadOutcome, TransportSocket};

use mio::net::UnixStream;
use socket2::SockRef;
use std::os::fd::{AsRawFd, RawFd};

/// Unix domain stream transport.
#[derive(Debug)]
pub struct IpcTransport {
  stream: UnixStream,
}

impl IpcTransport {
  pub fn open(stream: std::os::unix::net::UnixStream, options: &EngineOptions) -> Result<Self, ZmqError> {
    stream.set_nonblocking(true)?;
    let socket_ref = SockRef::from(&stream);
    if let Some(size) = options.sndbuf {
      socket_ref.set_send_buffer_size(size)?;
    }
    if let Some(size) = options.rcvbuf {
      socket_ref.set_recv_buffer_size(size)?;
    }
    tracing::debug!(fd = stream.as_raw_fd(), "Opened IPC transport");
    Ok(Self {
      stream: UnixStream::from_std(stream),
    })
  }

  /// A connected pair, handy for wiring two engines together in one process.
  pub fn pair(options: &EngineOptions) -> Result<(Self, Self), ZmqError> {
    let (a, b) = std::os::unix::net::UnixStream::pair()?;
    Ok((Self::open(a, options)?, Self::open(b, options)?))
  }
}

impl TransportSocket for IpcTransport {
  fn read(&mut self, buf: &mut [u8]) -> ReadOutcome {
    read_stream(&mut self.stream, buf)
  }

  fn write(&mut self, buf: &[u8]) -> Result<usize, ZmqError> {
    write_stream(&mut self.stream, buf)
  }

  fn raw_fd(&self) -> RawFd {
    self.stream.as_raw_fd()
  }
}

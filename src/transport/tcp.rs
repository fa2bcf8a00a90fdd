// src/transport/tcp.rs

use crate::error::ZmqError;
use crate::options::EngineOptions;
use crate::transport::{read_stream, write_stream, ReadOutcome, TransportSocket};

use mio::net::TcpStream;
use socket2::SockRef; // For setting TCP options like NODELAY and buffer sizes
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

/// TCP transport over a connected, non-blocking mio stream.
#[derive(Debug)]
pub struct TcpTransport {
  stream: TcpStream,
  peer_addr: Option<SocketAddr>,
}

impl TcpTransport {
  /// Takes over a connected std stream (from `accept` or `connect`), switches it to
  /// non-blocking mode and applies the socket-level options.
  pub fn open(stream: std::net::TcpStream, options: &EngineOptions) -> Result<Self, ZmqError> {
    stream.set_nonblocking(true)?;
    apply_tcp_socket_options(&stream, options)?;
    let peer_addr = stream.peer_addr().ok();
    tracing::debug!(fd = stream.as_raw_fd(), peer = ?peer_addr, "Opened TCP transport");
    Ok(Self {
      stream: TcpStream::from_std(stream),
      peer_addr,
    })
  }

  pub fn peer_addr(&self) -> Option<SocketAddr> {
    self.peer_addr
  }
}

impl TransportSocket for TcpTransport {
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

/// Applies TCP options from `EngineOptions` to a stream.
pub(crate) fn apply_tcp_socket_options(stream: &std::net::TcpStream, options: &EngineOptions) -> Result<(), ZmqError> {
  let socket_ref = SockRef::from(stream);
  socket_ref.set_nodelay(options.tcp_nodelay)?;
  tracing::trace!(nodelay = options.tcp_nodelay, "Applied TCP_NODELAY");
  if let Some(size) = options.sndbuf {
    socket_ref.set_send_buffer_size(size)?;
    tracing::trace!(sndbuf = size, "Applied SO_SNDBUF");
  }
  if let Some(size) = options.rcvbuf {
    socket_ref.set_recv_buffer_size(size)?;
    tracing::trace!(rcvbuf = size, "Applied SO_RCVBUF");
  }
  Ok(())
}

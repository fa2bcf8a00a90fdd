// src/protocol/mod.rs

//! Codec seams used by the engine, plus the ZMTP/1.0 framing that implements them.

pub mod zmtp;

use crate::session::Session;

use std::rc::Rc;
use thiserror::Error;

/// A view into a codec's own buffer: `len` bytes starting at `offset`.
///
/// The engine keeps its read and write cursors as windows so it never holds a
/// pointer into collaborator storage; the bytes are borrowed from the codec only
/// for the duration of a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
  pub offset: usize,
  pub len: usize,
}

impl Window {
  pub const EMPTY: Window = Window { offset: 0, len: 0 };

  pub fn new(offset: usize, len: usize) -> Self {
    Self { offset, len }
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Drops `n` bytes from the front of the window.
  pub fn advance(&mut self, n: usize) {
    debug_assert!(n <= self.len, "advance past end of window");
    let n = n.min(self.len);
    self.offset += n;
    self.len -= n;
  }

  pub fn range(&self) -> std::ops::Range<usize> {
    self.offset..self.offset + self.len
  }
}

/// A framing error the stream cannot recover from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("frame length of zero")]
  ZeroLength,
  #[error("message of {size} bytes exceeds maxmsgsize {limit}")]
  MessageTooLarge { size: u64, limit: u64 },
  #[error("window {offset}+{len} lies outside the decoder buffer")]
  WindowOutOfBounds { offset: usize, len: usize },
}

/// Turns bytes read from the socket into messages for a bound session.
pub trait Decoder {
  /// Binds the sink complete messages are written to, or unbinds with `None`.
  fn bind(&mut self, sink: Option<Rc<dyn Session>>);

  /// Hands out a fresh writable region for the next socket read.
  fn next_buffer(&mut self) -> Window;

  /// Mutable access to the bytes behind a window returned by `next_buffer`.
  fn region_mut(&mut self, window: Window) -> &mut [u8];

  /// Processes the bytes behind `window`, returning how many were consumed.
  ///
  /// Consuming fewer than `window.len` bytes means the sink refused a message;
  /// the caller keeps the rest and offers it again later.
  fn consume(&mut self, window: Window) -> Result<usize, DecodeError>;
}

/// Serializes messages pulled from a bound session into chunks for the socket.
pub trait Encoder {
  /// Binds the source outbound messages are read from, or unbinds with `None`.
  fn bind(&mut self, source: Option<Rc<dyn Session>>);

  /// Serializes as much pending data as fits and returns the readable window.
  /// An empty window means nothing is queued.
  fn next_chunk(&mut self) -> Window;

  /// The bytes behind a window returned by `next_chunk`.
  fn chunk(&self, window: Window) -> &[u8];
}

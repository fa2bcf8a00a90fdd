// src/protocol/zmtp/encoder.rs

use crate::message::Msg;
use crate::protocol::zmtp::{ZMTP_FLAG_MORE, ZMTP_LONG_LENGTH_MARKER, ZMTP_MAX_HEADER_LEN};
use crate::protocol::{Encoder, Window};
use crate::session::Session;

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::rc::Rc;

/// A message being copied into the batch buffer, possibly over several chunks.
struct InProgress {
  header: [u8; ZMTP_MAX_HEADER_LEN],
  header_len: usize,
  body: Bytes,
  // Bytes of header + body already copied out.
  written: usize,
}

impl InProgress {
  fn new(msg: &Msg) -> Self {
    let mut header = [0u8; ZMTP_MAX_HEADER_LEN];
    let frame_len = msg.size() as u64 + 1;
    let header_len = if frame_len < u64::from(ZMTP_LONG_LENGTH_MARKER) {
      header[0] = frame_len as u8;
      1
    } else {
      header[0] = ZMTP_LONG_LENGTH_MARKER;
      header[1..9].copy_from_slice(&frame_len.to_be_bytes());
      9
    };
    header[header_len] = if msg.is_more() { ZMTP_FLAG_MORE } else { 0 };
    Self {
      header,
      header_len: header_len + 1,
      body: msg.data_bytes(),
      written: 0,
    }
  }

  fn total(&self) -> usize {
    self.header_len + self.body.len()
  }

  fn is_done(&self) -> bool {
    self.written == self.total()
  }

  /// Copies as much as fits into `dst` without exceeding `limit` bytes in total.
  fn copy_into(&mut self, dst: &mut BytesMut, limit: usize) {
    while !self.is_done() && dst.len() < limit {
      let room = limit - dst.len();
      if self.written < self.header_len {
        let take = (self.header_len - self.written).min(room);
        dst.put_slice(&self.header[self.written..self.written + take]);
        self.written += take;
      } else {
        let at = self.written - self.header_len;
        let take = (self.body.len() - at).min(room);
        dst.put_slice(&self.body[at..at + take]);
        self.written += take;
      }
    }
  }
}

/// ZMTP/1.0 encoder pulling outbound messages from a bound session.
pub struct ZmtpEncoder {
  batch_size: usize,
  buffer: BytesMut,
  source: Option<Rc<dyn Session>>,
  in_progress: Option<InProgress>,
}

impl fmt::Debug for ZmtpEncoder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ZmtpEncoder")
      .field("batch_size", &self.batch_size)
      .field("buffered", &self.buffer.len())
      .field("source_bound", &self.source.is_some())
      .field("in_progress", &self.in_progress.is_some())
      .finish()
  }
}

impl ZmtpEncoder {
  pub fn new(batch_size: usize) -> Self {
    Self {
      batch_size,
      buffer: BytesMut::with_capacity(batch_size),
      source: None,
      in_progress: None,
    }
  }
}

impl Encoder for ZmtpEncoder {
  fn bind(&mut self, source: Option<Rc<dyn Session>>) {
    self.source = source;
  }

  fn next_chunk(&mut self) -> Window {
    self.buffer.clear();
    while self.buffer.len() < self.batch_size {
      if self.in_progress.is_none() {
        // Unbound: only finish what was already started.
        let next = self.source.as_ref().and_then(|source| source.read());
        match next {
          Some(msg) => self.in_progress = Some(InProgress::new(&msg)),
          None => break,
        }
      }
      if let Some(current) = self.in_progress.as_mut() {
        current.copy_into(&mut self.buffer, self.batch_size);
        if current.is_done() {
          self.in_progress = None;
        }
      }
    }
    Window::new(0, self.buffer.len())
  }

  fn chunk(&self, window: Window) -> &[u8] {
    &self.buffer[window.range()]
  }
}

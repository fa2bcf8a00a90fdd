// src/protocol/zmtp/decoder.rs

use crate::message::{Msg, MsgFlags};
use crate::protocol::zmtp::{ZMTP_FLAG_MORE, ZMTP_LONG_LENGTH_MARKER};
use crate::protocol::{DecodeError, Decoder, Window};
use crate::session::Session;

use bytes::BytesMut;
use std::fmt;
use std::rc::Rc;

// Upper bound for the up-front body reservation; larger bodies grow as bytes arrive.
const MAX_BODY_PREALLOC: usize = 64 * 1024;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum DecodingState {
  #[default]
  OneByteSize,
  EightByteSize { filled: usize },
  Flags { body_len: usize },
  Body { flags: u8, body_len: usize },
}

/// Incremental ZMTP/1.0 decoder writing complete messages into a bound session.
pub struct ZmtpDecoder {
  buffer: Vec<u8>,
  maxmsgsize: Option<u64>,
  sink: Option<Rc<dyn Session>>,
  state: DecodingState,
  length_bytes: [u8; 8],
  body: BytesMut,
  // A complete message the sink refused; delivered before any further bytes are read.
  stalled: Option<Msg>,
}

impl fmt::Debug for ZmtpDecoder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ZmtpDecoder")
      .field("batch_size", &self.buffer.len())
      .field("maxmsgsize", &self.maxmsgsize)
      .field("state", &self.state)
      .field("sink_bound", &self.sink.is_some())
      .field("stalled", &self.stalled.is_some())
      .finish()
  }
}

impl ZmtpDecoder {
  pub fn new(batch_size: usize, maxmsgsize: Option<u64>) -> Self {
    Self {
      buffer: vec![0; batch_size],
      maxmsgsize,
      sink: None,
      state: DecodingState::default(),
      length_bytes: [0; 8],
      body: BytesMut::new(),
      stalled: None,
    }
  }

  /// True while a decoded message is waiting for sink capacity.
  pub fn is_stalled(&self) -> bool {
    self.stalled.is_some()
  }

  /// Moves from a parsed frame length to reading the flags octet.
  fn length_ready(&mut self, frame_len: u64) -> Result<(), DecodeError> {
    if frame_len == 0 {
      return Err(DecodeError::ZeroLength);
    }
    let body_size = frame_len - 1;
    if let Some(limit) = self.maxmsgsize {
      if body_size > limit {
        return Err(DecodeError::MessageTooLarge { size: body_size, limit });
      }
    }
    let body_len = usize::try_from(body_size).map_err(|_| DecodeError::MessageTooLarge {
      size: body_size,
      limit: usize::MAX as u64,
    })?;
    self.body = BytesMut::with_capacity(body_len.min(MAX_BODY_PREALLOC));
    self.state = DecodingState::Flags { body_len };
    Ok(())
  }

  /// Returns false if the sink refused the message (it is kept in `stalled`).
  fn deliver(&mut self, msg: Msg) -> bool {
    let refused = match &self.sink {
      Some(sink) => match sink.write(msg) {
        Ok(()) => return true,
        Err(msg) => msg,
      },
      None => msg,
    };
    tracing::trace!(size = refused.size(), "Decoder stalled, sink refused message");
    self.stalled = Some(refused);
    false
  }

  fn message_ready(&mut self, flags: u8) -> bool {
    let mut msg_flags = MsgFlags::empty();
    if flags & ZMTP_FLAG_MORE != 0 {
      msg_flags |= MsgFlags::MORE;
    }
    let msg = Msg::from_bytes(self.body.split().freeze()).with_flags(msg_flags);
    self.state = DecodingState::OneByteSize;
    self.deliver(msg)
  }
}

impl Decoder for ZmtpDecoder {
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
    if window.offset + window.len > self.buffer.len() {
      return Err(DecodeError::WindowOutOfBounds {
        offset: window.offset,
        len: window.len,
      });
    }

    if let Some(msg) = self.stalled.take() {
      if !self.deliver(msg) {
        return Ok(0);
      }
    }

    let mut pos = 0;
    while pos < window.len {
      let at = window.offset + pos;
      match self.state {
        DecodingState::OneByteSize => {
          let octet = self.buffer[at];
          pos += 1;
          if octet == ZMTP_LONG_LENGTH_MARKER {
            self.state = DecodingState::EightByteSize { filled: 0 };
          } else {
            self.length_ready(u64::from(octet))?;
          }
        }
        DecodingState::EightByteSize { filled } => {
          let take = (8 - filled).min(window.len - pos);
          self.length_bytes[filled..filled + take].copy_from_slice(&self.buffer[at..at + take]);
          pos += take;
          if filled + take == 8 {
            self.length_ready(u64::from_be_bytes(self.length_bytes))?;
          } else {
            self.state = DecodingState::EightByteSize { filled: filled + take };
          }
        }
        DecodingState::Flags { body_len } => {
          let flags = self.buffer[at];
          pos += 1;
          if body_len == 0 {
            if !self.message_ready(flags) {
              return Ok(pos);
            }
          } else {
            self.state = DecodingState::Body { flags, body_len };
          }
        }
        DecodingState::Body { flags, body_len } => {
          let take = (body_len - self.body.len()).min(window.len - pos);
          self.body.extend_from_slice(&self.buffer[at..at + take]);
          pos += take;
          if self.body.len() == body_len && !self.message_ready(flags) {
            return Ok(pos);
          }
        }
      }
    }
    Ok(pos)
  }
}

// src/message/msg.rs

use crate::message::flags::MsgFlags;
use bytes::Bytes;
use std::fmt;

/// One frame of a (possibly multipart) message.
///
/// The payload is a [`Bytes`] handle, so clones share the buffer and the
/// decoder can hand over a body without copying it again.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Msg {
  data: Bytes,
  flags: MsgFlags,
}

impl Msg {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_vec(data: Vec<u8>) -> Self {
    Self::from_bytes(Bytes::from(data))
  }

  pub fn from_bytes(data: Bytes) -> Self {
    Self {
      data,
      flags: MsgFlags::empty(),
    }
  }

  pub fn from_static(data: &'static [u8]) -> Self {
    Self::from_bytes(Bytes::from_static(data))
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Payload length, excluding any framing.
  pub fn size(&self) -> usize {
    self.data.len()
  }

  pub fn flags(&self) -> MsgFlags {
    self.flags
  }

  pub fn set_flags(&mut self, flags: MsgFlags) {
    self.flags = flags;
  }

  pub fn with_flags(mut self, flags: MsgFlags) -> Self {
    self.set_flags(flags);
    self
  }

  /// True if another part of the same message follows.
  pub fn is_more(&self) -> bool {
    self.flags.contains(MsgFlags::MORE)
  }

  /// Shared handle to the payload (refcount bump, no copy).
  pub fn data_bytes(&self) -> Bytes {
    self.data.clone()
  }
}

impl fmt::Debug for Msg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Msg")
      .field("size", &self.size())
      .field("flags", &self.flags)
      .finish()
  }
}

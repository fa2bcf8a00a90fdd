// src/options.rs

use crate::ZmqError;

/// Default size of the decoder's and encoder's scratch buffers.
pub const DEFAULT_BATCH_SIZE: usize = 8192;
/// Default high water mark for the pipe session queues.
pub const DEFAULT_HWM: usize = 1000;

/// Tunables handed to an engine and its collaborators at construction time.
#[derive(Debug, Clone)]
pub struct EngineOptions {
  // OS socket buffers, None keeps the system default.
  pub sndbuf: Option<usize>,
  pub rcvbuf: Option<usize>,
  pub tcp_nodelay: bool, // Usually enabled by default
  /// Largest message body the decoder accepts. None means unlimited.
  pub maxmsgsize: Option<u64>,
  /// Size of the buffer the decoder hands out for each socket read.
  pub in_batch_size: usize,
  /// Size of the buffer the encoder fills for each socket write.
  pub out_batch_size: usize,
  // High Water Marks (applied to PipeSession queues)
  pub rcvhwm: usize,
  pub sndhwm: usize,
}

impl Default for EngineOptions {
  fn default() -> Self {
    Self {
      sndbuf: None,
      rcvbuf: None,
      tcp_nodelay: true, // Common default for messaging
      maxmsgsize: None,
      in_batch_size: DEFAULT_BATCH_SIZE,
      out_batch_size: DEFAULT_BATCH_SIZE,
      rcvhwm: DEFAULT_HWM,
      sndhwm: DEFAULT_HWM,
    }
  }
}

impl EngineOptions {
  /// Checks the values that would otherwise make an engine spin without progress.
  pub fn validate(&self) -> Result<(), ZmqError> {
    if self.in_batch_size == 0 {
      return Err(ZmqError::InvalidArgument("in_batch_size must be non-zero".into()));
    }
    if self.out_batch_size == 0 {
      return Err(ZmqError::InvalidArgument("out_batch_size must be non-zero".into()));
    }
    if self.rcvhwm == 0 || self.sndhwm == 0 {
      return Err(ZmqError::InvalidArgument("high water marks must be non-zero".into()));
    }
    Ok(())
  }
}

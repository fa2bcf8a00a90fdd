// src/error.rs

use crate::protocol::DecodeError;

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum ZmqError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error), // Allows easy conversion from std::io::Error

  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String), // Corresponds to EINVAL for non-option errors

  // --- Connection Errors ---
  #[error("Connection closed by peer or transport")]
  ConnectionClosed, // EPIPE, ECONNRESET

  // --- State Errors ---
  #[error("Operation is invalid for the current engine state: {0}")]
  InvalidState(&'static str), // EFSM

  #[error("Unknown reactor handle: {0}")]
  UnknownHandle(usize),

  // --- Protocol Errors ---
  #[error("ZMTP protocol violation: {0}")]
  ProtocolViolation(String), // EPROTO

  #[error("Message of {size} bytes exceeds the limit of {limit} bytes")]
  MessageTooLarge { size: u64, limit: u64 }, // EMSGSIZE

  // --- Resource Limits ---
  #[error("Resource limit reached (e.g., HWM)")]
  ResourceLimitReached, // EAGAIN / EWOULDBLOCK equivalent

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

// Helper function to map common std::io::Error kinds
impl ZmqError {
  pub fn from_io(e: io::Error) -> Self {
    match e.kind() {
      io::ErrorKind::ConnectionReset
      | io::ErrorKind::ConnectionAborted
      | io::ErrorKind::BrokenPipe
      | io::ErrorKind::NotConnected => ZmqError::ConnectionClosed,
      _ => ZmqError::Io(e), // Default fallback
    }
  }

  /// True for errors that mean the peer (or the OS on its behalf) tore the stream down.
  pub fn is_disconnect(&self) -> bool {
    matches!(self, ZmqError::ConnectionClosed)
  }
}

impl From<DecodeError> for ZmqError {
  fn from(e: DecodeError) -> Self {
    match e {
      DecodeError::MessageTooLarge { size, limit } => ZmqError::MessageTooLarge { size, limit },
      other => ZmqError::ProtocolViolation(other.to_string()),
    }
  }
}

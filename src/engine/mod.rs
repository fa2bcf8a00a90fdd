// src/engine/mod.rs

//! The per-connection stream engine and the status it reports to its owner.

pub mod core;

pub use self::core::Engine;

/// Why an engine stopped on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
  /// The peer closed the stream (or the OS reported it dead on read).
  Disconnected,
  /// The decoder hit malformed framing.
  DecodeFailed,
  /// A socket write failed.
  WriteFailed,
  /// The owner called `Engine::error` directly.
  Aborted,
}

/// Outcome of an engine entry point.
///
/// `Errored` is terminal: the engine has already notified its session,
/// deregistered from the reactor and dropped its bindings. The owner's only
/// remaining duty is to drop it.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
  Alive,
  Errored(Termination),
}

impl EngineStatus {
  pub fn is_alive(&self) -> bool {
    matches!(self, EngineStatus::Alive)
  }
}

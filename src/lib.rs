// src/lib.rs

//! rzmq-engine - the per-connection stream engine of a ZeroMQ-style messaging stack.
//!
//! An [`Engine`] sits between one connected, non-blocking socket and one
//! message [`Session`](session::Session). It is driven by a single-threaded
//! reactor: readiness callbacks move bytes through a decoder into the session
//! and from the session through an encoder onto the socket, while read and
//! write interest double as the backpressure valve.
//!
//! With the default `mio-poll` feature the crate also ships the pieces needed
//! to run engines for real: TCP and IPC transports, a mio-backed
//! [`Poller`](runtime::Poller) and the [`IoThread`](runtime::IoThread) loop.

/// The engine state machine and its status types.
pub mod engine;
/// Defines custom error types used throughout the library.
pub mod error;
/// Contains types related to message representation (Msg, MsgFlags).
pub mod message;
/// Engine, codec and session tunables.
pub mod options;
/// Codec seams and the ZMTP/1.0 framing implementation.
pub mod protocol;
/// Reactor seam, mio poller and the I/O thread loop.
pub mod runtime;
/// The session seam and the in-memory pipe session.
pub mod session;
/// Socket seam and stream transports (TCP, IPC).
pub mod transport;

pub use engine::{Engine, EngineStatus, Termination};
pub use error::ZmqError;
pub use message::{Msg, MsgFlags};
pub use options::EngineOptions;

// --- Top-Level Library Information Functions ---

/// Major version number of the library.
const VERSION_MAJOR: i32 = 0;
/// Minor version number of the library.
const VERSION_MINOR: i32 = 1;
/// Patch version number of the library.
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
///
/// # Examples
///
/// ```
/// let (major, minor, patch) = rzmq_engine::version();
/// println!("rzmq-engine version: {}.{}.{}", major, minor, patch);
/// ```
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

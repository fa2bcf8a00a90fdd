// src/session/mod.rs

pub mod pipe;

pub use pipe::PipeSession;

use crate::message::Msg;

/// The message-level peer of an engine.
///
/// The decoder writes complete messages into it, the encoder reads outbound
/// messages from it, and the engine calls [`Session::flush`] once per input
/// pass and [`Session::detach`] when the connection dies underneath it.
///
/// All methods take `&self`: a session is shared (via `Rc`) between its owner
/// and the engine's codecs on a single thread, so implementations keep their
/// state in `Cell`/`RefCell`.
pub trait Session {
  /// Offers a decoded message. Hands it back if the inbound queue is full.
  fn write(&self, msg: Msg) -> Result<(), Msg>;

  /// Takes the next outbound message, if any.
  fn read(&self) -> Option<Msg>;

  /// Publishes messages written since the previous flush to the application side.
  fn flush(&self);

  /// Tells the session its engine disconnected on its own (peer close, bad data, write error).
  fn detach(&self);
}

// src/runtime/mod.rs

//! Reactor seam and the single-threaded mio event loop that drives engines.

pub mod reactor;
#[cfg(feature = "mio-poll")]
pub mod poller;
#[cfg(feature = "mio-poll")]
pub mod io_thread;

pub use reactor::{Handle, Interest, Reactor};
#[cfg(feature = "mio-poll")]
pub use poller::Poller;
#[cfg(feature = "mio-poll")]
pub use io_thread::IoThread;

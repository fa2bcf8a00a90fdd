// src/message/flags.rs

use bitflags::bitflags;

bitflags! {
    /// Per-frame flags carried alongside a `Msg`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MsgFlags: u8 {
        /// Another frame of the same message follows.
        const MORE = 0b01;
    }
}

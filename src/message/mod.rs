//! Message frames and their flags.

mod flags;
mod msg;

pub use flags::MsgFlags;
pub use msg::Msg;

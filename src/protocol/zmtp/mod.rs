// src/protocol/zmtp/mod.rs

//! ZMTP/1.0 framing, the wire format spoken by ZeroMQ 2.x peers.
//!
//! ```text
//! frame  = length flags body
//! length = OCTET            ; total of flags + body, when < 255
//!        | %xFF 8OCTET      ; otherwise, 64-bit network order
//! flags  = OCTET            ; bit 0 = MORE
//! ```

pub mod decoder;
pub mod encoder;

pub use decoder::ZmtpDecoder;
pub use encoder::ZmtpEncoder;

// --- ZMTP/1.0 Frame Constants ---
/// Length octet announcing that an 8-byte length follows.
pub const ZMTP_LONG_LENGTH_MARKER: u8 = 0xFF;
/// Indicates more frames follow (like `MsgFlags::MORE`).
pub const ZMTP_FLAG_MORE: u8 = 0b0000_0001;
/// Longest header: marker, 8-byte length, flags.
pub const ZMTP_MAX_HEADER_LEN: usize = 1 + 8 + 1;

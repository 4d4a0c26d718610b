//! Binary protocol spoken with broker processes
//!
//! ```text
//! Opcode  Name              Body
//! 0xC0    PINGREQ           empty
//! 0xD0    PINGRESP          empty
//! 0x50    PURE_PUB          string publishId, string topic, string message
//! 0x60    QUERY_ONLINE      string topic
//! 0x70    QUERY_ONLINE_ACK  u32 online count
//! ```

pub mod codec;
pub mod constants;
pub mod packet;

pub use codec::{read_packet, write_packet};
pub use packet::{
    decode_remaining_length, encode_remaining_length, BodyReader, BodyWriter, Packet, PurePublish,
};

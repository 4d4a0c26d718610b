//! Broker wire protocol constants

/// Liveness probe
pub const PINGREQ: u8 = 0xC0;

/// Liveness answer
pub const PINGRESP: u8 = 0xD0;

/// Publish a message to every subscriber of a topic, no delivery list
pub const PURE_PUB: u8 = 0x50;

/// Ask a broker how many clients are subscribed to a topic
pub const QUERY_ONLINE: u8 = 0x60;

/// Answer to `QUERY_ONLINE`, carries one u32 count
pub const QUERY_ONLINE_ACK: u8 = 0x70;

/// Opcode bits of the header byte
pub const COMMAND_MASK: u8 = 0xF0;

/// Upper bound on remaining-length bytes (4 * 7 bits)
pub const MAX_LENGTH_BYTES: usize = 4;

/// Largest encodable body size
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

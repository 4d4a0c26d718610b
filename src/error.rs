//! Error types
//!
//! A crate-wide `Error` wraps one enum per domain. Admission rejections and
//! busy dispatches are outcomes, not errors, and never show up here.

use std::fmt;
use std::io;

/// Crate result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket level failure
    Io(io::Error),
    /// Malformed or unexpected broker frame
    Protocol(ProtocolError),
    /// Broker connection or pool failure
    Broker(BrokerError),
    /// Peer provider call failed
    Remote(RemoteError),
    /// Invalid configuration
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Broker(e) => write!(f, "Broker error: {}", e),
            Error::Remote(e) => write!(f, "Remote error: {}", e),
            Error::Config(e) => write!(f, "Config error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Broker(e) => Some(e),
            Error::Remote(e) => Some(e),
            Error::Config(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<BrokerError> for Error {
    fn from(e: BrokerError) -> Self {
        Error::Broker(e)
    }
}

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        Error::Remote(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

/// Wire protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Remaining-length field ran past four bytes
    MalformedLength,
    /// Body ended before a field was complete
    Truncated { needed: usize, remaining: usize },
    /// String field does not fit a 16-bit length prefix
    StringTooLong(usize),
    /// String field is not valid UTF-8
    InvalidUtf8,
    /// Peer answered with the wrong opcode
    UnexpectedCommand { expected: u8, actual: u8 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MalformedLength => write!(f, "Malformed remaining length"),
            ProtocolError::Truncated { needed, remaining } => {
                write!(f, "Truncated body: need {} bytes, {} left", needed, remaining)
            }
            ProtocolError::StringTooLong(len) => write!(f, "String too long: {} bytes", len),
            ProtocolError::InvalidUtf8 => write!(f, "String is not valid UTF-8"),
            ProtocolError::UnexpectedCommand { expected, actual } => write!(
                f,
                "Unexpected command: expected 0x{:02X}, got 0x{:02X}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Broker connection and pool errors
#[derive(Debug)]
pub enum BrokerError {
    /// Dial failed or timed out
    Connect { addr: String, source: io::Error },
    /// A read or write missed its deadline
    Timeout,
    /// Connection already recorded a write/protocol failure
    Dead,
    /// Pool could not hand out a connection
    NoConnection { addr: String, reason: String },
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Connect { addr, source } => {
                write!(f, "Connect to <{}> failed: {}", addr, source)
            }
            BrokerError::Timeout => write!(f, "Broker I/O timed out"),
            BrokerError::Dead => write!(f, "Connection is dead"),
            BrokerError::NoConnection { addr, reason } => {
                write!(f, "No connection to <{}>: {}", addr, reason)
            }
        }
    }
}

impl std::error::Error for BrokerError {}

/// Peer provider errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Peer could not be reached
    Connect(String),
    /// Peer answered with a non-200 HTTP status
    Status(u16),
    /// Body was unreadable or not the expected shape
    Body(String),
    /// Envelope carried a non-success application code
    Application { code: i64, msg: String },
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Connect(e) => write!(f, "Remote server can't access: {}", e),
            RemoteError::Status(code) => write!(f, "err code: {}", code),
            RemoteError::Body(e) => write!(f, "Remote server response error: {}", e),
            RemoteError::Application { code, msg } => write!(f, "[{}] {}", code, msg),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Field must be strictly positive
    NotPositive(&'static str),
    /// Address list entry is blank
    EmptyAddress(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotPositive(field) => write!(f, "{} must be greater than zero", field),
            ConfigError::EmptyAddress(list) => write!(f, "{} contains an empty address", list),
        }
    }
}

impl std::error::Error for ConfigError {}

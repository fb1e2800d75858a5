//! portcullis/src/error.rs
//! Error taxonomy for codec, framing, and connection failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors surfaced by the codec library and the per-connection machinery.
///
/// Every variant is connection-scoped: a failure closes the offending
/// connection and nothing else.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A variable-length integer had no terminating byte within its bound.
    #[error("malformed {kind}: no terminator within {max} bytes")]
    MalformedVarInt { kind: &'static str, max: usize },

    /// A fixed-width or length-declared decode ran past the end of its input.
    #[error("buffer too short decoding {kind}: need {needed} bytes, have {available}")]
    ShortBuffer {
        kind: &'static str,
        needed: usize,
        available: usize,
    },

    /// A string declared a negative length or one beyond the single-string cap.
    #[error("string length {declared} outside [0, {max}]")]
    InvalidStringLength { declared: i32, max: usize },

    /// The peer closed the stream before a declared frame body arrived.
    #[error("frame truncated: peer closed before {declared} declared bytes arrived")]
    FrameTooShort { declared: usize },

    /// A frame declared a negative or absurdly large length.
    #[error("invalid frame length: {0}")]
    InvalidFrameLength(i32),

    /// The peer closed the stream in the middle of an operation.
    #[error("connection closed")]
    ConnectionClosed,

    /// A phase that expects a specific packet saw a different id.
    #[error("unexpected packet id {actual:#04x}, expected {expected:#04x}")]
    UnexpectedPacket { expected: i32, actual: i32 },

    /// The handshake requested a next state outside {1=status, 2=login}.
    #[error("unrecognized handshake state: {0}")]
    UnrecognizedHandshakeState(i32),

    /// Dialing the configured upstream failed.
    #[error("upstream {addr} unreachable: {source}")]
    UpstreamUnreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected tag or truncated data inside an NBT document.
    #[error("malformed NBT: {0}")]
    NbtFormat(String),

    /// Registry lookup for an id nothing was registered under.
    #[error("unknown packet id: {0:#04x}")]
    UnknownPacketId(i32),

    #[error("invalid chat JSON: {0}")]
    ChatJson(#[from] serde_json::Error),

    #[error("invalid UTF-8 in string payload: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

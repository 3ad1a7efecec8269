//! Error types for the cipher core, the framing layer, and the session layer.
//!
//! GCM authentication failure gets its own variant and is never folded into
//! transport or configuration errors; it is the one security-relevant kind.

use thiserror::Error;

use crate::net::Tag;

/// Failures raised by the cipher primitives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The round count was not 10, 12, or 14.
    #[error("invalid round count: {0} (expected 10, 12, or 14)")]
    InvalidRounds(u64),

    /// GCM tag mismatch: the key was wrong or the ciphertext was altered.
    #[error("Message does not match! Refusing to decrypt!")]
    Authentication,
}

/// Failures raised by the packet framing layer.
#[derive(Debug, Error)]
pub enum NetError {
    /// A receive timed out or the peer hung up.
    #[error("failed to read from socket")]
    Recv,

    /// A send timed out or the peer hung up.
    #[error("failed to write to socket")]
    Send,

    /// A value's textual form does not fit in one packet payload.
    #[error("value exceeds packet size")]
    Oversize,

    /// A value payload did not parse as the expected type.
    #[error("malformed value payload")]
    Parse,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures raised by the peer session state machine.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Net(#[from] NetError),

    /// The peer sent a packet that makes no sense in the current sub-protocol.
    #[error("unexpected {got:?} packet while {during}")]
    Protocol { got: Tag, during: &'static str },

    /// HMAC trailer mismatch on an ECB/CTR message.
    #[error("HMAC does not match! Message has been altered!")]
    HmacMismatch,

    /// The peer declined our request.
    #[error("peer refused the request")]
    Refused,

    /// Both peers initiated the same sub-protocol at once.
    #[error("{0}")]
    Collision(&'static str),

    /// An operation that requires a connection was attempted without one.
    #[error("not connected to a peer")]
    NotConnected,
}

//! Crate-wide error taxonomy.
//!
//! Every protocol-level failure is session-local: a listener never aborts
//! because one session produced an `Error`, it just logs it and moves on.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A SOCKS5 or Shadowsocks wire message failed to parse.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    /// The requested cipher method isn't in the registry.
    #[error("unknown cipher method: {0}")]
    CipherUnknown(String),

    /// SOCKS5 username/password subnegotiation didn't match.
    #[error("authentication failed")]
    AuthFailed,

    /// SOCKS5 CMD was not CONNECT.
    #[error("command not supported: {0:#04x}")]
    CommandUnsupported(u8),

    /// Dialing the CONNECT target (or the Shadowsocks remote) failed.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[source] io::Error),

    /// Any other read/write failure on a live stream.
    #[error("transport error: {0}")]
    TransportError(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

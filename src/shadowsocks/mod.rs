//! The Shadowsocks address header shared by the first plaintext message of
//! every session.
//!
//! Grounded on `examples/original_source/protocol/ss/ss.go`'s
//! `AddressRequest`, which is the same `AddrPort` wire form SOCKS5 uses,
//! without the leading `ver`/`cmd`/`rsv` bytes.

pub mod session;

use crate::error::{Error, Result};
use crate::socks5::AddrPort;

/// `atyp (1B) | addr (variable) | port (2B, BE)`, with whatever bytes
/// followed it in the same decrypted chunk preserved as `trailing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRequest {
    pub addr: AddrPort,
    pub trailing: Vec<u8>,
}

impl AddressRequest {
    pub fn new(addr: AddrPort) -> Self {
        AddressRequest { addr, trailing: Vec::new() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.addr.to_bytes();
        buf.extend_from_slice(&self.trailing);
        buf
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 7 {
            return Err(Error::InvalidMessage("address request: too short"));
        }
        let (addr, rest) = AddrPort::parse(buf)?;
        Ok(AddressRequest { addr, trailing: rest.to_vec() })
    }
}

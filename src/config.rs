//! Configuration shared by the `sslocal` and `ssserver` binaries.
//!
//! Mirrors the teacher's `config::Config` in spirit (a `serde`-deserializable
//! struct optionally loaded from a JSON file) but scoped down to exactly what
//! a single local endpoint or a single remote endpoint needs: there is no
//! SIP002 URL form and no multi-server list here.

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn json_error(e: serde_json::Error) -> Error {
    Error::TransportError(io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Configuration for the Local role: a SOCKS5 front door bridging to one
/// Shadowsocks remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub bind_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub method: String,
    pub password: String,
}

impl LocalConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<LocalConfig> {
        let data = fs::read_to_string(path).map_err(Error::TransportError)?;
        serde_json::from_str(&data).map_err(json_error)
    }
}

/// Configuration for the Remote role: a Shadowsocks front door bridging to
/// whatever plaintext destination each session's address header names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub method: String,
    pub password: String,
}

impl ServerConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<ServerConfig> {
        let data = fs::read_to_string(path).map_err(Error::TransportError)?;
        serde_json::from_str(&data).map_err(json_error)
    }
}

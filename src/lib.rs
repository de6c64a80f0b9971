//! A tunneling proxy bridging SOCKS5 clients to remote destinations over a
//! Shadowsocks stream-cipher transport.
//!
//! Two roles are built from the same pieces: [`relay::local::run_local`]
//! runs the SOCKS5-facing front door, [`relay::server::run_remote`] runs
//! the Shadowsocks-facing one. Both are thin wiring over the codecs in
//! [`socks5`] and [`shadowsocks`], the cipher registry in [`crypto`], and
//! the relay loop in [`relay`].

pub mod config;
pub mod crypto;
pub mod error;
pub mod registry;
pub mod relay;
pub mod shadowsocks;
pub mod socks5;

pub use config::{LocalConfig, ServerConfig};
pub use error::{Error, Result};

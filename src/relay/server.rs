//! The Remote role: a Shadowsocks front door bridging to whatever
//! plaintext destination each session's address header names.
//!
//! Grounded on the teacher's `relay::tcprelay::server::TcpRelayServer` and
//! `examples/original_source/net/tunnel/ss-remote.go`'s
//! `SSRemoteTunnel.Run`: accept an encrypted client, recover its
//! destination via the IV exchange, dial that destination, then relay.

use std::sync::Arc;

use log::{info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::crypto::{self, CipherSpec};
use crate::error::{Error, Result};
use crate::registry::SessionRegistry;
use crate::relay;
use crate::shadowsocks::session::ShadowsocksServerSession;

/// Binds `config.bind_addr` and serves Shadowsocks clients until the
/// listener itself fails.
pub async fn run_remote(config: ServerConfig) -> Result<()> {
    let spec = crypto::lookup(&config.method)?;
    let listener = TcpListener::bind(config.bind_addr).await.map_err(Error::TransportError)?;
    info!("ssserver listening on {}", config.bind_addr);

    let registry = Arc::new(SessionRegistry::new());
    loop {
        let (stream, peer) = listener.accept().await.map_err(Error::TransportError)?;
        let config = config.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = serve_one(stream, config, spec).await {
                warn!("remote session with {peer} ended: {e}");
            }
        });
        registry.track(handle);
    }
}

async fn serve_one(stream: TcpStream, config: ServerConfig, spec: CipherSpec) -> Result<()> {
    let key = crypto::derive_key(spec, &config.password);
    let (ss_server, addr_req) = ShadowsocksServerSession::accept(stream, spec, key).await?;

    let target_stream = TcpStream::connect(addr_req.addr.to_string())
        .await
        .map_err(Error::UpstreamUnreachable)?;

    let (client_r, client_w) = ss_server.split();
    let (target_r, target_w) = crate::shadowsocks::session::FramedConn::new(target_stream).split();
    relay::tunnel(client_r, client_w, target_r, target_w).await
}

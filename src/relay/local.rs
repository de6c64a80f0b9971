//! The Local role: a SOCKS5 front door bridging to one Shadowsocks remote.
//!
//! Grounded on the teacher's `relay::tcprelay::local::TcpRelayLocal` and
//! `examples/original_source/net/tunnel/ss-local.go`'s `SSLocalTunnel.Run`:
//! accept a SOCKS5 client, complete its handshake, dial the Shadowsocks
//! remote with the requested destination, then relay.

use std::sync::Arc;

use log::{info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::config::LocalConfig;
use crate::crypto::{self, CipherSpec};
use crate::error::{Error, Result};
use crate::registry::SessionRegistry;
use crate::relay;
use crate::relay::socks5_session::{self, Handshake};
use crate::shadowsocks::session::{FramedConn, ShadowsocksClientSession};

/// Binds `config.bind_addr` and serves SOCKS5 clients until the listener
/// itself fails. One task per accepted connection; a single slow or wedged
/// session never blocks another.
pub async fn run_local(config: LocalConfig) -> Result<()> {
    let spec = crypto::lookup(&config.method)?;
    let listener = TcpListener::bind(config.bind_addr).await.map_err(Error::TransportError)?;
    info!("sslocal listening on {}", config.bind_addr);

    let registry = Arc::new(SessionRegistry::new());
    loop {
        let (stream, peer) = listener.accept().await.map_err(Error::TransportError)?;
        let config = config.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = serve_one(stream, config, spec).await {
                warn!("local session with {peer} ended: {e}");
            }
        });
        registry.track(handle);
    }
}

async fn serve_one(stream: TcpStream, config: LocalConfig, spec: CipherSpec) -> Result<()> {
    let handshake: Handshake<TcpStream> = socks5_session::handshake(stream, None).await?;
    let Handshake { mut stream, target, pushback } = handshake;

    let remote_stream = match TcpStream::connect(config.remote_addr).await {
        Ok(s) => s,
        Err(e) => {
            let _ = socks5_session::notify(&mut stream, &target.host(), target.port(), false).await;
            return Err(Error::UpstreamUnreachable(e));
        }
    };
    socks5_session::notify(&mut stream, &target.host(), target.port(), true).await?;

    let key = crypto::derive_key(spec, &config.password);
    let ss_client = ShadowsocksClientSession::connect(remote_stream, spec, key, target, &pushback).await?;

    let (client_r, client_w) = FramedConn::new(stream).split();
    let (remote_r, remote_w) = ss_client.split();
    relay::tunnel(client_r, client_w, remote_r, remote_w).await
}

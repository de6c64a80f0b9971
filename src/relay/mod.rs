//! The bidirectional relay loop and the two deployable roles built on it.
//!
//! Grounded on the teacher's `relay::tcprelay::{local,server}::handle_client`
//! (which spawn a pair of "pipe" futures per connection) and
//! `examples/original_source/net/tunnel/ss-local.go`/`ss-remote.go`'s
//! channel-based copy loops. The channel/future-0.1 machinery is replaced
//! with two `tokio` tasks joined by `select!`, matching §5/§9's
//! first-error-teardown contract.

pub mod local;
pub mod server;
pub mod socks5_session;

use crate::error::Result;
use crate::shadowsocks::session::{ChunkReader, ChunkWriter};

/// Pumps `reader -> writer` until either side produces a terminal error.
async fn pump<R: ChunkReader, W: ChunkWriter>(mut reader: R, mut writer: W) -> Result<()> {
    loop {
        let chunk = reader.read_chunk().await?;
        writer.write_chunk(&chunk).await?;
    }
}

/// Joins two independent byte-stream halves so each direction runs free of
/// the other. Returns as soon as either direction hits a terminal error;
/// both halves of both directions are dropped (and so closed) on return, so
/// there is no half-open forwarding.
pub async fn tunnel<RA, WA, RB, WB>(reader_a: RA, writer_a: WA, reader_b: RB, writer_b: WB) -> Result<()>
where
    RA: ChunkReader,
    WA: ChunkWriter,
    RB: ChunkReader,
    WB: ChunkWriter,
{
    tokio::select! {
        res = pump(reader_a, writer_b) => res,
        res = pump(reader_b, writer_a) => res,
    }
}

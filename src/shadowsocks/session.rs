//! Framed connections and the Shadowsocks server/client session state
//! machines.
//!
//! Grounded on `examples/original_source/net/tunnel/tconn/ss.go`
//! (`SSRConn`/`SSLConn`): a server session eagerly reads the peer's IV and
//! the address header before it is usable; a client session lazily reads
//! the peer's IV on first read, having already sent its own IV plus address
//! header on first write. Both directions' cipher instances live for
//! exactly the session's lifetime.
//!
//! Every session type exposes a `split()` that hands back an independent
//! read half and write half (backed by `tokio::io::split`'s `ReadHalf`/
//! `WriteHalf`), the way `tokio::net::TcpStream::into_split` does. The
//! relay loop in `crate::relay` drives one direction per half so the two
//! directions of one session never contend for the same `&mut self`.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::crypto::{self, stream::StreamCipher, CipherSpec};
use crate::error::{Error, Result};
use crate::shadowsocks::AddressRequest;
use crate::socks5::AddrPort;

const CHUNK_SIZE: usize = 4096;

/// One decrypted (or merely demultiplexed) application-level read.
///
/// Spelled out as an explicit `-> impl Future<...> + Send` rather than bare
/// `async fn` so the returned future's `Send`-ness is part of the trait's
/// signature: `relay::tunnel` builds this future inside a `tokio::spawn`
/// closure, which on the multi-threaded runtime requires the whole future to
/// be `Send`, and native async-fn-in-trait doesn't propagate that bound on
/// its own.
pub trait ChunkReader: Send {
    fn read_chunk(&mut self) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
}

/// One to-be-encrypted (or merely forwarded) application-level write. See
/// `ChunkReader` for why the future is spelled out explicitly.
pub trait ChunkWriter: Send {
    fn write_chunk(&mut self, data: &[u8]) -> impl std::future::Future<Output = Result<()>> + Send;
}

async fn read_chunk_raw<R: AsyncRead + Unpin + Send>(reader: &mut R) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let n = reader.read(&mut buf).await.map_err(Error::TransportError)?;
    if n == 0 {
        return Err(Error::TransportError(io::Error::new(io::ErrorKind::UnexpectedEof, "eof")));
    }
    buf.truncate(n);
    Ok(buf)
}

async fn read_exact_raw<R: AsyncRead + Unpin + Send>(reader: &mut R, n: usize) -> Result<Vec<u8>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf).await.map_err(Error::TransportError)?;
    Ok(buf)
}

async fn write_all_raw<W: AsyncWrite + Unpin + Send>(writer: &mut W, data: &[u8]) -> Result<()> {
    writer.write_all(data).await.map_err(Error::TransportError)
}

/// A thin, length-preserving wrapper over a reliable byte stream. No framing
/// is imposed beyond whatever sizes the OS delivers.
pub struct FramedConn<T> {
    inner: T,
}

impl<T> FramedConn<T> {
    pub fn new(inner: T) -> Self {
        FramedConn { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> FramedConn<T> {
    async fn read_exact_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        read_exact_raw(&mut self.inner, n).await
    }

    pub async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        read_chunk_raw(&mut self.inner).await
    }

    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        write_all_raw(&mut self.inner, data).await
    }

    /// Splits into an independent read half and write half, each plain
    /// passthrough with no cipher layer.
    pub fn split(self) -> (FramedReadHalf<T>, FramedWriteHalf<T>) {
        let (reader, writer) = tokio::io::split(self.inner);
        (FramedReadHalf { reader }, FramedWriteHalf { writer })
    }
}

pub struct FramedReadHalf<T> {
    reader: ReadHalf<T>,
}

impl<T: AsyncRead + Send> ChunkReader for FramedReadHalf<T> {
    async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        read_chunk_raw(&mut self.reader).await
    }
}

pub struct FramedWriteHalf<T> {
    writer: WriteHalf<T>,
}

impl<T: AsyncWrite + Send> ChunkWriter for FramedWriteHalf<T> {
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        write_all_raw(&mut self.writer, data).await
    }
}

/// The server side of a Shadowsocks tunnel: accepts an encrypted client
/// stream, recovers the destination, and afterwards transparently
/// encrypts/decrypts the relayed bytes.
pub struct ShadowsocksServerSession<T> {
    conn: FramedConn<T>,
    spec: CipherSpec,
    key: Vec<u8>,
    decrypter: Box<dyn StreamCipher>,
    encrypter: Option<Box<dyn StreamCipher>>,
    pushback: Option<Vec<u8>>,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ShadowsocksServerSession<T> {
    /// Reads the client's IV, decrypts the first chunk, and parses it as an
    /// `AddressRequest`. Any bytes past the address header become the
    /// session's one-shot pushback buffer.
    pub async fn accept(stream: T, spec: CipherSpec, key: Vec<u8>) -> Result<(Self, AddressRequest)> {
        let mut conn = FramedConn::new(stream);
        let iv = conn.read_exact_bytes(spec.iv_size).await?;
        let decrypter = crypto::new_decrypter(spec, &key, &iv)?;

        let mut session = ShadowsocksServerSession {
            conn,
            spec,
            key,
            decrypter,
            encrypter: None,
            pushback: None,
        };

        let first = session.conn.read_chunk().await?;
        let decrypted = session.decrypter.apply(&first);
        let addr_req = AddressRequest::parse(&decrypted)?;
        if !addr_req.trailing.is_empty() {
            session.pushback = Some(addr_req.trailing.clone());
        }
        Ok((session, addr_req))
    }

    pub async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        if let Some(buf) = self.pushback.take() {
            return Ok(buf);
        }
        let chunk = self.conn.read_chunk().await?;
        Ok(self.decrypter.apply(&chunk))
    }

    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if self.encrypter.is_none() {
            let iv = crypto::random_iv(self.spec);
            let encrypter = crypto::new_encrypter(self.spec, &self.key, &iv)?;
            self.conn.write_chunk(&iv).await?;
            self.encrypter = Some(encrypter);
        }
        let ciphertext = self.encrypter.as_mut().expect("just initialized").apply(data);
        self.conn.write_chunk(&ciphertext).await
    }

    pub fn split(self) -> (SsServerReadHalf<T>, SsServerWriteHalf<T>) {
        let (reader, writer) = tokio::io::split(self.conn.into_inner());
        (
            SsServerReadHalf { reader, decrypter: self.decrypter, pushback: self.pushback },
            SsServerWriteHalf { writer, spec: self.spec, key: self.key, encrypter: self.encrypter },
        )
    }
}

pub struct SsServerReadHalf<T> {
    reader: ReadHalf<T>,
    decrypter: Box<dyn StreamCipher>,
    pushback: Option<Vec<u8>>,
}

impl<T: AsyncRead + Send> ChunkReader for SsServerReadHalf<T> {
    async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        if let Some(buf) = self.pushback.take() {
            return Ok(buf);
        }
        let chunk = read_chunk_raw(&mut self.reader).await?;
        Ok(self.decrypter.apply(&chunk))
    }
}

pub struct SsServerWriteHalf<T> {
    writer: WriteHalf<T>,
    spec: CipherSpec,
    key: Vec<u8>,
    encrypter: Option<Box<dyn StreamCipher>>,
}

impl<T: AsyncWrite + Send> ChunkWriter for SsServerWriteHalf<T> {
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if self.encrypter.is_none() {
            let iv = crypto::random_iv(self.spec);
            let encrypter = crypto::new_encrypter(self.spec, &self.key, &iv)?;
            write_all_raw(&mut self.writer, &iv).await?;
            self.encrypter = Some(encrypter);
        }
        let ciphertext = self.encrypter.as_mut().expect("just initialized").apply(data);
        write_all_raw(&mut self.writer, &ciphertext).await
    }
}

/// The client side of a Shadowsocks tunnel: dials a remote already wrapped
/// by the caller, sends its own IV plus the address header on connect, and
/// lazily initializes its decrypter from the peer's IV on first read.
pub struct ShadowsocksClientSession<T> {
    conn: FramedConn<T>,
    spec: CipherSpec,
    key: Vec<u8>,
    encrypter: Box<dyn StreamCipher>,
    decrypter: Option<Box<dyn StreamCipher>>,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ShadowsocksClientSession<T> {
    /// Generates a fresh IV, writes it in clear, then writes the encrypted
    /// address header for `target` (with any already-available
    /// `initial_payload` folded into the same message, mirroring how a
    /// SOCKS5 client may coalesce its CONNECT request with application
    /// bytes).
    pub async fn connect(
        stream: T,
        spec: CipherSpec,
        key: Vec<u8>,
        target: AddrPort,
        initial_payload: &[u8],
    ) -> Result<Self> {
        let mut conn = FramedConn::new(stream);
        let iv = crypto::random_iv(spec);
        let mut encrypter = crypto::new_encrypter(spec, &key, &iv)?;

        conn.write_chunk(&iv).await?;
        let header = AddressRequest { addr: target, trailing: initial_payload.to_vec() };
        let ciphertext = encrypter.apply(&header.to_bytes());
        conn.write_chunk(&ciphertext).await?;

        Ok(ShadowsocksClientSession { conn, spec, key, encrypter, decrypter: None })
    }

    pub async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        if self.decrypter.is_none() {
            let iv = self.conn.read_exact_bytes(self.spec.iv_size).await?;
            self.decrypter = Some(crypto::new_decrypter(self.spec, &self.key, &iv)?);
        }
        let chunk = self.conn.read_chunk().await?;
        Ok(self.decrypter.as_mut().expect("just initialized").apply(&chunk))
    }

    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        let ciphertext = self.encrypter.apply(data);
        self.conn.write_chunk(&ciphertext).await
    }

    pub fn split(self) -> (SsClientReadHalf<T>, SsClientWriteHalf<T>) {
        let (reader, writer) = tokio::io::split(self.conn.into_inner());
        (
            SsClientReadHalf { reader, spec: self.spec, key: self.key, decrypter: self.decrypter },
            SsClientWriteHalf { writer, encrypter: self.encrypter },
        )
    }
}

pub struct SsClientReadHalf<T> {
    reader: ReadHalf<T>,
    spec: CipherSpec,
    key: Vec<u8>,
    decrypter: Option<Box<dyn StreamCipher>>,
}

impl<T: AsyncRead + Send> ChunkReader for SsClientReadHalf<T> {
    async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        if self.decrypter.is_none() {
            let iv = read_exact_raw(&mut self.reader, self.spec.iv_size).await?;
            self.decrypter = Some(crypto::new_decrypter(self.spec, &self.key, &iv)?);
        }
        let chunk = read_chunk_raw(&mut self.reader).await?;
        Ok(self.decrypter.as_mut().expect("just initialized").apply(&chunk))
    }
}

pub struct SsClientWriteHalf<T> {
    writer: WriteHalf<T>,
    encrypter: Box<dyn StreamCipher>,
}

impl<T: AsyncWrite + Send> ChunkWriter for SsClientWriteHalf<T> {
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        let ciphertext = self.encrypter.apply(data);
        write_all_raw(&mut self.writer, &ciphertext).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn client_then_server_exchange_address_and_payload() {
        let spec = crypto::lookup("aes-256-cfb").unwrap();
        let key = crypto::derive_key(spec, "abcdefg");

        let (client_io, server_io) = duplex(8192);

        let target = AddrPort::Domain("example.org".into(), 443);
        let client_task = tokio::spawn({
            let key = key.clone();
            async move {
                let mut client =
                    ShadowsocksClientSession::connect(client_io, spec, key, target, b"hello").await.unwrap();
                client.write_chunk(b" world").await.unwrap();
                client
            }
        });

        let (mut server, addr_req) = ShadowsocksServerSession::accept(server_io, spec, key).await.unwrap();
        assert_eq!(addr_req.addr, AddrPort::Domain("example.org".into(), 443));
        assert_eq!(addr_req.trailing, b"hello");

        let more = server.read_chunk().await.unwrap();
        assert_eq!(more, b" world");

        client_task.await.unwrap();
    }

    #[tokio::test]
    async fn server_to_client_direction_also_round_trips() {
        let spec = crypto::lookup("chacha20").unwrap();
        let key = crypto::derive_key(spec, "shared-secret");

        let (client_io, server_io) = duplex(8192);
        let target = AddrPort::V4(std::net::Ipv4Addr::new(10, 0, 0, 1), 80);

        let client_key = key.clone();
        let client_task = tokio::spawn(async move {
            let mut client =
                ShadowsocksClientSession::connect(client_io, spec, client_key, target, b"").await.unwrap();
            let reply = client.read_chunk().await.unwrap();
            assert_eq!(reply, b"ack");
        });

        let (mut server, _addr_req) = ShadowsocksServerSession::accept(server_io, spec, key).await.unwrap();
        server.write_chunk(b"ack").await.unwrap();

        client_task.await.unwrap();
    }

    #[tokio::test]
    async fn split_halves_relay_independently() {
        let spec = crypto::lookup("salsa20").unwrap();
        let key = crypto::derive_key(spec, "abcdefg");

        let (client_io, server_io) = duplex(8192);
        let target = AddrPort::Domain("example.org".into(), 443);

        let client_key = key.clone();
        let client_task = tokio::spawn(async move {
            let client =
                ShadowsocksClientSession::connect(client_io, spec, client_key, target, b"").await.unwrap();
            let (mut read_half, mut write_half) = client.split();
            write_half.write_chunk(b"ping").await.unwrap();
            let reply = read_half.read_chunk().await.unwrap();
            assert_eq!(reply, b"pong");
        });

        let (server, _addr_req) = ShadowsocksServerSession::accept(server_io, spec, key).await.unwrap();
        let (mut read_half, mut write_half) = server.split();
        let ping = read_half.read_chunk().await.unwrap();
        assert_eq!(ping, b"ping");
        write_half.write_chunk(b"pong").await.unwrap();

        client_task.await.unwrap();
    }
}

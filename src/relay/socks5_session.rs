//! The SOCKS5 server-side handshake state machine.
//!
//! Grounded on `examples/original_source/net/tunnel/tconn/socks5.go`'s
//! `Socks5SConn`: `Start()` drives INIT -> AUTH -> CMD, and `Notify()` is
//! called once the caller has (tried to) establish the upstream connection,
//! to send the final success/failure reply.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::socks5::{
    self, AddrPort, MethodSelectionReply, MethodSelectionRequest, Socks5Reply, Socks5Request,
    UsernamePasswordReply, UsernamePasswordRequest,
};

/// Credentials the server checks during the AUTH stage. `None` means the
/// server advertises `NoAuth`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A completed SOCKS5 handshake: the requested target plus whatever bytes
/// the client coalesced with its CONNECT request in the same write.
pub struct Handshake<T> {
    pub stream: T,
    pub target: AddrPort,
    pub pushback: Vec<u8>,
}

const BUF_SIZE: usize = 512;

/// Drives one SOCKS5 connection from the method-selection byte through a
/// parsed CONNECT request. `credentials = None` accepts clients offering
/// `NoAuth`; `Some(_)` requires a matching Username/Password exchange.
pub async fn handshake<T: AsyncRead + AsyncWrite + Unpin + Send>(
    mut stream: T,
    credentials: Option<&Credentials>,
) -> Result<Handshake<T>> {
    let mut buf = vec![0u8; BUF_SIZE];
    let n = stream.read(&mut buf).await.map_err(Error::TransportError)?;
    let req = MethodSelectionRequest::parse(&buf[..n])?;

    let chosen = if credentials.is_some() {
        socks5::METHOD_USERNAME_PASSWORD
    } else {
        socks5::METHOD_NO_AUTH
    };

    if req.ver != socks5::VERSION || !req.methods.contains(&chosen) {
        stream
            .write_all(&MethodSelectionReply::new(socks5::METHOD_NO_ACCEPTABLE).to_bytes())
            .await
            .map_err(Error::TransportError)?;
        return Err(Error::AuthFailed);
    }
    stream
        .write_all(&MethodSelectionReply::new(chosen).to_bytes())
        .await
        .map_err(Error::TransportError)?;

    if let Some(creds) = credentials {
        let n = stream.read(&mut buf).await.map_err(Error::TransportError)?;
        let auth = UsernamePasswordRequest::parse(&buf[..n])?;
        let ok = auth.uname == creds.username && auth.passwd == creds.password;
        let status = if ok { socks5::AUTH_STATUS_SUCCESS } else { socks5::AUTH_STATUS_FAILURE };
        stream
            .write_all(&UsernamePasswordReply::new(status).to_bytes())
            .await
            .map_err(Error::TransportError)?;
        if !ok {
            return Err(Error::AuthFailed);
        }
    }

    let n = stream.read(&mut buf).await.map_err(Error::TransportError)?;
    let cmd_req = Socks5Request::parse(&buf[..n])?;
    if cmd_req.cmd != socks5::CMD_CONNECT {
        stream
            .write_all(&Socks5Reply::failure(socks5::REP_CMD_NOT_SUPPORTED).to_bytes())
            .await
            .map_err(Error::TransportError)?;
        return Err(Error::CommandUnsupported(cmd_req.cmd));
    }

    Ok(Handshake { stream, target: cmd_req.addr, pushback: cmd_req.trailing })
}

/// Sends the final CONNECT reply once the caller knows whether the upstream
/// dial succeeded. The bound address echoed back is inferred from `host`
/// the same way the reference server infers it: IPv4/IPv6 literal gets its
/// own type, anything else goes out as a domain name.
pub async fn notify<T: AsyncWrite + Unpin>(
    stream: &mut T,
    host: &str,
    port: u16,
    success: bool,
) -> Result<()> {
    let rep = if success { socks5::REP_SUCCEEDED } else { socks5::REP_GENERAL_FAILURE };
    let reply = Socks5Reply::new(rep, AddrPort::for_host_port(host, port));
    stream.write_all(&reply.to_bytes()).await.map_err(Error::TransportError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn s1_no_auth_connect_handshake() {
        let (mut client, server) = duplex(4096);
        let server_task = tokio::spawn(handshake(server, None));

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x05, 0x00]);

        let mut req = vec![0x05, 0x01, 0x00, 0x03, 0x0e];
        req.extend_from_slice(b"www.example.com");
        req.extend_from_slice(&[0x00, 0x50]);
        client.write_all(&req).await.unwrap();

        let result = server_task.await.unwrap().unwrap();
        assert_eq!(result.target, AddrPort::Domain("www.example.com".into(), 80));
        assert!(result.pushback.is_empty());
    }

    #[tokio::test]
    async fn s2_username_password_success() {
        let (mut client, server) = duplex(4096);
        let creds = Credentials { username: "u".into(), password: "p".into() };
        let server_task = tokio::spawn(async move { handshake(server, Some(&creds)).await });

        client.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x05, 0x02]);

        client.write_all(&[0x01, 0x01, b'u', 0x01, b'p']).await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x01, 0x00]);

        let mut req = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
        req.extend_from_slice(&8080u16.to_be_bytes());
        client.write_all(&req).await.unwrap();

        let result = server_task.await.unwrap().unwrap();
        assert_eq!(result.target, AddrPort::V4(std::net::Ipv4Addr::new(127, 0, 0, 1), 8080));
    }

    #[tokio::test]
    async fn rejects_mismatched_credentials() {
        let (mut client, server) = duplex(4096);
        let creds = Credentials { username: "u".into(), password: "p".into() };
        let server_task = tokio::spawn(async move { handshake(server, Some(&creds)).await });

        client.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();

        client.write_all(&[0x01, 0x01, b'u', 0x01, b'x']).await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x01, 0x01]);

        assert!(matches!(server_task.await.unwrap(), Err(Error::AuthFailed)));
    }

    #[tokio::test]
    async fn unsupported_command_sends_reply_then_fails() {
        let (mut client, server) = duplex(4096);
        let server_task = tokio::spawn(handshake(server, None));

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();

        let mut req = vec![0x05, socks5::CMD_BIND, 0x00, 0x01, 0, 0, 0, 0];
        req.extend_from_slice(&0u16.to_be_bytes());
        client.write_all(&req).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], socks5::REP_CMD_NOT_SUPPORTED);

        assert!(matches!(server_task.await.unwrap(), Err(Error::CommandUnsupported(_))));
    }

    #[tokio::test]
    async fn s6_early_payload_preserved_as_pushback() {
        let (mut client, server) = duplex(4096);
        let server_task = tokio::spawn(handshake(server, None));

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();

        let mut req = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
        req.extend_from_slice(&80u16.to_be_bytes());
        let payload = vec![0x42u8; 100];
        req.extend_from_slice(&payload);
        client.write_all(&req).await.unwrap();

        let result = server_task.await.unwrap().unwrap();
        assert_eq!(result.pushback, payload);
    }
}

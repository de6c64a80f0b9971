//! SOCKS5 wire codec (RFC 1928, RFC 1929).
//!
//! Grounded on `examples/original_source/protocol/socks/{type.go,socks5.go}`
//! and the constant tables in the teacher's
//! `relay::tcprelay::local::TcpRelayLocal`. Only the CONNECT command is
//! exercised by the session state machine in `crate::relay::socks5_session`;
//! BIND and UDP ASSOCIATE are parsed/rejected but never served.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

pub const VERSION: u8 = 0x05;
#[allow(dead_code)]
pub const VERSION4: u8 = 0x04;

pub const METHOD_NO_AUTH: u8 = 0x00;
pub const METHOD_GSSAPI: u8 = 0x01;
pub const METHOD_USERNAME_PASSWORD: u8 = 0x02;
pub const METHOD_NO_ACCEPTABLE: u8 = 0xff;

pub const CMD_CONNECT: u8 = 0x01;
pub const CMD_BIND: u8 = 0x02;
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

pub const REP_SUCCEEDED: u8 = 0x00;
pub const REP_GENERAL_FAILURE: u8 = 0x01;
pub const REP_NOT_ALLOWED: u8 = 0x02;
pub const REP_NETWORK_UNREACHABLE: u8 = 0x03;
pub const REP_HOST_UNREACHABLE: u8 = 0x04;
pub const REP_CONNECTION_REFUSED: u8 = 0x05;
pub const REP_TTL_EXPIRED: u8 = 0x06;
pub const REP_CMD_NOT_SUPPORTED: u8 = 0x07;
pub const REP_ATYP_NOT_SUPPORTED: u8 = 0x08;

pub const AUTH_VERSION: u8 = 0x01;
pub const AUTH_STATUS_SUCCESS: u8 = 0x00;
pub const AUTH_STATUS_FAILURE: u8 = 0x01;

/// The address+port tuple shared, byte-for-byte, by SOCKS5 and Shadowsocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddrPort {
    V4(Ipv4Addr, u16),
    V6(Ipv6Addr, u16),
    Domain(String, u16),
}

impl AddrPort {
    pub fn port(&self) -> u16 {
        match self {
            AddrPort::V4(_, p) | AddrPort::V6(_, p) | AddrPort::Domain(_, p) => *p,
        }
    }

    pub fn host(&self) -> String {
        match self {
            AddrPort::V4(ip, _) => ip.to_string(),
            AddrPort::V6(ip, _) => ip.to_string(),
            AddrPort::Domain(name, _) => name.clone(),
        }
    }

    /// Infers the wire address type the way `Socks5SConn.Notify` does in the
    /// Go original: IPv4/IPv6 literals get their own type, everything else
    /// (including an unparsed literal) is sent as a domain name.
    pub fn for_host_port(host: &str, port: u16) -> AddrPort {
        if let Ok(v4) = host.parse::<Ipv4Addr>() {
            AddrPort::V4(v4, port)
        } else if let Ok(v6) = host.parse::<Ipv6Addr>() {
            AddrPort::V6(v6, port)
        } else {
            AddrPort::Domain(host.to_owned(), port)
        }
    }

    fn atyp(&self) -> u8 {
        match self {
            AddrPort::V4(..) => ATYP_IPV4,
            AddrPort::V6(..) => ATYP_IPV6,
            AddrPort::Domain(..) => ATYP_DOMAIN,
        }
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.atyp());
        match self {
            AddrPort::V4(ip, port) => {
                buf.extend_from_slice(&ip.octets());
                buf.extend_from_slice(&port.to_be_bytes());
            }
            AddrPort::V6(ip, port) => {
                buf.extend_from_slice(&ip.octets());
                buf.extend_from_slice(&port.to_be_bytes());
            }
            AddrPort::Domain(name, port) => {
                buf.push(name.len() as u8);
                buf.extend_from_slice(name.as_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Parses one `AddrPort` off the front of `buf`, returning it along with
    /// whatever bytes followed it unconsumed.
    pub fn parse(buf: &[u8]) -> Result<(AddrPort, &[u8])> {
        if buf.is_empty() {
            return Err(Error::InvalidMessage("addrport: empty buffer"));
        }
        let atyp = buf[0];
        let rest = &buf[1..];
        match atyp {
            ATYP_IPV4 => {
                if rest.len() < 6 {
                    return Err(Error::InvalidMessage("addrport: truncated ipv4"));
                }
                let ip = Ipv4Addr::new(rest[0], rest[1], rest[2], rest[3]);
                let port = BigEndian::read_u16(&rest[4..6]);
                Ok((AddrPort::V4(ip, port), &rest[6..]))
            }
            ATYP_IPV6 => {
                if rest.len() < 18 {
                    return Err(Error::InvalidMessage("addrport: truncated ipv6"));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&rest[..16]);
                let ip = Ipv6Addr::from(octets);
                let port = BigEndian::read_u16(&rest[16..18]);
                Ok((AddrPort::V6(ip, port), &rest[18..]))
            }
            ATYP_DOMAIN => {
                if rest.is_empty() {
                    return Err(Error::InvalidMessage("addrport: missing domain length"));
                }
                let len = rest[0] as usize;
                if rest.len() < 1 + len + 2 {
                    return Err(Error::InvalidMessage("addrport: truncated domain"));
                }
                let name = std::str::from_utf8(&rest[1..1 + len])
                    .map_err(|_| Error::InvalidMessage("addrport: domain is not ASCII/UTF-8"))?
                    .to_owned();
                let port = BigEndian::read_u16(&rest[1 + len..1 + len + 2]);
                Ok((AddrPort::Domain(name, port), &rest[1 + len + 2..]))
            }
            _ => Err(Error::InvalidMessage("addrport: unknown address type")),
        }
    }
}

impl fmt::Display for AddrPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrPort::V4(ip, port) => write!(f, "{}:{}", ip, port),
            AddrPort::V6(ip, port) => write!(f, "[{}]:{}", ip, port),
            AddrPort::Domain(name, port) => write!(f, "{}:{}", name, port),
        }
    }
}

/// `VER | NMETHODS | METHODS[]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSelectionRequest {
    pub ver: u8,
    pub methods: Vec<u8>,
}

impl MethodSelectionRequest {
    pub fn new(methods: Vec<u8>) -> Self {
        MethodSelectionRequest { ver: VERSION, methods }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::InvalidMessage("method selection: too short"));
        }
        let ver = buf[0];
        let nmethods = buf[1] as usize;
        if nmethods == 0 || 2 + nmethods != buf.len() {
            return Err(Error::InvalidMessage("method selection: bad nmethods"));
        }
        Ok(MethodSelectionRequest { ver, methods: buf[2..].to_vec() })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.methods.len());
        buf.push(self.ver);
        buf.push(self.methods.len() as u8);
        buf.extend_from_slice(&self.methods);
        buf
    }
}

/// `VER | METHOD`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSelectionReply {
    pub ver: u8,
    pub method: u8,
}

impl MethodSelectionReply {
    pub fn new(method: u8) -> Self {
        MethodSelectionReply { ver: VERSION, method }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() != 2 {
            return Err(Error::InvalidMessage("method selection reply: bad length"));
        }
        Ok(MethodSelectionReply { ver: buf[0], method: buf[1] })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        vec![self.ver, self.method]
    }
}

/// `VER | ULEN | UNAME | PLEN | PASSWD`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernamePasswordRequest {
    pub ver: u8,
    pub uname: String,
    pub passwd: String,
}

impl UsernamePasswordRequest {
    pub fn new(uname: String, passwd: String) -> Self {
        UsernamePasswordRequest { ver: AUTH_VERSION, uname, passwd }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 5 {
            return Err(Error::InvalidMessage("username/password: too short"));
        }
        let ver = buf[0];
        let ulen = buf[1] as usize;
        if ulen == 0 || buf.len() < 3 + ulen {
            return Err(Error::InvalidMessage("username/password: bad ulen"));
        }
        let uname = String::from_utf8_lossy(&buf[2..2 + ulen]).into_owned();
        let plen = buf[2 + ulen] as usize;
        if plen == 0 || buf.len() != 3 + ulen + plen {
            return Err(Error::InvalidMessage("username/password: bad plen"));
        }
        let passwd = String::from_utf8_lossy(&buf[3 + ulen..]).into_owned();
        Ok(UsernamePasswordRequest { ver, uname, passwd })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 + self.uname.len() + self.passwd.len());
        buf.push(self.ver);
        buf.push(self.uname.len() as u8);
        buf.extend_from_slice(self.uname.as_bytes());
        buf.push(self.passwd.len() as u8);
        buf.extend_from_slice(self.passwd.as_bytes());
        buf
    }
}

/// `VER | STATUS`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsernamePasswordReply {
    pub ver: u8,
    pub status: u8,
}

impl UsernamePasswordReply {
    pub fn new(status: u8) -> Self {
        UsernamePasswordReply { ver: AUTH_VERSION, status }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() != 2 {
            return Err(Error::InvalidMessage("username/password reply: bad length"));
        }
        Ok(UsernamePasswordReply { ver: buf[0], status: buf[1] })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        vec![self.ver, self.status]
    }
}

/// `VER | CMD | RSV | ATYP | DST.ADDR | DST.PORT`, plus whatever application
/// bytes the client coalesced into the same write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5Request {
    pub ver: u8,
    pub cmd: u8,
    pub addr: AddrPort,
    pub trailing: Vec<u8>,
}

impl Socks5Request {
    pub fn new(cmd: u8, addr: AddrPort) -> Self {
        Socks5Request { ver: VERSION, cmd, addr, trailing: Vec::new() }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 7 {
            return Err(Error::InvalidMessage("socks5 request: too short"));
        }
        let ver = buf[0];
        let cmd = buf[1];
        // buf[2] is RSV, ignored on read like the reference implementation.
        let (addr, rest) = AddrPort::parse(&buf[3..])?;
        Ok(Socks5Request { ver, cmd, addr, trailing: rest.to_vec() })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6 + self.trailing.len());
        buf.push(self.ver);
        buf.push(self.cmd);
        buf.push(0x00);
        self.addr.write_to(&mut buf);
        buf.extend_from_slice(&self.trailing);
        buf
    }
}

/// `VER | REP | RSV | ATYP | BND.ADDR | BND.PORT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5Reply {
    pub ver: u8,
    pub rep: u8,
    pub addr: AddrPort,
}

impl Socks5Reply {
    pub fn new(rep: u8, addr: AddrPort) -> Self {
        Socks5Reply { ver: VERSION, rep, addr }
    }

    /// A reply carrying no meaningful bound address, used for failure
    /// replies where the reference implementation echoes a zero address.
    pub fn failure(rep: u8) -> Self {
        Socks5Reply::new(rep, AddrPort::V4(Ipv4Addr::UNSPECIFIED, 0))
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 7 {
            return Err(Error::InvalidMessage("socks5 reply: too short"));
        }
        let ver = buf[0];
        let rep = buf[1];
        let (addr, _rest) = AddrPort::parse(&buf[3..])?;
        Ok(Socks5Reply { ver, rep, addr })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6);
        buf.push(self.ver);
        buf.push(self.rep);
        buf.push(0x00);
        self.addr.write_to(&mut buf);
        buf
    }
}

/// `RSV(2) | FRAG | ATYP | DST.ADDR | DST.PORT | DATA` — codec only, the UDP
/// data plane itself is out of scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5UdpMessage {
    pub frag: u8,
    pub addr: AddrPort,
    pub data: Vec<u8>,
}

impl Socks5UdpMessage {
    pub fn new(frag: u8, addr: AddrPort, data: Vec<u8>) -> Self {
        Socks5UdpMessage { frag, addr, data }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 7 {
            return Err(Error::InvalidMessage("socks5 udp message: too short"));
        }
        let frag = buf[2];
        let (addr, rest) = AddrPort::parse(&buf[3..])?;
        Ok(Socks5UdpMessage { frag, addr, data: rest.to_vec() })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.data.len());
        buf.extend_from_slice(&[0x00, 0x00]);
        buf.push(self.frag);
        self.addr.write_to(&mut buf);
        buf.extend_from_slice(&self.data);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_selection_round_trip() {
        let req = MethodSelectionRequest::new(vec![0x00, 0x02]);
        let parsed = MethodSelectionRequest::parse(&req.to_bytes()).unwrap();
        assert_eq!(req, parsed);
        assert_eq!(parsed.methods.len(), 2);
    }

    #[test]
    fn method_selection_rejects_zero_methods() {
        let buf = [VERSION, 0x00];
        assert!(MethodSelectionRequest::parse(&buf).is_err());
    }

    #[test]
    fn method_selection_rejects_length_mismatch() {
        let buf = [VERSION, 0x02, 0x00];
        assert!(MethodSelectionRequest::parse(&buf).is_err());
    }

    #[test]
    fn addrport_round_trip_v4() {
        let a = AddrPort::V4(Ipv4Addr::new(192, 168, 1, 1), 8080);
        let (parsed, rest) = AddrPort::parse(&a.to_bytes()).unwrap();
        assert_eq!(a, parsed);
        assert!(rest.is_empty());
    }

    #[test]
    fn addrport_round_trip_v6() {
        let a = AddrPort::V6(Ipv6Addr::new(1, 2, 3, 4, 5, 6, 7, 8), 443);
        let (parsed, rest) = AddrPort::parse(&a.to_bytes()).unwrap();
        assert_eq!(a, parsed);
        assert!(rest.is_empty());
    }

    #[test]
    fn addrport_round_trip_domain_with_trailing() {
        let a = AddrPort::Domain("www.example.com".to_owned(), 80);
        let mut buf = a.to_bytes();
        buf.extend_from_slice(b"extra");
        let (parsed, rest) = AddrPort::parse(&buf).unwrap();
        assert_eq!(a, parsed);
        assert_eq!(rest, b"extra");
    }

    #[test]
    fn addrport_rejects_unknown_atyp() {
        let buf = [0x02, 0x00];
        assert!(AddrPort::parse(&buf).is_err());
    }

    #[test]
    fn s1_connect_handshake_wire_bytes() {
        let req = Socks5Request::new(CMD_CONNECT, AddrPort::Domain("www.example.com".into(), 80));
        let bytes = req.to_bytes();
        let mut expected = vec![0x05, 0x01, 0x00, 0x03, 0x0e];
        expected.extend_from_slice(b"www.example.com");
        expected.extend_from_slice(&[0x00, 0x50]);
        assert_eq!(bytes, expected);

        let parsed = Socks5Request::parse(&bytes).unwrap();
        assert_eq!(parsed.addr, AddrPort::Domain("www.example.com".into(), 80));
        assert!(parsed.trailing.is_empty());
    }

    #[test]
    fn username_password_round_trip() {
        let req = UsernamePasswordRequest::new("u".into(), "p".into());
        assert_eq!(req.to_bytes(), vec![0x01, 0x01, b'u', 0x01, b'p']);
        let parsed = UsernamePasswordRequest::parse(&req.to_bytes()).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn username_password_rejects_zero_length_fields() {
        let buf = [0x01, 0x00, 0x01, b'p'];
        assert!(UsernamePasswordRequest::parse(&buf).is_err());
    }

    #[test]
    fn socks5_request_rejects_truncated_buffer() {
        assert!(Socks5Request::parse(&[0x05, 0x01, 0x00]).is_err());
    }

    #[test]
    fn udp_message_round_trip() {
        let msg = Socks5UdpMessage::new(0, AddrPort::V4(Ipv4Addr::new(1, 2, 3, 4), 53), vec![1, 2, 3]);
        let bytes = msg.to_bytes();
        assert_eq!(&bytes[0..2], &[0x00, 0x00]);
        let parsed = Socks5UdpMessage::parse(&bytes).unwrap();
        assert_eq!(parsed, msg);
    }
}

//! Typed payloads for every opcode the manager can legally receive, plus an
//! [`Encoder`] for building the replies it sends.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::{
    Error, Header, VERSION, VENDOR_VERSION,
    fields::{Reader, Writer},
    opcode::{self, Opcode},
};

/// A decoded, borrowed-from-the-datagram XDMCP payload.
///
/// Only opcodes the manager can legally receive have a variant; every other
/// (structurally valid) opcode is rejected by [`Message::decode`] with
/// [`Error::UnknownOpcode`], which the dispatcher treats the same as any
/// other malformed packet: log and drop, never reply.
#[derive(Debug)]
pub enum Message<'a> {
    Query {
        authentication_names: Vec<&'a [u8]>,
    },
    BroadcastQuery {
        authentication_names: Vec<&'a [u8]>,
    },
    IndirectQuery {
        authentication_names: Vec<&'a [u8]>,
    },
    ForwardQuery {
        target: SocketAddr,
        authentication_names: Vec<&'a [u8]>,
    },
    Request {
        display_number: u16,
        connection_types: Vec<u16>,
        connection_addresses: Vec<&'a [u8]>,
        authentication_name: &'a [u8],
        authentication_data: &'a [u8],
        authorization_names: Vec<&'a [u8]>,
        manufacturer_id: &'a [u8],
    },
    Manage {
        session_id: u32,
        display_number: u16,
        display_class: &'a [u8],
    },
    KeepAlive {
        display_number: u16,
        session_id: u32,
    },
    ManagedForward {
        origin: IpAddr,
    },
    GotManagedForward {
        origin: IpAddr,
    },
}

impl<'a> Message<'a> {
    pub(crate) fn decode(opcode: u16, body: &'a [u8]) -> Result<(Self, usize), Error> {
        let opcode = Opcode::try_from(opcode)?;
        let mut r = Reader::new(body);

        let message = match opcode {
            Opcode::Query => Self::Query {
                authentication_names: r.read_array_of_array8()?,
            },
            Opcode::BroadcastQuery => Self::BroadcastQuery {
                authentication_names: r.read_array_of_array8()?,
            },
            Opcode::IndirectQuery => Self::IndirectQuery {
                authentication_names: r.read_array_of_array8()?,
            },
            Opcode::ForwardQuery => {
                let address = r.read_array8()?;
                let port = r.read_array8()?;
                let authentication_names = r.read_array_of_array8()?;
                let target = decode_socket_addr(address, port)?;

                Self::ForwardQuery {
                    target,
                    authentication_names,
                }
            }
            Opcode::Request => {
                let display_number = r.read_card16()?;
                let connection_types = r.read_array16()?;
                let connection_addresses = r.read_array_of_array8()?;
                let authentication_name = r.read_array8()?;
                let authentication_data = r.read_array8()?;
                let authorization_names = r.read_array_of_array8()?;
                let manufacturer_id = r.read_array8()?;

                Self::Request {
                    display_number,
                    connection_types,
                    connection_addresses,
                    authentication_name,
                    authentication_data,
                    authorization_names,
                    manufacturer_id,
                }
            }
            Opcode::Manage => Self::Manage {
                session_id: r.read_card32()?,
                display_number: r.read_card16()?,
                display_class: r.read_array8()?,
            },
            Opcode::KeepAlive => Self::KeepAlive {
                display_number: r.read_card16()?,
                session_id: r.read_card32()?,
            },
            Opcode::ManagedForward => {
                let origin = decode_ip_addr(r.read_array8()?)?;
                Self::ManagedForward { origin }
            }
            Opcode::GotManagedForward => {
                let origin = decode_ip_addr(r.read_array8()?)?;
                Self::GotManagedForward { origin }
            }
            other => return Err(Error::UnknownOpcode(other.into())),
        };

        Ok((message, r.consumed()))
    }
}

/// Reconstructs an [`IpAddr`] from an XDMCP address `ARRAY8`: 4 bytes is
/// IPv4, 16 bytes is IPv6. Any other length is malformed.
fn decode_ip_addr(bytes: &[u8]) -> Result<IpAddr, Error> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into()?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into()?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => Err(Error::Truncated),
    }
}

/// Reconstructs a [`SocketAddr`] from a FORWARD_QUERY's address/port
/// `ARRAY8` pair. The port field MUST be exactly 2 bytes when present; an
/// empty port field defaults to the standard XDMCP port.
fn decode_socket_addr(address: &[u8], port: &[u8]) -> Result<SocketAddr, Error> {
    let ip = decode_ip_addr(address)?;

    let port = if port.is_empty() {
        crate::DEFAULT_PORT
    } else if port.len() == 2 {
        u16::from_be_bytes(port.try_into()?)
    } else {
        return Err(Error::Truncated);
    };

    Ok(SocketAddr::new(ip, port))
}

fn encode_ip_addr(writer: &mut Writer, addr: IpAddr) {
    match addr {
        IpAddr::V4(v4) => writer.write_array8(&v4.octets()),
        IpAddr::V6(v6) => writer.write_array8(&v6.octets()),
    }
}

/// Builds one full datagram (header + payload) for an outbound opcode.
pub struct Encoder {
    writer: Writer,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(),
        }
    }

    pub fn write_card8(&mut self, value: u8) {
        self.writer.write_card8(value);
    }

    pub fn write_card16(&mut self, value: u16) {
        self.writer.write_card16(value);
    }

    pub fn write_card32(&mut self, value: u32) {
        self.writer.write_card32(value);
    }

    pub fn write_array8(&mut self, value: &[u8]) {
        self.writer.write_array8(value);
    }

    pub fn write_array16(&mut self, value: &[u16]) {
        self.writer.write_array16(value);
    }

    pub fn write_array_of_array8(&mut self, value: &[&[u8]]) {
        self.writer.write_array_of_array8(value);
    }

    /// Patches the header's `length` field with the number of payload bytes
    /// written so far and returns the complete packet.
    ///
    /// # Test
    ///
    /// ```
    /// use xdmcp_codec::message::Encoder;
    /// use xdmcp_codec::opcode::Opcode;
    ///
    /// let mut e = Encoder::new();
    /// e.write_array8(b"hello");
    /// let bytes = e.finish(Opcode::Willing, 1);
    ///
    /// assert_eq!(&bytes[0..6], &[0x00, 0x01, 0x00, 0x06, 0x00, 0x07]);
    /// ```
    pub fn finish(self, opcode: Opcode, version: u16) -> Vec<u8> {
        let payload = self.writer.into_bytes();
        let header = Header {
            version,
            opcode: opcode.into(),
            length: payload.len() as u16,
        };

        let mut bytes = Vec::with_capacity(Header::SIZE + payload.len());
        header.encode(&mut bytes);
        bytes.extend_from_slice(&payload);
        bytes
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// WILLING reply: the manager is willing to serve this display.
///
/// # Test
///
/// ```
/// use xdmcp_codec::message::encode_willing;
///
/// let bytes = encode_willing(b"", b"Linux 6.0");
/// assert_eq!(bytes[2..4], [0x00, 0x06]);
/// ```
pub fn encode_willing(authentication_name: &[u8], status: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_array8(authentication_name);
    e.write_array8(status);
    e.finish(Opcode::Willing, VERSION)
}

/// UNWILLING reply: the manager declines to answer a direct QUERY.
pub fn encode_unwilling(status: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_array8(status);
    e.finish(Opcode::Unwilling, VERSION)
}

/// ACCEPT reply: admits a REQUEST, carrying the session id and cookie.
pub fn encode_accept(
    session_id: u32,
    authentication_name: &[u8],
    authorization_name: &[u8],
    authorization_data: &[u8],
) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_card32(session_id);
    e.write_array8(authentication_name);
    e.write_array8(authorization_name);
    e.write_array8(authorization_data);
    e.finish(Opcode::Accept, VERSION)
}

/// DECLINE reply: refuses a REQUEST, carrying an ASCII reason string.
///
/// # Test
///
/// ```
/// use xdmcp_codec::message::encode_decline;
///
/// let bytes = encode_decline(b"Maximum pending servers", b"", b"");
/// assert_eq!(bytes[2..4], [0x00, 0x0a]);
/// ```
pub fn encode_decline(status: &[u8], authentication_name: &[u8], authentication_data: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_array8(status);
    e.write_array8(authentication_name);
    e.write_array8(authentication_data);
    e.finish(Opcode::Decline, VERSION)
}

/// REFUSE reply: a MANAGE for a session id the manager has no record of.
pub fn encode_refuse(session_id: u32) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_card32(session_id);
    e.finish(Opcode::Refuse, VERSION)
}

/// FAILED reply: the slave spawn collaborator could not start a session.
pub fn encode_failed(session_id: u32, status: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_card32(session_id);
    e.write_array8(status);
    e.finish(Opcode::Failed, VERSION)
}

/// ALIVE reply to KEEPALIVE.
pub fn encode_alive(session_running: u8, session_id: u32) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_card8(session_running);
    e.write_card32(session_id);
    e.finish(Opcode::Alive, VERSION)
}

/// FORWARD_QUERY we emit on behalf of an indirect client.
pub fn encode_forward_query(client: SocketAddr, authentication_names: &[&[u8]]) -> Vec<u8> {
    let mut e = Encoder::new();
    encode_ip_addr(&mut e.writer, client.ip());
    e.write_array8(&client.port().to_be_bytes());
    e.write_array_of_array8(authentication_names);
    e.finish(Opcode::ForwardQuery, VERSION)
}

/// MANAGED_FORWARD (vendor, version 1001): tells a peer manager that the
/// indirect client at `origin` is now being managed, so the peer should
/// offer it to its chooser.
pub fn encode_managed_forward(origin: IpAddr) -> Vec<u8> {
    let mut e = Encoder::new();
    encode_ip_addr(&mut e.writer, origin);
    e.finish(Opcode::ManagedForward, VENDOR_VERSION)
}

/// GOT_MANAGED_FORWARD (vendor, version 1001): acknowledges a received
/// MANAGED_FORWARD, cancelling the sender's retransmit timer.
pub fn encode_got_managed_forward(origin: IpAddr) -> Vec<u8> {
    let mut e = Encoder::new();
    encode_ip_addr(&mut e.writer, origin);
    e.finish(Opcode::GotManagedForward, VENDOR_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_query_with_names() {
        let mut w = Writer::new();
        w.write_array_of_array8(&[b"MIT-MAGIC-COOKIE-1"]);
        let body = w.into_bytes();

        let (message, consumed) = Message::decode(opcode::QUERY, &body).unwrap();
        assert_eq!(consumed, body.len());

        match message {
            Message::Query { authentication_names } => {
                assert_eq!(authentication_names, vec![b"MIT-MAGIC-COOKIE-1".as_slice()]);
            }
            _ => panic!("expected Query"),
        }
    }

    #[test]
    fn decodes_forward_query_with_default_port() {
        let mut w = Writer::new();
        w.write_array8(&[10, 0, 0, 5]);
        w.write_array8(&[]);
        w.write_array_of_array8(&[]);
        let body = w.into_bytes();

        let (message, _) = Message::decode(opcode::FORWARD_QUERY, &body).unwrap();
        match message {
            Message::ForwardQuery { target, .. } => {
                assert_eq!(target, "10.0.0.5:177".parse().unwrap());
            }
            _ => panic!("expected ForwardQuery"),
        }
    }

    #[test]
    fn decodes_manage() {
        let mut w = Writer::new();
        w.write_card32(42);
        w.write_card16(1);
        w.write_array8(b"MIT-Sun");
        let body = w.into_bytes();

        let (message, consumed) = Message::decode(opcode::MANAGE, &body).unwrap();
        assert_eq!(consumed, body.len());

        match message {
            Message::Manage { session_id, display_number, display_class } => {
                assert_eq!(session_id, 42);
                assert_eq!(display_number, 1);
                assert_eq!(display_class, b"MIT-Sun");
            }
            _ => panic!("expected Manage"),
        }
    }

    #[test]
    fn rejects_reply_only_opcodes() {
        assert!(Message::decode(opcode::WILLING, &[]).is_err());
        assert!(Message::decode(opcode::ACCEPT, &[]).is_err());
    }

    #[test]
    fn managed_forward_round_trips_through_encoder() {
        let origin: IpAddr = "10.0.0.9".parse().unwrap();
        let bytes = encode_managed_forward(origin);
        let (header, message) = crate::Decoder.decode(&bytes).unwrap();

        assert_eq!(header.version, VENDOR_VERSION);
        match message {
            Message::ManagedForward { origin: decoded } => assert_eq!(decoded, origin),
            _ => panic!("expected ManagedForward"),
        }
    }
}

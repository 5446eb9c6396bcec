//! ## X Display Manager Control Protocol (XDMCP)
//!
//! [XDMCP]: https://www.x.org/releases/X11R7.7/doc/libXdmcp/xdmcp.html
//!
//! XDMCP is a UDP-based protocol by which an X display requests and
//! maintains a login session from a display-management daemon. Every
//! packet carries a fixed header (version, opcode, payload length) followed
//! by a small set of fixed-width and length-prefixed field types.

pub mod fields;
pub mod header;
pub mod message;
pub mod opcode;

use std::{array::TryFromSliceError, str::Utf8Error};

pub use header::Header;
pub use message::{Encoder, Message};
pub use opcode::Opcode;

/// Standard XDMCP protocol version, carried by all opcodes except the two
/// vendor forwarding opcodes.
pub const VERSION: u16 = 1;

/// Version carried by the vendor MANAGED_FORWARD/GOT_MANAGED_FORWARD opcodes.
pub const VENDOR_VERSION: u16 = 1001;

/// Default UDP port XDMCP managers listen on.
pub const DEFAULT_PORT: u16 = 177;

#[derive(Debug)]
pub enum Error {
    /// The packet is shorter than its header, or a length-prefixed field
    /// claims more bytes than remain in the buffer.
    Truncated,
    /// The header's declared `length` does not match the number of bytes
    /// actually consumed while parsing the payload.
    LengthMismatch,
    /// Header version is neither 1 (standard) nor 1001 (vendor).
    UnknownVersion(u16),
    /// No `Message` variant is defined for this opcode.
    UnknownOpcode(u16),
    Utf8(Utf8Error),
    TryFromSlice(TryFromSliceError),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8(value)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSlice(value)
    }
}

/// Decodes a full datagram into its header and typed payload.
///
/// The decoder holds no state between calls; XDMCP packets, unlike STUN
/// messages, have no shared attribute cache worth amortizing across
/// datagrams.
#[derive(Default)]
pub struct Decoder;

impl Decoder {
    /// # Test
    ///
    /// ```
    /// use xdmcp_codec::{Decoder, Message};
    ///
    /// let buffer = [
    ///     0x00, 0x01, 0x00, 0x02, 0x00, 0x01, 0x00,
    /// ];
    ///
    /// let (header, message) = Decoder::default().decode(&buffer).unwrap();
    /// assert_eq!(header.version, 1);
    ///
    /// match message {
    ///     Message::Query { authentication_names } => {
    ///         assert_eq!(authentication_names.len(), 0);
    ///     }
    ///     _ => panic!("expected Query"),
    /// }
    /// ```
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<(Header, Message<'a>), Error> {
        let header = Header::decode(bytes)?;

        if header.version != VERSION && header.version != VENDOR_VERSION {
            return Err(Error::UnknownVersion(header.version));
        }

        let body = &bytes[Header::SIZE..];
        if body.len() < header.length as usize {
            return Err(Error::Truncated);
        }

        let (message, consumed) = Message::decode(header.opcode, &body[..header.length as usize])?;
        if consumed != header.length as usize {
            return Err(Error::LengthMismatch);
        }

        Ok((header, message))
    }
}

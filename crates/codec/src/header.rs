use crate::Error;

/// The fixed 6-byte XDMCP header: version, opcode, and the length in bytes
/// of the payload that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub opcode: u16,
    pub length: u16,
}

impl Header {
    pub const SIZE: usize = 6;

    /// # Test
    ///
    /// ```
    /// use xdmcp_codec::Header;
    ///
    /// let header = Header { version: 1, opcode: 2, length: 0 };
    /// let mut buffer = Vec::new();
    /// header.encode(&mut buffer);
    ///
    /// assert_eq!(buffer, [0x00, 0x01, 0x00, 0x02, 0x00, 0x00]);
    /// assert_eq!(Header::decode(&buffer).unwrap(), header);
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < Self::SIZE {
            return Err(Error::Truncated);
        }

        Ok(Self {
            version: u16::from_be_bytes(bytes[0..2].try_into()?),
            opcode: u16::from_be_bytes(bytes[2..4].try_into()?),
            length: u16::from_be_bytes(bytes[4..6].try_into()?),
        })
    }

    pub fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.version.to_be_bytes());
        bytes.extend_from_slice(&self.opcode.to_be_bytes());
        bytes.extend_from_slice(&self.length.to_be_bytes());
    }
}

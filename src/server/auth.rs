//! Connection handshake
//!
//! The first byte a client sends selects the byte order for the whole
//! connection. The rest of the setup request names an authorization protocol;
//! when enforcement is on, any named protocol is refused since none is
//! implemented.

use crate::protocol::{
    write_setup_failed, ByteOrder, ReadError, ServerInfo, SetupRequest, WriteError, XProtoReader,
    XProtoWriter,
};
use std::error::Error;
use std::fmt;
use std::io::{self, Read, Write};

#[derive(Debug)]
pub enum HandshakeError {
    /// The first byte was neither `B` nor `l`
    BadOrderByte(u8),
    Read(ReadError),
    Write(WriteError),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::BadOrderByte(b) => write!(f, "invalid byte order 0x{:02x}", b),
            HandshakeError::Read(e) => write!(f, "{}", e),
            HandshakeError::Write(e) => write!(f, "{}", e),
        }
    }
}

impl Error for HandshakeError {}

impl From<ReadError> for HandshakeError {
    fn from(err: ReadError) -> Self {
        HandshakeError::Read(err)
    }
}

impl From<WriteError> for HandshakeError {
    fn from(err: WriteError) -> Self {
        HandshakeError::Write(err)
    }
}

impl From<io::Error> for HandshakeError {
    fn from(err: io::Error) -> Self {
        HandshakeError::Read(ReadError(err))
    }
}

/// Read the order byte and its unused companion.
pub fn read_byte_order<R: Read>(input: &mut R) -> Result<ByteOrder, HandshakeError> {
    let mut head = [0u8; 2];
    input.read_exact(&mut head)?;
    ByteOrder::from_order_byte(head[0]).ok_or(HandshakeError::BadOrderByte(head[0]))
}

/// Outcome of a completed handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Refused(String),
}

pub struct AuthManager {
    enforce: bool,
}

impl AuthManager {
    pub fn new(enforce: bool) -> Self {
        AuthManager { enforce }
    }

    /// Read the setup request and answer it. The reader and writer must
    /// already be set to the connection's byte order.
    pub fn authenticate<R: Read, W: Write>(
        &self,
        reader: &mut XProtoReader<R>,
        writer: &mut XProtoWriter<W>,
        info: &ServerInfo,
    ) -> Result<Admission, HandshakeError> {
        let request = SetupRequest::read_body(reader)?;
        log::debug!(
            "Setup request: protocol {}.{}, auth {:?}",
            request.protocol_major_version,
            request.protocol_minor_version,
            request.authorization_protocol_name
        );

        let name = &request.authorization_protocol_name;
        if self.enforce && !name.is_empty() {
            let reason = format!("Unknown auth {}", name);
            write_setup_failed(writer, &reason)?;
            return Ok(Admission::Refused(reason));
        }

        info.write_success(writer)?;
        Ok(Admission::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn setup_body(auth_name: &str) -> Vec<u8> {
        let mut body = vec![11, 0, 0, 0];
        body.extend_from_slice(&(auth_name.len() as u16).to_le_bytes());
        body.extend_from_slice(&[0, 0, 0, 0]);
        body.extend_from_slice(auth_name.as_bytes());
        body.resize(body.len() + crate::protocol::pad(auth_name.len()), 0);
        body
    }

    #[test]
    fn test_order_byte() {
        assert_eq!(
            read_byte_order(&mut Cursor::new(vec![0x6c, 0])).unwrap(),
            ByteOrder::LSBFirst
        );
        assert_eq!(
            read_byte_order(&mut Cursor::new(vec![0x42, 0])).unwrap(),
            ByteOrder::MSBFirst
        );
        assert!(matches!(
            read_byte_order(&mut Cursor::new(vec![0x00, 0])),
            Err(HandshakeError::BadOrderByte(0))
        ));
        assert!(matches!(
            read_byte_order(&mut Cursor::new(vec![0x6c])),
            Err(HandshakeError::Read(_))
        ));
    }

    #[test]
    fn test_refused_when_enforced() {
        let info = ServerInfo::new(640, 480);
        let mut reader =
            XProtoReader::new(Cursor::new(setup_body("MIT-MAGIC-COOKIE-1")), ByteOrder::LSBFirst);
        let mut writer = XProtoWriter::new(Vec::new(), ByteOrder::LSBFirst);

        let admission = AuthManager::new(true)
            .authenticate(&mut reader, &mut writer, &info)
            .unwrap();
        assert_eq!(
            admission,
            Admission::Refused("Unknown auth MIT-MAGIC-COOKIE-1".to_string())
        );
        let bytes = writer.into_inner();
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[1] as usize, "Unknown auth MIT-MAGIC-COOKIE-1".len());
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 11);
    }

    #[test]
    fn test_accepted_without_name_or_enforcement() {
        let info = ServerInfo::new(640, 480);
        for (enforce, name) in [(true, ""), (false, "MIT-MAGIC-COOKIE-1")] {
            let mut reader = XProtoReader::new(Cursor::new(setup_body(name)), ByteOrder::LSBFirst);
            let mut writer = XProtoWriter::new(Vec::new(), ByteOrder::LSBFirst);
            let admission = AuthManager::new(enforce)
                .authenticate(&mut reader, &mut writer, &info)
                .unwrap();
            assert_eq!(admission, Admission::Accepted);
            assert_eq!(writer.into_inner()[0], 1);
        }
    }
}

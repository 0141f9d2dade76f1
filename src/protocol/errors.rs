//! X11 protocol error codes and error handling

use super::codec::ReadError;
use super::packet::PacketWriter;
use super::ByteOrder;
use std::error::Error;
use std::fmt;

/// X11 error codes as defined in the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Request = 1,
    Value = 2,
    Window = 3,
    Pixmap = 4,
    Atom = 5,
    Cursor = 6,
    Font = 7,
    Match = 8,
    Drawable = 9,
    Access = 10,
    Alloc = 11,
    Colormap = 12,
    GContext = 13,
    IDChoice = 14,
    Name = 15,
    Length = 16,
    Implementation = 17,
}

impl ErrorCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(ErrorCode::Request),
            2 => Some(ErrorCode::Value),
            3 => Some(ErrorCode::Window),
            4 => Some(ErrorCode::Pixmap),
            5 => Some(ErrorCode::Atom),
            6 => Some(ErrorCode::Cursor),
            7 => Some(ErrorCode::Font),
            8 => Some(ErrorCode::Match),
            9 => Some(ErrorCode::Drawable),
            10 => Some(ErrorCode::Access),
            11 => Some(ErrorCode::Alloc),
            12 => Some(ErrorCode::Colormap),
            13 => Some(ErrorCode::GContext),
            14 => Some(ErrorCode::IDChoice),
            15 => Some(ErrorCode::Name),
            16 => Some(ErrorCode::Length),
            17 => Some(ErrorCode::Implementation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Request => "Request: bad request code",
            ErrorCode::Value => "Value: integer parameter out of range",
            ErrorCode::Window => "Window: invalid Window parameter",
            ErrorCode::Pixmap => "Pixmap: invalid Pixmap parameter",
            ErrorCode::Atom => "Atom: invalid Atom parameter",
            ErrorCode::Cursor => "Cursor: invalid Cursor parameter",
            ErrorCode::Font => "Font: invalid Font parameter",
            ErrorCode::Match => "Match: parameter mismatch",
            ErrorCode::Drawable => "Drawable: invalid Drawable parameter",
            ErrorCode::Access => "Access: attempt to access private resource",
            ErrorCode::Alloc => "Alloc: insufficient resources",
            ErrorCode::Colormap => "Colormap: invalid Colormap parameter",
            ErrorCode::GContext => "GContext: invalid GC parameter",
            ErrorCode::IDChoice => "IDChoice: invalid resource ID for this connection",
            ErrorCode::Name => "Name: font or color name doesn't exist",
            ErrorCode::Length => "Length: request length incorrect",
            ErrorCode::Implementation => "Implementation: server implementation error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A protocol error raised by a request handler.
///
/// Handlers only know the offending value; the sequencer fills in the
/// opcodes of the packet being processed and the sequence number when the
/// record is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X11Error {
    pub code: ErrorCode,
    pub bad_value: u32,
    pub minor_opcode: u16,
    pub major_opcode: u8,
}

impl X11Error {
    pub fn new(code: ErrorCode, bad_value: u32) -> Self {
        X11Error {
            code,
            bad_value,
            minor_opcode: 0,
            major_opcode: 0,
        }
    }

    pub fn with_opcodes(mut self, major_opcode: u8, minor_opcode: u16) -> Self {
        self.major_opcode = major_opcode;
        self.minor_opcode = minor_opcode;
        self
    }

    /// Encode error to wire format (32 bytes)
    pub fn encode(&self, sequence: u16, byte_order: ByteOrder) -> Vec<u8> {
        let mut w = PacketWriter::new(byte_order);
        w.write_byte(0); // Error reply type
        w.write_byte(self.code as u8);
        w.write_card16(sequence);
        w.write_card32(self.bad_value);
        w.write_card16(self.minor_opcode);
        w.write_byte(self.major_opcode);
        w.write_padding(21);
        w.into_body()
    }
}

impl fmt::Display for X11Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X11 Error: {} (value: 0x{:08x}, major: {}, minor: {})",
            self.code, self.bad_value, self.major_opcode, self.minor_opcode
        )
    }
}

impl Error for X11Error {}

/// Result type for X11 operations
pub type X11Result<T> = Result<T, X11Error>;

/// Helper functions to create common errors
impl X11Error {
    pub fn bad_request() -> Self {
        X11Error::new(ErrorCode::Request, 0)
    }

    pub fn bad_value(value: u32) -> Self {
        X11Error::new(ErrorCode::Value, value)
    }

    pub fn bad_window(window: u32) -> Self {
        X11Error::new(ErrorCode::Window, window)
    }

    pub fn bad_pixmap(pixmap: u32) -> Self {
        X11Error::new(ErrorCode::Pixmap, pixmap)
    }

    pub fn bad_atom(atom: u32) -> Self {
        X11Error::new(ErrorCode::Atom, atom)
    }

    pub fn bad_cursor(cursor: u32) -> Self {
        X11Error::new(ErrorCode::Cursor, cursor)
    }

    pub fn bad_font(font: u32) -> Self {
        X11Error::new(ErrorCode::Font, font)
    }

    pub fn bad_match() -> Self {
        X11Error::new(ErrorCode::Match, 0)
    }

    pub fn bad_drawable(drawable: u32) -> Self {
        X11Error::new(ErrorCode::Drawable, drawable)
    }

    pub fn bad_access() -> Self {
        X11Error::new(ErrorCode::Access, 0)
    }

    pub fn bad_alloc() -> Self {
        X11Error::new(ErrorCode::Alloc, 0)
    }

    pub fn bad_colormap(colormap: u32) -> Self {
        X11Error::new(ErrorCode::Colormap, colormap)
    }

    pub fn bad_gc(gc: u32) -> Self {
        X11Error::new(ErrorCode::GContext, gc)
    }

    pub fn bad_id_choice(id: u32) -> Self {
        X11Error::new(ErrorCode::IDChoice, id)
    }

    pub fn bad_name() -> Self {
        X11Error::new(ErrorCode::Name, 0)
    }

    pub fn bad_length() -> Self {
        X11Error::new(ErrorCode::Length, 0)
    }

    pub fn implementation_error() -> Self {
        X11Error::new(ErrorCode::Implementation, 0)
    }
}

/// Outcome of a request handler that did not succeed.
#[derive(Debug)]
pub enum HandlerError {
    /// Reported to the client as an error record; the connection keeps serving.
    Protocol(X11Error),
    /// A server-side logic failure; the connection is closed.
    Fatal(String),
}

impl HandlerError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        HandlerError::Fatal(msg.into())
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Protocol(err) => write!(f, "{}", err),
            HandlerError::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

impl Error for HandlerError {}

impl From<X11Error> for HandlerError {
    fn from(err: X11Error) -> Self {
        HandlerError::Protocol(err)
    }
}

/// Running off the end of a request body means the declared length was wrong.
impl From<ReadError> for HandlerError {
    fn from(_: ReadError) -> Self {
        HandlerError::Protocol(X11Error::bad_length())
    }
}

impl From<ReadError> for X11Error {
    fn from(_: ReadError) -> Self {
        X11Error::bad_length()
    }
}

pub type HandlerResult = Result<(), HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_record_layout() {
        let err = X11Error::bad_window(0x0040_0001).with_opcodes(8, 0);
        let bytes = err.encode(0x1234, ByteOrder::LSBFirst);
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[1], ErrorCode::Window as u8);
        assert_eq!(&bytes[2..4], &[0x34, 0x12]);
        assert_eq!(&bytes[4..8], &[0x01, 0x00, 0x40, 0x00]);
        assert_eq!(bytes[10], 8);
        assert!(bytes[11..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_error_record_msb() {
        let err = X11Error::bad_atom(7).with_opcodes(17, 0);
        let bytes = err.encode(1, ByteOrder::MSBFirst);
        assert_eq!(&bytes[2..4], &[0, 1]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 7]);
    }

    #[test]
    fn test_read_error_becomes_length_error() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short");
        match HandlerError::from(ReadError(io)) {
            HandlerError::Protocol(err) => assert_eq!(err.code, ErrorCode::Length),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_code_from_u8() {
        assert_eq!(ErrorCode::from_u8(13), Some(ErrorCode::GContext));
        assert_eq!(ErrorCode::from_u8(0), None);
        assert_eq!(ErrorCode::from_u8(18), None);
    }
}

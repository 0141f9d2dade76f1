//! Wire codec for the X11 primitive types
//!
//! `XProtoReader` and `XProtoWriter` wrap any `Read`/`Write` and apply the
//! byte order negotiated at connection start. The same reader type parses the
//! socket during the handshake and the in-memory body of every packet.

use super::{pad, ByteOrder};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::error::Error;
use std::fmt;
use std::io::{self, Read, Write};

/// A short or failed read. Fatal for the connection that produced it.
#[derive(Debug)]
pub struct ReadError(pub io::Error);

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "read failed: {}", self.0)
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> Self {
        ReadError(err)
    }
}

/// A failed write to the client.
#[derive(Debug)]
pub struct WriteError(pub io::Error);

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write failed: {}", self.0)
    }
}

impl Error for WriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl From<io::Error> for WriteError {
    fn from(err: io::Error) -> Self {
        WriteError(err)
    }
}

/// X11 strings are Latin-1 on the wire.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Characters outside Latin-1 are replaced with `?`.
pub fn string_to_latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
        .collect()
}

pub struct XProtoReader<R> {
    inner: R,
    byte_order: ByteOrder,
}

impl<R: Read> XProtoReader<R> {
    pub fn new(inner: R, byte_order: ByteOrder) -> Self {
        XProtoReader { inner, byte_order }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_byte(&mut self) -> Result<u8, ReadError> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_bool(&mut self) -> Result<bool, ReadError> {
        Ok(self.read_byte()? != 0)
    }

    pub fn read_card16(&mut self) -> Result<u16, ReadError> {
        let value = match self.byte_order {
            ByteOrder::MSBFirst => self.inner.read_u16::<BigEndian>()?,
            ByteOrder::LSBFirst => self.inner.read_u16::<LittleEndian>()?,
        };
        Ok(value)
    }

    pub fn read_int16(&mut self) -> Result<i16, ReadError> {
        Ok(self.read_card16()? as i16)
    }

    /// CARD32 is read as two CARD16 halves; the order of the halves follows
    /// the connection byte order.
    pub fn read_card32(&mut self) -> Result<u32, ReadError> {
        let first = self.read_card16()? as u32;
        let second = self.read_card16()? as u32;
        Ok(match self.byte_order {
            ByteOrder::MSBFirst => (first << 16) | second,
            ByteOrder::LSBFirst => (second << 16) | first,
        })
    }

    pub fn read_int32(&mut self) -> Result<i32, ReadError> {
        Ok(self.read_card32()? as i32)
    }

    pub fn read_padding(&mut self, count: usize) -> Result<(), ReadError> {
        let mut scratch = [0u8; 32];
        let mut left = count;
        while left > 0 {
            let chunk = left.min(scratch.len());
            self.inner.read_exact(&mut scratch[..chunk])?;
            left -= chunk;
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, ReadError> {
        let mut buf = vec![0u8; count];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// `count` bytes followed by the padding up to a 4-byte boundary.
    pub fn read_padded_bytes(&mut self, count: usize) -> Result<Vec<u8>, ReadError> {
        let buf = self.read_bytes(count)?;
        self.read_padding(pad(count))?;
        Ok(buf)
    }

    pub fn read_string(&mut self, count: usize) -> Result<String, ReadError> {
        Ok(latin1_to_string(&self.read_bytes(count)?))
    }

    pub fn read_padded_string(&mut self, count: usize) -> Result<String, ReadError> {
        Ok(latin1_to_string(&self.read_padded_bytes(count)?))
    }

    /// `count` CHAR2B characters, byte1 first regardless of byte order.
    pub fn read_string16(&mut self, count: usize) -> Result<Vec<u16>, ReadError> {
        let raw = self.read_bytes(count * 2)?;
        Ok(raw
            .chunks_exact(2)
            .map(|pair| ((pair[0] as u16) << 8) | pair[1] as u16)
            .collect())
    }

    /// Padding is computed on the byte length, `2 * count`.
    pub fn read_padded_string16(&mut self, count: usize) -> Result<Vec<u16>, ReadError> {
        let chars = self.read_string16(count)?;
        self.read_padding(pad(count * 2))?;
        Ok(chars)
    }
}

pub struct XProtoWriter<W> {
    inner: W,
    byte_order: ByteOrder,
}

impl<W: Write> XProtoWriter<W> {
    pub fn new(inner: W, byte_order: ByteOrder) -> Self {
        XProtoWriter { inner, byte_order }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_byte(&mut self, value: u8) -> Result<(), WriteError> {
        Ok(self.inner.write_u8(value)?)
    }

    pub fn write_card16(&mut self, value: u16) -> Result<(), WriteError> {
        match self.byte_order {
            ByteOrder::MSBFirst => self.inner.write_u16::<BigEndian>(value)?,
            ByteOrder::LSBFirst => self.inner.write_u16::<LittleEndian>(value)?,
        }
        Ok(())
    }

    pub fn write_int16(&mut self, value: i16) -> Result<(), WriteError> {
        self.write_card16(value as u16)
    }

    /// Mirror of `XProtoReader::read_card32`: two CARD16 halves.
    pub fn write_card32(&mut self, value: u32) -> Result<(), WriteError> {
        let high = (value >> 16) as u16;
        let low = (value & 0xffff) as u16;
        match self.byte_order {
            ByteOrder::MSBFirst => {
                self.write_card16(high)?;
                self.write_card16(low)
            }
            ByteOrder::LSBFirst => {
                self.write_card16(low)?;
                self.write_card16(high)
            }
        }
    }

    pub fn write_padding(&mut self, count: usize) -> Result<(), WriteError> {
        let zeros = [0u8; 32];
        let mut left = count;
        while left > 0 {
            let chunk = left.min(zeros.len());
            self.inner.write_all(&zeros[..chunk])?;
            left -= chunk;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        Ok(self.inner.write_all(bytes)?)
    }

    pub fn write_padded_bytes(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        self.write_bytes(bytes)?;
        self.write_padding(pad(bytes.len()))
    }

    pub fn write_padded_string(&mut self, s: &str) -> Result<(), WriteError> {
        self.write_padded_bytes(&string_to_latin1(s))
    }

    pub fn flush(&mut self) -> Result<(), WriteError> {
        Ok(self.inner.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn written(order: ByteOrder, f: impl FnOnce(&mut XProtoWriter<Vec<u8>>)) -> Vec<u8> {
        let mut writer = XProtoWriter::new(Vec::new(), order);
        f(&mut writer);
        writer.into_inner()
    }

    #[test]
    fn test_card32_layout_matches_native_encodings() {
        let msb = written(ByteOrder::MSBFirst, |w| w.write_card32(0x1234_5678).unwrap());
        let lsb = written(ByteOrder::LSBFirst, |w| w.write_card32(0x1234_5678).unwrap());
        assert_eq!(msb, 0x1234_5678u32.to_be_bytes());
        assert_eq!(lsb, 0x1234_5678u32.to_le_bytes());
    }

    #[test]
    fn test_card32_read_from_halves() {
        let mut reader = XProtoReader::new(Cursor::new(vec![0x78, 0x56, 0x34, 0x12]), ByteOrder::LSBFirst);
        assert_eq!(reader.read_card32().unwrap(), 0x1234_5678);

        let mut reader = XProtoReader::new(Cursor::new(vec![0x12, 0x34, 0x56, 0x78]), ByteOrder::MSBFirst);
        assert_eq!(reader.read_card32().unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_padded_string_consumes_alignment() {
        let bytes = written(ByteOrder::LSBFirst, |w| {
            w.write_padded_string("hello").unwrap();
            w.write_byte(0xAA).unwrap();
        });
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[5..8], &[0, 0, 0]);

        let mut reader = XProtoReader::new(Cursor::new(bytes), ByteOrder::LSBFirst);
        assert_eq!(reader.read_padded_string(5).unwrap(), "hello");
        assert_eq!(reader.read_byte().unwrap(), 0xAA);
    }

    #[test]
    fn test_string16_padding_uses_doubled_length() {
        // 3 chars = 6 bytes, padded to 8
        let data = vec![0, b'a', 0, b'b', 0x01, 0x02, 0, 0, 0xEE];
        let mut reader = XProtoReader::new(Cursor::new(data), ByteOrder::MSBFirst);
        let chars = reader.read_padded_string16(3).unwrap();
        assert_eq!(chars, vec![b'a' as u16, b'b' as u16, 0x0102]);
        assert_eq!(reader.read_byte().unwrap(), 0xEE);
    }

    #[test]
    fn test_short_read_is_error() {
        let mut reader = XProtoReader::new(Cursor::new(vec![1u8]), ByteOrder::LSBFirst);
        assert!(reader.read_card16().is_err());
    }

    #[test]
    fn test_latin1_round_trip() {
        let bytes = vec![b'c', 0xE9, b'!'];
        assert_eq!(string_to_latin1(&latin1_to_string(&bytes)), bytes);
        assert_eq!(string_to_latin1("\u{263A}"), vec![b'?']);
    }
}

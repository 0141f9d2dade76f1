//! Request packets, reply scratch buffers and the buffer pool behind them

use super::codec::{string_to_latin1, ReadError, XProtoReader};
use super::{pad, ByteOrder};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use std::io::{self, Cursor, Read};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// Buffers kept around for reuse; anything beyond this is dropped.
const MAX_POOLED_BUFFERS: usize = 32;

/// Free list of request buffers keyed by their allocated size.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Arc<Self> {
        Arc::new(BufferPool::default())
    }

    /// Get a buffer of at least `size` bytes. A pooled buffer is reused when
    /// it is no more than four times the requested size; an exact fit wins.
    pub fn acquire(self: &Arc<Self>, size: usize) -> PooledBuf {
        let reused = {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            let mut best: Option<usize> = None;
            for (i, buf) in free.iter().enumerate() {
                let cap = buf.len();
                if cap < size || cap > size.saturating_mul(4) {
                    continue;
                }
                if best.map_or(true, |b| cap < free[b].len()) {
                    best = Some(i);
                }
                if cap == size {
                    break;
                }
            }
            best.map(|i| free.swap_remove(i))
        };

        let buf = reused.unwrap_or_else(|| vec![0u8; size]);
        PooledBuf {
            buf,
            len: size,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, buf: Vec<u8>) {
        if buf.is_empty() {
            return;
        }
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < MAX_POOLED_BUFFERS {
            free.push(buf);
        }
    }

    pub fn pooled(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Largest request, in 4-byte words, accepted with an extended length
pub const MAX_EXTENDED_LENGTH: u32 = 0x3f_ffff;

/// Consecutive transient read failures after which a read gives up
const MAX_READ_FAILURES: u32 = 4;

/// `read_exact` that survives a few interrupted or timed out reads without
/// losing what was already read.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let mut filled = 0;
    let mut failures = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                filled += n;
                failures = 0;
            }
            Err(e) if is_transient(&e) => {
                failures += 1;
                if failures >= MAX_READ_FAILURES {
                    return Err(e);
                }
                log::warn!("read failed ({}), retrying", e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// A buffer on loan from a `BufferPool`, returned when dropped.
#[derive(Debug)]
pub struct PooledBuf {
    buf: Vec<u8>,
    len: usize,
    pool: Arc<BufferPool>,
}

impl PooledBuf {
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for PooledBuf {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}

/// One request as read off the wire: opcodes plus a body that can be read
/// exactly once.
pub struct Packet {
    major_opcode: u8,
    minor_opcode: u8,
    reader: XProtoReader<Cursor<PooledBuf>>,
}

impl Packet {
    /// Read the 4-byte header and the body that follows it.
    ///
    /// A zero length field announces a CARD32 extended length when
    /// `big_requests` says BIG-REQUESTS is on for the connection. It is only
    /// asked after a zero length has been seen, so the caller can first let
    /// earlier requests (the enable among them) run. Extended lengths above
    /// `MAX_EXTENDED_LENGTH` are refused before any buffer is allocated.
    pub fn read_from<R: Read>(
        reader: &mut XProtoReader<R>,
        pool: &Arc<BufferPool>,
        big_requests: impl FnOnce() -> bool,
    ) -> Result<Packet, ReadError> {
        let order = reader.byte_order();
        let mut header = [0u8; 4];
        read_full(reader.get_mut(), &mut header)?;
        let mut fields = XProtoReader::new(&header[..], order);
        let major_opcode = fields.read_byte()?;
        let minor_opcode = fields.read_byte()?;
        let mut length = fields.read_card16()? as usize;
        let mut header_words = 1;
        if length == 0 && big_requests() {
            let mut extended = [0u8; 4];
            read_full(reader.get_mut(), &mut extended)?;
            let extended = XProtoReader::new(&extended[..], order).read_card32()?;
            if extended > MAX_EXTENDED_LENGTH {
                return Err(ReadError(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("request length {} words exceeds the maximum", extended),
                )));
            }
            length = extended as usize;
            header_words = 2;
        }

        let body_len = length.saturating_sub(header_words) * 4;
        let mut buf = pool.acquire(body_len);
        read_full(reader.get_mut(), buf.as_mut_slice())?;

        Ok(Packet::new(major_opcode, minor_opcode, buf, order))
    }

    pub fn new(major_opcode: u8, minor_opcode: u8, body: PooledBuf, byte_order: ByteOrder) -> Self {
        Packet {
            major_opcode,
            minor_opcode,
            reader: XProtoReader::new(Cursor::new(body), byte_order),
        }
    }

    /// A packet over a copy of `body`, backed by a pool of its own.
    pub fn from_bytes(major_opcode: u8, minor_opcode: u8, body: &[u8], byte_order: ByteOrder) -> Self {
        let pool = BufferPool::new();
        let mut buf = pool.acquire(body.len());
        buf.as_mut_slice().copy_from_slice(body);
        Packet::new(major_opcode, minor_opcode, buf, byte_order)
    }

    pub fn major_opcode(&self) -> u8 {
        self.major_opcode
    }

    pub fn minor_opcode(&self) -> u8 {
        self.minor_opcode
    }

    /// Body length in bytes, header excluded.
    pub fn len(&self) -> usize {
        self.reader.get_ref().get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> usize {
        let pos = self.reader.get_ref().position() as usize;
        self.len().saturating_sub(pos)
    }

    /// Everything not read yet.
    pub fn read_rest(&mut self) -> Result<Vec<u8>, ReadError> {
        let left = self.remaining();
        self.reader.read_bytes(left)
    }
}

impl Deref for Packet {
    type Target = XProtoReader<Cursor<PooledBuf>>;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl DerefMut for Packet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}

/// In-memory scratch buffer a handler writes its reply body into.
///
/// The detail byte becomes the second byte of the reply header.
#[derive(Debug, Clone)]
pub struct PacketWriter {
    byte_order: ByteOrder,
    detail: u8,
    body: Vec<u8>,
}

impl PacketWriter {
    pub fn new(byte_order: ByteOrder) -> Self {
        PacketWriter {
            byte_order,
            detail: 0,
            body: Vec::new(),
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn set_detail(&mut self, detail: u8) {
        self.detail = detail;
    }

    pub fn detail(&self) -> u8 {
        self.detail
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn clear(&mut self) {
        self.detail = 0;
        self.body.clear();
    }

    pub fn write_byte(&mut self, value: u8) {
        self.body.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.body.push(value as u8);
    }

    pub fn write_card16(&mut self, value: u16) {
        let mut b = [0u8; 2];
        match self.byte_order {
            ByteOrder::MSBFirst => BigEndian::write_u16(&mut b, value),
            ByteOrder::LSBFirst => LittleEndian::write_u16(&mut b, value),
        }
        self.body.extend_from_slice(&b);
    }

    pub fn write_int16(&mut self, value: i16) {
        self.write_card16(value as u16);
    }

    pub fn write_card32(&mut self, value: u32) {
        let mut b = [0u8; 4];
        match self.byte_order {
            ByteOrder::MSBFirst => BigEndian::write_u32(&mut b, value),
            ByteOrder::LSBFirst => LittleEndian::write_u32(&mut b, value),
        }
        self.body.extend_from_slice(&b);
    }

    pub fn write_int32(&mut self, value: i32) {
        self.write_card32(value as u32);
    }

    pub fn write_padding(&mut self, count: usize) {
        self.body.resize(self.body.len() + count, 0);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    pub fn write_padded_bytes(&mut self, bytes: &[u8]) {
        self.write_bytes(bytes);
        self.write_padding(pad(bytes.len()));
    }

    pub fn write_padded_string(&mut self, s: &str) {
        self.write_padded_bytes(&string_to_latin1(s));
    }

    /// STR: a length byte followed by the characters, unpadded.
    pub fn write_str(&mut self, s: &str) {
        let bytes = string_to_latin1(s);
        let len = bytes.len().min(255);
        self.write_byte(len as u8);
        self.write_bytes(&bytes[..len]);
    }

    /// Pad the body so far up to a 4-byte boundary.
    pub fn align(&mut self) {
        self.write_padding(pad(self.body.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(order: ByteOrder, words: &[u8]) -> XProtoReader<Cursor<Vec<u8>>> {
        XProtoReader::new(Cursor::new(words.to_vec()), order)
    }

    #[test]
    fn test_packet_header_and_body() {
        let pool = BufferPool::new();
        // GetAtomName, length 2 words, atom 39
        let mut r = request(ByteOrder::LSBFirst, &[17, 0, 2, 0, 39, 0, 0, 0]);
        let mut packet = Packet::read_from(&mut r, &pool, || false).unwrap();
        assert_eq!(packet.major_opcode(), 17);
        assert_eq!(packet.len(), 4);
        assert_eq!(packet.read_card32().unwrap(), 39);
        assert_eq!(packet.remaining(), 0);
        assert!(packet.read_byte().is_err());
    }

    #[test]
    fn test_zero_length_without_big_requests() {
        let pool = BufferPool::new();
        let mut r = request(ByteOrder::MSBFirst, &[127, 0, 0, 0]);
        let packet = Packet::read_from(&mut r, &pool, || false).unwrap();
        assert!(packet.is_empty());
    }

    #[test]
    fn test_big_request_length() {
        let pool = BufferPool::new();
        // length 0, extended length 3 words: header (2 words) + 4 body bytes
        let mut r = request(ByteOrder::MSBFirst, &[127, 0, 0, 0, 0, 0, 0, 3, 9, 9, 9, 9]);
        let packet = Packet::read_from(&mut r, &pool, || true).unwrap();
        assert_eq!(packet.len(), 4);
    }

    #[test]
    fn test_big_requests_asked_only_for_zero_length() {
        let pool = BufferPool::new();
        let mut r = request(ByteOrder::LSBFirst, &[43, 0, 1, 0]);
        let packet = Packet::read_from(&mut r, &pool, || panic!("not a zero length")).unwrap();
        assert_eq!(packet.major_opcode(), 43);
    }

    #[test]
    fn test_oversized_extended_length_is_refused() {
        let pool = BufferPool::new();
        let mut r = request(ByteOrder::LSBFirst, &[127, 0, 0, 0, 0, 0, 0x40, 0]);
        let err = Packet::read_from(&mut r, &pool, || true).err().unwrap();
        assert_eq!(err.0.kind(), io::ErrorKind::InvalidData);
        assert_eq!(pool.pooled(), 0);

        // The largest accepted length still goes through the length check
        let mut r = request(ByteOrder::LSBFirst, &[127, 0, 0, 0, 0xff, 0xff, 0x3f, 0]);
        let err = Packet::read_from(&mut r, &pool, || true).err().unwrap();
        assert_eq!(err.0.kind(), io::ErrorKind::UnexpectedEof);
    }

    /// Hands out one byte per read and fails `fail_every` times before each.
    struct Flaky {
        data: Vec<u8>,
        pos: usize,
        fail_every: u32,
        failed: u32,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.failed < self.fail_every {
                self.failed += 1;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.failed = 0;
            if self.pos == self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    fn flaky(fail_every: u32) -> XProtoReader<Flaky> {
        let data = vec![17, 0, 2, 0, 39, 0, 0, 0, 43, 0, 1, 0];
        XProtoReader::new(Flaky { data, pos: 0, fail_every, failed: 0 }, ByteOrder::LSBFirst)
    }

    #[test]
    fn test_transient_failures_resume_the_packet() {
        let pool = BufferPool::new();
        let mut r = flaky(3);
        let mut packet = Packet::read_from(&mut r, &pool, || false).unwrap();
        assert_eq!(packet.major_opcode(), 17);
        assert_eq!(packet.read_card32().unwrap(), 39);
        // The stream stays in step
        let packet = Packet::read_from(&mut r, &pool, || false).unwrap();
        assert_eq!(packet.major_opcode(), 43);
    }

    #[test]
    fn test_fourth_transient_failure_is_fatal() {
        let pool = BufferPool::new();
        let mut r = flaky(4);
        let err = Packet::read_from(&mut r, &pool, || false).err().unwrap();
        assert_eq!(err.0.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_truncated_body_is_error() {
        let pool = BufferPool::new();
        let mut r = request(ByteOrder::LSBFirst, &[17, 0, 3, 0, 1, 2]);
        assert!(Packet::read_from(&mut r, &pool, || false).is_err());
    }

    #[test]
    fn test_pool_reuse_bounds() {
        let pool = BufferPool::new();
        drop(pool.acquire(64));
        assert_eq!(pool.pooled(), 1);

        // Too large to stand in for a 4-byte request
        let small = pool.acquire(4);
        assert_eq!(pool.pooled(), 1);
        drop(small);
        assert_eq!(pool.pooled(), 2);

        let reused = pool.acquire(20);
        assert_eq!(reused.len(), 20);
        assert_eq!(pool.pooled(), 1);
    }

    #[test]
    fn test_writer_str_and_align() {
        let mut w = PacketWriter::new(ByteOrder::LSBFirst);
        w.write_str("abc");
        w.align();
        assert_eq!(w.body(), &[3, b'a', b'b', b'c']);
        w.write_card16(0x0102);
        w.align();
        assert_eq!(w.len(), 8);
        assert_eq!(&w.body()[4..6], &[0x02, 0x01]);
    }
}

//! Client session management
//!
//! A `ClientConnection` is one accepted X client: its byte order, its output
//! stream, and the sequence counter. Requests are handled strictly in order on
//! one worker thread per connection; events raised by other connections are
//! written to the same stream, so every write goes through the writer lock.

use super::dispatcher::RequestContext;
use super::Server;
use crate::protocol::{
    padded_len, request_name, ByteOrder, Event, HandlerError, HandlerResult, Packet, PacketWriter,
    WriteError, X11Error, XProtoWriter,
};
use crate::windows::EventSink;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// First opcode of the extension range; below it every request is core.
const FIRST_EXTENSION_OPCODE: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Handshaking,
    Serving,
    Closed,
}

pub struct ClientConnection {
    id: u32,
    peer: Option<SocketAddr>,
    byte_order: ByteOrder,
    writer: Mutex<XProtoWriter<Box<dyn Write + Send>>>,
    /// Sequence number of the last request taken from the queue
    sequence: AtomicU16,
    big_requests: AtomicBool,
    /// Requests the worker is done with, counted from the first
    handled: Mutex<u64>,
    drained: Condvar,
    state: Mutex<ConnectionState>,
    /// Shut down on close so a blocked reader wakes up
    stream: Option<TcpStream>,
}

impl ClientConnection {
    pub fn new(
        id: u32,
        byte_order: ByteOrder,
        output: Box<dyn Write + Send>,
        peer: Option<SocketAddr>,
        stream: Option<TcpStream>,
    ) -> Self {
        ClientConnection {
            id,
            peer,
            byte_order,
            writer: Mutex::new(XProtoWriter::new(output, byte_order)),
            sequence: AtomicU16::new(0),
            big_requests: AtomicBool::new(false),
            handled: Mutex::new(0),
            drained: Condvar::new(),
            state: Mutex::new(ConnectionState::Handshaking),
            stream,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn sequence(&self) -> u16 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn next_sequence(&self) -> u16 {
        self.sequence.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    pub fn big_requests(&self) -> bool {
        self.big_requests.load(Ordering::SeqCst)
    }

    pub fn enable_big_requests(&self) {
        self.big_requests.store(true, Ordering::SeqCst);
    }

    /// Block until the worker has handled `count` requests or the connection
    /// is closed.
    pub fn wait_handled(&self, count: u64) {
        let mut handled = self.handled.lock().unwrap_or_else(PoisonError::into_inner);
        while *handled < count && self.state() != ConnectionState::Closed {
            handled = self
                .drained
                .wait(handled)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn request_handled(&self) {
        let mut handled = self.handled.lock().unwrap_or_else(PoisonError::into_inner);
        *handled += 1;
        self.drained.notify_all();
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_serving(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ConnectionState::Handshaking {
            *state = ConnectionState::Serving;
        }
    }

    /// Mark the connection closed and shut its socket down. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ConnectionState::Closed {
            return;
        }
        *state = ConnectionState::Closed;
        drop(state);
        // Taking the lock orders this wakeup after any waiter's state check
        let handled = self.handled.lock().unwrap_or_else(PoisonError::into_inner);
        self.drained.notify_all();
        drop(handled);

        if let Some(stream) = &self.stream {
            let _ = stream.shutdown(Shutdown::Both);
        }
        log::debug!("Client {} closed", self.id);
    }

    /// The output stream, for the handshake records written before serving.
    pub fn writer(&self) -> MutexGuard<'_, XProtoWriter<Box<dyn Write + Send>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write_raw(&self, bytes: &[u8]) -> Result<(), WriteError> {
        let mut writer = self.writer();
        writer.write_bytes(bytes)?;
        writer.flush()
    }

    /// Frame `reply` as a reply record: type 1, detail, sequence, length in
    /// words beyond the 32-byte minimum, then the body zero-padded.
    pub fn write_reply(&self, sequence: u16, reply: &PacketWriter) -> Result<(), WriteError> {
        let body = reply.body();
        let padded = padded_len(body.len()).max(24);

        let mut writer = self.writer();
        writer.write_byte(1)?;
        writer.write_byte(reply.detail())?;
        writer.write_card16(sequence)?;
        writer.write_card32(((padded - 24) / 4) as u32)?;
        writer.write_bytes(body)?;
        writer.write_padding(padded - body.len())?;
        writer.flush()
    }

    pub fn write_error(&self, sequence: u16, error: &X11Error) -> Result<(), WriteError> {
        self.write_raw(&error.encode(sequence, self.byte_order))
    }

    /// Handle one request: take the next sequence number, run the handler
    /// registered for the opcode, then write its reply or its error.
    ///
    /// Only connection-fatal conditions come back as `Err`.
    pub fn process(self: &Arc<Self>, server: &Server, mut packet: Packet) -> HandlerResult {
        let sequence = self.next_sequence();
        let major = packet.major_opcode();
        log::debug!(
            "Client {} request {} ({} bytes, seq {})",
            self.id,
            request_name(major),
            packet.len(),
            sequence
        );

        let Some(handler) = server.dispatcher().resolve(major) else {
            if server.config().strict {
                return Err(HandlerError::fatal(format!("unhandled request {}", major)));
            }
            log::warn!(
                "Client {}: unhandled request {} ({}), dropped",
                self.id,
                major,
                request_name(major)
            );
            return Ok(());
        };
        let handler = Arc::clone(handler);

        let mut ctx = RequestContext::new(server, self, sequence);
        let result = handler.handle(&mut ctx, &mut packet);
        if result.is_ok() && packet.remaining() > 0 {
            log::warn!(
                "{} bytes unhandled in {}",
                packet.remaining(),
                request_name(major)
            );
        }

        match result {
            Ok(()) => {
                if !ctx.reply.is_empty() {
                    self.write_reply(sequence, &ctx.reply).map_err(write_failed)?;
                }
                Ok(())
            }
            Err(HandlerError::Protocol(err)) => {
                let minor = if major >= FIRST_EXTENSION_OPCODE {
                    packet.minor_opcode() as u16
                } else {
                    0
                };
                let err = err.with_opcodes(major, minor);
                log::warn!("Client {} seq {}: {}", self.id, sequence, err);
                self.write_error(sequence, &err).map_err(write_failed)
            }
            Err(fatal) => Err(fatal),
        }
    }

    /// Start the worker that drains this connection's request queue in order.
    ///
    /// The worker stops when the sending side is dropped or a request turns
    /// out to be fatal, in which case the connection is closed. Every request
    /// it finishes counts towards `wait_handled`.
    pub fn spawn_worker(self: &Arc<Self>, server: Arc<Server>) -> (Sender<Packet>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<Packet>();
        let client = Arc::clone(self);
        let handle = thread::spawn(move || {
            for packet in rx {
                if client.state() == ConnectionState::Closed {
                    break;
                }
                if let Err(e) = client.process(&server, packet) {
                    log::error!("Client {}: {}", client.id, e);
                    client.close();
                    break;
                }
                client.request_handled();
            }
        });
        (tx, handle)
    }
}

fn write_failed(e: WriteError) -> HandlerError {
    HandlerError::fatal(e.to_string())
}

impl EventSink for ClientConnection {
    fn client_id(&self) -> u32 {
        self.id
    }

    /// Events carry the sequence number of the last request processed.
    fn send_event(&self, event: &Event) {
        if self.state() != ConnectionState::Serving {
            return;
        }
        let bytes = event.encode(self.sequence(), self.byte_order);
        if let Err(e) = self.write_raw(&bytes) {
            log::debug!("Client {}: event dropped: {}", self.id, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::server::ServerConfig;

    /// Output stream the test can look into
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        pub(crate) fn take(&self) -> Vec<u8> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    pub(crate) fn test_client(id: u32) -> (Arc<ClientConnection>, SharedBuf) {
        let out = SharedBuf::default();
        let client = Arc::new(ClientConnection::new(
            id,
            ByteOrder::LSBFirst,
            Box::new(out.clone()),
            None,
            None,
        ));
        client.set_serving();
        (client, out)
    }

    #[test]
    fn test_reply_framing() {
        let (client, out) = test_client(1);
        let mut reply = PacketWriter::new(ByteOrder::LSBFirst);
        reply.set_detail(7);
        reply.write_card32(0xdead_beef);
        client.write_reply(3, &reply).unwrap();

        let bytes = out.take();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..4], &[1, 7, 3, 0]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &0xdead_beefu32.to_le_bytes());

        // 30 bytes of body: 32 after padding, one word past the minimum
        let mut reply = PacketWriter::new(ByteOrder::LSBFirst);
        reply.write_bytes(&[9; 30]);
        client.write_reply(4, &reply).unwrap();
        let bytes = out.take();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[4..8], &[2, 0, 0, 0]);
        assert_eq!(&bytes[38..40], &[0, 0]);
    }

    #[test]
    fn test_sequence_counts_every_request() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let (client, out) = test_client(1);

        // NoOperation, an opcode nobody serves, then GetInputFocus
        client.process(&server, Packet::from_bytes(127, 0, &[], ByteOrder::LSBFirst)).unwrap();
        client.process(&server, Packet::from_bytes(0, 0, &[], ByteOrder::LSBFirst)).unwrap();
        client.process(&server, Packet::from_bytes(43, 0, &[], ByteOrder::LSBFirst)).unwrap();

        let bytes = out.take();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[0], 1);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 3);
        assert_eq!(client.sequence(), 3);
    }

    #[test]
    fn test_sequence_wraps_to_zero() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let (client, out) = test_client(1);
        for _ in 0..65535 {
            client.process(&server, Packet::from_bytes(127, 0, &[], ByteOrder::LSBFirst)).unwrap();
        }
        assert_eq!(client.sequence(), 65535);

        // Request 65536 goes out as sequence 0
        client.process(&server, Packet::from_bytes(43, 0, &[], ByteOrder::LSBFirst)).unwrap();
        let bytes = out.take();
        assert_eq!(bytes.len(), 32);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 0);
        assert_eq!(client.sequence(), 0);
    }

    #[test]
    fn test_wait_handled_counts_worker_requests() {
        let server = Arc::new(Server::new(ServerConfig::default()).unwrap());
        let (client, out) = test_client(1);
        let (queue, worker) = client.spawn_worker(server);
        for _ in 0..3 {
            queue.send(Packet::from_bytes(43, 0, &[], ByteOrder::LSBFirst)).unwrap();
        }
        client.wait_handled(3);
        assert_eq!(out.take().len(), 96);

        drop(queue);
        worker.join().unwrap();
        // A closed connection never blocks the caller
        client.close();
        client.wait_handled(10);
    }

    #[test]
    fn test_protocol_error_keeps_serving() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let (client, out) = test_client(1);

        // GetAtomName of an atom that does not exist
        let body = 0x7777u32.to_le_bytes();
        client.process(&server, Packet::from_bytes(17, 0, &body, ByteOrder::LSBFirst)).unwrap();
        let bytes = out.take();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[1], crate::protocol::ErrorCode::Atom as u8);
        assert_eq!(&bytes[4..8], &0x7777u32.to_le_bytes());
        assert_eq!(bytes[10], 17);
        assert_eq!(client.state(), ConnectionState::Serving);
    }

    #[test]
    fn test_strict_mode_unknown_opcode_is_fatal() {
        let config = ServerConfig {
            strict: true,
            ..Default::default()
        };
        let server = Server::new(config).unwrap();
        let (client, _out) = test_client(1);
        let result = client.process(&server, Packet::from_bytes(0, 0, &[], ByteOrder::LSBFirst));
        assert!(matches!(result, Err(HandlerError::Fatal(_))));
    }

    #[test]
    fn test_events_only_while_serving() {
        let out = SharedBuf::default();
        let client = ClientConnection::new(1, ByteOrder::LSBFirst, Box::new(out.clone()), None, None);
        let event = Event::Expose {
            window: 3,
            x: 0,
            y: 0,
            width: 1,
            height: 1,
            count: 0,
        };
        client.send_event(&event);
        assert!(out.take().is_empty());

        client.set_serving();
        client.send_event(&event);
        assert_eq!(out.take().len(), 32);

        client.close();
        client.send_event(&event);
        assert!(out.take().is_empty());
    }
}

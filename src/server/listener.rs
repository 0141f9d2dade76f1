//! Server listener and connection handling
//!
//! One thread accepts connections; each connection gets a reader thread that
//! runs the handshake and then frames requests onto the queue of the
//! connection's worker.

use std::error::Error;
use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use super::auth::{read_byte_order, Admission, AuthManager};
use super::client::{ClientConnection, ConnectionState};
use super::Server;
use crate::protocol::{write_setup_failed, BufferPool, Packet, SetupRequest, XProtoReader, XProtoWriter};

/// Bind the configured address and serve connections until the listener
/// fails.
pub fn start_tcp_listener(server: Arc<Server>) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = bind_listener(server.config().listen_addr())?;
    log::info!("Listening on {}", listener.local_addr()?);
    serve(listener, server)
}

/// Listening socket with address reuse, so a restarted server can take the
/// port back while old connections linger in TIME_WAIT.
#[cfg(unix)]
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener, Box<dyn Error + Send + Sync>> {
    use nix::sys::socket::{
        bind, listen, setsockopt, socket, sockopt, AddressFamily, Backlog, SockFlag, SockType,
        SockaddrIn,
    };
    use std::os::fd::AsRawFd;

    let SocketAddr::V4(v4) = addr else {
        return Ok(TcpListener::bind(addr)?);
    };
    let fd = socket(AddressFamily::Inet, SockType::Stream, SockFlag::empty(), None)?;
    setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    bind(fd.as_raw_fd(), &SockaddrIn::from(v4))?;
    listen(&fd, Backlog::MAXCONN)?;
    Ok(TcpListener::from(fd))
}

#[cfg(not(unix))]
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener, Box<dyn Error + Send + Sync>> {
    Ok(TcpListener::bind(addr)?)
}

/// Accept connections forever, one thread per client.
pub fn serve(listener: TcpListener, server: Arc<Server>) -> Result<(), Box<dyn Error + Send + Sync>> {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let server = Arc::clone(&server);
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, server) {
                        log::error!("Client error: {}", e);
                    }
                });
            }
            Err(e) => {
                log::error!("Connection failed: {}", e);
            }
        }
    }

    Ok(())
}

fn handle_client(stream: TcpStream, server: Arc<Server>) -> Result<(), Box<dyn Error + Send + Sync>> {
    let peer = stream.peer_addr().ok();
    log::info!("New client connection from {:?}", peer);
    stream.set_nodelay(true)?;

    let mut input = BufReader::new(stream.try_clone()?);
    let byte_order = read_byte_order(&mut input)?;
    let mut reader = XProtoReader::new(input, byte_order);

    if let Some(addr) = peer.filter(|p| !server.hosts.allows(p.ip())) {
        SetupRequest::read_body(&mut reader)?;
        let mut writer = XProtoWriter::new(stream, byte_order);
        write_setup_failed(&mut writer, "Host not allowed")?;
        log::warn!("Refused connection from {}: not in access list", addr);
        return Ok(());
    }

    let id = server.register_client();
    let output = Box::new(stream.try_clone()?);
    let client = Arc::new(ClientConnection::new(id, byte_order, output, peer, Some(stream)));

    let result = run_client(&server, &client, reader);
    client.close();
    server.client_gone(id);
    log::info!("Client {} disconnected", id);
    result
}

/// Handshake, then read requests until the client goes away.
fn run_client(
    server: &Arc<Server>,
    client: &Arc<ClientConnection>,
    mut reader: XProtoReader<BufReader<TcpStream>>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let auth = AuthManager::new(server.config().enforce_auth);
    let admission = {
        let mut writer = client.writer();
        auth.authenticate(&mut reader, &mut *writer, server.info())?
    };
    if let Admission::Refused(reason) = admission {
        log::warn!("Client {} refused: {}", client.id(), reason);
        return Ok(());
    }
    client.set_serving();
    log::info!("Client {} connected ({:?})", client.id(), client.byte_order());

    let pool = BufferPool::new();
    let (queue, worker) = client.spawn_worker(Arc::clone(server));
    let mut queued: u64 = 0;
    while client.state() == ConnectionState::Serving {
        // A zero length only means an extended length once every request
        // queued before it, a BigReqEnable among them, has run.
        let big_requests = || {
            client.wait_handled(queued);
            client.big_requests()
        };
        match Packet::read_from(&mut reader, &pool, big_requests) {
            Ok(packet) => {
                if queue.send(packet).is_err() {
                    break;
                }
                queued += 1;
            }
            Err(e) => {
                if e.0.kind() != io::ErrorKind::UnexpectedEof {
                    log::debug!("Client {}: {}", client.id(), e);
                }
                break;
            }
        }
    }

    drop(queue);
    if worker.join().is_err() {
        log::error!("Client {}: worker panicked", client.id());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use std::io::{Read, Write};
    use std::net::Ipv4Addr;

    fn start(config: ServerConfig) -> SocketAddr {
        let listener = bind_listener(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(Server::new(config).unwrap());
        thread::spawn(move || serve(listener, server));
        addr
    }

    const SETUP: [u8; 12] = [b'l', 0, 11, 0, 0, 0, 0, 0, 0, 0, 0, 0];

    #[test]
    fn test_bind_ephemeral() {
        let listener = bind_listener(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    /// Connect and read the whole setup reply.
    fn connect(addr: SocketAddr) -> TcpStream {
        let mut conn = TcpStream::connect(addr).unwrap();
        conn.write_all(&SETUP).unwrap();

        let mut head = [0u8; 8];
        conn.read_exact(&mut head).unwrap();
        assert_eq!(head[0], 1);
        let words = u16::from_le_bytes([head[6], head[7]]) as usize;
        let mut info = vec![0u8; words * 4];
        conn.read_exact(&mut info).unwrap();
        conn
    }

    #[test]
    fn test_handshake_and_request() {
        let addr = start(ServerConfig::default());
        let mut conn = connect(addr);

        // GetInputFocus
        conn.write_all(&[43, 0, 1, 0]).unwrap();
        let mut reply = [0u8; 32];
        conn.read_exact(&mut reply).unwrap();
        assert_eq!(reply[0], 1);
        assert_eq!(u16::from_le_bytes([reply[2], reply[3]]), 1);
    }

    #[test]
    fn test_extended_length_right_after_enable() {
        let addr = start(ServerConfig::default());
        let mut conn = connect(addr);

        // BigReqEnable, NoOperation with an extended length of 3 words and
        // GetInputFocus, sent without waiting for the enable reply
        let mut requests = vec![130, 0, 1, 0];
        requests.extend_from_slice(&[127, 0, 0, 0, 3, 0, 0, 0, 9, 9, 9, 9]);
        requests.extend_from_slice(&[43, 0, 1, 0]);
        conn.write_all(&requests).unwrap();

        let mut reply = [0u8; 32];
        conn.read_exact(&mut reply).unwrap();
        assert_eq!(reply[0], 1);
        assert_eq!(u16::from_le_bytes([reply[2], reply[3]]), 1);
        assert_eq!(&reply[8..12], &0x3f_ffffu32.to_le_bytes());

        conn.read_exact(&mut reply).unwrap();
        assert_eq!(reply[0], 1);
        assert_eq!(u16::from_le_bytes([reply[2], reply[3]]), 3);
    }

    #[test]
    fn test_oversized_extended_length_drops_connection() {
        let addr = start(ServerConfig::default());
        let mut conn = connect(addr);
        conn.write_all(&[130, 0, 1, 0]).unwrap();
        let mut reply = [0u8; 32];
        conn.read_exact(&mut reply).unwrap();

        conn.write_all(&[127, 0, 0, 0, 0, 0, 0x40, 0]).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(conn.read(&mut buf).unwrap_or(0), 0);
    }

    #[test]
    fn test_bad_order_byte_drops_connection() {
        let addr = start(ServerConfig::default());
        let mut conn = TcpStream::connect(addr).unwrap();
        conn.write_all(&[b'x', 0, 11, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(conn.read(&mut buf).unwrap_or(0), 0);
    }
}

//! Local TCP service published behind the onion address.
//!
//! [`LocalService`] accepts connections on a background thread and answers
//! each one through a [`Protocol`]. Every chunk read from a client is passed
//! through [`Protocol::process_incoming`] and then
//! [`Protocol::prepare_outgoing`] before being written back.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");
const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const CLIENT_READ_TIMEOUT: Duration = Duration::from_millis(250);
const READ_CHUNK: usize = 4096;

/// Application protocol spoken over accepted connections.
pub(crate) trait Protocol: Send + Sync {
    /// Produces the reply payload for bytes received from a client.
    fn process_incoming(&self, data: &[u8]) -> Vec<u8>;

    /// Frames a reply payload before it is written to the client.
    fn prepare_outgoing(&self, data: Vec<u8>) -> Vec<u8>;
}

/// Writes every received chunk back unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct EchoProtocol;

impl Protocol for EchoProtocol {
    fn process_incoming(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn prepare_outgoing(&self, data: Vec<u8>) -> Vec<u8> {
        data
    }
}

/// Errors raised while running the local service.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Resolving the bind address failed.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        /// Host that failed to resolve.
        host: String,
        /// Port that failed to resolve.
        port: u16,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },
    /// Resolution produced no addresses.
    #[error("{host}:{port} resolved to no addresses")]
    ResolveEmpty {
        /// Host that resolved to nothing.
        host: String,
        /// Port that resolved to nothing.
        port: u16,
    },
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to configure listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("local service thread panicked")]
    ThreadPanic,
}

/// Bound but not yet serving listener.
#[derive(Debug)]
pub(crate) struct LocalService {
    listener: TcpListener,
    addr: SocketAddr,
}

impl LocalService {
    pub(crate) fn bind(host: &str, port: u16) -> Result<Self, ServerError> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|source| ServerError::Resolve {
                host: host.to_owned(),
                port,
                source,
            })?
            .next()
            .ok_or_else(|| ServerError::ResolveEmpty {
                host: host.to_owned(),
                port,
            })?;
        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let bound = listener.local_addr().unwrap_or(addr);
        Ok(Self {
            listener,
            addr: bound,
        })
    }

    pub(crate) const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn start(self, protocol: Arc<dyn Protocol>) -> Result<ServiceHandle, ServerError> {
        self.listener
            .set_nonblocking(true)
            .map_err(|source| ServerError::NonBlocking { source })?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || run_accept_loop(&self, &flag, &protocol));
        Ok(ServiceHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background accept thread.
#[derive(Debug)]
pub(crate) struct ServiceHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ServiceHandle {
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub(crate) fn join(mut self) -> Result<(), ServerError> {
        self.handle
            .take()
            .map_or(Ok(()), |handle| handle.join().map_err(|_| ServerError::ThreadPanic))
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(service: &LocalService, shutdown: &Arc<AtomicBool>, protocol: &Arc<dyn Protocol>) {
    info!(target: SERVER_TARGET, addr = %service.addr, "local service listening");
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match service.listener.accept() {
            Ok((stream, peer)) => {
                last_error = None;
                let protocol = Arc::clone(protocol);
                let flag = Arc::clone(shutdown);
                thread::spawn(move || {
                    if let Err(error) = serve_client(stream, protocol.as_ref(), &flag) {
                        debug!(target: SERVER_TARGET, %peer, %error, "client connection ended");
                    }
                });
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(target: SERVER_TARGET, %error, "accept failed");
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    info!(target: SERVER_TARGET, addr = %service.addr, "local service stopped");
}

fn serve_client(
    mut stream: TcpStream,
    protocol: &dyn Protocol,
    shutdown: &AtomicBool,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT))?;
    let mut buffer = vec![0_u8; READ_CHUNK];
    while !shutdown.load(Ordering::SeqCst) {
        let read = match stream.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(error) => return Err(error),
        };
        let received = buffer.get(..read).unwrap_or_default();
        let reply = protocol.prepare_outgoing(protocol.process_incoming(received));
        stream.write_all(&reply)?;
        stream.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};

    use rstest::rstest;

    use super::*;

    struct Shouting;

    impl Protocol for Shouting {
        fn process_incoming(&self, data: &[u8]) -> Vec<u8> {
            data.to_ascii_uppercase()
        }

        fn prepare_outgoing(&self, mut data: Vec<u8>) -> Vec<u8> {
            data.extend_from_slice(b"!\n");
            data
        }
    }

    fn exchange(addr: SocketAddr, payload: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).expect("connect to local service");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set read timeout");
        stream.write_all(payload).expect("write payload");
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).expect("read reply");
        line
    }

    #[rstest]
    #[case::echo(Arc::new(EchoProtocol) as Arc<dyn Protocol>, &b"ping\n"[..], "ping\n")]
    #[case::framed(Arc::new(Shouting) as Arc<dyn Protocol>, &b"ping"[..], "PING!\n")]
    fn replies_pass_through_the_protocol(
        #[case] protocol: Arc<dyn Protocol>,
        #[case] payload: &[u8],
        #[case] expected: &str,
    ) {
        let service = LocalService::bind("127.0.0.1", 0).expect("bind local service");
        let addr = service.local_addr();
        let handle = service.start(protocol).expect("start local service");

        assert_eq!(exchange(addr, payload), expected);

        handle.shutdown();
        handle.join().expect("join local service");
    }

    #[test]
    fn serves_several_clients() {
        let service = LocalService::bind("127.0.0.1", 0).expect("bind local service");
        let addr = service.local_addr();
        let handle = service.start(Arc::new(EchoProtocol)).expect("start local service");

        assert_eq!(exchange(addr, b"first\n"), "first\n");
        assert_eq!(exchange(addr, b"second\n"), "second\n");

        handle.shutdown();
        handle.join().expect("join local service");
    }

    #[test]
    fn binding_an_occupied_port_fails() {
        let occupied = TcpListener::bind("127.0.0.1:0").expect("occupy a port");
        let port = occupied.local_addr().expect("local addr").port();
        let error = LocalService::bind("127.0.0.1", port).expect_err("port in use");
        assert!(matches!(error, ServerError::Bind { .. }), "{error}");
    }
}

//! Stream-backed command channel and the TCP connector.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use super::{CommandChannel, Connector};
use crate::command::Command;
use crate::config::ControlEndpoint;
use crate::error::ControlError;
use crate::reply::{ReplyBlock, ReplyFramer};

/// Maximum time to wait for the TCP handshake.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Maximum time a single read may block while awaiting a reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 4096;
const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");

/// Streams that can be shut down explicitly.
pub trait CloseStream {
    /// Shuts the stream down in both directions.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn close_stream(&mut self) -> io::Result<()>;
}

impl CloseStream for TcpStream {
    fn close_stream(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(error) if error.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Command channel over any byte stream.
///
/// Any I/O failure breaks the channel: the stream is dropped and later sends
/// fail with [`ControlError::ChannelClosed`]. Unsolicited 6xx event replies
/// are skipped while waiting for the reply to the outstanding command.
#[derive(Debug)]
pub struct StreamChannel<S> {
    stream: Option<S>,
    framer: ReplyFramer,
    peer: String,
}

/// Channel over a TCP connection.
pub type TcpChannel = StreamChannel<TcpStream>;

impl<S> StreamChannel<S>
where
    S: Read + Write + CloseStream + Send,
{
    /// Wraps a connected stream. `peer` labels log records.
    #[must_use]
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream: Some(stream),
            framer: ReplyFramer::new(),
            peer: peer.into(),
        }
    }

    /// Returns `true` while the stream is usable.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl<S> CommandChannel for StreamChannel<S>
where
    S: Read + Write + CloseStream + Send,
{
    fn send(&mut self, command: &Command) -> Result<ReplyBlock, ControlError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ControlError::ChannelClosed);
        };
        debug!(target: CHANNEL_TARGET, peer = %self.peer, %command, "sending command");
        let result = exchange(stream, &mut self.framer, command);
        match &result {
            Ok(reply) => {
                debug!(
                    target: CHANNEL_TARGET,
                    peer = %self.peer,
                    status = reply.status(),
                    "received reply"
                );
            }
            Err(error) => {
                debug!(
                    target: CHANNEL_TARGET,
                    peer = %self.peer,
                    %error,
                    "channel broken"
                );
                self.stream = None;
                self.framer = ReplyFramer::new();
            }
        }
        result
    }

    fn close(&mut self) -> Result<(), ControlError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        self.framer = ReplyFramer::new();
        debug!(target: CHANNEL_TARGET, peer = %self.peer, "closing channel");
        stream
            .close_stream()
            .map_err(|source| ControlError::Close { source })
    }
}

fn exchange<S: Read + Write>(
    stream: &mut S,
    framer: &mut ReplyFramer,
    command: &Command,
) -> Result<ReplyBlock, ControlError> {
    let keyword = command.keyword();
    stream
        .write_all(command.line().as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|source| ControlError::Send { keyword, source })?;

    let mut chunk = [0_u8; READ_CHUNK];
    loop {
        while let Some(block) = framer.next_block()? {
            if block.is_async_event() {
                debug!(
                    target: CHANNEL_TARGET,
                    event = block.final_line(),
                    "skipping asynchronous event"
                );
                continue;
            }
            return Ok(block);
        }
        let read = match stream.read(&mut chunk) {
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(ControlError::Receive { keyword, source }),
        };
        if read == 0 {
            return Err(framer.eof_error());
        }
        framer.push(chunk.get(..read).unwrap_or_default());
    }
}

/// Opens TCP channels with bounded connect and read waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpConnector {
    connect_timeout: Duration,
    reply_timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector with explicit timeouts.
    #[must_use]
    pub const fn new(connect_timeout: Duration, reply_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            reply_timeout,
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(CONNECTION_TIMEOUT, REPLY_TIMEOUT)
    }
}

impl Connector for TcpConnector {
    fn connect(
        &self,
        endpoint: &ControlEndpoint,
    ) -> Result<Box<dyn CommandChannel>, ControlError> {
        let label = endpoint.to_string();
        let address = resolve(endpoint, &label)?;
        let connect_error = |source| ControlError::Connect {
            endpoint: label.clone(),
            source,
        };
        let stream =
            TcpStream::connect_timeout(&address, self.connect_timeout).map_err(connect_error)?;
        stream
            .set_read_timeout(Some(self.reply_timeout))
            .map_err(connect_error)?;
        info!(target: CHANNEL_TARGET, endpoint = %label, "connected to control port");
        Ok(Box::new(StreamChannel::new(stream, label)))
    }
}

fn resolve(endpoint: &ControlEndpoint, label: &str) -> Result<SocketAddr, ControlError> {
    let resolve_error = |source| ControlError::Resolve {
        endpoint: label.to_owned(),
        source,
    };
    let mut addrs = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(resolve_error)?;
    addrs.next().ok_or_else(|| {
        resolve_error(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no socket addresses resolved",
        ))
    })
}

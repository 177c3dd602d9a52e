//! Socket transport for the guiding server.
//!
//! [`Transport::connect`] opens a TCP or Unix stream and splits it into a
//! [`TransportReader`] owned by the dispatcher, a [`TransportWriter`] used by
//! the correlator, and a [`ShutdownHandle`] that tears the socket down from
//! any thread.

mod framing;


use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

use phd2_config::SocketEndpoint;
use tracing::{debug, trace};

use crate::errors::{ConnectError, TransportError};

pub(crate) use framing::LineBuffer;

pub(crate) const TRANSPORT_TARGET: &str = "phd2_client::transport";

/// Terminator appended to every outbound line.
pub const LINE_TERMINATOR: &str = "\r\n";

const READ_CHUNK: usize = 4096;

/// Source of inbound protocol lines.
pub trait LineSource {
    /// Blocks until the next complete line is available.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the stream ends and
    /// [`TransportError::Io`] when the socket fails.
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Destination for outbound protocol lines.
pub trait LineSink {
    /// Writes `line` followed by [`LINE_TERMINATOR`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the line cannot be written in full.
    fn send_line(&mut self, line: &str) -> Result<(), TransportError>;
}

enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.shutdown(how),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(how),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// An open duplex stream to the guiding server.
pub struct Transport {
    reader: TransportReader,
    writer: TransportWriter,
    shutdown: ShutdownHandle,
}

impl Transport {
    /// Connects to `endpoint`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when resolution fails, the server refuses the
    /// connection, or the deadline passes.
    pub fn connect(endpoint: &SocketEndpoint, timeout: Duration) -> Result<Self, ConnectError> {
        let stream = open_stream(endpoint, timeout)?;
        let endpoint_display = endpoint.to_string();
        let split = |source: io::Error| ConnectError::Connect {
            endpoint: endpoint_display.clone(),
            source,
        };
        let closed = Arc::new(AtomicBool::new(false));
        let writer_stream = stream.try_clone().map_err(split)?;
        let control_stream = stream.try_clone().map_err(split)?;
        debug!(target: TRANSPORT_TARGET, endpoint = %endpoint, "connected");
        Ok(Self {
            reader: TransportReader {
                stream,
                buffer: LineBuffer::default(),
                closed: Arc::clone(&closed),
            },
            writer: TransportWriter {
                stream: writer_stream,
                closed: Arc::clone(&closed),
            },
            shutdown: ShutdownHandle {
                inner: Arc::new(ShutdownInner {
                    stream: control_stream,
                    closed,
                }),
            },
        })
    }

    /// Splits the transport into its reading, writing and control halves.
    #[must_use]
    pub fn into_parts(self) -> (TransportReader, TransportWriter, ShutdownHandle) {
        (self.reader, self.writer, self.shutdown)
    }
}

fn open_stream(endpoint: &SocketEndpoint, timeout: Duration) -> Result<Stream, ConnectError> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let endpoint_display = endpoint.to_string();
            let address = resolve_tcp_address(host, *port).map_err(|source| {
                ConnectError::Resolve {
                    endpoint: endpoint_display.clone(),
                    source,
                }
            })?;
            let stream = TcpStream::connect_timeout(&address, timeout)
                .map_err(|source| connect_failure(endpoint_display.clone(), timeout, source))?;
            stream
                .set_nodelay(true)
                .map_err(|source| connect_failure(endpoint_display, timeout, source))?;
            Ok(Stream::Tcp(stream))
        }
        SocketEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                connect_unix(path.as_str(), timeout)
                    .map_err(|source| connect_failure(endpoint.to_string(), timeout, source))
            }

            #[cfg(not(unix))]
            {
                let _ = path;
                Err(ConnectError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                })
            }
        }
    }
}

fn connect_failure(endpoint: String, timeout: Duration, source: io::Error) -> ConnectError {
    if matches!(
        source.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    ) {
        ConnectError::Timeout { endpoint, timeout }
    } else {
        ConnectError::Connect { endpoint, source }
    }
}

pub(crate) fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str, timeout: Duration) -> io::Result<Stream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)?;
    let stream = UnixStream::from(std::os::fd::OwnedFd::from(socket));
    Ok(Stream::Unix(stream))
}

/// Read half of a [`Transport`]; yields one framed line at a time.
pub struct TransportReader {
    stream: Stream,
    buffer: LineBuffer,
    closed: Arc<AtomicBool>,
}

impl LineSource for TransportReader {
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }
            if let Some(line) = self.buffer.next_line() {
                trace!(
                    target: TRANSPORT_TARGET,
                    line = %String::from_utf8_lossy(&line),
                    "received line"
                );
                return Ok(line);
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(read) => {
                    let received = chunk.get(..read).unwrap_or_default();
                    self.buffer.push(received);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(_) if self.closed.load(Ordering::Acquire) => {
                    return Err(TransportError::Closed);
                }
                Err(error) => return Err(TransportError::Io(error)),
            }
        }
    }
}

/// Write half of a [`Transport`].
pub struct TransportWriter {
    stream: Stream,
    closed: Arc<AtomicBool>,
}

impl LineSink for TransportWriter {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        trace!(target: TRANSPORT_TARGET, line, "sending line");
        let mut framed = String::with_capacity(line.len() + LINE_TERMINATOR.len());
        framed.push_str(line);
        framed.push_str(LINE_TERMINATOR);
        self.stream.write_all(framed.as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }
}

struct ShutdownInner {
    stream: Stream,
    closed: Arc<AtomicBool>,
}

/// Closes the transport from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<ShutdownInner>,
}

impl ShutdownHandle {
    /// Half-closes then fully closes the socket.
    ///
    /// Later reads and writes fail with [`TransportError::Closed`]. Calling
    /// this more than once has no further effect.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for how in [Shutdown::Write, Shutdown::Both] {
            if let Err(error) = self.inner.stream.shutdown(how) {
                trace!(target: TRANSPORT_TARGET, ?how, %error, "socket shutdown reported an error");
            }
        }
        debug!(target: TRANSPORT_TARGET, "transport closed");
    }

    /// Reports whether [`ShutdownHandle::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

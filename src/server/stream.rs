use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use may::net::TcpStream;

use crate::tls::TlsStream;

/// One connection's byte stream, plain or TLS-terminated. All blocking
/// operations are bounded by the timeout armed on the raw socket.
pub enum HttpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
}

impl HttpStream {
    fn socket(&self) -> &TcpStream {
        match self {
            HttpStream::Plain(sock) => sock,
            HttpStream::Tls(tls) => tls.socket(),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, HttpStream::Tls(_))
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket().peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket().local_addr()
    }

    /// Arm (or disarm, with `None`) the rolling I/O deadline for both
    /// directions.
    pub fn set_io_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        let sock = self.socket();
        sock.set_read_timeout(timeout)?;
        sock.set_write_timeout(timeout)
    }

    /// A duplicate of the raw socket with no read deadline, used for the
    /// half-duplex end-of-stream probe. Reads raw bytes even under TLS:
    /// during an SSE stream the peer sends nothing but `close_notify`, so
    /// completion of any read means the connection is going away.
    pub fn probe_socket(&self) -> io::Result<TcpStream> {
        let clone = self.socket().try_clone()?;
        clone.set_read_timeout(None)?;
        Ok(clone)
    }

    /// Half-close the send side (plain) or run the TLS shutdown. Any
    /// error is returned for the session to log; there is nothing else to
    /// do with it.
    pub fn close_send(&mut self) -> io::Result<()> {
        match self {
            HttpStream::Plain(sock) => sock.shutdown(Shutdown::Write),
            HttpStream::Tls(tls) => tls.shutdown(),
        }
    }

    /// Tear down both directions, releasing any parked probe read.
    pub fn close_both(&mut self) -> io::Result<()> {
        if let HttpStream::Tls(tls) = self {
            let _ = tls.shutdown();
        }
        self.socket().shutdown(Shutdown::Both)
    }
}

impl Read for HttpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            HttpStream::Plain(sock) => sock.read(buf),
            HttpStream::Tls(tls) => tls.read(buf),
        }
    }
}

impl Write for HttpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            HttpStream::Plain(sock) => sock.write(buf),
            HttpStream::Tls(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            HttpStream::Plain(sock) => sock.flush(),
            HttpStream::Tls(tls) => tls.flush(),
        }
    }
}

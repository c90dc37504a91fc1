//! The continuation capability: a handler's way to seize the raw
//! connection and push data incrementally instead of returning a
//! conventional reply. The SSE layer in [`crate::sse`] is built on top of
//! this.

use std::io::{self, Read, Write};
use std::time::Duration;

use may::net::TcpStream;

use crate::request::ConnectionProbe;
use crate::server::http1;
use crate::server::stream::HttpStream;

/// A response head written by hand, for replies that stream their body.
pub struct ResponseHead {
    pub code: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// The duplex stream a continuation owns while it runs. Wraps the
/// session's connection with chunked-write and timeout control; the
/// session's probe travels along so liveness stays observable.
pub struct StreamHandle<'a> {
    stream: &'a mut HttpStream,
    io_timeout: Duration,
    probe: ConnectionProbe,
    server_id: &'a str,
}

impl<'a> StreamHandle<'a> {
    pub(crate) fn new(
        stream: &'a mut HttpStream,
        io_timeout: Duration,
        probe: ConnectionProbe,
        server_id: &'a str,
    ) -> Self {
        Self {
            stream,
            io_timeout,
            probe,
            server_id,
        }
    }

    /// The session's configured I/O timeout.
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// The connection liveness probe shared with the request.
    pub fn probe(&self) -> &ConnectionProbe {
        &self.probe
    }

    /// The configured server identification header value.
    pub fn server_id(&self) -> &str {
        self.server_id
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)?;
        self.stream.flush()
    }

    /// Write one HTTP/1.1 chunk.
    pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        http1::write_chunk(self.stream, data)
    }

    /// Serialize a header-only response, leaving the body to subsequent
    /// chunk writes.
    pub fn write_head(&mut self, head: &ResponseHead) -> io::Result<()> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", head.code, head.reason);
        for (name, value) in &head.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        self.stream.write_all(out.as_bytes())?;
        self.stream.flush()
    }

    /// Re-arm the I/O deadline for both directions.
    pub fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream.set_io_timeout(Some(timeout))
    }

    /// Drop the I/O deadline, e.g. around arbitrarily long idle waits
    /// between events.
    pub fn disable_timeout(&mut self) -> io::Result<()> {
        self.stream.set_io_timeout(None)
    }

    /// A duplicate of the raw socket with no read deadline, for posting a
    /// blocking end-of-stream probe read.
    pub fn probe_socket(&self) -> io::Result<TcpStream> {
        self.stream.probe_socket()
    }
}

/// Takes over the connection after dispatch. The session hands the stream
/// to `run` and closes the connection when it returns, success or not.
pub trait Continuation: Send {
    fn run(self: Box<Self>, stream: StreamHandle<'_>) -> io::Result<()>;
}

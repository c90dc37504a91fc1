//! TLS termination.
//!
//! A synchronous rustls wrapper over the coroutine-blocking socket. The
//! session drives the handshake explicitly (under its 5-second budget) and
//! initiates the `close_notify` shutdown when it ends; in between the
//! stream is plain `Read + Write`.

use std::io::{self, BufReader, Read, Write};
use std::net::Shutdown;
use std::path::Path;
use std::sync::Arc;

use may::net::TcpStream;
use rustls::{ServerConfig, ServerConnection, StreamOwned};

use crate::error::{Error, Result};

/// Build a rustls server config from PEM key and certificate-chain files.
pub fn server_config(cert_path: &str, key_path: &str) -> Result<Arc<ServerConfig>> {
    let certs = load_certs(Path::new(cert_path))?;
    let key = load_private_key(Path::new(key_path))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Tls(e.to_string()))?;

    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let file = std::fs::File::open(path).map_err(|e| {
        Error::Tls(format!("failed to read certificate file {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<io::Result<_>>()
        .map_err(|e| Error::Tls(format!("failed to parse {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(Error::Tls(format!("no certificates found in {}", path.display())));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Tls(format!("failed to read key file {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Tls(format!("failed to parse {}: {e}", path.display())))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {}", path.display())))
}

/// A TLS-wrapped connection. `Read`/`Write` move plaintext; the record
/// layer and its buffering live inside rustls.
pub struct TlsStream {
    inner: StreamOwned<ServerConnection, TcpStream>,
}

impl TlsStream {
    pub fn new(socket: TcpStream, config: Arc<ServerConfig>) -> Result<Self> {
        let conn = ServerConnection::new(config)
            .map_err(|e| Error::Tls(format!("failed to create TLS connection: {e}")))?;
        Ok(Self {
            inner: StreamOwned::new(conn, socket),
        })
    }

    /// Drive the handshake to completion. The socket's I/O timeouts bound
    /// each blocking step, so a stalled client cannot park the session
    /// here forever.
    pub fn handshake(&mut self) -> io::Result<()> {
        while self.inner.conn.is_handshaking() {
            self.inner.conn.complete_io(&mut self.inner.sock)?;
        }
        Ok(())
    }

    /// Send `close_notify`, flush it, and half-close the send side.
    pub fn shutdown(&mut self) -> io::Result<()> {
        self.inner.conn.send_close_notify();
        self.inner.conn.complete_io(&mut self.inner.sock)?;
        self.inner.sock.shutdown(Shutdown::Write)
    }

    /// The raw socket underneath the record layer.
    pub fn socket(&self) -> &TcpStream {
        &self.inner.sock
    }
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

//! HTTP/1.1 wire codec: request framing on the way in, response
//! serialization on the way out. The reader keeps a per-connection buffer
//! so pipelined bytes carry over to the next request.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::request::Method;
use crate::response::Response;

/// Cap on the request line plus header block.
const MAX_HEADER_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// The permissive CORS header block attached when `Response::cors` is set.
pub(crate) const CORS_HEADERS: [(&str, &str); 4] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Credentials", "true"),
    ("Access-Control-Allow-Methods", "GET,OPTIONS,POST,PUT,PATCH,DELETE"),
    (
        "Access-Control-Allow-Headers",
        "Authorization, Content-Encoding, Access-Control-Allow-Headers, Origin, Accept, \
         X-Requested-With, Content-Type, Access-Control-Request-Method, \
         Access-Control-Request-Headers",
    ),
];

/// A framed request before decoding: raw target, lowercased header names,
/// body bytes as they came off the wire.
pub(crate) struct RawRequest {
    pub method: Method,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub keep_alive: bool,
}

impl RawRequest {
    /// First header with the given (lowercase) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

pub(crate) enum ReadOutcome {
    Request(RawRequest),
    /// Clean close between requests.
    EndOfStream,
}

#[derive(Debug)]
pub(crate) enum FramingError {
    Io(io::Error),
    /// Protocol violation; answered with 400 and the connection closes.
    Malformed(&'static str),
}

impl From<io::Error> for FramingError {
    fn from(err: io::Error) -> Self {
        FramingError::Io(err)
    }
}

/// Per-connection request reader.
pub(crate) struct RequestReader {
    buf: Vec<u8>,
}

impl RequestReader {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Read one request. Bytes past the request stay buffered for the
    /// next call, so pipelined requests are served in arrival order.
    pub fn read_request<S: Read + Write>(
        &mut self,
        stream: &mut S,
    ) -> Result<ReadOutcome, FramingError> {
        let head_end = loop {
            if let Some(pos) = find_header_end(&self.buf) {
                break pos;
            }
            if self.buf.len() > MAX_HEADER_BYTES {
                return Err(FramingError::Malformed("header block too large"));
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(ReadOutcome::EndOfStream);
                }
                return Err(FramingError::Malformed("connection closed mid-request"));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        };

        let head = std::str::from_utf8(&self.buf[..head_end])
            .map_err(|_| FramingError::Malformed("header block is not valid UTF-8"))?;

        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or("");
        let mut parts = request_line.split(' ');
        let (Some(method), Some(target), Some(version)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(FramingError::Malformed("malformed request line"));
        };
        if parts.next().is_some() || target.is_empty() {
            return Err(FramingError::Malformed("malformed request line"));
        }

        let method: Method = method
            .parse()
            .map_err(|_| FramingError::Malformed("unsupported method"))?;

        let http11 = match version {
            "HTTP/1.1" => true,
            "HTTP/1.0" => false,
            _ => return Err(FramingError::Malformed("unsupported protocol version")),
        };

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(FramingError::Malformed("malformed header line"));
            };
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }

        let raw = RawRequest {
            method,
            target: target.to_string(),
            headers,
            body: Vec::new(),
            keep_alive: http11,
        };

        let mut keep_alive = http11;
        if let Some(conn) = raw.header("connection") {
            let conn = conn.to_ascii_lowercase();
            if conn.contains("close") {
                keep_alive = false;
            } else if conn.contains("keep-alive") {
                keep_alive = true;
            }
        }

        if raw.header("transfer-encoding").is_some() {
            return Err(FramingError::Malformed("transfer-coded request bodies are not supported"));
        }

        let content_length = match raw.header("content-length") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| FramingError::Malformed("invalid content-length"))?,
            None => 0,
        };

        if raw
            .header("expect")
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
            && content_length > 0
        {
            stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
            stream.flush()?;
        }

        // Move leftover bytes to the front, then complete the body from
        // the socket.
        self.buf.drain(..head_end + 4);
        let body: Vec<u8> = if self.buf.len() >= content_length {
            self.buf.drain(..content_length).collect()
        } else {
            let mut body = std::mem::take(&mut self.buf);
            let start = body.len();
            body.resize(content_length, 0);
            stream.read_exact(&mut body[start..])?;
            body
        };

        Ok(ReadOutcome::Request(RawRequest {
            body,
            keep_alive,
            ..raw
        }))
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Everything the serializer needs besides the response itself.
pub(crate) struct WriteOptions<'a> {
    pub server_id: &'a str,
    pub close: bool,
    /// OPTIONS replies carry neither a body nor a content type.
    pub is_options: bool,
    /// The client advertised `Accept-Encoding: gzip`.
    pub accept_gzip: bool,
    pub extra_headers: Vec<(String, String)>,
}

/// Serialize status line, headers and body. The body is the response's
/// own, or the canonical JSON status document when empty; it is gzip-coded
/// iff the client advertised support.
pub(crate) fn write_response<W: Write>(
    out: &mut W,
    resp: &Response,
    opts: &WriteOptions,
) -> io::Result<()> {
    let mut head = format!("HTTP/1.1 {} {}\r\n", resp.code, resp.reason);
    head.push_str(&format!("Server: {}\r\n", opts.server_id));
    head.push_str(if opts.close {
        "Connection: close\r\n"
    } else {
        "Connection: keep-alive\r\n"
    });

    for (name, value) in &opts.extra_headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    if resp.cors {
        for (name, value) in CORS_HEADERS {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
    }
    for (name, value) in &resp.cookies {
        head.push_str(&format!("Set-Cookie: {name}={value}\r\n"));
    }

    let mut body: Vec<u8>;
    if opts.is_options {
        body = Vec::new();
    } else {
        body = if resp.body.is_empty() {
            head.push_str(&format!("Content-Type: {}\r\n", crate::mime::DEFAULT_MIME_TYPE));
            resp.status_document()
        } else {
            head.push_str(&format!("Content-Type: {}\r\n", resp.effective_mime_type()));
            resp.body.clone()
        };
        if opts.accept_gzip && !body.is_empty() {
            body = gzip_compress(&body)?;
            head.push_str("Content-Encoding: gzip\r\n");
        }
    }

    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

    out.write_all(head.as_bytes())?;
    out.write_all(&body)?;
    out.flush()
}

/// One HTTP/1.1 chunk: hex length, CRLF, payload, CRLF.
pub(crate) fn write_chunk<W: Write>(out: &mut W, data: &[u8]) -> io::Result<()> {
    write!(out, "{:x}\r\n", data.len())?;
    out.write_all(data)?;
    out.write_all(b"\r\n")?;
    out.flush()
}

pub(crate) fn gzip_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflate a gzip body, refusing output larger than `cap`.
pub(crate) fn gzip_decompress(data: &[u8], cap: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut decoder = GzDecoder::new(data).take(cap as u64 + 1);
    decoder.read_to_end(&mut out)?;
    if out.len() > cap {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "decompressed body exceeds the configured cap",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory duplex stand-in for a socket.
    struct FakeStream {
        input: io::Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl FakeStream {
        fn new(input: &[u8]) -> Self {
            Self {
                input: io::Cursor::new(input.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn read_one(input: &[u8]) -> Result<ReadOutcome, FramingError> {
        let mut stream = FakeStream::new(input);
        RequestReader::new().read_request(&mut stream)
    }

    #[test]
    fn parses_a_simple_get() {
        let outcome = read_one(b"GET /a/b?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        let ReadOutcome::Request(raw) = outcome else {
            panic!("expected a request");
        };
        assert_eq!(raw.method, Method::Get);
        assert_eq!(raw.target, "/a/b?x=1");
        assert_eq!(raw.header("host"), Some("localhost"));
        assert!(raw.keep_alive);
        assert!(raw.body.is_empty());
    }

    #[test]
    fn reads_a_content_length_body() {
        let outcome =
            read_one(b"POST /p HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello").unwrap();
        let ReadOutcome::Request(raw) = outcome else {
            panic!("expected a request");
        };
        assert_eq!(raw.body, b"hello");
    }

    #[test]
    fn pipelined_requests_carry_over() {
        let mut stream = FakeStream::new(
            b"GET /one HTTP/1.1\r\n\r\nGET /two HTTP/1.1\r\nConnection: close\r\n\r\n",
        );
        let mut reader = RequestReader::new();
        let ReadOutcome::Request(first) = reader.read_request(&mut stream).unwrap() else {
            panic!("expected first request");
        };
        assert_eq!(first.target, "/one");
        let ReadOutcome::Request(second) = reader.read_request(&mut stream).unwrap() else {
            panic!("expected second request");
        };
        assert_eq!(second.target, "/two");
        assert!(!second.keep_alive);
        assert!(matches!(
            reader.read_request(&mut stream),
            Ok(ReadOutcome::EndOfStream)
        ));
    }

    #[test]
    fn keep_alive_defaults_follow_the_version() {
        let ReadOutcome::Request(v10) = read_one(b"GET / HTTP/1.0\r\n\r\n").unwrap() else {
            panic!();
        };
        assert!(!v10.keep_alive);
        let ReadOutcome::Request(v10_ka) =
            read_one(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").unwrap()
        else {
            panic!();
        };
        assert!(v10_ka.keep_alive);
        let ReadOutcome::Request(v11_close) =
            read_one(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap()
        else {
            panic!();
        };
        assert!(!v11_close.keep_alive);
    }

    #[test]
    fn rejects_unknown_methods_and_garbage() {
        assert!(matches!(
            read_one(b"BREW /pot HTTP/1.1\r\n\r\n"),
            Err(FramingError::Malformed(_))
        ));
        assert!(matches!(
            read_one(b"GET /\r\n\r\n"),
            Err(FramingError::Malformed(_))
        ));
        assert!(matches!(
            read_one(b"GET / HTTP/2\r\n\r\n"),
            Err(FramingError::Malformed(_))
        ));
        assert!(matches!(
            read_one(b"GET / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n"),
            Err(FramingError::Malformed(_))
        ));
    }

    #[test]
    fn empty_connection_is_end_of_stream() {
        assert!(matches!(read_one(b""), Ok(ReadOutcome::EndOfStream)));
    }

    #[test]
    fn response_carries_status_document_for_empty_bodies() {
        let resp = Response::not_found();
        let mut out = Vec::new();
        write_response(
            &mut out,
            &resp,
            &WriteOptions {
                server_id: "yahat test",
                close: false,
                is_options: false,
                accept_gzip: false,
                extra_headers: Vec::new(),
            },
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Document not found\r\n"));
        assert!(text.contains("Server: yahat test\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.contains("Content-Type: application/json; charset=utf-8\r\n"));
        assert!(text.contains("\"status\":404"));
    }

    #[test]
    fn options_reply_has_no_body_or_content_type() {
        let resp = Response::ok().with_cors();
        let mut out = Vec::new();
        write_response(
            &mut out,
            &resp,
            &WriteOptions {
                server_id: "yahat test",
                close: false,
                is_options: true,
                accept_gzip: false,
                extra_headers: Vec::new(),
            },
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(!text.contains("Content-Type:"));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn gzip_round_trip_with_cap() {
        let body = b"a body worth compressing, full of repeated repeated repeated text";
        let packed = gzip_compress(body).unwrap();
        assert_eq!(gzip_decompress(&packed, 1024).unwrap(), body);
        assert!(gzip_decompress(&packed, 8).is_err());
        assert!(gzip_decompress(b"not gzip at all", 1024).is_err());
    }

    #[test]
    fn chunk_framing() {
        let mut out = Vec::new();
        write_chunk(&mut out, b"data: 1\n\n").unwrap();
        assert_eq!(out, b"9\r\ndata: 1\n\n\r\n");
    }
}

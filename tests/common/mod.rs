//! Shared plumbing for the integration suites: start a real server on a
//! loopback port and talk to it over raw TCP.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use yahat::auth::{Auth, AuthRequest, Authenticator};
use yahat::handlers::{HandlerResult, RequestHandler};
use yahat::{HttpConfig, HttpServer, Request, Response, ServerHandle};

/// Authenticator with a fixed verdict.
pub struct TestAuth {
    pub allow: bool,
}

impl Authenticator for TestAuth {
    fn authenticate(&self, _req: &AuthRequest) -> Auth {
        if self.allow {
            Auth::allow("tester")
        } else {
            Auth::deny()
        }
    }
}

/// Handler that echoes the matched route prefix.
pub struct RouteEcho;

impl RequestHandler for RouteEcho {
    fn handle(&self, req: &Request) -> HandlerResult {
        Ok(Response::ok()
            .with_body(req.route.clone())
            .with_mime_type("text/plain"))
    }
}

/// Handler that echoes the decoded target.
pub struct TargetEcho;

impl RequestHandler for TargetEcho {
    fn handle(&self, req: &Request) -> HandlerResult {
        Ok(Response::ok()
            .with_body(req.target.clone())
            .with_mime_type("text/plain"))
    }
}

/// Handler that echoes the request body.
pub struct BodyEcho;

impl RequestHandler for BodyEcho {
    fn handle(&self, req: &Request) -> HandlerResult {
        Ok(Response::ok()
            .with_body(req.body.clone())
            .with_mime_type("application/octet-stream"))
    }
}

pub fn base_config() -> HttpConfig {
    HttpConfig {
        http_endpoint: "127.0.0.1".to_string(),
        http_port: "0".to_string(),
        ..HttpConfig::default()
    }
}

/// Start the server and wait until it accepts connections.
pub fn start(server: &mut HttpServer) -> (ServerHandle, SocketAddr) {
    let handle = server.start().unwrap();
    handle.wait_ready().unwrap();
    let addr = handle.local_addrs()[0];
    (handle, addr)
}

/// One-shot request: write the raw bytes, read until the peer closes or
/// goes quiet.
pub fn send_request(addr: &SocketAddr, req: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(req.as_bytes()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    let mut buf = Vec::new();
    loop {
        let mut tmp = [0u8; 1024];
        match stream.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                break
            }
            Err(e) => panic!("read error: {e:?}"),
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Read exactly one response (headers plus Content-Length body) from an
/// open connection.
pub fn read_response(stream: &mut TcpStream) -> (u16, Vec<(String, String)>, Vec<u8>) {
    let mut buf = Vec::new();
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let mut tmp = [0u8; 1024];
        let n = stream.read(&mut tmp).unwrap();
        assert!(n > 0, "connection closed before response head");
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let status: u16 = lines
        .next()
        .unwrap()
        .split_whitespace()
        .nth(1)
        .unwrap()
        .parse()
        .unwrap();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            line.split_once(':')
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        })
        .collect();

    let content_length: usize = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| v.parse().unwrap())
        .unwrap_or(0);

    let mut body: Vec<u8> = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let mut tmp = vec![0u8; content_length - body.len()];
        let n = stream.read(&mut tmp).unwrap();
        assert!(n > 0, "connection closed mid-body");
        body.extend_from_slice(&tmp[..n]);
    }
    body.truncate(content_length);

    (status, headers, body)
}

pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Split a one-shot response string into (status, headers, body text).
pub fn parse_parts(resp: &str) -> (u16, Vec<(String, String)>, String) {
    let mut parts = resp.splitn(2, "\r\n\r\n");
    let head = parts.next().unwrap_or("");
    let body = parts.next().unwrap_or("").to_string();
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let headers = lines
        .filter_map(|line| {
            line.split_once(':')
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        })
        .collect();
    (status, headers, body)
}

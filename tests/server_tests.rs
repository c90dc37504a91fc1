mod common;

use std::io::Write as _;
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{
    base_config, header, parse_parts, read_response, send_request, start, RouteEcho, TargetEcho,
    TestAuth,
};
use yahat::handlers::{HandlerResult, RequestHandler};
use yahat::{HttpServer, Request, Response};

fn plain_server() -> HttpServer {
    HttpServer::new(base_config(), Arc::new(TestAuth { allow: true })).unwrap()
}

#[test]
fn miss_on_empty_route_table_is_404_with_status_document() {
    let mut server = plain_server();
    let (handle, addr) = start(&mut server);
    let resp = send_request(&addr, "GET /unknown HTTP/1.1\r\nHost: localhost\r\n\r\n");
    handle.stop();

    let (status, headers, body) = parse_parts(&resp);
    assert_eq!(status, 404);
    assert_eq!(
        header(&headers, "content-type"),
        Some("application/json; charset=utf-8")
    );
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["error"], true);
    assert_eq!(doc["status"], 404);
    assert_eq!(doc["reason"], "Document not found");
}

#[test]
fn dispatch_fills_route_and_respects_boundaries() {
    let mut server = plain_server();
    server.add_route("/api", Arc::new(RouteEcho)).unwrap();
    let (handle, addr) = start(&mut server);

    let resp = send_request(&addr, "GET /api/v1/foo HTTP/1.1\r\nHost: x\r\n\r\n");
    let (status, _, body) = parse_parts(&resp);
    assert_eq!(status, 200);
    assert_eq!(body, "/api");

    let resp = send_request(&addr, "GET /apix HTTP/1.1\r\nHost: x\r\n\r\n");
    let (status, _, _) = parse_parts(&resp);
    assert_eq!(status, 404);

    handle.stop();
}

#[test]
fn options_preflight_bypasses_handlers() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Counting;
    impl RequestHandler for Counting {
        fn handle(&self, _req: &Request) -> HandlerResult {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Response::ok())
        }
    }

    let mut server = plain_server();
    server.add_route("/anything", Arc::new(Counting)).unwrap();
    let (handle, addr) = start(&mut server);
    let resp = send_request(&addr, "OPTIONS /anything HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    let (status, headers, body) = parse_parts(&resp);
    assert_eq!(status, 200);
    assert!(body.is_empty());
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    assert_eq!(header(&headers, "access-control-allow-origin"), Some("*"));
    assert_eq!(
        header(&headers, "access-control-allow-credentials"),
        Some("true")
    );
    assert_eq!(
        header(&headers, "access-control-allow-methods"),
        Some("GET,OPTIONS,POST,PUT,PATCH,DELETE")
    );
    assert!(header(&headers, "access-control-allow-headers")
        .unwrap()
        .contains("Authorization"));
    assert!(header(&headers, "content-type").is_none());
}

#[test]
fn keep_alive_replies_arrive_in_order() {
    let mut server = plain_server();
    server.add_route("/echo", Arc::new(TargetEcho)).unwrap();
    let (handle, addr) = start(&mut server);

    let mut stream = TcpStream::connect(addr).unwrap();
    // Two pipelined requests in a single write.
    stream
        .write_all(
            b"GET /echo/first HTTP/1.1\r\nHost: x\r\n\r\n\
              GET /echo/second HTTP/1.1\r\nHost: x\r\n\r\n",
        )
        .unwrap();

    let (status1, headers1, body1) = read_response(&mut stream);
    assert_eq!(status1, 200);
    assert_eq!(header(&headers1, "connection"), Some("keep-alive"));
    assert_eq!(body1, b"/echo/first");

    let (status2, _, body2) = read_response(&mut stream);
    assert_eq!(status2, 200);
    assert_eq!(body2, b"/echo/second");

    handle.stop();
}

#[test]
fn server_header_carries_branding() {
    let mut server =
        HttpServer::with_branding(base_config(), Arc::new(TestAuth { allow: true }), "demo")
            .unwrap();
    let (handle, addr) = start(&mut server);
    let resp = send_request(&addr, "GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    let (_, headers, _) = parse_parts(&resp);
    let expected = format!("demo/yahat {}", HttpServer::version());
    assert_eq!(header(&headers, "server"), Some(expected.as_str()));
}

#[test]
fn unknown_method_is_rejected_with_400() {
    let mut server = plain_server();
    let (handle, addr) = start(&mut server);
    let resp = send_request(&addr, "BREW /pot HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    let (status, headers, _) = parse_parts(&resp);
    assert_eq!(status, 400);
    assert_eq!(header(&headers, "connection"), Some("close"));
}

#[test]
fn connection_close_is_honoured() {
    let mut server = plain_server();
    server.add_route("/echo", Arc::new(TargetEcho)).unwrap();
    let (handle, addr) = start(&mut server);

    let resp = send_request(
        &addr,
        "GET /echo HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    handle.stop();

    let (status, headers, _) = parse_parts(&resp);
    assert_eq!(status, 200);
    assert_eq!(header(&headers, "connection"), Some("close"));
}

#[test]
fn early_reply_reaches_the_wire_verbatim() {
    struct Early;
    impl RequestHandler for Early {
        fn handle(&self, _req: &Request) -> HandlerResult {
            Err(Response::new(409, "Conflict")
                .with_body("{\"busy\":true}")
                .into())
        }
    }

    let mut server = plain_server();
    server.add_route("/busy", Arc::new(Early)).unwrap();
    let (handle, addr) = start(&mut server);
    let resp = send_request(&addr, "GET /busy HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    let (status, _, body) = parse_parts(&resp);
    assert_eq!(status, 409);
    assert_eq!(body, "{\"busy\":true}");
}

#[test]
fn handler_errors_become_500() {
    struct Broken;
    impl RequestHandler for Broken {
        fn handle(&self, _req: &Request) -> HandlerResult {
            Err(yahat::HandlerError::internal(std::io::Error::other("boom")))
        }
    }

    let mut server = plain_server();
    server.add_route("/broken", Arc::new(Broken)).unwrap();
    let (handle, addr) = start(&mut server);
    let resp = send_request(&addr, "GET /broken HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    let (status, _, body) = parse_parts(&resp);
    assert_eq!(status, 500);
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["reason"], "Internal server error");
}

#[test]
fn set_cookie_headers_are_emitted_in_order() {
    struct WithCookies;
    impl RequestHandler for WithCookies {
        fn handle(&self, _req: &Request) -> HandlerResult {
            Ok(Response::ok()
                .with_body("ok")
                .with_mime_type("text/plain")
                .with_cookie("first", "1")
                .with_cookie("second", "2"))
        }
    }

    let mut server = plain_server();
    server.add_route("/cookies", Arc::new(WithCookies)).unwrap();
    let (handle, addr) = start(&mut server);
    let resp = send_request(&addr, "GET /cookies HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    let first = resp.find("Set-Cookie: first=1").unwrap();
    let second = resp.find("Set-Cookie: second=2").unwrap();
    assert!(first < second);
}

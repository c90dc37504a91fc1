mod common;

use std::io::{Read as _, Write as _};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{base_config, start, TestAuth};
use yahat::handlers::{HandlerResult, RequestHandler};
use yahat::sse::SseQueue;
use yahat::{HttpServer, Request, Response};

/// Handler that opens a queue-based event stream and parks the producer
/// handle where the test can reach it.
struct EventsHandler {
    queue: Arc<Mutex<Option<SseQueue>>>,
}

impl RequestHandler for EventsHandler {
    fn handle(&self, _req: &Request) -> HandlerResult {
        let queue = SseQueue::new();
        let continuation = queue.continuation();
        *self.queue.lock().unwrap() = Some(queue);
        Ok(Response::ok().with_continuation(continuation))
    }
}

fn wait_for<T>(deadline: Duration, mut probe: impl FnMut() -> Option<T>) -> T {
    let start = Instant::now();
    loop {
        if let Some(value) = probe() {
            return value;
        }
        assert!(start.elapsed() < deadline, "timed out waiting");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn read_until(stream: &mut TcpStream, buf: &mut Vec<u8>, deadline: Duration, done: impl Fn(&[u8]) -> bool) {
    stream
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let start = Instant::now();
    while !done(buf) {
        assert!(start.elapsed() < deadline, "timed out reading SSE stream");
        let mut tmp = [0u8; 1024];
        match stream.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => panic!("read error: {e:?}"),
        }
    }
}

#[test]
fn queue_sse_delivers_in_order_and_observes_client_close() {
    let queue_slot = Arc::new(Mutex::new(None));
    let mut server = HttpServer::new(base_config(), Arc::new(TestAuth { allow: true })).unwrap();
    server
        .add_route(
            "/events",
            Arc::new(EventsHandler {
                queue: Arc::clone(&queue_slot),
            }),
        )
        .unwrap();
    let (handle, addr) = start(&mut server);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(b"GET /events HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    // The handler has run once the queue shows up.
    let queue = wait_for(Duration::from_secs(5), || {
        queue_slot.lock().unwrap().clone()
    });

    queue.push_event("m", "1").unwrap();
    queue.push_event("m", "2").unwrap();
    queue.push_event("m", "3").unwrap();

    let mut buf = Vec::new();
    read_until(&mut stream, &mut buf, Duration::from_secs(5), |buf| {
        let text = String::from_utf8_lossy(buf);
        text.contains("data: 3")
    });

    let text = String::from_utf8_lossy(&buf).to_string();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Type: text/event-stream\r\n"));
    assert!(text.contains("Transfer-Encoding: chunked\r\n"));

    let one = text.find("data: 1").unwrap();
    let two = text.find("data: 2").unwrap();
    let three = text.find("data: 3").unwrap();
    assert!(one < two && two < three);

    // Close the client side; the one-byte probe completes, the queue
    // deactivates and the worker returns.
    drop(stream);
    wait_for(Duration::from_secs(5), || {
        if queue.is_active() {
            None
        } else {
            Some(())
        }
    });

    handle.stop();
}

#[test]
fn closed_callback_fires_on_server_side_close() {
    let queue_slot = Arc::new(Mutex::new(None));
    let mut server = HttpServer::new(base_config(), Arc::new(TestAuth { allow: true })).unwrap();
    server
        .add_route(
            "/events",
            Arc::new(EventsHandler {
                queue: Arc::clone(&queue_slot),
            }),
        )
        .unwrap();
    let (handle, addr) = start(&mut server);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(b"GET /events HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let queue = wait_for(Duration::from_secs(5), || {
        queue_slot.lock().unwrap().clone()
    });

    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    queue.on_connection_closed(move || {
        flag.store(true, Ordering::SeqCst);
    });

    queue.push_event("m", "hello").unwrap();
    let mut buf = Vec::new();
    read_until(&mut stream, &mut buf, Duration::from_secs(5), |buf| {
        String::from_utf8_lossy(buf).contains("data: hello")
    });

    queue.close();
    assert!(fired.load(Ordering::SeqCst));

    // The worker returns and the session tears the connection down; the
    // client observes EOF.
    let mut rest = Vec::new();
    read_until(&mut stream, &mut rest, Duration::from_secs(5), |_| false);

    handle.stop();
}

#[test]
fn weak_handles_do_not_keep_the_stream_alive() {
    let queue = SseQueue::new();
    let weak = queue.downgrade();
    assert!(weak.is_alive());
    queue.close();
    assert!(!weak.is_alive());
}

//! # Server-Sent Events
//!
//! One-way server→client streaming over chunked HTTP/1.1 with
//! `text/event-stream` framing, built on the continuation capability.
//!
//! ## Architecture
//!
//! Two layers:
//!
//! - **[`SseStream`]** is the base mechanics inside a running continuation:
//!   lazy header emission on the first send, one chunked frame per event,
//!   and the half-duplex end-of-stream probe. SSE clients never push data,
//!   so a single posted one-byte read completing means the peer closed;
//!   that flips the connection probe and fires the closed callback.
//! - **[`SseQueue`]** is a producer/consumer convenience above the base: any
//!   thread or coroutine enqueues pre-formatted events, a single worker
//!   inside the continuation drains them in order. The worker parks on a
//!   wake signal; an enqueue or a close wakes it immediately and a 30 s
//!   heartbeat bounds the worst case, so no condition variable is needed.
//!
//! ## Teardown
//!
//! Closure is two-way: the probe's callback closes the queue, and closing
//! the queue (from either side) wakes the worker, which returns from the
//! continuation so the session can shut the connection down. Events are
//! delivered at most once; a failed write discards whatever is still
//! queued.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn handle(&self, req: &Request) -> HandlerResult {
//!     let queue = SseQueue::new();
//!     self.subscribers.lock().unwrap().push(queue.downgrade());
//!     Ok(Response::ok().with_continuation(queue.continuation()))
//! }
//!
//! // elsewhere, fan out an event:
//! for sub in subscribers {
//!     if let Some(queue) = sub.upgrade() {
//!         queue.push_event("message", payload)?;
//!     }
//! }
//! ```

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use may::sync::mpsc;
use tracing::{debug, trace};

use crate::continuation::{Continuation, ResponseHead, StreamHandle};
use crate::error::{Error, Result};

/// Default idle heartbeat for the queue worker.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(30);

/// Format one event in `text/event-stream` framing. Names and payloads
/// must be single-line.
pub fn format_event(name: &str, payload: &str) -> Result<String> {
    if name.contains(['\n', '\r']) || payload.contains(['\n', '\r']) {
        return Err(Error::InvalidSseEvent);
    }
    Ok(format!("event: {name}\ndata: {payload}\n\n"))
}

/// The base SSE mechanics over a continuation's stream handle.
pub struct SseStream<'a> {
    stream: StreamHandle<'a>,
    initialized: bool,
    on_closed: Option<Box<dyn FnOnce() + Send>>,
}

impl<'a> SseStream<'a> {
    pub fn new(stream: StreamHandle<'a>) -> Self {
        Self {
            stream,
            initialized: false,
            on_closed: None,
        }
    }

    /// Register a callback fired once when the peer closes the stream.
    pub fn with_on_closed(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_closed = Some(Box::new(callback));
        self
    }

    /// Whether the peer is still reachable, as observed by the probe.
    pub fn is_open(&self) -> bool {
        self.stream.probe().is_ok()
    }

    /// Send one pre-formatted event as a chunked frame, emitting the
    /// response header first if this is the first send. The write happens
    /// with the I/O deadline disabled; idle gaps between events can be
    /// arbitrarily long.
    pub fn send(&mut self, event: &str) -> io::Result<()> {
        if !self.initialized {
            self.init()?;
        }
        if event.is_empty() {
            return Ok(());
        }
        self.stream.disable_timeout()?;
        self.stream.write_chunk(event.as_bytes())
    }

    fn init(&mut self) -> io::Result<()> {
        trace!("initializing SSE stream");
        self.stream.set_timeout(self.stream.io_timeout())?;
        let head = ResponseHead::new(200, "OK")
            .with_header("Server", self.stream.server_id().to_string())
            .with_header("Content-Type", "text/event-stream")
            .with_header("Connection", "keep-alive")
            .with_header("Transfer-Encoding", "chunked");
        self.stream.write_head(&head)?;
        self.initialized = true;

        // Post the end-of-stream probe: a blocking one-byte read on a dup
        // of the raw socket. Completion, clean or not, means the peer is
        // gone.
        let sock = self.stream.probe_socket()?;
        let probe = self.stream.probe().clone();
        let on_closed = self.on_closed.take();
        may::go!(move || {
            let mut sock = sock;
            let mut byte = [0u8; 1];
            let outcome = sock.read(&mut byte);
            debug!(outcome = ?outcome, "SSE probe read completed, peer closed");
            probe.mark_closed();
            if let Some(callback) = on_closed {
                callback();
            }
        });
        Ok(())
    }
}

struct QueueShared {
    queue: Mutex<VecDeque<String>>,
    active: AtomicBool,
    // The sender is only Send, not Sync; the mutex makes the shared state
    // shareable across producer threads.
    wake_tx: Mutex<mpsc::Sender<()>>,
    wake_rx: Mutex<Option<mpsc::Receiver<()>>>,
    on_closed: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    idle_interval: Duration,
}

impl QueueShared {
    fn wake(&self) {
        let _ = self.wake_tx.lock().unwrap().send(());
    }

    /// Idempotent teardown: flips to inactive, fires the registered
    /// callback once and wakes the worker.
    fn deactivate(self: &Arc<Self>) {
        if self.active.swap(false, Ordering::AcqRel) {
            let callback = self.on_closed.lock().unwrap().take();
            if let Some(callback) = callback {
                callback();
            }
        }
        self.wake();
    }
}

/// Producer handle for a queue-based SSE stream. Clone freely; hand out
/// [`WeakSseQueue`] to subsystems that must not keep the stream alive.
#[derive(Clone)]
pub struct SseQueue {
    shared: Arc<QueueShared>,
}

impl SseQueue {
    pub fn new() -> Self {
        Self::with_idle_interval(DEFAULT_IDLE_INTERVAL)
    }

    pub fn with_idle_interval(idle_interval: Duration) -> Self {
        let (wake_tx, wake_rx) = mpsc::channel();
        Self {
            shared: Arc::new(QueueShared {
                queue: Mutex::new(VecDeque::new()),
                active: AtomicBool::new(true),
                wake_tx: Mutex::new(wake_tx),
                wake_rx: Mutex::new(Some(wake_rx)),
                on_closed: Mutex::new(None),
                idle_interval,
            }),
        }
    }

    /// Enqueue one pre-formatted event. Messages go out in enqueue order,
    /// at most once each. Pushes after closure are silently dropped.
    pub fn push(&self, event: impl Into<String>) {
        if !self.is_active() {
            return;
        }
        self.shared.queue.lock().unwrap().push_back(event.into());
        self.shared.wake();
    }

    /// Format and enqueue an `event:`/`data:` pair.
    pub fn push_event(&self, name: &str, payload: &str) -> Result<()> {
        self.push(format_event(name, payload)?);
        Ok(())
    }

    /// Stop the stream: the worker wakes, returns from the continuation,
    /// and the session closes the connection.
    pub fn close(&self) {
        self.shared.deactivate();
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Register a callback fired once when the stream goes inactive, from
    /// either side (peer closure or [`SseQueue::close`]).
    pub fn on_connection_closed(&self, callback: impl FnOnce() + Send + 'static) {
        *self.shared.on_closed.lock().unwrap() = Some(Box::new(callback));
    }

    /// Non-owning handle for registries that must not extend the stream's
    /// lifetime.
    pub fn downgrade(&self) -> WeakSseQueue {
        WeakSseQueue {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// The continuation to attach to the handler's response. The returned
    /// object owns the consumer side; calling this twice yields a
    /// continuation that fails on startup.
    pub fn continuation(&self) -> Box<dyn Continuation> {
        Box::new(QueueContinuation {
            shared: Arc::clone(&self.shared),
        })
    }
}

impl Default for SseQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Revocable view of an [`SseQueue`].
#[derive(Clone)]
pub struct WeakSseQueue {
    shared: Weak<QueueShared>,
}

impl WeakSseQueue {
    pub fn upgrade(&self) -> Option<SseQueue> {
        self.shared.upgrade().map(|shared| SseQueue { shared })
    }

    /// Still connected and accepting events?
    pub fn is_alive(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.active.load(Ordering::Acquire))
    }
}

struct QueueContinuation {
    shared: Arc<QueueShared>,
}

impl Continuation for QueueContinuation {
    fn run(self: Box<Self>, stream: StreamHandle<'_>) -> io::Result<()> {
        let shared = self.shared;
        let wake_rx = shared
            .wake_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| io::Error::other("SSE queue continuation already consumed"))?;

        let on_peer_closed = {
            let shared = Arc::downgrade(&shared);
            move || {
                if let Some(shared) = shared.upgrade() {
                    shared.deactivate();
                }
            }
        };
        let mut sse = SseStream::new(stream).with_on_closed(on_peer_closed);

        // Heartbeat: bounds how long the worker can park if a wake ever
        // goes missing. Exits once the queue is gone or inactive.
        {
            let weak = Arc::downgrade(&shared);
            let wake_tx = shared.wake_tx.lock().unwrap().clone();
            let idle = shared.idle_interval;
            may::go!(move || loop {
                may::coroutine::sleep(idle);
                let Some(live) = weak.upgrade() else { break };
                if !live.active.load(Ordering::Acquire) {
                    break;
                }
                if wake_tx.send(()).is_err() {
                    break;
                }
            });
        }

        let outcome = (|| -> io::Result<()> {
            loop {
                loop {
                    let event = shared.queue.lock().unwrap().pop_front();
                    match event {
                        Some(event) => sse.send(&event)?,
                        None => break,
                    }
                }
                if !shared.active.load(Ordering::Acquire) {
                    break;
                }
                if wake_rx.recv().is_err() {
                    break;
                }
            }
            Ok(())
        })();

        if let Err(err) = &outcome {
            debug!(error = %err, "SSE write failed, discarding remaining queue");
        }
        shared.deactivate();
        outcome
    }
}

//! # yahat
//!
//! An embeddable HTTP/1.1 serving library: the application registers
//! route handlers and an authenticator, the library owns the socket
//! lifecycle, framing, TLS, keep-alive, gzip coding, longest-prefix
//! dispatch, the chunked continuation protocol used for Server-Sent
//! Events, and an OpenMetrics registry the server feeds from the inside.
//!
//! Connections are cooperative stackful coroutines on the `may` runtime:
//! one task per connection, a fixed pool of worker threads driving the
//! shared reactor. Within a session everything is sequential; parallelism
//! exists between sessions.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use yahat::auth::AllowAll;
//! use yahat::{HttpConfig, HttpServer};
//!
//! let mut server = HttpServer::new(
//!     HttpConfig {
//!         http_endpoint: "127.0.0.1".into(),
//!         http_port: "8080".into(),
//!         ..HttpConfig::default()
//!     },
//!     Arc::new(AllowAll),
//! )
//! .unwrap();
//! server.add_route("/files", Arc::new(yahat::FileHandler::new("/srv/www"))).unwrap();
//! server.run().unwrap();
//! ```

pub mod auth;
pub mod config;
pub mod continuation;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod metrics;
pub mod mime;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod sse;
pub mod tls;

pub use auth::{Auth, AuthRequest, Authenticator};
pub use config::HttpConfig;
pub use continuation::{Continuation, StreamHandle};
pub use error::{Error, Result};
pub use handlers::{EmbeddedHandler, FileHandler, HandlerError, HandlerResult, RequestHandler};
pub use ids::RequestId;
pub use metrics::{InstanceMetrics, Metrics};
pub use request::{Method, Request};
pub use response::Response;
pub use server::{HttpServer, ServerHandle};
pub use sse::{SseQueue, SseStream, WeakSseQueue};

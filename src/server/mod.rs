//! # Server module
//!
//! The public façade plus the machinery behind it.
//!
//! ## Architecture
//!
//! ```text
//! accept loop (per endpoint) → session coroutine (per connection)
//!     → framing → authenticate → route dispatch → handler
//!     → write reply | hand the stream to a continuation
//! ```
//!
//! A fixed pool of worker threads drives the shared coroutine reactor;
//! within one session everything is sequential, parallelism exists
//! between sessions. The route table is built before [`HttpServer::start`]
//! and read without locks afterwards.

pub(crate) mod acceptor;
pub(crate) mod http1;
pub(crate) mod session;
pub(crate) mod stream;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use may::coroutine::JoinHandle;
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::config::{stack_size_from_env, HttpConfig};
use crate::error::{Error, Result};
use crate::handlers::RequestHandler;
use crate::metrics::{InstanceMetrics, MetricsHandler};
use crate::router::RouteTable;
use crate::server::session::SessionContext;

/// The embeddable HTTP server. Configure, add routes, start.
///
/// Routes must be registered before `start()`; the running server reads an
/// immutable snapshot of the table.
pub struct HttpServer {
    config: HttpConfig,
    authenticator: Arc<dyn Authenticator>,
    server_id: String,
    routes: RouteTable,
    instance_metrics: Option<Arc<InstanceMetrics>>,
}

impl HttpServer {
    pub fn new(config: HttpConfig, authenticator: Arc<dyn Authenticator>) -> Result<Self> {
        Self::with_branding(config, authenticator, "")
    }

    /// Like [`HttpServer::new`], with an application name prepended to the
    /// `Server` header value.
    pub fn with_branding(
        config: HttpConfig,
        authenticator: Arc<dyn Authenticator>,
        branding: &str,
    ) -> Result<Self> {
        let server_id = if branding.is_empty() {
            format!("yahat {}", Self::version())
        } else {
            format!("{branding}/yahat {}", Self::version())
        };

        let instance_metrics = if config.enable_metrics {
            Some(Arc::new(InstanceMetrics::new()?))
        } else {
            None
        };

        Ok(Self {
            config,
            authenticator,
            server_id,
            routes: RouteTable::new(),
            instance_metrics,
        })
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// The `Server` header value sent with every reply.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// The server's telemetry bundle, when metrics are enabled. The
    /// application can register its own metrics on the same registry.
    pub fn metrics(&self) -> Option<&Arc<InstanceMetrics>> {
        self.instance_metrics.as_ref()
    }

    /// Register a handler under a path prefix. Dispatch picks the longest
    /// matching prefix.
    pub fn add_route(&mut self, prefix: &str, handler: Arc<dyn RequestHandler>) -> Result<()> {
        self.routes.add(prefix, handler)?;
        if let Some(metrics) = &self.instance_metrics {
            metrics.add_http_requests(prefix)?;
        }
        Ok(())
    }

    /// Bind the configured endpoint(s) and start serving. Returns as soon
    /// as the listeners are up.
    pub fn start(&mut self) -> Result<ServerHandle> {
        may::config()
            .set_workers(self.config.num_http_threads)
            .set_stack_size(stack_size_from_env());

        if let Some(metrics) = &self.instance_metrics {
            metrics.worker_threads().set(self.config.num_http_threads as u64);
            let handler = Arc::new(MetricsHandler::new(Arc::clone(metrics)));
            self.routes.add(self.config.metrics_target.clone(), handler)?;
            metrics.add_http_requests(&self.config.metrics_target)?;
        }

        let tls = if self.config.is_tls() {
            Some(crate::tls::server_config(
                &self.config.http_tls_cert,
                &self.config.http_tls_key,
            )?)
        } else {
            None
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let ctx = Arc::new(SessionContext {
            config: self.config.clone(),
            server_id: self.server_id.clone(),
            routes: Arc::new(self.routes.clone()),
            authenticator: Arc::clone(&self.authenticator),
            instance_metrics: self.instance_metrics.clone(),
            shutdown: Arc::clone(&shutdown),
        });

        let endpoints = resolve_endpoints(&self.config)?;
        let mut listeners = Vec::new();
        let mut addrs = Vec::new();
        for endpoint in endpoints {
            let listener = may::net::TcpListener::bind(endpoint)?;
            let local = listener.local_addr()?;
            info!(
                endpoint = %local,
                scheme = if tls.is_some() { "https" } else { "http" },
                "listening"
            );
            addrs.push(local);
            let ctx = Arc::clone(&ctx);
            let tls = tls.clone();
            listeners.push(may::go!(move || {
                acceptor::accept_loop(listener, tls, ctx);
            }));
        }

        if addrs.is_empty() {
            return Err(Error::Config(format!(
                "no endpoints resolved for {:?}:{:?}",
                self.config.http_endpoint, self.config.http_port
            )));
        }

        Ok(ServerHandle {
            addrs,
            listeners,
            shutdown,
        })
    }

    /// Start and serve until the handle is stopped from another thread.
    pub fn run(&mut self) -> Result<()> {
        debug!("starting the HTTP server");
        let handle = self.start()?;
        handle.join();
        debug!("the HTTP server is done");
        Ok(())
    }
}

/// Resolve the configured endpoint/port pair into socket addresses.
/// Service names are limited to the two schemes the server speaks.
fn resolve_endpoints(config: &HttpConfig) -> Result<Vec<SocketAddr>> {
    let port: u16 = match config.effective_port() {
        "http" => 80,
        "https" => 443,
        other => other
            .parse()
            .map_err(|_| Error::Config(format!("invalid port {other:?}")))?,
    };

    let host = if config.http_endpoint.is_empty() {
        "::"
    } else {
        config.http_endpoint.as_str()
    };
    let authority = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };

    let addrs: Vec<SocketAddr> = authority
        .to_socket_addrs()
        .map_err(|e| Error::Config(format!("cannot resolve {authority}: {e}")))?
        .collect();
    Ok(addrs)
}

/// Handle to a running server: the bound addresses plus stop/join.
pub struct ServerHandle {
    addrs: Vec<SocketAddr>,
    listeners: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl ServerHandle {
    /// The actual bound addresses (useful with port `0`).
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Block until the first endpoint accepts TCP connections.
    pub fn wait_ready(&self) -> io::Result<()> {
        let addr = self
            .addrs
            .first()
            .copied()
            .ok_or_else(|| io::Error::other("no bound endpoints"))?;
        for _ in 0..50 {
            if std::net::TcpStream::connect(addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting and cancel the listener coroutines. Sessions observe
    /// the stop flag at their next request boundary.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for listener in self.listeners {
            unsafe {
                listener.coroutine().cancel();
            }
            let _ = listener.join();
        }
    }

    /// Wait for the listener coroutines to finish.
    pub fn join(self) {
        for listener in self.listeners {
            let _ = listener.join();
        }
    }
}

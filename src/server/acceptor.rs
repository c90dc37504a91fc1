//! Listener coroutines: accept connections, wrap them (TLS when
//! configured) and spawn one session coroutine each.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use may::net::TcpListener;
use tracing::{error, trace, warn};

use crate::server::session::{run_session, SessionContext};
use crate::server::stream::HttpStream;
use crate::tls::TlsStream;

/// Consecutive accept failures tolerated before a listener gives up.
const MAX_ACCEPT_ERRORS: usize = 64;

/// Accept until shutdown or until the error budget is exhausted. Runs on
/// its own coroutine, one per listening endpoint.
pub(crate) fn accept_loop(
    listener: TcpListener,
    tls: Option<Arc<rustls::ServerConfig>>,
    ctx: Arc<SessionContext>,
) {
    let endpoint = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "-".to_string());

    let mut error_count = 0usize;
    while !ctx.shutdown.load(Ordering::Relaxed) && error_count < MAX_ACCEPT_ERRORS {
        match listener.accept() {
            Ok((socket, peer)) => {
                error_count = 0;
                trace!(endpoint = %endpoint, peer = %peer, "accepted connection");
                let ctx = Arc::clone(&ctx);
                let tls = tls.clone();
                may::go!(move || {
                    let stream = match tls {
                        Some(config) => match TlsStream::new(socket, config) {
                            Ok(tls) => HttpStream::Tls(Box::new(tls)),
                            Err(err) => {
                                error!(peer = %peer, error = %err, "failed to set up TLS stream");
                                return;
                            }
                        },
                        None => HttpStream::Plain(socket),
                    };
                    run_session(stream, ctx);
                });
            }
            Err(err) => {
                warn!(endpoint = %endpoint, error = %err, "accept failed");
                error_count += 1;
            }
        }
    }

    if error_count >= MAX_ACCEPT_ERRORS {
        error!(endpoint = %endpoint, "giving up on endpoint after repeated accept failures");
    } else {
        trace!(endpoint = %endpoint, "listener stopped");
    }
}

//! Per-connection session: TLS handshake, the read → authenticate →
//! dispatch → write loop with keep-alive, the continuation handoff, and
//! connection teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::auth::{AuthRequest, Authenticator};
use crate::config::{HttpConfig, TLS_HANDSHAKE_TIMEOUT};
use crate::continuation::StreamHandle;
use crate::metrics::InstanceMetrics;
use crate::request::{parse_cookies, ConnectionProbe, Method, Request};
use crate::response::Response;
use crate::router::RouteTable;
use crate::server::http1::{
    write_response, FramingError, RawRequest, ReadOutcome, RequestReader, WriteOptions,
};
use crate::server::stream::HttpStream;

/// Shared state every session reads; built once at server start.
pub(crate) struct SessionContext {
    pub config: HttpConfig,
    pub server_id: String,
    pub routes: Arc<RouteTable>,
    pub authenticator: Arc<dyn Authenticator>,
    pub instance_metrics: Option<Arc<InstanceMetrics>>,
    pub shutdown: Arc<AtomicBool>,
}

/// Drive one connection to completion. Runs on its own coroutine; returns
/// when the connection is closed from either side.
pub(crate) fn run_session(mut stream: HttpStream, ctx: Arc<SessionContext>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "-".to_string());
    trace!(peer = %peer, tls = stream.is_tls(), "session started");

    let _session_gauge = ctx
        .instance_metrics
        .as_ref()
        .map(|m| m.current_sessions().scoped());
    if let Some(metrics) = &ctx.instance_metrics {
        metrics.tcp_connections().inc();
    }

    if stream.is_tls() {
        if stream.set_io_timeout(Some(TLS_HANDSHAKE_TIMEOUT)).is_err() {
            return;
        }
        if let HttpStream::Tls(tls) = &mut stream {
            if let Err(err) = tls.handshake() {
                error!(peer = %peer, error = %err, "TLS handshake failed");
                return;
            }
        }
    }

    let mut reader = RequestReader::new();
    let mut close = false;

    while !close && !ctx.shutdown.load(Ordering::Relaxed) {
        if stream
            .set_io_timeout(Some(ctx.config.http_io_timeout))
            .is_err()
        {
            break;
        }

        let raw = match reader.read_request(&mut stream) {
            Ok(ReadOutcome::EndOfStream) => {
                trace!(peer = %peer, "end of stream");
                break;
            }
            Ok(ReadOutcome::Request(raw)) => raw,
            Err(FramingError::Io(err)) => {
                debug!(peer = %peer, error = %err, "read failed");
                break;
            }
            Err(FramingError::Malformed(why)) => {
                debug!(peer = %peer, why, "malformed request");
                let resp = Response::new(400, "Bad Request");
                let _ = write_plain(&mut stream, &ctx, &resp, true, false, Vec::new());
                break;
            }
        };

        if !raw.keep_alive {
            close = true;
        }

        let accept_gzip = raw
            .header("accept-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("gzip"));

        let mut request = match decode_request(&ctx, &raw, stream.is_tls()) {
            Ok(request) => request,
            Err(()) => {
                // Decompression failure or overflow: answer 400 and keep
                // the connection usable.
                let resp = Response::new(400, "Bad Request");
                if write_plain(&mut stream, &ctx, &resp, close, accept_gzip, Vec::new()).is_err() {
                    return;
                }
                continue;
            }
        };
        let probe = request.probe();
        let uuid = request.uuid;
        let method = request.method;
        let location = raw.target.clone();

        if let Some(metrics) = &ctx.instance_metrics {
            metrics.incoming_requests().inc();
        }

        let mut extra_headers: Vec<(String, String)> = Vec::new();

        let response = if method == Method::Options && ctx.config.auto_handle_cors {
            trace!(request_id = %uuid, "OPTIONS pre-flight, synthesizing CORS reply");
            Response::ok().with_cors()
        } else {
            let auth_header = raw.header("authorization");
            request.auth = ctx.authenticator.authenticate(&AuthRequest {
                auth_header,
                request: &request,
            });

            if !request.auth.access {
                trace!(request_id = %uuid, "request unauthorized");
                if ctx.config.enable_http_basic_auth {
                    let value = if ctx.config.http_basic_auth_realm.is_empty() {
                        "Basic".to_string()
                    } else {
                        format!("Basic realm={}", ctx.config.http_basic_auth_realm)
                    };
                    extra_headers.push(("WWW-Authenticate".to_string(), value));
                }
                Response::new(401, "Access Denied!")
            } else {
                let resp = ctx.routes.dispatch(&mut request);
                if let Some(metrics) = &ctx.instance_metrics {
                    if !request.route.is_empty() {
                        metrics.increment_http_request(&request.route, method.as_str());
                    }
                }
                resp
            }
        };

        if response.close {
            close = true;
        }

        info!(
            request_id = %uuid,
            peer = %peer,
            account = %request.auth.account,
            method = %method,
            target = %location,
            status = response.code,
            reason = %response.reason,
            "request"
        );

        let mut response = response;
        if let Some(continuation) = response.continuation.take() {
            let handle = StreamHandle::new(
                &mut stream,
                ctx.config.http_io_timeout,
                probe,
                &ctx.server_id,
            );
            if let Err(err) = continuation.run(handle) {
                debug!(request_id = %uuid, error = %err, "continuation ended with error");
            }
            // The probe read may still be parked on the socket; tearing
            // down both directions releases it.
            let _ = stream.close_both();
            trace!(peer = %peer, "session closed after continuation");
            return;
        }

        if let Err(err) = write_response(
            &mut stream,
            &response,
            &WriteOptions {
                server_id: &ctx.server_id,
                close,
                is_options: method == Method::Options,
                accept_gzip,
                extra_headers,
            },
        ) {
            warn!(request_id = %uuid, peer = %peer, error = %err, "write failed");
            return;
        }
    }

    if stream
        .set_io_timeout(Some(ctx.config.http_io_timeout))
        .is_ok()
    {
        if let Err(err) = stream.close_send() {
            trace!(peer = %peer, error = %err, "shutdown failed");
        }
    }
    trace!(peer = %peer, "session closed");
}

/// Build the decoded [`Request`], inflating a gzip body under the
/// configured cap. `Err(())` means "answer 400".
fn decode_request(ctx: &SessionContext, raw: &RawRequest, is_https: bool) -> Result<Request, ()> {
    let body = if raw
        .header("content-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
    {
        match crate::server::http1::gzip_decompress(&raw.body, ctx.config.max_decompressed_size) {
            Ok(body) => body,
            Err(err) => {
                debug!(error = %err, "request body decompression failed");
                return Err(());
            }
        }
    } else {
        raw.body.clone()
    };

    let cookies = raw.header("cookie").map(parse_cookies).unwrap_or_default();

    Ok(Request::new(
        raw.method,
        &raw.target,
        body,
        cookies,
        is_https,
        ConnectionProbe::new(),
    ))
}

fn write_plain(
    stream: &mut HttpStream,
    ctx: &SessionContext,
    resp: &Response,
    close: bool,
    accept_gzip: bool,
    extra_headers: Vec<(String, String)>,
) -> std::io::Result<()> {
    write_response(
        stream,
        resp,
        &WriteOptions {
            server_id: &ctx.server_id,
            close,
            is_options: false,
            accept_gzip,
            extra_headers,
        },
    )
}

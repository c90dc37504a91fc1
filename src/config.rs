//! Server configuration.
//!
//! [`HttpConfig`] carries everything the embedding application can tune:
//! endpoints, TLS material, timeouts, body-size caps and the telemetry
//! switches. Coroutine stack size is tuned separately through the
//! `YAHAT_STACK_SIZE` environment variable (decimal or `0x` hex) because it
//! is a deployment concern rather than an application one.

use std::env;
use std::time::Duration;

/// Default number of worker threads driving the shared coroutine reactor.
pub const DEFAULT_NUM_HTTP_THREADS: usize = 6;

/// Default rolling I/O deadline applied to every blocking socket operation.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(120);

/// Budget for completing a TLS handshake on a fresh connection.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on the inflated size of a gzip request body (10 MiB).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 10 * 1024 * 1024;

/// Configuration for an embedded HTTP server instance.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Worker threads for the shared reactor. Handler and file I/O run on
    /// these threads too, so a few extra cover slow synchronous work.
    pub num_http_threads: usize,
    /// IP address or hostname to listen on, e.g. `"::"` or `"127.0.0.1"`.
    pub http_endpoint: String,
    /// Port or service name. Empty selects `"http"` or `"https"` depending
    /// on whether TLS is configured.
    pub http_port: String,
    /// Path to the PEM key file. A non-empty value enables TLS.
    pub http_tls_key: String,
    /// Path to the PEM certificate chain file.
    pub http_tls_cert: String,
    /// Advertise `WWW-Authenticate: Basic` on 401 replies.
    pub enable_http_basic_auth: bool,
    /// Optional realm for the `WWW-Authenticate` header.
    pub http_basic_auth_realm: String,
    /// Rolling I/O deadline; re-armed at every request boundary.
    pub http_io_timeout: Duration,
    /// Cap on the inflated size of gzip request bodies.
    pub max_decompressed_size: usize,
    /// Answer OPTIONS pre-flights with a permissive CORS reply without
    /// invoking any handler.
    pub auto_handle_cors: bool,
    /// Maintain the instance registry and serve it at `metrics_target`.
    pub enable_metrics: bool,
    /// Route for the OpenMetrics endpoint.
    pub metrics_target: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            num_http_threads: DEFAULT_NUM_HTTP_THREADS,
            http_endpoint: String::new(),
            http_port: String::new(),
            http_tls_key: String::new(),
            http_tls_cert: String::new(),
            enable_http_basic_auth: true,
            http_basic_auth_realm: String::new(),
            http_io_timeout: DEFAULT_IO_TIMEOUT,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
            auto_handle_cors: true,
            enable_metrics: true,
            metrics_target: "/metrics".to_string(),
        }
    }
}

impl HttpConfig {
    /// True when a TLS key has been configured.
    pub fn is_tls(&self) -> bool {
        !self.http_tls_key.is_empty()
    }

    /// The effective port string: the configured one, or the scheme default.
    pub fn effective_port(&self) -> &str {
        if !self.http_port.is_empty() {
            return &self.http_port;
        }
        if self.is_tls() {
            "https"
        } else {
            "http"
        }
    }
}

/// Coroutine stack size in bytes, from `YAHAT_STACK_SIZE` (decimal or
/// `0x`-prefixed hex). Defaults to 64 KiB, enough for handler call chains
/// without bloating per-connection memory.
pub fn stack_size_from_env() -> usize {
    match env::var("YAHAT_STACK_SIZE") {
        Ok(val) => {
            if let Some(hex) = val.strip_prefix("0x") {
                usize::from_str_radix(hex, 16).unwrap_or(0x10000)
            } else {
                val.parse().unwrap_or(0x10000)
            }
        }
        Err(_) => 0x10000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = HttpConfig::default();
        assert_eq!(cfg.num_http_threads, 6);
        assert_eq!(cfg.http_io_timeout, Duration::from_secs(120));
        assert_eq!(cfg.max_decompressed_size, 10 * 1024 * 1024);
        assert!(cfg.enable_http_basic_auth);
        assert!(cfg.auto_handle_cors);
        assert!(cfg.enable_metrics);
        assert_eq!(cfg.metrics_target, "/metrics");
        assert!(!cfg.is_tls());
    }

    #[test]
    fn port_defaults_follow_tls_mode() {
        let mut cfg = HttpConfig::default();
        assert_eq!(cfg.effective_port(), "http");
        cfg.http_tls_key = "key.pem".into();
        assert_eq!(cfg.effective_port(), "https");
        cfg.http_port = "8080".into();
        assert_eq!(cfg.effective_port(), "8080");
    }
}

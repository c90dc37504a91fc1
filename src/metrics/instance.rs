//! The server's own telemetry: connection, session and per-route request
//! counters, plus the route handler that exposes the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::handlers::{HandlerResult, RequestHandler};
use crate::metrics::{Counter, Gauge, Metrics};
use crate::request::{Method, Request};
use crate::response::Response;

/// Every verb a route counter is pre-registered for. `O` is the wildcard
/// row used when a request's verb has no dedicated counter.
const ALL_METHODS: [&str; 7] = ["GET", "PUT", "POST", "PATCH", "DELETE", "OPTIONS", "O"];

/// Metrics the serving library maintains about itself.
///
/// Owns (or shares) a [`Metrics`] registry and keeps direct handles to the
/// hot counters so request processing never goes through the registry map.
/// Per-route counters are pre-registered when routes are added; the
/// increment path looks up the exact `(method, route)` counter and falls
/// back to the route's wildcard row.
pub struct InstanceMetrics {
    metrics: Arc<Metrics>,
    incoming_requests: Arc<Counter>,
    tcp_connections: Arc<Counter>,
    current_sessions: Arc<Gauge>,
    worker_threads: Arc<Gauge>,
    http_requests: Mutex<HashMap<String, Arc<Counter>>>,
}

impl InstanceMetrics {
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Metrics::new()))
    }

    /// Build on an existing registry so the application's own metrics and
    /// the server's share one exposition endpoint.
    pub fn with_registry(metrics: Arc<Metrics>) -> Result<Self> {
        let incoming_requests = metrics.add_counter(
            "yahat_incoming_requests",
            "Number of incoming requests",
            "count",
            vec![],
        )?;
        let tcp_connections = metrics.add_counter(
            "yahat_tcp_connections",
            "Number of TCP connections",
            "count",
            vec![],
        )?;
        let current_sessions = metrics.add_gauge(
            "yahat_current_sessions",
            "Number of current sessions",
            "count",
            vec![],
        )?;
        let worker_threads = metrics.add_gauge(
            "yahat_worker_threads",
            "Number of worker threads",
            "count",
            vec![],
        )?;

        Ok(Self {
            metrics,
            incoming_requests,
            tcp_connections,
            current_sessions,
            worker_threads,
            http_requests: Mutex::new(HashMap::new()),
        })
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn incoming_requests(&self) -> &Arc<Counter> {
        &self.incoming_requests
    }

    pub fn tcp_connections(&self) -> &Arc<Counter> {
        &self.tcp_connections
    }

    pub fn current_sessions(&self) -> &Arc<Gauge> {
        &self.current_sessions
    }

    pub fn worker_threads(&self) -> &Arc<Gauge> {
        &self.worker_threads
    }

    /// Pre-register the per-route request counters for every verb plus the
    /// wildcard row. Registering the same route twice is a no-op.
    pub fn add_http_requests(&self, route: &str) -> Result<()> {
        let mut map = self.http_requests.lock().unwrap();
        for method in ALL_METHODS {
            let key = format!("{method}{route}");
            if map.contains_key(&key) {
                continue;
            }
            let counter = self.metrics.add_counter(
                "yahat_incoming_requests",
                "Number of incoming requests",
                "count",
                vec![
                    ("route".to_string(), route.to_string()),
                    ("method".to_string(), method.to_string()),
                ],
            )?;
            map.insert(key, counter);
        }
        Ok(())
    }

    /// Count one request against its route: the exact `(method, route)`
    /// counter when registered, else the route's wildcard row.
    pub fn increment_http_request(&self, route: &str, method: &str) {
        let key = format!("{method}{route}");
        let fallback_key = format!("O{route}");
        let map = self.http_requests.lock().unwrap();
        if let Some(counter) = map.get(&key) {
            counter.inc();
        } else if let Some(counter) = map.get(&fallback_key) {
            counter.inc();
        }
    }
}

/// Route handler serving the rendered registry. Responds only to GET.
pub struct MetricsHandler {
    instance: Arc<InstanceMetrics>,
}

impl MetricsHandler {
    pub fn new(instance: Arc<InstanceMetrics>) -> Self {
        Self { instance }
    }
}

impl RequestHandler for MetricsHandler {
    fn handle(&self, req: &Request) -> HandlerResult {
        if req.method != Method::Get {
            return Ok(Response::new(405, "Method Not Allowed - only GET is allowed here"));
        }
        Ok(Response::new(200, "OK")
            .with_body(self.instance.metrics().render())
            .with_mime_type(Metrics::content_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_route_counters_fall_back_to_wildcard() {
        let instance = InstanceMetrics::new().unwrap();
        instance.add_http_requests("/api").unwrap();

        instance.increment_http_request("/api", "GET");
        instance.increment_http_request("/api", "GET");
        instance.increment_http_request("/api", "HEAD"); // no dedicated row

        let rendered = instance.metrics().render();
        assert!(rendered
            .contains("yahat_incoming_requests_total{method=\"GET\",route=\"/api\"} 2"));
        assert!(rendered
            .contains("yahat_incoming_requests_total{method=\"O\",route=\"/api\"} 1"));
    }

    #[test]
    fn registering_a_route_twice_is_a_noop() {
        let instance = InstanceMetrics::new().unwrap();
        instance.add_http_requests("/api").unwrap();
        instance.add_http_requests("/api").unwrap();
    }
}

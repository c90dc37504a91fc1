//! The decoded request value handed to handlers, plus the target, query
//! and cookie parsing used by the framing layer.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use percent_encoding::percent_decode_str;

use crate::auth::Auth;
use crate::ids::RequestId;

/// The verbs this server speaks. Anything else fails request parsing and
/// is answered with a 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Patch,
    Post,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unsupported or unknown request verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl fmt::Display for UnknownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown method {:?}", self.0)
    }
}

impl std::error::Error for UnknownMethod {}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "POST" => Ok(Method::Post),
            "DELETE" => Ok(Method::Delete),
            "OPTIONS" => Ok(Method::Options),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

/// Revocable view of a connection's liveness.
///
/// Handlers can ask whether the peer is still reachable; during an SSE
/// continuation the flag reflects the half-duplex probe, and it flips to
/// false the moment the peer closes its read side.
#[derive(Clone, Default)]
pub struct ConnectionProbe {
    ok: Arc<AtomicBool>,
}

impl ConnectionProbe {
    pub fn new() -> Self {
        Self {
            ok: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_closed(&self) {
        self.ok.store(false, Ordering::Relaxed);
    }
}

/// A parsed request, produced by the framing layer and owned by the
/// current dispatch.
pub struct Request {
    pub method: Method,
    /// Percent-decoded path portion of the request URI, query stripped.
    pub target: String,
    /// Query arguments; the last occurrence of a key wins, a bare key maps
    /// to the empty string.
    pub arguments: HashMap<String, String>,
    /// Cookies in wire order, names and values whitespace-trimmed,
    /// duplicates preserved.
    pub cookies: Vec<(String, String)>,
    /// Body bytes, already gzip-inflated when the request was coded.
    pub body: Vec<u8>,
    /// The route prefix selected by the dispatcher, filled before the
    /// handler runs.
    pub route: String,
    /// The authenticator's verdict.
    pub auth: Auth,
    /// Correlation id for logging.
    pub uuid: RequestId,
    /// True when the connection terminated TLS.
    pub is_https: bool,
    probe: ConnectionProbe,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        raw_target: &str,
        body: Vec<u8>,
        cookies: Vec<(String, String)>,
        is_https: bool,
        probe: ConnectionProbe,
    ) -> Self {
        let (target, arguments) = split_target(raw_target);
        Self {
            method,
            target,
            arguments,
            cookies,
            body,
            route: String::new(),
            auth: Auth::default(),
            uuid: RequestId::new(),
            is_https,
            probe,
        }
    }

    /// Is the client still reachable? See [`ConnectionProbe`].
    pub fn probe_connection_ok(&self) -> bool {
        self.probe.is_ok()
    }

    pub(crate) fn probe(&self) -> ConnectionProbe {
        self.probe.clone()
    }

    /// The value of a query argument, if present.
    pub fn get_argument(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).map(String::as_str)
    }

    /// The first cookie with the given name, if any.
    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Split a raw request target on the first `?`: the left side is
/// percent-decoded into the path, the right side becomes the argument map.
pub(crate) fn split_target(raw: &str) -> (String, HashMap<String, String>) {
    let (path, query) = match raw.find('?') {
        Some(pos) => (&raw[..pos], &raw[pos + 1..]),
        None => (raw, ""),
    };
    let target = percent_decode_str(path).decode_utf8_lossy().into_owned();
    let mut arguments = HashMap::new();
    if !query.is_empty() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            arguments.insert(key.into_owned(), value.into_owned());
        }
    }
    (target, arguments)
}

/// Parse a `Cookie` header: split on `;`, each segment on the first `=`,
/// both sides trimmed, wire order and duplicates preserved.
pub(crate) fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parsing() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("OPTIONS".parse::<Method>().unwrap(), Method::Options);
        assert!("HEAD".parse::<Method>().is_err());
        assert!("get".parse::<Method>().is_err());
    }

    #[test]
    fn target_splits_and_decodes() {
        let (target, args) = split_target("/a%20b/c?x=1&y=2");
        assert_eq!(target, "/a b/c");
        assert_eq!(args.get("x").map(String::as_str), Some("1"));
        assert_eq!(args.get("y").map(String::as_str), Some("2"));
    }

    #[test]
    fn last_argument_occurrence_wins() {
        let (_, args) = split_target("/p?x=1&x=2&flag");
        assert_eq!(args.get("x").map(String::as_str), Some("2"));
        assert_eq!(args.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn cookie_order_and_duplicates_preserved() {
        let cookies = parse_cookies(" a=1; b = 2 ;a=3; empty");
        assert_eq!(
            cookies,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "3".to_string()),
                ("empty".to_string(), "".to_string()),
            ]
        );
    }

    #[test]
    fn probe_defaults_open() {
        let probe = ConnectionProbe::new();
        assert!(probe.is_ok());
        probe.mark_closed();
        assert!(!probe.is_ok());
    }
}

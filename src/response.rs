//! The response value returned by handlers and serialized by the session.

use std::fmt;

use crate::continuation::Continuation;
use crate::mime;

/// A handler's reply. Built with the `with_*` combinators; everything not
/// set explicitly is filled in by the session when the reply is written
/// (content type inference, the canonical status document for empty
/// bodies, connection headers).
pub struct Response {
    pub code: u16,
    pub reason: String,
    pub body: Vec<u8>,
    /// The target actually served, used for MIME inference (e.g. the
    /// resolved file path of a file handler).
    pub target: String,
    /// Explicit content type; wins over inference when non-empty.
    pub mime_type: String,
    /// Force connection closure after this reply is written.
    pub close: bool,
    /// Attach the permissive CORS header block.
    pub cors: bool,
    /// Emitted as `Set-Cookie` headers, in order.
    pub cookies: Vec<(String, String)>,
    /// When set, the session hands the raw stream to this continuation
    /// instead of writing a conventional reply.
    pub continuation: Option<Box<dyn Continuation>>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200, "OK")
    }
}

impl Response {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            body: Vec::new(),
            target: String::new(),
            mime_type: String::new(),
            close: false,
            cors: false,
            cookies: Vec::new(),
            continuation: None,
        }
    }

    /// 200 OK with an empty body.
    pub fn ok() -> Self {
        Self::default()
    }

    /// 404 with the canonical reason used for both route and file misses.
    pub fn not_found() -> Self {
        Self::new(404, "Document not found")
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_close(mut self) -> Self {
        self.close = true;
        self
    }

    pub fn with_cors(mut self) -> Self {
        self.cors = true;
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn with_continuation(mut self, continuation: Box<dyn Continuation>) -> Self {
        self.continuation = Some(continuation);
        self
    }

    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        self.code / 100 == 2
    }

    /// The canonical JSON status document synthesized for empty bodies.
    pub fn status_document(&self) -> Vec<u8> {
        serde_json::json!({
            "error": !self.is_success(),
            "status": self.code,
            "reason": self.reason,
        })
        .to_string()
        .into_bytes()
    }

    /// The content type to write: the explicit one, else inferred from the
    /// target's extension, else the JSON default.
    pub fn effective_mime_type(&self) -> &str {
        if !self.mime_type.is_empty() {
            return &self.mime_type;
        }
        mime::from_target(&self.target).unwrap_or(mime::DEFAULT_MIME_TYPE)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("code", &self.code)
            .field("reason", &self.reason)
            .field("body_len", &self.body.len())
            .field("close", &self.close)
            .field("cors", &self.cors)
            .field("continuation", &self.continuation.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_document_shape() {
        let resp = Response::not_found();
        let doc: serde_json::Value = serde_json::from_slice(&resp.status_document()).unwrap();
        assert_eq!(doc["error"], true);
        assert_eq!(doc["status"], 404);
        assert_eq!(doc["reason"], "Document not found");

        let ok: serde_json::Value =
            serde_json::from_slice(&Response::ok().status_document()).unwrap();
        assert_eq!(ok["error"], false);
    }

    #[test]
    fn mime_inference_prefers_explicit_type() {
        let resp = Response::ok().with_target("/ui/app.css");
        assert_eq!(resp.effective_mime_type(), "text/css");

        let resp = resp.with_mime_type("text/plain");
        assert_eq!(resp.effective_mime_type(), "text/plain");

        let resp = Response::ok();
        assert_eq!(resp.effective_mime_type(), mime::DEFAULT_MIME_TYPE);
    }
}

//! Authentication seam.
//!
//! The server never interprets credentials itself: every request is passed
//! to the application's [`Authenticator`], whose verdict gates dispatch.
//! A denial short-circuits the handler and is answered with 401 (plus
//! `WWW-Authenticate: Basic` when basic auth is enabled in the config).

use std::any::Any;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Verdict returned by the authenticator.
#[derive(Default)]
pub struct Auth {
    /// Account name, used in the access log.
    pub account: String,
    /// Whether the request may proceed to a handler.
    pub access: bool,
    /// Opaque per-request data for the application's own use.
    pub extra: Option<Box<dyn Any + Send + Sync>>,
}

impl Auth {
    /// An allowing verdict for the given account.
    pub fn allow(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            access: true,
            extra: None,
        }
    }

    /// A denying verdict.
    pub fn deny() -> Self {
        Self::default()
    }
}

/// What the authenticator gets to look at: the verbatim `Authorization`
/// header (when present) and the parsed request.
pub struct AuthRequest<'a> {
    pub auth_header: Option<&'a str>,
    pub request: &'a crate::request::Request,
}

/// Called once per request, on the session's coroutine. Implementations
/// must be safe to call concurrently across connections.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, req: &AuthRequest) -> Auth;
}

/// Authenticator that admits everything; for servers where access control
/// lives elsewhere (or nowhere).
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _req: &AuthRequest) -> Auth {
        Auth::allow("")
    }
}

impl<F> Authenticator for F
where
    F: Fn(&AuthRequest) -> Auth + Send + Sync,
{
    fn authenticate(&self, req: &AuthRequest) -> Auth {
        self(req)
    }
}

/// Decode `Authorization: Basic` credentials into `(user, password)`.
/// Returns `None` for any other scheme or malformed input.
pub fn basic_credentials(auth_header: &str) -> Option<(String, String)> {
    let encoded = auth_header.strip_prefix("Basic ")?.trim();
    let decoded = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_credentials_decode() {
        // "user:secret"
        assert_eq!(
            basic_credentials("Basic dXNlcjpzZWNyZXQ="),
            Some(("user".to_string(), "secret".to_string()))
        );
        assert_eq!(basic_credentials("Bearer abc"), None);
        assert_eq!(basic_credentials("Basic ////"), None);
    }

    #[test]
    fn default_verdict_denies() {
        assert!(!Auth::default().access);
        assert!(Auth::allow("bob").access);
    }
}

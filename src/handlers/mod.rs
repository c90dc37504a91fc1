//! Handler capability and the bundled handlers.
//!
//! A route handler is one operation: take a parsed [`Request`], produce a
//! [`Response`]. The error channel is explicit: a handler can surface a
//! `Response` to exit early with a specific status, or an internal error
//! that the dispatcher logs and converts to a 500.

mod embedded;
mod files;

pub use embedded::EmbeddedHandler;
pub use files::FileHandler;

use std::io;

use crate::request::Request;
use crate::response::Response;

/// Error channel of a handler.
#[derive(Debug)]
pub enum HandlerError {
    /// Early exit: this response is written verbatim.
    Reply(Response),
    /// Unexpected failure: logged with handler type info, answered 500.
    Internal(anyhow::Error),
}

impl HandlerError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        HandlerError::Internal(err.into())
    }
}

impl From<Response> for HandlerError {
    fn from(resp: Response) -> Self {
        HandlerError::Reply(resp)
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Internal(err)
    }
}

impl From<io::Error> for HandlerError {
    fn from(err: io::Error) -> Self {
        HandlerError::Internal(err.into())
    }
}

pub type HandlerResult = Result<Response, HandlerError>;

/// A registered request handler. Invoked on the session's coroutine; must
/// not assume anything about which worker thread that is.
///
/// Handlers receive the request by shared reference and must not mutate
/// shared state non-atomically; the same handler instance serves every
/// connection concurrently.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, req: &Request) -> HandlerResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_converts_to_early_reply() {
        let err: HandlerError = Response::new(302, "Found").into();
        match err {
            HandlerError::Reply(resp) => assert_eq!(resp.code, 302),
            HandlerError::Internal(_) => panic!("expected early reply"),
        }
    }
}

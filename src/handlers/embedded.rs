use std::collections::HashMap;

use anyhow::anyhow;

use crate::handlers::{HandlerResult, RequestHandler};
use crate::request::Request;
use crate::response::Response;

/// Serves content compiled into the binary (or otherwise held in memory)
/// under a route prefix. The map keys are paths relative to the prefix;
/// an empty remainder serves `index.html`.
pub struct EmbeddedHandler<T> {
    content: HashMap<String, T>,
    prefix: String,
}

impl<T: AsRef<[u8]> + Send + Sync> EmbeddedHandler<T> {
    pub fn new(content: HashMap<String, T>, prefix: impl Into<String>) -> Self {
        Self {
            content,
            prefix: prefix.into(),
        }
    }
}

impl<T: AsRef<[u8]> + Send + Sync> RequestHandler for EmbeddedHandler<T> {
    fn handle(&self, req: &Request) -> HandlerResult {
        if req.target.len() < self.prefix.len() {
            return Err(anyhow!("invalid target: cannot be shorter than the prefix").into());
        }

        let mut remainder = &req.target[self.prefix.len()..];
        while let Some(stripped) = remainder.strip_prefix('/') {
            remainder = stripped;
        }
        if remainder.is_empty() {
            remainder = "index.html";
        }

        match self.content.get(remainder) {
            Some(body) => {
                let served = format!("{}/{}", self.prefix.trim_end_matches('/'), remainder);
                Ok(Response::ok()
                    .with_body(body.as_ref().to_vec())
                    .with_target(served))
            }
            None => Ok(Response::not_found()),
        }
    }
}

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::handlers::{HandlerResult, RequestHandler};
use crate::request::Request;
use crate::response::Response;

/// Serves a directory tree from disk. Directories serve their
/// `index.html`; listings are deliberately refused.
pub struct FileHandler {
    root: PathBuf,
}

impl FileHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), "file handler ready");
        Self { root }
    }

    /// Map the part of the target below the route prefix onto the root.
    /// Any component that would escape the root is rejected.
    fn resolve(&self, remainder: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for comp in Path::new(remainder).components() {
            match comp {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }

    fn read_file(&self, path: &Path) -> Response {
        match fs::read(path) {
            Ok(body) => Response::ok()
                .with_body(body)
                .with_target(path.to_string_lossy().into_owned()),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "file read failed");
                Response::new(500, "Failed to open file for read")
            }
        }
    }

    fn handle_dir(&self, path: &Path) -> Response {
        let index = path.join("index.html");
        if index.is_file() {
            return self.read_file(&index);
        }
        Response::new(404, "Directory listings are not supported")
    }
}

impl RequestHandler for FileHandler {
    fn handle(&self, req: &Request) -> HandlerResult {
        let remainder = req
            .target
            .strip_prefix(req.route.as_str())
            .unwrap_or(req.target.as_str())
            .trim_start_matches('/');

        let Some(path) = self.resolve(remainder) else {
            debug!(target = %req.target, "target escapes the served root");
            return Ok(Response::not_found());
        };

        let Ok(meta) = fs::metadata(&path) else {
            return Ok(Response::not_found());
        };

        if meta.is_file() {
            return Ok(self.read_file(&path));
        }
        if meta.is_dir() {
            return Ok(self.handle_dir(&path));
        }
        Ok(Response::not_found())
    }
}

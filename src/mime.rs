/// MIME type used when nothing better can be inferred. This is a REST
/// library first, so JSON is the natural fallback.
pub const DEFAULT_MIME_TYPE: &str = "application/json; charset=utf-8";

/// Content type for rendered OpenMetrics output.
pub const OPENMETRICS_MIME_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Look up the MIME type for a bare file extension (no leading dot).
/// Returns `None` for unknown extensions.
pub fn from_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "json" => "application/json; charset=utf-8",
        "bin" => "application/octet-stream",
        "bz" => "application/x-bzip",
        "bz2" => "application/x-bzip2",
        "css" => "text/css",
        "csv" => "text/csv",
        "gz" => "application/gzip",
        "gif" => "image/gif",
        "htm" | "html" => "text/html",
        "ico" => "image/vnd.microsoft.icon",
        "jar" => "application/java-archive",
        "jpeg" | "jpg" => "image/jpeg",
        "js" | "mjs" => "text/javascript",
        "otf" => "font/otf",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "tar" => "application/x-tar",
        "tiff" => "image/tiff",
        "ttf" => "font/ttf",
        "txt" => "text/plain; charset=utf-8",
        "xhtml" => "application/xhtml+xml",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "7z" => "application/x-7z-compressed",
        "jsonld" => "application/ld+json",
        _ => return None,
    };
    Some(mime)
}

/// Infer a MIME type from the extension of a target path, if it has one.
pub fn from_target(target: &str) -> Option<&'static str> {
    let pos = target.rfind('.')?;
    if pos + 1 >= target.len() {
        return None;
    }
    from_extension(&target[pos + 1..])
}

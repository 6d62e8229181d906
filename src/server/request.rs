use may_minihttp::Request;
use std::collections::HashMap;
use tracing::debug;

/// Parsed HTTP request data used by `ProgressService`.
///
/// The endpoint never reads a body, so only the request line and headers are
/// kept.
#[derive(Debug, PartialEq)]
pub struct ParsedRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path without the query string
    pub path: String,
    /// HTTP headers (lowercase keys)
    pub headers: HashMap<String, String>,
}

impl ParsedRequest {
    /// Header value by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Strip the query string from a request target.
pub fn path_only(raw_path: &str) -> &str {
    match raw_path.split('?').next() {
        Some(p) if !p.is_empty() => p,
        _ => "/",
    }
}

/// Extract method, path and headers from a `may_minihttp::Request`.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = req.method().to_string();
    let path = path_only(req.path()).to_string();

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    // Names only; the authorization value is a credential.
    debug!(
        method = %method,
        path = %path,
        header_count = headers.len(),
        header_names = ?headers.keys().take(20).collect::<Vec<_>>(),
        "Request parsed"
    );

    ParsedRequest {
        method,
        path,
        headers,
    }
}

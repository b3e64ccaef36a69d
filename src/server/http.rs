//! Minimal HTTP/1.1 pieces for the dev server.
//!
//! Only what a static file server with a reload channel needs: request-line
//! parsing, path resolution inside the served root, content types, response
//! heads and reload-script injection.

use std::path::{Component, Path, PathBuf};

/// Client script injected into every served HTML page.
pub const RELOAD_SCRIPT: &str = r#"<script>
(function () {
  var source = new EventSource("/__frontkit/events");
  source.addEventListener("reload", function () { window.location.reload(); });
  source.addEventListener("build-error", function (e) {
    var data = JSON.parse(e.data);
    console.error("[frontkit] " + data.stage + ": " + data.error);
  });
})();
</script>
"#;

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Decoded path without query string
    pub path: String,
}

/// Parse the request line of an HTTP/1.x request head.
pub fn parse_request(head: &str) -> Option<Request> {
    let line = head.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_ascii_uppercase();
    let target = parts.next()?;
    let version = parts.next()?;
    if !version.starts_with("HTTP/1.") {
        return None;
    }

    let raw_path = target.split(['?', '#']).next().unwrap_or("/");
    let path = percent_decode(raw_path)?;
    Some(Request { method, path })
}

/// Decode `%XX` escapes. Returns `None` for malformed escapes or invalid UTF-8.
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Outcome of mapping a URL path onto the served root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    File(PathBuf),
    Forbidden,
    NotFound,
}

/// Map a decoded URL path to a file under `root`.
///
/// `/` and directories resolve to their `index.html`. Any attempt to leave
/// the root, through `..` or a symlink, is forbidden.
pub fn resolve(root: &Path, url_path: &str) -> Resolved {
    let mut candidate = root.to_path_buf();
    for component in Path::new(url_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => candidate.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return Resolved::Forbidden,
        }
    }

    if candidate.is_dir() {
        candidate.push("index.html");
    }
    if !candidate.is_file() {
        return Resolved::NotFound;
    }

    match (candidate.canonicalize(), root.canonicalize()) {
        (Ok(file), Ok(root)) if file.starts_with(&root) => Resolved::File(file),
        (Ok(_), Ok(_)) => Resolved::Forbidden,
        _ => Resolved::NotFound,
    }
}

/// Content type by file extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        "ttf" => "font/ttf",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Whether a response for `path` should get the reload script.
pub fn is_html(path: &Path) -> bool {
    content_type(path).starts_with("text/html")
}

/// Insert [`RELOAD_SCRIPT`] before the last `</body>`, or append it.
pub fn inject_reload_script(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + RELOAD_SCRIPT.len());
            out.push_str(&html[..idx]);
            out.push_str(RELOAD_SCRIPT);
            out.push_str(&html[idx..]);
            out
        }
        None => format!("{}{}", html, RELOAD_SCRIPT),
    }
}

/// Response head for a complete (non-streaming) response.
pub fn response_head(status: u16, reason: &str, content_type: &str, content_length: usize) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status, reason, content_type, content_length
    )
}

/// Head opening a Server-Sent Events stream.
pub fn event_stream_head() -> &'static str {
    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-store\r\nConnection: keep-alive\r\n\r\n"
}

/// A plain-text error response.
pub fn error_response(status: u16, reason: &str) -> String {
    let body = format!("{} {}\n", status, reason);
    format!("{}{}", response_head(status, reason, "text/plain; charset=utf-8", body.len()), body)
}

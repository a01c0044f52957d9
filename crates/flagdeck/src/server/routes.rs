//! Request routing and transport-independent replies.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tiny_http::Method;

/// What a request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /`
    Page,
    /// `GET /health`
    Health,
    /// `GET /api/config`
    Config,
    /// `GET /api/flags`
    Flags,
    /// `GET /api/deck`
    Deck,
    /// `POST /api/flags/<key>/toggle`
    ToggleFlag(String),
    /// `POST /api/keys/<code>`
    Key(u32),
    /// `GET /api/operator/sections`
    OperatorSections,
    /// `POST /api/operator/toggle-all`
    ToggleAll,
    /// `POST /api/operator/reset-flags`
    ResetFlags,
    /// `POST /api/operator/cleanup`
    Cleanup,
    /// `POST /api/operator/reset`
    Reset,
    /// `GET /static/<path>`
    Static(String),
    /// `GET /reveal.js/<path>`
    Reveal(String),
    /// CORS preflight.
    Preflight,
    /// Known path, wrong method.
    MethodNotAllowed,
    /// Nothing here.
    NotFound,
}

/// Map a method and request URL to a [`Route`].
#[must_use]
pub fn route(method: &Method, url: &str) -> Route {
    let path = url.split(['?', '#']).next().unwrap_or("/");
    if *method == Method::Options {
        return Route::Preflight;
    }
    let is_get = matches!(method, Method::Get | Method::Head);
    let is_post = *method == Method::Post;

    let Some(decoded) = path
        .trim_matches('/')
        .split('/')
        .map(|segment| urlencoding::decode(segment).ok())
        .collect::<Option<Vec<_>>>()
    else {
        return Route::NotFound;
    };
    let segments: Vec<&str> = decoded.iter().map(std::ops::Deref::deref).collect();
    let (wants_get, route) = match segments.as_slice() {
        [""] => (true, Route::Page),
        ["health"] => (true, Route::Health),
        ["api", "config"] => (true, Route::Config),
        ["api", "flags"] => (true, Route::Flags),
        ["api", "deck"] => (true, Route::Deck),
        ["api", "flags", key, "toggle"] if !key.is_empty() => {
            (false, Route::ToggleFlag((*key).to_string()))
        }
        ["api", "keys", code] => match code.parse() {
            Ok(code) => (false, Route::Key(code)),
            Err(_) => return Route::NotFound,
        },
        ["api", "operator", "sections"] => (true, Route::OperatorSections),
        ["api", "operator", "toggle-all"] => (false, Route::ToggleAll),
        ["api", "operator", "reset-flags"] => (false, Route::ResetFlags),
        ["api", "operator", "cleanup"] => (false, Route::Cleanup),
        ["api", "operator", "reset"] => (false, Route::Reset),
        ["static", rest @ ..] if !rest.is_empty() => (true, Route::Static(rest.join("/"))),
        ["reveal.js", rest @ ..] if !rest.is_empty() => (true, Route::Reveal(rest.join("/"))),
        _ => return Route::NotFound,
    };

    if (wants_get && is_get) || (!wants_get && is_post) {
        route
    } else {
        Route::MethodNotAllowed
    }
}

/// Resolve a request path under `base`, refusing to leave it.
#[must_use]
pub fn resolve_static(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(base.join(relative))
}

/// Content type for a served file, by extension.
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("md" | "txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Body of a [`Reply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// In-memory bytes.
    Bytes(Vec<u8>),
    /// A file, read when the response is written.
    File(PathBuf),
}

/// A response, built by the session and written by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header.
    pub content_type: String,
    /// Payload.
    pub body: Body,
}

impl Reply {
    /// A JSON reply.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => Self {
                status,
                content_type: "application/json".to_string(),
                body: Body::Bytes(bytes),
            },
            Err(e) => Self::error(500, &e.to_string()),
        }
    }

    /// `200 OK` with a JSON body.
    pub fn ok<T: Serialize>(value: &T) -> Self {
        Self::json(200, value)
    }

    /// An HTML reply.
    #[must_use]
    pub fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: Body::Bytes(body.into_bytes()),
        }
    }

    /// A file reply, or 404 when the file does not exist.
    #[must_use]
    pub fn file(path: PathBuf) -> Self {
        if !path.is_file() {
            return Self::not_found();
        }
        Self {
            status: 200,
            content_type: content_type_for(&path).to_string(),
            body: Body::File(path),
        }
    }

    /// A JSON error reply.
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            body: Body::Bytes(
                serde_json::json!({ "error": message })
                    .to_string()
                    .into_bytes(),
            ),
        }
    }

    /// `404 Not Found`.
    #[must_use]
    pub fn not_found() -> Self {
        Self::error(404, "not found")
    }

    /// `204 No Content`.
    #[must_use]
    pub fn no_content() -> Self {
        Self {
            status: 204,
            content_type: "text/plain".to_string(),
            body: Body::Bytes(Vec::new()),
        }
    }
}

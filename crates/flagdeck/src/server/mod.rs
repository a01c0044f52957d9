//! HTTP front end.
//!
//! tiny_http blocks, so the accept loop runs on its own thread and forwards
//! every request into a channel. The session task answers them one at a
//! time and hands the response back to a blocking task for writing.

mod page;
mod routes;

use std::fs::File;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;

use tiny_http::{Header, Request, Response, Server, StatusCode};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use page::render_page;
pub use routes::{content_type_for, resolve_static, route, Body, Reply, Route};

use crate::error::{Error, Result};

/// Content-Security-Policy sent with every response.
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
style-src 'self' 'unsafe-inline' https://fonts.googleapis.com; \
script-src 'self' 'unsafe-inline' 'unsafe-eval'; \
font-src 'self' https://fonts.gstatic.com; \
img-src 'self' data: https:; \
connect-src 'self' https://clientsdk.launchdarkly.com https://events.launchdarkly.com \
https://app.launchdarkly.com https://clientstream.launchdarkly.com";

/// Headers added to every response.
const COMMON_HEADERS: [(&str, &str); 5] = [
    ("Content-Security-Policy", CONTENT_SECURITY_POLICY),
    ("X-Content-Type-Options", "nosniff"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// A bound HTTP server.
pub struct HttpServer {
    server: Arc<Server>,
    addr: String,
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer").field("addr", &self.addr).finish()
    }
}

/// Unblocks a running accept loop.
#[derive(Clone)]
pub struct ServerHandle {
    server: Arc<Server>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle").finish_non_exhaustive()
    }
}

impl ServerHandle {
    /// Make the accept loop return.
    pub fn unblock(&self) {
        self.server.unblock();
    }
}

impl HttpServer {
    /// Bind `addr` (`host:port`; port 0 picks a free one).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] if the address cannot be bound.
    pub fn bind(addr: &str) -> Result<Self> {
        let server = Server::http(addr).map_err(|e| Error::Server {
            addr: addr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            server: Arc::new(server),
            addr: addr.to_string(),
        })
    }

    /// Port actually bound.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.server.server_addr().to_ip().map(|addr| addr.port())
    }

    /// A handle that can stop the accept loop.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server: Arc::clone(&self.server),
        }
    }

    /// Run the accept loop on a thread, forwarding requests into `tx`.
    ///
    /// The thread ends when the server is unblocked or the receiver drops.
    pub fn spawn_accept(&self, tx: mpsc::Sender<Request>) -> thread::JoinHandle<()> {
        let server = Arc::clone(&self.server);
        info!(addr = %self.addr, "HTTP server listening");
        thread::spawn(move || {
            while let Ok(request) = server.recv() {
                if tx.blocking_send(request).is_err() {
                    break;
                }
            }
            debug!("HTTP accept loop stopped");
        })
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

/// Write `reply` to `request`. Blocks; call from a blocking task.
pub fn respond(request: Request, reply: Reply) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let status = reply.status;
    let mut headers: Vec<Header> = COMMON_HEADERS
        .iter()
        .filter_map(|(name, value)| header(name, value))
        .collect();
    headers.extend(header("Content-Type", &reply.content_type));

    let result = match reply.body {
        Body::Bytes(bytes) => {
            let len = bytes.len();
            request.respond(Response::new(
                StatusCode(status),
                headers,
                Cursor::new(bytes),
                Some(len),
                None,
            ))
        }
        Body::File(path) => match File::open(&path) {
            Ok(file) => {
                let mut response = Response::from_file(file).with_status_code(status);
                for h in headers {
                    response.add_header(h);
                }
                request.respond(response)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open file");
                request.respond(Response::from_string("not found").with_status_code(404))
            }
        },
    };

    match result {
        Ok(()) => debug!(%method, %url, status, "Request served"),
        Err(e) => warn!(%method, %url, error = %e, "Failed to write response"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_headers_are_valid() {
        for (name, value) in COMMON_HEADERS {
            assert!(header(name, value).is_some(), "{name}");
        }
        assert!(CONTENT_SECURITY_POLICY.contains("clientstream.launchdarkly.com"));
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let server = HttpServer::bind("127.0.0.1:0").unwrap();
        assert!(server.port().is_some_and(|p| p > 0));
        server.handle().unblock();
    }

    #[test]
    fn test_bind_invalid_address() {
        let err = HttpServer::bind("not-an-address").unwrap_err();
        assert!(matches!(err, Error::Server { .. }));
    }
}

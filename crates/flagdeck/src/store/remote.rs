//! The primary, push-based flag backend.
//!
//! A [`RemoteConnector`] turns a client-side identifier and a user context
//! into a [`RemoteClient`]. The streaming implementation evaluates all flags
//! once over HTTP, then follows a server-sent event stream for changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::flags::UserContext;

/// A change reported by the remote backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    /// Flag key.
    pub key: String,
    /// New value.
    pub current: bool,
    /// Value before the change, as seen by the backend.
    pub previous: bool,
}

/// Callback invoked for every remote change of one flag.
pub type ChangeListener = Box<dyn Fn(RemoteChange) + Send + Sync>;

/// A connected remote flag client.
#[async_trait::async_trait]
pub trait RemoteClient: Send {
    /// Resolve once the client holds a first set of values.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects or cannot serve the client.
    async fn wait_for_initialization(&mut self) -> Result<()>;

    /// Current value of a flag, or `default` when the backend has none.
    fn variation(&self, key: &str, default: bool) -> bool;

    /// Register a listener for changes of one flag.
    fn on_change(&mut self, key: &str, listener: ChangeListener);
}

/// Builds remote clients.
pub trait RemoteConnector: Send + Sync {
    /// Create a client for `client_side_id` evaluating flags for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be constructed.
    fn connect(&self, client_side_id: &str, user: &UserContext) -> Result<Box<dyn RemoteClient>>;
}

/// Connector for the HTTP evaluation endpoint plus event stream.
#[derive(Debug, Clone)]
pub struct StreamingConnector {
    base_uri: String,
    stream_uri: String,
    http: reqwest::Client,
}

impl StreamingConnector {
    /// Create a connector talking to `base_uri` and `stream_uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_uri: impl Into<String>, stream_uri: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("flagdeck/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_uri: base_uri.into(),
            stream_uri: stream_uri.into(),
            http,
        })
    }

    fn urls(&self, client_side_id: &str, user: &UserContext) -> Result<(Url, Url)> {
        let context = encode_context(user)?;
        let base = self.base_uri.trim_end_matches('/');
        let stream = self.stream_uri.trim_end_matches('/');
        let eval = Url::parse(&format!(
            "{base}/sdk/evalx/{client_side_id}/contexts/{context}"
        ))
        .map_err(|e| Error::backend_init(format!("invalid evaluation URL: {e}")))?;
        let events = Url::parse(&format!("{stream}/eval/{client_side_id}/{context}"))
            .map_err(|e| Error::backend_init(format!("invalid stream URL: {e}")))?;
        Ok((eval, events))
    }
}

impl RemoteConnector for StreamingConnector {
    fn connect(&self, client_side_id: &str, user: &UserContext) -> Result<Box<dyn RemoteClient>> {
        if client_side_id.trim().is_empty() {
            return Err(Error::backend_init("client-side id is empty"));
        }
        let (eval_url, stream_url) = self.urls(client_side_id, user)?;
        debug!(%eval_url, "Connecting to flag backend");
        Ok(Box::new(StreamingClient {
            http: self.http.clone(),
            eval_url,
            stream_url,
            shared: Arc::new(Mutex::new(Shared::default())),
            stream_task: None,
        }))
    }
}

/// Serialize the user as a single-kind context, base64url encoded.
fn encode_context(user: &UserContext) -> Result<String> {
    let mut context = serde_json::Map::new();
    context.insert("kind".to_string(), "user".into());
    context.insert("key".to_string(), user.key.clone().into());
    context.insert("name".to_string(), user.name.clone().into());
    for (name, value) in &user.attributes {
        context.insert(name.clone(), value.clone());
    }
    let json = serde_json::to_vec(&serde_json::Value::Object(context))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

#[derive(Default)]
struct Shared {
    values: HashMap<String, bool>,
    listeners: HashMap<String, Vec<ChangeListener>>,
}

impl Shared {
    /// Store `value` for `key` and notify listeners if it changed.
    fn set(&mut self, key: &str, value: bool) {
        let previous = self.values.insert(key.to_string(), value).unwrap_or(false);
        if previous == value {
            return;
        }
        trace!(key, value, "Remote flag changed");
        if let Some(listeners) = self.listeners.get(key) {
            for listener in listeners {
                listener(RemoteChange {
                    key: key.to_string(),
                    current: value,
                    previous,
                });
            }
        }
    }

    /// Replace every value; keys missing from `values` fall back to false.
    fn replace_all(&mut self, values: HashMap<String, bool>) {
        let dropped: Vec<String> = self
            .values
            .keys()
            .filter(|key| !values.contains_key(*key))
            .cloned()
            .collect();
        for key in dropped {
            self.set(&key, false);
        }
        for (key, value) in values {
            self.set(&key, value);
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A remote client backed by the evaluation endpoint and event stream.
pub struct StreamingClient {
    http: reqwest::Client,
    eval_url: Url,
    stream_url: Url,
    shared: Arc<Mutex<Shared>>,
    stream_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("eval_url", &self.eval_url.as_str())
            .field("streaming", &self.stream_task.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for StreamingClient {
    fn drop(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
    }
}

#[async_trait::async_trait]
impl RemoteClient for StreamingClient {
    async fn wait_for_initialization(&mut self) -> Result<()> {
        let values = fetch_evaluations(&self.http, &self.eval_url).await?;
        info!(flags = values.len(), "Flag backend ready");
        lock(&self.shared).replace_all(values);

        if self.stream_task.is_none() {
            self.stream_task = Some(tokio::spawn(follow_stream(
                self.http.clone(),
                self.stream_url.clone(),
                self.eval_url.clone(),
                Arc::clone(&self.shared),
            )));
        }
        Ok(())
    }

    fn variation(&self, key: &str, default: bool) -> bool {
        lock(&self.shared).values.get(key).copied().unwrap_or(default)
    }

    fn on_change(&mut self, key: &str, listener: ChangeListener) {
        lock(&self.shared)
            .listeners
            .entry(key.to_string())
            .or_default()
            .push(listener);
    }
}

#[derive(Debug, Deserialize)]
struct Evaluation {
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Patch {
    key: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Delete {
    key: String,
}

/// Keep the boolean evaluations; other variation types are not flags we use.
fn boolean_evaluations(map: HashMap<String, Evaluation>) -> HashMap<String, bool> {
    map.into_iter()
        .filter_map(|(key, eval)| eval.value.as_bool().map(|v| (key, v)))
        .collect()
}

async fn fetch_evaluations(http: &reqwest::Client, url: &Url) -> Result<HashMap<String, bool>> {
    let response = http
        .get(url.clone())
        .send()
        .await?
        .error_for_status()
        .map_err(|e| Error::backend_init(e.to_string()))?;
    let map: HashMap<String, Evaluation> = response.json().await?;
    Ok(boolean_evaluations(map))
}

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

async fn follow_stream(
    http: reqwest::Client,
    stream_url: Url,
    eval_url: Url,
    shared: Arc<Mutex<Shared>>,
) {
    let mut backoff = MIN_BACKOFF;
    loop {
        match stream_once(&http, &stream_url, &eval_url, &shared).await {
            Ok(()) => {
                debug!("Flag stream closed by server");
                backoff = MIN_BACKOFF;
            }
            Err(e) => {
                warn!(error = %e, retry_in_ms = backoff.as_millis(), "Flag stream failed");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn stream_once(
    http: &reqwest::Client,
    stream_url: &Url,
    eval_url: &Url,
    shared: &Mutex<Shared>,
) -> Result<()> {
    let mut response = http
        .get(stream_url.clone())
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;
    debug!("Flag stream connected");

    let mut parser = SseParser::default();
    while let Some(chunk) = response.chunk().await? {
        for event in parser.feed(&chunk) {
            if event.event == "ping" {
                let values = fetch_evaluations(http, eval_url).await?;
                lock(shared).replace_all(values);
                continue;
            }
            apply_event(&mut lock(shared), &event)?;
        }
    }
    Ok(())
}

/// Apply one stream event to the shared state.
fn apply_event(shared: &mut Shared, event: &SseEvent) -> Result<()> {
    match event.event.as_str() {
        "put" => {
            let map: HashMap<String, Evaluation> = serde_json::from_str(&event.data)?;
            shared.replace_all(boolean_evaluations(map));
        }
        "patch" => {
            let patch: Patch = serde_json::from_str(&event.data)?;
            if let Some(value) = patch.value.as_bool() {
                shared.set(&patch.key, value);
            }
        }
        "delete" => {
            let delete: Delete = serde_json::from_str(&event.data)?;
            shared.set(&delete.key, false);
        }
        other => trace!(event = other, "Ignoring stream event"),
    }
    Ok(())
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` parser.
#[derive(Debug, Default)]
struct SseParser {
    buffer: Vec<u8>,
    event: String,
    data: Vec<String>,
}

impl SseParser {
    /// Feed raw bytes, returning every event completed by them.
    fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.line(line) {
                events.push(event);
            }
        }
        events
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.data.is_empty() && self.event.is_empty() {
                return None;
            }
            let event = std::mem::take(&mut self.event);
            return Some(SseEvent {
                event: if event.is_empty() {
                    "message".to_string()
                } else {
                    event
                },
                data: std::mem::take(&mut self.data).join("\n"),
            });
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = value.to_string(),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}

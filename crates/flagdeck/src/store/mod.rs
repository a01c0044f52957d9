//! The flag store: authoritative current value of every known flag.
//!
//! Values start false. [`FlagStore::initialize`] tries the remote backend
//! first and falls back to polling a [`FlagSource`] when no client-side id
//! is configured, the backend fails, or it is not ready in time. Either way
//! the store ends up usable; a local toggle always works.
//!
//! Background work never touches the store directly. Remote listeners and
//! the polling task send [`StoreEvent`]s over a channel, and the owner feeds
//! them back through [`FlagStore::apply`] on its own task.

mod remote;
mod source;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use remote::{
    ChangeListener, RemoteChange, RemoteClient, RemoteConnector, StreamingClient,
    StreamingConnector,
};
pub use source::{
    spawn_polling, FileFlagSource, FlagSource, FlagValues, HttpFlagSource, PollingHandle,
    StaticFlagSource,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::flags::{FlagSet, UserContext};

/// A committed change of one flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagChange {
    /// Flag key.
    pub key: String,
    /// New value.
    pub value: bool,
    /// Value before the change.
    pub previous: bool,
}

/// Input produced by background backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The remote backend reported a change.
    Remote(RemoteChange),
    /// A poll returned a set of values.
    Polled(FlagValues),
}

/// Where flag values currently come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Not initialized; only local toggles change values.
    Local,
    /// Pushed by the remote backend.
    Streaming,
    /// Polled from a fallback source.
    Polling,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Streaming => write!(f, "streaming"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

/// Outcome of [`FlagStore::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ready {
    /// Backend in effect.
    pub mode: BackendMode,
    /// Why the remote backend was not used, when it was not.
    pub fallback_reason: Option<String>,
}

/// Backends the store may initialize with.
pub struct Backends {
    /// Client-side id; empty selects polling directly.
    pub client_side_id: String,
    /// Upper bound on waiting for the remote backend.
    pub init_timeout: Duration,
    /// Period of the fallback poll.
    pub poll_interval: Duration,
    /// Builds the remote client.
    pub connector: Box<dyn RemoteConnector>,
    /// Fallback source.
    pub source: Arc<dyn FlagSource>,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("client_side_id", &self.client_side_id)
            .field("init_timeout", &self.init_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("source", &self.source.name())
            .finish_non_exhaustive()
    }
}

impl Backends {
    /// Build the configured backends.
    ///
    /// The polling source is the URL when set, else the file, else a static
    /// source that never changes anything.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source: Arc<dyn FlagSource> = match (&config.polling.url, &config.polling.file) {
            (Some(url), _) => Arc::new(HttpFlagSource::new(
                url.clone(),
                config.poll_request_timeout(),
            )?),
            (None, Some(path)) => Arc::new(FileFlagSource::new(path.clone())),
            (None, None) => Arc::new(StaticFlagSource::default()),
        };
        Ok(Self {
            client_side_id: config.backend.client_side_id.clone(),
            init_timeout: config.init_timeout(),
            poll_interval: config.poll_interval(),
            connector: Box::new(StreamingConnector::new(
                config.backend.base_uri.clone(),
                config.backend.stream_uri.clone(),
            )?),
            source,
        })
    }
}

type Subscriber = Box<dyn FnMut(&FlagChange) + Send>;

/// Current value of every known flag.
pub struct FlagStore {
    flags: FlagSet,
    values: Vec<bool>,
    subscribers: Vec<Subscriber>,
    mode: BackendMode,
    remote: Option<Box<dyn RemoteClient>>,
    polling: Option<PollingHandle>,
}

impl fmt::Debug for FlagStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagStore")
            .field("values", &self.snapshot())
            .field("mode", &self.mode)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl FlagStore {
    /// Create a store with every flag false.
    #[must_use]
    pub fn new(flags: FlagSet) -> Self {
        let values = vec![false; flags.len()];
        Self {
            flags,
            values,
            subscribers: Vec::new(),
            mode: BackendMode::Local,
            remote: None,
            polling: None,
        }
    }

    /// The known flags.
    #[must_use]
    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Backend currently feeding the store.
    #[must_use]
    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    /// Register an observer called on every committed change.
    pub fn subscribe(&mut self, observer: impl FnMut(&FlagChange) + Send + 'static) {
        self.subscribers.push(Box::new(observer));
    }

    /// Current value of `key`; unknown keys are false.
    #[must_use]
    pub fn get_value(&self, key: &str) -> bool {
        self.position(key).is_some_and(|idx| self.values[idx])
    }

    /// All values keyed by flag.
    #[must_use]
    pub fn snapshot(&self) -> FlagValues {
        self.flags
            .keys()
            .zip(&self.values)
            .map(|(key, &value)| (key.to_string(), value))
            .collect()
    }

    /// Flip a flag locally. Returns the new value, or `None` for unknown keys.
    pub fn toggle(&mut self, key: &str) -> Option<bool> {
        let idx = self.position(key)?;
        let value = !self.values[idx];
        self.commit(idx, value);
        Some(value)
    }

    /// Set every flag to false, notifying for each one that was true.
    pub fn reset(&mut self) -> Vec<FlagChange> {
        (0..self.values.len())
            .filter_map(|idx| self.commit(idx, false))
            .collect()
    }

    /// Apply a background event. Unknown keys are ignored.
    pub fn apply(&mut self, event: StoreEvent) -> Vec<FlagChange> {
        match event {
            StoreEvent::Remote(change) => self
                .position(&change.key)
                .and_then(|idx| self.commit(idx, change.current))
                .into_iter()
                .collect(),
            StoreEvent::Polled(values) => self.merge(&values),
        }
    }

    /// Merge polled values: only known keys present in `values` change.
    pub fn merge(&mut self, values: &FlagValues) -> Vec<FlagChange> {
        let mut changes = Vec::new();
        for (key, &value) in values {
            match self.position(key) {
                Some(idx) => changes.extend(self.commit(idx, value)),
                None => debug!(key = %key, "Ignoring unknown flag from source"),
            }
        }
        changes
    }

    /// Connect to the remote backend, falling back to polling.
    ///
    /// Never fails: every failure path ends in polling mode, with the reason
    /// recorded in the returned [`Ready`]. Initial remote values are loaded
    /// without notifying subscribers.
    pub async fn initialize(
        &mut self,
        user: &UserContext,
        backends: Backends,
        events: mpsc::UnboundedSender<StoreEvent>,
    ) -> Ready {
        match self.connect_remote(user, &backends, &events).await {
            Ok(()) => {
                self.mode = BackendMode::Streaming;
                info!(user = %user.key, "Flag backend initialized");
                Ready {
                    mode: self.mode,
                    fallback_reason: None,
                }
            }
            Err(e) => {
                if e.is_backend_failure() {
                    warn!(error = %e, "Flag backend unavailable, falling back to polling");
                } else {
                    warn!(error = %e, "Flag backend returned bad data, falling back to polling");
                }
                self.start_polling(backends.source, backends.poll_interval, events);
                Ready {
                    mode: self.mode,
                    fallback_reason: Some(e.to_string()),
                }
            }
        }
    }

    async fn connect_remote(
        &mut self,
        user: &UserContext,
        backends: &Backends,
        events: &mpsc::UnboundedSender<StoreEvent>,
    ) -> Result<()> {
        if backends.client_side_id.trim().is_empty() {
            return Err(Error::backend_init("no client-side id configured"));
        }
        let mut client = backends.connector.connect(&backends.client_side_id, user)?;
        tokio::time::timeout(backends.init_timeout, client.wait_for_initialization())
            .await
            .map_err(|_| Error::timeout("flag backend initialization"))??;

        for (idx, key) in self.flags.keys().enumerate() {
            self.values[idx] = client.variation(key, false);
            let tx = events.clone();
            client.on_change(
                key,
                Box::new(move |change| {
                    let _ = tx.send(StoreEvent::Remote(change));
                }),
            );
        }
        self.remote = Some(client);
        Ok(())
    }

    /// Start the fallback poll and switch to polling mode.
    pub fn start_polling(
        &mut self,
        source: Arc<dyn FlagSource>,
        period: Duration,
        events: mpsc::UnboundedSender<StoreEvent>,
    ) {
        if let Some(previous) = self.polling.take() {
            previous.stop();
        }
        self.polling = Some(spawn_polling(source, period, events));
        self.mode = BackendMode::Polling;
    }

    /// Stop background work: the poll and the remote stream.
    pub fn shutdown(&mut self) {
        if let Some(polling) = self.polling.take() {
            polling.stop();
        }
        if self.remote.take().is_some() {
            debug!("Closed flag backend client");
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.flags.keys().position(|k| k == key)
    }

    fn commit(&mut self, idx: usize, value: bool) -> Option<FlagChange> {
        let previous = self.values[idx];
        if previous == value {
            return None;
        }
        self.values[idx] = value;
        let key = self.flags.keys().nth(idx)?.to_string();
        let change = FlagChange {
            key,
            value,
            previous,
        };
        debug!(key = %change.key, value, "Flag changed");
        for subscriber in &mut self.subscribers {
            subscriber(&change);
        }
        Some(change)
    }
}

impl Drop for FlagStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::flags::{default_flags, DEFAULT_SECTION_SUFFIX};

    fn store() -> FlagStore {
        FlagStore::new(FlagSet::new(default_flags(), DEFAULT_SECTION_SUFFIX))
    }

    fn recorded(store: &mut FlagStore) -> Arc<Mutex<Vec<FlagChange>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |change| sink.lock().unwrap().push(change.clone()));
        seen
    }

    #[test]
    fn test_new_store_all_false() {
        let store = store();
        assert!(store.snapshot().values().all(|&v| !v));
        assert!(!store.get_value("unknown-flag"));
        assert_eq!(store.mode(), BackendMode::Local);
    }

    #[test]
    fn test_toggle_notifies() {
        let mut store = store();
        let seen = recorded(&mut store);

        assert_eq!(store.toggle("experimentation-section"), Some(true));
        assert!(store.get_value("experimentation-section"));
        assert_eq!(store.toggle("experimentation-section"), Some(false));
        assert_eq!(store.toggle("nope"), None);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].value && !seen[0].previous);
        assert!(!seen[1].value && seen[1].previous);
    }

    #[test]
    fn test_reset_only_reports_true_flags() {
        let mut store = store();
        store.toggle("ai-configs-section");
        let seen = recorded(&mut store);

        let changes = store.reset();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "ai-configs-section");
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(store.snapshot().values().all(|&v| !v));
    }

    #[test]
    fn test_merge_touches_only_present_known_keys() {
        let mut store = store();
        store.toggle("observability-section");

        let polled = FlagValues::from([
            ("guarded-releases-section".to_string(), true),
            ("made-up-section".to_string(), true),
        ]);
        let changes = store.merge(&polled);

        assert_eq!(changes.len(), 1);
        assert!(store.get_value("guarded-releases-section"));
        // Absent from the poll: kept.
        assert!(store.get_value("observability-section"));
        assert!(!store.snapshot().contains_key("made-up-section"));
    }

    #[test]
    fn test_merge_unchanged_values_do_not_notify() {
        let mut store = store();
        let seen = recorded(&mut store);
        let polled = FlagValues::from([("experimentation-section".to_string(), false)]);
        assert!(store.merge(&polled).is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_apply_remote_change() {
        let mut store = store();
        let changes = store.apply(StoreEvent::Remote(RemoteChange {
            key: "ai-configs-section".to_string(),
            current: true,
            previous: false,
        }));
        assert_eq!(changes.len(), 1);
        assert!(store.get_value("ai-configs-section"));

        let ignored = store.apply(StoreEvent::Remote(RemoteChange {
            key: "other".to_string(),
            current: true,
            previous: false,
        }));
        assert!(ignored.is_empty());
    }

    #[test]
    fn test_snapshot_preserves_keys() {
        let store = store();
        let keys: Vec<String> = store.snapshot().into_keys().collect();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&"guarded-releases-section".to_string()));
    }

    enum Behavior {
        Ready(FlagValues),
        Fail,
        Hang,
    }

    struct FakeConnector(Mutex<Option<Behavior>>);

    struct FakeClient {
        behavior: Behavior,
        listeners: Vec<(String, ChangeListener)>,
    }

    #[async_trait::async_trait]
    impl RemoteClient for FakeClient {
        async fn wait_for_initialization(&mut self) -> Result<()> {
            match self.behavior {
                Behavior::Ready(_) => Ok(()),
                Behavior::Fail => Err(Error::backend_init("rejected")),
                Behavior::Hang => std::future::pending().await,
            }
        }

        fn variation(&self, key: &str, default: bool) -> bool {
            match &self.behavior {
                Behavior::Ready(values) => values.get(key).copied().unwrap_or(default),
                _ => default,
            }
        }

        fn on_change(&mut self, key: &str, listener: ChangeListener) {
            if key == "experimentation-section" {
                listener(RemoteChange {
                    key: key.to_string(),
                    current: true,
                    previous: false,
                });
            }
            self.listeners.push((key.to_string(), listener));
        }
    }

    impl RemoteConnector for FakeConnector {
        fn connect(&self, _id: &str, _user: &UserContext) -> Result<Box<dyn RemoteClient>> {
            let behavior = self
                .0
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| Error::backend_init("already connected"))?;
            Ok(Box::new(FakeClient {
                behavior,
                listeners: Vec::new(),
            }))
        }
    }

    fn backends(id: &str, behavior: Behavior) -> Backends {
        Backends {
            client_side_id: id.to_string(),
            init_timeout: Duration::from_millis(4_900),
            poll_interval: Duration::from_secs(5),
            connector: Box::new(FakeConnector(Mutex::new(Some(behavior)))),
            source: Arc::new(StaticFlagSource::new(FlagValues::from([(
                "observability-section".to_string(),
                true,
            )]))),
        }
    }

    #[tokio::test]
    async fn test_initialize_remote_loads_values_silently() {
        let mut store = store();
        let seen = recorded(&mut store);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let values = FlagValues::from([("ai-configs-section".to_string(), true)]);

        let ready = store
            .initialize(
                &UserContext::presenter(),
                backends("client-id", Behavior::Ready(values)),
                tx,
            )
            .await;

        assert_eq!(ready.mode, BackendMode::Streaming);
        assert!(ready.fallback_reason.is_none());
        assert!(store.get_value("ai-configs-section"));
        assert!(seen.lock().unwrap().is_empty());

        // Listener registration forwards remote changes as events.
        let event = rx.recv().await.unwrap();
        let changes = store.apply(event);
        assert_eq!(changes[0].key, "experimentation-section");
    }

    #[tokio::test]
    async fn test_initialize_without_id_polls() {
        let mut store = store();
        let (tx, _rx) = mpsc::unbounded_channel();
        let ready = store
            .initialize(&UserContext::presenter(), backends("", Behavior::Fail), tx)
            .await;
        assert_eq!(ready.mode, BackendMode::Polling);
        assert!(ready.fallback_reason.is_some());
        store.shutdown();
    }

    #[tokio::test]
    async fn test_initialize_failure_polls() {
        crate::logging::init_test_logging();
        let mut store = store();
        let (tx, _rx) = mpsc::unbounded_channel();
        let ready = store
            .initialize(&UserContext::presenter(), backends("id", Behavior::Fail), tx)
            .await;
        assert_eq!(ready.mode, BackendMode::Polling);
        assert!(ready.fallback_reason.unwrap().contains("rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_timeout_polls_and_merges() {
        let mut store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ready = store
            .initialize(&UserContext::presenter(), backends("id", Behavior::Hang), tx)
            .await;
        assert_eq!(ready.mode, BackendMode::Polling);
        assert!(ready.fallback_reason.unwrap().contains("timed out"));

        let event = rx.recv().await.unwrap();
        store.apply(event);
        assert!(store.get_value("observability-section"));
        store.shutdown();
    }

    #[test]
    fn test_backend_mode_display() {
        assert_eq!(BackendMode::Streaming.to_string(), "streaming");
        assert_eq!(
            serde_json::to_string(&BackendMode::Polling).unwrap(),
            "\"polling\""
        );
    }

    #[test]
    fn test_backends_from_default_config() {
        let backends = Backends::from_config(&Config::default()).unwrap();
        assert!(backends.client_side_id.is_empty());
        assert_eq!(backends.source.name(), "flags.json");
    }
}

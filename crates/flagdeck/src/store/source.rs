//! Fallback flag sources and the polling task that drives them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::StoreEvent;
use crate::error::{Error, Result};

/// Flag values keyed by flag key, as delivered by a source.
pub type FlagValues = BTreeMap<String, bool>;

/// A best-effort source of all flag values, polled periodically.
#[async_trait::async_trait]
pub trait FlagSource: Send + Sync {
    /// Name of the source for logging.
    fn name(&self) -> String;

    /// Fetch the current value of every flag the source knows.
    ///
    /// Keys the source does not mention keep their current value.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is unreachable or malformed.
    async fn fetch_all(&self) -> Result<FlagValues>;
}

/// Keep only the boolean entries of a JSON object.
fn boolean_entries(map: BTreeMap<String, serde_json::Value>) -> FlagValues {
    map.into_iter()
        .filter_map(|(key, value)| value.as_bool().map(|v| (key, v)))
        .collect()
}

/// Polls a URL returning a JSON object of flag values.
#[derive(Debug, Clone)]
pub struct HttpFlagSource {
    url: String,
    client: reqwest::Client,
}

impl HttpFlagSource {
    /// Create a source for `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl FlagSource for HttpFlagSource {
    fn name(&self) -> String {
        self.url.clone()
    }

    async fn fetch_all(&self) -> Result<FlagValues> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::backend_fetch(&self.url, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::backend_fetch(&self.url, format!("HTTP {status}")));
        }
        let map: BTreeMap<String, serde_json::Value> = response
            .json()
            .await
            .map_err(|e| Error::backend_fetch(&self.url, e.to_string()))?;
        Ok(boolean_entries(map))
    }
}

/// Re-reads a JSON file of flag values on every poll.
#[derive(Debug, Clone)]
pub struct FileFlagSource {
    path: PathBuf,
}

impl FileFlagSource {
    /// Create a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl FlagSource for FileFlagSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch_all(&self) -> Result<FlagValues> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::backend_fetch(self.name(), e.to_string()))?;
        let map: BTreeMap<String, serde_json::Value> = serde_json::from_str(&text)
            .map_err(|e| Error::backend_fetch(self.name(), e.to_string()))?;
        Ok(boolean_entries(map))
    }
}

/// A fixed set of values; useful when no source is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticFlagSource {
    values: FlagValues,
}

impl StaticFlagSource {
    /// Create a source always answering `values`.
    #[must_use]
    pub fn new(values: FlagValues) -> Self {
        Self { values }
    }
}

#[async_trait::async_trait]
impl FlagSource for StaticFlagSource {
    fn name(&self) -> String {
        "static".to_string()
    }

    async fn fetch_all(&self) -> Result<FlagValues> {
        Ok(self.values.clone())
    }
}

/// A handle to stop a running polling task.
///
/// Clones share the same signal.
#[derive(Debug, Clone, Default)]
pub struct PollingHandle {
    stop_signal: Arc<AtomicBool>,
}

impl PollingHandle {
    /// Create a new handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the polling task to stop scheduling ticks.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// Spawn a task fetching `source` every `period` and forwarding results.
///
/// The first fetch happens one period after spawning. Failed fetches are
/// logged and nothing is forwarded, so the store keeps its values.
pub fn spawn_polling(
    source: Arc<dyn FlagSource>,
    period: Duration,
    events: mpsc::UnboundedSender<StoreEvent>,
) -> PollingHandle {
    let handle = PollingHandle::new();
    let stop = handle.clone();

    tokio::spawn(async move {
        debug!(
            source = %source.name(),
            interval_ms = period.as_millis(),
            "Starting flag polling"
        );
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if stop.should_stop() {
                break;
            }
            match source.fetch_all().await {
                Ok(values) => {
                    trace!(count = values.len(), "Polled flag values");
                    if events.send(StoreEvent::Polled(values)).is_err() {
                        debug!("Store event channel closed, stopping polling");
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Flag poll failed, keeping last known values");
                }
            }
        }
        debug!("Flag polling stopped");
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_boolean_entries_drop_non_booleans() {
        let map: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(r#"{"a": true, "b": "yes", "c": false, "d": 1}"#).unwrap();
        let values = boolean_entries(map);
        assert_eq!(values.len(), 2);
        assert_eq!(values["a"], true);
        assert_eq!(values["c"], false);
    }

    #[tokio::test]
    async fn test_file_source_reads_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ai-configs-section": true}}"#).unwrap();

        let source = FileFlagSource::new(file.path());
        let values = source.fetch_all().await.unwrap();
        assert_eq!(values.get("ai-configs-section"), Some(&true));
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let source = FileFlagSource::new("/nonexistent/flags.json");
        let err = source.fetch_all().await.unwrap_err();
        assert!(matches!(err, Error::BackendFetch { .. }));
    }

    #[tokio::test]
    async fn test_file_source_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let source = FileFlagSource::new(file.path());
        assert!(source.fetch_all().await.is_err());
    }

    #[tokio::test]
    async fn test_http_source_unreachable() {
        let source = HttpFlagSource::new("http://127.0.0.1:9/api/flags", Duration::from_millis(200))
            .unwrap();
        let err = source.fetch_all().await.unwrap_err();
        assert!(matches!(err, Error::BackendFetch { .. }));
    }

    #[tokio::test]
    async fn test_static_source() {
        let values = FlagValues::from([("x".to_string(), true)]);
        let source = StaticFlagSource::new(values.clone());
        assert_eq!(source.fetch_all().await.unwrap(), values);
    }

    #[test]
    fn test_polling_handle_shared_signal() {
        let handle = PollingHandle::new();
        let clone = handle.clone();
        assert!(!clone.should_stop());
        handle.stop();
        assert!(clone.should_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_forwards_after_one_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = Arc::new(StaticFlagSource::new(FlagValues::from([(
            "a".to_string(),
            true,
        )])));
        let handle = spawn_polling(source, Duration::from_secs(5), tx);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        match rx.recv().await {
            Some(StoreEvent::Polled(values)) => assert_eq!(values["a"], true),
            other => panic!("unexpected event: {other:?}"),
        }
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_failure_forwards_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = Arc::new(FileFlagSource::new("/nonexistent/flags.json"));
        let handle = spawn_polling(source, Duration::from_secs(5), tx);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(rx.try_recv().is_err());
        handle.stop();
    }
}

//! Debounced, cancellable remote search.
//!
//! Each control owns one [`RemoteFetcher`]. Queueing a search aborts the
//! previous in-flight task before spawning the next, so at most one request
//! per control is ever outstanding (last-write-wins on user intent). The
//! debounce sleep runs at the head of the spawned task; aborting the task
//! during the sleep cancels the request before it reaches the network, and
//! an aborted task emits nothing, which is what makes cancellation silent.
//!
//! Results are surfaced through the event channel: `Loaded` on success,
//! `LoadFailed` on genuine failure. The consumer keeps its prior options on
//! failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use core_events::{ControlEvent, ControlPayload, EventSink};
use core_options::{FieldMap, normalize_all, unwrap_envelope};

/// Delay between the last keystroke and the network call.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

// Telemetry counters.
pub static FETCH_SPAWNED: AtomicU64 = AtomicU64::new(0);
pub static FETCH_ABORTED: AtomicU64 = AtomicU64::new(0);
pub static FETCH_COMPLETED: AtomicU64 = AtomicU64::new(0);
pub static FETCH_FAILED: AtomicU64 = AtomicU64::new(0);

pub type BoxedSearch<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>>;

/// Issues one search against an endpoint and returns the decoded JSON body.
///
/// Object-safe so controls can share a backend without becoming generic;
/// tests substitute a recording mock.
pub trait SearchBackend: Send + Sync + 'static {
    fn search<'a>(&'a self, url: &'a str, term: &'a str) -> BoxedSearch<'a>;
}

/// Production backend over a shared [`reqwest::Client`].
///
/// Appends the search string as both `q` and `search` so either endpoint
/// naming convention matches.
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchBackend for HttpBackend {
    fn search<'a>(&'a self, url: &'a str, term: &'a str) -> BoxedSearch<'a> {
        Box::pin(async move {
            let body = self
                .client
                .get(url)
                .query(&[("q", term), ("search", term)])
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await?;
            Ok(body)
        })
    }
}

/// Per-control fetch coordinator.
pub struct RemoteFetcher {
    control: String,
    backend: Arc<dyn SearchBackend>,
    sink: EventSink,
    fields: FieldMap,
    data_url: Option<String>,
    min_search_length: usize,
    debounce: Duration,
    in_flight: Option<JoinHandle<()>>,
}

impl RemoteFetcher {
    pub fn new(control: impl Into<String>, backend: Arc<dyn SearchBackend>, sink: EventSink) -> Self {
        Self {
            control: control.into(),
            backend,
            sink,
            fields: FieldMap::default(),
            data_url: None,
            min_search_length: 0,
            debounce: DEFAULT_DEBOUNCE,
            in_flight: None,
        }
    }

    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_min_search_length(mut self, min: usize) -> Self {
        self.min_search_length = min;
        self
    }

    pub fn set_data_url(&mut self, url: Option<String>) {
        self.data_url = url;
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    pub fn data_url(&self) -> Option<&str> {
        self.data_url.as_deref()
    }

    pub fn has_remote_source(&self) -> bool {
        self.data_url.is_some()
    }

    /// Debounced search. Must be called from within a tokio runtime.
    pub fn queue_search(&mut self, term: &str) {
        self.spawn(term, self.debounce);
    }

    /// Immediate search, skipping the debounce. Used by `refresh` and by
    /// data-url changes.
    pub fn force_fetch(&mut self, term: &str) {
        self.spawn(term, Duration::ZERO);
    }

    /// Cancel any outstanding request. Called on `destroy()`.
    pub fn abort(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if !handle.is_finished() {
                FETCH_ABORTED.fetch_add(1, Ordering::Relaxed);
                handle.abort();
            }
        }
    }

    /// Whether a spawned request has not yet completed or been aborted.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn spawn(&mut self, term: &str, delay: Duration) {
        let Some(url) = self.data_url.clone() else {
            return;
        };
        if term.chars().count() < self.min_search_length {
            debug!(
                target: "fetch",
                control = self.control.as_str(),
                term_len = term.chars().count(),
                min = self.min_search_length,
                "search below minimum length; skipped"
            );
            return;
        }
        self.abort();
        FETCH_SPAWNED.fetch_add(1, Ordering::Relaxed);

        let control = self.control.clone();
        let backend = Arc::clone(&self.backend);
        let sink = self.sink.clone();
        let fields = self.fields.clone();
        let term = term.to_string();
        self.in_flight = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match backend.search(&url, &term).await {
                Ok(body) => {
                    let options = normalize_all(&unwrap_envelope(&body), &fields);
                    FETCH_COMPLETED.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        target: "fetch",
                        control = control.as_str(),
                        count = options.len(),
                        "search completed"
                    );
                    sink.emit(ControlEvent::new(
                        control,
                        ControlPayload::Loaded {
                            options,
                            search_term: term,
                        },
                    ));
                }
                Err(err) => {
                    FETCH_FAILED.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        target: "fetch",
                        control = control.as_str(),
                        error = %err,
                        "search failed"
                    );
                    sink.emit(ControlEvent::new(
                        control,
                        ControlPayload::LoadFailed {
                            message: err.to_string(),
                        },
                    ));
                }
            }
        }));
    }
}

impl Drop for RemoteFetcher {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::Event;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        response: Value,
        fail: bool,
    }

    impl RecordingBackend {
        fn ok(response: Value) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                response,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                response: Value::Null,
                fail: true,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SearchBackend for RecordingBackend {
        fn search<'a>(&'a self, _url: &'a str, term: &'a str) -> BoxedSearch<'a> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(term.to_string());
                if self.fail {
                    anyhow::bail!("endpoint unavailable");
                }
                Ok(self.response.clone())
            })
        }
    }

    fn fetcher(backend: Arc<dyn SearchBackend>, sink: EventSink) -> RemoteFetcher {
        let mut f = RemoteFetcher::new("crew", backend, sink)
            .with_debounce(Duration::from_millis(20));
        f.set_data_url(Some("http://example.test/options".to_string()));
        f
    }

    #[tokio::test]
    async fn second_search_within_debounce_window_wins() {
        let backend = RecordingBackend::ok(json!([{"id": 1, "label": "A"}]));
        let (tx, mut rx) = mpsc::channel::<Event>(8);
        let mut f = fetcher(backend.clone(), EventSink::new(tx));

        f.queue_search("a");
        f.queue_search("ab");
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(backend.calls(), vec!["ab".to_string()]);
        // Exactly one Loaded event, none for the aborted first search.
        let mut loaded = 0;
        let mut failed = 0;
        while let Ok(ev) = rx.try_recv() {
            if let Event::Control(ev) = ev {
                match ev.payload {
                    ControlPayload::Loaded { search_term, .. } => {
                        assert_eq!(search_term, "ab");
                        loaded += 1;
                    }
                    ControlPayload::LoadFailed { .. } => failed += 1,
                    _ => {}
                }
            }
        }
        assert_eq!(loaded, 1);
        assert_eq!(failed, 0, "an aborted search must stay silent");
    }

    #[tokio::test]
    async fn success_emits_normalized_options() {
        let backend = RecordingBackend::ok(json!({"tasks": [{"id": 7, "label": "Roof"}]}));
        let (tx, mut rx) = mpsc::channel::<Event>(8);
        let mut f = fetcher(backend, EventSink::new(tx));

        f.force_fetch("ro");
        tokio::time::sleep(Duration::from_millis(40)).await;

        match rx.try_recv() {
            Ok(Event::Control(ev)) => match ev.payload {
                ControlPayload::Loaded {
                    options,
                    search_term,
                } => {
                    assert_eq!(search_term, "ro");
                    assert_eq!(options.len(), 1);
                    assert_eq!(options[0].id.as_str(), "7");
                    assert_eq!(options[0].label, "Roof");
                }
                other => panic!("expected Loaded, got {:?}", other),
            },
            other => panic!("expected control event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failure_emits_load_failed() {
        let backend = RecordingBackend::failing();
        let (tx, mut rx) = mpsc::channel::<Event>(8);
        let mut f = fetcher(backend, EventSink::new(tx));

        f.force_fetch("x");
        tokio::time::sleep(Duration::from_millis(40)).await;

        match rx.try_recv() {
            Ok(Event::Control(ev)) => {
                assert_eq!(ev.name(), "error");
            }
            other => panic!("expected LoadFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn short_terms_are_skipped_without_aborting_prior_fetch() {
        let backend = RecordingBackend::ok(json!([]));
        let (tx, _rx) = mpsc::channel::<Event>(8);
        let mut f = fetcher(backend.clone(), EventSink::new(tx)).with_min_search_length(2);

        f.queue_search("a");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(backend.calls().is_empty());

        f.queue_search("ab");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(backend.calls(), vec!["ab".to_string()]);
    }

    #[tokio::test]
    async fn missing_data_url_is_a_no_op() {
        let backend = RecordingBackend::ok(json!([]));
        let (tx, _rx) = mpsc::channel::<Event>(8);
        let mut f = RemoteFetcher::new("crew", backend.clone(), EventSink::new(tx));
        f.queue_search("anything");
        assert!(!f.is_in_flight());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(backend.calls().is_empty());
    }
}

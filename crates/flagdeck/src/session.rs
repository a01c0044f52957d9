//! The presentation session: one task owning all mutable state.
//!
//! Store events, HTTP requests and operator commands are handled here one at
//! a time, so the flag store, the slide tree and the notification board need
//! no locking. Flag changes reach the reconciler through a subscriber queue
//! that is drained after every operation.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tiny_http::{Method, Request};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::deck::{render_slides, Document};
use crate::engine::{DeckView, RenderEngine};
use crate::error::Result;
use crate::flags::UserContext;
use crate::notify::{Notification, NotificationBoard};
use crate::reconciler::{OutlineEntry, SectionInfo, SlideReconciler};
use crate::server::{self, resolve_static, route, Reply, Route};
use crate::store::{Backends, BackendMode, FlagChange, FlagStore, FlagValues, Ready, StoreEvent};

/// Everything a browser needs to render the current deck.
#[derive(Debug, Clone, Serialize)]
pub struct DeckSnapshot {
    /// Resync counter of the engine.
    pub revision: u64,
    /// Fingerprint of the visible slide structure.
    pub fingerprint: String,
    /// Current horizontal slide.
    pub index: usize,
    /// Rendered `<section>` markup.
    pub slides: String,
    /// Current flag values.
    pub flags: FlagValues,
    /// Live notifications.
    pub notifications: Vec<Notification>,
    /// Backend feeding the flags.
    pub mode: BackendMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientConfig<'a> {
    client_side_id: &'a str,
    environment: &'a str,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    timestamp: String,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct Toggled {
    key: String,
    value: bool,
}

#[derive(Debug, Serialize)]
struct OperatorReport {
    sections: Vec<SectionInfo>,
    outline: Vec<OutlineEntry>,
}

/// A running presentation.
pub struct Presentation {
    config: Config,
    store: FlagStore,
    reconciler: SlideReconciler<DeckView, NotificationBoard>,
    changes: mpsc::UnboundedReceiver<FlagChange>,
}

impl std::fmt::Debug for Presentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Presentation")
            .field("store", &self.store)
            .field("engine", self.reconciler.engine())
            .finish_non_exhaustive()
    }
}

impl Presentation {
    /// Build a session over `doc` and capture its tagged slides.
    ///
    /// Capturing happens here, before the store can deliver any change.
    #[must_use]
    pub fn new(config: Config, doc: Document) -> Self {
        let flags = config.flag_set();
        let (tx, changes) = mpsc::unbounded_channel();
        let mut store = FlagStore::new(flags.clone());
        store.subscribe(move |change| {
            let _ = tx.send(change.clone());
        });

        let mut reconciler = SlideReconciler::new(
            doc,
            DeckView::new(),
            NotificationBoard::new(config.dismiss_after()),
            flags,
            config.deck.anchor_heading.clone(),
        );
        reconciler.capture_all();

        Self {
            config,
            store,
            reconciler,
            changes,
        }
    }

    /// The flag store.
    #[must_use]
    pub fn store(&self) -> &FlagStore {
        &self.store
    }

    /// The reconciler.
    #[must_use]
    pub fn reconciler(&self) -> &SlideReconciler<DeckView, NotificationBoard> {
        &self.reconciler
    }

    /// Initialize the store and render the initial flag state.
    pub async fn start(
        &mut self,
        user: &UserContext,
        backends: Backends,
        events: mpsc::UnboundedSender<StoreEvent>,
    ) -> Ready {
        let ready = self.store.initialize(user, backends, events).await;
        self.discard_changes();
        self.reconciler.sync_all(&self.store);
        ready
    }

    /// Feed one background event through the store.
    pub fn handle_store_event(&mut self, event: StoreEvent) {
        self.store.apply(event);
        self.dispatch_changes();
    }

    /// Flip a flag locally.
    pub fn toggle(&mut self, key: &str) -> Option<bool> {
        let value = self.store.toggle(key);
        self.dispatch_changes();
        value
    }

    /// Flip the flag bound to a hotkey code.
    pub fn press_key(&mut self, code: u32) -> Option<(String, bool)> {
        let key = self.store.flags().by_hotkey(code)?.key.clone();
        let value = self.toggle(&key)?;
        Some((key, value))
    }

    /// Flip every flag, each with its own notification.
    pub fn toggle_all(&mut self) {
        let keys: Vec<String> = self.store.flags().keys().map(str::to_string).collect();
        for key in keys {
            self.toggle(&key);
        }
    }

    /// Clear every flag and reconcile without notifications.
    pub fn reset_flags(&mut self) {
        self.store.reset();
        self.discard_changes();
        self.reconciler.sync_all(&self.store);
    }

    /// Detach every tagged slide, leaving flags as they are.
    pub fn cleanup(&mut self) -> usize {
        self.reconciler.remove_all_tagged()
    }

    /// Back to a fresh start: no sections, no flags, first slide.
    pub fn reset(&mut self) {
        self.reconciler.reset_all(&mut self.store);
        self.discard_changes();
    }

    /// Current state for browsers.
    pub fn snapshot(&mut self) -> DeckSnapshot {
        let engine = self.reconciler.engine();
        let revision = engine.revision();
        let fingerprint = engine.fingerprint().to_string();
        let index = engine.current_index();
        let slides = render_slides(self.reconciler.document());
        DeckSnapshot {
            revision,
            fingerprint,
            index,
            slides,
            flags: self.store.snapshot(),
            notifications: self.reconciler.notifier_mut().active(),
            mode: self.store.mode(),
        }
    }

    /// Answer one HTTP request.
    pub fn handle(&mut self, method: &Method, url: &str) -> Reply {
        match route(method, url) {
            Route::Page => {
                let engine = self.reconciler.engine();
                Reply::html(server::render_page(
                    "flagdeck",
                    self.store.flags(),
                    &render_slides(self.reconciler.document()),
                    engine.fingerprint(),
                    engine.current_index(),
                ))
            }
            Route::Health => Reply::ok(&Health {
                status: "healthy",
                timestamp: Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION"),
            }),
            Route::Config => Reply::ok(&ClientConfig {
                client_side_id: &self.config.backend.client_side_id,
                environment: &self.config.backend.environment,
            }),
            Route::Flags => Reply::ok(&self.store.snapshot()),
            Route::Deck => Reply::ok(&self.snapshot()),
            Route::ToggleFlag(key) => match self.toggle(&key) {
                Some(value) => Reply::ok(&Toggled { key, value }),
                None => Reply::error(404, "unknown flag"),
            },
            Route::Key(code) => match self.press_key(code) {
                Some((key, value)) => Reply::ok(&Toggled { key, value }),
                None => Reply::error(404, "no flag bound to this key"),
            },
            Route::OperatorSections => Reply::ok(&OperatorReport {
                sections: self.reconciler.sections(),
                outline: self.reconciler.outline(),
            }),
            Route::ToggleAll => {
                self.toggle_all();
                Reply::ok(&self.store.snapshot())
            }
            Route::ResetFlags => {
                self.reset_flags();
                Reply::ok(&self.store.snapshot())
            }
            Route::Cleanup => {
                let removed = self.cleanup();
                Reply::ok(&serde_json::json!({ "removed": removed }))
            }
            Route::Reset => {
                self.reset();
                Reply::ok(&self.snapshot())
            }
            Route::Static(path) => serve_file(&self.config.server.public_dir, &path),
            Route::Reveal(path) => serve_file(&self.config.server.reveal_dir, &path),
            Route::Preflight => Reply::no_content(),
            Route::MethodNotAllowed => Reply::error(405, "method not allowed"),
            Route::NotFound => Reply::not_found(),
        }
    }

    /// Run until `shutdown` is notified or the request channel closes.
    ///
    /// # Errors
    ///
    /// Currently never fails; errors inside the loop are logged.
    pub async fn run(
        mut self,
        user: UserContext,
        backends: Backends,
        mut requests: mpsc::Receiver<Request>,
        shutdown: Arc<Notify>,
    ) -> Result<()> {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let ready = self.start(&user, backends, events_tx).await;
        info!(
            mode = %ready.mode,
            fallback = ready.fallback_reason.as_deref().unwrap_or("none"),
            "Presentation ready"
        );

        loop {
            tokio::select! {
                () = shutdown.notified() => {
                    info!("Shutdown requested");
                    break;
                }
                Some(event) = events.recv() => self.handle_store_event(event),
                request = requests.recv() => {
                    let Some(request) = request else {
                        debug!("Request channel closed");
                        break;
                    };
                    let reply = self.handle(request.method(), request.url());
                    tokio::task::spawn_blocking(move || server::respond(request, reply));
                }
            }
        }

        self.store.shutdown();
        Ok(())
    }

    fn dispatch_changes(&mut self) {
        while let Ok(change) = self.changes.try_recv() {
            self.reconciler.on_flag_changed(&change.key, change.value);
        }
    }

    fn discard_changes(&mut self) {
        while self.changes.try_recv().is_ok() {}
    }
}

fn serve_file(base: &Path, relative: &str) -> Reply {
    match resolve_static(base, relative) {
        Some(path) => Reply::file(path),
        None => {
            warn!(path = relative, "Rejected static path");
            Reply::not_found()
        }
    }
}

//! Transient user-facing notifications.
//!
//! A notification is live from its creation until its deadline. Nothing is
//! ever cancelled: two notifications raised back to back simply expire
//! independently.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// One message shown to the presenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Sequence number, unique per board.
    pub id: u64,
    /// Text shown to the user.
    pub message: String,
    /// Whether the change enabled something.
    pub enabled: bool,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    expires_at: Instant,
}

impl Notification {
    /// Whether the notification is still visible at `now`.
    #[must_use]
    pub fn is_live_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Sink for user-facing notifications.
pub trait Notifier: Send {
    /// Show a message; `enabled` selects the success or neutral styling.
    fn notify(&mut self, message: String, enabled: bool);
}

/// Notifications currently on screen.
#[derive(Debug)]
pub struct NotificationBoard {
    dismiss_after: Duration,
    next_id: u64,
    entries: Vec<Notification>,
}

impl NotificationBoard {
    /// Create a board whose notifications live for `dismiss_after`.
    #[must_use]
    pub fn new(dismiss_after: Duration) -> Self {
        Self {
            dismiss_after,
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Add a notification created at `now`, dropping the expired ones.
    pub fn push_at(&mut self, message: String, enabled: bool, now: Instant) -> u64 {
        self.entries.retain(|n| n.is_live_at(now));
        self.next_id += 1;
        self.entries.push(Notification {
            id: self.next_id,
            message,
            enabled,
            created_at: Utc::now(),
            expires_at: now + self.dismiss_after,
        });
        self.next_id
    }

    /// Live notifications at `now`, dropping the expired ones.
    pub fn active_at(&mut self, now: Instant) -> Vec<Notification> {
        self.entries.retain(|n| n.is_live_at(now));
        self.entries.clone()
    }

    /// Live notifications right now.
    pub fn active(&mut self) -> Vec<Notification> {
        self.active_at(Instant::now())
    }
}

impl Notifier for NotificationBoard {
    fn notify(&mut self, message: String, enabled: bool) {
        info!(%message, "Notification");
        self.push_at(message, enabled, Instant::now());
    }
}

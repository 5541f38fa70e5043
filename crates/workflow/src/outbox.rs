//! Notification outbox.
//!
//! Deliveries are fire-and-forget from the caller's point of view: a failed
//! `notify` is parked here and retried on the next flush (every dispatch and
//! every sweep). After `max_attempts` failures an entry is dead-lettered and
//! kept for inspection; only the newest `DEAD_LETTER_CAPACITY` are retained.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, error, warn};

use tradedesk_events::{Notification, Notifier};

/// A parked notification and how often it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboxEntry {
    pub notification: Notification,
    pub attempts: u32,
    pub last_error: String,
}

/// Counters for one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub delivered: usize,
    pub still_pending: usize,
    pub dead_lettered: usize,
}

/// Dead letters kept before the oldest are dropped.
pub const DEAD_LETTER_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct OutboxState {
    pending: Vec<OutboxEntry>,
    dead: VecDeque<OutboxEntry>,
}

#[derive(Debug)]
pub struct NotificationOutbox {
    max_attempts: u32,
    dead_capacity: usize,
    state: Mutex<OutboxState>,
}

impl Default for NotificationOutbox {
    fn default() -> Self {
        Self::new(10)
    }
}

impl NotificationOutbox {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            dead_capacity: DEAD_LETTER_CAPACITY,
            state: Mutex::new(OutboxState::default()),
        }
    }

    pub fn with_dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_capacity = capacity.max(1);
        self
    }

    /// Try to deliver now; park the notification on failure.
    pub fn deliver(&self, notifier: &dyn Notifier, notification: Notification) {
        match notifier.notify(&notification) {
            Ok(()) => debug!(
                recipient = %notification.recipient,
                topic = %notification.topic,
                "notification delivered"
            ),
            Err(err) => {
                warn!(
                    recipient = %notification.recipient,
                    topic = %notification.topic,
                    error = %err,
                    "notification failed; parked for retry"
                );
                self.park(OutboxEntry {
                    notification,
                    attempts: 1,
                    last_error: err.to_string(),
                });
            }
        }
    }

    /// Retry every parked notification once.
    pub fn flush(&self, notifier: &dyn Notifier) -> FlushReport {
        let parked = match self.state.lock() {
            Ok(mut state) => std::mem::take(&mut state.pending),
            Err(_) => {
                error!("notification outbox lock poisoned");
                return FlushReport::default();
            }
        };

        let mut report = FlushReport::default();
        for mut entry in parked {
            match notifier.notify(&entry.notification) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    entry.attempts += 1;
                    entry.last_error = err.to_string();
                    if entry.attempts >= self.max_attempts {
                        error!(
                            recipient = %entry.notification.recipient,
                            topic = %entry.notification.topic,
                            attempts = entry.attempts,
                            "notification dead-lettered"
                        );
                        report.dead_lettered += 1;
                        self.bury(entry);
                    } else {
                        report.still_pending += 1;
                        self.park(entry);
                    }
                }
            }
        }
        report
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn pending(&self) -> Vec<OutboxEntry> {
        self.state
            .lock()
            .map(|s| s.pending.clone())
            .unwrap_or_default()
    }

    pub fn dead_letters(&self) -> Vec<OutboxEntry> {
        self.state
            .lock()
            .map(|s| s.dead.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Hand the dead letters to the caller and forget them.
    pub fn drain_dead_letters(&self) -> Vec<OutboxEntry> {
        self.state
            .lock()
            .map(|mut s| s.dead.drain(..).collect())
            .unwrap_or_default()
    }

    fn park(&self, entry: OutboxEntry) {
        if let Ok(mut state) = self.state.lock() {
            state.pending.push(entry);
        }
    }

    fn bury(&self, entry: OutboxEntry) {
        if let Ok(mut state) = self.state.lock() {
            if state.dead.len() >= self.dead_capacity {
                if let Some(dropped) = state.dead.pop_front() {
                    warn!(
                        recipient = %dropped.notification.recipient,
                        topic = %dropped.notification.topic,
                        "dead letter dropped; capacity reached"
                    );
                }
            }
            state.dead.push_back(entry);
        }
    }
}

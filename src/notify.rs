//! Notification Emitter
//!
//! Watches store mutations and raises "new lead" alerts. Nothing is raised
//! until the first fetch has seeded the store, so the initial load never
//! turns into a burst of alerts. Dismissal is left to whoever displays them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use uuid::Uuid;

use crate::leads::LeadId;
use crate::store::StoreEvent;

/// Emitter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterState {
    /// Waiting for the first completed fetch
    Bootstrapping,
    Live,
}

/// A transient user-facing alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    /// Net-new leads covered by this alert
    pub count: usize,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(count: usize, raised_at: DateTime<Utc>) -> Self {
        let message = if count == 1 {
            "1 nouveau lead !".to_string()
        } else {
            format!("{} nouveaux leads !", count)
        };

        Self {
            id: Uuid::new_v4(),
            count,
            message,
            raised_at,
        }
    }
}

/// Bootstrapping/Live state machine over store events
///
/// Every id the store has held since the last clear is remembered, so a lead
/// that a stale fetch dropped and the next fetch brought back is not
/// announced twice.
#[derive(Debug)]
pub struct NotificationEmitter {
    state: EmitterState,
    known: HashSet<LeadId>,
}

impl Default for NotificationEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationEmitter {
    pub fn new() -> Self {
        Self {
            state: EmitterState::Bootstrapping,
            known: HashSet::new(),
        }
    }

    pub fn state(&self) -> EmitterState {
        self.state
    }

    /// Feed one store event; returns how many new leads it announces
    pub fn observe(&mut self, event: &StoreEvent) -> usize {
        if let StoreEvent::Cleared = event {
            self.state = EmitterState::Bootstrapping;
            self.known.clear();
            return 0;
        }

        let mut fresh = 0;
        for id in event.added() {
            if self.known.insert(id.clone()) {
                fresh += 1;
            }
        }

        match (self.state, event) {
            (EmitterState::Bootstrapping, StoreEvent::Replaced { total, .. }) => {
                tracing::debug!(total, "Initial load complete, notifications enabled");
                self.state = EmitterState::Live;
                0
            }
            (EmitterState::Bootstrapping, _) => 0,
            (EmitterState::Live, _) => fresh,
        }
    }

    /// Feed a batch of events and coalesce them into at most one notification
    pub fn observe_batch<'a, I>(&mut self, events: I, now: DateTime<Utc>) -> Option<Notification>
    where
        I: IntoIterator<Item = &'a StoreEvent>,
    {
        let count: usize = events.into_iter().map(|e| self.observe(e)).sum();
        (count > 0).then(|| Notification::new(count, now))
    }

    /// Drive the emitter until the store's event channel closes
    ///
    /// Each wake-up drains whatever is already queued and publishes a single
    /// notification for the batch.
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<StoreEvent>,
        notifications: broadcast::Sender<Notification>,
    ) {
        loop {
            let first = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification emitter lagged behind the store");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let mut batch = vec![first];
            loop {
                match events.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(TryRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Notification emitter lagged behind the store");
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }

            if let Some(notification) = self.observe_batch(&batch, Utc::now()) {
                tracing::info!(
                    count = notification.count,
                    batch = batch.len(),
                    "New lead notification"
                );
                // No receivers just means nobody is watching right now
                let _ = notifications.send(notification);
            }
        }

        tracing::debug!("Notification emitter stopped");
    }
}

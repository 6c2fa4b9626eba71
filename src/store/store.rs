//! Reconciliation Store
//!
//! The authoritative collection of leads for one session. Fetch results
//! replace it wholesale, change events patch it by id, and every mutation
//! is announced on a broadcast channel.

use std::collections::HashSet;
use tokio::sync::{broadcast, watch};

use super::snapshot::Snapshot;
use crate::leads::{Lead, LeadId};
use crate::realtime::ChangeEvent;

/// Default capacity of the change notification channel
const EVENT_CAPACITY: usize = 1024;

/// A mutation that was applied to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The snapshot was replaced by a fetch result
    Replaced {
        /// Leads in the new snapshot
        total: usize,
        /// Ids that were not in the previous snapshot, newest first
        added: Vec<LeadId>,
    },
    /// A lead that was not known before
    Inserted { id: LeadId },
    /// A known lead was replaced in place
    Updated { id: LeadId },
    Deleted { id: LeadId },
    /// The session ended
    Cleared,
}

impl StoreEvent {
    /// Ids this mutation brought that the previous snapshot did not hold
    pub fn added(&self) -> &[LeadId] {
        match self {
            StoreEvent::Replaced { added, .. } => added,
            StoreEvent::Inserted { id } => std::slice::from_ref(id),
            _ => &[],
        }
    }
}

/// Session-scoped lead store
///
/// Mutations run under the watch channel's write lock, so readers only ever
/// observe whole snapshots, and notifications go out in mutation order.
pub struct LeadStore {
    state: watch::Sender<Snapshot>,
    events: broadcast::Sender<StoreEvent>,
}

impl LeadStore {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CAPACITY)
    }

    /// Create a store whose notification channel holds `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (state, _) = watch::channel(Snapshot::default());
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { state, events }
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    /// Receiver that always holds the latest snapshot
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    /// Receiver for mutation notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    /// Replace everything with a fetch result
    ///
    /// Orders newest first (ties keep their delivered order) and keeps the
    /// first occurrence of a duplicated id. The event is always announced,
    /// but snapshot watchers only wake when the contents actually changed.
    pub fn replace_all(&self, leads: Vec<Lead>) -> StoreEvent {
        let mut seen = HashSet::with_capacity(leads.len());
        let mut leads: Vec<Lead> = leads
            .into_iter()
            .filter(|lead| seen.insert(lead.id.clone()))
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut event = StoreEvent::Cleared;
        self.state.send_if_modified(|snapshot| {
            let added: Vec<LeadId> = {
                let previous: HashSet<&LeadId> = snapshot.ids().collect();
                leads
                    .iter()
                    .filter(|l| !previous.contains(&l.id))
                    .map(|l| l.id.clone())
                    .collect()
            };
            event = StoreEvent::Replaced {
                total: leads.len(),
                added,
            };

            let changed = snapshot.leads() != leads.as_slice();
            if changed {
                *snapshot.make_mut() = leads;
            }
            let _ = self.events.send(event.clone());
            changed
        });

        tracing::debug!(?event, "Snapshot replaced");
        event
    }

    /// Prepend a lead; an already known id is updated in place instead
    pub fn apply_insert(&self, lead: Lead) -> StoreEvent {
        self.upsert(lead)
    }

    /// Replace a lead in place; an unknown id is inserted instead
    pub fn apply_update(&self, lead: Lead) -> StoreEvent {
        self.upsert(lead)
    }

    /// Remove a lead; `None` if it was not there
    pub fn apply_delete(&self, id: &LeadId) -> Option<StoreEvent> {
        let mut event = None;
        self.state.send_if_modified(|snapshot| {
            let Some(index) = snapshot.position(id) else {
                return false;
            };
            snapshot.make_mut().remove(index);

            let deleted = StoreEvent::Deleted { id: id.clone() };
            let _ = self.events.send(deleted.clone());
            event = Some(deleted);
            true
        });

        if event.is_none() {
            tracing::trace!(lead_id = %id, "Delete for unknown lead ignored");
        }
        event
    }

    /// Apply a change feed event
    pub fn apply(&self, change: ChangeEvent) -> Option<StoreEvent> {
        match change {
            ChangeEvent::Insert(lead) => Some(self.apply_insert(lead)),
            ChangeEvent::Update(lead) => Some(self.apply_update(lead)),
            ChangeEvent::Delete(id) => self.apply_delete(&id),
        }
    }

    /// Drop every lead (session teardown)
    pub fn clear(&self) {
        self.state.send_modify(|snapshot| {
            snapshot.make_mut().clear();
            let _ = self.events.send(StoreEvent::Cleared);
        });
    }

    fn upsert(&self, lead: Lead) -> StoreEvent {
        let mut event = StoreEvent::Cleared;
        self.state.send_modify(|snapshot| {
            let id = lead.id.clone();
            let position = snapshot.position(&id);
            let leads = snapshot.make_mut();

            event = match position {
                Some(index) => {
                    leads[index] = lead;
                    StoreEvent::Updated { id }
                }
                None => {
                    leads.insert(0, lead);
                    StoreEvent::Inserted { id }
                }
            };
            let _ = self.events.send(event.clone());
        });

        tracing::trace!(?event, "Lead upserted");
        event
    }
}

impl Default for LeadStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Snapshot: an immutable, ordered view of every known lead

use serde::{Serialize, Serializer};
use std::sync::Arc;

use crate::leads::{Lead, LeadId};

/// Leads ordered newest first, unique by id
///
/// Cloning is cheap and a clone never changes: the store swaps in a new
/// vector (copy-on-write) when it mutates.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    leads: Arc<Vec<Lead>>,
    version: u64,
}

impl Snapshot {
    pub fn leads(&self) -> &[Lead] {
        &self.leads
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Lead> {
        self.leads.iter()
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    pub fn get(&self, id: &LeadId) -> Option<&Lead> {
        self.leads.iter().find(|l| &l.id == id)
    }

    pub fn contains(&self, id: &LeadId) -> bool {
        self.position(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &LeadId> {
        self.leads.iter().map(|l| &l.id)
    }

    /// Number of mutations applied since the store was created
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn position(&self, id: &LeadId) -> Option<usize> {
        self.leads.iter().position(|l| &l.id == id)
    }

    /// Mutable access for the store; clones the vector if readers share it
    pub(crate) fn make_mut(&mut self) -> &mut Vec<Lead> {
        self.version += 1;
        Arc::make_mut(&mut self.leads)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Lead;
    type IntoIter = std::slice::Iter<'a, Lead>;

    fn into_iter(self) -> Self::IntoIter {
        self.leads.iter()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.leads.as_slice().serialize(serializer)
    }
}

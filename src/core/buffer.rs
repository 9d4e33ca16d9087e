//! Write buffer and notification set.
//!
//! Pending upserts accumulate in one batch per source kind until commit.
//! The merged per-key view gives `assert` read-your-writes semantics for
//! agent-conflict and new-fact checks within an uncommitted transaction.

use rustc_hash::FxHashMap;

use crate::core::model::{Assertion, AssertionKey, ResourceId, SourceKind};
use crate::core::persistence::OpinionWrite;

#[derive(Default)]
pub struct WriteBuffer {
    artificial: Vec<OpinionWrite>,
    natural: Vec<OpinionWrite>,
    merged: FxHashMap<AssertionKey, Assertion>,
}

impl WriteBuffer {
    pub fn is_empty(&self) -> bool {
        self.artificial.is_empty() && self.natural.is_empty()
    }

    pub fn len(&self) -> usize {
        self.artificial.len() + self.natural.len()
    }

    /// Uncommitted state of a key, merged over all pending writes.
    pub fn pending_view(&self, key: &AssertionKey) -> Option<&Assertion> {
        self.merged.get(key)
    }

    /// Queues a write. `base` is the committed row for the key, consulted
    /// only when the key has no pending entry yet. Returns the merged
    /// post-write assertion.
    pub fn queue(&mut self, write: OpinionWrite, base: Option<Assertion>) -> Assertion {
        let key = write.key.clone();
        let entry = self.merged.entry(key.clone()).or_insert_with(|| {
            base.unwrap_or(Assertion {
                statement: key.statement.clone(),
                phase: key.phase.clone(),
                artificial: None,
                natural: None,
            })
        });
        entry.set_opinion(write.opinion.clone());
        let merged = entry.clone();
        match write.opinion.source {
            SourceKind::Artificial => self.artificial.push(write),
            SourceKind::Natural => self.natural.push(write),
        }
        merged
    }

    pub fn batch(&self, kind: SourceKind) -> &[OpinionWrite] {
        match kind {
            SourceKind::Artificial => &self.artificial,
            SourceKind::Natural => &self.natural,
        }
    }

    pub fn clear(&mut self) {
        self.artificial.clear();
        self.natural.clear();
        self.merged.clear();
    }

    /// Drops pending writes mentioning the resource so a later commit
    /// cannot resurrect a deleted subject.
    pub fn purge_resource(&mut self, resource: &ResourceId) {
        let keep = |w: &OpinionWrite| {
            w.key.statement.subject != *resource && !w.key.statement.object.mentions(resource)
        };
        self.artificial.retain(keep);
        self.natural.retain(keep);
        self.merged.retain(|key, _| {
            key.statement.subject != *resource && !key.statement.object.mentions(resource)
        });
    }
}

/// Newly-true facts awaiting delivery to listeners. Deduplicated per
/// identity key; arrival order is preserved across commits so listeners
/// see batches in the order commits occurred.
#[derive(Default)]
pub struct NotificationSet {
    order: Vec<AssertionKey>,
    entries: FxHashMap<AssertionKey, Assertion>,
}

impl NotificationSet {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Inserts or refreshes; a key already queued keeps its position but
    /// carries the latest merged assertion.
    pub fn push(&mut self, assertion: Assertion) {
        let key = assertion.key();
        if self.entries.insert(key.clone(), assertion).is_none() {
            self.order.push(key);
        }
    }

    pub fn extend(&mut self, assertions: Vec<Assertion>) {
        for assertion in assertions {
            self.push(assertion);
        }
    }

    /// Updates an entry already queued for this key, if any. Keeps queued
    /// notifications in step with later non-novel writes to the same key.
    pub fn refresh(&mut self, assertion: &Assertion) {
        let key = assertion.key();
        if let Some(entry) = self.entries.get_mut(&key) {
            *entry = assertion.clone();
        }
    }

    /// Snapshot in arrival order; the set is left empty.
    pub fn drain(&mut self) -> Vec<Assertion> {
        let order = std::mem::take(&mut self.order);
        let mut entries = std::mem::take(&mut self.entries);
        order
            .into_iter()
            .filter_map(|key| entries.remove(&key))
            .collect()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    pub fn purge_resource(&mut self, resource: &ResourceId) {
        self.order.retain(|key| {
            key.statement.subject != *resource && !key.statement.object.mentions(resource)
        });
        self.entries.retain(|key, _| {
            key.statement.subject != *resource && !key.statement.object.mentions(resource)
        });
    }
}

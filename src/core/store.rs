//! The assertion store: dual-opinion triple storage with batched commits.
//!
//! All mutating operations serialize on one mutex that owns the SQLite
//! connection, the write buffer, and the notification sets. Reads go
//! through the same boundary; a reader sees either the pre- or post-commit
//! state of a transaction, never a half-flushed batch.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::core::audit::FactLog;
use crate::core::buffer::{NotificationSet, WriteBuffer};
use crate::core::db;
use crate::core::error::TandemError;
use crate::core::model::{
    Assertion, AssertionKey, Opinion, Phase, Rating, ResourceId, SourceKind, Statement,
};
use crate::core::persistence::{self, OpinionWrite, Query};
use crate::core::propagation::ListenerRegistry;
use crate::core::time::{Clock, SystemClock};

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Maximum notify->commit rounds before propagation is declared
    /// divergent and aborted.
    pub propagation_depth_threshold: usize,
    /// When true, `assert_bulk` skips new-fact inspection entirely and
    /// never queues notifications. Default false: bulk-imported novel
    /// facts notify like any other.
    pub bulk_suppresses_notification: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            propagation_depth_threshold: 10,
            bulk_suppresses_notification: false,
        }
    }
}

/// Commit-protocol state. `Buffering` with an empty buffer is the idle
/// state; there is no separate variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Buffering,
    Committing,
    Notifying,
}

pub(crate) struct StoreInner {
    pub(crate) conn: rusqlite::Connection,
    pub(crate) buffer: WriteBuffer,
    /// New facts queued since the last commit; invisible to listeners.
    pub(crate) staged: NotificationSet,
    /// Committed new facts awaiting a notification round.
    pub(crate) committed: NotificationSet,
    pub(crate) state: StoreState,
    pub(crate) last_propagation_depth: usize,
}

pub struct AssertionStore {
    store_id: String,
    pub(crate) options: StoreOptions,
    clock: Box<dyn Clock>,
    audit: FactLog,
    pub(crate) inner: Mutex<StoreInner>,
    pub(crate) listeners: ListenerRegistry,
}

impl AssertionStore {
    pub fn open(root: &Path, store_id: &str) -> Result<Self, TandemError> {
        Self::open_with_options(root, store_id, StoreOptions::default())
    }

    pub fn open_with_options(
        root: &Path,
        store_id: &str,
        options: StoreOptions,
    ) -> Result<Self, TandemError> {
        let conn = db::open_store_db(root, store_id)?;
        let audit = FactLog::new(store_id, db::fact_log_path(root, store_id));
        Ok(Self {
            store_id: store_id.to_string(),
            options,
            clock: Box::new(SystemClock),
            audit,
            inner: Mutex::new(StoreInner {
                conn,
                buffer: WriteBuffer::default(),
                staged: NotificationSet::default(),
                committed: NotificationSet::default(),
                state: StoreState::Buffering,
                last_propagation_depth: 0,
            }),
            listeners: ListenerRegistry::default(),
        })
    }

    /// Replaces the wall clock. Deterministic tests pin `observed_at` and
    /// audit save times this way.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap()
    }

    /// Upserts one source's opinion at (statement, phase). Returns true
    /// iff no opinion of any source already held this (statement, phase,
    /// rating) combination, ignoring timestamps; that return value is what
    /// drives notification.
    #[allow(clippy::too_many_arguments)]
    pub fn assert(
        &self,
        statement: Statement,
        phase: Phase,
        source: SourceKind,
        agent: &str,
        rating: Rating,
        confidence: f64,
        when: Option<DateTime<Utc>>,
    ) -> Result<bool, TandemError> {
        self.assert_inner(statement, phase, source, agent, rating, confidence, when, false)
    }

    /// Bulk-import variant. Subject to the
    /// `bulk_suppresses_notification` policy flag; agent immutability is
    /// enforced either way.
    #[allow(clippy::too_many_arguments)]
    pub fn assert_bulk(
        &self,
        statement: Statement,
        phase: Phase,
        source: SourceKind,
        agent: &str,
        rating: Rating,
        confidence: f64,
        when: Option<DateTime<Utc>>,
    ) -> Result<bool, TandemError> {
        self.assert_inner(statement, phase, source, agent, rating, confidence, when, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn assert_inner(
        &self,
        statement: Statement,
        phase: Phase,
        source: SourceKind,
        agent: &str,
        rating: Rating,
        confidence: f64,
        when: Option<DateTime<Utc>>,
        bulk: bool,
    ) -> Result<bool, TandemError> {
        let observed_at = when.unwrap_or_else(|| self.clock.now());
        let opinion = Opinion::new(source, agent, observed_at, rating, confidence)?;

        let mut inner = self.lock_inner();
        let inner = &mut *inner;

        let key = AssertionKey { statement, phase };
        let existing = match inner.buffer.pending_view(&key) {
            Some(pending) => Some(pending.clone()),
            None => persistence::find_by_key(&inner.conn, &key)?,
        };

        // Agent names are immutable per (statement, phase, source); the
        // rest of the opinion may always be refreshed.
        if let Some(prior) = existing.as_ref().and_then(|a| a.opinion(source))
            && prior.agent != opinion.agent
        {
            return Err(TandemError::AgentConflict {
                kind: source,
                key: key.to_string(),
                existing: prior.agent.clone(),
                attempted: opinion.agent,
            });
        }

        let suppress = bulk && self.options.bulk_suppresses_notification;
        let is_new = if suppress {
            false
        } else {
            !existing
                .as_ref()
                .is_some_and(|current| current.holds_rating(rating))
        };

        let merged = inner.buffer.queue(OpinionWrite { key, opinion }, existing);

        if is_new {
            inner.staged.push(merged.clone());
            self.audit.append(&merged, self.clock.now())?;
        } else {
            inner.staged.refresh(&merged);
        }
        Ok(is_new)
    }

    /// Flushes both source-kind batches as one atomic transaction. On
    /// success the staged notifications become visible to listeners; on
    /// failure nothing is applied and the buffer is preserved for the
    /// caller to inspect or roll back.
    pub fn commit(&self) -> Result<(), TandemError> {
        let mut inner = self.lock_inner();
        let inner = &mut *inner;
        if inner.buffer.is_empty() {
            return Ok(());
        }

        let resume_state = inner.state;
        inner.state = StoreState::Committing;

        let flushed = (|| -> Result<(), TandemError> {
            let tx = inner.conn.transaction()?;
            persistence::flush_batch(
                &tx,
                SourceKind::Artificial,
                inner.buffer.batch(SourceKind::Artificial),
            )?;
            persistence::flush_batch(
                &tx,
                SourceKind::Natural,
                inner.buffer.batch(SourceKind::Natural),
            )?;
            tx.commit()?;
            Ok(())
        })();

        match flushed {
            Ok(()) => {
                inner.buffer.clear();
                let staged = inner.staged.drain();
                inner.committed.extend(staged);
                inner.state = resume_state;
                Ok(())
            }
            Err(e) => {
                inner.state = resume_state;
                Err(e)
            }
        }
    }

    /// Discards pending writes and staged notifications. Committed state
    /// and already-visible notifications are untouched. Legal only while
    /// buffering.
    pub fn rollback(&self) -> Result<(), TandemError> {
        let mut inner = self.lock_inner();
        if inner.state != StoreState::Buffering {
            return Err(TandemError::InvalidState(format!(
                "rollback is only legal while buffering (state: {:?})",
                inner.state
            )));
        }
        inner.buffer.clear();
        inner.staged.clear();
        Ok(())
    }

    pub fn query(&self, q: &Query) -> Result<Vec<Assertion>, TandemError> {
        let inner = self.lock_inner();
        persistence::run_query(&inner.conn, q)
    }

    /// Forward-only row walk without materializing the result set.
    /// Returns the number of corrupt rows skipped.
    pub fn stream_query(
        &self,
        q: &Query,
        sink: &mut dyn FnMut(Assertion) -> Result<(), TandemError>,
    ) -> Result<usize, TandemError> {
        let inner = self.lock_inner();
        persistence::scan_query(&inner.conn, q, sink)
    }

    /// Deletes every assertion mentioning the resource, immediately and
    /// atomically; pending writes and queued notifications about it are
    /// purged so a later commit cannot resurrect it.
    pub fn remove_all_about(&self, resource: &ResourceId) -> Result<usize, TandemError> {
        let mut inner = self.lock_inner();
        let deleted = persistence::remove_all_about(&inner.conn, resource)?;
        inner.buffer.purge_resource(resource);
        inner.staged.purge_resource(resource);
        inner.committed.purge_resource(resource);
        Ok(deleted)
    }

    pub fn state(&self) -> StoreState {
        self.lock_inner().state
    }

    pub fn pending_write_count(&self) -> usize {
        self.lock_inner().buffer.len()
    }

    pub fn pending_notification_count(&self) -> usize {
        let inner = self.lock_inner();
        inner.staged.len() + inner.committed.len()
    }

    /// Depth reached by the most recent propagation cycle.
    pub fn last_propagation_depth(&self) -> usize {
        self.lock_inner().last_propagation_depth
    }
}

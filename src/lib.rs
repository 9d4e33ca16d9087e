//! Tandem: a dual-opinion assertion store for collaborative knowledge graphs.
//!
//! An automated agent ("artificial") and a human ("natural") assert opinions
//! about the same (subject, predicate, object) triples. Tandem keeps both
//! opinions without letting either clobber the other, commits writes as
//! atomic batches, and drives a bounded change-propagation loop that hands
//! every committed change to registered rule modules exactly once per round.
//!
//! # Architecture
//!
//! ## One row, two observers
//!
//! Each logical fact is one row keyed by (subject, predicate, object,
//! phase) with an independently-writable column group per source kind.
//! Upserts touch exactly one group, so the automated engine and the human
//! can disagree indefinitely; reads resolve a primary opinion (natural
//! wins) only at the edge.
//!
//! ## The commit protocol
//!
//! `assert` buffers; `commit` flushes both source-kind batches in one
//! SQLite transaction; `notify_listeners_recursively` delivers committed
//! batches to listeners and iterates until the rule network settles or the
//! depth bound trips with `PropagationOverflow`.
//!
//! ## Durability channels
//!
//! Besides the relational store, every new fact is appended to a
//! compressed write-only log (`<storeId>-log`) that survives database
//! corruption and is never read back by the engine.
//!
//! # Example
//!
//! ```no_run
//! use tandem::core::model::{Node, Phase, Rating, SourceKind, Statement};
//! use tandem::core::persistence::Query;
//! use tandem::core::store::AssertionStore;
//!
//! let store = AssertionStore::open(std::path::Path::new("/tmp/kg"), "kg")?;
//! store.assert(
//!     Statement::new("fileA", "hasTopic", Node::resource("conceptX")),
//!     Phase::ConceptDiscovery,
//!     SourceKind::Natural,
//!     "alice",
//!     Rating::Positive,
//!     1.0,
//!     None,
//! )?;
//! store.commit()?;
//! store.notify_listeners_recursively()?;
//! let _hits = store.query(&Query::new().subject("fileA").rating(Rating::Positive))?;
//! # Ok::<(), tandem::core::error::TandemError>(())
//! ```

pub mod cli;
pub mod core;

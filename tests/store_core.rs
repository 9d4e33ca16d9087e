//! Storage-level properties of the assertion store: dual-opinion
//! independence, new-fact detection, commit atomicity, OR-semantics of
//! source-agnostic queries, and removal.

use tandem::core::error::TandemError;
use tandem::core::model::{Node, Phase, Rating, ResourceId, SourceKind, Statement};
use tandem::core::persistence::Query;
use tandem::core::store::{AssertionStore, StoreOptions, StoreState};
use tempfile::tempdir;

fn topic_statement() -> Statement {
    Statement::new("fileA", "hasTopic", Node::resource("conceptX"))
}

#[test]
fn scenario_natural_primacy_with_conflicting_artificial_opinion() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    // alice (natural) asserts the topic positively.
    let is_new = store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Natural,
            "alice",
            Rating::Positive,
            1.0,
            None,
        )
        .unwrap();
    assert!(is_new);
    store.commit().unwrap();

    let positive = store
        .query(
            &Query::new()
                .subject("fileA")
                .phase(Phase::ConceptDiscovery)
                .rating(Rating::Positive),
        )
        .unwrap();
    assert_eq!(positive.len(), 1);
    assert_eq!(positive[0].primary().unwrap().agent, "alice");

    // The engine (artificial) independently disagrees.
    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Artificial,
            "engine",
            Rating::Negative,
            0.8,
            None,
        )
        .unwrap();
    store.commit().unwrap();

    // rating=Positive still matches (natural slot), so one hit remains.
    let positive = store
        .query(
            &Query::new()
                .subject("fileA")
                .phase(Phase::ConceptDiscovery)
                .rating(Rating::Positive),
        )
        .unwrap();
    assert_eq!(positive.len(), 1);

    // rating=Negative matches via the artificial slot, but the primary
    // opinion is still alice's positive one: natural takes precedence.
    let negative = store
        .query(
            &Query::new()
                .subject("fileA")
                .phase(Phase::ConceptDiscovery)
                .rating(Rating::Negative),
        )
        .unwrap();
    assert_eq!(negative.len(), 1);
    let primary = negative[0].primary().unwrap();
    assert_eq!(primary.agent, "alice");
    assert_eq!(primary.rating, Rating::Positive);
    assert_eq!(
        negative[0].opinion(SourceKind::Artificial).unwrap().rating,
        Rating::Negative
    );
}

#[test]
fn dual_opinion_independence() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Natural,
            "alice",
            Rating::Positive,
            1.0,
            None,
        )
        .unwrap();
    store.commit().unwrap();

    // Artificial writes, including repeated ones, never alter the natural
    // opinion on the same key.
    for rating in [Rating::Negative, Rating::Undecided, Rating::Positive] {
        store
            .assert(
                topic_statement(),
                Phase::ConceptDiscovery,
                SourceKind::Artificial,
                "engine",
                rating,
                0.5,
                None,
            )
            .unwrap();
        store.commit().unwrap();

        let hits = store.query(&Query::new().subject("fileA")).unwrap();
        assert_eq!(hits.len(), 1);
        let natural = hits[0].opinion(SourceKind::Natural).unwrap();
        assert_eq!(natural.agent, "alice");
        assert_eq!(natural.rating, Rating::Positive);
        assert_eq!(natural.confidence, 1.0);
    }
}

#[test]
fn new_fact_detection_truth_table() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    let assert_with = |source: SourceKind, agent: &str, rating: Rating| {
        store
            .assert(
                topic_statement(),
                Phase::ConceptDiscovery,
                source,
                agent,
                rating,
                0.9,
                None,
            )
            .unwrap()
    };

    // First opinion of a rating: new.
    assert!(assert_with(SourceKind::Artificial, "engine", Rating::Positive));
    store.commit().unwrap();

    // Timestamp-only refresh: not new.
    assert!(!assert_with(SourceKind::Artificial, "engine", Rating::Positive));

    // Another source holding the same rating the fact already has: not new.
    assert!(!assert_with(SourceKind::Natural, "alice", Rating::Positive));

    // A rating nobody holds yet: new.
    assert!(assert_with(SourceKind::Natural, "alice", Rating::Negative));
    store.commit().unwrap();

    // The artificial slot still holds Positive, so flipping natural back
    // to Positive is not new.
    assert!(!assert_with(SourceKind::Natural, "alice", Rating::Positive));
}

#[test]
fn upsert_idempotence_modulo_timestamp() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    for _ in 0..3 {
        store
            .assert(
                topic_statement(),
                Phase::ConceptDiscovery,
                SourceKind::Artificial,
                "engine",
                Rating::Positive,
                0.8,
                None,
            )
            .unwrap();
        store.commit().unwrap();
    }

    let hits = store.query(&Query::new()).unwrap();
    assert_eq!(hits.len(), 1);
    let op = hits[0].opinion(SourceKind::Artificial).unwrap();
    assert_eq!(op.agent, "engine");
    assert_eq!(op.rating, Rating::Positive);
    assert_eq!(op.confidence, 0.8);
    assert!(hits[0].opinion(SourceKind::Natural).is_none());
}

#[test]
fn agent_name_is_immutable_per_source() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Natural,
            "alice",
            Rating::Positive,
            1.0,
            None,
        )
        .unwrap();

    // Conflict is detected against the uncommitted pending view too.
    let err = store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Natural,
            "bob",
            Rating::Positive,
            1.0,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, TandemError::AgentConflict { .. }));

    // A different source may use a different agent name freely.
    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Artificial,
            "engine",
            Rating::Positive,
            0.5,
            None,
        )
        .unwrap();
    store.commit().unwrap();

    let err = store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Artificial,
            "engine-v2",
            Rating::Positive,
            0.5,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, TandemError::AgentConflict { .. }));
}

#[test]
fn phases_partition_the_fact_space() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Artificial,
            "engine",
            Rating::Positive,
            0.9,
            None,
        )
        .unwrap();
    // Same triple, different phase, unrelated opinion.
    let is_new = store
        .assert(
            topic_statement(),
            Phase::TaxonomyDerivation,
            SourceKind::Artificial,
            "engine",
            Rating::Negative,
            0.3,
            None,
        )
        .unwrap();
    assert!(is_new);
    store.commit().unwrap();

    let all = store.query(&Query::new().subject("fileA")).unwrap();
    assert_eq!(all.len(), 2);

    let discovery = store
        .query(&Query::new().phase(Phase::ConceptDiscovery))
        .unwrap();
    assert_eq!(discovery.len(), 1);
    assert_eq!(
        discovery[0].primary().unwrap().rating,
        Rating::Positive
    );
}

#[test]
fn uncommitted_writes_are_invisible_and_rollback_leaves_no_trace() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    for i in 0..5 {
        store
            .assert(
                Statement::new(
                    format!("file{}", i).as_str(),
                    "hasTopic",
                    Node::resource("conceptX"),
                ),
                Phase::ConceptDiscovery,
                SourceKind::Artificial,
                "engine",
                Rating::Positive,
                0.9,
                None,
            )
            .unwrap();
    }
    assert_eq!(store.pending_write_count(), 5);

    // A second connection onto the same files sees none of the batch.
    let reader = AssertionStore::open(tmp.path(), "kg").expect("open reader");
    assert_eq!(reader.query(&Query::new()).unwrap().len(), 0);

    store.rollback().unwrap();
    assert_eq!(store.pending_write_count(), 0);
    assert_eq!(store.query(&Query::new()).unwrap().len(), 0);

    // Re-assert and commit: the whole batch becomes visible at once.
    for i in 0..5 {
        store
            .assert(
                Statement::new(
                    format!("file{}", i).as_str(),
                    "hasTopic",
                    Node::resource("conceptX"),
                ),
                Phase::ConceptDiscovery,
                SourceKind::Artificial,
                "engine",
                Rating::Positive,
                0.9,
                None,
            )
            .unwrap();
    }
    store.commit().unwrap();
    assert_eq!(reader.query(&Query::new()).unwrap().len(), 5);
}

#[test]
fn source_agnostic_queries_use_or_semantics() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Artificial,
            "engine",
            Rating::Negative,
            0.7,
            None,
        )
        .unwrap();
    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Natural,
            "alice",
            Rating::Positive,
            1.0,
            None,
        )
        .unwrap();
    store.commit().unwrap();

    // source=None, rating=Positive: matches via the natural slot even
    // though the artificial one is negative.
    let hits = store.query(&Query::new().rating(Rating::Positive)).unwrap();
    assert_eq!(hits.len(), 1);

    // A sourced query does not cross slots.
    let artificial_positive = store
        .query(
            &Query::new()
                .source(SourceKind::Artificial)
                .rating(Rating::Positive),
        )
        .unwrap();
    assert!(artificial_positive.is_empty());

    // Confidence filters follow the same distribution rule.
    let confident = store.query(&Query::new().min_confidence(0.9)).unwrap();
    assert_eq!(confident.len(), 1);
    let very_confident = store
        .query(
            &Query::new()
                .source(SourceKind::Artificial)
                .min_confidence(0.9),
        )
        .unwrap();
    assert!(very_confident.is_empty());
}

#[test]
fn remove_all_about_is_immediate_and_purges_pending_state() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Artificial,
            "engine",
            Rating::Positive,
            0.9,
            None,
        )
        .unwrap();
    store.commit().unwrap();

    // Pending, uncommitted mention of the same resource.
    store
        .assert(
            Statement::new("fileB", "comment", Node::literal("see conceptX notes")),
            Phase::ConceptDiscovery,
            SourceKind::Natural,
            "alice",
            Rating::Positive,
            1.0,
            None,
        )
        .unwrap();

    let deleted = store
        .remove_all_about(&ResourceId::new("conceptX"))
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(store.pending_write_count(), 0);
    assert_eq!(store.pending_notification_count(), 0);

    // The pending literal mention cannot be resurrected by a commit.
    store.commit().unwrap();
    assert!(store.query(&Query::new()).unwrap().is_empty());
}

#[test]
fn store_state_is_buffering_between_operations() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open_with_options(
        tmp.path(),
        "kg",
        StoreOptions {
            propagation_depth_threshold: 4,
            bulk_suppresses_notification: false,
        },
    )
    .expect("open");

    assert_eq!(store.state(), StoreState::Buffering);
    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Artificial,
            "engine",
            Rating::Positive,
            0.9,
            None,
        )
        .unwrap();
    assert_eq!(store.state(), StoreState::Buffering);
    store.commit().unwrap();
    assert_eq!(store.state(), StoreState::Buffering);
}

#[test]
fn stream_query_walks_rows_without_materializing() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    for i in 0..10 {
        store
            .assert(
                Statement::new(
                    format!("file{}", i).as_str(),
                    "hasTopic",
                    Node::resource("conceptX"),
                ),
                Phase::ConceptDiscovery,
                SourceKind::Artificial,
                "engine",
                Rating::Positive,
                0.9,
                None,
            )
            .unwrap();
    }
    store.commit().unwrap();

    let mut seen = 0usize;
    let skipped = store
        .stream_query(&Query::new(), &mut |assertion| {
            assert!(assertion.primary().is_some());
            seen += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(seen, 10);
    assert_eq!(skipped, 0);
}

#[test]
fn audit_log_file_grows_with_new_facts_only() {
    let tmp = tempdir().expect("tempdir");
    let store = AssertionStore::open(tmp.path(), "kg").expect("open");

    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Artificial,
            "engine",
            Rating::Positive,
            0.9,
            None,
        )
        .unwrap();
    store.commit().unwrap();

    let log_path = tmp.path().join("kg-log");
    let after_new = std::fs::metadata(&log_path).unwrap().len();
    assert!(after_new > 0);

    // A pure refresh queues no audit record.
    store
        .assert(
            topic_statement(),
            Phase::ConceptDiscovery,
            SourceKind::Artificial,
            "engine",
            Rating::Positive,
            0.9,
            None,
        )
        .unwrap();
    store.commit().unwrap();
    assert_eq!(std::fs::metadata(&log_path).unwrap().len(), after_new);
}

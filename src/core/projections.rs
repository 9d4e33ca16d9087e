//! Derived read-only helpers over the assertion store.
//!
//! Convenience projections for the ontology layers: concept lookup,
//! preferred-label resolution, and instance type maps. These are built
//! purely from `query` and carry no storage logic of their own.

use rustc_hash::FxHashMap;

use crate::core::error::TandemError;
use crate::core::model::{Node, Phase, Rating, ResourceId};
use crate::core::persistence::Query;
use crate::core::store::AssertionStore;

/// Predicates and class resources the collaborating rule modules agree on.
/// The store core never interprets them; they only parameterize queries.
pub mod vocab {
    pub const TYPE: &str = "rdf:type";
    pub const PREF_LABEL: &str = "skos:prefLabel";
    pub const SUBCLASS_OF: &str = "rdfs:subClassOf";
    pub const CONCEPT: &str = "skos:Concept";
}

/// Resources positively asserted (by either source) to be concepts.
pub fn concepts(store: &AssertionStore, phase: Phase) -> Result<Vec<ResourceId>, TandemError> {
    let q = Query::new()
        .predicate(vocab::TYPE)
        .object(Node::resource(vocab::CONCEPT))
        .phase(phase)
        .rating(Rating::Positive);
    let mut subjects: Vec<ResourceId> = store
        .query(&q)?
        .into_iter()
        .map(|a| a.statement.subject)
        .collect();
    subjects.sort();
    subjects.dedup();
    Ok(subjects)
}

/// The literal label whose primary opinion carries the highest confidence.
pub fn preferred_label(
    store: &AssertionStore,
    resource: &ResourceId,
    phase: Phase,
) -> Result<Option<String>, TandemError> {
    let q = Query::new()
        .subject(resource.clone())
        .predicate(vocab::PREF_LABEL)
        .phase(phase)
        .rating(Rating::Positive);
    let mut best: Option<(f64, String)> = None;
    for assertion in store.query(&q)? {
        let Node::Literal(label) = &assertion.statement.object else {
            continue;
        };
        let Some(primary) = assertion.primary() else {
            continue;
        };
        if best.as_ref().is_none_or(|(c, _)| primary.confidence > *c) {
            best = Some((primary.confidence, label.clone()));
        }
    }
    Ok(best.map(|(_, label)| label))
}

/// Instance -> asserted types, from positive `rdf:type` statements.
pub fn type_map(
    store: &AssertionStore,
    phase: Phase,
) -> Result<FxHashMap<ResourceId, Vec<ResourceId>>, TandemError> {
    let q = Query::new()
        .predicate(vocab::TYPE)
        .phase(phase)
        .rating(Rating::Positive);
    let mut map: FxHashMap<ResourceId, Vec<ResourceId>> = FxHashMap::default();
    for assertion in store.query(&q)? {
        if let Node::Resource(ty) = &assertion.statement.object {
            map.entry(assertion.statement.subject.clone())
                .or_default()
                .push(ty.clone());
        }
    }
    for types in map.values_mut() {
        types.sort();
        types.dedup();
    }
    Ok(map)
}

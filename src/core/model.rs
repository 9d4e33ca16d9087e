//! Data model for the assertion store.
//!
//! A `Statement` is an immutable (subject, predicate, object) triple. An
//! `Opinion` is one observer's stance on a statement within a phase. An
//! `Assertion` binds a statement and phase to up to two opinions, one per
//! source kind, and is the unit of storage and notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::core::error::TandemError;

/// Opaque resource identifier. The store never interprets these; rule
/// modules mint them through an `IdentityAllocator`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

const RESOURCE_PREFIX: &str = "res:";
const LITERAL_PREFIX: &str = "lit:";

/// Object position of a statement: a resource reference or a literal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    Resource(ResourceId),
    Literal(String),
}

impl Node {
    pub fn resource(id: impl Into<ResourceId>) -> Self {
        Node::Resource(id.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Node::Literal(value.into())
    }

    /// Stable persisted encoding. The prefix disambiguates resource
    /// references from literals that happen to look like identifiers.
    pub fn encode(&self) -> String {
        match self {
            Node::Resource(id) => format!("{}{}", RESOURCE_PREFIX, id),
            Node::Literal(value) => format!("{}{}", LITERAL_PREFIX, value),
        }
    }

    /// Decodes a persisted object column. A value carrying neither prefix
    /// is a corrupt row and aborts the read of that row only.
    pub fn parse(raw: &str) -> Result<Self, TandemError> {
        if let Some(id) = raw.strip_prefix(RESOURCE_PREFIX) {
            Ok(Node::Resource(ResourceId::new(id)))
        } else if let Some(value) = raw.strip_prefix(LITERAL_PREFIX) {
            Ok(Node::Literal(value.to_string()))
        } else {
            Err(TandemError::MalformedStatement(format!(
                "object column has no node prefix: '{}'",
                raw
            )))
        }
    }

    /// True when the node references `resource` exactly or embeds its
    /// identifier inside a literal. Drives `remove_all_about`.
    pub fn mentions(&self, resource: &ResourceId) -> bool {
        match self {
            Node::Resource(id) => id == resource,
            Node::Literal(value) => value.contains(resource.as_str()),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Resource(id) => write!(f, "{}", id),
            Node::Literal(value) => write!(f, "\"{}\"", value),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Node::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Immutable (subject, predicate, object) triple. Identity is structural;
/// a "changed" statement is a new opinion, never an in-place edit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: ResourceId,
    pub predicate: ResourceId,
    pub object: Node,
}

impl Statement {
    pub fn new(
        subject: impl Into<ResourceId>,
        predicate: impl Into<ResourceId>,
        object: Node,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.subject, self.predicate, self.object)
    }
}

/// Observer stance on a statement. Conflict precedence is not numeric;
/// rating changes are detected by inequality only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Positive,
    Negative,
    Undecided,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Positive => "positive",
            Rating::Negative => "negative",
            Rating::Undecided => "undecided",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "positive" => Some(Rating::Positive),
            "negative" => Some(Rating::Negative),
            "undecided" => Some(Rating::Undecided),
            _ => None,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly two opinion slots exist per logical fact: one automated, one
/// human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Artificial,
    Natural,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Artificial, SourceKind::Natural];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Artificial => "artificial",
            SourceKind::Natural => "natural",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "artificial" => Some(SourceKind::Artificial),
            "natural" => Some(SourceKind::Natural),
            _ => None,
        }
    }

    /// Column prefix of this source's group in the assertions table.
    pub fn column_prefix(&self) -> &'static str {
        match self {
            SourceKind::Artificial => "artificial_",
            SourceKind::Natural => "natural_",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing phase. Phases partition the triple space into independent
/// layers; the same triple may carry unrelated assertions in different
/// phases, so phase is part of the identity key. The enumeration is open:
/// unknown names round-trip through `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    TermExtraction,
    ConceptDiscovery,
    OntologyPopulation,
    TaxonomyDerivation,
    RelationLearning,
    Custom(String),
}

impl Phase {
    pub fn as_str(&self) -> &str {
        match self {
            Phase::TermExtraction => "term_extraction",
            Phase::ConceptDiscovery => "concept_discovery",
            Phase::OntologyPopulation => "ontology_population",
            Phase::TaxonomyDerivation => "taxonomy_derivation",
            Phase::RelationLearning => "relation_learning",
            Phase::Custom(name) => name,
        }
    }

    /// Never fails: unrecognized names become `Custom`.
    pub fn from_name(raw: &str) -> Self {
        match raw {
            "term_extraction" => Phase::TermExtraction,
            "concept_discovery" => Phase::ConceptDiscovery,
            "ontology_population" => Phase::OntologyPopulation,
            "taxonomy_derivation" => Phase::TaxonomyDerivation,
            "relation_learning" => Phase::RelationLearning,
            other => Phase::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Phase {
    fn from(raw: &str) -> Self {
        Phase::from_name(raw)
    }
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Phase::from_name(&raw))
    }
}

/// One observer's stance on a statement within a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub source: SourceKind,
    pub agent: String,
    pub observed_at: DateTime<Utc>,
    pub rating: Rating,
    pub confidence: f64,
}

impl Opinion {
    pub fn new(
        source: SourceKind,
        agent: impl Into<String>,
        observed_at: DateTime<Utc>,
        rating: Rating,
        confidence: f64,
    ) -> Result<Self, TandemError> {
        let agent = agent.into();
        if agent.trim().is_empty() {
            return Err(TandemError::ValidationError(
                "opinion agent name must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(TandemError::ValidationError(format!(
                "confidence {} outside [0,1]",
                confidence
            )));
        }
        Ok(Self {
            source,
            agent,
            observed_at,
            rating,
            confidence,
        })
    }
}

/// Identity key of an assertion: the statement plus its phase. Persistence
/// merges, never duplicates, rows sharing this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssertionKey {
    pub statement: Statement,
    pub phase: Phase,
}

impl fmt::Display for AssertionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.statement, self.phase)
    }
}

/// A statement, its phase, and up to two opinions (one per source kind).
///
/// Invariant: at least one opinion is present. Rows that transiently lose
/// both groups are skipped on read rather than surfaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub statement: Statement,
    pub phase: Phase,
    pub artificial: Option<Opinion>,
    pub natural: Option<Opinion>,
}

impl Assertion {
    pub fn new(
        statement: Statement,
        phase: Phase,
        artificial: Option<Opinion>,
        natural: Option<Opinion>,
    ) -> Result<Self, TandemError> {
        if artificial.is_none() && natural.is_none() {
            return Err(TandemError::ValidationError(format!(
                "assertion {}@{} carries no opinion",
                statement, phase
            )));
        }
        if let Some(op) = &artificial
            && op.source != SourceKind::Artificial
        {
            return Err(TandemError::ValidationError(
                "artificial slot holds a non-artificial opinion".to_string(),
            ));
        }
        if let Some(op) = &natural
            && op.source != SourceKind::Natural
        {
            return Err(TandemError::ValidationError(
                "natural slot holds a non-natural opinion".to_string(),
            ));
        }
        Ok(Self {
            statement,
            phase,
            artificial,
            natural,
        })
    }

    pub fn key(&self) -> AssertionKey {
        AssertionKey {
            statement: self.statement.clone(),
            phase: self.phase.clone(),
        }
    }

    pub fn opinion(&self, source: SourceKind) -> Option<&Opinion> {
        match source {
            SourceKind::Artificial => self.artificial.as_ref(),
            SourceKind::Natural => self.natural.as_ref(),
        }
    }

    pub fn set_opinion(&mut self, opinion: Opinion) {
        match opinion.source {
            SourceKind::Artificial => self.artificial = Some(opinion),
            SourceKind::Natural => self.natural = Some(opinion),
        }
    }

    /// The natural opinion wins when both observers have spoken.
    pub fn primary(&self) -> Option<&Opinion> {
        self.natural.as_ref().or(self.artificial.as_ref())
    }

    /// True when any opinion slot holds `rating`. New-fact detection and
    /// source-agnostic rating filters both reduce to this.
    pub fn holds_rating(&self, rating: Rating) -> bool {
        self.artificial.as_ref().map(|op| op.rating) == Some(rating)
            || self.natural.as_ref().map(|op| op.rating) == Some(rating)
    }
}

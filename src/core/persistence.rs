//! Relational realization of the assertion store.
//!
//! One row per identity key (subject, predicate, object, phase) with two
//! independently-writable opinion column groups. Each source kind gets its
//! own upsert statement touching only its group, so writing one source's
//! opinion never clobbers the other's, and first-time inserts and later
//! updates share a single code path.

use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params, params_from_iter};

use crate::core::error::TandemError;
use crate::core::model::{
    Assertion, AssertionKey, Node, Opinion, Phase, Rating, ResourceId, SourceKind,
};
use crate::core::schema::{self, ASSERTIONS_TABLE};

/// One pending opinion write, addressed by identity key.
#[derive(Debug, Clone)]
pub struct OpinionWrite {
    pub key: AssertionKey,
    pub opinion: Opinion,
}

/// Sparse filter criteria. Every field is optional; `None` is a wildcard.
/// When `source` is unspecified, the agent/rating/confidence filters are
/// distributed across both opinion slots and joined by OR.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub subject: Option<ResourceId>,
    pub predicate: Option<ResourceId>,
    pub object: Option<Node>,
    pub phase: Option<Phase>,
    pub source: Option<SourceKind>,
    pub agent: Option<String>,
    pub rating: Option<Rating>,
    pub min_confidence: Option<f64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: impl Into<ResourceId>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn predicate(mut self, predicate: impl Into<ResourceId>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn object(mut self, object: Node) -> Self {
        self.object = Some(object);
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn source(mut self, source: SourceKind) -> Self {
        self.source = Some(source);
        self
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn rating(mut self, rating: Rating) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    fn has_opinion_filter(&self) -> bool {
        self.agent.is_some() || self.rating.is_some() || self.min_confidence.is_some()
    }
}

fn upsert_sql(kind: SourceKind) -> String {
    let cols = schema::opinion_columns(kind);
    let updates: Vec<String> = cols
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "INSERT INTO {table}(subject, predicate, object, phase, {c0}, {c1}, {c2}, {c3})
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(subject, predicate, object, phase) DO UPDATE SET {updates}",
        table = ASSERTIONS_TABLE,
        c0 = cols[0],
        c1 = cols[1],
        c2 = cols[2],
        c3 = cols[3],
        updates = updates.join(", "),
    )
}

/// Flushes one source kind's batch through a single prepared statement.
/// The statement handle lives only as long as the transaction; it is
/// rebuilt for the next one.
pub fn flush_batch(
    tx: &Transaction,
    kind: SourceKind,
    rows: &[OpinionWrite],
) -> Result<(), TandemError> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = upsert_sql(kind);
    let mut stmt = tx.prepare(&sql)?;
    for write in rows {
        stmt.execute(params![
            write.key.statement.subject.as_str(),
            write.key.statement.predicate.as_str(),
            write.key.statement.object.encode(),
            write.key.phase.as_str(),
            write.opinion.rating.as_str(),
            write.opinion.agent,
            write.opinion.confidence,
            write.opinion.observed_at.to_rfc3339(),
        ])?;
    }
    Ok(())
}

const SELECT_COLUMNS: &str = "subject, predicate, object, phase, \
     artificial_rating, artificial_agent, artificial_confidence, artificial_observed_at, \
     natural_rating, natural_agent, natural_confidence, natural_observed_at";

#[derive(Debug)]
struct RawGroup {
    rating: Option<String>,
    agent: Option<String>,
    confidence: Option<f64>,
    observed_at: Option<String>,
}

#[derive(Debug)]
struct RawRow {
    subject: String,
    predicate: String,
    object: String,
    phase: String,
    artificial: RawGroup,
    natural: RawGroup,
}

fn read_raw_row(row: &Row) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        subject: row.get(0)?,
        predicate: row.get(1)?,
        object: row.get(2)?,
        phase: row.get(3)?,
        artificial: RawGroup {
            rating: row.get(4)?,
            agent: row.get(5)?,
            confidence: row.get(6)?,
            observed_at: row.get(7)?,
        },
        natural: RawGroup {
            rating: row.get(8)?,
            agent: row.get(9)?,
            confidence: row.get(10)?,
            observed_at: row.get(11)?,
        },
    })
}

fn decode_group(kind: SourceKind, raw: RawGroup) -> Result<Option<Opinion>, TandemError> {
    let Some(rating_raw) = raw.rating else {
        return Ok(None);
    };
    let rating = Rating::parse(&rating_raw).ok_or_else(|| {
        TandemError::MalformedStatement(format!("unknown {} rating '{}'", kind, rating_raw))
    })?;
    let agent = raw.agent.ok_or_else(|| {
        TandemError::MalformedStatement(format!("{} opinion row lacks an agent", kind))
    })?;
    let confidence = raw.confidence.ok_or_else(|| {
        TandemError::MalformedStatement(format!("{} opinion row lacks a confidence", kind))
    })?;
    let observed_raw = raw.observed_at.ok_or_else(|| {
        TandemError::MalformedStatement(format!("{} opinion row lacks a timestamp", kind))
    })?;
    let observed_at = chrono::DateTime::parse_from_rfc3339(&observed_raw)
        .map_err(|e| {
            TandemError::MalformedStatement(format!(
                "unreadable {} timestamp '{}': {}",
                kind, observed_raw, e
            ))
        })?
        .with_timezone(&chrono::Utc);
    Ok(Some(Opinion {
        source: kind,
        agent,
        observed_at,
        rating,
        confidence,
    }))
}

/// Decodes one row. `Ok(None)` marks a row with neither opinion group
/// populated (transient state); malformed encodings abort this row only.
fn decode_row(raw: RawRow) -> Result<Option<Assertion>, TandemError> {
    let object = Node::parse(&raw.object)?;
    let statement = crate::core::model::Statement::new(
        ResourceId::new(raw.subject),
        ResourceId::new(raw.predicate),
        object,
    );
    let phase = Phase::from_name(&raw.phase);
    let artificial = decode_group(SourceKind::Artificial, raw.artificial)?;
    let natural = decode_group(SourceKind::Natural, raw.natural)?;
    if artificial.is_none() && natural.is_none() {
        return Ok(None);
    }
    Assertion::new(statement, phase, artificial, natural).map(Some)
}

fn group_clause(kind: SourceKind, q: &Query, params: &mut Vec<Box<dyn ToSql>>) -> String {
    let prefix = kind.column_prefix();
    // Presence flag first: a row whose other slot matched must not pass an
    // empty group through the value filters.
    let mut parts = vec![format!("{prefix}rating IS NOT NULL")];
    if let Some(agent) = &q.agent {
        parts.push(format!("{prefix}agent = ?"));
        params.push(Box::new(agent.clone()));
    }
    if let Some(rating) = &q.rating {
        parts.push(format!("{prefix}rating = ?"));
        params.push(Box::new(rating.as_str().to_string()));
    }
    if let Some(min) = q.min_confidence {
        parts.push(format!("{prefix}confidence >= ?"));
        params.push(Box::new(min));
    }
    format!("({})", parts.join(" AND "))
}

/// Builds the WHERE clause dynamically from the present criteria.
pub fn build_query_sql(q: &Query) -> (String, Vec<Box<dyn ToSql>>) {
    let mut sql = format!("SELECT {} FROM {} WHERE 1=1", SELECT_COLUMNS, ASSERTIONS_TABLE);
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(subject) = &q.subject {
        sql.push_str(" AND subject = ?");
        params.push(Box::new(subject.as_str().to_string()));
    }
    if let Some(predicate) = &q.predicate {
        sql.push_str(" AND predicate = ?");
        params.push(Box::new(predicate.as_str().to_string()));
    }
    if let Some(object) = &q.object {
        sql.push_str(" AND object = ?");
        params.push(Box::new(object.encode()));
    }
    if let Some(phase) = &q.phase {
        sql.push_str(" AND phase = ?");
        params.push(Box::new(phase.as_str().to_string()));
    }

    match q.source {
        Some(kind) => {
            sql.push_str(" AND ");
            let clause = group_clause(kind, q, &mut params);
            sql.push_str(&clause);
        }
        None if q.has_opinion_filter() => {
            let left = group_clause(SourceKind::Artificial, q, &mut params);
            let right = group_clause(SourceKind::Natural, q, &mut params);
            sql.push_str(&format!(" AND ({} OR {})", left, right));
        }
        None => {}
    }

    sql.push_str(" ORDER BY subject, predicate, object, phase");
    (sql, params)
}

/// Runs a query and materializes matching assertions. Rows with a corrupt
/// encoding are skipped; rows with no opinion group are ignored.
pub fn run_query(conn: &Connection, q: &Query) -> Result<Vec<Assertion>, TandemError> {
    let mut results = Vec::new();
    scan_query(conn, q, &mut |assertion| {
        results.push(assertion);
        Ok(())
    })?;
    Ok(results)
}

/// Forward-only, non-restartable row walk. The sink sees each decoded
/// assertion without the result set being materialized. Returns the number
/// of corrupt rows skipped.
pub fn scan_query(
    conn: &Connection,
    q: &Query,
    sink: &mut dyn FnMut(Assertion) -> Result<(), TandemError>,
) -> Result<usize, TandemError> {
    let (sql, params) = build_query_sql(q);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params.iter().map(|p| p.as_ref())))?;
    let mut skipped = 0usize;
    while let Some(row) = rows.next()? {
        let raw = read_raw_row(row)?;
        match decode_row(raw) {
            Ok(Some(assertion)) => sink(assertion)?,
            Ok(None) => {}
            Err(TandemError::MalformedStatement(_)) => skipped += 1,
            Err(other) => return Err(other),
        }
    }
    Ok(skipped)
}

/// Strict single-row fetch by identity key. Corruption surfaces here
/// because the write path depends on the answer.
pub fn find_by_key(conn: &Connection, key: &AssertionKey) -> Result<Option<Assertion>, TandemError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE subject = ?1 AND predicate = ?2 AND object = ?3 AND phase = ?4",
        SELECT_COLUMNS, ASSERTIONS_TABLE
    );
    let raw = conn
        .query_row(
            &sql,
            params![
                key.statement.subject.as_str(),
                key.statement.predicate.as_str(),
                key.statement.object.encode(),
                key.phase.as_str(),
            ],
            read_raw_row,
        )
        .optional()?;
    match raw {
        Some(raw) => decode_row(raw),
        None => Ok(None),
    }
}

/// Deletes every assertion mentioning the resource: as subject, as the
/// exact object resource, or embedded inside the object's literal
/// representation. Immediate and atomic; not routed through the buffer.
pub fn remove_all_about(conn: &Connection, resource: &ResourceId) -> Result<usize, TandemError> {
    let sql = format!(
        "DELETE FROM {} WHERE subject = ?1 OR object = ?2 OR instr(object, ?1) > 0",
        ASSERTIONS_TABLE
    );
    let deleted = conn.execute(
        &sql,
        params![
            resource.as_str(),
            Node::Resource(resource.clone()).encode()
        ],
    )?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db;
    use chrono::{TimeZone, Utc};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        db::initialize_schema(&conn).expect("schema");
        conn
    }

    fn write(
        key: &AssertionKey,
        source: SourceKind,
        agent: &str,
        rating: Rating,
        confidence: f64,
    ) -> OpinionWrite {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap();
        OpinionWrite {
            key: key.clone(),
            opinion: Opinion::new(source, agent, ts, rating, confidence).unwrap(),
        }
    }

    fn key(subject: &str, object: Node) -> AssertionKey {
        AssertionKey {
            statement: crate::core::model::Statement::new(subject, "hasTopic", object),
            phase: Phase::ConceptDiscovery,
        }
    }

    fn flush(conn: &mut Connection, kind: SourceKind, rows: &[OpinionWrite]) {
        let tx = conn.transaction().unwrap();
        flush_batch(&tx, kind, rows).unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn upsert_inserts_then_updates_one_group_only() {
        let mut c = conn();
        let k = key("fileA", Node::resource("conceptX"));

        flush(
            &mut c,
            SourceKind::Artificial,
            &[write(&k, SourceKind::Artificial, "engine", Rating::Positive, 0.8)],
        );
        flush(
            &mut c,
            SourceKind::Natural,
            &[write(&k, SourceKind::Natural, "alice", Rating::Negative, 1.0)],
        );
        // Second artificial write must leave the natural group untouched.
        flush(
            &mut c,
            SourceKind::Artificial,
            &[write(&k, SourceKind::Artificial, "engine", Rating::Undecided, 0.4)],
        );

        let found = find_by_key(&c, &k).unwrap().unwrap();
        assert_eq!(found.artificial.as_ref().unwrap().rating, Rating::Undecided);
        assert_eq!(found.natural.as_ref().unwrap().agent, "alice");
        assert_eq!(found.natural.as_ref().unwrap().rating, Rating::Negative);

        let count: i64 = c
            .query_row("SELECT COUNT(*) FROM assertions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn same_triple_in_two_phases_is_two_rows() {
        let mut c = conn();
        let k1 = key("fileA", Node::resource("conceptX"));
        let mut k2 = k1.clone();
        k2.phase = Phase::TaxonomyDerivation;

        flush(
            &mut c,
            SourceKind::Artificial,
            &[
                write(&k1, SourceKind::Artificial, "engine", Rating::Positive, 0.9),
                write(&k2, SourceKind::Artificial, "engine", Rating::Negative, 0.2),
            ],
        );

        let count: i64 = c
            .query_row("SELECT COUNT(*) FROM assertions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            find_by_key(&c, &k1).unwrap().unwrap().artificial.unwrap().rating,
            Rating::Positive
        );
    }

    #[test]
    fn source_agnostic_filters_distribute_across_groups() {
        let q = Query::new().rating(Rating::Positive).min_confidence(0.5);
        let (sql, params) = build_query_sql(&q);
        assert!(sql.contains("artificial_rating IS NOT NULL"));
        assert!(sql.contains("natural_rating IS NOT NULL"));
        assert!(sql.contains(" OR "));
        // rating + confidence per group
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn sourced_query_filters_one_group() {
        let q = Query::new()
            .source(SourceKind::Natural)
            .agent("alice".to_string());
        let (sql, params) = build_query_sql(&q);
        assert!(sql.contains("natural_agent = ?"));
        assert!(!sql.contains("artificial_agent"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn or_semantics_match_either_slot() {
        let mut c = conn();
        let k = key("fileA", Node::resource("conceptX"));
        flush(
            &mut c,
            SourceKind::Artificial,
            &[write(&k, SourceKind::Artificial, "engine", Rating::Negative, 0.7)],
        );
        flush(
            &mut c,
            SourceKind::Natural,
            &[write(&k, SourceKind::Natural, "alice", Rating::Positive, 1.0)],
        );

        let hits = run_query(&c, &Query::new().rating(Rating::Positive)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].primary().unwrap().agent, "alice");

        let negative_hits = run_query(&c, &Query::new().rating(Rating::Negative)).unwrap();
        assert_eq!(negative_hits.len(), 1);
    }

    #[test]
    fn malformed_object_rows_are_skipped_not_fatal() {
        let mut c = conn();
        let k = key("fileA", Node::resource("conceptX"));
        flush(
            &mut c,
            SourceKind::Artificial,
            &[write(&k, SourceKind::Artificial, "engine", Rating::Positive, 0.8)],
        );
        c.execute(
            "INSERT INTO assertions(subject, predicate, object, phase, artificial_rating,
                 artificial_agent, artificial_confidence, artificial_observed_at)
             VALUES('fileB', 'hasTopic', 'no-prefix-garbage', 'concept_discovery',
                 'positive', 'engine', 0.5, '2026-03-14T10:00:00+00:00')",
            [],
        )
        .unwrap();

        let mut seen = 0usize;
        let skipped = scan_query(&c, &Query::new(), &mut |_| {
            seen += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn remove_all_about_reaches_subject_object_and_literal() {
        let mut c = conn();
        let doomed = ResourceId::new("conceptX");
        let as_subject = key("conceptX", Node::literal("label"));
        let as_object = key("fileA", Node::resource("conceptX"));
        let embedded = key("fileB", Node::literal("mentions conceptX inline"));
        let survivor = key("fileC", Node::resource("conceptY"));

        flush(
            &mut c,
            SourceKind::Artificial,
            &[
                write(&as_subject, SourceKind::Artificial, "engine", Rating::Positive, 0.9),
                write(&as_object, SourceKind::Artificial, "engine", Rating::Positive, 0.9),
                write(&embedded, SourceKind::Artificial, "engine", Rating::Positive, 0.9),
                write(&survivor, SourceKind::Artificial, "engine", Rating::Positive, 0.9),
            ],
        );

        let deleted = remove_all_about(&c, &doomed).unwrap();
        assert_eq!(deleted, 3);
        let remaining = run_query(&c, &Query::new()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].statement.subject.as_str(), "fileC");
    }
}

//! Relational schema for the assertion store.
//!
//! Column lists are explicit descriptors consumed by a generic DDL builder.
//! The two opinion column groups are derived from one suffix list so the
//! artificial and natural groups can never drift apart.

use crate::core::model::SourceKind;

pub const ASSERTIONS_TABLE: &str = "assertions";
pub const META_TABLE: &str = "meta";
pub const SCHEMA_VERSION: u32 = 1;

/// What a column means, mapped to a storage class by the DDL builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Identifier,
    Text,
    Rating,
    Confidence,
    Timestamp,
}

impl SemanticType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            SemanticType::Confidence => "REAL",
            _ => "TEXT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub semantic: SemanticType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, semantic: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic,
        }
    }
}

/// Table descriptor: key columns become a composite primary key and are
/// NOT NULL; data columns are nullable (an opinion group may be absent).
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: &'static str,
    pub key: Vec<ColumnSpec>,
    pub data: Vec<ColumnSpec>,
}

/// Renders `CREATE TABLE IF NOT EXISTS` DDL from a descriptor.
pub fn create_table_sql(spec: &TableSpec) -> String {
    let mut cols = Vec::new();
    for c in &spec.key {
        cols.push(format!("{} {} NOT NULL", c.name, c.semantic.sql_type()));
    }
    for c in &spec.data {
        cols.push(format!("{} {}", c.name, c.semantic.sql_type()));
    }
    let key_names: Vec<&str> = spec.key.iter().map(|c| c.name.as_str()).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {},\n    PRIMARY KEY({})\n)",
        spec.name,
        cols.join(",\n    "),
        key_names.join(", ")
    )
}

/// Suffixes of one opinion column group, in persisted order.
pub const OPINION_COLUMN_SUFFIXES: [(&str, SemanticType); 4] = [
    ("rating", SemanticType::Rating),
    ("agent", SemanticType::Identifier),
    ("confidence", SemanticType::Confidence),
    ("observed_at", SemanticType::Timestamp),
];

/// Fully-prefixed column names of one source kind's group.
pub fn opinion_columns(kind: SourceKind) -> Vec<String> {
    OPINION_COLUMN_SUFFIXES
        .iter()
        .map(|(suffix, _)| format!("{}{}", kind.column_prefix(), suffix))
        .collect()
}

/// The assertions table: identity key (subject, predicate, object, phase)
/// plus one nullable column group per source kind.
pub fn assertions_table_spec() -> TableSpec {
    let mut data = Vec::new();
    for kind in SourceKind::ALL {
        for (suffix, semantic) in OPINION_COLUMN_SUFFIXES {
            data.push(ColumnSpec::new(
                format!("{}{}", kind.column_prefix(), suffix),
                semantic,
            ));
        }
    }
    TableSpec {
        name: ASSERTIONS_TABLE,
        key: vec![
            ColumnSpec::new("subject", SemanticType::Identifier),
            ColumnSpec::new("predicate", SemanticType::Identifier),
            ColumnSpec::new("object", SemanticType::Text),
            ColumnSpec::new("phase", SemanticType::Identifier),
        ],
        data,
    }
}

pub fn meta_table_spec() -> TableSpec {
    TableSpec {
        name: META_TABLE,
        key: vec![ColumnSpec::new("key", SemanticType::Identifier)],
        data: vec![ColumnSpec::new("value", SemanticType::Text)],
    }
}

pub fn assertions_index_sql() -> Vec<String> {
    vec![
        format!(
            "CREATE INDEX IF NOT EXISTS idx_assertions_subject ON {}(subject)",
            ASSERTIONS_TABLE
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_assertions_phase ON {}(phase)",
            ASSERTIONS_TABLE
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertions_ddl_has_identity_key_and_both_groups() {
        let sql = create_table_sql(&assertions_table_spec());
        assert!(sql.contains("PRIMARY KEY(subject, predicate, object, phase)"));
        assert!(sql.contains("artificial_rating TEXT"));
        assert!(sql.contains("natural_observed_at TEXT"));
        assert!(sql.contains("artificial_confidence REAL"));
        assert!(sql.contains("subject TEXT NOT NULL"));
    }

    #[test]
    fn opinion_groups_share_one_suffix_list() {
        let art = opinion_columns(SourceKind::Artificial);
        let nat = opinion_columns(SourceKind::Natural);
        assert_eq!(art.len(), nat.len());
        for (a, n) in art.iter().zip(nat.iter()) {
            assert_eq!(
                a.strip_prefix("artificial_").unwrap(),
                n.strip_prefix("natural_").unwrap()
            );
        }
    }

    #[test]
    fn meta_ddl_is_key_value() {
        let sql = create_table_sql(&meta_table_spec());
        assert!(sql.contains("key TEXT NOT NULL"));
        assert!(sql.contains("PRIMARY KEY(key)"));
    }
}

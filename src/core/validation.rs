//! Advisory schema linter
//!
//! Warnings never block an action. They are recomputed from the current model
//! on every call.

use crate::core::schema::{FieldId, RelationshipId, Schema, TableId};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

/// Maximum length for identifiers (MySQL standard)
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// SQL reserved keywords that cannot be used as identifiers without quoting.
/// Combined from MySQL, PostgreSQL and the SQL standard.
static RESERVED_KEYWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "ADD", "ALL", "ALTER", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY", "AS", "ASC",
        "ASYMMETRIC", "AUTHORIZATION", "AUTO_INCREMENT", "BETWEEN", "BIGINT", "BINARY", "BLOB",
        "BOOL", "BOOLEAN", "BOTH", "BY", "CASE", "CAST", "CHANGE", "CHAR", "CHARACTER", "CHECK",
        "COLLATE", "COLUMN", "CONCURRENTLY", "CONSTRAINT", "CREATE", "CROSS", "CURRENT",
        "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER", "DATABASE", "DATE",
        "DATETIME", "DECIMAL", "DEFAULT", "DEFERRABLE", "DELETE", "DESC", "DISTINCT", "DO",
        "DOUBLE", "DROP", "ELSE", "END", "ENUM", "EXCEPT", "EXISTS", "EXPLAIN", "FALSE",
        "FETCH", "FLOAT", "FOR", "FORCE", "FOREIGN", "FREEZE", "FROM", "FULL", "GRANT", "GROUP",
        "HAVING", "IF", "IGNORE", "ILIKE", "IN", "INDEX", "INITIALLY", "INNER", "INSERT", "INT",
        "INTEGER", "INTERSECT", "INTERVAL", "INTO", "IS", "ISNULL", "JOIN", "KEY", "LATERAL",
        "LEADING", "LEFT", "LIKE", "LIMIT", "LOCALTIME", "LOCALTIMESTAMP", "LONGBLOB",
        "LONGTEXT", "MEDIUMBLOB", "MEDIUMINT", "MEDIUMTEXT", "MODIFY", "NATURAL", "NOT",
        "NOTNULL", "NULL", "NUMERIC", "OFFSET", "ON", "ONLY", "OR", "ORDER", "OUTER",
        "OVERLAPS", "PLACING", "PRIMARY", "PROCEDURE", "REAL", "REFERENCES", "RENAME",
        "REPLACE", "RETURNING", "RIGHT", "SCHEMA", "SELECT", "SESSION_USER", "SET", "SHOW",
        "SIMILAR", "SMALLINT", "SOME", "SYMMETRIC", "TABLE", "TABLESAMPLE", "TEXT", "THEN",
        "TIME", "TIMESTAMP", "TINYBLOB", "TINYINT", "TINYTEXT", "TO", "TRAILING", "TRIGGER",
        "TRUE", "TRUNCATE", "UNION", "UNIQUE", "UNSIGNED", "UPDATE", "USING", "VALUES",
        "VARBINARY", "VARCHAR", "VARIADIC", "VERBOSE", "VIEW", "WHEN", "WHERE", "WINDOW",
        "WITH", "YEAR", "ZEROFILL",
    ]
    .into_iter()
    .collect()
});

pub fn is_reserved_keyword(name: &str) -> bool {
    RESERVED_KEYWORDS.contains(name.trim().to_uppercase().as_str())
}

/// Why a name breaks DDL export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierProblem {
    Empty,
    TooLong { max: usize, actual: usize },
    InvalidCharacters { invalid: Vec<char> },
    StartsWithDigit,
    ReservedKeyword,
}

impl fmt::Display for IdentifierProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierProblem::Empty => write!(f, "name cannot be empty"),
            IdentifierProblem::TooLong { max, actual } => {
                write!(f, "name is too long ({} chars, max {})", actual, max)
            }
            IdentifierProblem::InvalidCharacters { invalid } => {
                let chars: String = invalid.iter().collect();
                write!(
                    f,
                    "name contains invalid characters: '{}'. Only letters, numbers, and underscores are allowed",
                    chars
                )
            }
            IdentifierProblem::StartsWithDigit => write!(f, "name cannot start with a digit"),
            IdentifierProblem::ReservedKeyword => write!(f, "name is a reserved SQL keyword"),
        }
    }
}

/// First problem found with `name`, if any
pub fn identifier_problem(name: &str) -> Option<IdentifierProblem> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Some(IdentifierProblem::Empty);
    }
    if trimmed.len() > MAX_IDENTIFIER_LENGTH {
        return Some(IdentifierProblem::TooLong {
            max: MAX_IDENTIFIER_LENGTH,
            actual: trimmed.len(),
        });
    }
    let invalid: Vec<char> = trimmed
        .chars()
        .filter(|c| !c.is_ascii_alphanumeric() && *c != '_')
        .collect();
    if !invalid.is_empty() {
        return Some(IdentifierProblem::InvalidCharacters { invalid });
    }
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        return Some(IdentifierProblem::StartsWithDigit);
    }
    if is_reserved_keyword(trimmed) {
        return Some(IdentifierProblem::ReservedKeyword);
    }
    None
}

/// Tagged advisory warning
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaWarning {
    /// No relationship touches the table (reported only with two or more tables)
    OrphanTable { table_id: TableId, name: String },
    /// Two or more tables share a name, ignoring case
    DuplicateTableName { name: String, table_ids: Vec<TableId> },
    MissingPrimaryKey { table_id: TableId, name: String },
    EmptyTable { table_id: TableId, name: String },
    DanglingRelationship {
        relationship_id: RelationshipId,
        missing_table_id: TableId,
    },
    InvalidIdentifier {
        table_id: TableId,
        field_id: Option<FieldId>,
        name: String,
        problem: IdentifierProblem,
    },
}

impl SchemaWarning {
    pub fn code(&self) -> &'static str {
        match self {
            SchemaWarning::OrphanTable { .. } => "orphan_table",
            SchemaWarning::DuplicateTableName { .. } => "duplicate_table_name",
            SchemaWarning::MissingPrimaryKey { .. } => "missing_primary_key",
            SchemaWarning::EmptyTable { .. } => "empty_table",
            SchemaWarning::DanglingRelationship { .. } => "dangling_relationship",
            SchemaWarning::InvalidIdentifier { .. } => "invalid_identifier",
        }
    }

    /// Table to highlight in the editor
    pub fn table_id(&self) -> Option<&str> {
        match self {
            SchemaWarning::OrphanTable { table_id, .. }
            | SchemaWarning::MissingPrimaryKey { table_id, .. }
            | SchemaWarning::EmptyTable { table_id, .. }
            | SchemaWarning::InvalidIdentifier { table_id, .. } => Some(table_id),
            SchemaWarning::DuplicateTableName { table_ids, .. } => {
                table_ids.first().map(String::as_str)
            }
            SchemaWarning::DanglingRelationship { .. } => None,
        }
    }
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaWarning::OrphanTable { name, .. } => {
                write!(f, "Table '{}' has no relationships", name)
            }
            SchemaWarning::DuplicateTableName { name, table_ids } => {
                write!(f, "{} tables are named '{}'", table_ids.len(), name)
            }
            SchemaWarning::MissingPrimaryKey { name, .. } => {
                write!(f, "Table '{}' has no primary key", name)
            }
            SchemaWarning::EmptyTable { name, .. } => write!(f, "Table '{}' has no fields", name),
            SchemaWarning::DanglingRelationship {
                relationship_id,
                missing_table_id,
            } => write!(
                f,
                "Relationship '{}' references missing table '{}'",
                relationship_id, missing_table_id
            ),
            SchemaWarning::InvalidIdentifier { name, problem, .. } => {
                write!(f, "'{}': {}", name, problem)
            }
        }
    }
}

/// Lint the whole schema; warnings come grouped by rule, tables in model order
pub fn validate_schema(schema: &Schema) -> Vec<SchemaWarning> {
    let mut warnings = Vec::new();

    if schema.tables.len() > 1 {
        for table in &schema.tables {
            let connected = schema.valid_relationships().any(|r| r.touches(&table.id));
            if !connected {
                warnings.push(SchemaWarning::OrphanTable {
                    table_id: table.id.clone(),
                    name: table.name.clone(),
                });
            }
        }
    }

    let mut reported: HashSet<String> = HashSet::new();
    for table in &schema.tables {
        let key = table.name.to_lowercase();
        if reported.contains(&key) {
            continue;
        }
        let table_ids: Vec<TableId> = schema
            .tables
            .iter()
            .filter(|t| t.name.to_lowercase() == key)
            .map(|t| t.id.clone())
            .collect();
        if table_ids.len() > 1 {
            warnings.push(SchemaWarning::DuplicateTableName {
                name: table.name.clone(),
                table_ids,
            });
            reported.insert(key);
        }
    }

    for table in &schema.tables {
        if table.primary_key().is_none() {
            warnings.push(SchemaWarning::MissingPrimaryKey {
                table_id: table.id.clone(),
                name: table.name.clone(),
            });
        }
    }

    for table in schema.tables.iter().filter(|t| t.fields.is_empty()) {
        warnings.push(SchemaWarning::EmptyTable {
            table_id: table.id.clone(),
            name: table.name.clone(),
        });
    }

    for rel in &schema.relationships {
        for table_id in [&rel.from_table_id, &rel.to_table_id] {
            if schema.table(table_id).is_none() {
                warnings.push(SchemaWarning::DanglingRelationship {
                    relationship_id: rel.id.clone(),
                    missing_table_id: table_id.clone(),
                });
                break;
            }
        }
    }

    for table in &schema.tables {
        if let Some(problem) = identifier_problem(&table.name) {
            warnings.push(SchemaWarning::InvalidIdentifier {
                table_id: table.id.clone(),
                field_id: None,
                name: table.name.clone(),
                problem,
            });
        }
        for field in &table.fields {
            if let Some(problem) = identifier_problem(&field.name) {
                warnings.push(SchemaWarning::InvalidIdentifier {
                    table_id: table.id.clone(),
                    field_id: Some(field.id.clone()),
                    name: field.name.clone(),
                    problem,
                });
            }
        }
    }

    warnings
}

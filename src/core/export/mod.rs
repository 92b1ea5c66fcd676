//! Schema exporters
//!
//! Every renderer reads the same [`Schema`] and skips invalid relationships.
//! The ORM dialects share [`plan_relations`], which decides accessor and
//! foreign-key names once so both outputs agree.

pub mod fake_data;
pub mod json;
pub mod prisma;
pub mod sql;
pub mod typeorm;

use crate::core::foreign_keys::foreign_key_name;
use crate::core::schema::{Cardinality, Field, Relationship, Schema, Table, TableId};
use derive_more::Display;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

pub use fake_data::FakeDataGenerator;

/// Default number of generated rows per table
pub const DEFAULT_EXPORT_ROWS: usize = 10;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to serialize export: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum ExportFormat {
    #[display("sql")]
    Sql,
    #[display("json")]
    Json,
    #[display("prisma")]
    Prisma,
    #[display("typeorm")]
    TypeOrm,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Sql,
        ExportFormat::Json,
        ExportFormat::Prisma,
        ExportFormat::TypeOrm,
    ];

    /// Suggested download name
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::Sql => "schema.sql",
            ExportFormat::Json => "schema.json",
            ExportFormat::Prisma => "schema.prisma",
            ExportFormat::TypeOrm => "entities.ts",
        }
    }

    pub fn supports_fake_data(&self) -> bool {
        matches!(self, ExportFormat::Sql | ExportFormat::Json)
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" | "ddl" => Ok(ExportFormat::Sql),
            "json" => Ok(ExportFormat::Json),
            "prisma" => Ok(ExportFormat::Prisma),
            "typeorm" | "ts" => Ok(ExportFormat::TypeOrm),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// Export settings of a session
#[derive(Clone, Debug, PartialEq)]
pub struct ExportOptions {
    pub with_fake_data: bool,
    /// Per-table row count overrides
    pub row_counts: HashMap<TableId, usize>,
    pub default_rows: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            with_fake_data: false,
            row_counts: HashMap::new(),
            default_rows: DEFAULT_EXPORT_ROWS,
        }
    }
}

impl ExportOptions {
    pub fn with_fake_data(mut self, rows: usize) -> Self {
        self.with_fake_data = true;
        self.default_rows = rows;
        self
    }

    pub fn rows_for(&self, table_id: &str) -> usize {
        self.row_counts
            .get(table_id)
            .copied()
            .unwrap_or(self.default_rows)
    }

    pub fn set_rows(&mut self, table_id: impl Into<TableId>, rows: usize) {
        self.row_counts.insert(table_id.into(), rows);
    }
}

/// Rendered document ready for download
#[derive(Clone, Debug, PartialEq)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub file_name: String,
    pub content: String,
}

/// Render `schema` in `format`. The rng only feeds fake data.
pub fn export_schema<R: Rng>(
    schema: &Schema,
    format: ExportFormat,
    options: &ExportOptions,
    rng: &mut R,
) -> Result<ExportArtifact, ExportError> {
    let content = match format {
        ExportFormat::Sql => sql::export_sql(schema, options, rng),
        ExportFormat::Json => json::export_json(schema, options, rng)?,
        ExportFormat::Prisma => prisma::export_prisma(schema),
        ExportFormat::TypeOrm => typeorm::export_typeorm(schema),
    };
    debug!(%format, bytes = content.len(), "exported schema");
    Ok(ExportArtifact {
        format,
        file_name: format.file_name().to_string(),
        content,
    })
}

// ============================================================================
// Naming helpers shared by renderers
// ============================================================================

/// `order_items` -> `OrderItems`; never empty, never starts with a digit
pub fn pascal_case(name: &str) -> String {
    let mut out = String::new();
    for part in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'T');
    }
    out
}

/// `OrderItems` -> `orderItems`
pub fn camel_case(name: &str) -> String {
    let pascal = pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => pascal,
    }
}

/// Naive English plural for collection accessors; names already ending in a
/// single `s` are kept as they are
pub fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.ends_with("ss") || lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh")
    {
        format!("{word}es")
    } else if lower.ends_with('s') {
        word.to_string()
    } else if lower.ends_with('y')
        && !matches!(
            lower.chars().rev().nth(1),
            Some('a' | 'e' | 'i' | 'o' | 'u')
        )
    {
        format!("{}ies", &word[..word.len() - 1])
    } else {
        format!("{word}s")
    }
}

/// Field name usable as an identifier in generated code
pub fn field_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Scalar foreign key required on the target model of a 1:1 or 1:N relation
#[derive(Clone, Debug, PartialEq)]
pub struct ForeignKeyColumn {
    pub name: String,
    /// The schema holds no such field; renderers must emit it themselves
    pub synthesized: bool,
}

/// Naming decisions for one valid relationship
#[derive(Clone, Debug)]
pub struct RelationPlan<'a> {
    pub relationship: &'a Relationship,
    pub source: &'a Table,
    pub target: &'a Table,
    /// Unique relation label, e.g. `UserPost`
    pub name: String,
    /// Accessor declared on the source model, pointing at the target
    pub source_accessor: String,
    /// Accessor declared on the target model, pointing at the source
    pub target_accessor: String,
    pub foreign_key: Option<ForeignKeyColumn>,
}

impl RelationPlan<'_> {
    pub fn cardinality(&self) -> Cardinality {
        self.relationship.cardinality
    }
}

struct NameRegistry {
    taken: HashMap<TableId, HashSet<String>>,
}

impl NameRegistry {
    fn new(schema: &Schema) -> Self {
        let taken = schema
            .tables
            .iter()
            .map(|t| {
                let names = t
                    .fields
                    .iter()
                    .map(|f| field_identifier(&f.name).to_ascii_lowercase())
                    .collect();
                (t.id.clone(), names)
            })
            .collect();
        Self { taken }
    }

    fn claim(&mut self, table_id: &str, wanted: &str) -> String {
        let names = self.taken.entry(table_id.to_string()).or_default();
        let mut candidate = wanted.to_string();
        let mut suffix = 2;
        while names.contains(&candidate.to_ascii_lowercase()) {
            candidate = format!("{wanted}{suffix}");
            suffix += 1;
        }
        names.insert(candidate.to_ascii_lowercase());
        candidate
    }
}

/// The foreign-key field on `table` owned by `relationship`
pub fn foreign_key_field<'a>(table: &'a Table, relationship_id: &str) -> Option<&'a Field> {
    table.fields.iter().find(|f| f.references(relationship_id))
}

/// Plan accessor names for every valid relationship, in model order
pub fn plan_relations(schema: &Schema) -> Vec<RelationPlan<'_>> {
    let mut registry = NameRegistry::new(schema);
    let mut labels: HashSet<String> = HashSet::new();
    let mut plans = Vec::new();

    for rel in schema.valid_relationships() {
        let (Some(source), Some(target)) =
            (schema.table(&rel.from_table_id), schema.table(&rel.to_table_id))
        else {
            continue;
        };

        let base_label = format!("{}{}", pascal_case(&source.name), pascal_case(&target.name));
        let mut name = base_label.clone();
        let mut n = 2;
        while !labels.insert(name.clone()) {
            name = format!("{base_label}{n}");
            n += 1;
        }

        let target_single = camel_case(&target.name);
        let source_single = camel_case(&source.name);
        let (wanted_on_source, wanted_on_target) = match rel.cardinality {
            Cardinality::OneToOne => (target_single, source_single),
            Cardinality::OneToMany => (pluralize(&target_single), source_single),
            Cardinality::ManyToMany => (pluralize(&target_single), pluralize(&source_single)),
        };
        let source_accessor = registry.claim(&source.id, &wanted_on_source);
        let target_accessor = registry.claim(&target.id, &wanted_on_target);

        let foreign_key = match rel.cardinality {
            Cardinality::ManyToMany => None,
            Cardinality::OneToOne | Cardinality::OneToMany => {
                Some(match foreign_key_field(target, &rel.id) {
                    Some(field) => ForeignKeyColumn {
                        name: field_identifier(&field.name),
                        synthesized: false,
                    },
                    None => {
                        let wanted = field_identifier(&foreign_key_name(target, &source.name));
                        ForeignKeyColumn {
                            name: registry.claim(&target.id, &wanted),
                            synthesized: true,
                        }
                    }
                })
            }
        };

        plans.push(RelationPlan {
            relationship: rel,
            source,
            target,
            name,
            source_accessor,
            target_accessor,
            foreign_key,
        });
    }
    plans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::FieldType;

    #[test]
    fn test_case_helpers() {
        assert_eq!(pascal_case("order_items"), "OrderItems");
        assert_eq!(pascal_case("2fa codes"), "T2faCodes");
        assert_eq!(camel_case("User"), "user");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("post"), "posts");
        assert_eq!(pluralize("books"), "books");
        assert_eq!(field_identifier("created at"), "created_at");
    }

    #[test]
    fn test_rows_for_uses_override() {
        let mut options = ExportOptions::default().with_fake_data(3);
        options.set_rows("t1", 0);
        assert_eq!(options.rows_for("t1"), 0);
        assert_eq!(options.rows_for("t2"), 3);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("PRISMA".parse::<ExportFormat>(), Ok(ExportFormat::Prisma));
        assert!("yaml".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::TypeOrm.file_name(), "entities.ts");
    }

    #[test]
    fn test_plan_self_reference_gets_distinct_accessors() {
        let mut schema = Schema::new("s");
        schema.tables.push(
            Table::new("Employee")
                .with_id("e")
                .add_field(Field::new("id", FieldType::Integer).primary_key()),
        );
        schema
            .relationships
            .push(Relationship::new("e", "e", Cardinality::OneToOne).with_id("r"));
        let plans = plan_relations(&schema);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].source_accessor, "employee");
        assert_eq!(plans[0].target_accessor, "employee2");
        let fk = plans[0].foreign_key.as_ref().unwrap();
        assert!(fk.synthesized);
        assert_eq!(fk.name, "EmployeeId");
    }
}

//! Load-time normalization of persisted boards
//!
//! Documents written by older editors carry duck-typed field types ("String",
//! "Money", "UUID"...), inline enum value lists and relationships pointing at
//! tables that no longer exist. Everything is mapped once, here, into the
//! canonical [`Schema`]; no downstream code looks at raw strings.

use crate::core::schema::{
    Cardinality, ConnectionSide, EnumDef, Field, FieldType, Relationship, Schema, Table,
    DEFAULT_TABLE_ICON, new_id,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Field as stored, before normalization
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawField {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_ref: Option<String>,
    /// Legacy inline enum values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_id: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawTable {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub fields: Vec<RawField>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawRelationship {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from_table_id: String,
    #[serde(default)]
    pub to_table_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_side: Option<ConnectionSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_side: Option<ConnectionSide>,
    #[serde(default, rename = "type")]
    pub cardinality: String,
}

/// Board payload shared by the persisted document and the JSON interchange format
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct RawBoardData {
    #[serde(default)]
    pub tables: Vec<RawTable>,
    #[serde(default)]
    pub relationships: Vec<RawRelationship>,
    #[serde(default)]
    pub enums: Vec<EnumDef>,
}

impl From<&Schema> for RawBoardData {
    fn from(schema: &Schema) -> Self {
        Self {
            tables: schema.tables.iter().map(RawTable::from).collect(),
            relationships: schema
                .relationships
                .iter()
                .map(RawRelationship::from)
                .collect(),
            enums: schema.enums.clone(),
        }
    }
}

impl From<&Table> for RawTable {
    fn from(table: &Table) -> Self {
        Self {
            id: table.id.clone(),
            name: table.name.clone(),
            x: table.x,
            y: table.y,
            icon: Some(table.icon.clone()),
            fields: table.fields.iter().map(RawField::from).collect(),
        }
    }
}

impl From<&Field> for RawField {
    fn from(field: &Field) -> Self {
        Self {
            id: field.id.clone(),
            name: field.name.clone(),
            field_type: field.field_type.to_string(),
            faker: field.hint.clone(),
            is_primary: field.is_primary.then_some(true),
            enum_ref: field.enum_ref.clone(),
            enum_values: None,
            relation_id: field.relation_id.clone(),
        }
    }
}

impl From<&Relationship> for RawRelationship {
    fn from(rel: &Relationship) -> Self {
        Self {
            id: rel.id.clone(),
            from_table_id: rel.from_table_id.clone(),
            to_table_id: rel.to_table_id.clone(),
            from_side: rel.from_side,
            to_side: rel.to_side,
            cardinality: rel.cardinality.to_string(),
        }
    }
}

/// What normalization had to change
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NormalizeReport {
    pub dropped_relationships: usize,
    pub migrated_enums: usize,
    pub reassigned_ids: usize,
}

impl NormalizeReport {
    /// True when the normalized model differs from what was stored
    pub fn needs_save(&self) -> bool {
        self.dropped_relationships > 0 || self.migrated_enums > 0 || self.reassigned_ids > 0
    }
}

/// Map a stored type string to its canonical type; unknown strings become string
pub fn canonical_field_type(raw: &str) -> FieldType {
    match raw.trim().to_ascii_lowercase().as_str() {
        "string" | "varchar" | "char" | "email" | "url" => FieldType::String,
        "number" | "money" | "decimal" | "float" | "double" | "numeric" => FieldType::Number,
        "integer" | "int" | "bigint" | "smallint" | "serial" => FieldType::Integer,
        "boolean" | "bool" => FieldType::Boolean,
        "text" | "longtext" => FieldType::Text,
        "date" => FieldType::Date,
        "timestamp" | "datetime" | "time" => FieldType::Timestamp,
        "json" | "jsonb" | "object" => FieldType::Json,
        "uuid" | "guid" => FieldType::Uuid,
        "enum" => FieldType::Enum,
        "relation" => FieldType::Relation,
        _ => FieldType::String,
    }
}

/// Deterministic enum name for a migrated inline value list
pub fn migrated_enum_name(field_id: &str) -> String {
    let sanitized: String = field_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("enum_{}", sanitized)
}

/// Normalize a stored board into the canonical model
pub fn normalize_board(name: impl Into<String>, raw: RawBoardData) -> (Schema, NormalizeReport) {
    let mut report = NormalizeReport::default();
    let mut enums = raw.enums;
    dedupe_enum_names(&mut enums);

    let tables: Vec<Table> = raw
        .tables
        .into_iter()
        .map(|t| normalize_table(t, &mut enums, &mut report))
        .collect();

    let table_ids: HashSet<&str> = tables.iter().map(|t| t.id.as_str()).collect();
    let before = raw.relationships.len();
    let relationships: Vec<Relationship> = raw
        .relationships
        .into_iter()
        .filter(|r| {
            table_ids.contains(r.from_table_id.as_str()) && table_ids.contains(r.to_table_id.as_str())
        })
        .map(|r| Relationship {
            id: if r.id.is_empty() { new_id("rel") } else { r.id },
            from_table_id: r.from_table_id,
            to_table_id: r.to_table_id,
            from_side: r.from_side,
            to_side: r.to_side,
            cardinality: Cardinality::parse(&r.cardinality).unwrap_or_default(),
        })
        .collect();
    report.dropped_relationships = before - relationships.len();
    if report.dropped_relationships > 0 {
        warn!(
            dropped = report.dropped_relationships,
            "dropped relationships referencing missing tables"
        );
    }

    let schema = Schema {
        name: name.into(),
        tables,
        relationships,
        enums,
    };
    (schema, report)
}

fn dedupe_enum_names(enums: &mut Vec<EnumDef>) {
    let mut merged: Vec<EnumDef> = Vec::with_capacity(enums.len());
    for def in enums.drain(..) {
        match merged.iter_mut().find(|e| e.name == def.name) {
            Some(existing) => existing.merge_values(&def.values),
            None => merged.push(def),
        }
    }
    *enums = merged;
}

fn normalize_table(raw: RawTable, enums: &mut Vec<EnumDef>, report: &mut NormalizeReport) -> Table {
    let mut seen: HashSet<String> = HashSet::new();
    let fields = raw
        .fields
        .into_iter()
        .map(|mut f| {
            // ids are settled first, migrated enum names derive from them
            if f.id.is_empty() || !seen.insert(f.id.clone()) {
                f.id = new_id("f");
                seen.insert(f.id.clone());
                report.reassigned_ids += 1;
            }
            normalize_field(f, enums, report)
        })
        .collect();

    let id = if raw.id.is_empty() {
        report.reassigned_ids += 1;
        new_id("table")
    } else {
        raw.id
    };

    Table {
        id,
        name: raw.name,
        x: raw.x,
        y: raw.y,
        icon: raw
            .icon
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE_ICON.to_string()),
        fields,
    }
}

fn normalize_field(raw: RawField, enums: &mut Vec<EnumDef>, report: &mut NormalizeReport) -> Field {
    let field_type = canonical_field_type(&raw.field_type);
    let mut enum_ref = raw.enum_ref.filter(|r| !r.is_empty());

    if field_type == FieldType::Enum {
        let inline = raw.enum_values.unwrap_or_default();
        let resolved = enum_ref
            .as_deref()
            .is_some_and(|name| enums.iter().any(|e| e.name == name));

        if !resolved || !inline.is_empty() {
            let target = enum_ref
                .clone()
                .unwrap_or_else(|| migrated_enum_name(&raw.id));
            match enums.iter_mut().find(|e| e.name == target) {
                Some(existing) => existing.merge_values(&inline),
                None => enums.push(EnumDef {
                    name: target.clone(),
                    values: inline,
                }),
            }
            if !resolved {
                report.migrated_enums += 1;
            }
            enum_ref = Some(target);
        }
    } else {
        enum_ref = None;
    }

    Field {
        id: raw.id,
        name: raw.name,
        field_type,
        hint: raw.faker.filter(|h| !h.is_empty()),
        is_primary: raw.is_primary.unwrap_or(false),
        enum_ref,
        relation_id: raw.relation_id.filter(|r| !r.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_field(id: &str, ty: &str) -> RawField {
        RawField {
            id: id.into(),
            name: id.into(),
            field_type: ty.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_legacy_type_mapping() {
        assert_eq!(canonical_field_type("String"), FieldType::String);
        assert_eq!(canonical_field_type("Money"), FieldType::Number);
        assert_eq!(canonical_field_type("UUID"), FieldType::Uuid);
        assert_eq!(canonical_field_type("Enum"), FieldType::Enum);
        assert_eq!(canonical_field_type("Relation"), FieldType::Relation);
        assert_eq!(canonical_field_type("Geometry"), FieldType::String);
        assert_eq!(canonical_field_type(""), FieldType::String);
    }

    #[test]
    fn test_inline_enum_values_migrate_to_enum_def() {
        let mut field = raw_field("f-7", "Enum");
        field.enum_values = Some(vec!["draft".into(), "live".into()]);
        let raw = RawBoardData {
            tables: vec![RawTable {
                id: "t1".into(),
                name: "posts".into(),
                fields: vec![field],
                ..Default::default()
            }],
            ..Default::default()
        };

        let (schema, report) = normalize_board("b", raw);
        let field = &schema.tables[0].fields[0];
        assert_eq!(field.enum_ref.as_deref(), Some("enum_f_7"));
        assert_eq!(schema.enums.len(), 1);
        assert_eq!(schema.enums[0].values, vec!["draft", "live"]);
        assert_eq!(report.migrated_enums, 1);
        assert!(report.needs_save());
    }

    #[test]
    fn test_inline_values_merge_into_declared_enum() {
        let mut field = raw_field("f-1", "enum");
        field.enum_ref = Some("Status".into());
        field.enum_values = Some(vec!["active".into(), "archived".into()]);
        let raw = RawBoardData {
            tables: vec![RawTable {
                id: "t1".into(),
                fields: vec![field],
                ..Default::default()
            }],
            enums: vec![EnumDef::new("Status", ["active", "banned"])],
            ..Default::default()
        };

        let (schema, report) = normalize_board("b", raw);
        assert_eq!(schema.enums.len(), 1);
        assert_eq!(schema.enums[0].values, vec!["active", "banned", "archived"]);
        assert_eq!(report.migrated_enums, 0);
    }

    #[test]
    fn test_dangling_relationships_dropped() {
        let raw = RawBoardData {
            tables: vec![RawTable {
                id: "t1".into(),
                ..Default::default()
            }],
            relationships: vec![RawRelationship {
                id: "r1".into(),
                from_table_id: "t1".into(),
                to_table_id: "gone".into(),
                cardinality: "1:N".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (schema, report) = normalize_board("b", raw);
        assert!(schema.relationships.is_empty());
        assert_eq!(report.dropped_relationships, 1);
    }

    #[test]
    fn test_unknown_cardinality_defaults_to_one_to_many() {
        let raw = RawBoardData {
            tables: vec![
                RawTable {
                    id: "a".into(),
                    ..Default::default()
                },
                RawTable {
                    id: "b".into(),
                    ..Default::default()
                },
            ],
            relationships: vec![RawRelationship {
                id: "r".into(),
                from_table_id: "a".into(),
                to_table_id: "b".into(),
                cardinality: "many".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (schema, _) = normalize_board("b", raw);
        assert_eq!(schema.relationships[0].cardinality, Cardinality::OneToMany);
    }

    #[test]
    fn test_duplicate_field_ids_are_reassigned() {
        let raw = RawBoardData {
            tables: vec![RawTable {
                id: "t".into(),
                fields: vec![raw_field("f", "string"), raw_field("f", "string")],
                ..Default::default()
            }],
            ..Default::default()
        };
        let (schema, report) = normalize_board("b", raw);
        let fields = &schema.tables[0].fields;
        assert_ne!(fields[0].id, fields[1].id);
        assert_eq!(report.reassigned_ids, 1);
    }

    #[test]
    fn test_inline_enums_without_ids_stay_separate() {
        let mut first = raw_field("", "Enum");
        first.enum_values = Some(vec!["red".into()]);
        let mut second = raw_field("", "Enum");
        second.enum_values = Some(vec!["small".into()]);
        let raw = RawBoardData {
            tables: vec![RawTable {
                id: "t".into(),
                fields: vec![first, second],
                ..Default::default()
            }],
            ..Default::default()
        };

        let (schema, report) = normalize_board("b", raw);
        let fields = &schema.tables[0].fields;
        assert_eq!(report.reassigned_ids, 2);
        assert_eq!(report.migrated_enums, 2);
        assert_eq!(schema.enums.len(), 2);
        assert_ne!(fields[0].enum_ref, fields[1].enum_ref);
        for field in fields {
            let name = field.enum_ref.as_deref().unwrap();
            assert_eq!(name, migrated_enum_name(&field.id));
        }
        assert_eq!(schema.enum_values_for(&fields[0]), ["red".to_string()]);
        assert_eq!(schema.enum_values_for(&fields[1]), ["small".to_string()]);
    }

    #[test]
    fn test_canonical_schema_survives_raw_conversion() {
        let table = Table::new("users")
            .add_field(Field::new("id", FieldType::Uuid).primary_key())
            .add_field(Field::new("role", FieldType::Enum).with_enum("Role"));
        let schema = Schema {
            name: "b".into(),
            tables: vec![table],
            relationships: vec![],
            enums: vec![EnumDef::new("Role", ["admin"])],
        };
        let (back, report) = normalize_board("b", RawBoardData::from(&schema));
        assert_eq!(back, schema);
        assert!(!report.needs_save());
    }
}

//! JSON interchange format: `{tables, relationships, enums, data?}`

use crate::core::export::fake_data::FakeDataGenerator;
use crate::core::export::{ExportError, ExportOptions};
use crate::core::foreign_keys::repair_foreign_keys;
use crate::core::normalize::{NormalizeReport, RawBoardData, normalize_board};
use crate::core::schema::{EnumDef, Relationship, Schema, Table};
use crate::core::sql_parser::ImportError;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Serialize)]
struct Interchange<'a> {
    tables: &'a [Table],
    relationships: Vec<&'a Relationship>,
    enums: &'a [EnumDef],
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<BTreeMap<&'a str, Vec<Map<String, Value>>>>,
}

/// Pretty-printed interchange document; sample rows are keyed by table name
pub fn export_json<R: Rng>(
    schema: &Schema,
    options: &ExportOptions,
    rng: &mut R,
) -> Result<String, ExportError> {
    let data = options.with_fake_data.then(|| {
        let mut generator = FakeDataGenerator::new(&mut *rng);
        schema
            .tables
            .iter()
            .map(|t| {
                let rows = generator.rows(schema, t, options.rows_for(&t.id));
                (t.name.as_str(), rows)
            })
            .collect()
    });
    let document = Interchange {
        tables: &schema.tables,
        relationships: schema.valid_relationships().collect(),
        enums: &schema.enums,
        data,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Result of importing an interchange document
#[derive(Debug, Clone)]
pub struct JsonImport {
    pub schema: Schema,
    pub report: NormalizeReport,
    /// Foreign-key fields added or dropped by the repair pass
    pub repaired_fields: usize,
}

impl JsonImport {
    pub fn needs_save(&self) -> bool {
        self.report.needs_save() || self.repaired_fields > 0
    }
}

/// Parse an interchange document (or any stored board payload) into a
/// normalized, repaired schema. A `data` member is ignored.
pub fn import_json(text: &str, name: &str) -> Result<JsonImport, ImportError> {
    let raw: RawBoardData =
        serde_json::from_str(text).map_err(|e| ImportError::InvalidJson(e.to_string()))?;
    if raw.tables.is_empty() {
        return Err(ImportError::NoTablesFound);
    }
    let (mut schema, report) = normalize_board(name, raw);
    let repaired_fields = repair_foreign_keys(&mut schema);
    debug!(
        tables = schema.tables.len(),
        relationships = schema.relationships.len(),
        repaired_fields,
        "imported JSON board"
    );
    Ok(JsonImport {
        schema,
        report,
        repaired_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Cardinality, Field, FieldType};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn schema() -> Schema {
        let mut schema = Schema::new("shop");
        schema.enums.push(EnumDef::new("Status", ["open", "closed"]));
        schema.tables = vec![
            Table::new("Customer")
                .with_id("c")
                .add_field(Field::new("id", FieldType::Uuid).primary_key())
                .add_field(Field::new("email", FieldType::String).with_hint("email")),
            Table::new("Order")
                .with_id("o")
                .add_field(Field::new("id", FieldType::Integer).primary_key())
                .add_field(Field::new("status", FieldType::String).with_enum("Status"))
                .add_field(Field::new("CustomerId", FieldType::Relation).foreign_key_for("r")),
        ];
        schema.relationships = vec![
            Relationship::new("c", "o", Cardinality::OneToMany).with_id("r"),
            Relationship::new("c", "gone", Cardinality::OneToOne).with_id("stale"),
        ];
        schema
    }

    #[test]
    fn test_export_shape() {
        let json = export_json(&schema(), &ExportOptions::default(), &mut StdRng::seed_from_u64(0)).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["tables"].as_array().unwrap().len(), 2);
        assert_eq!(value["relationships"].as_array().unwrap().len(), 1);
        assert_eq!(value["relationships"][0]["type"], "1:N");
        assert_eq!(value["enums"][0]["name"], "Status");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_fake_data_keyed_by_table_name() {
        let mut options = ExportOptions::default().with_fake_data(3);
        options.set_rows("o", 1);
        let json = export_json(&schema(), &options, &mut StdRng::seed_from_u64(4)).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["data"]["Customer"].as_array().unwrap().len(), 3);
        let order = &value["data"]["Order"][0];
        assert!(order.get("CustomerId").is_none());
        assert!(order.get("status").is_some());
    }

    #[test]
    fn test_round_trip_preserves_topology() {
        let original = schema();
        let json = export_json(&original, &ExportOptions::default().with_fake_data(2), &mut StdRng::seed_from_u64(1)).unwrap();
        let imported = import_json(&json, "copy").unwrap();
        assert_eq!(imported.repaired_fields, 0);
        let restored = imported.schema;
        assert_eq!(restored.tables, original.tables);
        assert_eq!(restored.enums, original.enums);
        assert_eq!(restored.relationships, original.relationships[..1].to_vec());
    }

    #[test]
    fn test_import_errors() {
        assert!(matches!(import_json("{not json", "b"), Err(ImportError::InvalidJson(_))));
        assert_eq!(
            import_json(r#"{"tables": [], "relationships": []}"#, "b").unwrap_err(),
            ImportError::NoTablesFound
        );
    }

    #[test]
    fn test_import_repairs_legacy_payload() {
        let json = r#"{
            "tables": [
                {"id": "a", "name": "A", "x": 0, "y": 0, "fields": [{"id": "f1", "name": "id", "type": "UUID", "isPrimary": true}]},
                {"id": "b", "name": "B", "x": 0, "y": 0, "fields": []}
            ],
            "relationships": [{"id": "r", "fromTableId": "a", "toTableId": "b", "type": "1:1"}]
        }"#;
        let imported = import_json(json, "legacy").unwrap();
        assert!(imported.needs_save());
        assert_eq!(imported.repaired_fields, 1);
        let b = imported.schema.table("b").unwrap();
        assert_eq!(b.fields[0].name, "AId");
        assert!(b.fields[0].references("r"));
    }
}

//! Relational DDL renderer with optional sample INSERTs

use crate::core::export::ExportOptions;
use crate::core::export::fake_data::{FakeDataGenerator, insertable_fields};
use crate::core::graph::GraphView;
use crate::core::schema::{Field, FieldType, Schema, Table};
use petgraph::Direction;
use petgraph::algo::is_cyclic_directed;
use rand::Rng;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::Write;
use tracing::debug;

/// SQL type of a plain column
pub fn sql_type(schema: &Schema, field: &Field) -> String {
    match field.field_type {
        FieldType::String => "VARCHAR(255)".to_string(),
        FieldType::Number => "DECIMAL(10,2)".to_string(),
        FieldType::Integer | FieldType::Relation => "INTEGER".to_string(),
        FieldType::Boolean => "BOOLEAN".to_string(),
        FieldType::Text => "TEXT".to_string(),
        FieldType::Date => "DATE".to_string(),
        FieldType::Timestamp => "TIMESTAMP".to_string(),
        FieldType::Json => "JSON".to_string(),
        FieldType::Uuid => "UUID".to_string(),
        FieldType::Enum => {
            let values = schema.enum_values_for(field);
            if values.is_empty() {
                "VARCHAR(255)".to_string()
            } else {
                let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
                format!("ENUM({})", quoted.join(", "))
            }
        }
    }
}

/// Table and key column referenced by a foreign-key field
fn referenced<'a>(schema: &'a Schema, owner: &Table, field: &Field) -> Option<(&'a Table, Option<&'a Field>)> {
    let rel = schema.relationship(field.relation_id.as_deref()?)?;
    if !schema.is_valid_relationship(rel) {
        return None;
    }
    let table = schema.table(rel.other_end(&owner.id))?;
    Some((table, table.primary_key()))
}

fn column_definition(schema: &Schema, table: &Table, field: &Field) -> String {
    let name = field.name.to_lowercase();
    let Some((target, key)) = referenced(schema, table, field) else {
        let primary = if field.is_primary { " PRIMARY KEY" } else { "" };
        return format!("  {name} {}{primary}", sql_type(schema, field));
    };
    let ty = key
        .filter(|k| k.field_type != FieldType::Relation)
        .map(|k| sql_type(schema, k))
        .unwrap_or_else(|| sql_type(schema, field));
    let key_column = key.map(|k| k.name.to_lowercase()).unwrap_or_else(|| "id".to_string());
    let primary = if field.is_primary { " PRIMARY KEY" } else { "" };
    format!(
        "  {name} {ty}{primary} REFERENCES {}({key_column})",
        target.name.to_lowercase()
    )
}

/// Table indices with referenced tables first. Ties and cyclic schemas
/// keep model order.
pub fn creation_order(schema: &Schema) -> Vec<usize> {
    let view = GraphView::foreign_key_dependencies(schema);
    if is_cyclic_directed(&view.graph) {
        debug!("foreign key cycle, keeping model order for DDL");
        return (0..schema.tables.len()).collect();
    }

    let mut in_degree: Vec<usize> = view
        .graph
        .node_indices()
        .map(|n| view.graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = view
        .graph
        .node_indices()
        .filter(|n| in_degree[n.index()] == 0)
        .map(|n| Reverse(view.graph[n]))
        .collect();

    let mut order = Vec::with_capacity(schema.tables.len());
    while let Some(Reverse(table_index)) = ready.pop() {
        order.push(table_index);
        let Some(node) = view.node(&schema.tables[table_index].id) else {
            continue;
        };
        for next in view.graph.neighbors_directed(node, Direction::Outgoing) {
            in_degree[next.index()] -= 1;
            if in_degree[next.index()] == 0 {
                ready.push(Reverse(view.graph[next]));
            }
        }
    }
    order
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL literal for a generated value
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

pub fn export_sql<R: Rng>(schema: &Schema, options: &ExportOptions, rng: &mut R) -> String {
    let mut generator = FakeDataGenerator::new(rng);
    let mut sql = String::new();

    for index in creation_order(schema) {
        let table = &schema.tables[index];
        let table_name = table.name.to_lowercase();
        let _ = writeln!(sql, "-- Table: {}", table.name);
        let _ = writeln!(sql, "CREATE TABLE {table_name} (");
        let columns: Vec<String> = table
            .fields
            .iter()
            .map(|f| column_definition(schema, table, f))
            .collect();
        sql.push_str(&columns.join(",\n"));
        sql.push_str("\n);\n\n");

        if !options.with_fake_data {
            continue;
        }
        let rows = options.rows_for(&table.id);
        let fields: Vec<&Field> = insertable_fields(table).collect();
        if fields.is_empty() || rows == 0 {
            continue;
        }
        let column_list = fields
            .iter()
            .map(|f| f.name.to_lowercase())
            .collect::<Vec<_>>()
            .join(", ");
        for _ in 0..rows {
            let values: Vec<String> = fields
                .iter()
                .map(|f| sql_literal(&generator.value(schema, f)))
                .collect();
            let _ = writeln!(
                sql,
                "INSERT INTO {table_name} ({column_list}) VALUES ({});",
                values.join(", ")
            );
        }
        sql.push('\n');
    }
    sql
}

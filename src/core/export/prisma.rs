//! Prisma schema renderer
//!
//! Every relationship becomes a named `@relation` so self references and
//! parallel relationships between the same two models stay unambiguous.

use crate::core::export::{RelationPlan, field_identifier, pascal_case, plan_relations};
use crate::core::schema::{Cardinality, Field, FieldType, Schema, Table};
use std::fmt::Write;

const HEADER: &str = "datasource db {\n  provider = \"postgresql\"\n  url      = env(\"DATABASE_URL\")\n}\n\ngenerator client {\n  provider = \"prisma-client-js\"\n}\n";

fn enum_type_name(name: &str) -> String {
    pascal_case(name)
}

/// Scalar Prisma type of a non-relational column
pub fn prisma_type(schema: &Schema, field: &Field) -> String {
    match field.field_type {
        FieldType::String | FieldType::Text | FieldType::Uuid => "String".to_string(),
        FieldType::Number => "Decimal".to_string(),
        FieldType::Integer | FieldType::Relation => "Int".to_string(),
        FieldType::Boolean => "Boolean".to_string(),
        FieldType::Date | FieldType::Timestamp => "DateTime".to_string(),
        FieldType::Json => "Json".to_string(),
        FieldType::Enum => match field.enum_ref.as_deref() {
            Some(name) if !schema.enum_values_for(field).is_empty() => enum_type_name(name),
            _ => "String".to_string(),
        },
    }
}

fn native_attributes(field: &Field) -> &'static str {
    match field.field_type {
        FieldType::String => " @db.VarChar(255)",
        FieldType::Text => " @db.Text",
        FieldType::Number => " @db.Decimal(10, 2)",
        FieldType::Date => " @db.Date",
        FieldType::Uuid => " @db.Uuid",
        _ => "",
    }
}

/// Scalar type a foreign key onto `table` must have
fn key_type(schema: &Schema, table: &Table) -> String {
    table
        .primary_key()
        .filter(|k| k.field_type != FieldType::Relation)
        .map(|k| prisma_type(schema, k))
        .unwrap_or_else(|| "Int".to_string())
}

fn key_column(table: &Table) -> String {
    table
        .primary_key()
        .map(|k| field_identifier(&k.name))
        .unwrap_or_else(|| "id".to_string())
}

fn scalar_line(schema: &Schema, table: &Table, field: &Field, plans: &[RelationPlan<'_>]) -> String {
    let name = field_identifier(&field.name);
    let referenced = field
        .relation_id
        .as_deref()
        .and_then(|id| schema.relationship(id))
        .filter(|rel| schema.is_valid_relationship(rel))
        .and_then(|rel| schema.table(rel.other_end(&table.id)));

    if let Some(target) = referenced {
        let unique = plans.iter().any(|p| {
            field.references(&p.relationship.id)
                && p.target.id == table.id
                && p.cardinality() == Cardinality::OneToOne
        });
        let unique = if unique { " @unique" } else { "" };
        return format!("  {name} {}{unique}", key_type(schema, target));
    }

    let mut line = format!("  {name} {}", prisma_type(schema, field));
    if field.is_primary {
        line.push_str(" @id");
        match field.field_type {
            FieldType::Uuid => line.push_str(" @default(uuid())"),
            FieldType::Integer => line.push_str(" @default(autoincrement())"),
            _ => {}
        }
    }
    line.push_str(native_attributes(field));
    line
}

fn relation_lines(schema: &Schema, table: &Table, plan: &RelationPlan<'_>, out: &mut Vec<String>) {
    let source_model = pascal_case(&plan.source.name);
    let target_model = pascal_case(&plan.target.name);
    let label = &plan.name;

    if plan.source.id == table.id {
        let line = match plan.cardinality() {
            Cardinality::OneToOne => {
                format!("  {} {target_model}? @relation(\"{label}\")", plan.source_accessor)
            }
            Cardinality::OneToMany | Cardinality::ManyToMany => {
                format!("  {} {target_model}[] @relation(\"{label}\")", plan.source_accessor)
            }
        };
        out.push(line);
    }

    if plan.target.id == table.id {
        match (&plan.foreign_key, plan.cardinality()) {
            (Some(fk), cardinality) => {
                if fk.synthesized {
                    let unique = if cardinality == Cardinality::OneToOne { " @unique" } else { "" };
                    out.push(format!("  {} {}{unique}", fk.name, key_type(schema, plan.source)));
                }
                out.push(format!(
                    "  {} {source_model} @relation(\"{label}\", fields: [{}], references: [{}])",
                    plan.target_accessor,
                    fk.name,
                    key_column(plan.source)
                ));
            }
            (None, _) => out.push(format!(
                "  {} {source_model}[] @relation(\"{label}\")",
                plan.target_accessor
            )),
        }
    }
}

fn render_model(schema: &Schema, table: &Table, plans: &[RelationPlan<'_>], out: &mut String) {
    let mut lines: Vec<String> = table
        .fields
        .iter()
        .map(|f| scalar_line(schema, table, f, plans))
        .collect();
    for plan in plans {
        relation_lines(schema, table, plan, &mut lines);
    }

    let _ = writeln!(out, "\nmodel {} {{", pascal_case(&table.name));
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    if table.name != pascal_case(&table.name) {
        let _ = writeln!(out, "\n  @@map(\"{}\")", table.name);
    }
    out.push_str("}\n");
}

pub fn export_prisma(schema: &Schema) -> String {
    let plans = plan_relations(schema);
    let mut out = String::from(HEADER);

    for def in schema.enums.iter().filter(|e| !e.values.is_empty()) {
        let _ = writeln!(out, "\nenum {} {{", enum_type_name(&def.name));
        for value in &def.values {
            let ident = field_identifier(value);
            if ident == *value {
                let _ = writeln!(out, "  {ident}");
            } else {
                let _ = writeln!(out, "  {ident} @map(\"{value}\")");
            }
        }
        out.push_str("}\n");
    }

    for table in &schema.tables {
        render_model(schema, table, &plans, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{EnumDef, Relationship};

    fn table(id: &str, name: &str) -> Table {
        Table::new(name)
            .with_id(id)
            .add_field(Field::new("id", FieldType::Uuid).primary_key())
    }

    #[test]
    fn test_one_to_many_shape() {
        let mut schema = Schema::new("s");
        let mut post = table("p", "Post");
        post.fields.push(Field::new("UserId", FieldType::Relation).foreign_key_for("r"));
        schema.tables = vec![table("u", "User"), post];
        schema.relationships = vec![Relationship::new("u", "p", Cardinality::OneToMany).with_id("r")];

        let out = export_prisma(&schema);
        assert!(out.starts_with("datasource db {"));
        assert!(out.contains("  id String @id @default(uuid()) @db.Uuid\n"));
        assert!(out.contains("  posts Post[] @relation(\"UserPost\")\n"));
        assert!(out.contains("  UserId String\n"));
        assert!(out.contains(
            "  user User @relation(\"UserPost\", fields: [UserId], references: [id])\n"
        ));
    }

    #[test]
    fn test_one_to_one_marks_foreign_key_unique() {
        let mut schema = Schema::new("s");
        schema.tables = vec![table("u", "User"), table("pr", "Profile")];
        schema.relationships = vec![Relationship::new("u", "pr", Cardinality::OneToOne).with_id("r")];

        let out = export_prisma(&schema);
        assert!(out.contains("  profile Profile? @relation(\"UserProfile\")\n"));
        assert!(out.contains("  UserId String @unique\n"));
        assert!(out.contains("fields: [UserId], references: [id])"));
    }

    #[test]
    fn test_many_to_many_lists_on_both_sides() {
        let mut schema = Schema::new("s");
        schema.tables = vec![table("p", "Post"), table("t", "Tag")];
        schema.relationships = vec![Relationship::new("p", "t", Cardinality::ManyToMany).with_id("r")];

        let out = export_prisma(&schema);
        assert!(out.contains("  tags Tag[] @relation(\"PostTag\")\n"));
        assert!(out.contains("  posts Post[] @relation(\"PostTag\")\n"));
        assert!(!out.contains("fields: ["));
    }

    #[test]
    fn test_enums_and_mapping() {
        let mut schema = Schema::new("s");
        schema.enums = vec![
            EnumDef::new("order_status", ["open", "on hold"]),
            EnumDef::new("Empty", Vec::<String>::new()),
        ];
        schema.tables = vec![
            table("o", "orders")
                .add_field(Field::new("status", FieldType::String).with_enum("order_status"))
                .add_field(Field::new("other", FieldType::String).with_enum("Empty")),
        ];
        let out = export_prisma(&schema);
        assert!(out.contains("enum OrderStatus {\n  open\n  on_hold @map(\"on hold\")\n}"));
        assert!(!out.contains("enum Empty"));
        assert!(out.contains("  status OrderStatus\n"));
        assert!(out.contains("  other String\n"));
        assert!(out.contains("model Orders {"));
        assert!(out.contains("  @@map(\"orders\")\n}"));
    }
}

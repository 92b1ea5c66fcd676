//! TypeORM entity source renderer

use crate::core::export::{RelationPlan, camel_case, field_identifier, pascal_case, plan_relations};
use crate::core::schema::{Cardinality, EnumDef, Field, FieldType, Schema, Table};
use std::fmt::Write;

const IMPORTS: &str = "import {\n  Entity,\n  PrimaryColumn,\n  Column,\n  OneToOne,\n  OneToMany,\n  ManyToOne,\n  ManyToMany,\n  JoinColumn,\n} from \"typeorm\";\n";

/// Decorator arguments and TypeScript type of a column
struct ColumnSpec {
    args: String,
    ts_type: String,
}

impl ColumnSpec {
    fn new(args: &str, ts_type: &str) -> Self {
        Self {
            args: args.to_string(),
            ts_type: ts_type.to_string(),
        }
    }

    fn with_option(mut self, option: &str) -> Self {
        if let Some(inner) = self.args.strip_suffix(" }") {
            self.args = format!("{inner}, {option} }}");
        } else {
            self.args = format!("{}, {{ {option} }}", self.args);
        }
        self
    }
}

fn column_spec(schema: &Schema, field: &Field) -> ColumnSpec {
    match field.field_type {
        FieldType::String => ColumnSpec::new("\"varchar\", { length: 255 }", "string"),
        FieldType::Number => ColumnSpec::new("\"decimal\", { precision: 10, scale: 2 }", "number"),
        FieldType::Integer | FieldType::Relation => ColumnSpec::new("\"int\"", "number"),
        FieldType::Boolean => ColumnSpec::new("\"boolean\"", "boolean"),
        FieldType::Text => ColumnSpec::new("\"text\"", "string"),
        FieldType::Date => ColumnSpec::new("\"date\"", "string"),
        FieldType::Timestamp => ColumnSpec::new("\"timestamp\"", "Date"),
        FieldType::Json => ColumnSpec::new("\"json\"", "Record<string, unknown>"),
        FieldType::Uuid => ColumnSpec::new("\"uuid\"", "string"),
        FieldType::Enum => match field.enum_ref.as_deref() {
            Some(name) if !schema.enum_values_for(field).is_empty() => {
                let ty = pascal_case(name);
                ColumnSpec {
                    args: format!("{{ type: \"enum\", enum: {ty} }}"),
                    ts_type: ty,
                }
            }
            _ => ColumnSpec::new("\"varchar\", { length: 255 }", "string"),
        },
    }
}

/// Column spec a foreign key onto `table` must use
fn key_spec(schema: &Schema, table: &Table) -> ColumnSpec {
    table
        .primary_key()
        .filter(|k| k.field_type != FieldType::Relation)
        .map(|k| column_spec(schema, k))
        .unwrap_or_else(|| ColumnSpec::new("\"int\"", "number"))
}

fn render_enum(def: &EnumDef, out: &mut String) {
    let _ = writeln!(out, "\nexport enum {} {{", pascal_case(&def.name));
    for value in &def.values {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        let _ = writeln!(out, "  {} = \"{escaped}\",", pascal_case(value));
    }
    out.push_str("}\n");
}

fn column_block(schema: &Schema, table: &Table, field: &Field, plans: &[RelationPlan<'_>]) -> String {
    let name = field_identifier(&field.name);
    let referenced = field
        .relation_id
        .as_deref()
        .and_then(|id| schema.relationship(id))
        .filter(|rel| schema.is_valid_relationship(rel))
        .and_then(|rel| schema.table(rel.other_end(&table.id)));

    let mut spec = match referenced {
        Some(target) => key_spec(schema, target),
        None => column_spec(schema, field),
    };
    let one_to_one_key = plans.iter().any(|p| {
        field.references(&p.relationship.id)
            && p.target.id == table.id
            && p.cardinality() == Cardinality::OneToOne
    });
    if one_to_one_key {
        spec = spec.with_option("unique: true");
    }
    let decorator = if field.is_primary && referenced.is_none() {
        "PrimaryColumn"
    } else {
        "Column"
    };
    format!("  @{decorator}({})\n  {name}: {};\n", spec.args, spec.ts_type)
}

fn relation_blocks(schema: &Schema, table: &Table, plan: &RelationPlan<'_>, out: &mut Vec<String>) {
    let source_class = pascal_case(&plan.source.name);
    let target_class = pascal_case(&plan.target.name);
    let source_var = camel_case(&plan.source.name);
    let target_var = camel_case(&plan.target.name);

    if plan.source.id == table.id {
        let (decorator, ts_type) = match plan.cardinality() {
            Cardinality::OneToOne => ("OneToOne", target_class.clone()),
            Cardinality::OneToMany => ("OneToMany", format!("{target_class}[]")),
            Cardinality::ManyToMany => ("ManyToMany", format!("{target_class}[]")),
        };
        out.push(format!(
            "  @{decorator}(() => {target_class}, ({target_var}) => {target_var}.{})\n  {}: {ts_type};\n",
            plan.target_accessor, plan.source_accessor
        ));
    }

    if plan.target.id == table.id {
        let inverse = format!(
            "(() => {source_class}, ({source_var}) => {source_var}.{})",
            plan.source_accessor
        );
        match (&plan.foreign_key, plan.cardinality()) {
            (Some(fk), cardinality) => {
                if fk.synthesized {
                    let mut spec = key_spec(schema, plan.source);
                    if cardinality == Cardinality::OneToOne {
                        spec = spec.with_option("unique: true");
                    }
                    out.push(format!("  @Column({})\n  {}: {};\n", spec.args, fk.name, spec.ts_type));
                }
                let decorator = if cardinality == Cardinality::OneToOne {
                    "OneToOne"
                } else {
                    "ManyToOne"
                };
                out.push(format!(
                    "  @{decorator}{inverse}\n  @JoinColumn({{ name: \"{}\" }})\n  {}: {source_class};\n",
                    fk.name, plan.target_accessor
                ));
            }
            (None, _) => out.push(format!(
                "  @ManyToMany{inverse}\n  {}: {source_class}[];\n",
                plan.target_accessor
            )),
        }
    }
}

fn render_entity(schema: &Schema, table: &Table, plans: &[RelationPlan<'_>], out: &mut String) {
    let mut blocks: Vec<String> = table
        .fields
        .iter()
        .map(|f| column_block(schema, table, f, plans))
        .collect();
    for plan in plans {
        relation_blocks(schema, table, plan, &mut blocks);
    }

    let _ = writeln!(out, "\n@Entity(\"{}\")", table.name.to_lowercase());
    let _ = writeln!(out, "export class {} {{", pascal_case(&table.name));
    out.push_str(&blocks.join("\n"));
    out.push_str("}\n");
}

pub fn export_typeorm(schema: &Schema) -> String {
    let plans = plan_relations(schema);
    let mut out = String::from(IMPORTS);
    for def in schema.enums.iter().filter(|e| !e.values.is_empty()) {
        render_enum(def, &mut out);
    }
    for table in &schema.tables {
        render_entity(schema, table, &plans, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Relationship;

    fn table(id: &str, name: &str) -> Table {
        Table::new(name)
            .with_id(id)
            .add_field(Field::new("id", FieldType::Integer).primary_key())
    }

    #[test]
    fn test_one_to_many_decorators() {
        let mut schema = Schema::new("s");
        let mut post = table("p", "Post");
        post.fields.push(Field::new("UserId", FieldType::Relation).foreign_key_for("r"));
        schema.tables = vec![table("u", "User"), post];
        schema.relationships = vec![Relationship::new("u", "p", Cardinality::OneToMany).with_id("r")];

        let out = export_typeorm(&schema);
        assert!(out.contains("@Entity(\"user\")\nexport class User {"));
        assert!(out.contains("  @PrimaryColumn(\"int\")\n  id: number;\n"));
        assert!(out.contains("  @OneToMany(() => Post, (post) => post.user)\n  posts: Post[];\n"));
        assert!(out.contains("  @Column(\"int\")\n  UserId: number;\n"));
        assert!(out.contains(
            "  @ManyToOne(() => User, (user) => user.posts)\n  @JoinColumn({ name: \"UserId\" })\n  user: User;\n"
        ));
    }

    #[test]
    fn test_one_to_one_unique_join_column() {
        let mut schema = Schema::new("s");
        schema.tables = vec![table("u", "User"), table("pr", "Profile")];
        schema.relationships = vec![Relationship::new("u", "pr", Cardinality::OneToOne).with_id("r")];

        let out = export_typeorm(&schema);
        assert!(out.contains("  @OneToOne(() => Profile, (profile) => profile.user)\n  profile: Profile;\n"));
        assert!(out.contains("  @Column(\"int\", { unique: true })\n  UserId: number;\n"));
        assert!(out.contains("  @OneToOne(() => User, (user) => user.profile)\n  @JoinColumn({ name: \"UserId\" })\n  user: User;\n"));
    }

    #[test]
    fn test_many_to_many_collections() {
        let mut schema = Schema::new("s");
        schema.tables = vec![table("p", "Post"), table("t", "Tag")];
        schema.relationships = vec![Relationship::new("p", "t", Cardinality::ManyToMany).with_id("r")];

        let out = export_typeorm(&schema);
        assert!(out.contains("  @ManyToMany(() => Tag, (tag) => tag.posts)\n  tags: Tag[];\n"));
        assert!(out.contains("  @ManyToMany(() => Post, (post) => post.tags)\n  posts: Post[];\n"));
        assert!(!out.contains("@JoinColumn"));
    }

    #[test]
    fn test_enum_columns() {
        let mut schema = Schema::new("s");
        schema.enums = vec![EnumDef::new("status", ["in_stock", "sold \"out\""])];
        schema.tables = vec![table("i", "Item").add_field(Field::new("state", FieldType::String).with_enum("status"))];

        let out = export_typeorm(&schema);
        assert!(out.contains("export enum Status {\n  InStock = \"in_stock\",\n  SoldOut = \"sold \\\"out\\\"\",\n}"));
        assert!(out.contains("  @Column({ type: \"enum\", enum: Status })\n  state: Status;\n"));
    }

    #[test]
    fn test_with_option_merges_existing_object() {
        let spec = ColumnSpec::new("\"varchar\", { length: 255 }", "string").with_option("unique: true");
        assert_eq!(spec.args, "\"varchar\", { length: 255, unique: true }");
        let spec = ColumnSpec::new("{ type: \"enum\", enum: S }", "S").with_option("unique: true");
        assert_eq!(spec.args, "{ type: \"enum\", enum: S, unique: true }");
    }
}

#[cfg(test)]
mod tests {
    use crate::core::editor::{EditorSession, FieldUpdate};
    use crate::core::export::json::export_json;
    use crate::core::export::{ExportFormat, ExportOptions};
    use crate::core::geometry::{Point, Viewport};
    use crate::core::history::MAX_UNDO;
    use crate::core::sql_parser::parse_sql;
    use crate::core::{Cardinality, ConnectionSide, Field, FieldType, Schema, Table};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn session_with(tables: &[(&str, &str)]) -> EditorSession {
        let mut schema = Schema::new("board");
        for (i, (id, name)) in tables.iter().enumerate() {
            schema.tables.push(
                Table::new(*name)
                    .with_id(*id)
                    .with_position(i as f64 * 320.0, 0.0)
                    .add_field(Field::new("id", FieldType::Uuid).primary_key()),
            );
        }
        EditorSession::from_schema(schema)
    }

    /// Tables that must own a foreign key for `cardinality` from `from` to `to`
    fn expected_owners(from: &str, to: &str, cardinality: Cardinality) -> Vec<String> {
        match cardinality {
            Cardinality::OneToOne | Cardinality::OneToMany => vec![to.to_string()],
            Cardinality::ManyToMany => vec![from.to_string(), to.to_string()],
        }
    }

    fn assert_foreign_key_invariant(schema: &Schema, rel_id: &str) {
        let rel = schema.relationship(rel_id).expect("relationship exists");
        let owners = expected_owners(&rel.from_table_id, &rel.to_table_id, rel.cardinality);
        for table in &schema.tables {
            let referencing = table.fields.iter().filter(|f| f.references(rel_id)).count();
            let expected = usize::from(owners.contains(&table.id));
            assert_eq!(
                referencing, expected,
                "table {} has {referencing} fields for {rel_id} ({})",
                table.name, rel.cardinality
            );
            let names: HashSet<&str> = table.fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names.len(), table.fields.len(), "duplicate field names in {}", table.name);
        }
    }

    // ========================================================================
    // Undo
    // ========================================================================

    #[test]
    fn test_undo_round_trip_restores_initial_state() {
        let mut session = session_with(&[("u", "User"), ("p", "Post")]);
        let initial = session.schema().clone();

        let t = session.add_table();
        session.rename_table(&t, "Comment").unwrap();
        let f = session.add_field(&t).unwrap();
        session.update_field(&t, &f, FieldUpdate::rename("body")).unwrap();
        let r = session
            .add_relationship("u", Some(ConnectionSide::Right), "p", Some(ConnectionSide::Left), Cardinality::OneToMany)
            .unwrap();
        session.set_cardinality(&r, Cardinality::ManyToMany).unwrap();
        session.reverse_relationship(&r).unwrap();
        session.move_table("u", 40.0, -20.0).unwrap();
        session.add_enum("Role", ["admin"]).unwrap();
        session.remove_table("p").unwrap();
        assert_eq!(session.undo_depth(), MAX_UNDO);

        for _ in 0..MAX_UNDO {
            assert!(session.undo());
        }
        assert_eq!(session.schema(), &initial);
        assert!(!session.undo());
    }

    #[test]
    fn test_undo_beyond_bound_loses_oldest_states() {
        let mut session = session_with(&[("u", "User")]);
        let mut states = vec![session.schema().clone()];
        for i in 0..MAX_UNDO + 2 {
            session.rename_table("u", format!("User{i}")).unwrap();
            states.push(session.schema().clone());
        }
        for _ in 0..MAX_UNDO {
            assert!(session.undo());
        }
        assert_eq!(session.schema(), &states[2]);
        assert!(!session.undo());
    }

    // ========================================================================
    // Foreign keys
    // ========================================================================

    #[test]
    fn test_foreign_key_invariant_across_cardinality_changes() {
        let cardinalities = [Cardinality::OneToOne, Cardinality::OneToMany, Cardinality::ManyToMany];
        for initial in cardinalities {
            for next in cardinalities {
                let mut session = session_with(&[("a", "A"), ("b", "B")]);
                let r = session.add_relationship("a", None, "b", None, initial).unwrap();
                assert_foreign_key_invariant(session.schema(), &r);
                session.set_cardinality(&r, next).unwrap();
                assert_foreign_key_invariant(session.schema(), &r);
                session.reverse_relationship(&r).unwrap();
                assert_foreign_key_invariant(session.schema(), &r);
            }
        }
    }

    #[test]
    fn test_parallel_relationships_get_unique_names() {
        let mut session = session_with(&[("a", "A"), ("b", "B")]);
        let first = session.add_relationship("a", None, "b", None, Cardinality::OneToMany).unwrap();
        let second = session.add_relationship("a", None, "b", None, Cardinality::OneToOne).unwrap();
        assert_foreign_key_invariant(session.schema(), &first);
        assert_foreign_key_invariant(session.schema(), &second);
        let b = session.schema().table("b").unwrap();
        let names: Vec<&str> = b.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "AId", "AId2"]);
    }

    #[test]
    fn test_table_deletion_cascade() {
        let mut session = session_with(&[("a", "A"), ("b", "B"), ("c", "C")]);
        let ab = session.add_relationship("a", None, "b", None, Cardinality::ManyToMany).unwrap();
        let bc = session.add_relationship("b", None, "c", None, Cardinality::OneToMany).unwrap();
        let ac = session.add_relationship("a", None, "c", None, Cardinality::ManyToMany).unwrap();
        let before = session.schema().clone();

        session.remove_table("b").unwrap();
        let after = session.schema();

        assert_eq!(after.relationships.len(), 1);
        assert_eq!(after.relationships[0], *before.relationship(&ac).unwrap());
        for table in &after.tables {
            assert!(table.fields.iter().all(|f| !f.references(&ab) && !f.references(&bc)));
            let original = before.table(&table.id).unwrap();
            let kept: Vec<&Field> = original
                .fields
                .iter()
                .filter(|f| !f.references(&ab) && !f.references(&bc))
                .collect();
            assert_eq!(table.fields.iter().collect::<Vec<_>>(), kept);
            assert_eq!((table.x, table.y, &table.name), (original.x, original.y, &original.name));
        }
        assert_eq!(after.tables.len(), 2);
    }

    // ========================================================================
    // SQL import
    // ========================================================================

    #[test]
    fn test_sql_reference_round_trip() {
        let parsed = parse_sql(
            "CREATE TABLE a (id INT PRIMARY KEY); CREATE TABLE b (id INT PRIMARY KEY, a_id INT REFERENCES a(id));",
        )
        .unwrap();
        assert_eq!(parsed.tables.len(), 2);
        assert_eq!(parsed.relationships.len(), 1);

        let rel = &parsed.relationships[0];
        let a = parsed.tables.iter().find(|t| t.name == "a").unwrap();
        let b = parsed.tables.iter().find(|t| t.name == "b").unwrap();
        assert_eq!(rel.cardinality, Cardinality::OneToMany);
        assert_eq!((rel.from_table_id.as_str(), rel.to_table_id.as_str()), (a.id.as_str(), b.id.as_str()));
        let fks: Vec<&Field> = b.fields.iter().filter(|f| f.references(&rel.id)).collect();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].name, "a_id");
        assert!(a.fields.iter().all(|f| !f.is_foreign_key()));
    }

    #[test]
    fn test_nested_commas_in_types() {
        let parsed = parse_sql("CREATE TABLE t (price DECIMAL(10,2), id INT PRIMARY KEY)").unwrap();
        let table = &parsed.tables[0];
        assert_eq!(table.fields.len(), 2);
        assert_eq!(table.fields[0].field_type, FieldType::Number);
        assert!(table.fields[1].is_primary);
    }

    #[test]
    fn test_imported_sql_exports_as_prisma_relation() {
        let mut session = session_with(&[]);
        session
            .import_sql(
                "CREATE TABLE authors (id UUID PRIMARY KEY, name VARCHAR(80));\n\
                 CREATE TABLE books (id SERIAL PRIMARY KEY, author_id UUID REFERENCES authors(id));",
            )
            .unwrap();
        let prisma = session
            .export(ExportFormat::Prisma, &mut StdRng::seed_from_u64(0))
            .unwrap()
            .content;
        assert!(prisma.contains("model Authors {"));
        assert!(prisma.contains("books Books[] @relation(\"AuthorsBooks\")"));
        assert!(prisma.contains("fields: [author_id], references: [id])"));
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    #[test]
    fn test_zoom_keeps_anchor_content_point() {
        let anchors = [Point::new(0.0, 0.0), Point::new(400.0, 300.0), Point::new(1234.5, -77.25)];
        let zooms = [0.5, 0.75, 1.3, 2.0, 5.0, 0.1];
        for anchor in anchors {
            let mut viewport = Viewport::default();
            viewport.pan_by(-35.0, 12.5);
            for zoom in zooms {
                let before = viewport.to_content(anchor);
                viewport.zoom_at(zoom, anchor);
                let after = viewport.to_content(anchor);
                assert!((before.x - after.x).abs() < 1e-9, "x drift at zoom {zoom}");
                assert!((before.y - after.y).abs() < 1e-9, "y drift at zoom {zoom}");
            }
        }
    }

    // ========================================================================
    // JSON interchange
    // ========================================================================

    #[test]
    fn test_json_export_import_round_trip() {
        let mut session = session_with(&[("u", "User"), ("o", "Order"), ("t", "Tag")]);
        session.add_enum("Status", ["open", "paid"]).unwrap();
        let status = session.add_field("o").unwrap();
        session.update_field("o", &status, FieldUpdate::enum_ref("Status")).unwrap();
        session.add_relationship("u", None, "o", None, Cardinality::OneToMany).unwrap();
        session.add_relationship("o", None, "t", None, Cardinality::ManyToMany).unwrap();
        let original = session.schema().clone();

        let json = export_json(&original, &ExportOptions::default().with_fake_data(2), &mut StdRng::seed_from_u64(3))
            .unwrap();
        let mut restored = EditorSession::from_schema(Schema::new("copy"));
        restored.import_json(&json).unwrap();
        let restored = restored.schema();

        let shape = |schema: &Schema| {
            let tables: Vec<(String, Vec<(String, FieldType, Option<String>)>)> = schema
                .tables
                .iter()
                .map(|t| {
                    let fields = t
                        .fields
                        .iter()
                        .map(|f| (f.name.clone(), f.field_type, f.enum_ref.clone()))
                        .collect();
                    (t.name.clone(), fields)
                })
                .collect();
            let relationships: Vec<(String, String, Cardinality)> = schema
                .relationships
                .iter()
                .map(|r| (schema.table_name(&r.from_table_id), schema.table_name(&r.to_table_id), r.cardinality))
                .collect();
            let enums: Vec<(String, Vec<String>)> =
                schema.enums.iter().map(|e| (e.name.clone(), e.values.clone())).collect();
            (tables, relationships, enums)
        };
        assert_eq!(shape(restored), shape(&original));
    }
}

//! Foreign-key field synchronization.
//!
//! Relationships are the source of truth; foreign-key fields are a derived
//! projection tagged with `relation_id`. Placement by cardinality:
//!
//! | cardinality | fields                              |
//! |-------------|-------------------------------------|
//! | 1:1         | one on the target table             |
//! | 1:N         | one on the target table (the many)  |
//! | M:N         | one on the source and one on target |

use crate::core::schema::{Cardinality, Field, FieldType, Relationship, Schema, Table};
use tracing::debug;

/// Owning table id and the table the field points at
fn required_placements(rel: &Relationship) -> Vec<(&str, &str)> {
    match rel.cardinality {
        Cardinality::OneToOne | Cardinality::OneToMany => {
            vec![(rel.to_table_id.as_str(), rel.from_table_id.as_str())]
        }
        Cardinality::ManyToMany => vec![
            (rel.from_table_id.as_str(), rel.to_table_id.as_str()),
            (rel.to_table_id.as_str(), rel.from_table_id.as_str()),
        ],
    }
}

/// `<OtherTableName>Id`, suffixed with 2, 3, ... until unique on `owner`
pub fn foreign_key_name(owner: &Table, other_table_name: &str) -> String {
    let base = format!("{}Id", other_table_name);
    if !owner.has_field_named(&base) {
        return base;
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{base}{suffix}");
        if !owner.has_field_named(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

fn synthesize_field(schema: &mut Schema, owner_id: &str, other_id: &str, rel_id: &str) -> bool {
    let other_name = schema.table_name(other_id);
    let Some(owner) = schema.table_mut(owner_id) else {
        return false;
    };
    let name = foreign_key_name(owner, &other_name);
    owner
        .fields
        .push(Field::new(name, FieldType::Relation).foreign_key_for(rel_id));
    true
}

/// Add the foreign-key fields required by the relationship's cardinality.
/// Returns the number of fields created.
pub fn place_foreign_keys(schema: &mut Schema, rel: &Relationship) -> usize {
    if !schema.is_valid_relationship(rel) {
        return 0;
    }
    let mut created = 0;
    for (owner, other) in required_placements(rel) {
        if synthesize_field(schema, owner, other, &rel.id) {
            created += 1;
        }
    }
    created
}

/// Delete every field, on any table, that references the relationship
pub fn remove_foreign_keys(schema: &mut Schema, relationship_id: &str) -> usize {
    let mut removed = 0;
    for table in &mut schema.tables {
        let before = table.fields.len();
        table.fields.retain(|f| !f.references(relationship_id));
        removed += before - table.fields.len();
    }
    removed
}

/// Remove-then-place for a relationship already stored in the schema
pub fn resync_foreign_keys(schema: &mut Schema, relationship_id: &str) {
    remove_foreign_keys(schema, relationship_id);
    if let Some(rel) = schema.relationship(relationship_id).cloned() {
        place_foreign_keys(schema, &rel);
    }
}

/// Fields on `owner_id` that reference `rel_id`
fn count_on(schema: &Schema, owner_id: &str, rel_id: &str) -> usize {
    schema
        .table(owner_id)
        .map(|t| t.fields.iter().filter(|f| f.references(rel_id)).count())
        .unwrap_or(0)
}

/// Consistency repair run after every load.
///
/// Drops fields whose relationship no longer exists, then synthesizes the
/// missing field(s) of valid one-to-one and many-to-many relationships.
/// Returns the number of changes so the caller can schedule a save.
pub fn repair_foreign_keys(schema: &mut Schema) -> usize {
    let mut changes = 0;

    let known: Vec<String> = schema.relationships.iter().map(|r| r.id.clone()).collect();
    for table in &mut schema.tables {
        let before = table.fields.len();
        table.fields.retain(|f| match &f.relation_id {
            Some(id) => known.contains(id),
            None => true,
        });
        changes += before - table.fields.len();
    }

    let candidates: Vec<Relationship> = schema
        .valid_relationships()
        .filter(|r| {
            matches!(
                r.cardinality,
                Cardinality::OneToOne | Cardinality::ManyToMany
            )
        })
        .cloned()
        .collect();

    for rel in candidates {
        let placements = required_placements(&rel);
        if rel.is_self_reference() {
            let have = count_on(schema, &rel.from_table_id, &rel.id);
            for _ in have..placements.len() {
                if synthesize_field(schema, &rel.from_table_id, &rel.to_table_id, &rel.id) {
                    changes += 1;
                }
            }
            continue;
        }
        for (owner, other) in placements {
            if count_on(schema, owner, &rel.id) == 0
                && synthesize_field(schema, owner, other, &rel.id)
            {
                changes += 1;
            }
        }
    }

    if changes > 0 {
        debug!(changes, "repaired foreign-key fields");
    }
    changes
}

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed rendered width of every table card
pub const TABLE_WIDTH: f64 = 256.0;
/// Height of the table header (name and icon)
pub const TABLE_HEADER_HEIGHT: f64 = 48.0;
/// Height of a single field row
pub const TABLE_ROW_HEIGHT: f64 = 40.0;

pub const DEFAULT_TABLE_ICON: &str = "solar:widget-add-linear";
pub const DEFAULT_TABLE_NAME: &str = "NewTable";

pub type TableId = String;
pub type FieldId = String;
pub type RelationshipId = String;

/// Generate a prefixed identifier, e.g. `table-3f2a...`
pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// Canonical field type after load-time normalization
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    #[display("string")]
    String,
    #[display("number")]
    Number,
    #[display("integer")]
    Integer,
    #[display("boolean")]
    Boolean,
    #[display("text")]
    Text,
    #[display("date")]
    Date,
    #[display("timestamp")]
    Timestamp,
    #[display("json")]
    Json,
    #[display("uuid")]
    Uuid,
    #[display("enum")]
    Enum,
    #[display("relation")]
    Relation,
}

impl FieldType {
    pub const ALL: [FieldType; 11] = [
        FieldType::String,
        FieldType::Number,
        FieldType::Integer,
        FieldType::Boolean,
        FieldType::Text,
        FieldType::Date,
        FieldType::Timestamp,
        FieldType::Json,
        FieldType::Uuid,
        FieldType::Enum,
        FieldType::Relation,
    ];
}

/// Column of a table
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Semantic hint, only used to pick a fake-value strategy
    #[serde(default, rename = "faker", skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_primary: bool,
    /// Name of the referenced [`EnumDef`] when `field_type` is enum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_ref: Option<String>,
    /// Relationship that owns this field as a foreign key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_id: Option<RelationshipId>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: new_id("f"),
            name: name.into(),
            field_type,
            hint: None,
            is_primary: false,
            enum_ref: None,
            relation_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_enum(mut self, enum_name: impl Into<String>) -> Self {
        self.field_type = FieldType::Enum;
        self.enum_ref = Some(enum_name.into());
        self
    }

    pub fn foreign_key_for(mut self, relationship_id: impl Into<String>) -> Self {
        self.relation_id = Some(relationship_id.into());
        self
    }

    pub fn is_foreign_key(&self) -> bool {
        self.relation_id.is_some()
    }

    pub fn references(&self, relationship_id: &str) -> bool {
        self.relation_id.as_deref() == Some(relationship_id)
    }
}

/// Table node placed in content space
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: TableId,
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

fn default_icon() -> String {
    DEFAULT_TABLE_ICON.to_string()
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id("table"),
            name: name.into(),
            x: 0.0,
            y: 0.0,
            icon: default_icon(),
            fields: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn add_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Header plus one row per field plus the trailing "add field" row
    pub fn height(&self) -> f64 {
        TABLE_HEADER_HEIGHT + TABLE_ROW_HEIGHT * (self.fields.len() as f64 + 1.0)
    }

    pub fn field(&self, field_id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == field_id)
    }

    pub fn field_mut(&mut self, field_id: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.id == field_id)
    }

    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.is_primary)
    }

    pub fn has_field_named(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// Side of a table used as an edge anchor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionSide {
    #[display("top")]
    Top,
    #[display("right")]
    Right,
    #[display("bottom")]
    Bottom,
    #[display("left")]
    Left,
}

impl ConnectionSide {
    pub const ALL: [ConnectionSide; 4] = [
        ConnectionSide::Top,
        ConnectionSide::Right,
        ConnectionSide::Bottom,
        ConnectionSide::Left,
    ];
}

/// Relationship cardinality
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default)]
pub enum Cardinality {
    #[serde(rename = "1:1")]
    #[display("1:1")]
    OneToOne,
    #[default]
    #[serde(rename = "1:N")]
    #[display("1:N")]
    OneToMany,
    #[serde(rename = "M:N")]
    #[display("M:N")]
    ManyToMany,
}

impl Cardinality {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "1:1" => Some(Self::OneToOne),
            "1:N" => Some(Self::OneToMany),
            "M:N" | "N:M" => Some(Self::ManyToMany),
            _ => None,
        }
    }

    /// Badge text shown at the edge midpoint
    pub fn label(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "1 : 1",
            Cardinality::OneToMany => "1 : N",
            Cardinality::ManyToMany => "M : N",
        }
    }
}

/// Edge between two tables; the source is the "one" side for 1:N
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: RelationshipId,
    pub from_table_id: TableId,
    pub to_table_id: TableId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_side: Option<ConnectionSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_side: Option<ConnectionSide>,
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
}

impl Relationship {
    pub fn new(
        from_table_id: impl Into<String>,
        to_table_id: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            id: new_id("rel"),
            from_table_id: from_table_id.into(),
            to_table_id: to_table_id.into(),
            from_side: None,
            to_side: None,
            cardinality,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sides(mut self, from: ConnectionSide, to: ConnectionSide) -> Self {
        self.from_side = Some(from);
        self.to_side = Some(to);
        self
    }

    pub fn touches(&self, table_id: &str) -> bool {
        self.from_table_id == table_id || self.to_table_id == table_id
    }

    pub fn is_self_reference(&self) -> bool {
        self.from_table_id == self.to_table_id
    }

    /// Table on the other end of the edge, seen from `table_id`
    pub fn other_end(&self, table_id: &str) -> &str {
        if self.to_table_id == table_id {
            &self.from_table_id
        } else {
            &self.to_table_id
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            id: self.id.clone(),
            from_table_id: self.to_table_id.clone(),
            to_table_id: self.from_table_id.clone(),
            from_side: self.to_side,
            to_side: self.from_side,
            cardinality: self.cardinality,
        }
    }
}

/// Named enumeration shared by all tables of a board
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct EnumDef {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Append values not yet present, keeping existing order
    pub fn merge_values<'a>(&mut self, values: impl IntoIterator<Item = &'a String>) {
        for value in values {
            if !self.values.contains(value) {
                self.values.push(value.clone());
            }
        }
    }
}

/// The aggregate persisted for a board
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub enums: Vec<EnumDef>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn table(&self, table_id: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == table_id)
    }

    pub fn table_mut(&mut self, table_id: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.id == table_id)
    }

    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn relationship(&self, relationship_id: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.id == relationship_id)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn enum_def_mut(&mut self, name: &str) -> Option<&mut EnumDef> {
        self.enums.iter_mut().find(|e| e.name == name)
    }

    /// A relationship is valid when both of its tables exist
    pub fn is_valid_relationship(&self, relationship: &Relationship) -> bool {
        self.table(&relationship.from_table_id).is_some()
            && self.table(&relationship.to_table_id).is_some()
    }

    pub fn valid_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships
            .iter()
            .filter(|r| self.is_valid_relationship(r))
    }

    /// Values of the enum referenced by `field`, empty when unresolved
    pub fn enum_values_for(&self, field: &Field) -> &[String] {
        field
            .enum_ref
            .as_deref()
            .and_then(|name| self.enum_def(name))
            .map(|e| e.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn table_name(&self, table_id: &str) -> String {
        self.table(table_id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| table_id.to_string())
    }
}

/// Starter board used when creating a fresh document
pub fn create_default_table() -> Table {
    Table::new(DEFAULT_TABLE_NAME)
        .with_position(300.0, 300.0)
        .add_field(Field::new("id", FieldType::Uuid).primary_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_height_counts_add_row() {
        let table = Table::new("users")
            .add_field(Field::new("id", FieldType::Uuid).primary_key())
            .add_field(Field::new("email", FieldType::String));
        assert_eq!(table.height(), 48.0 + 40.0 * 3.0);
        assert_eq!(Table::new("empty").height(), 88.0);
    }

    #[test]
    fn test_field_serializes_like_interchange_format() {
        let field = Field::new("status", FieldType::String)
            .with_id("f-1")
            .with_enum("Status")
            .primary_key();
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "enum");
        assert_eq!(json["enumRef"], "Status");
        assert_eq!(json["isPrimary"], true);
        assert!(json.get("relationId").is_none());
    }

    #[test]
    fn test_cardinality_wire_names() {
        assert_eq!(serde_json::to_string(&Cardinality::ManyToMany).unwrap(), "\"M:N\"");
        assert_eq!(Cardinality::parse("N:M"), Some(Cardinality::ManyToMany));
        assert_eq!(Cardinality::parse("2:3"), None);
        assert_eq!(Cardinality::OneToMany.to_string(), "1:N");
    }

    #[test]
    fn test_valid_relationships_filter_missing_tables() {
        let a = Table::new("a").with_id("a");
        let b = Table::new("b").with_id("b");
        let mut schema = Schema::new("s");
        schema.tables = vec![a, b];
        schema.relationships = vec![
            Relationship::new("a", "b", Cardinality::OneToMany).with_id("ok"),
            Relationship::new("a", "ghost", Cardinality::OneToOne).with_id("bad"),
        ];
        let ids: Vec<_> = schema.valid_relationships().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
    }

    #[test]
    fn test_reversed_swaps_sides() {
        let rel = Relationship::new("a", "b", Cardinality::OneToMany)
            .with_sides(ConnectionSide::Right, ConnectionSide::Left);
        let rev = rel.reversed();
        assert_eq!(rev.from_table_id, "b");
        assert_eq!(rev.to_side, Some(ConnectionSide::Right));
        assert_eq!(rev.id, rel.id);
    }

    #[test]
    fn test_enum_merge_keeps_existing_order() {
        let mut def = EnumDef::new("Status", ["active", "banned"]);
        let incoming = vec!["banned".to_string(), "pending".to_string()];
        def.merge_values(&incoming);
        assert_eq!(def.values, vec!["active", "banned", "pending"]);
    }
}

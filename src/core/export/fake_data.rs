//! Sample row generation for exports
//!
//! Strategy selection, in order:
//! 1. the field is a foreign key: skipped by [`FakeDataGenerator::row`]
//! 2. non-string types use a fixed per-type strategy
//! 3. string fields match their lower-cased hint against keyword rules
//! 4. anything else falls back to a lorem word

use crate::core::schema::{Field, FieldType, Schema, Table};
use chrono::{DateTime, Duration, Utc};
use fake::Fake;
use fake::faker::address::en::{BuildingNumber, CityName, CountryName, StreetName};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::{Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::{Map, Value, json};

/// Literal used for enum fields whose EnumDef has no values
pub const EMPTY_ENUM_PLACEHOLDER: &str = "value";

/// Fake row source; deterministic for a seeded rng and fixed clock
pub struct FakeDataGenerator<R: Rng> {
    rng: R,
    now: DateTime<Utc>,
}

impl<R: Rng> FakeDataGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self::with_clock(rng, Utc::now())
    }

    /// Dates are generated relative to `now`
    pub fn with_clock(rng: R, now: DateTime<Utc>) -> Self {
        Self { rng, now }
    }

    pub fn into_rng(self) -> R {
        self.rng
    }

    fn alphanumeric(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn uuid(&mut self) -> String {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string()
    }

    /// String value picked by semantic hint keywords
    fn hinted_string(&mut self, hint: &str) -> String {
        let rng = &mut self.rng;
        if hint.contains("email") {
            SafeEmail().fake_with_rng(rng)
        } else if hint.contains("name") && hint.contains("person") {
            Name().fake_with_rng(rng)
        } else if hint.contains("name") || hint.contains("first") {
            FirstName().fake_with_rng(rng)
        } else if hint.contains("last") {
            LastName().fake_with_rng(rng)
        } else if hint.contains("phone") {
            PhoneNumber().fake_with_rng(rng)
        } else if hint.contains("address") || hint.contains("street") {
            let number: String = BuildingNumber().fake_with_rng(rng);
            let street: String = StreetName().fake_with_rng(rng);
            format!("{number} {street}")
        } else if hint.contains("city") {
            CityName().fake_with_rng(rng)
        } else if hint.contains("country") {
            CountryName().fake_with_rng(rng)
        } else if hint.contains("company") || hint.contains("commerce") {
            CompanyName().fake_with_rng(rng)
        } else if hint.contains("lorem") || hint.contains("text") {
            Sentence(3..8).fake_with_rng(rng)
        } else if hint.contains("string") && hint.contains('8') {
            self.alphanumeric(8)
        } else if hint.contains("string") {
            self.alphanumeric(12)
        } else {
            Word().fake_with_rng(rng)
        }
    }

    /// One value for `field`; enum fields draw from the schema's EnumDef
    pub fn value(&mut self, schema: &Schema, field: &Field) -> Value {
        match field.field_type {
            FieldType::Uuid => Value::String(self.uuid()),
            FieldType::Integer => json!(self.rng.gen_range(1..=10_000i64)),
            FieldType::Number => {
                let cents = self.rng.gen_range(0..=1_000_000i64);
                json!(cents as f64 / 100.0)
            }
            FieldType::Boolean => Value::Bool(self.rng.gen_bool(0.5)),
            FieldType::Date => {
                let days = self.rng.gen_range(0..3650);
                let date = self.now - Duration::days(days);
                Value::String(date.format("%Y-%m-%d").to_string())
            }
            FieldType::Timestamp => {
                let seconds = self.rng.gen_range(0..365 * 24 * 3600);
                let at = self.now - Duration::seconds(seconds);
                Value::String(at.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            FieldType::Enum => {
                let values = schema.enum_values_for(field);
                if values.is_empty() {
                    Value::String(EMPTY_ENUM_PLACEHOLDER.to_string())
                } else {
                    let pick = self.rng.gen_range(0..values.len());
                    Value::String(values[pick].clone())
                }
            }
            FieldType::Json => {
                let word: String = Word().fake_with_rng(&mut self.rng);
                json!({ "key": word })
            }
            FieldType::Text => {
                let sentence: String = Sentence(3..8).fake_with_rng(&mut self.rng);
                Value::String(sentence)
            }
            FieldType::String => {
                let hint = field.hint.as_deref().unwrap_or_default().to_lowercase();
                Value::String(self.hinted_string(&hint))
            }
            FieldType::Relation => Value::String(self.alphanumeric(10)),
        }
    }

    /// One row keyed by field name, foreign-key fields excluded
    pub fn row(&mut self, schema: &Schema, table: &Table) -> Map<String, Value> {
        let mut row = Map::new();
        for field in insertable_fields(table) {
            row.insert(field.name.clone(), self.value(schema, field));
        }
        row
    }

    pub fn rows(&mut self, schema: &Schema, table: &Table, count: usize) -> Vec<Map<String, Value>> {
        (0..count).map(|_| self.row(schema, table)).collect()
    }
}

/// Fields that receive generated values
pub fn insertable_fields(table: &Table) -> impl Iterator<Item = &Field> {
    table
        .fields
        .iter()
        .filter(|f| !f.is_foreign_key() && f.field_type != FieldType::Relation)
}

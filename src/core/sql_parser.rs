//! SQL DDL import
//!
//! A tolerant scanner rather than a full SQL grammar: it finds every
//! `CREATE TABLE name (` occurrence, captures the body up to the matching
//! parenthesis, splits it on depth-zero commas and reads one column per item.
//! Dialect-specific clauses it does not understand are ignored instead of
//! rejected, so dumps from MySQL, PostgreSQL and SQLite all import.

use crate::core::schema::{Cardinality, EnumDef, Field, FieldType, Relationship, Table, TableId};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Tables per row of the import grid
pub const IMPORT_GRID_COLUMNS: usize = 4;
pub const IMPORT_GRID_ORIGIN: (f64, f64) = (100.0, 100.0);
pub const IMPORT_GRID_PITCH_X: f64 = 320.0;
pub const IMPORT_GRID_PITCH_Y: f64 = 400.0;

// ============================================================================
// Error Types
// ============================================================================

/// Failure of a SQL or JSON import; the current board is never touched
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImportError {
    #[error("No tables found in the import")]
    NoTablesFound,
    #[error("CREATE TABLE {0} is missing its closing parenthesis")]
    UnterminatedTable(String),
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

// ============================================================================
// Patterns
// ============================================================================

const IDENT: &str = r#"(?:`[^`]+`|"[^"]+"|\[[^\]]+\]|[\w$]+)"#;

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?i)\bCREATE\s+(?:(?:GLOBAL\s+|LOCAL\s+)?TEMP(?:ORARY)?\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?({IDENT}(?:\s*\.\s*{IDENT})*)\s*\("
    );
    Regex::new(&pattern).expect("CREATE TABLE pattern must compile")
});

static REFERENCES: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?i)\bREFERENCES\s+({IDENT}(?:\s*\.\s*{IDENT})*)\s*(?:\(\s*({IDENT})[^)]*\))?"
    );
    Regex::new(&pattern).expect("REFERENCES pattern must compile")
});

static PRIMARY_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPRIMARY\s+KEY\b").expect("PRIMARY KEY pattern must compile"));

/// Constraint keyword, optional index name, then the column list
static TABLE_CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?i)^(?:PRIMARY\s+KEY|FOREIGN\s+KEY|UNIQUE(?:\s+(?:KEY|INDEX))?|(?:FULLTEXT|SPATIAL)(?:\s+(?:KEY|INDEX))?|KEY|INDEX|CHECK|EXCLUDE(?:\s+USING\s+\w+)?)\s*(?:{IDENT}\s*)?\("
    );
    Regex::new(&pattern).expect("constraint pattern must compile")
});

static CONSTRAINT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)^CONSTRAINT\s+{IDENT}\s+");
    Regex::new(&pattern).expect("CONSTRAINT pattern must compile")
});

// ============================================================================
// Result Types
// ============================================================================

/// Tables, relationships and enums recovered from DDL text
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedSchema {
    pub tables: Vec<Table>,
    pub relationships: Vec<Relationship>,
    pub enums: Vec<EnumDef>,
}

/// Foreign key waiting for every table to be known
#[derive(Debug, Clone)]
struct DeferredReference {
    table_index: usize,
    field_id: String,
    target_table: String,
}

// ============================================================================
// Lexical helpers
// ============================================================================

/// Replace `--` and `/* */` comments with spaces, leaving quoted text intact.
/// Byte offsets are preserved.
pub fn strip_comments(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            push_byte(&mut out, sql, i);
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => {
                quote = Some(b);
                push_byte(&mut out, sql, i);
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = sql[i + 2..].find("*/").map(|p| i + 2 + p + 2).unwrap_or(bytes.len());
                for c in sql[i..end].chars() {
                    if c == '\n' {
                        out.push('\n');
                    } else {
                        out.extend(std::iter::repeat_n(' ', c.len_utf8()));
                    }
                }
                i = end;
            }
            _ => {
                push_byte(&mut out, sql, i);
                i += 1;
            }
        }
    }
    out
}

/// Blank out the inside of single-quoted literals so keyword patterns only
/// see SQL, not `DEFAULT` or `COMMENT` text
fn mask_string_literals(text: &str) -> String {
    let mut inside = false;
    text.chars()
        .map(|c| match c {
            '\'' => {
                inside = !inside;
                c
            }
            _ if inside => ' ',
            _ => c,
        })
        .collect()
}

/// Copy the character starting at byte `i` when `i` is a char boundary
fn push_byte(out: &mut String, sql: &str, i: usize) {
    if sql.is_char_boundary(i)
        && let Some(c) = sql[i..].chars().next()
    {
        out.push(c);
    }
}

fn closing_quote(open: char) -> Option<char> {
    match open {
        '\'' => Some('\''),
        '"' => Some('"'),
        '`' => Some('`'),
        _ => None,
    }
}

/// Byte index of the parenthesis closing the one at `open`, tracking depth
/// and skipping quoted text
pub fn find_matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in text[open..].char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {
                if let Some(q) = closing_quote(c) {
                    quote = Some(q);
                }
            }
        }
    }
    None
}

/// Split on commas at nesting depth zero only, so `DECIMAL(10,2)` stays whole
pub fn split_top_level(body: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in body.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            current.push(c);
            continue;
        }
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                items.push(std::mem::take(&mut current));
            }
            _ => {
                if let Some(q) = closing_quote(c) {
                    quote = Some(q);
                }
                current.push(c);
            }
        }
    }
    items.push(current);
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Strip quoting and any schema qualifier: `"public"."Users"` -> `Users`
pub fn unquote_identifier(raw: &str) -> String {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in raw.trim().chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '.' => segments.push(std::mem::take(&mut current)),
                c if c.is_whitespace() => {}
                _ => current.push(c),
            },
        }
    }
    segments.push(current);
    segments.pop().unwrap_or_default()
}

/// First identifier of an item (quoted or bare) and the remaining text
fn take_identifier(item: &str) -> (String, &str) {
    let item = item.trim_start();
    let mut chars = item.char_indices();
    let Some((_, first)) = chars.next() else {
        return (String::new(), "");
    };
    let close = match first {
        '"' => Some('"'),
        '`' => Some('`'),
        '[' => Some(']'),
        _ => None,
    };
    let end = match close {
        Some(close) => item[1..]
            .find(close)
            .map(|p| p + 2)
            .unwrap_or(item.len()),
        None => item
            .find(|c: char| c.is_whitespace() || c == '(')
            .unwrap_or(item.len()),
    };
    (unquote_identifier(&item[..end]), &item[end..])
}

/// Base type word and its parenthesized argument text, if any
fn take_type(rest: &str) -> (String, Option<&str>) {
    let rest = rest.trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let base = rest[..end].to_ascii_uppercase();
    let after = rest[end..].trim_start();
    let args = if after.starts_with('(') {
        let offset = rest.len() - after.len();
        find_matching_paren(rest, offset).map(|close| &rest[offset + 1..close])
    } else {
        None
    };
    (base, args)
}

/// Values of an `ENUM('a', 'b')` argument list
fn parse_enum_values(args: &str) -> Vec<String> {
    split_top_level(args)
        .into_iter()
        .map(|v| {
            let v = v.trim();
            let v = v
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .unwrap_or(v);
            v.replace("''", "'")
        })
        .filter(|v| !v.is_empty())
        .collect()
}

/// Identifier list of `(a, "b", c)`
fn parse_column_list(text: &str) -> Vec<String> {
    let Some(open) = text.find('(') else {
        return Vec::new();
    };
    let Some(close) = find_matching_paren(text, open) else {
        return Vec::new();
    };
    split_top_level(&text[open + 1..close])
        .iter()
        .map(|c| unquote_identifier(c))
        .filter(|c| !c.is_empty())
        .collect()
}

// ============================================================================
// Type mapping
// ============================================================================

/// Map a base SQL type (no precision) to a canonical field type
pub fn map_sql_type(base: &str) -> FieldType {
    known_sql_type(base).unwrap_or(FieldType::String)
}

/// Canonical type of a recognized SQL type word, `None` for anything else
fn known_sql_type(base: &str) -> Option<FieldType> {
    let field_type = match base.trim().trim_end_matches("[]").to_ascii_uppercase().as_str() {
        "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" | "INT2" | "INT4"
        | "INT8" | "SERIAL" | "BIGSERIAL" | "SMALLSERIAL" => FieldType::Integer,
        "DECIMAL" | "NUMERIC" | "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "REAL" | "MONEY" => {
            FieldType::Number
        }
        "BOOLEAN" | "BOOL" | "BIT" => FieldType::Boolean,
        "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "CLOB" | "NTEXT" => FieldType::Text,
        "DATE" => FieldType::Date,
        "TIMESTAMP" | "TIMESTAMPTZ" | "DATETIME" | "DATETIME2" | "SMALLDATETIME" | "TIME"
        | "TIMETZ" => FieldType::Timestamp,
        "JSON" | "JSONB" => FieldType::Json,
        "UUID" | "UNIQUEIDENTIFIER" => FieldType::Uuid,
        "ENUM" => FieldType::Enum,
        "VARCHAR" | "CHAR" | "CHARACTER" | "NVARCHAR" | "NCHAR" | "VARCHAR2" | "NVARCHAR2"
        | "STRING" | "CITEXT" | "BINARY" | "VARBINARY" | "BYTEA" | "BLOB" | "INET" | "CIDR"
        | "XML" | "SET" | "YEAR" | "INTERVAL" => FieldType::String,
        _ => return None,
    };
    Some(field_type)
}

// ============================================================================
// Parser
// ============================================================================

struct TableParser<'a> {
    table_name: &'a str,
    fields: Vec<Field>,
    enums: Vec<EnumDef>,
    primary_columns: Vec<String>,
    /// (column name, referenced table)
    references: Vec<(String, String)>,
}

impl<'a> TableParser<'a> {
    fn new(table_name: &'a str) -> Self {
        Self {
            table_name,
            fields: Vec::new(),
            enums: Vec::new(),
            primary_columns: Vec::new(),
            references: Vec::new(),
        }
    }

    fn item(&mut self, item: &str) {
        if is_table_constraint(item) {
            self.constraint(item);
        } else {
            self.column(item);
        }
    }

    fn constraint(&mut self, item: &str) {
        let body = mask_string_literals(&CONSTRAINT_PREFIX.replace(item, ""));
        let upper = body.to_ascii_uppercase();
        if upper.starts_with("PRIMARY") {
            self.primary_columns.extend(parse_column_list(&body));
        } else if upper.starts_with("FOREIGN") {
            let Some(refs_at) = REFERENCES.find(&body).map(|m| m.start()) else {
                return;
            };
            let columns = parse_column_list(&body[..refs_at]);
            if let (Some(column), Some(caps)) = (columns.first(), REFERENCES.captures(&body)) {
                self.references
                    .push((column.clone(), unquote_identifier(&caps[1])));
            }
        }
    }

    fn column(&mut self, item: &str) {
        let (name, rest) = take_identifier(item);
        if name.is_empty() {
            return;
        }
        let (base, args) = take_type(rest);
        let mut field = Field::new(name.clone(), map_sql_type(&base));

        if field.field_type == FieldType::Enum {
            let enum_name = format!("{}_{}", self.table_name, name);
            let values = args.map(parse_enum_values).unwrap_or_default();
            match self.enums.iter_mut().find(|e| e.name == enum_name) {
                Some(existing) => existing.merge_values(&values),
                None => self.enums.push(EnumDef::new(enum_name.clone(), values)),
            }
            field.enum_ref = Some(enum_name);
        }
        let clauses = mask_string_literals(rest);
        if PRIMARY_KEY.is_match(&clauses) {
            field.is_primary = true;
        }
        if let Some(caps) = REFERENCES.captures(&clauses) {
            self.references.push((name, unquote_identifier(&caps[1])));
        }
        self.fields.push(field);
    }

    fn finish(mut self) -> (Vec<Field>, Vec<EnumDef>, Vec<(String, String)>) {
        for column in &self.primary_columns {
            if let Some(field) = self
                .fields
                .iter_mut()
                .find(|f| f.name.eq_ignore_ascii_case(column))
            {
                field.is_primary = true;
            }
        }
        (self.fields, self.enums, self.references)
    }
}

/// Whether a body item is a table-level constraint rather than a column.
///
/// A column whose name is a keyword (`key`, `index`, `check`...) is still a
/// column when a recognized type follows it.
fn is_table_constraint(item: &str) -> bool {
    if let Some(prefix) = CONSTRAINT_PREFIX.find(item)
        && TABLE_CONSTRAINT.is_match(&item[prefix.end()..])
    {
        return true;
    }
    let (_, rest) = take_identifier(item);
    let (base, _) = take_type(rest);
    if known_sql_type(&base).is_some() {
        return false;
    }
    TABLE_CONSTRAINT.is_match(item)
}

/// Grid slot of the `index`-th imported table
pub fn grid_position(index: usize) -> (f64, f64) {
    let col = index % IMPORT_GRID_COLUMNS;
    let row = index / IMPORT_GRID_COLUMNS;
    (
        IMPORT_GRID_ORIGIN.0 + col as f64 * IMPORT_GRID_PITCH_X,
        IMPORT_GRID_ORIGIN.1 + row as f64 * IMPORT_GRID_PITCH_Y,
    )
}

/// Parse DDL text into tables, one-to-many relationships and enums.
///
/// Every `REFERENCES t(col)` on a column of table C becomes a relationship
/// from t to C, with the column tagged as its foreign-key field. Self
/// references and references to unknown tables are skipped.
pub fn parse_sql(sql: &str) -> Result<ParsedSchema, ImportError> {
    let text = strip_comments(sql);
    let mut parsed = ParsedSchema::default();
    let mut deferred: Vec<DeferredReference> = Vec::new();
    let mut unterminated: Option<String> = None;
    let mut search_from = 0;

    while let Some(caps) = CREATE_TABLE.captures_at(&text, search_from) {
        let (Some(whole), Some(name_match)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let name = unquote_identifier(name_match.as_str());
        let open = whole.end() - 1;
        let Some(close) = find_matching_paren(&text, open) else {
            warn!(table = %name, "unterminated CREATE TABLE");
            unterminated.get_or_insert(name);
            search_from = whole.end();
            continue;
        };
        search_from = close + 1;

        let mut table_parser = TableParser::new(&name);
        for item in split_top_level(&text[open + 1..close]) {
            table_parser.item(&item);
        }
        let (fields, enums, references) = table_parser.finish();
        if fields.is_empty() {
            debug!(table = %name, "skipping table without columns");
            continue;
        }

        let (x, y) = grid_position(parsed.tables.len());
        let table_index = parsed.tables.len();
        let mut table = Table::new(name.clone()).with_position(x, y);
        table.fields = fields;

        for (column, target_table) in references {
            let Some(field) = table
                .fields
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(&column))
            else {
                continue;
            };
            if deferred
                .iter()
                .any(|d| d.table_index == table_index && d.field_id == field.id)
            {
                continue;
            }
            deferred.push(DeferredReference {
                table_index,
                field_id: field.id.clone(),
                target_table,
            });
        }
        for def in enums {
            match parsed.enums.iter_mut().find(|e| e.name == def.name) {
                Some(existing) => existing.merge_values(&def.values),
                None => parsed.enums.push(def),
            }
        }
        parsed.tables.push(table);
    }

    if parsed.tables.is_empty() {
        return Err(match unterminated {
            Some(name) => ImportError::UnterminatedTable(name),
            None => ImportError::NoTablesFound,
        });
    }

    resolve_references(&mut parsed, deferred);
    debug!(
        tables = parsed.tables.len(),
        relationships = parsed.relationships.len(),
        enums = parsed.enums.len(),
        "parsed SQL import"
    );
    Ok(parsed)
}

fn find_table_id(tables: &[Table], name: &str) -> Option<TableId> {
    tables
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
        .map(|t| t.id.clone())
}

fn resolve_references(parsed: &mut ParsedSchema, deferred: Vec<DeferredReference>) {
    for reference in deferred {
        let owner_id = parsed.tables[reference.table_index].id.clone();
        let Some(target_id) = find_table_id(&parsed.tables, &reference.target_table) else {
            warn!(
                table = %parsed.tables[reference.table_index].name,
                target = %reference.target_table,
                "REFERENCES target not found, skipping"
            );
            continue;
        };
        if target_id == owner_id {
            continue;
        }
        let rel = Relationship::new(target_id, owner_id, Cardinality::OneToMany);
        if let Some(field) = parsed.tables[reference.table_index].field_mut(&reference.field_id) {
            field.relation_id = Some(rel.id.clone());
        }
        parsed.relationships.push(rel);
    }
}

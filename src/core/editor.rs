//! Editing session
//!
//! [`EditorSession`] is the only writer of the board model. Every command
//! validates its input first, then pushes an undo snapshot, mutates the
//! schema, keeps foreign-key fields in sync and schedules a debounced save.
//! A failed command leaves both the model and the history untouched.
//!
//! View state (pan, zoom, selection, gestures, measured connection points)
//! lives in [`ViewState`] and never reaches the document store.

use crate::core::auto_layout::auto_layout;
use crate::core::collab::store::{BoardDocument, BoardId, DocumentPatch, DocumentStore, StoreError};
use crate::core::collab::throttling::SaveDebouncer;
use crate::core::config::Config;
use crate::core::export::json::import_json;
use crate::core::export::{ExportArtifact, ExportError, ExportFormat, ExportOptions, export_schema};
use crate::core::foreign_keys::{place_foreign_keys, remove_foreign_keys, repair_foreign_keys, resync_foreign_keys};
use crate::core::geometry::{
    BezierCurve, ConnectionPoints, Point, ScreenRect, Viewport, box_select, preview_curve,
    relationship_curve,
};
use crate::core::history::History;
use crate::core::normalize::{NormalizeReport, RawBoardData, normalize_board};
use crate::core::schema::{
    Cardinality, ConnectionSide, EnumDef, Field, FieldId, FieldType, Relationship, RelationshipId,
    Schema, TableId, create_default_table,
};
use crate::core::sql_parser::{ImportError, parse_sql};
use crate::core::validation::{SchemaWarning, validate_schema};
use rand::Rng;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, warn};

pub const DEFAULT_FIELD_NAME: &str = "new_field";
/// Zoom anchor used before the pointer ever moved over the canvas
pub const DEFAULT_POINTER: Point = Point::new(400.0, 300.0);
/// Message shown to the user when a save fails
pub const SAVE_FAILED_MESSAGE: &str = "Changes could not be saved";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EditorError {
    #[error("Table {0} not found")]
    UnknownTable(TableId),
    #[error("Field {field} not found in table {table}")]
    UnknownField { table: TableId, field: FieldId },
    #[error("Relationship {0} not found")]
    UnknownRelationship(RelationshipId),
    #[error("Enum {0} not found")]
    UnknownEnum(String),
    #[error("Enum {0} already exists")]
    DuplicateEnum(String),
    #[error("Enum name cannot be empty")]
    EmptyEnumName,
    #[error("Enum field {0} must reference an enum")]
    MissingEnumRef(FieldId),
    #[error("Field {0} is a foreign key managed by its relationship")]
    DerivedForeignKey(FieldId),
}

/// In-progress pointer gesture
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    /// Drawing a relationship from a connection point
    Connecting { table_id: TableId, side: ConnectionSide },
    /// Rubber-band selection, corners in content space
    BoxSelecting { start: Point, current: Point },
}

/// Ephemeral per-session view state
#[derive(Clone, Debug)]
pub struct ViewState {
    pub viewport: Viewport,
    /// Last pointer position in viewport pixels
    pub pointer: Point,
    pub selected_table: Option<TableId>,
    pub selected_relationship: Option<RelationshipId>,
    pub box_selection: Vec<TableId>,
    pub gesture: Gesture,
    /// Cardinality given to relationships drawn with the connection gesture
    pub connecting_cardinality: Cardinality,
    pub connection_points: ConnectionPoints,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            pointer: DEFAULT_POINTER,
            selected_table: None,
            selected_relationship: None,
            box_selection: Vec::new(),
            gesture: Gesture::Idle,
            connecting_cardinality: Cardinality::default(),
            connection_points: ConnectionPoints::new(),
        }
    }
}

/// Partial field edit; `None` leaves the attribute alone
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldUpdate {
    pub name: Option<String>,
    pub field_type: Option<FieldType>,
    pub hint: Option<Option<String>>,
    pub is_primary: Option<bool>,
    /// Setting an enum reference also sets the type to enum
    pub enum_ref: Option<Option<String>>,
}

impl FieldUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn retype(field_type: FieldType) -> Self {
        Self {
            field_type: Some(field_type),
            ..Default::default()
        }
    }

    pub fn enum_ref(name: impl Into<String>) -> Self {
        Self {
            enum_ref: Some(Some(name.into())),
            ..Default::default()
        }
    }
}

/// What a load or remote replacement changed while normalizing
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadOutcome {
    pub report: NormalizeReport,
    pub repaired_fields: usize,
    pub created_default_table: bool,
}

impl LoadOutcome {
    pub fn needs_save(&self) -> bool {
        self.report.needs_save() || self.repaired_fields > 0 || self.created_default_table
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub tables: usize,
    pub relationships: usize,
    pub enums: usize,
}

impl ImportSummary {
    fn of(schema: &Schema) -> Self {
        Self {
            tables: schema.tables.len(),
            relationships: schema.relationships.len(),
            enums: schema.enums.len(),
        }
    }
}

pub struct EditorSession {
    board_id: Option<BoardId>,
    schema: Schema,
    view: ViewState,
    history: History,
    autosave: SaveDebouncer,
    export_options: ExportOptions,
    loading: bool,
    saving: bool,
    last_save_error: Option<String>,
}

impl EditorSession {
    /// Session waiting for its first document; commands issued before the
    /// load neither snapshot nor save
    pub fn new(board_id: Option<BoardId>) -> Self {
        Self::with_config(board_id, &Config::default())
    }

    pub fn with_config(board_id: Option<BoardId>, config: &Config) -> Self {
        Self {
            board_id,
            schema: Schema::default(),
            view: ViewState::default(),
            history: History::with_depth(config.undo_depth),
            autosave: SaveDebouncer::with_delay(config.autosave_delay),
            export_options: ExportOptions {
                default_rows: config.export_rows,
                ..Default::default()
            },
            loading: true,
            saving: false,
            last_save_error: None,
        }
    }

    /// Loaded session over an existing schema, without a document store
    pub fn from_schema(schema: Schema) -> Self {
        let mut session = Self::new(None);
        session.schema = schema;
        session.loading = false;
        session
    }

    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn last_save_error(&self) -> Option<&str> {
        self.last_save_error.as_deref()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn undo_depth(&self) -> usize {
        self.history.len()
    }

    pub fn export_options(&self) -> &ExportOptions {
        &self.export_options
    }

    pub fn export_options_mut(&mut self) -> &mut ExportOptions {
        &mut self.export_options
    }

    // ========================================================================
    // Command plumbing
    // ========================================================================

    fn begin(&mut self) {
        if !self.loading {
            self.history.push(&self.schema);
        }
    }

    fn commit(&mut self) {
        self.prune_view();
        self.schedule_save();
    }

    fn schedule_save(&mut self) {
        if !self.loading {
            self.autosave.schedule(Instant::now());
        }
    }

    /// Drop view references to entities that no longer exist
    fn prune_view(&mut self) {
        let schema = &self.schema;
        let view = &mut self.view;
        if let Some(id) = &view.selected_table
            && schema.table(id).is_none()
        {
            view.selected_table = None;
        }
        if let Some(id) = &view.selected_relationship
            && !schema
                .relationship(id)
                .is_some_and(|r| schema.is_valid_relationship(r))
        {
            view.selected_relationship = None;
        }
        view.box_selection.retain(|id| schema.table(id).is_some());
        if let Gesture::Connecting { table_id, .. } = &view.gesture
            && schema.table(table_id).is_none()
        {
            view.gesture = Gesture::Idle;
        }
        view.connection_points.retain_tables(schema);
    }

    fn require_table(&self, table_id: &str) -> Result<(), EditorError> {
        match self.schema.table(table_id) {
            Some(_) => Ok(()),
            None => Err(EditorError::UnknownTable(table_id.to_string())),
        }
    }

    fn require_relationship(&self, relationship_id: &str) -> Result<&Relationship, EditorError> {
        self.schema
            .relationship(relationship_id)
            .ok_or_else(|| EditorError::UnknownRelationship(relationship_id.to_string()))
    }

    fn require_field(&self, table_id: &str, field_id: &str) -> Result<&Field, EditorError> {
        let table = self
            .schema
            .table(table_id)
            .ok_or_else(|| EditorError::UnknownTable(table_id.to_string()))?;
        table.field(field_id).ok_or_else(|| EditorError::UnknownField {
            table: table_id.to_string(),
            field: field_id.to_string(),
        })
    }

    // ========================================================================
    // Loading and remote changes
    // ========================================================================

    /// Replace the model with a stored board.
    ///
    /// The first call ends the loading phase: an empty board receives the
    /// default table, and nothing is snapshotted. Later calls are remote
    /// change notifications and keep the undo history.
    pub fn load(&mut self, name: &str, data: RawBoardData) -> LoadOutcome {
        let (mut schema, report) = normalize_board(name, data);
        let repaired_fields = repair_foreign_keys(&mut schema);
        let mut outcome = LoadOutcome {
            report,
            repaired_fields,
            created_default_table: false,
        };

        let initial = self.loading;
        if initial && schema.tables.is_empty() {
            let table = create_default_table();
            self.view.selected_table = Some(table.id.clone());
            schema.tables.push(table);
            outcome.created_default_table = true;
        }
        self.schema = schema;
        self.loading = false;
        self.prune_view();

        if outcome.needs_save() {
            self.schedule_save();
        }
        debug!(
            tables = self.schema.tables.len(),
            relationships = self.schema.relationships.len(),
            repaired = outcome.repaired_fields,
            initial,
            "loaded board"
        );
        outcome
    }

    /// Handle a document store notification. Returns `None` when the board
    /// no longer exists; the host should leave the editor.
    pub fn apply_remote(&mut self, document: Option<BoardDocument>) -> Option<LoadOutcome> {
        let Some(document) = document else {
            warn!(board_id = ?self.board_id, "board document is missing");
            return None;
        };
        Some(self.load(&document.name, document.data))
    }

    // ========================================================================
    // Board and tables
    // ========================================================================

    pub fn rename_board(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name == self.schema.name {
            return;
        }
        self.begin();
        self.schema.name = name;
        self.commit();
    }

    /// Add the default table and select it
    pub fn add_table(&mut self) -> TableId {
        self.begin();
        let table = create_default_table();
        let id = table.id.clone();
        self.schema.tables.push(table);
        self.view.selected_table = Some(id.clone());
        self.view.selected_relationship = None;
        self.commit();
        id
    }

    pub fn rename_table(&mut self, table_id: &str, name: impl Into<String>) -> Result<(), EditorError> {
        self.require_table(table_id)?;
        self.begin();
        if let Some(table) = self.schema.table_mut(table_id) {
            table.name = name.into();
        }
        self.commit();
        Ok(())
    }

    pub fn set_table_icon(&mut self, table_id: &str, icon: impl Into<String>) -> Result<(), EditorError> {
        self.require_table(table_id)?;
        self.begin();
        if let Some(table) = self.schema.table_mut(table_id) {
            table.icon = icon.into();
        }
        self.commit();
        Ok(())
    }

    /// Apply a finished drag; the delta is in content units
    pub fn move_table(&mut self, table_id: &str, dx: f64, dy: f64) -> Result<(), EditorError> {
        self.require_table(table_id)?;
        self.begin();
        if let Some(table) = self.schema.table_mut(table_id) {
            table.x += dx;
            table.y += dy;
        }
        self.view.connection_points.invalidate(table_id);
        self.commit();
        Ok(())
    }

    /// Remove a table, its relationships and every field they generated
    pub fn remove_table(&mut self, table_id: &str) -> Result<(), EditorError> {
        self.require_table(table_id)?;
        self.begin();
        let removed: Vec<RelationshipId> = self
            .schema
            .relationships
            .iter()
            .filter(|r| r.touches(table_id))
            .map(|r| r.id.clone())
            .collect();
        self.schema.relationships.retain(|r| !r.touches(table_id));
        self.schema.tables.retain(|t| t.id != table_id);
        for id in &removed {
            remove_foreign_keys(&mut self.schema, id);
        }
        self.commit();
        debug!(table_id, relationships = removed.len(), "removed table");
        Ok(())
    }

    pub fn select_table(&mut self, table_id: &str) {
        self.view.selected_table = Some(table_id.to_string());
        self.view.selected_relationship = None;
    }

    pub fn select_relationship(&mut self, relationship_id: &str) {
        self.view.selected_table = None;
        self.view.selected_relationship = Some(relationship_id.to_string());
    }

    pub fn clear_selection(&mut self) {
        self.view.selected_table = None;
        self.view.selected_relationship = None;
        self.view.box_selection.clear();
    }

    // ========================================================================
    // Fields
    // ========================================================================

    pub fn add_field(&mut self, table_id: &str) -> Result<FieldId, EditorError> {
        self.require_table(table_id)?;
        self.begin();
        let field = Field::new(DEFAULT_FIELD_NAME, FieldType::String);
        let id = field.id.clone();
        if let Some(table) = self.schema.table_mut(table_id) {
            table.fields.push(field);
        }
        self.view.connection_points.invalidate(table_id);
        self.commit();
        Ok(id)
    }

    /// Edit a field. Foreign-key fields accept a new name, hint or primary
    /// flag but their type belongs to the relationship.
    pub fn update_field(
        &mut self,
        table_id: &str,
        field_id: &str,
        update: FieldUpdate,
    ) -> Result<(), EditorError> {
        let current = self.require_field(table_id, field_id)?;
        if current.is_foreign_key() && (update.field_type.is_some() || update.enum_ref.is_some()) {
            return Err(EditorError::DerivedForeignKey(field_id.to_string()));
        }

        let mut field = current.clone();
        if let Some(name) = update.name {
            field.name = name;
        }
        if let Some(hint) = update.hint {
            field.hint = hint.filter(|h| !h.trim().is_empty());
        }
        if let Some(is_primary) = update.is_primary {
            field.is_primary = is_primary;
        }
        if let Some(field_type) = update.field_type {
            field.field_type = field_type;
        }
        if let Some(enum_ref) = update.enum_ref {
            if enum_ref.is_some() {
                field.field_type = FieldType::Enum;
            }
            field.enum_ref = enum_ref;
        }
        if field.field_type == FieldType::Enum {
            match field.enum_ref.as_deref() {
                Some(name) if self.schema.enum_def(name).is_some() => {}
                Some(name) => return Err(EditorError::UnknownEnum(name.to_string())),
                None => return Err(EditorError::MissingEnumRef(field_id.to_string())),
            }
        } else {
            field.enum_ref = None;
        }
        if field == *current {
            return Ok(());
        }

        self.begin();
        if let Some(slot) = self
            .schema
            .table_mut(table_id)
            .and_then(|t| t.field_mut(field_id))
        {
            *slot = field;
        }
        self.commit();
        Ok(())
    }

    pub fn remove_field(&mut self, table_id: &str, field_id: &str) -> Result<(), EditorError> {
        if self.require_field(table_id, field_id)?.is_foreign_key() {
            return Err(EditorError::DerivedForeignKey(field_id.to_string()));
        }
        self.begin();
        if let Some(table) = self.schema.table_mut(table_id) {
            table.fields.retain(|f| f.id != field_id);
        }
        self.view.connection_points.invalidate(table_id);
        self.commit();
        Ok(())
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Create a relationship and the foreign-key fields its cardinality requires
    pub fn add_relationship(
        &mut self,
        from_table_id: &str,
        from_side: Option<ConnectionSide>,
        to_table_id: &str,
        to_side: Option<ConnectionSide>,
        cardinality: Cardinality,
    ) -> Result<RelationshipId, EditorError> {
        self.require_table(from_table_id)?;
        self.require_table(to_table_id)?;
        self.begin();
        let mut rel = Relationship::new(from_table_id, to_table_id, cardinality);
        rel.from_side = from_side;
        rel.to_side = to_side;
        let id = rel.id.clone();
        let placed = place_foreign_keys(&mut self.schema, &rel);
        self.schema.relationships.push(rel);
        self.view.connection_points.invalidate(from_table_id);
        self.view.connection_points.invalidate(to_table_id);
        self.commit();
        debug!(relationship_id = %id, %cardinality, placed, "added relationship");
        Ok(id)
    }

    pub fn set_cardinality(
        &mut self,
        relationship_id: &str,
        cardinality: Cardinality,
    ) -> Result<(), EditorError> {
        if self.require_relationship(relationship_id)?.cardinality == cardinality {
            return Ok(());
        }
        self.begin();
        if let Some(rel) = self
            .schema
            .relationships
            .iter_mut()
            .find(|r| r.id == relationship_id)
        {
            rel.cardinality = cardinality;
        }
        resync_foreign_keys(&mut self.schema, relationship_id);
        self.commit();
        Ok(())
    }

    /// Swap source and target (and their sides), then re-place foreign keys
    pub fn reverse_relationship(&mut self, relationship_id: &str) -> Result<(), EditorError> {
        self.require_relationship(relationship_id)?;
        self.begin();
        if let Some(rel) = self
            .schema
            .relationships
            .iter_mut()
            .find(|r| r.id == relationship_id)
        {
            *rel = rel.reversed();
        }
        resync_foreign_keys(&mut self.schema, relationship_id);
        self.commit();
        Ok(())
    }

    pub fn remove_relationship(&mut self, relationship_id: &str) -> Result<(), EditorError> {
        self.require_relationship(relationship_id)?;
        self.begin();
        self.schema.relationships.retain(|r| r.id != relationship_id);
        remove_foreign_keys(&mut self.schema, relationship_id);
        self.commit();
        Ok(())
    }

    // ========================================================================
    // Enums
    // ========================================================================

    fn normalized_enum_name(&self, name: &str) -> Result<String, EditorError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EditorError::EmptyEnumName);
        }
        if self.schema.enum_def(name).is_some() {
            return Err(EditorError::DuplicateEnum(name.to_string()));
        }
        Ok(name.to_string())
    }

    pub fn add_enum<S: Into<String>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = S>,
    ) -> Result<(), EditorError> {
        let name = self.normalized_enum_name(name)?;
        self.begin();
        let mut def = EnumDef::new(name, Vec::<String>::new());
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        def.merge_values(&values);
        self.schema.enums.push(def);
        self.commit();
        Ok(())
    }

    /// Rename an enum and every field reference to it
    pub fn rename_enum(&mut self, name: &str, new_name: &str) -> Result<(), EditorError> {
        if self.schema.enum_def(name).is_none() {
            return Err(EditorError::UnknownEnum(name.to_string()));
        }
        if new_name.trim() == name {
            return Ok(());
        }
        let new_name = self.normalized_enum_name(new_name)?;
        self.begin();
        if let Some(def) = self.schema.enum_def_mut(name) {
            def.name = new_name.clone();
        }
        for field in self.schema.tables.iter_mut().flat_map(|t| t.fields.iter_mut()) {
            if field.enum_ref.as_deref() == Some(name) {
                field.enum_ref = Some(new_name.clone());
            }
        }
        self.commit();
        Ok(())
    }

    /// Replace the values of an enum; duplicates are dropped
    pub fn set_enum_values<S: Into<String>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = S>,
    ) -> Result<(), EditorError> {
        if self.schema.enum_def(name).is_none() {
            return Err(EditorError::UnknownEnum(name.to_string()));
        }
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        self.begin();
        if let Some(def) = self.schema.enum_def_mut(name) {
            def.values.clear();
            def.merge_values(&values);
        }
        self.commit();
        Ok(())
    }

    /// Remove an enum; fields that referenced it become plain strings
    pub fn remove_enum(&mut self, name: &str) -> Result<(), EditorError> {
        if self.schema.enum_def(name).is_none() {
            return Err(EditorError::UnknownEnum(name.to_string()));
        }
        self.begin();
        self.schema.enums.retain(|e| e.name != name);
        for field in self.schema.tables.iter_mut().flat_map(|t| t.fields.iter_mut()) {
            if field.enum_ref.as_deref() == Some(name) {
                field.enum_ref = None;
                field.field_type = FieldType::String;
            }
        }
        self.commit();
        Ok(())
    }

    // ========================================================================
    // Undo and layout
    // ========================================================================

    /// Restore the most recent snapshot. Returns false when there is none.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.pop() else {
            return false;
        };
        self.schema = snapshot.restore();
        self.commit();
        true
    }

    /// Layered auto-layout of every table
    pub fn auto_layout(&mut self) {
        self.begin();
        auto_layout(&mut self.schema);
        self.view.connection_points.clear();
        self.commit();
    }

    // ========================================================================
    // Viewport and gestures
    // ========================================================================

    pub fn zoom_in(&mut self) {
        let anchor = self.view.pointer;
        self.view.viewport.zoom_in(anchor);
    }

    pub fn zoom_out(&mut self) {
        let anchor = self.view.pointer;
        self.view.viewport.zoom_out(anchor);
    }

    pub fn set_zoom_percent(&mut self, percent: f64) {
        let anchor = self.view.pointer;
        self.view.viewport.set_zoom_percent(percent, anchor);
    }

    /// Ctrl/meta + wheel over the canvas, `anchor` in canvas-relative pixels
    pub fn wheel(&mut self, delta_y: f64, modifier: bool, anchor: Point) -> bool {
        self.view.pointer = anchor;
        self.view.viewport.wheel(delta_y, modifier, anchor)
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.view.viewport.pan_by(dx, dy);
    }

    pub fn set_connecting_cardinality(&mut self, cardinality: Cardinality) {
        self.view.connecting_cardinality = cardinality;
    }

    /// Store the rendered position of a connection handle
    pub fn record_connection_point(
        &mut self,
        table_id: &str,
        side: ConnectionSide,
        element: ScreenRect,
        canvas: ScreenRect,
    ) {
        let viewport = self.view.viewport;
        self.view
            .connection_points
            .record(table_id, side, element, canvas, &viewport);
    }

    /// Press or click on a connection point: starts a connection, cancels it
    /// when it is the starting point, or completes it on any other point
    pub fn connection_point_pressed(
        &mut self,
        table_id: &str,
        side: ConnectionSide,
    ) -> Result<Option<RelationshipId>, EditorError> {
        self.require_table(table_id)?;
        match std::mem::take(&mut self.view.gesture) {
            Gesture::Connecting {
                table_id: from,
                side: from_side,
            } => {
                if from == table_id && from_side == side {
                    return Ok(None);
                }
                let cardinality = self.view.connecting_cardinality;
                self.add_relationship(&from, Some(from_side), table_id, Some(side), cardinality)
                    .map(Some)
            }
            _ => {
                self.view.gesture = Gesture::Connecting {
                    table_id: table_id.to_string(),
                    side,
                };
                Ok(None)
            }
        }
    }

    /// Track the pointer (viewport pixels) for previews, zoom anchoring and
    /// box selection
    pub fn pointer_moved(&mut self, pointer: Point) {
        self.view.pointer = pointer;
        let content = self.view.viewport.to_content(pointer);
        if let Gesture::BoxSelecting { start, current } = &mut self.view.gesture {
            *current = content;
            let start = *start;
            self.view.box_selection = box_select(&self.schema, start, content);
        }
    }

    /// Pointer released, over a connection point or not. Completes a
    /// connection drawn by dragging, or finishes a box selection.
    pub fn pointer_released(&mut self, target: Option<(&str, ConnectionSide)>) -> Option<RelationshipId> {
        match std::mem::take(&mut self.view.gesture) {
            Gesture::Connecting {
                table_id: from,
                side: from_side,
            } => match target {
                // a click on the starting point keeps the gesture alive
                Some((to, side)) if to == from && side == from_side => {
                    self.view.gesture = Gesture::Connecting {
                        table_id: from,
                        side: from_side,
                    };
                    None
                }
                Some((to, side)) => {
                    let cardinality = self.view.connecting_cardinality;
                    self.add_relationship(&from, Some(from_side), to, Some(side), cardinality)
                        .ok()
                }
                None => None,
            },
            Gesture::BoxSelecting { start, current } => {
                self.view.box_selection = box_select(&self.schema, start, current);
                None
            }
            Gesture::Idle => None,
        }
    }

    /// Start a rubber-band selection at a viewport point
    pub fn begin_box_selection(&mut self, pointer: Point) {
        if self.view.gesture != Gesture::Idle {
            return;
        }
        self.view.pointer = pointer;
        let start = self.view.viewport.to_content(pointer);
        self.clear_selection();
        self.view.gesture = Gesture::BoxSelecting {
            start,
            current: start,
        };
    }

    /// Escape: abort any gesture
    pub fn cancel_gesture(&mut self) {
        self.view.gesture = Gesture::Idle;
    }

    /// Curve from the connection start to the pointer while connecting
    pub fn connection_preview(&self) -> Option<BezierCurve> {
        let Gesture::Connecting { table_id, side } = &self.view.gesture else {
            return None;
        };
        let start = self
            .view
            .connection_points
            .resolve(&self.schema, table_id, *side)?;
        let pointer = self.view.viewport.to_content(self.view.pointer);
        Some(preview_curve(start, pointer))
    }

    /// Edge curves of every valid relationship
    pub fn relationship_curves(&self) -> Vec<(&Relationship, BezierCurve)> {
        self.schema
            .valid_relationships()
            .filter_map(|rel| {
                relationship_curve(&self.schema, &self.view.connection_points, rel)
                    .map(|curve| (rel, curve))
            })
            .collect()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn save_pending(&self) -> bool {
        self.autosave.is_pending()
    }

    /// Time left before the debounced save fires
    pub fn next_save_in(&self, now: Instant) -> Option<Duration> {
        self.autosave.remaining(now)
    }

    /// Payload of the debounced save once its delay elapsed
    pub fn take_due_save(&mut self, now: Instant) -> Option<DocumentPatch> {
        if self.loading || !self.autosave.take_due(now) {
            return None;
        }
        self.saving = true;
        Some(DocumentPatch::from_schema(&self.schema))
    }

    pub fn finish_save(&mut self, result: Result<(), StoreError>) {
        self.saving = false;
        match result {
            Ok(()) => self.last_save_error = None,
            Err(err) => {
                error!(board_id = ?self.board_id, error = %err, "failed to save board");
                self.last_save_error = Some(SAVE_FAILED_MESSAGE.to_string());
            }
        }
    }

    /// Write the board if the debounced save is due. Returns whether a write
    /// was attempted.
    pub async fn flush<S: DocumentStore>(&mut self, store: &S, now: Instant) -> bool {
        let Some(board_id) = self.board_id.clone() else {
            return false;
        };
        let Some(patch) = self.take_due_save(now) else {
            return false;
        };
        let result = store.update(&board_id, patch).await;
        self.finish_save(result);
        true
    }

    // ========================================================================
    // Import, export and lint
    // ========================================================================

    fn replace_model(&mut self, imported: Schema) -> ImportSummary {
        self.begin();
        self.schema.tables = imported.tables;
        self.schema.relationships = imported.relationships;
        self.schema.enums = imported.enums;
        repair_foreign_keys(&mut self.schema);
        self.view.connection_points.clear();
        self.commit();
        ImportSummary::of(&self.schema)
    }

    /// Replace the model with tables parsed from DDL text. On error the
    /// current model is untouched.
    pub fn import_sql(&mut self, sql: &str) -> Result<ImportSummary, ImportError> {
        let parsed = parse_sql(sql)?;
        let imported = Schema {
            name: self.schema.name.clone(),
            tables: parsed.tables,
            relationships: parsed.relationships,
            enums: parsed.enums,
        };
        Ok(self.replace_model(imported))
    }

    /// Replace the model with an interchange document
    pub fn import_json(&mut self, text: &str) -> Result<ImportSummary, ImportError> {
        let imported = import_json(text, &self.schema.name)?;
        Ok(self.replace_model(imported.schema))
    }

    pub fn export<R: Rng>(&self, format: ExportFormat, rng: &mut R) -> Result<ExportArtifact, ExportError> {
        export_schema(&self.schema, format, &self.export_options, rng)
    }

    pub fn validate(&self) -> Vec<SchemaWarning> {
        validate_schema(&self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collab::store::MemoryStore;
    use crate::core::normalize::RawRelationship;
    use crate::core::schema::Table;

    fn loaded() -> EditorSession {
        let mut session = EditorSession::new(Some("board".into()));
        let mut schema = Schema::new("board");
        schema.tables = vec![
            Table::new("User")
                .with_id("u")
                .add_field(Field::new("id", FieldType::Uuid).primary_key()),
            Table::new("Post")
                .with_id("p")
                .with_position(400.0, 0.0)
                .add_field(Field::new("id", FieldType::Integer).primary_key()),
        ];
        session.load("board", RawBoardData::from(&schema));
        session
    }

    fn fk_fields<'a>(session: &'a EditorSession, table_id: &str, rel_id: &str) -> Vec<&'a Field> {
        session
            .schema()
            .table(table_id)
            .map(|t| t.fields.iter().filter(|f| f.references(rel_id)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_initial_load_adds_default_table_without_snapshot() {
        let mut session = EditorSession::new(Some("b".into()));
        let outcome = session.load("Empty", RawBoardData::default());
        assert!(outcome.created_default_table);
        assert!(!session.is_loading());
        assert_eq!(session.schema().tables.len(), 1);
        assert_eq!(session.schema().tables[0].name, "NewTable");
        assert!(!session.can_undo());
        assert!(session.save_pending());
    }

    #[test]
    fn test_remote_load_does_not_add_default_table() {
        let mut session = loaded();
        let outcome = session.load("board", RawBoardData::default());
        assert!(!outcome.created_default_table);
        assert!(session.schema().tables.is_empty());
    }

    #[test]
    fn test_commands_before_load_do_not_snapshot() {
        let mut session = EditorSession::new(None);
        session.add_table();
        assert!(!session.can_undo());
        assert!(!session.save_pending());
    }

    #[test]
    fn test_relationship_lifecycle_keeps_foreign_keys_in_sync() {
        let mut session = loaded();
        let rel = session
            .add_relationship("u", None, "p", None, Cardinality::OneToMany)
            .unwrap();
        let fks = fk_fields(&session, "p", &rel);
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].name, "UserId");
        assert!(fk_fields(&session, "u", &rel).is_empty());

        session.set_cardinality(&rel, Cardinality::ManyToMany).unwrap();
        assert_eq!(fk_fields(&session, "p", &rel).len(), 1);
        assert_eq!(fk_fields(&session, "u", &rel)[0].name, "PostId");

        session.set_cardinality(&rel, Cardinality::OneToOne).unwrap();
        session.reverse_relationship(&rel).unwrap();
        assert!(fk_fields(&session, "p", &rel).is_empty());
        assert_eq!(fk_fields(&session, "u", &rel)[0].name, "PostId");

        session.remove_relationship(&rel).unwrap();
        assert!(fk_fields(&session, "u", &rel).is_empty());
        assert_eq!(session.schema().table("u").unwrap().fields.len(), 1);
    }

    #[test]
    fn test_unchanged_cardinality_is_a_no_op() {
        let mut session = loaded();
        let rel = session
            .add_relationship("u", None, "p", None, Cardinality::OneToMany)
            .unwrap();
        let depth = session.undo_depth();
        session.set_cardinality(&rel, Cardinality::OneToMany).unwrap();
        assert_eq!(session.undo_depth(), depth);
    }

    #[test]
    fn test_failed_command_leaves_history_alone() {
        let mut session = loaded();
        assert_eq!(
            session.rename_table("ghost", "x"),
            Err(EditorError::UnknownTable("ghost".into()))
        );
        assert_eq!(
            session.set_cardinality("nope", Cardinality::OneToOne),
            Err(EditorError::UnknownRelationship("nope".into()))
        );
        assert!(!session.can_undo());
    }

    #[test]
    fn test_derived_fields_cannot_be_retyped_or_removed() {
        let mut session = loaded();
        let rel = session
            .add_relationship("u", None, "p", None, Cardinality::OneToMany)
            .unwrap();
        let fk = fk_fields(&session, "p", &rel)[0].id.clone();
        assert_eq!(
            session.update_field("p", &fk, FieldUpdate::retype(FieldType::Text)),
            Err(EditorError::DerivedForeignKey(fk.clone()))
        );
        assert_eq!(
            session.remove_field("p", &fk),
            Err(EditorError::DerivedForeignKey(fk.clone()))
        );
        session.update_field("p", &fk, FieldUpdate::rename("author_id")).unwrap();
        assert_eq!(fk_fields(&session, "p", &rel)[0].name, "author_id");
    }

    #[test]
    fn test_field_edits_and_enum_rules() {
        let mut session = loaded();
        let field = session.add_field("u").unwrap();
        assert_eq!(
            session.schema().table("u").unwrap().field(&field).unwrap().name,
            DEFAULT_FIELD_NAME
        );
        assert_eq!(
            session.update_field("u", &field, FieldUpdate::retype(FieldType::Enum)),
            Err(EditorError::MissingEnumRef(field.clone()))
        );
        assert_eq!(
            session.update_field("u", &field, FieldUpdate::enum_ref("Role")),
            Err(EditorError::UnknownEnum("Role".into()))
        );

        session.add_enum("Role", ["admin", "member", "admin"]).unwrap();
        assert_eq!(session.schema().enum_def("Role").unwrap().values, vec!["admin", "member"]);
        assert_eq!(
            session.add_enum(" Role ", Vec::<String>::new()),
            Err(EditorError::DuplicateEnum("Role".into()))
        );
        session.update_field("u", &field, FieldUpdate::enum_ref("Role")).unwrap();

        session.rename_enum("Role", "UserRole").unwrap();
        let stored = session.schema().table("u").unwrap().field(&field).unwrap().clone();
        assert_eq!(stored.field_type, FieldType::Enum);
        assert_eq!(stored.enum_ref.as_deref(), Some("UserRole"));

        session.remove_enum("UserRole").unwrap();
        let stored = session.schema().table("u").unwrap().field(&field).unwrap();
        assert_eq!(stored.field_type, FieldType::String);
        assert_eq!(stored.enum_ref, None);
    }

    #[test]
    fn test_connection_gesture() {
        let mut session = loaded();
        session.set_connecting_cardinality(Cardinality::OneToOne);

        assert_eq!(session.connection_point_pressed("u", ConnectionSide::Right), Ok(None));
        session.pointer_moved(Point::new(300.0, 200.0));
        let preview = session.connection_preview().unwrap();
        assert_eq!(preview.end, session.view().viewport.to_content(Point::new(300.0, 200.0)));

        // click on the same point cancels
        assert_eq!(session.connection_point_pressed("u", ConnectionSide::Right), Ok(None));
        assert_eq!(session.view().gesture, Gesture::Idle);

        session.connection_point_pressed("u", ConnectionSide::Right).unwrap();
        let rel = session
            .connection_point_pressed("p", ConnectionSide::Left)
            .unwrap()
            .unwrap();
        let stored = session.schema().relationship(&rel).unwrap();
        assert_eq!(stored.cardinality, Cardinality::OneToOne);
        assert_eq!(stored.from_side, Some(ConnectionSide::Right));
        assert_eq!(stored.to_side, Some(ConnectionSide::Left));
        assert_eq!(session.view().gesture, Gesture::Idle);
    }

    #[test]
    fn test_drag_release_and_escape() {
        let mut session = loaded();
        session.connection_point_pressed("u", ConnectionSide::Bottom).unwrap();
        assert_eq!(session.pointer_released(Some(("u", ConnectionSide::Bottom))), None);
        assert!(matches!(session.view().gesture, Gesture::Connecting { .. }));

        assert_eq!(session.pointer_released(None), None);
        assert_eq!(session.view().gesture, Gesture::Idle);
        assert!(session.schema().relationships.is_empty());

        session.connection_point_pressed("u", ConnectionSide::Bottom).unwrap();
        session.cancel_gesture();
        assert!(session.connection_preview().is_none());

        session.connection_point_pressed("u", ConnectionSide::Bottom).unwrap();
        let rel = session.pointer_released(Some(("p", ConnectionSide::Top)));
        assert!(rel.is_some());
        assert_eq!(session.schema().relationships.len(), 1);
    }

    #[test]
    fn test_box_selection() {
        let mut session = loaded();
        session.begin_box_selection(Point::new(0.0, 0.0));
        session.pointer_moved(Point::new(100.0, 100.0));
        assert_eq!(session.view().box_selection, vec!["u".to_string()]);
        session.pointer_moved(Point::new(700.0, 100.0));
        session.pointer_released(None);
        assert_eq!(session.view().box_selection, vec!["u".to_string(), "p".to_string()]);
        assert_eq!(session.view().gesture, Gesture::Idle);

        session.begin_box_selection(Point::new(50.0, 50.0));
        session.pointer_moved(Point::new(52.0, 53.0));
        session.pointer_released(None);
        assert!(session.view().box_selection.is_empty());
    }

    #[test]
    fn test_zoom_uses_pointer_as_anchor() {
        let mut session = loaded();
        session.pointer_moved(Point::new(250.0, 120.0));
        let before = session.view().viewport.to_content(Point::new(250.0, 120.0));
        session.zoom_in();
        session.zoom_in();
        let after = session.view().viewport.to_content(Point::new(250.0, 120.0));
        assert!((before.x - after.x).abs() < 1e-9);
        assert!((before.y - after.y).abs() < 1e-9);
        assert_eq!(session.view().viewport.zoom_percent(), 150);
        assert!(!session.can_undo());
    }

    #[test]
    fn test_remove_table_clears_selection_and_fields() {
        let mut session = loaded();
        let rel = session
            .add_relationship("u", None, "p", None, Cardinality::ManyToMany)
            .unwrap();
        session.select_relationship(&rel);
        session.remove_table("p").unwrap();
        assert!(session.schema().relationships.is_empty());
        assert!(fk_fields(&session, "u", &rel).is_empty());
        assert_eq!(session.view().selected_relationship, None);

        assert!(session.undo());
        assert_eq!(session.schema().tables.len(), 2);
        assert_eq!(session.schema().relationships.len(), 1);
    }

    #[test]
    fn test_import_replaces_model_and_is_undoable() {
        let mut session = loaded();
        assert_eq!(session.import_sql("nothing here"), Err(ImportError::NoTablesFound));
        assert_eq!(session.schema().tables.len(), 2);
        assert!(!session.can_undo());

        let summary = session
            .import_sql("CREATE TABLE a (id INT PRIMARY KEY); CREATE TABLE b (id INT, a_id INT REFERENCES a(id));")
            .unwrap();
        assert_eq!(summary, ImportSummary { tables: 2, relationships: 1, enums: 0 });
        assert_eq!(session.schema().name, "board");
        assert!(session.undo());
        assert_eq!(session.schema().table("u").map(|t| t.name.as_str()), Some("User"));
    }

    #[test]
    fn test_remote_replacement_repairs_and_keeps_history() {
        let mut session = loaded();
        session.add_table();
        let mut data = RawBoardData::from(session.schema());
        data.relationships.push(RawRelationship {
            id: "r".into(),
            from_table_id: "u".into(),
            to_table_id: "p".into(),
            cardinality: "1:1".into(),
            ..Default::default()
        });
        let outcome = session
            .apply_remote(Some(BoardDocument::new("renamed", None, data)))
            .unwrap();
        assert_eq!(outcome.repaired_fields, 1);
        assert_eq!(session.schema().name, "renamed");
        assert_eq!(fk_fields(&session, "p", "r").len(), 1);
        assert!(session.can_undo());
        assert!(session.apply_remote(None).is_none());
    }

    #[tokio::test]
    async fn test_debounced_flush_and_failure_flag() {
        let store = MemoryStore::new();
        let board_id = store
            .create(BoardDocument::from_schema(&Schema::new("b"), None))
            .await
            .unwrap();
        let mut session = EditorSession::new(Some(board_id.clone()));
        session.load("b", RawBoardData::default());
        session.rename_board("renamed");
        session.add_table();

        let now = Instant::now();
        assert!(!session.flush(&store, now).await);
        let later = now + Duration::from_secs(1);
        assert!(session.flush(&store, later).await);
        assert!(!session.is_saving());
        assert_eq!(store.get(&board_id).unwrap().name, "renamed");
        assert_eq!(store.get(&board_id).unwrap().data.tables.len(), 2);
        assert!(!session.flush(&store, later).await);

        store.set_offline(true);
        session.add_table();
        assert!(session.flush(&store, later + Duration::from_secs(2)).await);
        assert_eq!(session.last_save_error(), Some(SAVE_FAILED_MESSAGE));
        assert_eq!(session.schema().tables.len(), 3);
    }
}

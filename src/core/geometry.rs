//! Canvas geometry: content/viewport transforms, connection points, bezier
//! edge routing and box selection.
//!
//! Content space is where tables live; viewport space is screen pixels.
//! They relate by `viewport = content * zoom + pan`.

use crate::core::schema::{ConnectionSide, Relationship, Schema, TABLE_WIDTH, Table};
use std::collections::HashMap;

pub const MIN_ZOOM: f64 = 0.5;
pub const MAX_ZOOM: f64 = 2.0;
/// Zoom increment of the toolbar buttons
pub const ZOOM_STEP: f64 = 0.25;
/// Zoom increment of one ctrl+wheel notch
pub const WHEEL_ZOOM_STEP: f64 = 0.1;
pub const DEFAULT_PAN: Point = Point { x: 10.0, y: 10.0 };
/// Control point distance for relationship edges
pub const EDGE_CONTROL_OFFSET: f64 = 60.0;
/// Control point distance for the in-progress connection preview
pub const PREVIEW_CONTROL_OFFSET: f64 = 40.0;
/// Smallest drag (content units) treated as a box selection
pub const MIN_BOX_SELECTION_SIZE: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

/// Pan and zoom of one editing session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub pan: Point,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan: DEFAULT_PAN,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn to_viewport(&self, content: Point) -> Point {
        Point::new(
            content.x * self.zoom + self.pan.x,
            content.y * self.zoom + self.pan.y,
        )
    }

    pub fn to_content(&self, viewport: Point) -> Point {
        Point::new(
            (viewport.x - self.pan.x) / self.zoom,
            (viewport.y - self.pan.y) / self.zoom,
        )
    }

    /// Change zoom keeping the content point under `anchor` fixed on screen
    pub fn zoom_at(&mut self, new_zoom: f64, anchor: Point) {
        let new_zoom = clamp_zoom(new_zoom);
        let ratio = new_zoom / self.zoom;
        self.pan = Point::new(
            anchor.x - (anchor.x - self.pan.x) * ratio,
            anchor.y - (anchor.y - self.pan.y) * ratio,
        );
        self.zoom = new_zoom;
    }

    pub fn zoom_in(&mut self, anchor: Point) {
        self.zoom_at(self.zoom + ZOOM_STEP, anchor);
    }

    pub fn zoom_out(&mut self, anchor: Point) {
        self.zoom_at(self.zoom - ZOOM_STEP, anchor);
    }

    /// Slider input in percent (50..=200)
    pub fn set_zoom_percent(&mut self, percent: f64, anchor: Point) {
        if percent.is_finite() {
            self.zoom_at(percent / 100.0, anchor);
        }
    }

    /// Ctrl/meta + wheel zoom; plain wheel events are left to scrolling.
    /// Returns whether the event was consumed.
    pub fn wheel(&mut self, delta_y: f64, modifier: bool, anchor: Point) -> bool {
        if !modifier {
            return false;
        }
        let delta = if delta_y > 0.0 {
            -WHEEL_ZOOM_STEP
        } else {
            WHEEL_ZOOM_STEP
        };
        self.zoom_at(self.zoom + delta, anchor);
        true
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan.x += dx;
        self.pan.y += dy;
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.zoom * 100.0).round() as u32
    }
}

pub fn table_center(table: &Table) -> Point {
    Point::new(table.x + TABLE_WIDTH / 2.0, table.y + table.height() / 2.0)
}

/// Connection point computed from the table box alone
pub fn fallback_connection_point(table: &Table, side: ConnectionSide) -> Point {
    let center = table_center(table);
    match side {
        ConnectionSide::Top => Point::new(center.x, table.y),
        ConnectionSide::Right => Point::new(table.x + TABLE_WIDTH, center.y),
        ConnectionSide::Bottom => Point::new(center.x, table.y + table.height()),
        ConnectionSide::Left => Point::new(table.x, center.y),
    }
}

/// Axis-aligned rectangle as reported by the host, in viewport pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

/// Connection point positions measured after each render pass, in content space
#[derive(Clone, Debug, Default)]
pub struct ConnectionPoints {
    measured: HashMap<(String, ConnectionSide), Point>,
}

impl ConnectionPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the rendered position of a connection handle.
    ///
    /// `element` and `canvas` are both expressed in the same client space;
    /// the handle center is converted back through the current viewport.
    pub fn record(
        &mut self,
        table_id: &str,
        side: ConnectionSide,
        element: ScreenRect,
        canvas: ScreenRect,
        viewport: &Viewport,
    ) {
        let center = element.center();
        let local = Point::new(center.x - canvas.left, center.y - canvas.top);
        self.measured
            .insert((table_id.to_string(), side), viewport.to_content(local));
    }

    pub fn get(&self, table_id: &str, side: ConnectionSide) -> Option<Point> {
        self.measured.get(&(table_id.to_string(), side)).copied()
    }

    /// Measured point if any, else geometric fallback; None for unknown tables
    pub fn resolve(&self, schema: &Schema, table_id: &str, side: ConnectionSide) -> Option<Point> {
        if let Some(point) = self.get(table_id, side) {
            return Some(point);
        }
        schema
            .table(table_id)
            .map(|t| fallback_connection_point(t, side))
    }

    /// Forget measurements for tables no longer in the schema
    pub fn retain_tables(&mut self, schema: &Schema) {
        self.measured
            .retain(|(table_id, _), _| schema.table(table_id).is_some());
    }

    /// Drop cached positions of one table, e.g. after it moved
    pub fn invalidate(&mut self, table_id: &str) {
        self.measured.retain(|(id, _), _| id != table_id);
    }

    pub fn clear(&mut self) {
        self.measured.clear();
    }

    pub fn len(&self) -> usize {
        self.measured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measured.is_empty()
    }
}

/// Cubic bezier curve from `start` to `end`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BezierCurve {
    pub start: Point,
    pub control1: Point,
    pub control2: Point,
    pub end: Point,
}

impl BezierCurve {
    pub fn point_at(&self, t: f64) -> Point {
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        Point::new(
            a * self.start.x + b * self.control1.x + c * self.control2.x + d * self.end.x,
            a * self.start.y + b * self.control1.y + c * self.control2.y + d * self.end.y,
        )
    }

    /// Where the cardinality badge goes
    pub fn midpoint(&self) -> Point {
        self.point_at(0.5)
    }

    pub fn to_svg_path(&self) -> String {
        format!(
            "M {} {} C {} {}, {} {}, {} {}",
            self.start.x,
            self.start.y,
            self.control1.x,
            self.control1.y,
            self.control2.x,
            self.control2.y,
            self.end.x,
            self.end.y
        )
    }
}

/// Push a control point away from its endpoint in the direction of `side`,
/// or horizontally toward `toward` when no side is fixed
fn control_point(from: Point, side: Option<ConnectionSide>, toward: Point, offset: f64) -> Point {
    match side {
        Some(ConnectionSide::Top) => Point::new(from.x, from.y - offset),
        Some(ConnectionSide::Right) => Point::new(from.x + offset, from.y),
        Some(ConnectionSide::Bottom) => Point::new(from.x, from.y + offset),
        Some(ConnectionSide::Left) => Point::new(from.x - offset, from.y),
        None => {
            let dx = if from.x < toward.x { offset } else { -offset };
            Point::new(from.x + dx, from.y)
        }
    }
}

/// Route a relationship edge. Endpoints are connection points when both
/// sides are fixed, table centers otherwise.
pub fn relationship_curve(
    schema: &Schema,
    points: &ConnectionPoints,
    rel: &Relationship,
) -> Option<BezierCurve> {
    let from_table = schema.table(&rel.from_table_id)?;
    let to_table = schema.table(&rel.to_table_id)?;

    let (start, end) = match (rel.from_side, rel.to_side) {
        (Some(from_side), Some(to_side)) => (
            points
                .get(&from_table.id, from_side)
                .unwrap_or_else(|| fallback_connection_point(from_table, from_side)),
            points
                .get(&to_table.id, to_side)
                .unwrap_or_else(|| fallback_connection_point(to_table, to_side)),
        ),
        _ => (table_center(from_table), table_center(to_table)),
    };

    Some(BezierCurve {
        start,
        control1: control_point(start, rel.from_side, end, EDGE_CONTROL_OFFSET),
        control2: control_point(end, rel.to_side, start, EDGE_CONTROL_OFFSET),
        end,
    })
}

/// Curve from a connection handle to the pointer while drawing a relationship
pub fn preview_curve(start: Point, pointer: Point) -> BezierCurve {
    BezierCurve {
        start,
        control1: control_point(start, None, pointer, PREVIEW_CONTROL_OFFSET),
        control2: control_point(pointer, None, start, PREVIEW_CONTROL_OFFSET),
        end: pointer,
    }
}

/// Rectangle in content space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    /// Normalized rectangle spanned by two drag corners
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn of_table(table: &Table) -> Self {
        Self {
            min: Point::new(table.x, table.y),
            max: Point::new(table.x + TABLE_WIDTH, table.y + table.height()),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Inclusive overlap: touching edges count
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// Tables overlapped by the drag rectangle; empty for drags below the threshold
pub fn box_select(schema: &Schema, start: Point, current: Point) -> Vec<String> {
    let rect = Rect::from_corners(start, current);
    if rect.width() <= MIN_BOX_SELECTION_SIZE && rect.height() <= MIN_BOX_SELECTION_SIZE {
        return Vec::new();
    }
    schema
        .tables
        .iter()
        .filter(|t| rect.overlaps(&Rect::of_table(t)))
        .map(|t| t.id.clone())
        .collect()
}

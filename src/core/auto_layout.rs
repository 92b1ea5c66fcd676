//! Auto-layout module for automatic table arrangement
//!
//! Tables are assigned to levels by one breadth-first walk over the
//! relationship graph, seeded with every root table (no incoming
//! relationship) at once. A table's level is its distance from the nearest
//! root, and it keeps the depth at which it was first reached, so cycles and diamonds never cause
//! a relevel. Each level becomes one row; rows are stacked top to bottom with
//! a uniform height equal to the tallest table of the level.

use crate::core::graph::GraphView;
use crate::core::schema::{Schema, TABLE_WIDTH, TableId};
use petgraph::graph::NodeIndex;
use std::collections::VecDeque;
use tracing::debug;

/// Layout configuration
#[derive(Clone, Debug)]
pub struct LayoutConfig {
    /// Horizontal gap between tables of the same level
    pub horizontal_spacing: f64,
    /// Vertical gap between levels
    pub vertical_spacing: f64,
    /// Starting X position
    pub start_x: f64,
    /// Starting Y position
    pub start_y: f64,
    /// Rendered table width
    pub table_width: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_spacing: 80.0,
            vertical_spacing: 100.0,
            start_x: 100.0,
            start_y: 100.0,
            table_width: TABLE_WIDTH,
        }
    }
}

/// Result of auto-layout calculation
#[derive(Clone, Debug, Default)]
pub struct LayoutResult {
    /// New position for each table: (table_id, (x, y))
    pub positions: Vec<(TableId, (f64, f64))>,
    /// Level of every table, indexed like `Schema::tables`
    pub levels: Vec<usize>,
}

/// Multi-source breadth-first levels, first visit wins.
///
/// Components not reachable from any root (pure cycles) restart the walk at
/// their first table in model order, at level 0.
fn assign_levels(view: &GraphView, table_count: usize) -> Vec<usize> {
    let mut levels: Vec<Option<usize>> = vec![None; table_count];
    let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();

    let drain = |queue: &mut VecDeque<(NodeIndex, usize)>, levels: &mut Vec<Option<usize>>| {
        while let Some((node, depth)) = queue.pop_front() {
            for child in view.children(node) {
                let idx = view.graph[child];
                if levels[idx].is_none() {
                    levels[idx] = Some(depth + 1);
                    queue.push_back((child, depth + 1));
                }
            }
        }
    };

    for root in view.roots() {
        levels[view.graph[root]] = Some(0);
        queue.push_back((root, 0));
    }
    drain(&mut queue, &mut levels);

    let mut nodes: Vec<NodeIndex> = view.graph.node_indices().collect();
    nodes.sort_by_key(|n| view.graph[*n]);
    for node in nodes {
        if levels[view.graph[node]].is_none() {
            levels[view.graph[node]] = Some(0);
            queue.push_back((node, 0));
            drain(&mut queue, &mut levels);
        }
    }

    levels.into_iter().map(|l| l.unwrap_or(0)).collect()
}

/// Calculates a layered layout for every table of the schema
pub fn calculate_layered_layout(schema: &Schema, config: &LayoutConfig) -> LayoutResult {
    if schema.tables.is_empty() {
        return LayoutResult::default();
    }

    let view = GraphView::from_schema(schema);
    let levels = assign_levels(&view, schema.tables.len());
    let depth = levels.iter().copied().max().unwrap_or(0);

    let mut rows: Vec<Vec<usize>> = vec![Vec::new(); depth + 1];
    for (table_idx, level) in levels.iter().enumerate() {
        rows[*level].push(table_idx);
    }

    let mut positions = Vec::with_capacity(schema.tables.len());
    let mut y = config.start_y;
    for row in rows.iter().filter(|r| !r.is_empty()) {
        let mut x = config.start_x;
        let mut row_height: f64 = 0.0;
        for &table_idx in row {
            let table = &schema.tables[table_idx];
            positions.push((table.id.clone(), (x, y)));
            row_height = row_height.max(table.height());
            x += config.table_width + config.horizontal_spacing;
        }
        y += row_height + config.vertical_spacing;
    }

    debug!(
        tables = schema.tables.len(),
        levels = depth + 1,
        "calculated layered layout"
    );

    LayoutResult { positions, levels }
}

/// Applies the calculated layout to the schema
pub fn apply_layout(schema: &mut Schema, layout: &LayoutResult) {
    for (table_id, (x, y)) in &layout.positions {
        if let Some(table) = schema.table_mut(table_id) {
            table.x = *x;
            table.y = *y;
        }
    }
}

/// Convenience function to auto-layout with default config
pub fn auto_layout(schema: &mut Schema) {
    auto_layout_with_config(schema, &LayoutConfig::default());
}

/// Convenience function to auto-layout with custom config
pub fn auto_layout_with_config(schema: &mut Schema, config: &LayoutConfig) {
    let layout = calculate_layered_layout(schema, config);
    apply_layout(schema, &layout);
}

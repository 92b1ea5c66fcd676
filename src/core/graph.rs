//! Graph view of a schema: tables are nodes, valid relationships are edges

use crate::core::schema::{Cardinality, Schema};
use petgraph::Directed;
use petgraph::Direction;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// Node weight is the table's index in `Schema::tables`, edge weight the
/// relationship's index in `Schema::relationships`
pub type SchemaGraph = Graph<usize, usize, Directed>;

pub struct GraphView {
    pub graph: SchemaGraph,
    pub nodes: HashMap<String, NodeIndex>,
}

impl GraphView {
    /// Build the graph with edges pointing from source to target table
    pub fn from_schema(schema: &Schema) -> Self {
        let mut graph = SchemaGraph::new();
        let mut nodes = HashMap::with_capacity(schema.tables.len());
        for (i, table) in schema.tables.iter().enumerate() {
            nodes.insert(table.id.clone(), graph.add_node(i));
        }
        for (i, rel) in schema.relationships.iter().enumerate() {
            if let (Some(&from), Some(&to)) =
                (nodes.get(&rel.from_table_id), nodes.get(&rel.to_table_id))
            {
                graph.add_edge(from, to, i);
            }
        }
        Self { graph, nodes }
    }

    /// Dependency graph for DDL: an edge from each referenced table to each
    /// table holding a foreign key onto it
    pub fn foreign_key_dependencies(schema: &Schema) -> Self {
        let mut view = Self::from_schema(schema);
        view.graph.clear_edges();
        for (i, rel) in schema.relationships.iter().enumerate() {
            let (Some(&from), Some(&to)) = (
                view.nodes.get(&rel.from_table_id),
                view.nodes.get(&rel.to_table_id),
            ) else {
                continue;
            };
            if from == to {
                continue;
            }
            view.graph.add_edge(from, to, i);
            if rel.cardinality == Cardinality::ManyToMany {
                view.graph.add_edge(to, from, i);
            }
        }
        view
    }

    pub fn node(&self, table_id: &str) -> Option<NodeIndex> {
        self.nodes.get(table_id).copied()
    }

    /// Tables with no incoming edge other than self references, in model order
    pub fn roots(&self) -> Vec<NodeIndex> {
        let mut roots: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .all(|m| m == n)
            })
            .collect();
        roots.sort_by_key(|n| self.graph[*n]);
        roots
    }

    /// Outgoing neighbours ordered by relationship position in the model
    pub fn children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<(usize, NodeIndex)> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (*e.weight(), e.target()))
            .collect();
        edges.sort_by_key(|(rel_index, _)| *rel_index);
        edges.into_iter().map(|(_, n)| n).collect()
    }

    /// Number of valid edges touching a node, self loops included
    pub fn degree(&self, node: NodeIndex) -> usize {
        self.graph.edges_directed(node, Direction::Outgoing).count()
            + self.graph.edges_directed(node, Direction::Incoming).count()
    }
}

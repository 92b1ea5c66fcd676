//! Bounded undo history of deep-copied schema snapshots

use crate::core::schema::{EnumDef, Relationship, Schema, Table};
use std::collections::VecDeque;

/// Maximum number of undo steps kept
pub const MAX_UNDO: usize = 10;

/// Persisted part of a schema at one point in time
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub name: String,
    pub tables: Vec<Table>,
    pub relationships: Vec<Relationship>,
    pub enums: Vec<EnumDef>,
}

impl Snapshot {
    pub fn capture(schema: &Schema) -> Self {
        Self {
            name: schema.name.clone(),
            tables: schema.tables.clone(),
            relationships: schema.relationships.clone(),
            enums: schema.enums.clone(),
        }
    }

    pub fn restore(self) -> Schema {
        Schema {
            name: self.name,
            tables: self.tables,
            relationships: self.relationships,
            enums: self.enums,
        }
    }
}

/// Undo stack with FIFO eviction once `max_depth` is exceeded. No redo.
#[derive(Clone, Debug)]
pub struct History {
    stack: VecDeque<Snapshot>,
    max_depth: usize,
}

impl History {
    pub fn new() -> Self {
        Self::with_depth(MAX_UNDO)
    }

    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            stack: VecDeque::with_capacity(max_depth + 1),
            max_depth,
        }
    }

    /// Record the state before a mutation
    pub fn push(&mut self, schema: &Schema) {
        if self.max_depth == 0 {
            return;
        }
        self.stack.push_back(Snapshot::capture(schema));
        while self.stack.len() > self.max_depth {
            self.stack.pop_front();
        }
    }

    /// Most recent snapshot, removed from the stack
    pub fn pop(&mut self) -> Option<Snapshot> {
        self.stack.pop_back()
    }

    pub fn can_undo(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

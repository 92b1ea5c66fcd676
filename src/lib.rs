//! Schemaboard - collaborative database schema board engine
//!
//! The board model, its editing session with undo and autosave, SQL/JSON
//! import, code exporters and the schema linter. Rendering is left to the
//! host; everything here is plain data plus pure functions over it.

pub mod core;

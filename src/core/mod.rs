//! Core domain models and business logic for schema boards

pub mod auto_layout;
pub mod collab;
pub mod config;
pub mod editor;
pub mod export;
pub mod foreign_keys;
pub mod geometry;
pub mod graph;
pub mod history;
pub mod normalize;
pub mod schema;
pub mod sql_parser;
pub mod validation;
#[cfg(test)]
mod tests;

pub use schema::*;

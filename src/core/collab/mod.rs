//! Collaboration plumbing around the document store
//!
//! Provides:
//! - Board documents and the store traits the editor persists through
//! - Presence entries with heartbeat and throttled cursors
//! - Host-driven debounce/throttle timers

pub mod presence;
pub mod store;
pub mod throttling;

pub use presence::{PresenceEntry, PresenceSession, PresenceUser};
pub use store::{BoardDocument, BoardId, DocumentPatch, DocumentStore, MemoryStore, PresenceStore, StoreError};

//! Persistence collaborator: board documents, presence entries and the
//! in-memory store used when no real-time backend is configured.

use crate::core::collab::presence::PresenceEntry;
use crate::core::normalize::{RawBoardData, RawRelationship, RawTable};
use crate::core::schema::{EnumDef, Schema};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, error};

pub type BoardId = String;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Board {0} not found")]
    NotFound(BoardId),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Stored board document
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoardDocument {
    pub name: String,
    /// Member user ids
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(flatten)]
    pub data: RawBoardData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BoardDocument {
    pub fn new(name: impl Into<String>, owner: Option<String>, data: RawBoardData) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            users: owner.iter().cloned().collect(),
            created_by: owner,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_schema(schema: &Schema, owner: Option<String>) -> Self {
        Self::new(schema.name.clone(), owner, RawBoardData::from(schema))
    }

    /// Apply a partial write; absent parts are left alone
    pub fn apply(&mut self, patch: DocumentPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(users) = patch.users {
            self.users = users;
        }
        if let Some(tables) = patch.tables {
            self.data.tables = tables;
        }
        if let Some(relationships) = patch.relationships {
            self.data.relationships = relationships;
        }
        if let Some(enums) = patch.enums {
            self.data.enums = enums;
        }
        self.updated_at = patch.updated_at;
    }
}

/// Partial document update
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<RawTable>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<RawRelationship>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enums: Option<Vec<EnumDef>>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentPatch {
    /// The autosave payload: name, tables, relationships and enums
    pub fn from_schema(schema: &Schema) -> Self {
        let data = RawBoardData::from(schema);
        Self {
            name: Some(schema.name.clone()),
            users: None,
            tables: Some(data.tables),
            relationships: Some(data.relationships),
            enums: Some(data.enums),
            updated_at: Utc::now(),
        }
    }

    /// Member list change only
    pub fn users(users: Vec<String>) -> Self {
        Self {
            name: None,
            users: Some(users),
            tables: None,
            relationships: None,
            enums: None,
            updated_at: Utc::now(),
        }
    }
}

pub type DataCallback = Arc<dyn Fn(Option<BoardDocument>) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(StoreError) + Send + Sync>;

/// Live subscription handle; dropping it unsubscribes
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription that was never registered
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Real-time document store holding the authoritative copy of every board
pub trait DocumentStore: Send + Sync {
    /// Watch a board. `on_data` receives the current document immediately and
    /// again after every change; `None` means the board does not exist.
    fn subscribe(&self, id: &str, on_data: DataCallback, on_error: ErrorCallback) -> Subscription;

    /// Store a new board and return its generated id
    fn create(
        &self,
        document: BoardDocument,
    ) -> impl Future<Output = Result<BoardId, StoreError>> + Send;

    fn update(
        &self,
        id: &str,
        patch: DocumentPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Presence sub-collection of a board, keyed by user id
pub trait PresenceStore: Send + Sync {
    fn set_presence(
        &self,
        board_id: &str,
        entry: PresenceEntry,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Refresh `last_seen`, and the cursor when one is given
    fn touch_presence(
        &self,
        board_id: &str,
        user_id: &str,
        seen_at: DateTime<Utc>,
        cursor: Option<(f64, f64)>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn remove_presence(
        &self,
        board_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn list_presence(
        &self,
        board_id: &str,
    ) -> impl Future<Output = Result<Vec<PresenceEntry>, StoreError>> + Send;
}

struct Subscriber {
    on_data: DataCallback,
    on_error: ErrorCallback,
}

#[derive(Default)]
struct MemoryInner {
    documents: DashMap<BoardId, BoardDocument>,
    subscribers: DashMap<BoardId, HashMap<u64, Subscriber>>,
    presence: DashMap<BoardId, HashMap<String, PresenceEntry>>,
    next_id: AtomicU64,
    offline: AtomicBool,
}

/// Process-local store backed by concurrent maps
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage: every operation fails while set
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn get(&self, id: &str) -> Option<BoardDocument> {
        self.inner.documents.get(id).map(|d| d.clone())
    }

    pub fn board_count(&self) -> usize {
        self.inner.documents.len()
    }

    pub fn subscriber_count(&self, id: &str) -> usize {
        self.inner.subscribers.get(id).map(|s| s.len()).unwrap_or(0)
    }

    /// Delete a board and notify its subscribers with `None`
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.inner
            .documents
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.inner.presence.remove(id);
        self.notify(id, None);
        Ok(())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(StoreError::Backend("store is offline".into()))
        } else {
            Ok(())
        }
    }

    fn notify(&self, id: &str, document: Option<BoardDocument>) {
        // collect first: callbacks may subscribe or unsubscribe
        let callbacks: Vec<DataCallback> = self
            .inner
            .subscribers
            .get(id)
            .map(|subs| subs.values().map(|s| s.on_data.clone()).collect())
            .unwrap_or_default();
        for callback in callbacks {
            callback(document.clone());
        }
    }

    fn fail_subscribers(&self, id: &str, err: &StoreError) {
        let callbacks: Vec<ErrorCallback> = self
            .inner
            .subscribers
            .get(id)
            .map(|subs| subs.values().map(|s| s.on_error.clone()).collect())
            .unwrap_or_default();
        for callback in callbacks {
            callback(err.clone());
        }
    }
}

impl DocumentStore for MemoryStore {
    fn subscribe(&self, id: &str, on_data: DataCallback, on_error: ErrorCallback) -> Subscription {
        if let Err(err) = self.check_online() {
            on_error(err);
            return Subscription::detached();
        }

        let key = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribers.entry(id.to_string()).or_default().insert(
            key,
            Subscriber {
                on_data: on_data.clone(),
                on_error,
            },
        );
        debug!(board_id = %id, subscriber = key, "subscribed to board");

        on_data(self.get(id));

        let inner = Arc::downgrade(&self.inner);
        let board_id = id.to_string();
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade()
                && let Some(mut subs) = inner.subscribers.get_mut(&board_id)
            {
                subs.remove(&key);
            }
        })
    }

    async fn create(&self, document: BoardDocument) -> Result<BoardId, StoreError> {
        self.check_online()?;
        let id = format!("board-{}", uuid::Uuid::new_v4().simple());
        self.inner.documents.insert(id.clone(), document.clone());
        debug!(board_id = %id, "created board");
        self.notify(&id, Some(document));
        Ok(id)
    }

    async fn update(&self, id: &str, patch: DocumentPatch) -> Result<(), StoreError> {
        if let Err(err) = self.check_online() {
            error!(board_id = %id, error = %err, "board update failed");
            self.fail_subscribers(id, &err);
            return Err(err);
        }
        let updated = {
            let mut doc = self
                .inner
                .documents
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            doc.apply(patch);
            doc.clone()
        };
        self.notify(id, Some(updated));
        Ok(())
    }
}

impl PresenceStore for MemoryStore {
    async fn set_presence(&self, board_id: &str, entry: PresenceEntry) -> Result<(), StoreError> {
        self.check_online()?;
        self.inner
            .presence
            .entry(board_id.to_string())
            .or_default()
            .insert(entry.user_id().to_string(), entry);
        Ok(())
    }

    async fn touch_presence(
        &self,
        board_id: &str,
        user_id: &str,
        seen_at: DateTime<Utc>,
        cursor: Option<(f64, f64)>,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        let mut entries = self
            .inner
            .presence
            .get_mut(board_id)
            .ok_or_else(|| StoreError::NotFound(board_id.to_string()))?;
        let entry = entries
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("{board_id}/presence/{user_id}")))?;
        entry.last_seen = Some(seen_at);
        if let Some((x, y)) = cursor {
            entry.cursor_x = Some(x);
            entry.cursor_y = Some(y);
        }
        Ok(())
    }

    async fn remove_presence(&self, board_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.check_online()?;
        if let Some(mut entries) = self.inner.presence.get_mut(board_id) {
            entries.remove(user_id);
        }
        Ok(())
    }

    async fn list_presence(&self, board_id: &str) -> Result<Vec<PresenceEntry>, StoreError> {
        self.check_online()?;
        let mut entries: Vec<PresenceEntry> = self
            .inner
            .presence
            .get(board_id)
            .map(|e| e.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.user_id().cmp(b.user_id()));
        Ok(entries)
    }
}

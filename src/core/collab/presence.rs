//! Presence of collaborators on a board
//!
//! Each connected user owns one entry in the board's presence collection.
//! The entry is written on join, refreshed by a heartbeat, carries throttled
//! cursor positions and is removed on leave. Readers filter out entries whose
//! heartbeat went stale.

use crate::core::collab::store::{PresenceStore, StoreError};
use crate::core::collab::throttling::{CursorThrottler, Heartbeat};
use crate::core::config::Config;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Default age after which a presence entry no longer counts as connected
pub const DEFAULT_PRESENCE_STALE_SECS: u64 = 60;

/// Identity shown to other collaborators
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl PresenceUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Up to two initials from the display name, else from the email
    pub fn initials(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name
                .split_whitespace()
                .filter_map(|part| part.chars().next())
                .take(2)
                .collect::<String>()
                .to_uppercase();
        }
        self.email
            .as_deref()
            .and_then(|e| e.chars().next())
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_string())
    }
}

/// One row of the presence collection
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    #[serde(flatten)]
    pub user: PresenceUser,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_y: Option<f64>,
}

impl PresenceEntry {
    pub fn new(user: PresenceUser, last_seen: Option<DateTime<Utc>>) -> Self {
        Self {
            user,
            last_seen,
            cursor_x: None,
            cursor_y: None,
        }
    }

    /// Collection key
    pub fn user_id(&self) -> &str {
        &self.user.user_id
    }

    pub fn with_cursor(mut self, x: f64, y: f64) -> Self {
        self.cursor_x = Some(x);
        self.cursor_y = Some(y);
        self
    }

    pub fn cursor(&self) -> Option<(f64, f64)> {
        self.cursor_x.zip(self.cursor_y)
    }

    /// Entries without a timestamp are pending server writes and count as fresh
    pub fn is_fresh(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        let Some(seen) = self.last_seen else {
            return true;
        };
        let max_age = ChronoDuration::from_std(stale_after).unwrap_or(ChronoDuration::MAX);
        now.signed_duration_since(seen) < max_age
    }
}

/// Users whose last heartbeat is younger than `stale_after`
pub fn connected_users(
    entries: &[PresenceEntry],
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Vec<PresenceEntry> {
    entries
        .iter()
        .filter(|e| e.is_fresh(now, stale_after))
        .cloned()
        .collect()
}

/// Cursors to draw: every other user that has reported a position
pub fn remote_cursors<'a>(entries: &'a [PresenceEntry], local_user_id: &str) -> Vec<&'a PresenceEntry> {
    entries
        .iter()
        .filter(|e| e.user_id() != local_user_id && e.cursor().is_some())
        .collect()
}

/// Presence of the local user on one board
#[derive(Debug)]
pub struct PresenceSession {
    board_id: String,
    user: PresenceUser,
    heartbeat: Heartbeat,
    cursor: CursorThrottler,
    joined: bool,
}

impl PresenceSession {
    pub fn new(board_id: impl Into<String>, user: PresenceUser) -> Self {
        Self::with_config(board_id, user, &Config::default())
    }

    pub fn with_config(board_id: impl Into<String>, user: PresenceUser, config: &Config) -> Self {
        Self {
            board_id: board_id.into(),
            user,
            heartbeat: Heartbeat::with_interval(config.heartbeat_interval),
            cursor: CursorThrottler::with_interval(config.cursor_throttle),
            joined: false,
        }
    }

    pub fn user(&self) -> &PresenceUser {
        &self.user
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Write the presence entry and start the heartbeat
    pub async fn join<S: PresenceStore>(
        &mut self,
        store: &S,
        now: Instant,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        store
            .set_presence(&self.board_id, PresenceEntry::new(self.user.clone(), Some(at)))
            .await?;
        self.heartbeat.start(now);
        self.joined = true;
        debug!(board_id = %self.board_id, user_id = %self.user.user_id, "joined presence");
        Ok(())
    }

    /// Refresh `last_seen` when the heartbeat interval elapsed.
    /// Failures are logged and otherwise ignored.
    pub async fn tick<S: PresenceStore>(&mut self, store: &S, now: Instant, at: DateTime<Utc>) -> bool {
        if !self.joined || !self.heartbeat.tick(now) {
            return false;
        }
        if let Err(err) = store
            .touch_presence(&self.board_id, &self.user.user_id, at, None)
            .await
        {
            error!(board_id = %self.board_id, error = %err, "presence heartbeat failed");
        }
        true
    }

    /// Publish the pointer position (viewport pixels, rounded), at most once
    /// per throttle interval. Returns whether a write was attempted.
    pub async fn update_cursor<S: PresenceStore>(
        &mut self,
        store: &S,
        x: f64,
        y: f64,
        now: Instant,
        at: DateTime<Utc>,
    ) -> bool {
        if !self.joined || !self.cursor.try_send(now) {
            return false;
        }
        let cursor = (x.round(), y.round());
        if let Err(err) = store
            .touch_presence(&self.board_id, &self.user.user_id, at, Some(cursor))
            .await
        {
            error!(board_id = %self.board_id, error = %err, "cursor update failed");
        }
        true
    }

    /// Stop the heartbeat and delete the entry
    pub async fn leave<S: PresenceStore>(&mut self, store: &S) -> Result<(), StoreError> {
        self.heartbeat.stop();
        self.cursor.reset();
        if !self.joined {
            return Ok(());
        }
        self.joined = false;
        store.remove_presence(&self.board_id, &self.user.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collab::store::MemoryStore;

    fn entry(id: &str, seen: Option<DateTime<Utc>>) -> PresenceEntry {
        PresenceEntry::new(PresenceUser::new(id), seen)
    }

    #[test]
    fn test_connected_users_filters_stale() {
        let now = Utc::now();
        let stale = Duration::from_secs(DEFAULT_PRESENCE_STALE_SECS);
        let entries = vec![
            entry("fresh", Some(now - ChronoDuration::seconds(10))),
            entry("edge", Some(now - ChronoDuration::seconds(60))),
            entry("old", Some(now - ChronoDuration::seconds(300))),
            entry("pending", None),
        ];
        let ids: Vec<_> = connected_users(&entries, now, stale)
            .into_iter()
            .map(|e| e.user.user_id)
            .collect();
        assert_eq!(ids, vec!["fresh", "pending"]);
    }

    #[test]
    fn test_remote_cursors_skip_self_and_missing() {
        let now = Utc::now();
        let entries = vec![
            entry("me", Some(now)).with_cursor(1.0, 2.0),
            entry("bob", Some(now)).with_cursor(10.0, 20.0),
            entry("carol", Some(now)),
        ];
        let cursors = remote_cursors(&entries, "me");
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].cursor(), Some((10.0, 20.0)));
    }

    #[test]
    fn test_initials() {
        let user = PresenceUser::new("u").with_display_name("ada lovelace");
        assert_eq!(user.initials(), "AL");
        let anonymous = PresenceUser {
            email: Some("zed@example.com".into()),
            ..PresenceUser::new("u2")
        };
        assert_eq!(anonymous.initials(), "Z");
        assert_eq!(PresenceUser::new("u3").initials(), "?");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = MemoryStore::new();
        let t0 = Instant::now();
        let at = Utc::now();
        let mut session = PresenceSession::new("board", PresenceUser::new("alice"));

        assert!(!session.update_cursor(&store, 5.0, 5.0, t0, at).await);
        session.join(&store, t0, at).await.unwrap();

        assert!(session.update_cursor(&store, 10.4, 20.6, t0, at).await);
        assert!(!session.update_cursor(&store, 11.0, 21.0, t0 + Duration::from_millis(50), at).await);
        let entries = store.list_presence("board").await.unwrap();
        assert_eq!(entries[0].cursor(), Some((10.0, 21.0)));

        assert!(!session.tick(&store, t0 + Duration::from_secs(10), at).await);
        let later = at + ChronoDuration::seconds(30);
        assert!(session.tick(&store, t0 + Duration::from_secs(30), later).await);
        let entries = store.list_presence("board").await.unwrap();
        assert_eq!(entries[0].last_seen, Some(later));

        session.leave(&store).await.unwrap();
        assert!(store.list_presence("board").await.unwrap().is_empty());
    }
}

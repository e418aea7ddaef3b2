//! Per-session clicked-marker state.
//!
//! Each browser session owns one [`ClickedMarkerSet`]. Sessions never see each
//! other's state; the shared map only hands out per-session handles, and each
//! set sits behind its own mutex so two clicks in one session apply in order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Ordered, duplicate-free, append-only list of clicked marker ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClickedMarkerSet(Vec<String>);

impl ClickedMarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `marker_id` unless it is already present. Returns whether the
    /// set changed.
    pub fn record_click(&mut self, marker_id: &str) -> bool {
        if self.contains(marker_id) {
            return false;
        }
        self.0.push(marker_id.to_string());
        true
    }

    pub fn contains(&self, marker_id: &str) -> bool {
        self.0.iter().any(|id| id == marker_id)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct SessionEntry {
    clicked: ClickedMarkerSet,
    last_seen: Instant,
}

type SessionHandle = Arc<Mutex<SessionEntry>>;

pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Start a session with an empty set. Idle sessions are dropped here
    /// rather than by a sweeper task.
    pub fn create(&self) -> Uuid {
        self.create_with(ClickedMarkerSet::new())
    }

    /// Start a session seeded with `clicked`. A page whose session expired
    /// while it stayed open reopens with the markers it already shows.
    pub fn create_with(&self, clicked: ClickedMarkerSet) -> Uuid {
        let id = Uuid::new_v4();
        let now = Instant::now();
        let entry = Arc::new(Mutex::new(SessionEntry {
            clicked,
            last_seen: now,
        }));

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, handle| {
            let entry = handle.lock().unwrap_or_else(PoisonError::into_inner);
            now.duration_since(entry.last_seen) < self.ttl
        });
        if sessions.len() < before {
            info!(expired = before - sessions.len(), "dropped idle sessions");
        }
        sessions.insert(id, entry);
        debug!(session = %id, active = sessions.len(), "session opened");
        id
    }

    fn handle(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Current set for the session, or `None` if the session is unknown.
    pub fn clicked(&self, id: &Uuid) -> Option<ClickedMarkerSet> {
        let handle = self.handle(id)?;
        let mut entry = handle.lock().unwrap_or_else(PoisonError::into_inner);
        entry.last_seen = Instant::now();
        Some(entry.clicked.clone())
    }

    /// Apply `record_click` to the session's set and return the result.
    pub fn record_click(&self, id: &Uuid, marker_id: &str) -> Option<ClickedMarkerSet> {
        let handle = self.handle(id)?;
        let mut entry = handle.lock().unwrap_or_else(PoisonError::into_inner);
        entry.last_seen = Instant::now();
        if entry.clicked.record_click(marker_id) {
            debug!(session = %id, marker = marker_id, "marker clicked");
        }
        Some(entry.clicked.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity attached to an authenticated session and to every socket bound from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
}

/// One persisted message joined with its author, as replayed on page load.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub user_id: i64,
    pub username: String,
    pub message: String,
    pub profile_pic_url: String,
    pub created_at: DateTime<Utc>,
}

//! Activity log data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRef {
    pub id: i64,
    pub name: String,
}

/// A persisted study log. Never removed; `deleted_at` marks it inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: i64,
    pub message: String,
    pub tags: Vec<TagRef>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|tag| tag.name.as_str()).collect()
    }

    pub fn duration_secs(&self) -> i64 {
        (self.end_date - self.start_date).num_seconds().max(0)
    }
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub message: String,
    /// Tag names without the leading `#`.
    pub tags: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

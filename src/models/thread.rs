use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Thread as it comes out of a forum listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHandle {
    pub id: u64,
    pub forum_id: u64,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author_id: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
}

/// Full statistics of a thread, cached by thread id.
///
/// Records are always written whole; there is no partial update path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: u64,
    pub guild_id: u64,
    pub channel_id: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author_id: u64,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub reaction_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub archived: bool,
}

impl ThreadRecord {
    /// Whether the record carries the tag, ignoring case
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == wanted)
    }
}

/// Single message inside a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumMessage {
    pub id: u64,
    pub thread_id: u64,
    pub author_id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reaction_count: u64,
}

/// A thread that passed every filter, paired with the data it was judged on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMatch {
    pub thread_id: u64,
    pub title: String,
    pub record: ThreadRecord,
    /// First post body, present when the search looked at it
    pub first_post: Option<String>,
}

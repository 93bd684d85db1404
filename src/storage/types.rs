//! Chat record and message types
//!
//! Serialized field names match the webhook wire format (`isUser`), so the
//! same structs are stored in the chat store and sent as outbound history.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Maximum title length taken from the first user message before truncation
pub const TITLE_PREFIX_LEN: usize = 30;

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message content
    pub text: String,

    /// True for user-authored messages, false for assistant replies
    #[serde(rename = "isUser")]
    pub is_user: bool,

    /// RFC-3339 timestamp set at append time
    pub timestamp: String,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(text: impl Into<String>, is_user: bool) -> Self {
        Self {
            text: text.into(),
            is_user,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Create a user-authored message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    /// Create an assistant-authored message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }
}

/// One independent conversation thread with its own history and title
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Unique identifier, derived from the creation timestamp
    pub id: String,

    /// Human-readable title
    ///
    /// Starts as a placeholder; overwritten by the first user message.
    pub title: String,

    /// Ordered message history, insertion order = chronological order
    pub messages: Vec<Message>,

    /// RFC-3339 creation timestamp, immutable after creation
    pub created: String,
}

impl ChatRecord {
    /// Create a fresh, empty chat stamped with the current time
    pub fn new() -> Self {
        let created = Utc::now().to_rfc3339();
        Self {
            id: format!("chat_{}", created),
            title: placeholder_title(&created),
            messages: Vec::new(),
            created,
        }
    }

    /// Whether any user-authored message exists yet
    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.is_user)
    }
}

impl Default for ChatRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Placeholder title shown until the first user message arrives
pub fn placeholder_title(created: &str) -> String {
    format!("New Chat ({})", format_local(created))
}

/// Title derived from the first user message
///
/// Truncated to [`TITLE_PREFIX_LEN`] characters with an ellipsis, followed
/// by the formatted time the title was set.
pub fn title_from_message(text: &str) -> String {
    let prefix: String = text.chars().take(TITLE_PREFIX_LEN).collect();
    let ellipsis = if text.chars().count() > TITLE_PREFIX_LEN {
        "..."
    } else {
        ""
    };
    format!(
        "{}{} ({})",
        prefix,
        ellipsis,
        Local::now().format("%Y-%m-%d %H:%M")
    )
}

/// Render an RFC-3339 timestamp in local time for display
///
/// Falls back to the raw string when parsing fails.
pub fn format_local(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

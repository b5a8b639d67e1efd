use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Local delivery status of a message. Server-provided messages are always `Received`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Received,
    Sending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: String,
    pub message_id: String,
    #[serde(default)]
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

/// A formatted message. `created_at` is always present once a message reaches
/// local state; the server omits it only for messages it has not stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default = "Utc::now")]
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<String>,
    #[serde(default)]
    pub show_in_channel: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub silent: bool,
    /// Sender is shadow-banned; the message never enters local windows.
    #[serde(default)]
    pub shadowed: bool,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub own_reactions: Vec<Reaction>,
    #[serde(default)]
    pub latest_reactions: Vec<Reaction>,
    #[serde(default)]
    pub reaction_counts: HashMap<String, u32>,
}

impl Message {
    pub fn new(id: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            text: String::new(),
            user: None,
            created_at,
            updated_at: None,
            deleted_at: None,
            pinned_at: None,
            parent_id: None,
            quoted_message_id: None,
            show_in_channel: false,
            pinned: false,
            silent: false,
            shadowed: false,
            status: MessageStatus::Received,
            own_reactions: Vec::new(),
            latest_reactions: Vec::new(),
            reaction_counts: HashMap::new(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    /// A reply that lives only in its thread, not in the channel's windows.
    pub fn is_thread_reply(&self) -> bool {
        self.parent_id.is_some() && !self.show_in_channel
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    pub id: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub cid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_at: Option<Timestamp>,
    #[serde(default)]
    pub member_count: u32,
}

impl ChannelData {
    pub fn new(channel_type: impl Into<String>, id: impl Into<String>) -> Self {
        let channel_type = channel_type.into();
        let id = id.into();
        Self {
            cid: format!("{}:{}", channel_type, id),
            id,
            channel_type,
            name: None,
            hidden: false,
            frozen: false,
            created_at: None,
            last_message_at: None,
            truncated_at: None,
            member_count: 0,
        }
    }
}

/// Membership record of one user in one channel. The list engine only looks at
/// `pinned_at` and `archived_at` of the current user's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMember {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl ChannelMember {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user: None,
            role: None,
            pinned_at: None,
            archived_at: None,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadState {
    pub user_id: String,
    pub last_read: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_message_id: Option<String>,
    #[serde(default)]
    pub unread_messages: u32,
}

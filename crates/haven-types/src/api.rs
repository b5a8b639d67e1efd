use serde::{Deserialize, Serialize};

use crate::models::{ChannelData, ChannelMember, Message, ReadState, Timestamp};

// -- Message pagination --

/// Cursor parameters of a message page request. At most one of the anchor
/// (`*_around`) parameters is expected per request; the linear cursors may
/// be combined with `limit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePaginationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_lt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_lte: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_gt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_gte: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_around: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_before: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_before_or_equal: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_after: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_after_or_equal: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_around: Option<Timestamp>,
}

impl MessagePaginationOptions {
    pub fn around_id(id: impl Into<String>, limit: u32) -> Self {
        Self {
            id_around: Some(id.into()),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn around_time(at: Timestamp, limit: u32) -> Self {
        Self {
            created_at_around: Some(at),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn before_id(id: impl Into<String>, limit: u32) -> Self {
        Self {
            id_lt: Some(id.into()),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn after_id(id: impl Into<String>, limit: u32) -> Self {
        Self {
            id_gt: Some(id.into()),
            limit: Some(limit),
            ..Default::default()
        }
    }

    /// Requests a page towards newer messages.
    pub fn queries_next(&self) -> bool {
        self.created_at_after_or_equal.is_some()
            || self.created_at_after.is_some()
            || self.id_gt.is_some()
            || self.id_gte.is_some()
    }

    /// Requests a page towards older messages.
    pub fn queries_prev(&self) -> bool {
        self.created_at_before_or_equal.is_some()
            || self.created_at_before.is_some()
            || self.id_lt.is_some()
            || self.id_lte.is_some()
            || self.offset.is_some()
    }

    /// Anchors the page somewhere other than the newest end of the history.
    pub fn has_cursor(&self) -> bool {
        self.queries_next()
            || self.queries_prev()
            || self.id_around.is_some()
            || self.created_at_around.is_some()
    }
}

// -- Single channel query --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelQueryOptions {
    #[serde(default)]
    pub watch: bool,
    #[serde(default)]
    pub state: bool,
    #[serde(default)]
    pub presence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<MessagePaginationOptions>,
}

impl ChannelQueryOptions {
    pub fn watch() -> Self {
        Self {
            watch: true,
            state: true,
            ..Default::default()
        }
    }

    pub fn with_messages(messages: MessagePaginationOptions) -> Self {
        Self {
            state: true,
            messages: Some(messages),
            ..Default::default()
        }
    }
}

/// Bulk snapshot of one channel as returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelQueryResponse {
    pub channel: ChannelData,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub pinned_messages: Vec<Message>,
    #[serde(default)]
    pub members: Vec<ChannelMember>,
    #[serde(default)]
    pub read: Vec<ReadState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership: Option<ChannelMember>,
    #[serde(default)]
    pub watcher_count: u32,
}

impl ChannelQueryResponse {
    pub fn new(channel: ChannelData) -> Self {
        Self {
            channel,
            messages: Vec::new(),
            pinned_messages: Vec::new(),
            members: Vec::new(),
            read: Vec::new(),
            membership: None,
            watcher_count: 0,
        }
    }
}

// -- Channel list query --

/// Filter object of a channel-list query. Only `archived` is interpreted
/// locally; everything else is forwarded to the server untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChannelFilters {
    pub fn archived(archived: bool) -> Self {
        Self {
            archived: Some(archived),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

/// Ordered sort keys of a channel-list query; index 0 is the primary key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSort(pub Vec<SortField>);

impl ChannelSort {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.0.push(SortField {
            field: field.into(),
            direction,
        });
        self
    }

    /// Direction of `field` if it is the sort key at `index`.
    pub fn direction_at(&self, index: usize, field: &str) -> Option<SortDirection> {
        self.0
            .get(index)
            .filter(|entry| entry.field == field)
            .map(|entry| entry.direction)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryChannelsOptions {
    pub limit: u32,
    pub offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_limit: Option<u32>,
}

impl Default for QueryChannelsOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
            message_limit: None,
        }
    }
}

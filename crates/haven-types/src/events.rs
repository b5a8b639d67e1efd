use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{ChannelData, ChannelMember, Message, Reaction, Timestamp, User};

/// Event kinds delivered on the realtime stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "message.new")]
    MessageNew,
    #[serde(rename = "message.updated")]
    MessageUpdated,
    #[serde(rename = "message.deleted")]
    MessageDeleted,
    #[serde(rename = "message.undeleted")]
    MessageUndeleted,
    #[serde(rename = "message.read")]
    MessageRead,
    #[serde(rename = "reaction.new")]
    ReactionNew,
    #[serde(rename = "reaction.updated")]
    ReactionUpdated,
    #[serde(rename = "reaction.deleted")]
    ReactionDeleted,
    #[serde(rename = "typing.start")]
    TypingStart,
    #[serde(rename = "typing.stop")]
    TypingStop,
    #[serde(rename = "member.updated")]
    MemberUpdated,
    #[serde(rename = "channel.deleted")]
    ChannelDeleted,
    #[serde(rename = "channel.hidden")]
    ChannelHidden,
    #[serde(rename = "channel.visible")]
    ChannelVisible,
    #[serde(rename = "channel.truncated")]
    ChannelTruncated,
    #[serde(rename = "channel.updated")]
    ChannelUpdated,
    #[serde(rename = "notification.message_new")]
    NotificationMessageNew,
    #[serde(rename = "notification.added_to_channel")]
    NotificationAddedToChannel,
    #[serde(rename = "notification.removed_from_channel")]
    NotificationRemovedFromChannel,
    #[serde(rename = "notification.mark_unread")]
    NotificationMarkUnread,
    /// Any event kind this layer does not reconcile.
    #[serde(other)]
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageNew => "message.new",
            Self::MessageUpdated => "message.updated",
            Self::MessageDeleted => "message.deleted",
            Self::MessageUndeleted => "message.undeleted",
            Self::MessageRead => "message.read",
            Self::ReactionNew => "reaction.new",
            Self::ReactionUpdated => "reaction.updated",
            Self::ReactionDeleted => "reaction.deleted",
            Self::TypingStart => "typing.start",
            Self::TypingStop => "typing.stop",
            Self::MemberUpdated => "member.updated",
            Self::ChannelDeleted => "channel.deleted",
            Self::ChannelHidden => "channel.hidden",
            Self::ChannelVisible => "channel.visible",
            Self::ChannelTruncated => "channel.truncated",
            Self::ChannelUpdated => "channel.updated",
            Self::NotificationMessageNew => "notification.message_new",
            Self::NotificationAddedToChannel => "notification.added_to_channel",
            Self::NotificationRemovedFromChannel => "notification.removed_from_channel",
            Self::NotificationMarkUnread => "notification.mark_unread",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of the event stream. Which optional fields are populated depends
/// on `kind`; consumers treat a missing field as "nothing to apply".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<ChannelMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_messages: Option<u32>,
    #[serde(default)]
    pub hard_delete: bool,
    #[serde(default)]
    pub clear_history: bool,
    #[serde(default)]
    pub enforce_unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    /// Assigned by the client at dispatch when the server did not set it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<Timestamp>,
}

impl ChatEvent {
    pub fn new(kind: EventType) -> Self {
        Self {
            kind,
            cid: None,
            channel_type: None,
            channel_id: None,
            channel: None,
            message: None,
            reaction: None,
            member: None,
            user: None,
            parent_id: None,
            last_read_message_id: None,
            unread_messages: None,
            hard_delete: false,
            clear_history: false,
            enforce_unique: false,
            created_at: None,
            received_at: None,
        }
    }

    /// Event addressed to the channel `channel_type:channel_id`.
    pub fn for_channel(kind: EventType, channel_type: &str, channel_id: &str) -> Self {
        Self {
            cid: Some(format!("{}:{}", channel_type, channel_id)),
            channel_type: Some(channel_type.to_string()),
            channel_id: Some(channel_id.to_string()),
            ..Self::new(kind)
        }
    }

    /// Resolves the addressed channel as `(type, id)`, falling back to splitting `cid`.
    pub fn channel_key(&self) -> Option<(String, String)> {
        if let (Some(t), Some(id)) = (&self.channel_type, &self.channel_id) {
            return Some((t.clone(), id.clone()));
        }
        let cid = self.cid.as_deref()?;
        let (t, id) = cid.split_once(':')?;
        Some((t.to_string(), id.to_string()))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

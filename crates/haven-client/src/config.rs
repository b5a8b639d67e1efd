use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use haven_types::events::EventType;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// The connected user. Own-message and own-membership checks compare against it.
    pub user_id: Option<String>,
    /// Typing indicators idle for longer than this are dropped.
    pub typing_timeout: Duration,
    pub typing_clean_interval: Duration,
    /// Page size used when a message query does not set `limit`.
    pub message_page_size: u32,
    pub channel_page_size: u32,
    /// Capacity of the client event bus.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            typing_timeout: Duration::from_secs(7),
            typing_clean_interval: Duration::from_millis(500),
            message_page_size: 25,
            channel_page_size: 10,
            event_buffer: 1024,
        }
    }
}

impl ClientConfig {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    /// Reads the configuration from the environment, loading `.env` if present.
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let parse = |key: &str| -> Result<Option<u64>> { parse_var(&lookup, key) };

        Ok(Self {
            user_id: lookup("HAVEN_USER_ID").filter(|id| !id.is_empty()),
            typing_timeout: parse("HAVEN_TYPING_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.typing_timeout),
            typing_clean_interval: parse("HAVEN_TYPING_CLEAN_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.typing_clean_interval),
            message_page_size: parse_var(&lookup, "HAVEN_MESSAGE_PAGE_SIZE")?.unwrap_or(defaults.message_page_size),
            channel_page_size: parse_var(&lookup, "HAVEN_CHANNEL_PAGE_SIZE")?.unwrap_or(defaults.channel_page_size),
            event_buffer: parse_var(&lookup, "HAVEN_EVENT_BUFFER")?.unwrap_or(defaults.event_buffer),
        })
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| ClientError::Config {
            key: key.to_string(),
            value: raw,
        }),
    }
}

/// Behaviour switches of the channel list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelManagerOptions {
    /// Let a new query supersede one still in flight instead of being dropped.
    pub abort_inflight_query: bool,
    /// Per event type: may a channel that is not in the loaded list be promoted into it.
    pub allow_not_loaded_channel_promotion: HashMap<EventType, bool>,
    /// Never reorder on new messages.
    pub lock_channel_order: bool,
}

impl Default for ChannelManagerOptions {
    fn default() -> Self {
        let allow_not_loaded_channel_promotion = [
            EventType::ChannelVisible,
            EventType::MessageNew,
            EventType::NotificationAddedToChannel,
            EventType::NotificationMessageNew,
        ]
        .into_iter()
        .map(|kind| (kind, true))
        .collect();

        Self {
            abort_inflight_query: false,
            allow_not_loaded_channel_promotion,
            lock_channel_order: false,
        }
    }
}

impl ChannelManagerOptions {
    pub fn allows_not_loaded_promotion(&self, kind: EventType) -> bool {
        self.allow_not_loaded_channel_promotion
            .get(&kind)
            .copied()
            .unwrap_or(false)
    }
}

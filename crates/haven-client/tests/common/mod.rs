//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use haven_client::{ChatClient, ChatTransport, ClientConfig};
use haven_state::MemoryLogger;
use haven_types::api::{
    ChannelFilters, ChannelQueryOptions, ChannelQueryResponse, ChannelSort, QueryChannelsOptions,
};
use haven_types::models::{ChannelData, ChannelMember, Message, User};

pub const ME: &str = "me";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("haven=debug")
        .with_test_writer()
        .try_init();
}

pub fn ts(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
}

pub fn msg(id: &str, seconds: i64) -> Message {
    let mut message = Message::new(id, ts(seconds));
    message.user = Some(User::new("other"));
    message
}

pub fn msgs(from: i64, to: i64) -> Vec<Message> {
    (from..=to).map(|i| msg(&format!("m{i}"), i)).collect()
}

pub fn membership(pinned: bool, archived: bool) -> ChannelMember {
    let mut member = ChannelMember::new(ME);
    member.pinned_at = pinned.then(|| ts(0));
    member.archived_at = archived.then(|| ts(0));
    member
}

pub fn channel_response(id: &str, messages: Vec<Message>) -> ChannelQueryResponse {
    let mut response = ChannelQueryResponse::new(ChannelData::new("messaging", id));
    response.messages = messages;
    response.membership = Some(membership(false, false));
    response
}

pub fn pinned_response(id: &str) -> ChannelQueryResponse {
    let mut response = channel_response(id, Vec::new());
    response.membership = Some(membership(true, false));
    response
}

/// Transport answering from scripted data, counting every call.
#[derive(Default)]
pub struct MockTransport {
    /// Per-cid answer of `query_channel`.
    channels: Mutex<HashMap<String, ChannelQueryResponse>>,
    /// Pages returned by `id_around` queries, keyed by anchor id.
    around: Mutex<HashMap<String, Vec<Message>>>,
    /// Answers of successive `query_channels` calls.
    pages: Mutex<VecDeque<anyhow::Result<Vec<ChannelQueryResponse>>>>,
    delay: Mutex<Option<Duration>>,
    pub channel_queries: AtomicUsize,
    pub list_queries: AtomicUsize,
    pub seen_channel_options: Mutex<Vec<ChannelQueryOptions>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_channel(&self, response: ChannelQueryResponse) {
        self.channels.lock().insert(response.channel.cid.clone(), response);
    }

    pub fn set_around(&self, anchor: &str, page: Vec<Message>) {
        self.around.lock().insert(anchor.to_string(), page);
    }

    pub fn push_page(&self, page: Vec<ChannelQueryResponse>) {
        self.pages.lock().push_back(Ok(page));
    }

    pub fn push_failure(&self, message: &str) {
        self.pages.lock().push_back(Err(anyhow!(message.to_string())));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn channel_query_count(&self) -> usize {
        self.channel_queries.load(Ordering::SeqCst)
    }

    pub fn list_query_count(&self) -> usize {
        self.list_queries.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn query_channel(
        &self,
        channel_type: &str,
        channel_id: &str,
        options: &ChannelQueryOptions,
    ) -> anyhow::Result<ChannelQueryResponse> {
        self.channel_queries.fetch_add(1, Ordering::SeqCst);
        self.seen_channel_options.lock().push(options.clone());
        self.pause().await;

        let cid = format!("{}:{}", channel_type, channel_id);
        let mut response = self
            .channels
            .lock()
            .get(&cid)
            .cloned()
            .ok_or_else(|| anyhow!("channel {} not found", cid))?;

        let anchor = options.messages.as_ref().and_then(|m| m.id_around.clone());
        if let Some(anchor) = anchor {
            response.messages = self.around.lock().get(&anchor).cloned().unwrap_or_default();
        }
        Ok(response)
    }

    async fn query_channels(
        &self,
        _filters: &ChannelFilters,
        _sort: &ChannelSort,
        _options: &QueryChannelsOptions,
    ) -> anyhow::Result<Vec<ChannelQueryResponse>> {
        self.list_queries.fetch_add(1, Ordering::SeqCst);
        let next = self.pages.lock().pop_front();
        self.pause().await;
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub struct Harness {
    pub client: ChatClient,
    pub transport: Arc<MockTransport>,
    pub logger: Arc<MemoryLogger>,
}

pub fn harness() -> Harness {
    init_tracing();
    let transport = MockTransport::new();
    let logger = Arc::new(MemoryLogger::new());
    let client = ChatClient::with_logger(ClientConfig::for_user(ME), transport.clone(), logger.clone());
    Harness {
        client,
        transport,
        logger,
    }
}

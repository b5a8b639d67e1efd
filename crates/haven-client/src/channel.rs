use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use haven_state::{
    ChannelState, DEFAULT_TYPING_TIMEOUT_SECS, InsertOptions, ListedChannel, PaginationFlags, StateError,
    StateLogger, StateStore, WindowTarget,
};
use haven_types::api::{ChannelQueryOptions, ChannelQueryResponse, MessagePaginationOptions};
use haven_types::events::{ChatEvent, EventType};
use haven_types::models::{ChannelData, ChannelMember, Message, MessageStatus, ReadState, Timestamp, User};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::transport::ChatTransport;

/// Passing this id to [`Channel::load_message_into_state`] jumps back to live traffic.
pub const LATEST_MESSAGE_ID: &str = "latest";

/// What a UI renders for one channel. Republished only when it actually changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSnapshot {
    /// Messages of the current window.
    pub messages: Vec<Message>,
    pub pagination: PaginationFlags,
    pub pinned_messages: Vec<Message>,
    pub threads: HashMap<String, Vec<Message>>,
    pub read: HashMap<String, ReadState>,
    /// Users currently typing, sorted.
    pub typing_users: Vec<String>,
    pub unread_count: u32,
}

impl ChannelSnapshot {
    fn capture(state: &ChannelState) -> Self {
        let mut typing_users: Vec<String> = state.typing().keys().cloned().collect();
        typing_users.sort();
        Self {
            messages: state.messages().to_vec(),
            pagination: state.pagination(),
            pinned_messages: state.pinned_messages().to_vec(),
            threads: state.threads().clone(),
            read: state.read().clone(),
            typing_users,
            unread_count: state.unread_count(),
        }
    }
}

/// Client-side handle of one channel.
///
/// The client registry hands out exactly one `Arc<Channel>` per cid, so list
/// membership can be checked by identity.
pub struct Channel {
    channel_type: String,
    id: String,
    cid: String,
    config: Arc<ClientConfig>,
    transport: Arc<dyn ChatTransport>,
    data: RwLock<Option<ChannelData>>,
    state: Mutex<ChannelState>,
    snapshot: StateStore<ChannelSnapshot>,
    initialized: AtomicBool,
}

impl Channel {
    pub fn new(
        channel_type: impl Into<String>,
        id: impl Into<String>,
        config: Arc<ClientConfig>,
        transport: Arc<dyn ChatTransport>,
        logger: Arc<dyn StateLogger>,
    ) -> Self {
        let channel_type = channel_type.into();
        let id = id.into();
        let cid = format!("{}:{}", channel_type, id);

        let mut state = ChannelState::new(cid.clone(), config.user_id.clone(), logger);
        let typing_timeout = chrono::Duration::from_std(config.typing_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_TYPING_TIMEOUT_SECS));
        state.set_typing_timeout(typing_timeout);

        Self {
            channel_type,
            id,
            cid,
            config,
            transport,
            data: RwLock::new(None),
            state: Mutex::new(state),
            snapshot: StateStore::new(ChannelSnapshot::default()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn cid(&self) -> &str {
        &self.cid
    }

    pub fn channel_type(&self) -> &str {
        &self.channel_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Server-side channel record from the last query or `channel.updated` event.
    pub fn data(&self) -> Option<ChannelData> {
        self.data.read().clone()
    }

    /// Whether the channel has been watched or hydrated from a list query.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Read access to the underlying state.
    pub fn with_state<R>(&self, f: impl FnOnce(&ChannelState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn snapshot(&self) -> Arc<ChannelSnapshot> {
        self.snapshot.get_latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ChannelSnapshot>> {
        self.snapshot.subscribe()
    }

    // -- Queries --

    /// Fetches the newest page and starts watching the channel.
    pub async fn watch(&self) -> Result<ChannelQueryResponse> {
        let mut options = ChannelQueryOptions::watch();
        options.messages = Some(MessagePaginationOptions {
            limit: Some(self.config.message_page_size),
            ..Default::default()
        });
        self.query(options).await
    }

    pub async fn query(&self, options: ChannelQueryOptions) -> Result<ChannelQueryResponse> {
        let response = self
            .transport
            .query_channel(&self.channel_type, &self.id, &options)
            .await?;

        self.apply_query_response(&response, options.messages.as_ref());
        if options.watch {
            self.initialized.store(true, Ordering::Release);
        }
        Ok(response)
    }

    /// Initializes the channel from one entry of a channel-list query.
    pub fn hydrate(&self, response: &ChannelQueryResponse) {
        self.apply_query_response(response, None);
        self.initialized.store(true, Ordering::Release);
    }

    /// Folds a query response into local state. The page lands in the latest
    /// window when no cursor was given, in a fresh window when it is anchored
    /// around a message or time, and in the current window otherwise.
    /// Returns the index of the window that received the page.
    pub fn apply_query_response(
        &self,
        response: &ChannelQueryResponse,
        messages: Option<&MessagePaginationOptions>,
    ) -> Option<usize> {
        *self.data.write() = Some(response.channel.clone());

        let target = match messages {
            Some(m) if m.id_around.is_some() || m.created_at_around.is_some() => WindowTarget::New,
            Some(m) if m.has_cursor() => WindowTarget::Current,
            _ => WindowTarget::Latest,
        };
        let requested = messages
            .and_then(|m| m.limit)
            .unwrap_or(self.config.message_page_size) as usize;

        let window = {
            let mut state = self.state.lock();
            let window = initialize_state(&mut state, response, target);
            if let Some(index) = window {
                refresh_pagination(&mut state, index, &response.messages, requested, messages);
            }
            if target == WindowTarget::Latest {
                state.set_is_up_to_date(true);
            }
            window
        };

        debug!(cid = %self.cid, messages = response.messages.len(), ?target, "applied query response");
        self.publish();
        window
    }

    /// Makes the window holding `message_id` current, querying around it when
    /// no window has it yet. With a `parent_id` the parent message is located
    /// instead. [`LATEST_MESSAGE_ID`] jumps back to the latest window.
    pub async fn load_message_into_state(&self, message_id: &str, parent_id: Option<&str>) -> Result<()> {
        if message_id == LATEST_MESSAGE_ID {
            let latest_is_empty = self.with_state(|s| s.latest_messages().is_empty());
            if latest_is_empty {
                self.query(ChannelQueryOptions::with_messages(MessagePaginationOptions {
                    limit: Some(self.config.message_page_size),
                    ..Default::default()
                }))
                .await?;
            }
            if let Some(index) = self.with_state(|s| s.latest_window_index()) {
                self.switch_window(index);
            }
            return Ok(());
        }

        let anchor = parent_id.unwrap_or(message_id);
        if let Some(index) = self.with_state(|s| s.find_window_index(anchor)) {
            self.switch_window(index);
            return Ok(());
        }

        let around = MessagePaginationOptions::around_id(anchor, self.config.message_page_size);
        self.query(ChannelQueryOptions::with_messages(around)).await?;

        match self.with_state(|s| s.find_window_index(anchor)) {
            Some(index) => self.switch_window(index),
            None => debug!(cid = %self.cid, message_id = %anchor, "message not returned by query"),
        }
        Ok(())
    }

    fn switch_window(&self, index: usize) {
        let result = self.state.lock().switch_current_window(index);
        if let Err(e) = result {
            warn!(cid = %self.cid, "Failed to switch window: {}", e);
            return;
        }
        self.publish();
    }

    // -- Local mutations --

    /// Inserts a locally-created message into the latest window ahead of the
    /// server round trip. The server echo carries the same id and replaces it.
    pub fn add_optimistic_message(&self, text: impl Into<String>) -> Message {
        let mut message = Message::new(Uuid::new_v4().to_string(), Utc::now());
        message.text = text.into();
        message.user = self.config.user_id.clone().map(User::new);
        message.status = MessageStatus::Sending;

        self.state
            .lock()
            .add_message_sorted(message.clone(), false, true, WindowTarget::Latest);
        self.publish();
        message
    }

    /// Expires idle typing indicators and returns the synthetic `typing.stop` events.
    pub fn clean(&self, now: Timestamp) -> Vec<ChatEvent> {
        let stops = self.state.lock().clean(now);
        if !stops.is_empty() {
            self.publish();
        }
        stops
    }

    // -- Events --

    /// Applies one stream event addressed to this channel.
    pub fn handle_event(&self, event: &ChatEvent) {
        {
            let mut state = self.state.lock();
            match event.kind {
                EventType::TypingStart => {
                    if let Some(user_id) = event.user_id() {
                        state.start_typing(user_id, event.clone());
                    }
                }
                EventType::TypingStop => {
                    if let Some(user_id) = event.user_id() {
                        state.stop_typing(user_id);
                    }
                }
                EventType::MessageRead => {
                    if let Some(user_id) = event.user_id() {
                        state.set_read(ReadState {
                            user_id: user_id.to_string(),
                            last_read: event_time(event),
                            last_read_message_id: event.last_read_message_id.clone(),
                            unread_messages: 0,
                        });
                    }
                }
                EventType::MessageNew => {
                    if let Some(message) = &event.message {
                        on_message_new(&mut state, event, message);
                    }
                }
                EventType::MessageUpdated | EventType::MessageUndeleted => {
                    if let Some(message) = &event.message {
                        let message = with_own_reactions(&state, message);
                        if message.pinned {
                            state.add_pinned(message.clone());
                        } else {
                            state.remove_pinned(&message.id);
                        }
                        state.add_message_sorted(message, false, false, WindowTarget::Latest);
                    }
                }
                EventType::MessageDeleted => {
                    if let Some(message) = &event.message {
                        if event.hard_delete {
                            state.remove_message(&message.id, message.parent_id.as_deref());
                        } else {
                            let message = with_own_reactions(&state, message);
                            state.add_message_sorted(message, false, false, WindowTarget::Latest);
                        }
                        if message.pinned {
                            state.remove_pinned(&message.id);
                        }
                    }
                }
                EventType::ReactionNew | EventType::ReactionUpdated => {
                    if let (Some(reaction), Some(message)) = (&event.reaction, &event.message) {
                        // an update always replaces the user's previous reaction
                        let enforce_unique = event.enforce_unique || event.kind == EventType::ReactionUpdated;
                        state.add_reaction(reaction, message, enforce_unique);
                    }
                }
                EventType::ReactionDeleted => {
                    if let (Some(reaction), Some(message)) = (&event.reaction, &event.message) {
                        state.remove_reaction(reaction, message);
                    }
                }
                EventType::MemberUpdated => {
                    if let Some(member) = &event.member {
                        state.set_member(member.clone());
                    }
                }
                EventType::NotificationMarkUnread => {
                    if let Some(user_id) = event.user_id().filter(|id| state.is_own_user(id)) {
                        state.set_read(ReadState {
                            user_id: user_id.to_string(),
                            last_read: event_time(event),
                            last_read_message_id: event.last_read_message_id.clone(),
                            unread_messages: event.unread_messages.unwrap_or(0),
                        });
                    }
                }
                EventType::ChannelUpdated => {
                    if let Some(channel) = &event.channel {
                        *self.data.write() = Some(channel.clone());
                    }
                }
                EventType::ChannelHidden => {
                    if let Some(data) = self.data.write().as_mut() {
                        data.hidden = true;
                    }
                    if event.clear_history {
                        state.clear_messages();
                    }
                }
                EventType::ChannelVisible => {
                    if let Some(data) = self.data.write().as_mut() {
                        data.hidden = false;
                    }
                }
                EventType::ChannelTruncated => {
                    match event.channel.as_ref().and_then(|c| c.truncated_at) {
                        Some(truncated_at) => state.truncate(truncated_at),
                        None => state.clear_messages(),
                    }
                    state.set_unread_count(0);
                    // the system message does not count as unread
                    if let Some(message) = &event.message {
                        if message.pinned {
                            state.add_pinned(message.clone());
                        }
                        state.add_message_sorted(message.clone(), false, true, WindowTarget::Latest);
                    }
                }
                _ => {}
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let next = ChannelSnapshot::capture(&self.state.lock());
        self.snapshot.update(|current| {
            if **current == next {
                Arc::clone(current)
            } else {
                Arc::new(next)
            }
        });
    }
}

impl ListedChannel for Channel {
    fn cid(&self) -> &str {
        &self.cid
    }

    fn membership(&self) -> Option<ChannelMember> {
        self.state.lock().membership().cloned()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("cid", &self.cid)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

fn initialize_state(state: &mut ChannelState, response: &ChannelQueryResponse, target: WindowTarget) -> Option<usize> {
    state.set_watcher_count(response.watcher_count);
    for member in &response.members {
        state.set_member(member.clone());
    }
    if let Some(membership) = &response.membership {
        state.set_membership(Some(membership.clone()));
    }

    let window = state.insert_messages(
        response.messages.clone(),
        InsertOptions {
            initializing: true,
            target,
            ..Default::default()
        },
    );
    for pinned in &response.pinned_messages {
        state.add_pinned(pinned.clone());
    }

    // everything loaded so far counts as read until the server says otherwise
    if let Some(user_id) = state.own_user_id().map(str::to_string) {
        if !state.read().contains_key(&user_id) {
            let last_read = state.last_message_at().unwrap_or_else(Utc::now);
            state.set_read(ReadState {
                user_id,
                last_read,
                last_read_message_id: None,
                unread_messages: 0,
            });
        }
    }
    for read in &response.read {
        state.set_read(read.clone());
    }

    window
}

fn on_message_new(state: &mut ChannelState, event: &ChatEvent, message: &Message) {
    let sender = event.user_id().or(message.user_id());
    let own = sender.is_some_and(|id| state.is_own_user(id));
    let thread_reply = message.is_thread_reply();

    if state.is_up_to_date() || thread_reply {
        // own messages may already be present as an optimistic copy with a local timestamp
        state.add_message_sorted(message.clone(), own, true, WindowTarget::Latest);
    }
    if message.pinned {
        state.add_pinned(message.clone());
    }

    if own || thread_reply {
        return;
    }
    if let Some(sender) = sender {
        state.record_new_message(sender, event_time(event), &message.id);
    }
    if !message.silent && !message.shadowed {
        state.increment_unread();
    }
}

/// Re-derives the flags of the window that just received `page`. Returns
/// `None` when the flags were left as they were.
fn refresh_pagination(
    state: &mut ChannelState,
    index: usize,
    page: &[Message],
    requested: usize,
    options: Option<&MessagePaginationOptions>,
) -> Option<PaginationFlags> {
    match state.apply_page_pagination(index, page, requested, options) {
        Ok(flags) => Some(flags),
        // already reported through the state logger
        Err(StateError::CorruptedWindow { .. }) => None,
        Err(err) => {
            warn!(cid = %state.cid(), error = %err, "pagination flags not updated");
            None
        }
    }
}

/// Carries the locally known `own_reactions` over to a server copy of the message.
fn with_own_reactions(state: &ChannelState, message: &Message) -> Message {
    let mut message = message.clone();
    let stored = state
        .find_message(&message.id, message.parent_id.as_deref())
        .or_else(|| state.find_message(&message.id, None));
    if let Some(stored) = stored {
        message.own_reactions = stored.own_reactions.clone();
    }
    message
}

fn event_time(event: &ChatEvent) -> Timestamp {
    event.created_at.or(event.received_at).unwrap_or_else(Utc::now)
}

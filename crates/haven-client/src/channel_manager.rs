//! The channel list: query, pagination and the per-event reordering rules.
//!
//! Every handler reads the latest published list, derives a new one and
//! publishes it. Handlers that would not change the order hand back the same
//! `Arc`, so subscribers are not woken for no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use haven_state::{
    ChannelList, StateEvent, StateLog, StateLogger, StateStore, append_unique, archive_filter_mismatch,
    find_channel_index, is_channel_pinned, promote_channel, remove_channel, reseat_channel,
    should_consider_archived_channels, should_consider_pinned_channels,
};
use haven_types::api::{ChannelFilters, ChannelSort, QueryChannelsOptions, SortDirection};
use haven_types::events::{ChatEvent, EventType};

use crate::channel::Channel;
use crate::client::ChatClient;
use crate::config::ChannelManagerOptions;
use crate::error::{ClientError, Result};
use crate::watch_registry::WatchRegistry;

const COMPONENT: &str = "channel_manager";

#[derive(Debug, Clone, Default)]
pub struct ChannelManagerPagination {
    pub filters: ChannelFilters,
    pub sort: ChannelSort,
    pub options: QueryChannelsOptions,
    pub has_next: bool,
    pub is_loading: bool,
    pub is_loading_next: bool,
}

#[derive(Debug, Clone)]
pub struct ChannelManagerState {
    pub channels: ChannelList<Channel>,
    pub pagination: ChannelManagerPagination,
    /// Latched by the first successful query.
    pub initialized: bool,
    /// Failure of the most recent query, cleared by the next success.
    pub error: Option<ClientError>,
}

impl Default for ChannelManagerState {
    fn default() -> Self {
        Self {
            channels: Arc::new(Vec::new()),
            pagination: ChannelManagerPagination::default(),
            initialized: false,
            error: None,
        }
    }
}

/// Event kinds the channel list reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelManagerEvent {
    ChannelDeleted,
    ChannelHidden,
    ChannelTruncated,
    ChannelVisible,
    MemberUpdated,
    MessageNew,
    NotificationAddedToChannel,
    NotificationMessageNew,
    NotificationRemovedFromChannel,
}

impl ChannelManagerEvent {
    pub fn from_event_type(kind: EventType) -> Option<Self> {
        let event = match kind {
            EventType::ChannelDeleted => Self::ChannelDeleted,
            EventType::ChannelHidden => Self::ChannelHidden,
            EventType::ChannelTruncated => Self::ChannelTruncated,
            EventType::ChannelVisible => Self::ChannelVisible,
            EventType::MemberUpdated => Self::MemberUpdated,
            EventType::MessageNew => Self::MessageNew,
            EventType::NotificationAddedToChannel => Self::NotificationAddedToChannel,
            EventType::NotificationMessageNew => Self::NotificationMessageNew,
            EventType::NotificationRemovedFromChannel => Self::NotificationRemovedFromChannel,
            _ => return None,
        };
        Some(event)
    }

    pub fn event_type(self) -> EventType {
        match self {
            Self::ChannelDeleted => EventType::ChannelDeleted,
            Self::ChannelHidden => EventType::ChannelHidden,
            Self::ChannelTruncated => EventType::ChannelTruncated,
            Self::ChannelVisible => EventType::ChannelVisible,
            Self::MemberUpdated => EventType::MemberUpdated,
            Self::MessageNew => EventType::MessageNew,
            Self::NotificationAddedToChannel => EventType::NotificationAddedToChannel,
            Self::NotificationMessageNew => EventType::NotificationMessageNew,
            Self::NotificationRemovedFromChannel => EventType::NotificationRemovedFromChannel,
        }
    }
}

/// Handle given to handler overrides: read the list, publish a new one.
pub struct ChannelSetter<'a> {
    state: &'a StateStore<ChannelManagerState>,
}

impl ChannelSetter<'_> {
    pub fn state(&self) -> Arc<ChannelManagerState> {
        self.state.get_latest()
    }

    pub fn channels(&self) -> ChannelList<Channel> {
        Arc::clone(&self.state.get_latest().channels)
    }

    /// Publishes `channels`; handing back the current list is a no-op.
    pub fn set_channels(&self, channels: ChannelList<Channel>) -> bool {
        store_channels(self.state, channels)
    }
}

/// Replaces the default handler of one event kind.
pub type EventHandlerOverride = Arc<dyn Fn(&ChannelSetter<'_>, &ChatEvent) + Send + Sync>;

pub struct ChannelManager {
    client: ChatClient,
    state: StateStore<ChannelManagerState>,
    options: RwLock<ChannelManagerOptions>,
    overrides: RwLock<HashMap<ChannelManagerEvent, EventHandlerOverride>>,
    watches: WatchRegistry,
    logger: Arc<dyn StateLogger>,
    /// Bumped by every query; results of a superseded generation are dropped
    query_generation: AtomicU64,
    subscription: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelManager {
    pub fn new(client: ChatClient, options: ChannelManagerOptions) -> Self {
        let logger = client.logger();
        let mut initial = ChannelManagerState::default();
        initial.pagination.options.limit = client.config().channel_page_size;
        Self {
            client,
            state: StateStore::new(initial),
            options: RwLock::new(options),
            overrides: RwLock::new(HashMap::new()),
            watches: WatchRegistry::new(),
            logger,
            query_generation: AtomicU64::new(0),
            subscription: Mutex::new(None),
        }
    }

    pub fn state(&self) -> Arc<ChannelManagerState> {
        self.state.get_latest()
    }

    pub fn channels(&self) -> ChannelList<Channel> {
        Arc::clone(&self.state.get_latest().channels)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ChannelManagerState>> {
        self.state.subscribe()
    }

    pub fn options(&self) -> ChannelManagerOptions {
        self.options.read().clone()
    }

    pub fn set_options(&self, options: ChannelManagerOptions) {
        *self.options.write() = options;
    }

    /// Replaces the whole override table.
    pub fn set_event_handler_overrides(&self, overrides: HashMap<ChannelManagerEvent, EventHandlerOverride>) {
        *self.overrides.write() = overrides;
    }

    pub fn set_event_handler_override(&self, event: ChannelManagerEvent, handler: EventHandlerOverride) {
        self.overrides.write().insert(event, handler);
    }

    pub fn set_channels(&self, channels: ChannelList<Channel>) -> bool {
        store_channels(&self.state, channels)
    }

    /// Number of channel watches this manager has in flight.
    pub fn watches_in_flight(&self) -> usize {
        self.watches.in_flight()
    }

    // -- Queries --

    /// Query options with the configured channel page size.
    pub fn default_query_options(&self) -> QueryChannelsOptions {
        QueryChannelsOptions {
            limit: self.client.config().channel_page_size,
            ..Default::default()
        }
    }

    /// Loads the first page of channels matching `filters`.
    ///
    /// While another query is loading this is a no-op, unless
    /// `abort_inflight_query` is set, in which case the older query's result
    /// is discarded when it arrives.
    pub async fn query(&self, filters: ChannelFilters, sort: ChannelSort, options: QueryChannelsOptions) -> Result<()> {
        let abort_inflight = self.options.read().abort_inflight_query;
        if self.state.get_latest().pagination.is_loading && !abort_inflight {
            debug!("Channel query already in flight, skipping");
            return Ok(());
        }

        let generation = self.query_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.partial_next(|state| {
            state.pagination.is_loading = true;
            state.pagination.is_loading_next = false;
            state.pagination.filters = filters.clone();
            state.pagination.sort = sort.clone();
            state.pagination.options = options.clone();
        });

        let result = self.client.query_channels(&filters, &sort, &options).await;

        if self.query_generation.load(Ordering::SeqCst) != generation {
            self.log(StateEvent::QueryDiscarded { generation });
            return Ok(());
        }

        match result {
            Ok(channels) => {
                let count = channels.len();
                let offset = options.offset + count as u32;
                self.state.partial_next(|state| {
                    state.channels = Arc::new(channels);
                    state.pagination.has_next = count >= options.limit as usize;
                    state.pagination.is_loading = false;
                    state.pagination.options.offset = offset;
                    state.initialized = true;
                    state.error = None;
                });
                self.log(StateEvent::ChannelsLoaded { count, offset });
                Ok(())
            }
            Err(e) => {
                self.log(StateEvent::QueryFailed { message: e.to_string() });
                self.state.partial_next(|state| {
                    state.pagination.is_loading = false;
                    state.error = Some(e.clone());
                });
                Err(e)
            }
        }
    }

    /// Appends the next page of the current query. No-op before the first
    /// query, while a page is loading, or once the list is exhausted.
    pub async fn load_next(&self) -> Result<()> {
        let current = self.state.get_latest();
        let pagination = &current.pagination;
        if !current.initialized || pagination.is_loading_next || !pagination.has_next {
            return Ok(());
        }

        let filters = pagination.filters.clone();
        let sort = pagination.sort.clone();
        let options = pagination.options.clone();
        self.state.partial_next(|state| state.pagination.is_loading_next = true);

        match self.client.query_channels(&filters, &sort, &options).await {
            Ok(page) => {
                let count = page.len();
                let offset = options.offset + count as u32;
                self.state.partial_next(|state| {
                    state.channels = Arc::new(append_unique(&state.channels, page));
                    state.pagination.has_next = count >= options.limit as usize;
                    state.pagination.is_loading_next = false;
                    state.pagination.options.offset = offset;
                });
                self.log(StateEvent::ChannelsLoaded { count, offset });
                Ok(())
            }
            Err(e) => {
                self.log(StateEvent::QueryFailed { message: e.to_string() });
                self.state.partial_next(|state| state.pagination.is_loading_next = false);
                Err(e)
            }
        }
    }

    // -- Events --

    /// Starts feeding the client's event bus into [`handle_event`](Self::handle_event).
    pub fn register_subscriptions(self: &Arc<Self>) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }

        let mut rx = self.client.subscribe();
        let manager: Weak<Self> = Arc::downgrade(self);
        *subscription = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        manager.handle_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Channel manager lagged behind the event bus, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            info!("Channel manager subscription ended");
        }));
    }

    pub fn unregister_subscriptions(&self) {
        if let Some(handle) = self.subscription.lock().take() {
            handle.abort();
        }
    }

    /// Runs the override registered for the event's kind, or the default handler.
    pub async fn handle_event(&self, event: &ChatEvent) {
        let Some(kind) = ChannelManagerEvent::from_event_type(event.kind) else {
            return;
        };

        let handler = self.overrides.read().get(&kind).cloned();
        match handler {
            Some(handler) => handler(&ChannelSetter { state: &self.state }, event),
            None => self.run_default_handler(kind, event).await,
        }
    }

    async fn run_default_handler(&self, kind: ChannelManagerEvent, event: &ChatEvent) {
        match kind {
            ChannelManagerEvent::ChannelDeleted
            | ChannelManagerEvent::ChannelHidden
            | ChannelManagerEvent::NotificationRemovedFromChannel => self.on_channel_removed(event),
            ChannelManagerEvent::ChannelTruncated => self.on_channel_truncated(event),
            ChannelManagerEvent::MessageNew => self.on_message_new(event),
            ChannelManagerEvent::MemberUpdated => self.on_member_updated(event),
            ChannelManagerEvent::ChannelVisible
            | ChannelManagerEvent::NotificationAddedToChannel
            | ChannelManagerEvent::NotificationMessageNew => self.on_channel_surfaced(event).await,
        }
    }

    fn on_channel_removed(&self, event: &ChatEvent) {
        let Some(cid) = event_cid(event) else {
            return;
        };
        let channels = self.channels();
        let updated = remove_channel(&channels, &cid);
        if self.set_channels(updated) {
            self.log(StateEvent::ChannelRemoved { cid });
        }
    }

    /// Republishes the list so subscribers re-render the truncated channel.
    fn on_channel_truncated(&self, event: &ChatEvent) {
        let Some(cid) = event_cid(event) else {
            return;
        };
        let channels = self.channels();
        if find_channel_index(&channels, &cid).is_some() {
            self.set_channels(Arc::new(channels.as_ref().clone()));
        }
    }

    fn on_message_new(&self, event: &ChatEvent) {
        let Some((channel_type, channel_id)) = event.channel_key() else {
            return;
        };
        let current = self.state.get_latest();
        let filters = &current.pagination.filters;
        let sort = &current.pagination.sort;
        let options = self.options();

        let target = self.client.channel(&channel_type, &channel_id);
        let listed = find_channel_index(&current.channels, target.cid()).is_some();

        if archive_filter_mismatch(target.as_ref(), filters)
            || (should_consider_pinned_channels(sort) && is_channel_pinned(target.as_ref()))
            || options.lock_channel_order
            || (!listed && !options.allows_not_loaded_promotion(event.kind))
        {
            return;
        }

        self.promote(&current.channels, &target, sort);
    }

    /// `channel.visible`, `notification.added_to_channel` and
    /// `notification.message_new`: watch the channel, then promote it.
    async fn on_channel_surfaced(&self, event: &ChatEvent) {
        let Some((channel_type, channel_id)) = event_channel_key(event) else {
            return;
        };
        let channel = self.client.channel(&channel_type, &channel_id);

        let listed = find_channel_index(&self.channels(), channel.cid()).is_some();
        if !listed && !self.options().allows_not_loaded_promotion(event.kind) {
            return;
        }

        let channel = match self.watches.get_and_watch(channel).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(cid = %format!("{}:{}", channel_type, channel_id), "Failed to watch channel: {}", e);
                return;
            }
        };

        let current = self.state.get_latest();
        if archive_filter_mismatch(channel.as_ref(), &current.pagination.filters) {
            return;
        }
        self.promote(&current.channels, &channel, &current.pagination.sort);
    }

    /// Own membership changed: drop the channel if it no longer matches the
    /// archive filter, otherwise move it to where its pin state puts it.
    fn on_member_updated(&self, event: &ChatEvent) {
        let Some(member) = &event.member else {
            return;
        };
        if self.client.user_id() != Some(member.user_id.as_str()) {
            return;
        }
        let Some((channel_type, channel_id)) = event.channel_key() else {
            return;
        };

        let current = self.state.get_latest();
        let filters = &current.pagination.filters;
        let sort = &current.pagination.sort;
        if (!should_consider_pinned_channels(sort) && !should_consider_archived_channels(filters))
            || self.options().lock_channel_order
        {
            return;
        }

        let target = self.client.channel(&channel_type, &channel_id);
        if archive_filter_mismatch(target.as_ref(), filters) {
            let updated = remove_channel(&current.channels, target.cid());
            if self.set_channels(updated) {
                self.log(StateEvent::ChannelRemoved {
                    cid: target.cid().to_string(),
                });
            }
            return;
        }

        // ascending pin sort keeps every pinned channel ahead; descending puts a freshly pinned one on top
        let behind_pinned = match sort.direction_at(0, "pinned_at") {
            Some(SortDirection::Ascending) => true,
            Some(SortDirection::Descending) => !is_channel_pinned(target.as_ref()),
            None => false,
        };
        let from = find_channel_index(&current.channels, target.cid());
        let updated = reseat_channel(&current.channels, &target, behind_pinned);
        self.publish_move(&current.channels, updated, &target, from);
    }

    fn promote(&self, channels: &ChannelList<Channel>, channel: &Arc<Channel>, sort: &ChannelSort) {
        let from = find_channel_index(channels, channel.cid());
        let updated = promote_channel(channels, channel, sort);
        self.publish_move(channels, updated, channel, from);
    }

    fn publish_move(
        &self,
        before: &ChannelList<Channel>,
        after: ChannelList<Channel>,
        channel: &Arc<Channel>,
        from: Option<usize>,
    ) {
        if Arc::ptr_eq(before, &after) {
            return;
        }
        let to = find_channel_index(&after, channel.cid()).unwrap_or(0);
        self.set_channels(after);
        self.log(StateEvent::ChannelPromoted {
            cid: channel.cid().to_string(),
            from,
            to,
        });
    }

    fn log(&self, event: StateEvent) {
        self.logger.log(StateLog::new(COMPONENT, None, event));
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.unregister_subscriptions();
    }
}

fn store_channels(state: &StateStore<ChannelManagerState>, channels: ChannelList<Channel>) -> bool {
    state.update(|current| {
        if Arc::ptr_eq(&current.channels, &channels) {
            return Arc::clone(current);
        }
        Arc::new(ChannelManagerState {
            channels,
            ..ChannelManagerState::clone(current)
        })
    })
}

fn event_cid(event: &ChatEvent) -> Option<String> {
    event
        .cid
        .clone()
        .or_else(|| event.channel.as_ref().map(|c| c.cid.clone()))
        .or_else(|| event.channel_key().map(|(t, id)| format!("{}:{}", t, id)))
}

/// Notifications carry the channel record; plain channel events carry type and id.
pub(crate) fn event_channel_key(event: &ChatEvent) -> Option<(String, String)> {
    event
        .channel
        .as_ref()
        .map(|c| (c.channel_type.clone(), c.id.clone()))
        .or_else(|| event.channel_key())
}

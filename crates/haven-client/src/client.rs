use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use haven_state::{StateLogger, TracingLogger};
use haven_types::api::{ChannelFilters, ChannelSort, QueryChannelsOptions};
use haven_types::events::ChatEvent;
use haven_types::models::Timestamp;

use crate::channel::Channel;
use crate::channel_manager::event_channel_key;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::transport::ChatTransport;

/// Entry point of the client: owns the channel registry and the event bus.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Arc<ClientConfig>,
    transport: Arc<dyn ChatTransport>,
    logger: Arc<dyn StateLogger>,

    /// One handle per cid for the lifetime of the client
    channels: RwLock<HashMap<String, Arc<Channel>>>,

    /// Every dispatched event, after it has been applied to its channel
    events_tx: broadcast::Sender<ChatEvent>,
}

impl ChatClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self::with_logger(config, transport, Arc::new(TracingLogger))
    }

    pub fn with_logger(config: ClientConfig, transport: Arc<dyn ChatTransport>, logger: Arc<dyn StateLogger>) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            inner: Arc::new(ClientInner {
                config: Arc::new(config),
                transport,
                logger,
                channels: RwLock::new(HashMap::new()),
                events_tx,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn user_id(&self) -> Option<&str> {
        self.inner.config.user_id.as_deref()
    }

    pub fn logger(&self) -> Arc<dyn StateLogger> {
        Arc::clone(&self.inner.logger)
    }

    /// Returns the channel `channel_type:id`, creating its handle on first use.
    pub fn channel(&self, channel_type: &str, id: &str) -> Arc<Channel> {
        let cid = format!("{}:{}", channel_type, id);
        if let Some(channel) = self.inner.channels.read().get(&cid) {
            return Arc::clone(channel);
        }

        let mut channels = self.inner.channels.write();
        let channel = channels.entry(cid).or_insert_with(|| {
            Arc::new(Channel::new(
                channel_type,
                id,
                Arc::clone(&self.inner.config),
                Arc::clone(&self.inner.transport),
                Arc::clone(&self.inner.logger),
            ))
        });
        Arc::clone(channel)
    }

    /// Resolves a `type:id` cid through [`channel`](Self::channel).
    pub fn channel_by_cid(&self, cid: &str) -> Result<Arc<Channel>> {
        match cid.split_once(':') {
            Some((channel_type, id)) if !channel_type.is_empty() && !id.is_empty() => {
                Ok(self.channel(channel_type, id))
            }
            _ => Err(ClientError::InvalidCid(cid.to_string())),
        }
    }

    /// Returns the channel only if a handle already exists.
    pub fn get_channel(&self, cid: &str) -> Option<Arc<Channel>> {
        self.inner.channels.read().get(cid).cloned()
    }

    /// Subscribe to client events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Feeds one stream event into the client: stamps `received_at`, applies it
    /// to the addressed channel if that channel is known, then broadcasts it.
    pub fn dispatch_event(&self, mut event: ChatEvent) {
        if event.received_at.is_none() {
            event.received_at = Some(Utc::now());
        }

        let channel = event_channel_key(&event)
            .and_then(|(channel_type, id)| self.get_channel(&format!("{}:{}", channel_type, id)));
        if let Some(channel) = channel {
            channel.handle_event(&event);
        }

        debug!(kind = %event.kind, cid = event.cid.as_deref().unwrap_or("-"), "dispatched event");
        self.broadcast(event);
    }

    fn broadcast(&self, event: ChatEvent) {
        let _ = self.inner.events_tx.send(event);
    }

    /// Fetches one page of the channel list and hydrates every returned channel.
    pub async fn query_channels(
        &self,
        filters: &ChannelFilters,
        sort: &ChannelSort,
        options: &QueryChannelsOptions,
    ) -> Result<Vec<Arc<Channel>>> {
        let responses = self.inner.transport.query_channels(filters, sort, options).await?;

        let channels = responses
            .iter()
            .map(|response| {
                let channel = self.channel(&response.channel.channel_type, &response.channel.id);
                channel.hydrate(response);
                channel
            })
            .collect();
        Ok(channels)
    }

    /// Expires idle typing indicators on every channel and broadcasts the
    /// resulting `typing.stop` events. Returns how many were dropped.
    pub fn clean_typing(&self, now: Timestamp) -> usize {
        let channels: Vec<Arc<Channel>> = self.inner.channels.read().values().cloned().collect();

        let mut dropped = 0;
        for channel in channels {
            for stop in channel.clean(now) {
                dropped += 1;
                self.broadcast(stop);
            }
        }
        dropped
    }

    /// Runs [`clean_typing`](Self::clean_typing) every `typing_clean_interval`
    /// until the client is dropped.
    pub fn spawn_typing_cleaner(&self) -> JoinHandle<()> {
        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        // interval() rejects a zero period
        let period = self.inner.config.typing_clean_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ChatClient { inner }.clean_typing(Utc::now());
            }
            info!("Typing cleaner stopped");
        })
    }
}

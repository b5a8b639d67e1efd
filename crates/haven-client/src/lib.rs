/// Haven Client: channel handles, the client event bus and the channel list.
///
/// The synchronous reconciliation lives in `haven-state`; this crate wires it
/// to a [`ChatTransport`] and to the realtime event stream.

pub mod channel;
pub mod channel_manager;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;
pub mod watch_registry;

// Re-export key types for convenience.
pub use channel::{Channel, ChannelSnapshot, LATEST_MESSAGE_ID};
pub use channel_manager::{
    ChannelManager, ChannelManagerEvent, ChannelManagerPagination, ChannelManagerState, ChannelSetter,
    EventHandlerOverride,
};
pub use client::ChatClient;
pub use config::{ChannelManagerOptions, ClientConfig};
pub use error::{ClientError, Result};
pub use transport::ChatTransport;
pub use watch_registry::WatchRegistry;

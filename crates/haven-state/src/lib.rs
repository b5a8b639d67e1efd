/// Haven State: the synchronous reconciliation core of the chat client.
///
/// - Sorted insertion with identity-aware tie breaking
/// - Message windows with merge-on-overlap and thread/pinned side lists
/// - Pagination flags derived from each page that lands in a window
/// - Channel-list ordering with a frozen pinned prefix
/// - Publish-on-change state stores
///
/// Nothing in here performs I/O; the client crate feeds it query results and events.

pub mod channel_state;
pub mod error;
pub mod logging;
pub mod message_list;
pub mod message_set;
pub mod ordering;
pub mod pagination;
pub mod sorted;
pub mod store;

// Re-export key types for convenience.
pub use channel_state::{ChannelState, DEFAULT_TYPING_TIMEOUT_SECS};
pub use error::StateError;
pub use logging::{MemoryLogger, NullLogger, StateEvent, StateLog, StateLogger, TracingLogger};
pub use message_list::{SortBy, add_to_message_list, remove_from_message_list};
pub use message_set::{InsertOptions, MessageSet, WindowTarget};
pub use ordering::{
    ChannelList, ListedChannel, append_unique, archive_filter_mismatch, find_channel_index,
    find_last_pinned_channel_index, is_channel_archived, is_channel_pinned, promote_channel, remove_channel,
    reseat_channel, should_consider_archived_channels, should_consider_pinned_channels,
};
pub use pagination::{PageStrategy, PageUpdate, PaginationFlags, derive_flags};
pub use store::StateStore;

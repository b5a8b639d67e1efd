//! Structured state logging.
//!
//! The engines report notable transitions (window merges, corrupted windows,
//! list promotions, failed queries) through a [`StateLogger`] so a host can
//! route them to `tracing`, collect them in tests, or drop them.

use std::fmt;

/// Structured log entry for a state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateLog {
    pub component: &'static str,
    pub cid: Option<String>,
    pub event: StateEvent,
}

impl StateLog {
    pub fn new(component: &'static str, cid: Option<&str>, event: StateEvent) -> Self {
        Self {
            component,
            cid: cid.map(str::to_string),
            event,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// A query anchored outside every known window opened a new one
    WindowCreated { index: usize },
    /// Overlapping windows were folded into one
    WindowsMerged { target: usize, merged: usize },
    /// A page was larger than the window it landed in; flags left unchanged
    CorruptedWindow { window_len: usize, page_len: usize },
    /// Current window switched
    WindowSwitched { from: Option<usize>, to: usize },
    /// Typing indicator dropped after the idle timeout
    TypingExpired { user_id: String },
    /// Channel moved up the list
    ChannelPromoted { cid: String, from: Option<usize>, to: usize },
    /// Channel removed from the list
    ChannelRemoved { cid: String },
    /// Channel list replaced by a query result
    ChannelsLoaded { count: usize, offset: u32 },
    /// A query failed; loading flags were reset
    QueryFailed { message: String },
    /// A query result arrived after a newer query superseded it
    QueryDiscarded { generation: u64 },
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WindowCreated { index } => write!(f, "window_created index={}", index),
            Self::WindowsMerged { target, merged } => {
                write!(f, "windows_merged target={} merged={}", target, merged)
            }
            Self::CorruptedWindow { window_len, page_len } => {
                write!(f, "corrupted_window window_len={} page_len={}", window_len, page_len)
            }
            Self::WindowSwitched { from, to } => match from {
                Some(from) => write!(f, "window_switched from={} to={}", from, to),
                None => write!(f, "window_switched to={}", to),
            },
            Self::TypingExpired { user_id } => write!(f, "typing_expired user={}", user_id),
            Self::ChannelPromoted { cid, from, to } => match from {
                Some(from) => write!(f, "channel_promoted cid={} from={} to={}", cid, from, to),
                None => write!(f, "channel_promoted cid={} to={}", cid, to),
            },
            Self::ChannelRemoved { cid } => write!(f, "channel_removed cid={}", cid),
            Self::ChannelsLoaded { count, offset } => {
                write!(f, "channels_loaded count={} offset={}", count, offset)
            }
            Self::QueryFailed { message } => write!(f, "query_failed: {}", message),
            Self::QueryDiscarded { generation } => {
                write!(f, "query_discarded generation={}", generation)
            }
        }
    }
}

/// Sink for state logs. Implementations can write to tracing, collect, or discard.
pub trait StateLogger: Send + Sync {
    fn log(&self, entry: StateLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl StateLogger for TracingLogger {
    fn log(&self, entry: StateLog) {
        let cid = entry.cid.as_deref().unwrap_or("-");
        match &entry.event {
            StateEvent::CorruptedWindow { .. } | StateEvent::QueryFailed { .. } => {
                tracing::error!(component = entry.component, cid = %cid, "{}", entry.event);
            }
            StateEvent::WindowCreated { .. }
            | StateEvent::WindowsMerged { .. }
            | StateEvent::ChannelsLoaded { .. }
            | StateEvent::QueryDiscarded { .. } => {
                tracing::info!(component = entry.component, cid = %cid, "{}", entry.event);
            }
            _ => {
                tracing::debug!(component = entry.component, cid = %cid, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl StateLogger for NullLogger {
    fn log(&self, _entry: StateLog) {}
}

/// Logger that keeps every entry in memory. Handy for asserting on diagnostics.
#[derive(Default)]
pub struct MemoryLogger {
    entries: parking_lot::Mutex<Vec<StateLog>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StateLog> {
        self.entries.lock().clone()
    }
}

impl StateLogger for MemoryLogger {
    fn log(&self, entry: StateLog) {
        self.entries.lock().push(entry);
    }
}

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// A page was merged into a window that ended up smaller than the page.
    #[error("corrupted message window: window holds {window_len} messages but the page had {page_len}")]
    CorruptedWindow { window_len: usize, page_len: usize },

    #[error("message window {index} does not exist ({count} windows)")]
    WindowOutOfRange { index: usize, count: usize },
}

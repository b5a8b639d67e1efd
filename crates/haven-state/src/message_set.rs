use haven_types::models::Message;

use crate::pagination::PaginationFlags;

/// One contiguous, sorted slice of a channel's history.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSet {
    pub messages: Vec<Message>,
    /// The window shown to the consumer.
    pub is_current: bool,
    /// The window adjacent to live traffic.
    pub is_latest: bool,
    pub pagination: PaginationFlags,
}

impl MessageSet {
    pub fn new(is_current: bool, is_latest: bool) -> Self {
        Self {
            messages: Vec::new(),
            is_current,
            is_latest,
            pagination: PaginationFlags::default(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn overlaps(&self, batch: &[Message]) -> bool {
        batch.iter().any(|m| self.contains(&m.id))
    }

    /// Folds `other`'s flags into `self`: the current/latest markers are OR-ed and
    /// each pagination flag is taken from whichever window reaches further in
    /// that direction.
    pub(crate) fn absorb_flags(&mut self, other: &MessageSet) {
        self.is_current |= other.is_current;
        self.is_latest |= other.is_latest;

        if let (Some(ours), Some(theirs)) = (self.messages.first(), other.messages.first()) {
            if theirs.created_at < ours.created_at {
                self.pagination.has_prev = other.pagination.has_prev;
            }
        }
        if let (Some(ours), Some(theirs)) = (self.messages.last(), other.messages.last()) {
            if ours.created_at < theirs.created_at {
                self.pagination.has_next = other.pagination.has_next;
            }
        }
    }
}

/// Which window a batch lands in when it does not overlap an existing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WindowTarget {
    #[default]
    Current,
    Latest,
    /// Open a fresh window (used when jumping to an arbitrary point in history).
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOptions {
    /// The messages' sort key may differ from the stored copies.
    pub sort_key_changed: bool,
    /// The batch is (re)initialising channel state; stale threads are dropped
    /// instead of being extended.
    pub initializing: bool,
    /// `false` turns the insert into an update of messages already present.
    pub insert_if_absent: bool,
    pub target: WindowTarget,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            sort_key_changed: false,
            initializing: false,
            insert_if_absent: true,
            target: WindowTarget::Current,
        }
    }
}

impl InsertOptions {
    pub fn update_only() -> Self {
        Self {
            insert_if_absent: false,
            ..Default::default()
        }
    }

    pub fn into_window(target: WindowTarget) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }
}

//! Derives a window's "reaches the start / reaches the end" flags from the page
//! that was just merged into it.
//!
//! Three strategies, chosen by the request cursor:
//!   id_around          - bisect the page and see which half holds the anchor
//!   created_at_around  - compare the anchor's position in the page with the page midpoint
//!   linear             - a full page means there is more on the side that was queried
//!
//! A flag is only committed when the page's boundary message is still the
//! window's boundary message, so a slow stale response cannot clobber a flag
//! that a newer response already set.

use haven_types::api::MessagePaginationOptions;
use haven_types::models::{Message, Timestamp};

use crate::error::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationFlags {
    pub has_prev: bool,
    pub has_next: bool,
}

impl Default for PaginationFlags {
    fn default() -> Self {
        Self {
            has_prev: true,
            has_next: true,
        }
    }
}

/// Which kind of request produced the page. Exactly one applies per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStrategy {
    IdAround(String),
    CreatedAtAround(Timestamp),
    Linear { queried_prev: bool, queried_next: bool },
}

impl PageStrategy {
    pub fn from_options(options: Option<&MessagePaginationOptions>) -> Self {
        let Some(options) = options else {
            // a bare query returns the newest page, i.e. it walks backwards
            return Self::Linear {
                queried_prev: true,
                queried_next: false,
            };
        };
        if let Some(at) = options.created_at_around {
            return Self::CreatedAtAround(at);
        }
        if let Some(id) = &options.id_around {
            return Self::IdAround(id.clone());
        }
        let queried_next = options.queries_next();
        Self::Linear {
            queried_prev: options.queries_prev() || !queried_next,
            queried_next,
        }
    }
}

/// Input of [`derive_flags`].
#[derive(Debug, Clone, Copy)]
pub struct PageUpdate<'a> {
    /// Window contents after the page was merged into it.
    pub window: &'a [Message],
    pub flags: PaginationFlags,
    pub requested_page_size: usize,
    pub returned_page: &'a [Message],
    pub options: Option<&'a MessagePaginationOptions>,
}

impl PageUpdate<'_> {
    fn first_is_window_start(&self) -> bool {
        match (self.returned_page.first(), self.window.first()) {
            (Some(page), Some(window)) => page.id == window.id,
            _ => false,
        }
    }

    fn last_is_window_end(&self) -> bool {
        match (self.returned_page.last(), self.window.last()) {
            (Some(page), Some(window)) => page.id == window.id,
            _ => false,
        }
    }

    fn no_more_messages(&self) -> bool {
        let requested = self.requested_page_size;
        let window = self.window.len();
        let page = self.returned_page.len();
        (requested > window || window >= page) && requested > page
    }
}

/// New flags for the window, or [`StateError::CorruptedWindow`] when the page is
/// larger than the window it was merged into. Flags must be left as they are then.
pub fn derive_flags(update: &PageUpdate<'_>) -> Result<PaginationFlags, StateError> {
    // shadowed messages are in the page but never make it into the window
    let filtered_locally = update.returned_page.iter().filter(|m| m.shadowed).count();
    if update.window.len() + filtered_locally < update.returned_page.len() {
        return Err(StateError::CorruptedWindow {
            window_len: update.window.len(),
            page_len: update.returned_page.len(),
        });
    }

    let flags = match PageStrategy::from_options(update.options) {
        PageStrategy::CreatedAtAround(at) => created_at_around(update, at),
        PageStrategy::IdAround(id) => id_around(update, &id),
        PageStrategy::Linear {
            queried_prev,
            queried_next,
        } => linear(update, queried_prev, queried_next),
    };
    Ok(flags)
}

fn created_at_around(update: &PageUpdate<'_>, anchor: Timestamp) -> PaginationFlags {
    let mut flags = update.flags;
    let page = update.returned_page;

    let whole_page_newer = page.first().is_some_and(|m| m.created_at > anchor);
    let whole_page_older = page.last().is_some_and(|m| m.created_at < anchor);
    let page_size_not_met = update.requested_page_size > update.window.len()
        && update.requested_page_size > page.len();

    if whole_page_newer {
        flags.has_prev = false;
        if page_size_not_met {
            flags.has_next = false;
        }
    } else if whole_page_older {
        flags.has_next = false;
        if page_size_not_met {
            flags.has_prev = false;
        }
    } else if update.no_more_messages() {
        flags.has_prev = false;
        flags.has_next = false;
    } else {
        // Heuristic: if the anchor sits past the middle of the page we got
        // less context after it than before it, and vice versa.
        let mid_by_count = page.len() / 2;
        let mid_by_date = nearest_at_or_after(page, anchor);
        if update.first_is_window_start() {
            flags.has_prev = mid_by_count <= mid_by_date;
        }
        if update.last_is_window_end() {
            flags.has_next = mid_by_count >= mid_by_date;
        }
    }
    flags
}

fn id_around(update: &PageUpdate<'_>, anchor: &str) -> PaginationFlags {
    let mut flags = update.flags;
    let page = update.returned_page;

    if update.no_more_messages() {
        flags.has_prev = false;
        flags.has_next = false;
        return flags;
    }

    let midpoint = page.len() / 2;
    let Some(middle) = page.get(midpoint) else {
        return flags;
    };

    let (mut has_prev, mut has_next) = (true, true);
    if middle.id != anchor {
        let (before, after) = page.split_at(midpoint);
        if before.iter().any(|m| m.id == anchor) {
            has_prev = false;
        }
        if after.iter().any(|m| m.id == anchor) {
            has_next = false;
        }
    }

    if update.first_is_window_start() {
        flags.has_prev = has_prev;
    }
    if update.last_is_window_end() {
        flags.has_next = has_next;
    }
    flags
}

fn linear(update: &PageUpdate<'_>, queried_prev: bool, queried_next: bool) -> PaginationFlags {
    let mut flags = update.flags;
    let page_is_empty = update.returned_page.is_empty();
    let has_more = update.returned_page.len() >= update.requested_page_size;

    if queried_prev && (page_is_empty || update.first_is_window_start()) {
        flags.has_prev = has_more;
    }
    if queried_next && (page_is_empty || update.last_is_window_end()) {
        flags.has_next = has_more;
    }
    flags
}

/// Index of the first message created at or after `at`; `page.len()` if none.
fn nearest_at_or_after(page: &[Message], at: Timestamp) -> usize {
    page.partition_point(|m| m.created_at < at)
}

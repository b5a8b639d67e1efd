//! Channel-list ordering primitives.
//!
//! Lists are `Arc<Vec<Arc<C>>>`; every function that would leave the order
//! unchanged hands back the input `Arc` so publish-on-change stores can skip
//! the notification.

use std::sync::Arc;

use haven_types::api::{ChannelFilters, ChannelSort};
use haven_types::models::ChannelMember;

pub type ChannelList<C> = Arc<Vec<Arc<C>>>;

/// What the ordering functions need to know about a list entry.
pub trait ListedChannel {
    fn cid(&self) -> &str;
    /// The current user's membership record, if they are a member.
    fn membership(&self) -> Option<ChannelMember>;
}

pub fn is_channel_pinned<C: ListedChannel + ?Sized>(channel: &C) -> bool {
    channel.membership().is_some_and(|m| m.pinned_at.is_some())
}

pub fn is_channel_archived<C: ListedChannel + ?Sized>(channel: &C) -> bool {
    channel.membership().is_some_and(|m| m.archived_at.is_some())
}

/// True when the primary sort key is `pinned_at`, which freezes pinned
/// channels at the head of the list.
pub fn should_consider_pinned_channels(sort: &ChannelSort) -> bool {
    sort.direction_at(0, "pinned_at").is_some()
}

/// True when the active filters select on archive state.
pub fn should_consider_archived_channels(filters: &ChannelFilters) -> bool {
    filters.archived.is_some()
}

/// Whether the channel's archive state contradicts an active `archived` filter.
pub fn archive_filter_mismatch<C: ListedChannel + ?Sized>(channel: &C, filters: &ChannelFilters) -> bool {
    match filters.archived {
        Some(wanted) => is_channel_archived(channel) != wanted,
        None => false,
    }
}

/// Index of the last channel in the pinned prefix, `None` when the first
/// channel is not pinned.
pub fn find_last_pinned_channel_index<C: ListedChannel>(channels: &[Arc<C>]) -> Option<usize> {
    let prefix = channels.iter().take_while(|c| is_channel_pinned(c.as_ref())).count();
    prefix.checked_sub(1)
}

pub fn find_channel_index<C: ListedChannel>(channels: &[Arc<C>], cid: &str) -> Option<usize> {
    channels.iter().position(|c| c.cid() == cid)
}

/// Moves `channel` to the top of the list, or right behind the pinned prefix
/// when the sort is pin-aware. Channels not yet in the list are inserted.
///
/// Returns `channels` itself when the channel is already at the top, is
/// pinned under a pin-aware sort, or would land where it already is.
pub fn promote_channel<C: ListedChannel>(
    channels: &ChannelList<C>,
    channel: &Arc<C>,
    sort: &ChannelSort,
) -> ChannelList<C> {
    let current = find_channel_index(channels, channel.cid());
    let consider_pinned = should_consider_pinned_channels(sort);

    if current == Some(0) || (consider_pinned && is_channel_pinned(channel.as_ref())) {
        return Arc::clone(channels);
    }
    reseat_channel(channels, channel, consider_pinned)
}

/// Re-seats `channel` after its membership changed: right behind the pinned
/// prefix when `behind_pinned`, otherwise at the top. Channels not yet in the
/// list are inserted. Returns `channels` itself when the position does not change.
pub fn reseat_channel<C: ListedChannel>(
    channels: &ChannelList<C>,
    channel: &Arc<C>,
    behind_pinned: bool,
) -> ChannelList<C> {
    let current = find_channel_index(channels, channel.cid());

    let mut updated: Vec<Arc<C>> = channels.as_ref().clone();
    if let Some(index) = current {
        updated.remove(index);
    }
    let target = if behind_pinned {
        find_last_pinned_channel_index(&updated).map_or(0, |last| last + 1)
    } else {
        0
    };
    if current == Some(target) {
        return Arc::clone(channels);
    }

    updated.insert(target, Arc::clone(channel));
    Arc::new(updated)
}

/// Removes the channel with `cid`; the input comes back untouched when it is absent.
pub fn remove_channel<C: ListedChannel>(channels: &ChannelList<C>, cid: &str) -> ChannelList<C> {
    match find_channel_index(channels, cid) {
        Some(index) => {
            let mut updated: Vec<Arc<C>> = channels.as_ref().clone();
            updated.remove(index);
            Arc::new(updated)
        }
        None => Arc::clone(channels),
    }
}

/// Appends `page`, skipping channels whose `cid` is already listed.
pub fn append_unique<C: ListedChannel>(channels: &[Arc<C>], page: Vec<Arc<C>>) -> Vec<Arc<C>> {
    let mut merged = channels.to_vec();
    for channel in page {
        if find_channel_index(&merged, channel.cid()).is_none() {
            merged.push(channel);
        }
    }
    merged
}

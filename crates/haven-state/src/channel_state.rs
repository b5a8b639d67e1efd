//! Message-set engine: the local replica of one channel.
//!
//! History is held as one or more disjoint sorted windows ([`MessageSet`]).
//! A window is created when a query anchors outside every known window and
//! disappears when a later batch shows it overlaps another one. Thread replies
//! and pinned messages live in their own sorted lists, so the same message id
//! can sit in up to three places at once; updates are applied to every copy.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Duration;
use haven_types::api::MessagePaginationOptions;
use haven_types::events::{ChatEvent, EventType};
use haven_types::models::{ChannelMember, Message, MessageStatus, Reaction, ReadState, Timestamp, User};

use crate::error::StateError;
use crate::logging::{StateEvent, StateLog, StateLogger};
use crate::message_list::{SortBy, add_to_message_list, remove_from_message_list};
use crate::message_set::{InsertOptions, MessageSet, WindowTarget};
use crate::pagination::{PageUpdate, PaginationFlags, derive_flags};

/// Typing indicators older than this are dropped by [`ChannelState::clean`].
pub const DEFAULT_TYPING_TIMEOUT_SECS: i64 = 7;

const COMPONENT: &str = "channel_state";

pub struct ChannelState {
    cid: String,
    own_user_id: Option<String>,
    logger: Arc<dyn StateLogger>,
    typing_timeout: Duration,

    message_sets: Vec<MessageSet>,
    threads: HashMap<String, Vec<Message>>,
    pinned_messages: Vec<Message>,

    read: HashMap<String, ReadState>,
    unread_count: u32,
    typing: HashMap<String, ChatEvent>,
    members: HashMap<String, ChannelMember>,
    membership: Option<ChannelMember>,
    watcher_count: u32,
    last_message_at: Option<Timestamp>,
    is_up_to_date: bool,
}

impl ChannelState {
    pub fn new(cid: impl Into<String>, own_user_id: Option<String>, logger: Arc<dyn StateLogger>) -> Self {
        Self {
            cid: cid.into(),
            own_user_id,
            logger,
            typing_timeout: Duration::seconds(DEFAULT_TYPING_TIMEOUT_SECS),
            message_sets: vec![MessageSet::new(true, true)],
            threads: HashMap::new(),
            pinned_messages: Vec::new(),
            read: HashMap::new(),
            unread_count: 0,
            typing: HashMap::new(),
            members: HashMap::new(),
            membership: None,
            watcher_count: 0,
            last_message_at: None,
            is_up_to_date: false,
        }
    }

    pub fn set_typing_timeout(&mut self, timeout: Duration) {
        self.typing_timeout = timeout;
    }

    pub fn cid(&self) -> &str {
        &self.cid
    }

    /// Resets history to a single empty window that is both current and latest.
    pub fn initialize(&mut self) {
        self.message_sets = vec![MessageSet::new(true, true)];
    }

    /// Drops all history, including the pinned list.
    pub fn clear_messages(&mut self) {
        self.initialize();
        self.pinned_messages.clear();
    }

    // -- Windows --

    pub fn message_sets(&self) -> &[MessageSet] {
        &self.message_sets
    }

    pub fn current_window_index(&self) -> Option<usize> {
        self.message_sets.iter().position(|s| s.is_current)
    }

    pub fn latest_window_index(&self) -> Option<usize> {
        self.message_sets.iter().position(|s| s.is_latest)
    }

    /// Messages of the current window.
    pub fn messages(&self) -> &[Message] {
        self.current_window_index()
            .map(|i| self.message_sets[i].messages.as_slice())
            .unwrap_or_default()
    }

    /// Messages of the window adjacent to live traffic.
    pub fn latest_messages(&self) -> &[Message] {
        self.latest_window_index()
            .map(|i| self.message_sets[i].messages.as_slice())
            .unwrap_or_default()
    }

    /// Pagination flags of the current window.
    pub fn pagination(&self) -> PaginationFlags {
        self.current_window_index()
            .map(|i| self.message_sets[i].pagination)
            .unwrap_or_default()
    }

    pub fn find_window_index(&self, message_id: &str) -> Option<usize> {
        self.message_sets.iter().position(|s| s.contains(message_id))
    }

    pub fn find_message(&self, message_id: &str, parent_id: Option<&str>) -> Option<&Message> {
        if let Some(parent_id) = parent_id {
            return self
                .threads
                .get(parent_id)?
                .iter()
                .find(|m| m.id == message_id);
        }
        let index = self.find_window_index(message_id)?;
        self.message_sets[index].messages.iter().find(|m| m.id == message_id)
    }

    pub fn switch_current_window(&mut self, index: usize) -> Result<(), StateError> {
        if index >= self.message_sets.len() {
            return Err(StateError::WindowOutOfRange {
                index,
                count: self.message_sets.len(),
            });
        }
        let previous = self.current_window_index();
        if previous == Some(index) {
            return Ok(());
        }
        if let Some(previous) = previous {
            self.message_sets[previous].is_current = false;
        }
        self.message_sets[index].is_current = true;
        self.log(StateEvent::WindowSwitched {
            from: previous,
            to: index,
        });
        Ok(())
    }

    // -- Insertion --

    /// Routes a batch into its window (merging windows it proves to overlap) and
    /// into thread lists. Returns the index of the window that received it, if any.
    pub fn insert_messages(&mut self, batch: Vec<Message>, options: InsertOptions) -> Option<usize> {
        let (target, merged) = self.find_target_window(&batch, &options);

        // merged-away windows go in first so the batch copy of a shared id wins
        if let Some(index) = target {
            let window = &mut self.message_sets[index];
            for message in merged {
                window.messages = add_to_message_list(&window.messages, message, false, SortBy::CreatedAt, true);
            }
        }

        for message in batch {
            if message.shadowed {
                continue;
            }

            if options.initializing && self.threads.remove(&message.id).is_some() {
                tracing::debug!(cid = %self.cid, parent_id = %message.id, "dropped stale thread");
            }

            let thread_reply = message.is_thread_reply();
            if !thread_reply {
                let newer = self.last_message_at.is_none_or(|at| message.created_at > at);
                if newer {
                    self.last_message_at = Some(message.created_at);
                }
            }

            if let (false, Some(index)) = (thread_reply, target) {
                let window = &mut self.message_sets[index];
                let moved = options.sort_key_changed || holds_under_other_key(&window.messages, &message);
                window.messages = add_to_message_list(
                    &window.messages,
                    message.clone(),
                    moved,
                    SortBy::CreatedAt,
                    options.insert_if_absent,
                );
            }

            if options.initializing {
                continue;
            }
            if let Some(parent_id) = message.parent_id.clone() {
                let thread = self.threads.entry(parent_id).or_default();
                let moved = options.sort_key_changed || holds_under_other_key(thread, &message);
                *thread = add_to_message_list(
                    thread,
                    message,
                    moved,
                    SortBy::CreatedAt,
                    options.insert_if_absent,
                );
            }
        }

        target
    }

    /// Single-message form of [`insert_messages`](Self::insert_messages).
    pub fn add_message_sorted(
        &mut self,
        message: Message,
        sort_key_changed: bool,
        insert_if_absent: bool,
        target: WindowTarget,
    ) -> Option<usize> {
        self.insert_messages(
            vec![message],
            InsertOptions {
                sort_key_changed,
                initializing: false,
                insert_if_absent,
                target,
            },
        )
    }

    /// Picks the window for `batch`, merging every window the batch overlaps.
    /// Returns the target index and the messages of windows merged away, which
    /// still have to be inserted into the target.
    fn find_target_window(&mut self, batch: &[Message], options: &InsertOptions) -> (Option<usize>, Vec<Message>) {
        if !options.insert_if_absent {
            // updates belong wherever the first message already lives
            let target = batch.first().and_then(|m| self.find_window_index(&m.id));
            return (target, Vec::new());
        }

        let ids: HashSet<&str> = batch.iter().map(|m| m.id.as_str()).collect();
        let overlapping: Vec<usize> = self
            .message_sets
            .iter()
            .enumerate()
            .filter(|(_, set)| set.messages.iter().any(|m| ids.contains(m.id.as_str())))
            .map(|(i, _)| i)
            .collect();

        let target = match options.target {
            WindowTarget::New => {
                if let Some(&first) = overlapping.first() {
                    Some(first)
                } else if batch.iter().any(|m| !m.is_thread_reply()) {
                    self.message_sets.push(MessageSet::new(false, false));
                    let index = self.message_sets.len() - 1;
                    self.log(StateEvent::WindowCreated { index });
                    Some(index)
                } else {
                    None
                }
            }
            WindowTarget::Current => self.current_window_index(),
            WindowTarget::Latest => self.latest_window_index(),
        };

        // the first overlapping window absorbs the target and every other window the batch touches
        let Some((&merge_target, rest)) = overlapping.split_first() else {
            return (target, Vec::new());
        };
        let mut sources = rest.to_vec();
        if let Some(target) = target.filter(|&t| t != merge_target && !sources.contains(&t)) {
            sources.push(target);
        }
        if sources.is_empty() {
            return (target, Vec::new());
        }

        let mut merged = Vec::new();
        for &source in &sources {
            let source_set = self.message_sets[source].clone();
            self.message_sets[merge_target].absorb_flags(&source_set);
            merged.extend(source_set.messages);
        }

        sources.sort_unstable_by(|a, b| b.cmp(a));
        for &source in &sources {
            self.message_sets.remove(source);
        }

        let target = self.message_sets.iter().position(|set| set.overlaps(batch));
        self.log(StateEvent::WindowsMerged {
            target: target.unwrap_or(merge_target),
            merged: sources.len(),
        });
        (target, merged)
    }

    /// Re-derives the pagination flags of `window_index` from the page just
    /// merged into it. A corrupted window keeps its flags and is reported.
    pub fn apply_page_pagination(
        &mut self,
        window_index: usize,
        returned_page: &[Message],
        requested_page_size: usize,
        options: Option<&MessagePaginationOptions>,
    ) -> Result<PaginationFlags, StateError> {
        let count = self.message_sets.len();
        let window = self
            .message_sets
            .get(window_index)
            .ok_or(StateError::WindowOutOfRange {
                index: window_index,
                count,
            })?;

        let update = PageUpdate {
            window: &window.messages,
            flags: window.pagination,
            requested_page_size,
            returned_page,
            options,
        };
        match derive_flags(&update) {
            Ok(flags) => {
                self.message_sets[window_index].pagination = flags;
                Ok(flags)
            }
            Err(StateError::CorruptedWindow { window_len, page_len }) => {
                self.log(StateEvent::CorruptedWindow { window_len, page_len });
                Err(StateError::CorruptedWindow { window_len, page_len })
            }
            Err(err) => Err(err),
        }
    }

    // -- Removal --

    /// Removes a message from its thread (when `parent_id` names a known thread)
    /// or from the window that holds it.
    pub fn remove_message(&mut self, id: &str, parent_id: Option<&str>) -> bool {
        if let Some(thread) = parent_id.and_then(|p| self.threads.get_mut(p)) {
            let (removed, remaining) = remove_from_message_list(thread, id);
            *thread = remaining;
            return removed;
        }
        let Some(index) = self.find_window_index(id) else {
            return false;
        };
        let window = &mut self.message_sets[index];
        let (removed, remaining) = remove_from_message_list(&window.messages, id);
        window.messages = remaining;
        removed
    }

    /// Drops window and pinned messages created before `before`.
    pub fn truncate(&mut self, before: Timestamp) {
        for window in &mut self.message_sets {
            window.messages.retain(|m| m.created_at >= before);
        }
        self.pinned_messages.retain(|m| m.created_at >= before);
    }

    /// Drops messages that failed to send from the latest window.
    pub fn filter_error_messages(&mut self) {
        if let Some(index) = self.latest_window_index() {
            self.message_sets[index]
                .messages
                .retain(|m| m.status != MessageStatus::Failed);
        }
    }

    // -- Threads & pins --

    pub fn thread(&self, parent_id: &str) -> &[Message] {
        self.threads.get(parent_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn threads(&self) -> &HashMap<String, Vec<Message>> {
        &self.threads
    }

    pub fn pinned_messages(&self) -> &[Message] {
        &self.pinned_messages
    }

    pub fn add_pinned(&mut self, message: Message) {
        self.pinned_messages = add_to_message_list(&self.pinned_messages, message, false, SortBy::PinnedAt, true);
    }

    pub fn remove_pinned(&mut self, id: &str) -> bool {
        let (removed, remaining) = remove_from_message_list(&self.pinned_messages, id);
        self.pinned_messages = remaining;
        removed
    }

    // -- Updates across every copy --

    /// Applies `update` to every stored copy of `message`: the thread of its
    /// parent, any window holding it, and the pinned list. Returns how many
    /// copies were touched.
    pub fn update_message(&mut self, message: &Message, mut update: impl FnMut(&Message) -> Message) -> usize {
        let mut touched = 0;

        if let Some(thread) = message.parent_id.as_ref().and_then(|p| self.threads.get_mut(p)) {
            if let Some(slot) = thread.iter_mut().find(|m| m.id == message.id) {
                *slot = update(slot);
                touched += 1;
            }
        }

        for window in &mut self.message_sets {
            if let Some(slot) = window.messages.iter_mut().find(|m| m.id == message.id) {
                *slot = update(slot);
                touched += 1;
            }
        }

        if let Some(slot) = self.pinned_messages.iter_mut().find(|m| m.id == message.id) {
            *slot = update(slot);
            touched += 1;
        }

        touched
    }

    /// Takes the server's copy of `message` and records `reaction` in the
    /// stored copies' `own_reactions` when it belongs to the current user.
    /// With `enforce_unique` every earlier own reaction is replaced.
    pub fn add_reaction(&mut self, reaction: &Reaction, message: &Message, enforce_unique: bool) -> Option<Message> {
        let own_user = self.own_user_id.clone();
        let mut result = None;
        self.update_message(message, |stored| {
            let mut own: Vec<Reaction> = if enforce_unique {
                Vec::new()
            } else {
                without_reaction(&stored.own_reactions, reaction)
            };
            if own_user.as_deref() == Some(reaction.user_id.as_str()) {
                own.push(reaction.clone());
            }
            let updated = Message {
                own_reactions: own,
                ..message.clone()
            };
            result.get_or_insert_with(|| updated.clone());
            updated
        });
        result
    }

    pub fn remove_reaction(&mut self, reaction: &Reaction, message: &Message) -> Option<Message> {
        let mut result = None;
        self.update_message(message, |stored| {
            let updated = Message {
                own_reactions: without_reaction(&stored.own_reactions, reaction),
                ..message.clone()
            };
            result.get_or_insert_with(|| updated.clone());
            updated
        });
        result
    }

    // -- Read state --

    pub fn read(&self) -> &HashMap<String, ReadState> {
        &self.read
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn set_unread_count(&mut self, count: u32) {
        self.unread_count = count;
    }

    pub fn increment_unread(&mut self) {
        self.unread_count = self.unread_count.saturating_add(1);
    }

    pub fn set_read(&mut self, state: ReadState) {
        if self.is_own_user(&state.user_id) {
            self.unread_count = state.unread_messages;
        }
        self.read.insert(state.user_id.clone(), state);
    }

    /// A new message from `sender`: the sender has read up to it, every other
    /// tracked reader has one more unread message.
    pub fn record_new_message(&mut self, sender: &str, at: Timestamp, message_id: &str) {
        for (user_id, read) in self.read.iter_mut() {
            if user_id == sender {
                read.last_read = at;
                read.last_read_message_id = Some(message_id.to_string());
                read.unread_messages = 0;
            } else {
                read.unread_messages = read.unread_messages.saturating_add(1);
            }
        }
    }

    // -- Typing --

    pub fn typing(&self) -> &HashMap<String, ChatEvent> {
        &self.typing
    }

    pub fn start_typing(&mut self, user_id: &str, event: ChatEvent) {
        self.typing.insert(user_id.to_string(), event);
    }

    pub fn stop_typing(&mut self, user_id: &str) -> bool {
        self.typing.remove(user_id).is_some()
    }

    /// Drops typing indicators idle for longer than the typing timeout and
    /// returns a synthetic `typing.stop` event for each of them.
    pub fn clean(&mut self, now: Timestamp) -> Vec<ChatEvent> {
        let expired: Vec<String> = self
            .typing
            .iter()
            .filter(|(_, event)| {
                let received_at = event.received_at.unwrap_or(now);
                now - received_at > self.typing_timeout
            })
            .map(|(user_id, _)| user_id.clone())
            .collect();

        let mut stops = Vec::with_capacity(expired.len());
        for user_id in expired {
            self.typing.remove(&user_id);
            self.log(StateEvent::TypingExpired {
                user_id: user_id.clone(),
            });
            let mut stop = ChatEvent::new(EventType::TypingStop);
            stop.cid = Some(self.cid.clone());
            if let Some((channel_type, channel_id)) = self.cid.split_once(':') {
                stop.channel_type = Some(channel_type.to_string());
                stop.channel_id = Some(channel_id.to_string());
            }
            stop.user = Some(User::new(user_id));
            stop.received_at = Some(now);
            stops.push(stop);
        }
        stops
    }

    // -- Members --

    pub fn members(&self) -> &HashMap<String, ChannelMember> {
        &self.members
    }

    pub fn membership(&self) -> Option<&ChannelMember> {
        self.membership.as_ref()
    }

    pub fn set_membership(&mut self, membership: Option<ChannelMember>) {
        self.membership = membership;
    }

    /// Stores a member record; the current user's record also becomes the membership.
    pub fn set_member(&mut self, member: ChannelMember) {
        if self.is_own_user(&member.user_id) {
            self.membership = Some(member.clone());
        }
        self.members.insert(member.user_id.clone(), member);
    }

    pub fn watcher_count(&self) -> u32 {
        self.watcher_count
    }

    pub fn set_watcher_count(&mut self, count: u32) {
        self.watcher_count = count;
    }

    // -- Misc --

    pub fn last_message_at(&self) -> Option<Timestamp> {
        self.last_message_at
    }

    pub fn is_up_to_date(&self) -> bool {
        self.is_up_to_date
    }

    pub fn set_is_up_to_date(&mut self, up_to_date: bool) {
        self.is_up_to_date = up_to_date;
    }

    pub fn own_user_id(&self) -> Option<&str> {
        self.own_user_id.as_deref()
    }

    pub fn is_own_user(&self, user_id: &str) -> bool {
        self.own_user_id.as_deref() == Some(user_id)
    }

    fn log(&self, event: StateEvent) {
        self.logger.log(StateLog::new(COMPONENT, Some(&self.cid), event));
    }
}

/// Whether `list` already holds `message` under a different `created_at`.
fn holds_under_other_key(list: &[Message], message: &Message) -> bool {
    list.iter()
        .any(|m| m.id == message.id && m.created_at != message.created_at)
}

fn without_reaction(own: &[Reaction], reaction: &Reaction) -> Vec<Reaction> {
    own.iter()
        .filter(|r| r.user_id != reaction.user_id || r.kind != reaction.kind)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{MemoryLogger, NullLogger};
    use chrono::{TimeZone, Utc};

    fn at(seconds: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn msg(id: &str, seconds: i64) -> Message {
        Message::new(id, at(seconds))
    }

    fn reply(id: &str, parent: &str, seconds: i64) -> Message {
        let mut m = msg(id, seconds);
        m.parent_id = Some(parent.to_string());
        m
    }

    fn state() -> ChannelState {
        ChannelState::new("messaging:general", Some("me".to_string()), Arc::new(NullLogger))
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    fn range(from: i64, to: i64) -> Vec<Message> {
        (from..=to).map(|i| msg(&i.to_string(), i)).collect()
    }

    fn assert_disjoint(state: &ChannelState) {
        let mut seen = HashSet::new();
        for set in state.message_sets() {
            for m in &set.messages {
                assert!(seen.insert(m.id.clone()), "message {} present in two windows", m.id);
            }
        }
    }

    #[test]
    fn starts_with_one_current_latest_window() {
        let state = state();
        assert_eq!(state.message_sets().len(), 1);
        assert!(state.message_sets()[0].is_current);
        assert!(state.message_sets()[0].is_latest);
        assert!(state.messages().is_empty());
    }

    #[test]
    fn insert_and_sort_key_change_scenarios() {
        let mut state = state();
        state.insert_messages(vec![msg("1", 1), msg("2", 3)], InsertOptions::default());
        state.add_message_sorted(msg("3", 2), false, true, WindowTarget::Current);
        assert_eq!(ids(state.messages()), vec!["1", "3", "2"]);

        state.add_message_sorted(msg("1", 4), true, true, WindowTarget::Current);
        assert_eq!(ids(state.messages()), vec!["3", "2", "1"]);
    }

    #[test]
    fn inserting_same_message_twice_is_idempotent() {
        let mut state = state();
        state.insert_messages(range(1, 5), InsertOptions::default());
        let before = state.messages().to_vec();
        state.insert_messages(vec![msg("3", 3)], InsertOptions::default());
        assert_eq!(state.messages(), before.as_slice());
    }

    #[test]
    fn update_only_skips_unknown_messages() {
        let mut state = state();
        state.insert_messages(range(1, 3), InsertOptions::default());
        let target = state.insert_messages(vec![msg("99", 2)], InsertOptions::update_only());
        assert_eq!(target, None);
        assert_eq!(ids(state.messages()), vec!["1", "2", "3"]);
    }

    #[test]
    fn new_target_opens_window_and_reuses_overlap() {
        let mut state = state();
        state.insert_messages(range(50, 60), InsertOptions::into_window(WindowTarget::Latest));

        let index = state.insert_messages(range(1, 5), InsertOptions::into_window(WindowTarget::New));
        assert_eq!(index, Some(1));
        assert_eq!(state.message_sets().len(), 2);
        assert!(!state.message_sets()[1].is_current);
        assert!(!state.message_sets()[1].is_latest);

        // an overlapping batch extends the existing window instead of opening a third
        let index = state.insert_messages(range(4, 8), InsertOptions::into_window(WindowTarget::New));
        assert_eq!(index, Some(1));
        assert_eq!(state.message_sets().len(), 2);
        assert_eq!(state.message_sets()[1].messages.len(), 8);
        assert_disjoint(&state);
    }

    #[test]
    fn thread_only_batch_never_opens_window() {
        let mut state = state();
        let index = state.insert_messages(
            vec![reply("r1", "p", 1), reply("r2", "p", 2)],
            InsertOptions::into_window(WindowTarget::New),
        );
        assert_eq!(index, None);
        assert_eq!(state.message_sets().len(), 1);
        assert_eq!(ids(state.thread("p")), vec!["r1", "r2"]);
        assert!(state.messages().is_empty());
    }

    #[test]
    fn overlapping_windows_merge_with_furthest_flags() {
        let logger = Arc::new(MemoryLogger::new());
        let mut state = ChannelState::new("messaging:general", None, logger.clone());
        state.message_sets = vec![
            MessageSet {
                messages: range(1, 5),
                is_current: true,
                is_latest: false,
                pagination: PaginationFlags { has_prev: false, has_next: true },
            },
            MessageSet {
                messages: range(5, 9),
                is_current: false,
                is_latest: true,
                pagination: PaginationFlags { has_prev: true, has_next: false },
            },
        ];

        let batch = vec![msg("4", 4), msg("6", 6)];
        let index = state.insert_messages(batch, InsertOptions::into_window(WindowTarget::New));

        assert_eq!(index, Some(0));
        assert_eq!(state.message_sets().len(), 1);
        let merged = &state.message_sets()[0];
        assert_eq!(ids(&merged.messages), vec!["1", "2", "3", "4", "5", "6", "7", "8", "9"]);
        assert!(merged.is_current && merged.is_latest);
        assert_eq!(merged.pagination, PaginationFlags { has_prev: false, has_next: false });
        assert!(
            logger
                .entries()
                .iter()
                .any(|e| matches!(e.event, StateEvent::WindowsMerged { merged: 1, .. }))
        );
    }

    #[test]
    fn flagged_target_merges_with_overlapping_window() {
        let mut state = state();
        // jumped back in history: window 1 is current, window 0 is latest but empty
        state.insert_messages(range(1, 5), InsertOptions::into_window(WindowTarget::New));
        state.switch_current_window(1).unwrap();

        let index = state.insert_messages(range(4, 10), InsertOptions::into_window(WindowTarget::Latest));
        assert_eq!(index, Some(0));
        assert_eq!(state.message_sets().len(), 1);
        let window = &state.message_sets()[0];
        assert!(window.is_current && window.is_latest);
        assert_eq!(window.messages.len(), 10);
    }

    #[test]
    fn latest_page_bridging_two_windows_merges_them() {
        let mut state = state();
        // jumped back in history: window 1 is current, window 0 holds the live tail
        state.insert_messages(range(8, 10), InsertOptions::into_window(WindowTarget::Latest));
        state.insert_messages(range(1, 5), InsertOptions::into_window(WindowTarget::New));
        state.switch_current_window(1).unwrap();

        state.insert_messages(range(4, 9), InsertOptions::into_window(WindowTarget::Latest));
        assert_eq!(state.message_sets().len(), 1);
        let window = &state.message_sets()[0];
        assert!(window.is_current && window.is_latest);
        assert_eq!(window.messages.len(), 10);
    }

    #[test]
    fn disjointness_holds_across_mixed_batches() {
        let mut state = state();
        let batches: Vec<(i64, i64, WindowTarget)> = vec![
            (90, 100, WindowTarget::Latest),
            (10, 20, WindowTarget::New),
            (40, 45, WindowTarget::New),
            (18, 42, WindowTarget::New),
            (60, 70, WindowTarget::New),
            (69, 91, WindowTarget::Current),
        ];
        for (from, to, target) in batches {
            state.insert_messages(range(from, to), InsertOptions::into_window(target));
            assert_disjoint(&state);
            assert!(state.message_sets().iter().filter(|s| s.is_current).count() <= 1);
            assert!(state.message_sets().iter().filter(|s| s.is_latest).count() <= 1);
            for set in state.message_sets() {
                assert!(set.messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
            }
        }
    }

    #[test]
    fn merge_keeps_batch_copy_of_shared_id() {
        let mut state = state();
        state.message_sets = vec![
            MessageSet {
                messages: range(1, 5),
                is_current: true,
                is_latest: false,
                pagination: PaginationFlags::default(),
            },
            MessageSet {
                messages: range(5, 9),
                is_current: false,
                is_latest: true,
                pagination: PaginationFlags::default(),
            },
        ];

        let mut edited = msg("6", 6);
        edited.text = "edited".into();
        state.insert_messages(vec![msg("4", 4), edited], InsertOptions::into_window(WindowTarget::New));

        assert_eq!(state.message_sets().len(), 1);
        assert_eq!(state.find_message("6", None).unwrap().text, "edited");
        assert_eq!(state.messages().len(), 9);
    }

    #[test]
    fn retimed_copy_replaces_local_one() {
        let mut state = state();
        state.insert_messages(vec![msg("a", 1), msg("b", 3)], InsertOptions::into_window(WindowTarget::Latest));
        // local copy stamped with the device clock
        state.add_message_sorted(msg("opt", 10), false, true, WindowTarget::Latest);

        state.insert_messages(
            vec![msg("a", 1), msg("opt", 2), msg("b", 3)],
            InsertOptions {
                initializing: true,
                target: WindowTarget::Latest,
                ..Default::default()
            },
        );

        assert_eq!(ids(state.messages()), vec!["a", "opt", "b"]);
        assert_eq!(state.find_message("opt", None).unwrap().created_at, at(2));
    }

    #[test]
    fn disjointness_holds_with_edited_and_retimed_copies() {
        // (from, to, target, text, clock skew in ms)
        let batches: Vec<(i64, i64, WindowTarget, &str, i64)> = vec![
            (90, 100, WindowTarget::Latest, "v1", 0),
            (10, 20, WindowTarget::New, "v1", 0),
            (40, 45, WindowTarget::New, "v1", 300),
            (18, 42, WindowTarget::New, "v2", 0),
            (60, 70, WindowTarget::New, "v1", 0),
            (69, 91, WindowTarget::Current, "v2", 500),
            (95, 100, WindowTarget::Latest, "v3", 200),
        ];

        let mut state = state();
        let mut expected: HashMap<String, String> = HashMap::new();
        for (from, to, target, text, skew) in batches {
            let batch: Vec<Message> = (from..=to)
                .map(|i| {
                    let mut m = Message::new(i.to_string(), at(i) + Duration::milliseconds(skew));
                    m.text = text.to_string();
                    m
                })
                .collect();
            for m in &batch {
                expected.insert(m.id.clone(), m.text.clone());
            }
            state.insert_messages(batch, InsertOptions::into_window(target));

            assert_disjoint(&state);
            for set in state.message_sets() {
                assert!(set.messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
                for m in &set.messages {
                    assert_eq!(Some(&m.text), expected.get(&m.id), "stale copy of {}", m.id);
                }
            }
        }
    }

    #[test]
    fn shadowed_messages_are_skipped() {
        let mut state = state();
        let mut hidden = msg("2", 2);
        hidden.shadowed = true;
        state.insert_messages(vec![msg("1", 1), hidden], InsertOptions::default());
        assert_eq!(ids(state.messages()), vec!["1"]);
    }

    #[test]
    fn replies_go_to_threads_and_visible_replies_to_both() {
        let mut state = state();
        let mut visible = reply("r2", "p", 3);
        visible.show_in_channel = true;
        state.insert_messages(vec![msg("p", 1), reply("r1", "p", 2), visible], InsertOptions::default());
        assert_eq!(ids(state.messages()), vec!["p", "r2"]);
        assert_eq!(ids(state.thread("p")), vec!["r1", "r2"]);
        assert_eq!(state.last_message_at(), Some(at(3)));
    }

    #[test]
    fn initializing_drops_stale_threads() {
        let mut state = state();
        state.insert_messages(vec![msg("p", 1), reply("r1", "p", 2)], InsertOptions::default());
        assert_eq!(state.thread("p").len(), 1);

        state.initialize();
        state.insert_messages(
            vec![msg("p", 1), reply("r9", "p", 5)],
            InsertOptions {
                initializing: true,
                target: WindowTarget::Latest,
                ..Default::default()
            },
        );
        assert!(state.thread("p").is_empty());
        assert!(!state.threads().contains_key("p"));
    }

    #[test]
    fn remove_from_thread_or_window() {
        let mut state = state();
        state.insert_messages(vec![msg("p", 1), reply("r1", "p", 2), msg("2", 3)], InsertOptions::default());
        assert!(state.remove_message("r1", Some("p")));
        assert!(state.thread("p").is_empty());
        assert!(state.remove_message("2", None));
        assert!(!state.remove_message("2", None));
        assert_eq!(ids(state.messages()), vec!["p"]);
    }

    #[test]
    fn reactions_reach_every_copy() {
        let mut state = state();
        let mut pinned_reply = reply("r1", "p", 2);
        pinned_reply.show_in_channel = true;
        pinned_reply.pinned = true;
        pinned_reply.pinned_at = Some(at(10));
        state.insert_messages(vec![msg("p", 1), pinned_reply.clone()], InsertOptions::default());
        state.add_pinned(pinned_reply.clone());

        let reaction = Reaction {
            kind: "like".into(),
            user_id: "me".into(),
            message_id: "r1".into(),
            score: 1,
            created_at: None,
        };
        let mut server_copy = pinned_reply.clone();
        server_copy.reaction_counts.insert("like".into(), 1);

        let updated = state.add_reaction(&reaction, &server_copy, false).unwrap();
        assert_eq!(updated.own_reactions.len(), 1);

        let window_copy = state.find_message("r1", None).unwrap();
        let thread_copy = state.find_message("r1", Some("p")).unwrap();
        let pinned_copy = &state.pinned_messages()[0];
        for copy in [window_copy, thread_copy, pinned_copy] {
            assert_eq!(copy.own_reactions, vec![reaction.clone()]);
            assert_eq!(copy.reaction_counts.get("like"), Some(&1));
        }

        state.remove_reaction(&reaction, &server_copy);
        assert!(state.find_message("r1", None).unwrap().own_reactions.is_empty());
        assert!(state.find_message("r1", Some("p")).unwrap().own_reactions.is_empty());
        assert!(state.pinned_messages()[0].own_reactions.is_empty());
    }

    #[test]
    fn enforce_unique_replaces_own_reactions() {
        let mut state = state();
        state.insert_messages(vec![msg("1", 1)], InsertOptions::default());
        let reaction = |kind: &str| Reaction {
            kind: kind.into(),
            user_id: "me".into(),
            message_id: "1".into(),
            score: 1,
            created_at: None,
        };
        let message = msg("1", 1);
        state.add_reaction(&reaction("like"), &message, false);
        state.add_reaction(&reaction("love"), &message, false);
        assert_eq!(state.messages()[0].own_reactions.len(), 2);
        state.add_reaction(&reaction("wow"), &message, true);
        assert_eq!(state.messages()[0].own_reactions, vec![reaction("wow")]);

        // someone else's reaction never lands in own_reactions
        let foreign = Reaction {
            user_id: "other".into(),
            ..reaction("like")
        };
        state.add_reaction(&foreign, &message, false);
        assert_eq!(state.messages()[0].own_reactions, vec![reaction("wow")]);
    }

    #[test]
    fn reaction_on_unknown_message_is_noop() {
        let mut state = state();
        let reaction = Reaction {
            kind: "like".into(),
            user_id: "me".into(),
            message_id: "x".into(),
            score: 1,
            created_at: None,
        };
        assert!(state.add_reaction(&reaction, &msg("x", 1), false).is_none());
    }

    #[test]
    fn pinned_list_add_remove() {
        let mut state = state();
        let mut a = msg("a", 1);
        a.pinned_at = Some(at(20));
        let mut b = msg("b", 2);
        b.pinned_at = Some(at(10));
        state.add_pinned(a);
        state.add_pinned(b);
        assert_eq!(ids(state.pinned_messages()), vec!["b", "a"]);
        assert!(state.remove_pinned("b"));
        assert!(!state.remove_pinned("b"));
        assert_eq!(ids(state.pinned_messages()), vec!["a"]);
    }

    #[test]
    fn switch_current_window_moves_flag() {
        let mut state = state();
        state.insert_messages(range(1, 3), InsertOptions::into_window(WindowTarget::New));
        state.switch_current_window(1).unwrap();
        assert!(!state.message_sets()[0].is_current);
        assert!(state.message_sets()[1].is_current);
        assert_eq!(ids(state.messages()), vec!["1", "2", "3"]);
        assert!(matches!(
            state.switch_current_window(5),
            Err(StateError::WindowOutOfRange { index: 5, count: 2 })
        ));
    }

    #[test]
    fn corrupted_window_keeps_flags_and_logs() {
        let logger = Arc::new(MemoryLogger::new());
        let mut state = ChannelState::new("messaging:general", None, logger.clone());
        state.insert_messages(range(1, 2), InsertOptions::default());
        let page = range(1, 5);
        let result = state.apply_page_pagination(0, &page, 10, None);
        assert!(matches!(result, Err(StateError::CorruptedWindow { .. })));
        assert_eq!(state.pagination(), PaginationFlags::default());
        assert!(
            logger
                .entries()
                .iter()
                .any(|e| matches!(e.event, StateEvent::CorruptedWindow { window_len: 2, page_len: 5 }))
        );
    }

    #[test]
    fn clean_expires_idle_typing() {
        let mut state = state();
        let mut stale = ChatEvent::new(EventType::TypingStart);
        stale.received_at = Some(at(0));
        let mut fresh = ChatEvent::new(EventType::TypingStart);
        fresh.received_at = Some(at(5));
        state.start_typing("alice", stale);
        state.start_typing("bob", fresh);

        let stops = state.clean(at(8));
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].kind, EventType::TypingStop);
        assert_eq!(stops[0].user_id(), Some("alice"));
        assert_eq!(stops[0].cid.as_deref(), Some("messaging:general"));
        assert!(state.typing().contains_key("bob"));
        assert!(!state.typing().contains_key("alice"));
    }

    #[test]
    fn truncate_drops_older_messages_and_pins() {
        let mut state = state();
        state.insert_messages(range(1, 6), InsertOptions::default());
        let mut pinned = msg("2", 2);
        pinned.pinned_at = Some(at(3));
        state.add_pinned(pinned);
        state.truncate(at(4));
        assert_eq!(ids(state.messages()), vec!["4", "5", "6"]);
        assert!(state.pinned_messages().is_empty());
    }

    #[test]
    fn own_member_record_becomes_membership() {
        let mut state = state();
        state.set_member(ChannelMember::new("other"));
        assert!(state.membership().is_none());
        let mut me = ChannelMember::new("me");
        me.pinned_at = Some(at(1));
        state.set_member(me.clone());
        assert_eq!(state.membership(), Some(&me));
        assert_eq!(state.members().len(), 2);
    }
}

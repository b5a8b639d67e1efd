use haven_types::models::{Message, Timestamp};

use crate::sorted::{Direction, locate_with_identity};

/// Sort key of a message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    CreatedAt,
    /// Pinned list order. Messages without `pinned_at` fall back to `created_at`.
    PinnedAt,
}

impl SortBy {
    pub fn key(&self, message: &Message) -> Timestamp {
        match self {
            Self::CreatedAt => message.created_at,
            Self::PinnedAt => message.pinned_at.unwrap_or(message.created_at),
        }
    }
}

/// Inserts, replaces or ignores `message` in a list sorted ascending by `sort_by`.
///
/// - `sort_key_changed`: the existing copy is dropped first and the message is
///   re-inserted at its new position.
/// - `insert_if_absent == false` turns the call into an update: a message that is
///   not already present is not added (unless its sort key changed).
///
/// Always returns a fresh vector; `messages` is never touched.
pub fn add_to_message_list(
    messages: &[Message],
    message: Message,
    sort_key_changed: bool,
    sort_by: SortBy,
    insert_if_absent: bool,
) -> Vec<Message> {
    let may_insert = insert_if_absent || sort_key_changed;

    let mut updated: Vec<Message> = if sort_key_changed {
        messages.iter().filter(|m| m.id != message.id).cloned().collect()
    } else {
        messages.to_vec()
    };

    let key = sort_by.key(&message);
    let newest = updated.last().is_none_or(|last| sort_by.key(last) < key);
    if newest {
        if may_insert {
            updated.push(message);
        }
        return updated;
    }

    let index = locate_with_identity(
        &message,
        &updated,
        Direction::Ascending,
        |m| sort_by.key(m),
        |m| m.id.clone(),
    );

    if !sort_key_changed && updated.get(index).is_some_and(|m| m.id == message.id) {
        updated[index] = message;
        return updated;
    }

    if may_insert {
        updated.insert(index, message);
    }
    updated
}

/// Removes every entry with `id`. Returns whether anything was removed and the new list.
pub fn remove_from_message_list(messages: &[Message], id: &str) -> (bool, Vec<Message>) {
    let result: Vec<Message> = messages.iter().filter(|m| m.id != id).cloned().collect();
    (result.len() != messages.len(), result)
}

use crate::models::{SortDirection, SortKey, ThreadMatch};
use std::cmp::Ordering;

fn compare_key(a: &ThreadMatch, b: &ThreadMatch, key: SortKey) -> Ordering {
    match key {
        SortKey::ReactionCount => a.record.reaction_count.cmp(&b.record.reaction_count),
        SortKey::ReplyCount => a.record.reply_count.cmp(&b.record.reply_count),
        SortKey::CreatedAt => a.record.created_at.cmp(&b.record.created_at),
        SortKey::LastActiveAt => a.record.last_active_at.cmp(&b.record.last_active_at),
    }
}

/// Order matches by `key` in `direction`; ties go to the lower thread id
pub fn sort_matches(items: &mut [ThreadMatch], key: SortKey, direction: SortDirection) {
    items.sort_by(|a, b| {
        let primary = match direction {
            SortDirection::Ascending => compare_key(a, b, key),
            SortDirection::Descending => compare_key(b, a, key),
        };
        primary.then_with(|| a.thread_id.cmp(&b.thread_id))
    });
}

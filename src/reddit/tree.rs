//! Locating a single comment inside a thread's reply tree.

use super::models::{Listing, Thing};
use super::strip_type_prefix;

/// Find the node with `target_id` anywhere in the thread.
///
/// Searches depth-first in document order: top-level listings in sequence, and within a
/// listing each node's replies are searched before its next sibling. Ids are compared
/// with their `t1_`/`t3_` prefixes removed on both sides. `more` stubs never match.
///
/// Returns `None` when the node is absent, which is normal for large threads where the
/// API truncates deep replies.
#[must_use]
pub fn find_node<'a>(listings: &'a [Listing], target_id: &str) -> Option<&'a Thing> {
    let target = strip_type_prefix(target_id);
    if target.is_empty() {
        return None;
    }

    listings
        .iter()
        .find_map(|listing| find_in_children(&listing.data.children, target))
}

/// Iterative pre-order walk; the explicit stack keeps adversarially deep threads from
/// exhausting the native stack.
fn find_in_children<'a>(children: &'a [Thing], target: &str) -> Option<&'a Thing> {
    let mut stack: Vec<&'a Thing> = children.iter().rev().collect();

    while let Some(node) = stack.pop() {
        if !node.is_placeholder()
            && node
                .data
                .id
                .as_deref()
                .is_some_and(|id| strip_type_prefix(id) == target)
        {
            return Some(node);
        }

        stack.extend(node.data.replies.children().iter().rev());
    }

    None
}

/// Permalink of the thread's submission (first child of the first listing).
#[must_use]
pub fn thread_permalink(listings: &[Listing]) -> Option<&str> {
    listings
        .first()
        .and_then(|listing| listing.data.children.first())
        .and_then(|submission| submission.data.permalink.as_deref())
}

//! Reddit data model, thread fetching and comment-tree search.

mod client;
mod models;
pub mod tree;

pub use client::{FetchError, RedditClient, ThreadSource};
pub use models::{ItemData, ItemKind, Listing, ListingData, MediaEmbed, Replies, Thing, ThreadDocument};
pub use tree::{find_node, thread_permalink};

/// Strip a Reddit type prefix (`t1_` comment, `t3_` link) from an id.
#[must_use]
pub fn strip_type_prefix(id: &str) -> &str {
    id.strip_prefix("t1_")
        .or_else(|| id.strip_prefix("t3_"))
        .unwrap_or(id)
}

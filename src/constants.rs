//! Shared constants used across the application.

/// Default user agent sent to Reddit.
///
/// Reddit rejects requests without a descriptive client identifier, so this names the
/// service instead of impersonating a browser.
pub const DEFAULT_REDDIT_USER_AGENT: &str = "devtracker-ingest/0.1 (developer post tracker)";

/// Public web host used when building absolute Reddit URLs.
pub const REDDIT_WEB_BASE: &str = "https://www.reddit.com";

/// Host that relative `href="/..."` links inside Reddit HTML are rewritten to.
pub const REDDIT_LINK_BASE: &str = "https://reddit.com";

/// Domains whose submissions are direct images and get rendered as `<img>` tags.
pub const IMAGE_DOMAINS: &[&str] = &["i.redd.it", "i.imgflip.com", "imgur.com", "i.imgur.com"];

/// Markup Reddit leaves behind for a deleted comment, still entity-encoded.
pub const DELETED_MARKER_ENCODED: &str = "&lt;div class=\"md\"&gt;&lt;p&gt;[deleted]&lt;/p&gt;";

/// The same placeholder once decoded.
pub const DELETED_MARKER: &str = "<div class=\"md\"><p>[deleted]</p>";

/// Comment limit requested when fetching a thread.
pub const THREAD_COMMENT_LIMIT: u32 = 1000;

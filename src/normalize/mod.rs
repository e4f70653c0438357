//! Conversion of raw Reddit items into tracker posts.

pub mod html;

use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{IMAGE_DOMAINS, REDDIT_WEB_BASE};
use crate::post::{AccountId, Post};
use crate::reddit::{find_node, thread_permalink, FetchError, ItemData, ItemKind, Thing, ThreadSource};

#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Fetching the parent thread failed; the item itself is fine.
    #[error("failed to fetch parent thread: {0}")]
    Fetch(#[from] FetchError),
    /// The item lacks a field needed to build a post. Retrying will not help.
    #[error("{kind} item is missing required field '{field}'")]
    Malformed { kind: String, field: &'static str },
}

impl NormalizeError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

/// Build a [`Post`] from a raw Reddit item.
///
/// Replies fetch their thread through `threads` to quote the comment they answer.
pub async fn normalize(
    account_id: &AccountId,
    item: &Thing,
    threads: &dyn ThreadSource,
) -> Result<Post, NormalizeError> {
    let content = match item.item_kind() {
        ItemKind::Reply => reply_content(item, threads).await?,
        ItemKind::Submission => submission_content(item)?,
        ItemKind::Other(kind) => {
            // Still produces a post: the tracker has always submitted these as-is.
            warn!(kind, "Unknown reddit kind, submitting empty post");
            Content::default()
        }
    };

    Ok(Post {
        account_id: account_id.clone(),
        section: item.data.subreddit.clone().unwrap_or_default(),
        timestamp: item.data.created_utc.map_or(0, |t| t as i64),
        topic_title: content.topic_title,
        topic_url: content.topic_url,
        url: content.url,
        text: content.text,
    })
}

#[derive(Debug, Default)]
struct Content {
    topic_title: String,
    topic_url: String,
    url: String,
    text: String,
}

async fn reply_content(item: &Thing, threads: &dyn ThreadSource) -> Result<Content, NormalizeError> {
    let data = &item.data;
    let id = required(item, data.id.as_deref(), "id")?;
    let topic_url = required(item, reply_topic_url(data), "link_permalink")?;
    let body = required(item, data.body_html.as_deref(), "body_html")?;
    let link_id = required(item, data.link_id.as_deref(), "link_id")?;
    let parent_id = required(item, data.parent_id.as_deref(), "parent_id")?;

    let context = parent_context(threads, link_id, parent_id).await?;
    let text = html::rewrite_relative_links(&format!("{context}{}", html::decode_html(body)));

    Ok(Content {
        topic_title: data.link_title.clone().unwrap_or_default(),
        topic_url: topic_url.to_string(),
        url: format!("{topic_url}{id}/"),
        text,
    })
}

/// URL a reply will be posted under, derived from the item alone.
///
/// Lets callers check for a known post before paying for the thread fetch. `None` for
/// anything but a reply carrying its id and topic link.
#[must_use]
pub fn reply_url(item: &Thing) -> Option<String> {
    if item.item_kind() != ItemKind::Reply {
        return None;
    }
    let id = non_empty(item.data.id.as_deref())?;
    let topic_url = non_empty(reply_topic_url(&item.data))?;
    Some(format!("{topic_url}{id}/"))
}

fn reply_topic_url(data: &ItemData) -> Option<&str> {
    data.link_permalink.as_deref().or(data.link_url.as_deref())
}

/// Quoted rendering of the comment being replied to, or an empty string when it cannot
/// be found or was deleted.
async fn parent_context(
    threads: &dyn ThreadSource,
    link_id: &str,
    parent_id: &str,
) -> Result<String, FetchError> {
    let thread = threads.fetch_thread(link_id).await?;

    let Some(parent) = find_node(thread.listings(), parent_id) else {
        debug!(link_id, parent_id, "Parent not in thread, posting without context");
        return Ok(String::new());
    };

    let encoded = parent_source(&parent.data);
    if html::is_deleted(&encoded) {
        debug!(link_id, parent_id, "Parent was deleted, posting without context");
        return Ok(String::new());
    }

    let decoded = html::decode_html(&encoded);
    if html::is_deleted(&decoded) {
        return Ok(String::new());
    }

    let permalink = thread_permalink(thread.listings()).unwrap_or_default();
    let parent_node_id = parent.data.id.as_deref().unwrap_or_default();

    Ok(html::quote_block(
        parent.data.author.as_deref().unwrap_or_default(),
        &format!("{permalink}{parent_node_id}"),
        &decoded,
    ))
}

/// Encoded HTML representing the parent: its body, self text, embed, or a rendered
/// image/link for bare link submissions.
fn parent_source(data: &ItemData) -> String {
    if let Some(text) = non_empty(data.body_html.as_deref())
        .or_else(|| non_empty(data.selftext_html.as_deref()))
        .or_else(|| data.media_embed_content())
    {
        return text.to_string();
    }

    let url = data.url.as_deref().unwrap_or_default();
    let title = data.title.as_deref().unwrap_or_default();
    let rendered = if is_image_domain(data.domain.as_deref()) {
        html::image_tag(url, title)
    } else {
        html::link_tag(url, title)
    };
    html::encode_html(&rendered)
}

fn submission_content(item: &Thing) -> Result<Content, NormalizeError> {
    let data = &item.data;
    let title = data.title.clone().unwrap_or_default();
    let link = data.url.clone().unwrap_or_default();

    if let Some(encoded) =
        non_empty(data.selftext_html.as_deref()).or_else(|| data.media_embed_content())
    {
        // Self posts and embeds live at the topic URL itself.
        return Ok(Content {
            text: html::decode_html(encoded),
            url: link.clone(),
            topic_url: link,
            topic_title: title,
        });
    }

    let permalink = required(item, data.permalink.as_deref(), "permalink")?;
    let url = format!("{REDDIT_WEB_BASE}{permalink}");

    if is_image_domain(data.domain.as_deref()) {
        // The topic link goes to the Reddit page, not the raw image.
        Ok(Content {
            text: html::image_tag(&link, &title),
            topic_url: url.clone(),
            url,
            topic_title: title,
        })
    } else {
        Ok(Content {
            text: html::link_tag(&link, &title),
            topic_url: link,
            url,
            topic_title: title,
        })
    }
}

fn is_image_domain(domain: Option<&str>) -> bool {
    domain.is_some_and(|d| IMAGE_DOMAINS.contains(&d))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn required<'a>(
    item: &Thing,
    value: Option<&'a str>,
    field: &'static str,
) -> Result<&'a str, NormalizeError> {
    non_empty(value).ok_or_else(|| NormalizeError::Malformed {
        kind: item.kind.clone(),
        field,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::reddit::{Listing, ListingData, MediaEmbed, Replies, ThreadDocument};

    /// Thread source serving a fixed document and recording requested ids.
    struct FixedThread {
        thread: Option<ThreadDocument>,
        requested: Mutex<Vec<String>>,
    }

    impl FixedThread {
        fn new(thread: ThreadDocument) -> Self {
            Self {
                thread: Some(thread),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                thread: None,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ThreadSource for FixedThread {
        async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadDocument, FetchError> {
            self.requested.lock().unwrap().push(thread_id.to_string());
            self.thread.clone().ok_or_else(|| FetchError::Status {
                url: format!("https://www.reddit.com/comments/{thread_id}.json"),
                status: 503,
            })
        }
    }

    fn account() -> AccountId {
        AccountId::Number(11)
    }

    fn comment(id: &str, author: &str, body_html: &str) -> Thing {
        Thing {
            kind: "t1".to_string(),
            data: ItemData {
                id: Some(id.to_string()),
                author: Some(author.to_string()),
                body_html: Some(body_html.to_string()),
                replies: Replies::Empty(String::new()),
                ..ItemData::default()
            },
        }
    }

    fn thread_with(comments: Vec<Thing>) -> ThreadDocument {
        let submission = Thing {
            kind: "t3".to_string(),
            data: ItemData {
                id: Some("abc".to_string()),
                permalink: Some("/r/game/comments/abc/patch/".to_string()),
                ..ItemData::default()
            },
        };
        ThreadDocument(vec![
            Listing {
                kind: "Listing".to_string(),
                data: ListingData {
                    children: vec![submission],
                },
            },
            Listing {
                kind: "Listing".to_string(),
                data: ListingData { children: comments },
            },
        ])
    }

    fn reply(parent_id: &str) -> Thing {
        Thing {
            kind: "t1".to_string(),
            data: ItemData {
                id: Some("def".to_string()),
                subreddit: Some("game".to_string()),
                created_utc: Some(1_700_000_123.0),
                body_html: Some(
                    "&lt;div class=\"md\"&gt;&lt;p&gt;See &lt;a href=\"/r/game/wiki/\"&gt;the wiki&lt;/a&gt;&lt;/p&gt;&lt;/div&gt;"
                        .to_string(),
                ),
                link_id: Some("t3_abc".to_string()),
                parent_id: Some(parent_id.to_string()),
                link_title: Some("Patch notes".to_string()),
                link_permalink: Some(
                    "https://www.reddit.com/r/game/comments/abc/patch/".to_string(),
                ),
                ..ItemData::default()
            },
        }
    }

    const DECODED_REPLY: &str =
        "<div class=\"md\"><p>See <a href=\"https://reddit.com/r/game/wiki/\">the wiki</a></p></div>";

    #[tokio::test]
    async fn test_reply_quotes_parent() {
        let threads = FixedThread::new(thread_with(vec![comment(
            "p1",
            "player",
            "&lt;div class=\"md\"&gt;&lt;p&gt;When is the patch?&lt;/p&gt;&lt;/div&gt;",
        )]));

        let post = normalize(&account(), &reply("t1_p1"), &threads).await.unwrap();

        assert_eq!(post.topic_title, "Patch notes");
        assert_eq!(
            post.topic_url,
            "https://www.reddit.com/r/game/comments/abc/patch/"
        );
        assert_eq!(
            post.url,
            "https://www.reddit.com/r/game/comments/abc/patch/def/"
        );
        assert!(post.text.starts_with("<blockquote>"));
        assert!(post.text.contains("player"));
        assert!(post.text.contains("<p>When is the patch?</p>"));
        // The permalink is relative in the thread and gets rewritten with the body.
        assert!(post
            .text
            .contains("<a href=\"https://reddit.com/r/game/comments/abc/patch/p1\">"));
        assert!(post.text.ends_with(DECODED_REPLY));
        assert_eq!(post.section, "game");
        assert_eq!(post.timestamp, 1_700_000_123);
        assert_eq!(*threads.requested.lock().unwrap(), vec!["t3_abc".to_string()]);
    }

    #[tokio::test]
    async fn test_reply_to_deleted_parent_has_no_quote() {
        let threads = FixedThread::new(thread_with(vec![comment(
            "p1",
            "[deleted]",
            "&lt;div class=\"md\"&gt;&lt;p&gt;[deleted]&lt;/p&gt;\n&lt;/div&gt;",
        )]));

        let post = normalize(&account(), &reply("t1_p1"), &threads).await.unwrap();

        assert!(!post.text.contains("<blockquote>"));
        assert_eq!(post.text, DECODED_REPLY);
    }

    #[tokio::test]
    async fn test_reply_with_missing_parent_has_no_quote() {
        let threads = FixedThread::new(thread_with(vec![comment("other", "x", "&lt;p&gt;x&lt;/p&gt;")]));

        let post = normalize(&account(), &reply("t1_gone"), &threads).await.unwrap();

        assert_eq!(post.text, DECODED_REPLY);
    }

    #[tokio::test]
    async fn test_reply_to_submission_quotes_link_post() {
        // Top-level comments have the submission as parent; a link submission has no
        // body, so the quote renders its link.
        let mut thread = thread_with(vec![]);
        let submission = &mut thread.0[0].data.children[0].data;
        submission.author = Some("studio".to_string());
        submission.title = Some("Trailer".to_string());
        submission.url = Some("https://youtube.com/watch?v=1".to_string());
        submission.domain = Some("youtube.com".to_string());
        let threads = FixedThread::new(thread);

        let post = normalize(&account(), &reply("t3_abc"), &threads).await.unwrap();

        assert!(post
            .text
            .contains("<a href=\"https://youtube.com/watch?v=1\">Trailer</a>"));
        assert!(post.text.contains("studio"));
    }

    #[tokio::test]
    async fn test_reply_fetch_failure_is_retryable() {
        let threads = FixedThread::failing();

        let err = normalize(&account(), &reply("t1_p1"), &threads)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_reply_without_body_is_malformed() {
        let threads = FixedThread::new(thread_with(vec![]));
        let mut item = reply("t1_p1");
        item.data.body_html = None;

        let err = normalize(&account(), &item, &threads).await.unwrap_err();

        assert!(matches!(
            err,
            NormalizeError::Malformed { field: "body_html", .. }
        ));
        assert!(!err.is_retryable());
        assert!(threads.requested.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reply_url_matches_normalized_url() {
        assert_eq!(
            reply_url(&reply("t1_p1")).as_deref(),
            Some("https://www.reddit.com/r/game/comments/abc/patch/def/")
        );

        let mut no_id = reply("t1_p1");
        no_id.data.id = None;
        assert_eq!(reply_url(&no_id), None);

        let submission = Thing {
            kind: "t3".to_string(),
            data: ItemData::default(),
        };
        assert_eq!(reply_url(&submission), None);
    }

    #[tokio::test]
    async fn test_reply_falls_back_to_link_url() {
        let threads = FixedThread::new(thread_with(vec![]));
        let mut item = reply("t1_p1");
        item.data.link_permalink = None;
        item.data.link_url = Some("https://www.reddit.com/r/game/comments/abc/".to_string());

        let post = normalize(&account(), &item, &threads).await.unwrap();

        assert_eq!(post.url, "https://www.reddit.com/r/game/comments/abc/def/");
    }

    fn submission() -> Thing {
        Thing {
            kind: "t3".to_string(),
            data: ItemData {
                id: Some("s1".to_string()),
                title: Some("T".to_string()),
                subreddit: Some("game".to_string()),
                created_utc: Some(1_600_000_000.0),
                url: Some("https://www.reddit.com/r/game/comments/s1/t/".to_string()),
                permalink: Some("/r/game/comments/s1/t/".to_string()),
                domain: Some("self.game".to_string()),
                ..ItemData::default()
            },
        }
    }

    #[tokio::test]
    async fn test_self_post_shares_topic_url() {
        let mut item = submission();
        item.data.selftext_html = Some("&lt;p&gt;hi&lt;/p&gt;".to_string());

        let post = normalize(&account(), &item, &FixedThread::failing())
            .await
            .unwrap();

        assert_eq!(post.url, post.topic_url);
        assert_eq!(post.text, "<p>hi</p>");
        assert_eq!(post.topic_title, "T");
    }

    #[tokio::test]
    async fn test_media_embed_used_when_no_self_text() {
        let mut item = submission();
        item.data.secure_media_embed = Some(MediaEmbed {
            content: Some("&lt;iframe src=\"https://player.example/1\"&gt;&lt;/iframe&gt;".to_string()),
        });

        let post = normalize(&account(), &item, &FixedThread::failing())
            .await
            .unwrap();

        assert_eq!(post.text, "<iframe src=\"https://player.example/1\"></iframe>");
        assert_eq!(post.url, post.topic_url);
    }

    #[tokio::test]
    async fn test_image_submission() {
        let mut item = submission();
        item.data.domain = Some("i.imgur.com".to_string());
        item.data.url = Some("http://i.imgur.com/x.png".to_string());

        let post = normalize(&account(), &item, &FixedThread::failing())
            .await
            .unwrap();

        assert_eq!(
            post.text,
            "<img src=\"http://i.imgur.com/x.png\" title=\"T\" />"
        );
        assert_eq!(post.url, "https://www.reddit.com/r/game/comments/s1/t/");
        assert_eq!(post.topic_url, post.url);
    }

    #[tokio::test]
    async fn test_external_link_submission() {
        let mut item = submission();
        item.data.domain = Some("store.steampowered.com".to_string());
        item.data.url = Some("https://store.steampowered.com/app/1".to_string());

        let post = normalize(&account(), &item, &FixedThread::failing())
            .await
            .unwrap();

        assert_eq!(
            post.text,
            "<a href=\"https://store.steampowered.com/app/1\">T</a>"
        );
        assert_eq!(post.url, "https://www.reddit.com/r/game/comments/s1/t/");
        assert_eq!(post.topic_url, "https://store.steampowered.com/app/1");
    }

    #[tokio::test]
    async fn test_unknown_kind_yields_empty_post() {
        let item = Thing {
            kind: "t4".to_string(),
            data: ItemData {
                subreddit: Some("game".to_string()),
                created_utc: Some(5.0),
                ..ItemData::default()
            },
        };

        let post = normalize(&account(), &item, &FixedThread::failing())
            .await
            .unwrap();

        assert!(post.text.is_empty());
        assert!(post.url.is_empty());
        assert_eq!(post.section, "game");
        assert_eq!(post.timestamp, 5);
    }
}

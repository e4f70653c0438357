use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// A Reddit "thing": `{"kind": "t1", "data": {...}}`.
///
/// Jobs carry one of these as their raw payload and thread documents are trees of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thing {
    pub kind: String,
    #[serde(default)]
    pub data: ItemData,
}

/// What a [`Thing`] represents, by its `kind` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind<'a> {
    /// `t1`: a comment replying to a submission or another comment.
    Reply,
    /// `t3`: a submission (link or self post).
    Submission,
    Other(&'a str),
}

impl Thing {
    #[must_use]
    pub fn item_kind(&self) -> ItemKind<'_> {
        match self.kind.as_str() {
            "t1" => ItemKind::Reply,
            "t3" => ItemKind::Submission,
            other => ItemKind::Other(other),
        }
    }

    /// `more` stubs stand in for comments the API did not expand. Reddit gives them the
    /// id of their first hidden child, so they must never be matched as real nodes.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.kind == "more"
    }

    /// Fullname (`t1_abc`) when present, falling back to the kind-prefixed id.
    #[must_use]
    pub fn fullname(&self) -> Option<String> {
        self.data.name.clone().or_else(|| {
            self.data
                .id
                .as_ref()
                .map(|id| format!("{}_{}", self.kind, id))
        })
    }
}

/// The fields of a comment or submission that ingestion cares about.
///
/// Everything is optional because comments, submissions and `more` stubs share this
/// shape and Reddit omits whatever does not apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subreddit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_utc: Option<f64>,

    // Comment fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,

    // Submission fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selftext_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_media_embed: Option<MediaEmbed>,

    #[serde(default, skip_serializing_if = "Replies::is_empty")]
    pub replies: Replies,
}

impl ItemData {
    /// Embedded media HTML (still entity-encoded), if the item has any.
    #[must_use]
    pub fn media_embed_content(&self) -> Option<&str> {
        self.secure_media_embed
            .as_ref()
            .and_then(|embed| embed.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

/// `secure_media_embed` payload. Reddit sends `{}` when there is nothing embedded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaEmbed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Nested replies of a comment.
///
/// Reddit encodes "no replies" as an empty string rather than omitting the field.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(untagged)]
pub enum Replies {
    Listing(Box<Listing>),
    Empty(String),
    #[default]
    None,
}

impl Replies {
    #[must_use]
    pub fn children(&self) -> &[Thing] {
        match self {
            Self::Listing(listing) => &listing.data.children,
            Self::Empty(_) | Self::None => &[],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children().is_empty()
    }
}

// Not `untagged`: that buffers the subtree and replays it recursively, outside the
// stack growth in `ThreadDocument::from_slice`.
impl<'de> Deserialize<'de> for Replies {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(RepliesVisitor)
    }
}

struct RepliesVisitor;

impl<'de> Visitor<'de> for RepliesVisitor {
    type Value = Replies;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a listing, a string or null")
    }

    fn visit_str<E>(self, value: &str) -> Result<Replies, E>
    where
        E: de::Error,
    {
        Ok(Replies::Empty(value.to_string()))
    }

    fn visit_unit<E>(self) -> Result<Replies, E>
    where
        E: de::Error,
    {
        Ok(Replies::None)
    }

    fn visit_none<E>(self) -> Result<Replies, E>
    where
        E: de::Error,
    {
        Ok(Replies::None)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Replies, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_map<A>(self, map: A) -> Result<Replies, A::Error>
    where
        A: MapAccess<'de>,
    {
        Listing::deserialize(de::value::MapAccessDeserializer::new(map))
            .map(|listing| Replies::Listing(Box::new(listing)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub data: ListingData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<Thing>,
}

impl Drop for ListingData {
    fn drop(&mut self) {
        // Detach nested listings before dropping each node so a deep reply chain is
        // freed in a loop instead of one stack frame per level.
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut thing) = pending.pop() {
            if let Replies::Listing(listing) = &mut thing.data.replies {
                pending.append(&mut listing.data.children);
            }
        }
    }
}

/// A thread as returned by `/comments/{id}.json`: `[submissionListing, commentListing]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadDocument(pub Vec<Listing>);

impl ThreadDocument {
    /// Parse a thread response body.
    ///
    /// Nesting depth is not limited: reply chains can go arbitrarily deep, so the
    /// parser grows its stack on the heap instead of hitting a recursion limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid thread document.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        let mut json = serde_json::Deserializer::from_slice(body);
        json.disable_recursion_limit();
        let document = Self::deserialize(serde_stacker::Deserializer::new(&mut json))?;
        json.end()?;
        Ok(document)
    }

    #[must_use]
    pub fn listings(&self) -> &[Listing] {
        &self.0
    }
}

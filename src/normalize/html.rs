//! HTML helpers for Reddit content.
//!
//! Reddit returns `body_html`/`selftext_html` entity-encoded, and some payloads are encoded
//! twice, so content goes through two decoding layers.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::constants::{DELETED_MARKER, DELETED_MARKER_ENCODED, REDDIT_LINK_BASE};

static XML_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(lt|gt|quot|apos|amp|#[0-9]+|#[xX][0-9a-fA-F]+);").expect("valid regex")
});

static RELATIVE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href="/(.+?)/"#).expect("valid regex"));

/// Decode Reddit HTML: XML entities first, then the full HTML entity set.
#[must_use]
pub fn decode_html(encoded: &str) -> String {
    let once = decode_xml_entities(encoded);
    html_escape::decode_html_entities(&once).into_owned()
}

/// Decode the five XML entities plus numeric references, in a single pass.
///
/// `&amp;lt;` becomes `&lt;`, not `<`.
#[must_use]
pub fn decode_xml_entities(input: &str) -> String {
    XML_ENTITY
        .replace_all(input, |caps: &Captures<'_>| {
            let entity = &caps[1];
            match entity {
                "lt" => "<".to_string(),
                "gt" => ">".to_string(),
                "quot" => "\"".to_string(),
                "apos" => "'".to_string(),
                "amp" => "&".to_string(),
                numeric => decode_numeric(numeric).unwrap_or_else(|| caps[0].to_string()),
            }
        })
        .into_owned()
}

fn decode_numeric(entity: &str) -> Option<String> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code).map(String::from)
}

/// Entity-encode HTML so it can travel through [`decode_html`] like Reddit content.
#[must_use]
pub fn encode_html(raw: &str) -> String {
    html_escape::encode_double_quoted_attribute(raw).into_owned()
}

/// Point site-relative links (`href="/r/..."`) at Reddit.
#[must_use]
pub fn rewrite_relative_links(html: &str) -> String {
    RELATIVE_HREF
        .replace_all(html, format!("href=\"{REDDIT_LINK_BASE}/${{1}}/").as_str())
        .into_owned()
}

/// Whether content is Reddit's placeholder for a deleted comment.
#[must_use]
pub fn is_deleted(text: &str) -> bool {
    text.contains(DELETED_MARKER_ENCODED) || text.contains(DELETED_MARKER)
}

#[must_use]
pub fn image_tag(src: &str, title: &str) -> String {
    format!("<img src=\"{src}\" title=\"{title}\" />")
}

#[must_use]
pub fn link_tag(href: &str, title: &str) -> String {
    format!("<a href=\"{href}\">{title}</a>")
}

/// Quote block shown above a reply, crediting the parent's author.
#[must_use]
pub fn quote_block(author: &str, link: &str, body: &str) -> String {
    format!(
        "<blockquote>\n\
         <div class=\"bb_quoteauthor\">\n\
         Originally posted by\n\
         <b>\n\
         <a href=\"{link}\">\n\
         {author}\n\
         </a>\n\
         </b>\n\
         </div>\n\
         {body}\n\
         </blockquote>"
    )
}

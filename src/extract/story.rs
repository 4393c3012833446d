//! Field extraction from a single story node.
//!
//! Every field here is best-effort over an undocumented payload: each
//! resolver tries a chain of known key paths and returns the first hit.
//! Only two fields are mandatory — a text body of at least
//! [`MIN_TEXT_CHARS`](crate::extract::MIN_TEXT_CHARS) characters and a
//! canonical URL. A story missing either is dropped without a trace; the
//! walk continues.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::types::{title_from_text, Item};
use crate::extract::postprocess::strip_query;
use crate::extract::{ExtractCtx, MIN_TEXT_CHARS};

/// Recursion ceiling for the media-URL hunt. Image URLs sit much shallower
/// than story envelopes, so this is tighter than the main walk bound.
const MAX_IMAGE_DEPTH: usize = 15;

/// Build an [`Item`] from `node` if it carries a usable body and URL.
///
/// The seen-set in `ctx` is keyed on the query-stripped URL, so the same
/// post reached through two envelopes (or hydrated twice by the feed)
/// emits exactly once per context.
pub fn emit_story(node: &Value, ctx: &mut ExtractCtx, out: &mut Vec<Item>) {
    let Some(text) = resolve_text(node) else {
        return;
    };
    if text.chars().count() < MIN_TEXT_CHARS {
        return;
    }
    let Some(raw_url) = resolve_url(node) else {
        return;
    };
    let url = strip_query(&raw_url);
    if !ctx.mark_seen(&url) {
        return;
    }

    let (author, uid) = resolve_author(node);
    out.push(Item {
        title: title_from_text(&text),
        price: extract_price(&text),
        location: ctx.location.clone(),
        image: resolve_image(node, 0).unwrap_or_default(),
        author,
        uid,
        keyword: ctx.keyword.clone(),
        kind: ctx.kind,
        timestamp: resolve_timestamp(node),
        url,
        full_text: text,
    });
}

// ── Text ─────────────────────────────────────────────────────────────────────

/// First non-empty text body along the known key paths.
pub fn resolve_text(node: &Value) -> Option<String> {
    let paths: [&[&str]; 5] = [
        &["message", "text"],
        &["message_with_entities", "text"],
        &["body", "text"],
        &["title", "text"],
        &["text"],
    ];
    for path in paths {
        if let Some(text) = str_at(node, path) {
            return Some(text);
        }
    }
    // Comet layouts bury the message under a sections wrapper.
    if let Some(sections) = node.get("comet_sections") {
        for key in ["content", "message"] {
            if let Some(inner) = sections.get(key) {
                if let Some(text) = find_text_recursive(inner, 0) {
                    return Some(text);
                }
            }
        }
    }
    None
}

fn find_text_recursive(node: &Value, depth: usize) -> Option<String> {
    if depth >= 10 {
        return None;
    }
    if let Some(text) = str_at(node, &["message", "text"]) {
        return Some(text);
    }
    match node {
        Value::Object(map) => map
            .values()
            .find_map(|v| find_text_recursive(v, depth + 1)),
        Value::Array(items) => items
            .iter()
            .find_map(|v| find_text_recursive(v, depth + 1)),
        _ => None,
    }
}

fn str_at(node: &Value, path: &[&str]) -> Option<String> {
    let mut cur = node;
    for key in path {
        cur = cur.get(key)?;
    }
    let s = cur.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// ── URL ──────────────────────────────────────────────────────────────────────

/// Canonical post URL: explicit URL fields first, then synthesized from an id.
pub fn resolve_url(node: &Value) -> Option<String> {
    for key in ["wwwURL", "url", "permalink_url"] {
        if let Some(u) = node.get(key).and_then(Value::as_str) {
            let u = u.trim();
            if u.starts_with("http") {
                return Some(u.to_string());
            }
        }
    }
    for key in ["post_id", "id"] {
        if let Some(id) = node.get(key).and_then(Value::as_str) {
            let id = id.trim();
            if !id.is_empty() {
                return Some(format!("https://www.facebook.com/{}", id));
            }
        }
    }
    None
}

// ── Author ───────────────────────────────────────────────────────────────────

/// Best-effort `(display name, id)`. Falls back to `("Unknown", "")`.
pub fn resolve_author(node: &Value) -> (String, String) {
    let candidates = [
        node.get("actors").and_then(|a| a.get(0)),
        node.get("owner"),
        node.get("author"),
    ];
    for actor in candidates.into_iter().flatten() {
        let name = actor
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty());
        if let Some(name) = name {
            let uid = actor
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return (name.to_string(), uid);
        }
    }
    ("Unknown".to_string(), String::new())
}

// ── Image ────────────────────────────────────────────────────────────────────

const IMAGE_URL_KEYS: &[&str] = &["uri", "src", "playable_url", "image_uri", "photo_image_uri"];

const IMAGE_CONTAINER_KEYS: &[&str] = &[
    "attachments",
    "all_subattachments",
    "nodes",
    "media",
    "styles",
    "attachment",
    "comet_sections",
    "content",
    "story",
    "image",
    "photo_image",
    "large_share_image",
];

/// Depth-bounded hunt for a platform-CDN media URL.
///
/// Only descends through keys known to wrap media, so a deep unrelated
/// subtree never costs a full traversal.
pub fn resolve_image(node: &Value, depth: usize) -> Option<String> {
    if depth >= MAX_IMAGE_DEPTH {
        return None;
    }
    let map = node.as_object()?;

    for key in IMAGE_URL_KEYS {
        if let Some(u) = map.get(*key).and_then(Value::as_str) {
            if is_cdn_media_url(u) {
                return Some(u.to_string());
            }
        }
    }

    for key in IMAGE_CONTAINER_KEYS {
        match map.get(*key) {
            Some(Value::Array(items)) => {
                if let Some(found) = items.iter().find_map(|v| resolve_image(v, depth + 1)) {
                    return Some(found);
                }
            }
            Some(inner @ Value::Object(_)) => {
                if let Some(found) = resolve_image(inner, depth + 1) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_cdn_media_url(url: &str) -> bool {
    url.starts_with("https://") && (url.contains("fbcdn") || url.contains("scontent"))
}

// ── Price ────────────────────────────────────────────────────────────────────

fn price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Digits, optional thousand/decimal separators, then a currency
        // token. `$` is not a word character so it sits outside the \b group.
        Regex::new(r"(?i)\d[\d.,]*\s?(?:(?:triệu|tr|vnđ|đ|k|usd)\b|\$)")
            .expect("valid price pattern")
    })
}

/// First price-looking token in `text`, verbatim. Empty string when none.
pub fn extract_price(text: &str) -> String {
    price_regex()
        .find(text)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

// ── Timestamp ────────────────────────────────────────────────────────────────

/// Epoch-seconds creation field rendered as RFC 3339, when present and valid.
pub fn resolve_timestamp(node: &Value) -> Option<String> {
    let secs = ["creation_time", "created_time"]
        .iter()
        .find_map(|k| node.get(*k))
        .and_then(|v| v.as_i64().or_else(|| v.as_str()?.parse().ok()))?;
    let dt = chrono::DateTime::from_timestamp(secs, 0)?;
    Some(dt.to_rfc3339())
}

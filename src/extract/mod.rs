//! Structured-record extraction from captured feed packets.
//!
//! A captured packet is one deeply nested JSON value of undocumented,
//! shifting shape. Extraction is a depth-bounded recursive walk: at every
//! node we first try the ordered shape recognizers in [`shapes`], and
//! regardless of whether one matched we keep descending — a packet can carry
//! several stories at different depths, and a recognized wrapper often
//! contains further recognizable children.
//!
//! An [`Item`](crate::core::types::Item) is only materialized when a story
//! node yields a text body of at least [`MIN_TEXT_CHARS`] characters and a
//! canonical post URL; everything else is skipped silently. Duplicate story
//! nodes inside one walk are suppressed by a per-context seen-set keyed on
//! the query-stripped URL.

pub mod postprocess;
pub mod shapes;
pub mod story;

use std::collections::HashSet;

use crate::core::types::{CapturedPacket, Item, ItemKind};

/// Recursion ceiling for the packet walk. Feed payloads nest 20-30 levels
/// deep in practice; 50 leaves headroom while still bounding a pathological
/// self-referencing payload.
pub const MAX_WALK_DEPTH: usize = 50;

/// Minimum extracted text length for a story to become an [`Item`].
/// Anything shorter is UI chrome ("Like", "Share") rather than a post body.
pub const MIN_TEXT_CHARS: usize = 5;

/// Ambient labels applied to every item produced from one packet batch.
#[derive(Debug, Clone)]
pub struct ExtractCtx {
    /// Origin label stamped into `Item::location`.
    pub location: String,
    /// Search / filter term stamped into `Item::keyword`.
    pub keyword: String,
    /// Origin kind stamped into `Item::kind`.
    pub kind: ItemKind,
    /// Query-stripped URLs already emitted during this walk.
    seen: HashSet<String>,
}

impl ExtractCtx {
    pub fn new(location: impl Into<String>, keyword: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            location: location.into(),
            keyword: keyword.into(),
            kind,
            seen: HashSet::new(),
        }
    }

    /// Record `url` as emitted; returns `false` if it was already seen.
    pub(crate) fn mark_seen(&mut self, url: &str) -> bool {
        self.seen.insert(url.to_string())
    }
}

/// Extract every story item reachable in `packet`.
///
/// The walk shares one `ctx` across calls, so feeding several packets from
/// the same drain batch through the same context deduplicates across them.
pub fn extract_items(packet: &CapturedPacket, ctx: &mut ExtractCtx) -> Vec<Item> {
    let mut out = Vec::new();
    walk(packet, 0, ctx, &mut out);
    out
}

fn walk(node: &serde_json::Value, depth: usize, ctx: &mut ExtractCtx, out: &mut Vec<Item>) {
    if depth >= MAX_WALK_DEPTH {
        return;
    }

    if let Some(shape) = shapes::recognize(node) {
        shape.extract(node, ctx, out);
    }

    match node {
        serde_json::Value::Object(map) => {
            for value in map.values() {
                walk(value, depth + 1, ctx, out);
            }
        }
        serde_json::Value::Array(items) => {
            for value in items {
                walk(value, depth + 1, ctx, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExtractCtx {
        ExtractCtx::new("Newsfeed", "", ItemKind::Newsfeed)
    }

    #[test]
    fn test_walk_depth_is_bounded() {
        // Build a chain nested beyond the ceiling with a story at the bottom.
        let mut node = json!({
            "story": {
                "message": { "text": "bán nhà mặt phố giá tốt" },
                "wwwURL": "https://www.facebook.com/999"
            }
        });
        for _ in 0..MAX_WALK_DEPTH + 5 {
            node = json!({ "wrap": node });
        }
        let items = extract_items(&node, &mut ctx());
        assert!(items.is_empty(), "story below the depth ceiling must not surface");
    }

    #[test]
    fn test_same_story_at_two_depths_emits_once() {
        let story = json!({
            "__typename": "Story",
            "message": { "text": "Cần bán laptop cũ còn tốt" },
            "wwwURL": "https://www.facebook.com/123?ref=x"
        });
        let packet = json!({
            "data": { "a": story.clone(), "b": { "inner": story } }
        });
        let items = extract_items(&packet, &mut ctx());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://www.facebook.com/123");
    }

    #[test]
    fn test_context_persists_across_packets() {
        let story = json!({
            "__typename": "Story",
            "message": { "text": "Cần bán laptop cũ còn tốt" },
            "wwwURL": "https://www.facebook.com/123"
        });
        let mut shared = ctx();
        let first = extract_items(&story, &mut shared);
        let second = extract_items(&story, &mut shared);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty(), "same URL in a later packet must be suppressed");
    }

    #[test]
    fn test_short_text_never_materializes() {
        let packet = json!({
            "__typename": "Story",
            "message": { "text": "ok" },
            "wwwURL": "https://www.facebook.com/123"
        });
        assert!(extract_items(&packet, &mut ctx()).is_empty());
    }
}

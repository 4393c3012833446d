//! Shape recognizers for the packet walk.
//!
//! The platform wraps story payloads in a rotating set of envelope shapes.
//! Each variant of [`StoryShape`] names one envelope we know how to unwrap;
//! [`recognize`] tries them in priority order (most specific first) and
//! returns the first match. Unrecognized nodes are simply descended through
//! by the walker, so a new envelope shape degrades to "no items from this
//! wrapper" rather than a hard failure.

use serde_json::Value;

use crate::core::types::Item;
use crate::extract::story;
use crate::extract::ExtractCtx;

/// One recognized story envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryShape {
    /// `{ "content": { "story": {…} } }` — comet feed unit.
    ContentStory,
    /// `{ "feedback_context": { "feedback_target_with_context": {…} } }`.
    FeedbackContext,
    /// `{ "attached_story": {…} }` — share wrapper; the inner story is the payload.
    AttachedStory,
    /// `{ "__typename": "Story", … }` — a bare typed story node.
    TypedStoryNode,
    /// `{ "edges": [ { "node": {…} }, … ] }` — connection page.
    EdgeList,
    /// `{ "units": […] }` or `{ "feed_units": … }` — legacy unit stream.
    UnitList,
    /// `{ "node": {…} }` where the node carries story hints.
    NodeWrapper,
    /// `{ "attachments": […], "message": {…} }` — story body with attachments.
    StoryAttachmentList,
    /// `{ "message": { "text": … }, "wwwURL"/"url"/"post_id"/"id": … }` —
    /// a story-like leaf with no envelope at all.
    DirectStory,
}

/// Match `node` against the known envelopes, most specific first.
pub fn recognize(node: &Value) -> Option<StoryShape> {
    let map = node.as_object()?;

    if map
        .get("content")
        .and_then(|c| c.get("story"))
        .map(Value::is_object)
        .unwrap_or(false)
    {
        return Some(StoryShape::ContentStory);
    }
    if map
        .get("feedback_context")
        .and_then(|f| f.get("feedback_target_with_context"))
        .is_some()
    {
        return Some(StoryShape::FeedbackContext);
    }
    if map.get("attached_story").map(Value::is_object).unwrap_or(false) {
        return Some(StoryShape::AttachedStory);
    }
    if map.get("__typename").and_then(Value::as_str) == Some("Story") {
        return Some(StoryShape::TypedStoryNode);
    }
    if map.get("edges").map(Value::is_array).unwrap_or(false) {
        return Some(StoryShape::EdgeList);
    }
    if map.get("units").map(Value::is_array).unwrap_or(false) || map.contains_key("feed_units") {
        return Some(StoryShape::UnitList);
    }
    if let Some(inner) = map.get("node").and_then(Value::as_object) {
        if has_story_hints(inner) {
            return Some(StoryShape::NodeWrapper);
        }
    }
    if map.get("attachments").map(Value::is_array).unwrap_or(false) && map.contains_key("message") {
        return Some(StoryShape::StoryAttachmentList);
    }
    if is_direct_story(map) {
        return Some(StoryShape::DirectStory);
    }
    None
}

/// A node "looks like" a story when it has any text carrier or a story child.
fn has_story_hints(map: &serde_json::Map<String, Value>) -> bool {
    map.contains_key("message")
        || map.contains_key("story")
        || map.contains_key("comet_sections")
        || map.get("__typename").and_then(Value::as_str) == Some("Story")
}

fn is_direct_story(map: &serde_json::Map<String, Value>) -> bool {
    let has_text = map
        .get("message")
        .and_then(|m| m.get("text"))
        .and_then(Value::as_str)
        .map(|t| !t.trim().is_empty())
        .unwrap_or(false);
    if !has_text {
        return false;
    }
    ["wwwURL", "url", "permalink_url", "post_id", "id"]
        .iter()
        .any(|k| map.contains_key(*k))
}

impl StoryShape {
    /// Unwrap the envelope and hand the inner story node(s) to the field
    /// extractor. List shapes iterate their entries; the walker will also
    /// descend into them independently, so the seen-set is what keeps a
    /// story from double-emitting.
    pub fn extract(self, node: &Value, ctx: &mut ExtractCtx, out: &mut Vec<Item>) {
        match self {
            StoryShape::ContentStory => {
                if let Some(inner) = node.get("content").and_then(|c| c.get("story")) {
                    story::emit_story(inner, ctx, out);
                }
            }
            StoryShape::FeedbackContext => {
                if let Some(inner) = node
                    .get("feedback_context")
                    .and_then(|f| f.get("feedback_target_with_context"))
                {
                    story::emit_story(inner, ctx, out);
                }
            }
            StoryShape::AttachedStory => {
                if let Some(inner) = node.get("attached_story") {
                    story::emit_story(inner, ctx, out);
                }
            }
            StoryShape::TypedStoryNode | StoryShape::DirectStory | StoryShape::StoryAttachmentList => {
                story::emit_story(node, ctx, out);
            }
            StoryShape::EdgeList => {
                if let Some(edges) = node.get("edges").and_then(Value::as_array) {
                    for edge in edges {
                        if let Some(inner) = edge.get("node") {
                            story::emit_story(inner, ctx, out);
                        }
                    }
                }
            }
            StoryShape::UnitList => {
                let units = node
                    .get("units")
                    .or_else(|| node.get("feed_units"))
                    .and_then(Value::as_array);
                if let Some(units) = units {
                    for unit in units {
                        story::emit_story(unit, ctx, out);
                    }
                }
            }
            StoryShape::NodeWrapper => {
                if let Some(inner) = node.get("node") {
                    story::emit_story(inner, ctx, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_specific_shapes_win_over_generic() {
        // A node that is simultaneously a content-story wrapper and a typed
        // story must resolve to the more specific envelope.
        let node = json!({
            "__typename": "Story",
            "content": { "story": { "message": { "text": "hello" } } }
        });
        assert_eq!(recognize(&node), Some(StoryShape::ContentStory));
    }

    #[test]
    fn test_typed_story_recognized() {
        let node = json!({ "__typename": "Story", "id": "1" });
        assert_eq!(recognize(&node), Some(StoryShape::TypedStoryNode));
    }

    #[test]
    fn test_edge_list_recognized() {
        let node = json!({ "edges": [ { "node": {} } ] });
        assert_eq!(recognize(&node), Some(StoryShape::EdgeList));
    }

    #[test]
    fn test_node_wrapper_needs_story_hints() {
        let plain = json!({ "node": { "id": "1" } });
        assert_eq!(recognize(&plain), None);

        let hinted = json!({ "node": { "message": { "text": "x" } } });
        assert_eq!(recognize(&hinted), Some(StoryShape::NodeWrapper));
    }

    #[test]
    fn test_direct_story_needs_text_and_anchor() {
        let no_anchor = json!({ "message": { "text": "bán xe" } });
        assert_eq!(recognize(&no_anchor), None);

        let with_anchor = json!({ "message": { "text": "bán xe" }, "post_id": "42" });
        assert_eq!(recognize(&with_anchor), Some(StoryShape::DirectStory));

        let empty_text = json!({ "message": { "text": "  " }, "post_id": "42" });
        assert_eq!(recognize(&empty_text), None);
    }

    #[test]
    fn test_scalars_and_arrays_never_match() {
        assert_eq!(recognize(&json!("story")), None);
        assert_eq!(recognize(&json!([1, 2, 3])), None);
        assert_eq!(recognize(&json!(null)), None);
    }
}

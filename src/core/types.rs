use serde::{Deserialize, Serialize};

/// Where a harvested post came from, as far as downstream consumers care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Marketplace,
    GroupPost,
    Newsfeed,
}

/// One harvested post record.
///
/// An `Item` is only materialized when the extractor resolved a non-empty
/// text body of at least [`MIN_TEXT_CHARS`](crate::extract::MIN_TEXT_CHARS)
/// characters *and* a canonical post URL. The URL (query string stripped) is
/// the identity key used by deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Short display text derived from `full_text`, truncated with `...`.
    pub title: String,
    /// Raw extracted post text.
    pub full_text: String,
    /// Raw price substring as matched in the text (e.g. `8.5tr`), empty when
    /// no price token was found. No numeric normalization at this layer.
    #[serde(default)]
    pub price: String,
    /// Coarse origin label: `"Group/Feed"`, `"Newsfeed"`, `"Marketplace"`, or
    /// a page-derived string.
    #[serde(default)]
    pub location: String,
    /// Canonical post URL. Identity key for dedup.
    pub url: String,
    /// CDN-hosted media URL, empty when no platform-hosted image was found.
    #[serde(default)]
    pub image: String,
    /// Best-effort author display name.
    #[serde(default = "default_author")]
    pub author: String,
    /// Best-effort author id.
    #[serde(default)]
    pub uid: String,
    /// The search / filter term that produced or matched this item.
    #[serde(default)]
    pub keyword: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// ISO-8601 creation time derived from the post's epoch-seconds field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

fn default_author() -> String {
    "Unknown".to_string()
}

/// Caller-facing result envelope for one harvest invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestOutcome {
    pub items: Vec<Item>,
    pub count: usize,
}

impl HarvestOutcome {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

/// One parsed JSON record observed from the page's internal network traffic.
/// Transient: consumed once by the extractor on drain, never persisted.
pub type CapturedPacket = serde_json::Value;

/// Ordered collection of raw CDP cookie objects as persisted to disk.
///
/// Stored as opaque JSON so a field the CDP adds tomorrow never breaks a
/// session file written today; individual entries that fail to deserialize
/// into `CookieParam` at injection time are skipped.
pub type CookieSet = Vec<serde_json::Value>;

pub const TITLE_MAX_CHARS: usize = 80;

/// Derive the truncated display title from a full post text.
pub fn title_from_text(full_text: &str) -> String {
    let trimmed = full_text.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    title.push_str("...");
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_truncation_is_char_safe() {
        // Vietnamese text: byte-indexed truncation would split a code point.
        let text = "Cần bán gấp laptop Dell Latitude 7490 core i7 ram 16GB ssd 512GB \
                    màn hình FHD giá tốt cho sinh viên và dân văn phòng";
        let title = title_from_text(text);
        assert!(title.ends_with("..."));
        assert_eq!(
            title.chars().count(),
            TITLE_MAX_CHARS + 3,
            "expected {} chars + ellipsis",
            TITLE_MAX_CHARS
        );
    }

    #[test]
    fn test_title_short_text_untouched() {
        assert_eq!(title_from_text("  bán xe máy  "), "bán xe máy");
    }

    #[test]
    fn test_item_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ItemKind::GroupPost).unwrap(),
            "\"group_post\""
        );
        assert_eq!(
            serde_json::to_string(&ItemKind::Marketplace).unwrap(),
            "\"marketplace\""
        );
    }

    #[test]
    fn test_item_kind_round_trips_as_type_field() {
        let item = Item {
            title: "t".into(),
            full_text: "hello world".into(),
            price: String::new(),
            location: "Newsfeed".into(),
            url: "https://www.facebook.com/1".into(),
            image: String::new(),
            author: "Unknown".into(),
            uid: String::new(),
            keyword: String::new(),
            kind: ItemKind::Newsfeed,
            timestamp: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "newsfeed");
    }
}

//! Batch post-processing: URL canonicalization, dedup, keyword filtering.

use std::collections::HashMap;

use url::Url;

use crate::core::types::Item;

/// Canonical identity form of a post URL: query string and fragment removed.
///
/// Falls back to a plain `'?'` split when the input does not parse as an
/// absolute URL, so a weird-but-unique string still dedups against itself.
pub fn strip_query(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut u) => {
            u.set_query(None);
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => raw.split(['?', '#']).next().unwrap_or(raw).to_string(),
    }
}

/// Deduplicate by canonical URL, **last occurrence wins**.
///
/// Later captures of the same post carry fuller hydration (reactions,
/// attachments resolved), so the newer record replaces the older one.
/// Each surviving item's `url` is rewritten to the canonical form. Items
/// with an empty URL are dropped outright.
pub fn dedup_items(items: Vec<Item>) -> Vec<Item> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Item> = Vec::with_capacity(items.len());

    for mut item in items {
        let key = strip_query(&item.url);
        if key.is_empty() {
            continue;
        }
        item.url = key.clone();
        match slots.get(&key) {
            Some(&idx) => out[idx] = item,
            None => {
                slots.insert(key, out.len());
                out.push(item);
            }
        }
    }
    out
}

/// Retain items matching at least one keyword; AND within a keyword, OR
/// across keywords.
///
/// A keyword like `"laptop dell"` is split on whitespace and matches only
/// when **every** part occurs (case-insensitively) in the item's title or
/// full text. The first matching keyword is stamped into `Item::keyword`.
/// An empty keyword list keeps everything untouched.
pub fn filter_by_keywords(items: Vec<Item>, keywords: &[String]) -> Vec<Item> {
    let terms: Vec<(String, Vec<String>)> = keywords
        .iter()
        .filter_map(|k| {
            let trimmed = k.trim();
            if trimmed.is_empty() {
                return None;
            }
            let parts = trimmed
                .to_lowercase()
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>();
            Some((trimmed.to_string(), parts))
        })
        .collect();
    if terms.is_empty() {
        return items;
    }

    items
        .into_iter()
        .filter_map(|mut item| {
            let haystack = format!("{} {}", item.title, item.full_text).to_lowercase();
            let matched = terms
                .iter()
                .find(|(_, parts)| parts.iter().all(|p| haystack.contains(p)))?;
            item.keyword = matched.0.clone();
            Some(item)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ItemKind;

    fn item(url: &str, text: &str) -> Item {
        Item {
            title: crate::core::types::title_from_text(text),
            full_text: text.to_string(),
            price: String::new(),
            location: "Newsfeed".into(),
            url: url.to_string(),
            image: String::new(),
            author: "Unknown".into(),
            uid: String::new(),
            keyword: String::new(),
            kind: ItemKind::Newsfeed,
            timestamp: None,
        }
    }

    #[test]
    fn test_strip_query_removes_query_and_fragment() {
        assert_eq!(
            strip_query("https://www.facebook.com/123?ref=share#comments"),
            "https://www.facebook.com/123"
        );
    }

    #[test]
    fn test_strip_query_non_url_fallback() {
        assert_eq!(strip_query("not a url?x=1"), "not a url");
    }

    #[test]
    fn test_dedup_last_wins_and_canonicalizes() {
        let items = vec![
            item("https://www.facebook.com/1?a=1", "first capture"),
            item("https://www.facebook.com/2", "other post"),
            item("https://www.facebook.com/1?b=2", "fuller capture"),
        ];
        let out = dedup_items(items);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://www.facebook.com/1");
        assert_eq!(out[0].full_text, "fuller capture");
        assert_eq!(out[1].url, "https://www.facebook.com/2");
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let items = vec![
            item("https://www.facebook.com/1?a=1", "first"),
            item("https://www.facebook.com/1?b=2", "second"),
            item("https://www.facebook.com/2", "other"),
        ];
        let once = dedup_items(items);
        let urls: Vec<String> = once.iter().map(|i| i.url.clone()).collect();
        let twice = dedup_items(once);
        assert_eq!(
            twice.iter().map(|i| i.url.clone()).collect::<Vec<_>>(),
            urls
        );
    }

    #[test]
    fn test_dedup_drops_empty_urls() {
        let out = dedup_items(vec![item("", "ghost")]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_filter_and_within_keyword() {
        let items = vec![
            item("https://www.facebook.com/1", "Cần bán Laptop Dell Latitude"),
            item("https://www.facebook.com/2", "bán laptop hp cũ"),
        ];
        let out = filter_by_keywords(items, &["laptop dell".to_string()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://www.facebook.com/1");
        assert_eq!(out[0].keyword, "laptop dell");
    }

    #[test]
    fn test_filter_or_across_keywords() {
        let items = vec![
            item("https://www.facebook.com/1", "bán xe máy honda"),
            item("https://www.facebook.com/2", "cho thuê nhà nguyên căn"),
            item("https://www.facebook.com/3", "tuyển nhân viên bán hàng"),
        ];
        let out = filter_by_keywords(
            items,
            &["xe máy".to_string(), "thuê nhà".to_string()],
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_filter_empty_keywords_keeps_all() {
        let items = vec![item("https://www.facebook.com/1", "anything")];
        let out = filter_by_keywords(items, &[]);
        assert_eq!(out.len(), 1);
        // Blank keywords are treated the same as none.
        let items = vec![item("https://www.facebook.com/1", "anything")];
        let out = filter_by_keywords(items, &["  ".to_string()]);
        assert_eq!(out.len(), 1);
    }
}

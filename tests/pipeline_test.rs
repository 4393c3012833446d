//! Offline pipeline tests: captured-packet JSON in, harvested items out.
//!
//! Everything here runs without a browser — packets are fixtures shaped
//! like real feed traffic, fed through the same extract → dedup → filter
//! chain the harvest loop uses.

use serde_json::json;

use feed_scout::core::types::ItemKind;
use feed_scout::extract::postprocess::{dedup_items, filter_by_keywords};
use feed_scout::extract::{extract_items, ExtractCtx};
use feed_scout::harvest::{harvest_search, HarvestError, SearchTarget};
use feed_scout::{core::config::ScoutConfig, session_store};

#[test]
fn test_end_to_end_packet_to_single_item() {
    // One drain batch: the same story hydrated twice at different depths,
    // plus an unrelated story that the keyword filter must drop.
    let packet = json!({
        "data": {
            "viewer": {
                "news_feed": {
                    "edges": [
                        { "node": {
                            "__typename": "Story",
                            "message": { "text": "Cần bán laptop Dell giá 8.5tr, máy đẹp như mới" },
                            "wwwURL": "https://www.facebook.com/123?ref=x"
                        } },
                        { "node": {
                            "__typename": "Story",
                            "message": { "text": "cho thuê phòng trọ quận 3 giá rẻ" },
                            "wwwURL": "https://www.facebook.com/456"
                        } }
                    ]
                }
            }
        }
    });
    // Later capture of the same story, now fully hydrated — last-write-wins
    // dedup keeps this richer record.
    let rehydration = json!({
        "content": { "story": {
            "message": { "text": "Cần bán laptop Dell giá 8.5tr, máy đẹp như mới" },
            "wwwURL": "https://www.facebook.com/123?ref=y&src=feed",
            "actors": [ { "name": "Trần B", "id": "555" } ],
            "creation_time": 1722900000
        } }
    });

    let mut ctx = ExtractCtx::new("Newsfeed", "", ItemKind::Newsfeed);
    let mut items = extract_items(&packet, &mut ctx);
    println!("first packet: {} items", items.len());

    // A later drain starts a fresh context, as a new batch would.
    let mut ctx2 = ExtractCtx::new("Newsfeed", "", ItemKind::Newsfeed);
    items.extend(extract_items(&rehydration, &mut ctx2));
    println!("after rehydration packet: {} items", items.len());
    assert_eq!(items.len(), 3, "2 stories + 1 cross-batch duplicate");

    let deduped = dedup_items(items);
    assert_eq!(deduped.len(), 2, "duplicate collapses on canonical URL");

    let filtered = filter_by_keywords(deduped, &["laptop dell".to_string()]);
    assert_eq!(filtered.len(), 1);

    let item = &filtered[0];
    println!("final item: {}", serde_json::to_string_pretty(item).unwrap());
    assert_eq!(item.url, "https://www.facebook.com/123");
    assert!(item.price.contains("8.5tr"), "price was {:?}", item.price);
    assert_eq!(item.keyword, "laptop dell");
    assert_eq!(item.kind, ItemKind::Newsfeed);
    assert_eq!(item.author, "Trần B");
    assert!(item.timestamp.is_some());
}

#[test]
fn test_marketplace_style_packet() {
    let packet = json!({
        "data": { "marketplace_search": { "feed_units": { "edges": [
            { "node": {
                "__typename": "Story",
                "message": { "text": "Bán iPhone 13 Pro Max 256GB giá 15.5tr" },
                "post_id": "889900",
                "attachments": [ { "media": { "image": {
                    "uri": "https://scontent.fhan2-1.fna.fbcdn.net/photo.jpg"
                } } } ]
            } }
        ] } } }
    });

    let mut ctx = ExtractCtx::new("Marketplace", "iphone", ItemKind::Marketplace);
    let items = extract_items(&packet, &mut ctx);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].url, "https://www.facebook.com/889900");
    assert_eq!(items[0].price, "15.5tr");
    assert!(items[0].image.contains("fbcdn"));
    assert_eq!(items[0].location, "Marketplace");
}

#[tokio::test]
async fn test_session_roundtrip_and_missing_session_error() {
    // Point session storage at a scratch directory so this test never
    // touches a real ~/.feed-scout.
    let scratch = std::env::temp_dir().join(format!(
        "feed-scout-test-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_millis()
    ));
    std::env::set_var("FEED_SCOUT_SESSION_DIR", &scratch);

    // No session saved yet: harvest must fail fast, before any browser work.
    let cfg = ScoutConfig::default();
    let err = harvest_search(
        "fresh-account",
        &["laptop".to_string()],
        SearchTarget::Marketplace,
        &cfg,
    )
    .await
    .unwrap_err();
    println!("pre-login harvest error: {}", err);
    assert!(matches!(err, HarvestError::NoCookie));

    // Save a cookie set, then load it back through the hashed slot.
    let cookies = vec![
        json!({ "name": "c_user", "value": "100042", "domain": ".facebook.com" }),
        json!({ "name": "xs", "value": "abc", "domain": ".facebook.com" }),
    ];
    session_store::save_cookies("fresh-account", &cookies).unwrap();

    let loaded = session_store::load_cookies("fresh-account").expect("session should load");
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0]["name"], "c_user");

    // The file on disk is keyed by the account hash, not the raw id.
    let path = session_store::session_path("fresh-account").unwrap();
    assert!(path.exists());
    assert!(!path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .contains("fresh-account"));

    std::fs::remove_dir_all(&scratch).ok();
    std::env::remove_var("FEED_SCOUT_SESSION_DIR");
}

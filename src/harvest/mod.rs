//! Harvest orchestration — the two top-level entry points.
//!
//! [`harvest_search`] runs one keyword-driven pass over a search surface
//! (marketplace, group posts, or general post search); [`harvest_feed`]
//! scrolls a single feed URL. Both are thin frontends over the same engine:
//! a [`HarvestSession`] (browser + page + capture channel, cookies injected
//! before any navigation) and one [`scroll_and_drain`] loop that alternates
//! jittered scroll ticks with channel drains and feeds every drained packet
//! through the extractor.
//!
//! Failure taxonomy (see [`HarvestError`]): a missing or expired session is
//! fatal for the whole invocation; a single keyword failing mid-search is
//! logged and the remaining keywords still run. The browser is closed on
//! every exit path.

use std::time::Duration;

use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::config::ScoutConfig;
use crate::core::types::{CookieSet, HarvestOutcome, Item, ItemKind};
use crate::extract::postprocess::{dedup_items, filter_by_keywords, strip_query};
use crate::extract::story::extract_price;
use crate::extract::{extract_items, ExtractCtx, MIN_TEXT_CHARS};
use crate::features::session_store;
use crate::scraping::browser_manager;
use crate::scraping::interceptor::CaptureChannel;

/// Caller-facing failure taxonomy for one harvest invocation.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// No stored session for this account. Checked before the browser
    /// launches, so the caller pays nothing for a doomed run.
    #[error("no saved session for this account — run the login flow first")]
    NoCookie,
    /// The platform bounced an authenticated navigation back to a login or
    /// checkpoint route: the stored cookies no longer work.
    #[error("stored session was rejected — log in again to refresh it")]
    CookieInvalid,
    #[error("navigation to {0} timed out")]
    NavigationTimeout(String),
    #[error("browser launch failed: {0}")]
    BrowserLaunchFailed(String),
    #[error("browser automation failed: {0}")]
    AutomationFailed(String),
}

// ── Search targets ───────────────────────────────────────────────────────────

/// Which search surface a keyword pass runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTarget {
    Marketplace,
    Group,
    General,
}

impl SearchTarget {
    /// Search URL for one keyword, query-encoded.
    pub fn search_url(self, keyword: &str) -> String {
        let (base, param) = match self {
            SearchTarget::Marketplace => {
                ("https://www.facebook.com/marketplace/search/", "query")
            }
            SearchTarget::Group => ("https://www.facebook.com/groups/search/posts/", "q"),
            SearchTarget::General => ("https://www.facebook.com/search/posts/", "q"),
        };
        match url::Url::parse(base) {
            Ok(mut u) => {
                u.query_pairs_mut().append_pair(param, keyword);
                u.to_string()
            }
            // Bases are compile-time constants; this arm is unreachable in
            // practice but keeps the signature infallible.
            Err(_) => format!("{}?{}={}", base, param, keyword),
        }
    }

    fn kind(self) -> ItemKind {
        match self {
            SearchTarget::Marketplace => ItemKind::Marketplace,
            SearchTarget::Group => ItemKind::GroupPost,
            SearchTarget::General => ItemKind::Newsfeed,
        }
    }

    fn location_label(self) -> &'static str {
        match self {
            SearchTarget::Marketplace => "Marketplace",
            SearchTarget::Group => "Group/Feed",
            SearchTarget::General => "Newsfeed",
        }
    }

    fn scroll_cycles(self, cfg: &ScoutConfig) -> usize {
        match self {
            SearchTarget::Marketplace => cfg.resolve_marketplace_scrolls(),
            _ => cfg.resolve_search_scrolls(),
        }
    }
}

// ── Session engine ───────────────────────────────────────────────────────────

/// One live authenticated browser session: launched browser, its CDP event
/// drain task, one page with the capture channel attached and the stored
/// cookies injected. Both harvest modes run on this same engine.
struct HarvestSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
    channel: CaptureChannel,
}

impl HarvestSession {
    async fn open(cookies: &CookieSet, cfg: &ScoutConfig) -> Result<Self, HarvestError> {
        let exe = browser_manager::find_chrome_executable().ok_or_else(|| {
            HarvestError::BrowserLaunchFailed(
                "no Chromium-family browser found (install Chrome, Chromium, or Brave)".into(),
            )
        })?;

        let config = if cfg.resolve_headful() {
            browser_manager::build_headful_config(&exe)
        } else {
            browser_manager::build_headless_config(&exe, 1366, 900)
        }
        .map_err(|e| HarvestError::BrowserLaunchFailed(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::BrowserLaunchFailed(format!("{} ({})", e, exe)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        // Page setup can still fail; tear the browser down ourselves since
        // the caller never sees a session on the error path.
        let setup: Result<(Page, CaptureChannel), HarvestError> = async {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| HarvestError::AutomationFailed(format!("new page: {}", e)))?;
            let channel = CaptureChannel::attach(&page)
                .await
                .map_err(|e| HarvestError::AutomationFailed(e.to_string()))?;
            session_store::inject_into_page(&page, cookies).await;
            Ok((page, channel))
        }
        .await;

        match setup {
            Ok((page, channel)) => Ok(Self {
                browser,
                handler_task,
                page,
                channel,
            }),
            Err(e) => {
                let mut browser = browser;
                browser.close().await.ok();
                handler_task.abort();
                Err(e)
            }
        }
    }

    /// Navigate, wait for the network to settle, and verify the session was
    /// not bounced to a login route.
    async fn navigate(&self, url: &str, cfg: &ScoutConfig) -> Result<(), HarvestError> {
        let timeout = Duration::from_millis(cfg.resolve_nav_timeout_ms());
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => return Err(HarvestError::NavigationTimeout(url.to_string())),
            Ok(Err(e)) => {
                return Err(HarvestError::AutomationFailed(format!("goto {}: {}", url, e)))
            }
            Ok(Ok(_)) => {}
        }
        browser_manager::wait_until_stable(&self.page, 1_500, cfg.resolve_nav_timeout_ms())
            .await
            .map_err(|e| HarvestError::AutomationFailed(e.to_string()))?;

        // An authenticated navigation that lands on a login/checkpoint route
        // means the injected session was rejected.
        let current = self.page.url().await.ok().flatten().unwrap_or_default();
        if current.contains("/login")
            || current.contains("login.php")
            || current.contains("checkpoint")
        {
            return Err(HarvestError::CookieInvalid);
        }
        Ok(())
    }

    /// The shared harvest core: `ticks` jittered scroll steps, draining the
    /// capture channel and extracting after each. With `long_pause_every`
    /// set, every Nth tick is followed by a longer cool-down pause.
    async fn scroll_and_drain(
        &self,
        ticks: usize,
        long_pause_every: Option<usize>,
        ctx: &mut ExtractCtx,
    ) -> Vec<Item> {
        let mut items: Vec<Item> = Vec::new();
        for tick in 1..=ticks {
            browser_manager::scroll_tick(&self.page).await;
            for packet in self.channel.drain().await {
                items.extend(extract_items(&packet, ctx));
            }
            info!("scroll tick {}/{}: {} items so far", tick, ticks, items.len());
            if let Some(every) = long_pause_every {
                if tick % every == 0 && tick < ticks {
                    browser_manager::rate_limit_pause().await;
                }
            }
        }
        items
    }

    async fn close(mut self) {
        self.browser.close().await.ok();
        self.handler_task.abort();
    }
}

// ── Keyword search harvest ───────────────────────────────────────────────────

/// Run one search harvest: every keyword against `target`, results merged
/// and deduplicated across keywords.
///
/// A keyword whose pass fails with anything other than [`HarvestError::CookieInvalid`]
/// is logged and skipped; the invalid-session signal aborts the whole run
/// since every later keyword would bounce the same way.
pub async fn harvest_search(
    account_id: &str,
    keywords: &[String],
    target: SearchTarget,
    cfg: &ScoutConfig,
) -> Result<HarvestOutcome, HarvestError> {
    let cookies = session_store::load_cookies(account_id).ok_or(HarvestError::NoCookie)?;
    let session = HarvestSession::open(&cookies, cfg).await?;

    let result: Result<Vec<Item>, HarvestError> = async {
        let mut all: Vec<Item> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                continue;
            }
            info!("🔍 search pass: {:?} / {:?}", target, keyword);
            match search_pass(&session, keyword, target, cfg).await {
                Ok(items) => {
                    info!("search pass {:?} yielded {} items", keyword, items.len());
                    all.extend(items);
                }
                Err(HarvestError::CookieInvalid) => return Err(HarvestError::CookieInvalid),
                Err(e) => {
                    warn!("search pass {:?} failed ({}) — continuing", keyword, e);
                }
            }
        }
        Ok(all)
    }
    .await;

    session.close().await;

    let items = dedup_items(result?);
    info!("harvest_search: {} unique items", items.len());
    Ok(HarvestOutcome::new(items))
}

async fn search_pass(
    session: &HarvestSession,
    keyword: &str,
    target: SearchTarget,
    cfg: &ScoutConfig,
) -> Result<Vec<Item>, HarvestError> {
    session.navigate(&target.search_url(keyword), cfg).await?;
    session.channel.reset().await;

    let mut ctx = ExtractCtx::new(target.location_label(), keyword, target.kind());
    let mut items = session
        .scroll_and_drain(target.scroll_cycles(cfg), None, &mut ctx)
        .await;

    // Marketplace renders some result grids without a corresponding data
    // fetch; fall back to scraping the rendered DOM when the channel caught
    // nothing.
    if items.is_empty() && target == SearchTarget::Marketplace {
        info!("marketplace channel empty for {:?} — trying DOM fallback", keyword);
        let html = session
            .page
            .content()
            .await
            .map_err(|e| HarvestError::AutomationFailed(format!("page content: {}", e)))?;
        items = marketplace_dom_fallback(&html, keyword);
        info!("DOM fallback yielded {} items", items.len());
    }

    Ok(items)
}

// ── Marketplace DOM fallback ─────────────────────────────────────────────────

/// Scrape marketplace result cards straight out of rendered HTML.
///
/// Each card is an anchor to `/marketplace/item/…`; its inner text chunks
/// carry price / title / location in visual order. Heuristics: the longest
/// chunk is the title, the first price-looking chunk is the price, and a
/// trailing short non-price chunk is the location.
pub fn marketplace_dom_fallback(html: &str, keyword: &str) -> Vec<Item> {
    let document = scraper::Html::parse_document(html);
    let Ok(selector) = scraper::Selector::parse(r#"a[href*="/marketplace/item/"]"#) else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let absolute = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("https://www.facebook.com{}", href)
        };
        let url = strip_query(&absolute);

        let chunks: Vec<String> = anchor
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let full_text = chunks.join("\n");
        if full_text.chars().count() < MIN_TEXT_CHARS {
            continue;
        }

        let price = chunks
            .iter()
            .map(|c| extract_price(c))
            .find(|p| !p.is_empty())
            .unwrap_or_default();
        let title_line = chunks
            .iter()
            .max_by_key(|c| c.chars().count())
            .cloned()
            .unwrap_or_else(|| full_text.clone());
        let location = chunks
            .last()
            .filter(|c| c.chars().count() < 40 && extract_price(c).is_empty())
            .cloned()
            .unwrap_or_else(|| "Marketplace".to_string());

        items.push(Item {
            title: crate::core::types::title_from_text(&title_line),
            full_text,
            price,
            location,
            url,
            image: String::new(),
            author: "Unknown".to_string(),
            uid: String::new(),
            keyword: keyword.to_string(),
            kind: ItemKind::Marketplace,
            timestamp: None,
        });
    }
    items
}

// ── Feed harvest ─────────────────────────────────────────────────────────────

/// Scroll one feed URL for `scrolls` ticks, draining the capture channel
/// after each tick. Every fifth tick inserts a longer cool-down pause.
///
/// Group URLs produce [`ItemKind::GroupPost`] items labelled `Group/Feed`;
/// anything else is treated as the home feed. When `keywords` is non-empty
/// the deduplicated result is additionally keyword-filtered.
pub async fn harvest_feed(
    account_id: &str,
    feed_url: &str,
    scrolls: usize,
    keywords: &[String],
    cfg: &ScoutConfig,
) -> Result<HarvestOutcome, HarvestError> {
    let cookies = session_store::load_cookies(account_id).ok_or(HarvestError::NoCookie)?;

    let (kind, location) = if feed_url.contains("/groups/") {
        (ItemKind::GroupPost, "Group/Feed")
    } else {
        (ItemKind::Newsfeed, "Newsfeed")
    };

    let session = HarvestSession::open(&cookies, cfg).await?;

    let result: Result<Vec<Item>, HarvestError> = async {
        session.navigate(feed_url, cfg).await?;
        session.channel.reset().await;

        let mut ctx = ExtractCtx::new(location, "", kind);
        Ok(session.scroll_and_drain(scrolls, Some(5), &mut ctx).await)
    }
    .await;

    session.close().await;

    let mut items = dedup_items(result?);
    if !keywords.is_empty() {
        items = filter_by_keywords(items, keywords);
    }
    info!("harvest_feed: {} items after dedup/filter", items.len());
    Ok(HarvestOutcome::new(items))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_urls_are_encoded() {
        let url = SearchTarget::Marketplace.search_url("laptop dell cũ");
        assert!(url.starts_with("https://www.facebook.com/marketplace/search/?query="));
        assert!(!url.contains(' '));

        let url = SearchTarget::Group.search_url("nhà đất");
        assert!(url.starts_with("https://www.facebook.com/groups/search/posts/?q="));

        let url = SearchTarget::General.search_url("xe máy");
        assert!(url.starts_with("https://www.facebook.com/search/posts/?q="));
    }

    #[test]
    fn test_target_kinds_and_labels() {
        assert_eq!(SearchTarget::Marketplace.kind(), ItemKind::Marketplace);
        assert_eq!(SearchTarget::Group.kind(), ItemKind::GroupPost);
        assert_eq!(SearchTarget::Marketplace.location_label(), "Marketplace");
        assert_eq!(SearchTarget::Group.location_label(), "Group/Feed");
    }

    #[test]
    fn test_marketplace_dom_fallback_parses_cards() {
        let html = r#"
            <html><body>
              <a href="/marketplace/item/111222333/?ref=search">
                <span>8.500.000đ</span>
                <span>Laptop Dell Latitude 7490 core i7 ram 16GB</span>
                <span>Hà Nội</span>
              </a>
              <a href="/marketplace/item/444555666/">
                <span>x</span>
              </a>
              <a href="/profile/123">not a card</a>
            </body></html>
        "#;
        let items = marketplace_dom_fallback(html, "laptop");
        assert_eq!(items.len(), 1, "short-text and non-item anchors are skipped");
        let item = &items[0];
        assert_eq!(item.url, "https://www.facebook.com/marketplace/item/111222333/");
        assert_eq!(item.price, "8.500.000đ");
        assert!(item.title.contains("Laptop Dell"));
        assert_eq!(item.location, "Hà Nội");
        assert_eq!(item.keyword, "laptop");
        assert_eq!(item.kind, ItemKind::Marketplace);
    }

    #[tokio::test]
    async fn test_missing_session_fails_before_browser_launch() {
        let cfg = ScoutConfig::default();
        let err = harvest_search(
            "account-with-no-session-at-all-93c1",
            &["laptop".to_string()],
            SearchTarget::Marketplace,
            &cfg,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarvestError::NoCookie));
    }
}

//! Session cookie persistence — load / save / inject helpers.
//!
//! Real authentication happens interactively inside a visible browser window
//! ([`interactive_login`]); the captured cookies are saved to
//! `~/.feed-scout/sessions/{sha256(account_id)}.json`. Harvest sessions load
//! that cookie set and inject it into the CDP page *before* navigation so the
//! feed loads already authenticated.
//!
//! The account identifier is opaque to this engine — it is only a storage
//! key, never sent anywhere. Keying by a one-way hash keeps account ids out
//! of filenames.

use anyhow::{anyhow, Result};
use chromiumoxide::Page;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{info, warn};

use crate::core::config::{ScoutConfig, ENV_SESSION_DIR};
use crate::core::types::CookieSet;
use crate::scraping::browser_manager;

const LOGIN_URL: &str = "https://www.facebook.com/login";
const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Cookie the platform sets for every authenticated user; its presence is
/// the post-login signal the interactive flow polls for.
const AUTH_COOKIE_NAME: &str = "c_user";

// ─────────────────────────────────────────────────────────────────────────────
// Account key utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic storage slot for an account identifier.
///
/// The id is normalized (trimmed, lower-cased) before hashing so
/// `" My.Account "` and `"my.account"` map to the same slot.
pub fn account_key(account_id: &str) -> String {
    let normalized = account_id.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{:x}", digest)
}

fn sessions_dir() -> Option<std::path::PathBuf> {
    if let Ok(dir) = std::env::var(ENV_SESSION_DIR) {
        let dir = dir.trim();
        if !dir.is_empty() {
            return Some(std::path::PathBuf::from(dir));
        }
    }
    let home = dirs::home_dir()?;
    Some(home.join(".feed-scout").join("sessions"))
}

/// Return the full path to the session file for an account.
pub fn session_path(account_id: &str) -> Option<std::path::PathBuf> {
    Some(sessions_dir()?.join(format!("{}.json", account_key(account_id))))
}

// ─────────────────────────────────────────────────────────────────────────────
// Load / save
// ─────────────────────────────────────────────────────────────────────────────

/// Load the stored cookie set for an account.
///
/// Returns `None` when no session file exists for this account, or when the
/// file is empty / unreadable — the caller surfaces that as its `NoCookie`
/// condition. Never panics on a missing session.
pub fn load_cookies(account_id: &str) -> Option<CookieSet> {
    let path = session_path(account_id)?;
    if !path.exists() {
        return None;
    }
    let content = std::fs::read_to_string(&path).ok()?;
    let cookies: CookieSet = serde_json::from_str(&content).ok()?;
    if cookies.is_empty() {
        return None;
    }
    info!(
        "session_store: 🍪 loaded {} cookies for account slot {} ({})",
        cookies.len(),
        &account_key(account_id)[..12],
        path.display()
    );
    Some(cookies)
}

/// Persist a cookie set for an account, creating the sessions directory on
/// demand. Written once, after a successful interactive login; immutable for
/// the duration of any scrape session.
pub fn save_cookies(account_id: &str, cookies: &CookieSet) -> Result<()> {
    let dir = sessions_dir().ok_or_else(|| anyhow!("No home directory for session storage"))?;
    std::fs::create_dir_all(&dir)
        .map_err(|e| anyhow!("Failed to create session dir {}: {}", dir.display(), e))?;
    let path = dir.join(format!("{}.json", account_key(account_id)));
    let body = serde_json::to_string_pretty(cookies)
        .map_err(|e| anyhow!("Failed to serialize cookies: {}", e))?;
    std::fs::write(&path, body)
        .map_err(|e| anyhow!("Failed to write session file {}: {}", path.display(), e))?;
    info!(
        "session_store: saved {} cookies to {}",
        cookies.len(),
        path.display()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Inject
// ─────────────────────────────────────────────────────────────────────────────

/// Inject stored session cookies into a live CDP page **before** navigation.
///
/// Cookies are deserialized from raw JSON into chromiumoxide `CookieParam`s
/// and set via the `Network.setCookies` CDP command. Any individual cookie
/// that fails to deserialize is silently skipped so a partially-malformed
/// session file never blocks a scrape.
pub async fn inject_into_page(page: &Page, cookies: &CookieSet) {
    use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};

    let cookie_params: Vec<CookieParam> = cookies
        .iter()
        .filter_map(|v| serde_json::from_value::<CookieParam>(v.clone()).ok())
        .collect();

    if cookie_params.is_empty() {
        warn!("session_store: stored session contained no valid CookieParams — skipping injection");
        return;
    }

    let count = cookie_params.len();
    match page.execute(SetCookiesParams::new(cookie_params)).await {
        Ok(_) => info!("session_store: 💉 injected {} session cookies", count),
        Err(e) => warn!("session_store: failed to inject session cookies: {}", e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Interactive login capture
// ─────────────────────────────────────────────────────────────────────────────

/// Launch a **visible** browser at the platform login page, wait for the
/// human to complete authentication, then capture and persist the session
/// cookies for `account_id`.
///
/// Completion is detected by polling a post-login signal every couple of
/// seconds: the page URL no longer points at a login / checkpoint route AND
/// the auth cookie is present. The configured wait cap is only the upper
/// bound on that poll, not the detection mechanism, so fast and slow logins
/// both work.
///
/// Returns the number of cookies captured.
pub async fn interactive_login(account_id: &str, cfg: &ScoutConfig) -> Result<usize> {
    let exe = browser_manager::find_chrome_executable()
        .ok_or_else(|| anyhow!("No browser found. Install Chrome, Chromium, or Brave."))?;

    info!("session_store: launching visible browser for login ({})", exe);
    let config = browser_manager::build_headful_config(&exe)?;
    let (mut browser, mut handler) = chromiumoxide::Browser::launch(config)
        .await
        .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

    let handle = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    });

    let result: Result<usize> = async {
        let page = browser
            .new_page(LOGIN_URL)
            .await
            .map_err(|e| anyhow!("Failed to open login page: {}", e))?;

        info!(
            "session_store: complete the login in the browser window (up to {}s)…",
            cfg.resolve_login_wait_secs()
        );

        let deadline =
            std::time::Instant::now() + Duration::from_secs(cfg.resolve_login_wait_secs());
        loop {
            if std::time::Instant::now() >= deadline {
                return Err(anyhow!(
                    "Timed out after {}s waiting for login to complete",
                    cfg.resolve_login_wait_secs()
                ));
            }
            tokio::time::sleep(LOGIN_POLL_INTERVAL).await;

            let current = page.url().await.ok().flatten().unwrap_or_default();
            if current.contains("login") || current.contains("checkpoint") {
                continue;
            }

            let cookies = match page.get_cookies().await {
                Ok(c) => c,
                Err(e) => {
                    warn!("session_store: cookie probe failed (retrying): {}", e);
                    continue;
                }
            };
            if !cookies.iter().any(|c| c.name == AUTH_COOKIE_NAME) {
                continue;
            }

            let raw: CookieSet = cookies
                .iter()
                .filter_map(|c| serde_json::to_value(c).ok())
                .collect();
            save_cookies(account_id, &raw)?;
            info!(
                "session_store: login detected — captured {} cookies",
                raw.len()
            );
            return Ok(raw.len());
        }
    }
    .await;

    browser.close().await.ok();
    handle.abort();
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

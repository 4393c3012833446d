use std::path::Path;

// ---------------------------------------------------------------------------
// ScoutConfig — file-based config loader (feed-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

/// Top-level config loaded from `feed-scout.json`.
///
/// Every field is optional; resolution order for each knob is
/// JSON field → env var → built-in default.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ScoutConfig {
    /// Navigation time budget per URL, in milliseconds.
    pub nav_timeout_ms: Option<u64>,
    /// Scroll+drain cycles for a marketplace search pass.
    pub marketplace_scrolls: Option<usize>,
    /// Scroll+drain cycles for group / generic search passes.
    pub search_scrolls: Option<usize>,
    /// Upper bound on the interactive-login wait, in seconds. Detection is a
    /// poll for a post-login page signal; this cap only bounds it.
    pub login_wait_secs: Option<u64>,
    /// Launch the harvest browser with a visible window (debugging).
    pub headful: Option<bool>,
}

impl ScoutConfig {
    /// Per-navigation timeout: JSON field → `FEED_SCOUT_NAV_TIMEOUT_MS` → 45 000.
    pub fn resolve_nav_timeout_ms(&self) -> u64 {
        if let Some(n) = self.nav_timeout_ms {
            return n;
        }
        std::env::var("FEED_SCOUT_NAV_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(45_000)
    }

    /// Marketplace scroll cycles: JSON field → `FEED_SCOUT_MARKETPLACE_SCROLLS` → 6.
    pub fn resolve_marketplace_scrolls(&self) -> usize {
        if let Some(n) = self.marketplace_scrolls {
            return n;
        }
        std::env::var("FEED_SCOUT_MARKETPLACE_SCROLLS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(6)
    }

    /// Group / generic search scroll cycles: JSON field → `FEED_SCOUT_SEARCH_SCROLLS` → 4.
    pub fn resolve_search_scrolls(&self) -> usize {
        if let Some(n) = self.search_scrolls {
            return n;
        }
        std::env::var("FEED_SCOUT_SEARCH_SCROLLS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4)
    }

    /// Login wait cap: JSON field → `FEED_SCOUT_LOGIN_WAIT_SECS` → 180.
    pub fn resolve_login_wait_secs(&self) -> u64 {
        if let Some(n) = self.login_wait_secs {
            return n;
        }
        std::env::var("FEED_SCOUT_LOGIN_WAIT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(180)
    }

    /// Headful harvest browser: JSON field → `FEED_SCOUT_HEADFUL` → false.
    pub fn resolve_headful(&self) -> bool {
        if let Some(b) = self.headful {
            return b;
        }
        std::env::var("FEED_SCOUT_HEADFUL")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false)
    }
}

/// Load `feed-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `FEED_SCOUT_CONFIG` env var path
/// 2. `./feed-scout.json`  (process cwd)
/// 3. `../feed-scout.json` (one level up)
///
/// Missing file → `ScoutConfig::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `ScoutConfig::default()`.
pub fn load_scout_config() -> ScoutConfig {
    let candidates: Vec<std::path::PathBuf> = {
        let mut v = vec![
            std::path::PathBuf::from("feed-scout.json"),
            std::path::PathBuf::from("../feed-scout.json"),
        ];
        if let Ok(env_path) = std::env::var("FEED_SCOUT_CONFIG") {
            v.insert(0, std::path::PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ScoutConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("feed-scout.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "feed-scout.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return ScoutConfig::default();
                }
            },
            Err(_) => continue, // file not found at this path — try next
        }
    }

    ScoutConfig::default()
}

// ---------------------------------------------------------------------------

pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_SESSION_DIR: &str = "FEED_SCOUT_SESSION_DIR";

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see
/// `scraping::browser_manager::find_chrome_executable()`). This function only
/// returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file_or_env() {
        let cfg = ScoutConfig::default();
        assert_eq!(cfg.resolve_nav_timeout_ms(), 45_000);
        assert_eq!(cfg.resolve_marketplace_scrolls(), 6);
        assert_eq!(cfg.resolve_search_scrolls(), 4);
        assert_eq!(cfg.resolve_login_wait_secs(), 180);
        assert!(!cfg.resolve_headful());
    }

    #[test]
    fn test_json_fields_win() {
        let cfg: ScoutConfig =
            serde_json::from_str(r#"{"nav_timeout_ms": 10000, "search_scrolls": 2}"#).unwrap();
        assert_eq!(cfg.resolve_nav_timeout_ms(), 10_000);
        assert_eq!(cfg.resolve_search_scrolls(), 2);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.resolve_marketplace_scrolls(), 6);
    }
}

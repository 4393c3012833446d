//! In-page network capture channel.
//!
//! The feed page fetches its content through internal data-endpoint calls
//! whose bodies are newline-delimited JSON. We wrap the page's two native
//! request mechanisms (`fetch`, `XMLHttpRequest`) with transparent proxies
//! that observe every response without altering request/response behavior,
//! filter by the data-endpoint marker, split and parse the body per line, and
//! keep only records that pass a relevance heuristic.
//!
//! Matching records accumulate in an in-page buffer+counter pair. The host
//! side treats that pair as a message-passing channel: [`CaptureChannel::drain`]
//! reads **and clears** the buffer in a single JS evaluation (one JS turn, so
//! the operation is atomic from the host's perspective), and a full page
//! navigation destroys the in-page state — which is why the wrapper script is
//! registered via `AddScriptToEvaluateOnNewDocument`, re-establishing the
//! channel on every new document before any page script runs.

use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use tracing::{debug, warn};

use crate::core::types::CapturedPacket;

/// URL fragment identifying the page's internal data endpoint.
pub const DATA_ENDPOINT_MARKER: &str = "/api/graphql";

/// Capture script installed before navigation.
///
/// Relevance heuristic, two tiers:
/// * tier 1 — the serialized record contains any *specific* structural marker
///   known to wrap a feed story;
/// * tier 2 — generic combination: a story marker AND a message/text marker
///   AND one of timestamp / author / URL markers.
///
/// Tier 2 keeps shapes we have not hard-coded; tier 1 keeps known shapes even
/// when their text fields are named unusually. Per-line parse failures are
/// swallowed so one garbled record never drops its siblings.
pub const CAPTURE_SCRIPT: &str = r#"
(function () {
    'use strict';
    if (window.__fsInstalled) { return; }
    window.__fsInstalled = true;
    window.__fsPackets = [];
    window.__fsPacketCount = 0;

    var ENDPOINT_MARKER = '/api/graphql';

    var SPECIFIC_MARKERS = [
        '"__typename":"Story"',
        'feedback_context',
        '"content":{"story"',
        'attached_story',
        'comet_sections'
    ];

    function isRelevant(record) {
        var s;
        try { s = JSON.stringify(record); } catch (e) { return false; }
        for (var i = 0; i < SPECIFIC_MARKERS.length; i++) {
            if (s.indexOf(SPECIFIC_MARKERS[i]) !== -1) { return true; }
        }
        var hasStory = s.indexOf('"story"') !== -1 || s.indexOf('Story') !== -1;
        var hasMessage = s.indexOf('"message"') !== -1 || s.indexOf('"text"') !== -1;
        var hasAnchor = s.indexOf('creation_time') !== -1 ||
                        s.indexOf('"actors"') !== -1 ||
                        s.indexOf('wwwURL') !== -1 ||
                        s.indexOf('"url"') !== -1;
        return hasStory && hasMessage && hasAnchor;
    }

    function ingest(bodyText, url) {
        if (!url || String(url).indexOf(ENDPOINT_MARKER) === -1) { return; }
        var lines = String(bodyText).split('\n');
        for (var i = 0; i < lines.length; i++) {
            var line = lines[i].trim();
            if (!line) { continue; }
            var parsed;
            try { parsed = JSON.parse(line); } catch (e) { continue; }
            if (isRelevant(parsed)) {
                window.__fsPackets.push(parsed);
                window.__fsPacketCount++;
            }
        }
    }

    var originalFetch = window.fetch;
    window.fetch = function () {
        var args = arguments;
        var reqUrl = (args[0] && args[0].url) ? args[0].url : args[0];
        return originalFetch.apply(this, args).then(function (response) {
            try {
                var clone = response.clone();
                clone.text().then(function (body) {
                    ingest(body, reqUrl || response.url);
                }).catch(function () {});
            } catch (e) {}
            return response;
        });
    };

    var originalOpen = XMLHttpRequest.prototype.open;
    XMLHttpRequest.prototype.open = function (method, url) {
        this.__fsUrl = url;
        return originalOpen.apply(this, arguments);
    };
    var originalSend = XMLHttpRequest.prototype.send;
    XMLHttpRequest.prototype.send = function () {
        var xhr = this;
        xhr.addEventListener('load', function () {
            try { ingest(xhr.responseText, xhr.__fsUrl); } catch (e) {}
        });
        return originalSend.apply(this, arguments);
    };
})();
"#;

const DRAIN_SCRIPT: &str = r#"
(function () {
    var buf = window.__fsPackets || [];
    window.__fsPackets = [];
    window.__fsPacketCount = 0;
    try { return JSON.stringify(buf); } catch (e) { return '[]'; }
})()
"#;

const RESET_SCRIPT: &str = "window.__fsPackets = []; window.__fsPacketCount = 0;";

/// Host-side handle to the in-page capture buffer of one page.
///
/// Lifecycle: [`attach`](CaptureChannel::attach) before the first navigation;
/// the registered script then re-establishes the in-page side on every
/// subsequent navigation automatically. [`reset`](CaptureChannel::reset)
/// after each navigation settles to discard initial-load noise;
/// [`drain`](CaptureChannel::drain) once per scroll tick.
pub struct CaptureChannel {
    page: Page,
}

impl CaptureChannel {
    /// Register the capture script on `page` so it runs before any page
    /// script on every new document. Must be called before navigation — a
    /// post-navigation install would miss the initial burst of feed requests.
    pub async fn attach(page: &Page) -> Result<Self> {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(CAPTURE_SCRIPT))
            .await
            .map_err(|e| anyhow!("Failed to install capture script: {}", e))?;
        Ok(Self { page: page.clone() })
    }

    /// Clear the in-page buffer. Errors are logged and ignored: a reset that
    /// fails just means the next drain carries a little pre-scroll noise.
    pub async fn reset(&self) {
        if let Err(e) = self.page.evaluate(RESET_SCRIPT).await {
            warn!("capture channel reset failed: {}", e);
        }
    }

    /// Read-and-clear the buffered packets.
    ///
    /// The buffer is serialized and emptied in one JS evaluation, so packets
    /// arriving concurrently land in the *next* drain rather than being lost.
    /// Evaluation failures and unparseable payloads yield an empty batch —
    /// a drain never fails the harvest.
    pub async fn drain(&self) -> Vec<CapturedPacket> {
        let payload = match self.page.evaluate(DRAIN_SCRIPT).await {
            Ok(v) => v.into_value::<String>().unwrap_or_default(),
            Err(e) => {
                warn!("capture channel drain failed: {}", e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<CapturedPacket>>(&payload) {
            Ok(packets) => {
                if !packets.is_empty() {
                    debug!("drained {} captured packets", packets.len());
                }
                packets
            }
            Err(e) => {
                warn!("capture channel returned unparseable payload: {}", e);
                Vec::new()
            }
        }
    }
}

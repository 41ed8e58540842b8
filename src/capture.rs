use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::{sync::oneshot, task::JoinHandle, time::{timeout, timeout_at, Instant}};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::{MonitorError, MonitorResult};

/// Keys that identify an instrument in a candidate record.
pub const IDENTITY_FIELDS: &[&str] = &["symbol", "uSymbol"];
/// Keys that carry open interest in a candidate record.
pub const OI_FIELDS: &[&str] = &["openInterest", "oi", "oiAmount"];
pub const MIN_RECORDS: usize = 5;

const OBSERVER_SCRIPT: &str = r#"
(function() {
    const callback = __CALLBACK__;
    const minLength = __MIN_LENGTH__;
    const identityKeys = __IDENTITY_KEYS__;
    const oiKeys = __OI_KEYS__;
    const minRecords = __MIN_RECORDS__;
    const nativeParse = JSON.parse;
    let signalled = false;

    function fingerprint(list) {
        if (!Array.isArray(list) || list.length < minRecords) return false;
        const first = list[0];
        if (!first || typeof first !== 'object' || Array.isArray(first)) return false;
        const keys = Object.keys(first);
        return identityKeys.some(k => keys.includes(k)) && oiKeys.some(k => keys.includes(k));
    }

    // Same shape order as locate_records on the host side.
    function locate(json) {
        const shapes = [
            () => json,
            () => json.data,
            () => json.list,
            () => json.data && json.data.list,
        ];
        for (const shape of shapes) {
            const list = shape();
            if (fingerprint(list)) return list;
        }
        return null;
    }

    JSON.parse = function(text) {
        const result = nativeParse.apply(this, arguments);
        try {
            if (!signalled && typeof text === 'string' && text.length > minLength
                && result && typeof result === 'object') {
                const list = locate(result);
                if (list && typeof window[callback] === 'function') {
                    signalled = true;
                    window[callback](JSON.stringify(list));
                }
            }
        } catch (e) {}
        return result;
    };
})();
"#;

/// Renders the page-side observer. It wraps `JSON.parse` without touching its
/// return value and reports the first fingerprinted list through the host
/// binding.
pub fn observation_script(config: &CaptureConfig) -> String {
    OBSERVER_SCRIPT
        .replace("__CALLBACK__", &js_literal(config.callback_name.as_str()))
        .replace("__MIN_LENGTH__", &config.min_body_len.to_string())
        .replace("__IDENTITY_KEYS__", &js_literal(IDENTITY_FIELDS))
        .replace("__OI_KEYS__", &js_literal(OI_FIELDS))
        .replace("__MIN_RECORDS__", &MIN_RECORDS.to_string())
}

fn js_literal<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Structural test for an OI-like list: at least `MIN_RECORDS` entries and a
/// first entry exposing both an identity key and an open-interest key.
pub fn matches_fingerprint(candidate: &Value) -> bool {
    let Some(list) = candidate.as_array() else {
        return false;
    };
    if list.len() < MIN_RECORDS {
        return false;
    }
    let Some(first) = list[0].as_object() else {
        return false;
    };
    IDENTITY_FIELDS.iter().any(|k| first.contains_key(*k))
        && OI_FIELDS.iter().any(|k| first.contains_key(*k))
}

/// First nesting shape that passes the fingerprint, in priority order:
/// top-level array, `.data`, `.list`, `.data.list`. The observer script's
/// `locate` walks the same order; keep the two in step.
pub fn locate_records(payload: &Value) -> Option<&Vec<Value>> {
    let shapes = [
        Some(payload),
        payload.get("data"),
        payload.get("list"),
        payload.get("data").and_then(|data| data.get("list")),
    ];

    shapes
        .into_iter()
        .flatten()
        .find(|candidate| matches_fingerprint(candidate))
        .and_then(Value::as_array)
}

/// Parse a raw capture and pull out its record list. Anything that is not
/// structured data, or carries no fingerprinted list, aborts the run.
pub fn extract_records(raw: &str) -> MonitorResult<Vec<Value>> {
    let payload: Value = serde_json::from_str(raw)?;
    locate_records(&payload)
        .cloned()
        .ok_or_else(|| MonitorError::MalformedPayload("no OI-like record list in payload".to_string()))
}

/// Single-assignment slot between the page binding and the waiting host.
/// Only the first payload is delivered; later ones are dropped.
pub struct CaptureSignal {
    tx: Option<oneshot::Sender<String>>
}

impl CaptureSignal {
    pub fn channel() -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Returns true only for the call that delivered the payload.
    pub fn fire(&mut self, payload: String) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(payload).is_ok(),
            None => false
        }
    }

    pub fn is_spent(&self) -> bool {
        self.tx.is_none()
    }
}

/// Anything that can hand the engine one raw capture per run.
#[allow(async_fn_in_trait)]
pub trait PayloadSource {
    async fn fetch(&self) -> MonitorResult<String>;
}

/// Headless Chromium capture of the page's own deserialized traffic.
pub struct BrowserCapture {
    pub config: CaptureConfig
}

impl BrowserCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub async fn capture(&self) -> MonitorResult<String> {
        info!("Launching headless browser for {}", self.config.target_url);
        let session = BrowserSession::launch(&self.config).await?;
        let outcome = session.observe(&self.config).await;
        session.shutdown().await;
        outcome
    }
}

impl PayloadSource for BrowserCapture {
    async fn fetch(&self) -> MonitorResult<String> {
        self.capture().await
    }
}

struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>
}

impl BrowserSession {
    async fn launch(config: &CaptureConfig) -> MonitorResult<Self> {
        let viewport = Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
            ..Default::default()
        };
        let browser_config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg(format!("--user-agent={}", config.user_agent))
            .window_size(config.viewport_width, config.viewport_height)
            .viewport(viewport)
            .request_timeout(config.navigation_timeout())
            .build()
            .map_err(MonitorError::Browser)?;

        let (browser, mut handler) = Browser::launch(browser_config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                // Unknown CDP messages surface as errors here; the connection
                // itself ends the stream.
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self { browser, handler })
    }

    async fn observe(&self, config: &CaptureConfig) -> MonitorResult<String> {
        let page = self.browser.new_page("about:blank").await?;
        page.execute(AddBindingParams::new(config.callback_name.clone())).await?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(observation_script(config))).await?;

        let (signal, captured) = CaptureSignal::channel();
        let listener = Self::spawn_binding_listener(&page, config.callback_name.clone(), signal).await?;
        let status_watch = Self::spawn_status_watch(&page).await?;

        let started = Instant::now();
        info!("Navigating to {}", config.target_url);
        match timeout(config.navigation_timeout(), page.goto(config.target_url.as_str())).await {
            Ok(Ok(_)) => debug!("Page reported ready after {:?}", started.elapsed()),
            Ok(Err(e)) => {
                warn!("{}", MonitorError::Navigation(e.to_string()));
            }
            Err(_) => {
                warn!("{}", MonitorError::Navigation(format!(
                    "page not ready within {:?}", config.navigation_timeout()
                )));
            }
        }

        info!("Waiting for OI payload");
        let deadline = started + config.capture_timeout();
        let outcome = match timeout_at(deadline, captured).await {
            Ok(Ok(payload)) => {
                info!("Captured OI payload ({} bytes)", payload.len());
                Ok(payload)
            }
            Ok(Err(_)) => Err(MonitorError::Browser("binding listener closed before any capture".to_string())),
            Err(_) => Err(MonitorError::CaptureTimeout(config.capture_timeout()))
        };

        listener.abort();
        status_watch.abort();
        if let Err(e) = page.close().await {
            debug!("Page close failed: {}", e);
        }
        outcome
    }

    async fn spawn_binding_listener(
        page: &Page,
        callback: String,
        mut signal: CaptureSignal
    ) -> MonitorResult<JoinHandle<()>> {
        let mut bindings = page.event_listener::<EventBindingCalled>().await?;
        Ok(tokio::spawn(async move {
            while let Some(event) = bindings.next().await {
                if event.name != callback {
                    continue;
                }
                if signal.is_spent() {
                    debug!("Ignoring repeated capture ({} bytes)", event.payload.len());
                    continue;
                }
                if !signal.fire(event.payload.clone()) {
                    debug!("Capture arrived after the host stopped waiting");
                }
            }
        }))
    }

    async fn spawn_status_watch(page: &Page) -> MonitorResult<JoinHandle<()>> {
        let mut responses = page.event_listener::<EventResponseReceived>().await?;
        Ok(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                if event.r#type == ResourceType::Document && event.response.status != 200 {
                    warn!("{}", MonitorError::Navigation(format!(
                        "{} returned status {}", event.response.url, event.response.status
                    )));
                }
            }
        }))
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Browser process did not exit cleanly: {}", e);
        }
        self.handler.abort();
        debug!("Browser session torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(key: &str, n: usize) -> Value {
        Value::Array(
            (0..n)
                .map(|i| json!({ key: format!("S{}", i), "openInterest": 100.0 + i as f64 }))
                .collect()
        )
    }

    #[test]
    fn fingerprint_needs_five_rows_and_both_keys() {
        assert!(matches_fingerprint(&rows("symbol", 5)));
        assert!(matches_fingerprint(&rows("uSymbol", 7)));
        assert!(!matches_fingerprint(&rows("symbol", 4)));
        assert!(!matches_fingerprint(&rows("name", 10)));
        assert!(!matches_fingerprint(&json!([1, 2, 3, 4, 5])));
        assert!(!matches_fingerprint(&json!({ "symbol": "BTC", "oi": 1 })));
    }

    #[test]
    fn shapes_are_searched_in_priority_order() {
        let payload = json!({
            "data": { "list": rows("symbol", 6) },
            "list": rows("uSymbol", 5)
        });
        let found = locate_records(&payload).unwrap();
        assert_eq!(found.len(), 5);
        assert!(found[0].get("uSymbol").is_some());

        let payload = json!({ "data": rows("symbol", 8), "list": rows("uSymbol", 5) });
        assert_eq!(locate_records(&payload).unwrap().len(), 8);

        let payload = json!({ "data": { "list": rows("symbol", 6) } });
        assert_eq!(locate_records(&payload).unwrap().len(), 6);

        assert_eq!(locate_records(&rows("symbol", 9)).unwrap().len(), 9);
    }

    #[test]
    fn failing_shape_falls_through_to_next() {
        // `.data` is an array but too short, `.list` qualifies.
        let payload = json!({ "data": rows("symbol", 2), "list": rows("symbol", 5) });
        assert_eq!(locate_records(&payload).unwrap().len(), 5);
        assert!(locate_records(&json!({ "data": rows("symbol", 2) })).is_none());
    }

    #[test]
    fn extract_rejects_unstructured_payloads() {
        assert!(matches!(extract_records("<html>"), Err(MonitorError::MalformedPayload(_))));
        assert!(matches!(extract_records(r#"{"code": 0}"#), Err(MonitorError::MalformedPayload(_))));
        let raw = rows("symbol", 5).to_string();
        assert_eq!(extract_records(&raw).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn signal_keeps_only_the_first_payload() {
        let (mut signal, rx) = CaptureSignal::channel();
        assert!(signal.fire("first".into()));
        assert!(signal.is_spent());
        assert!(!signal.fire("second".into()));
        assert!(!signal.fire("third".into()));
        assert_eq!(rx.await.unwrap(), "first");
    }

    #[test]
    fn script_carries_binding_and_fingerprint() {
        let config = CaptureConfig::default();
        let script = observation_script(&config);
        assert!(script.contains(r#"const callback = "onCapturedData";"#));
        assert!(script.contains("const minLength = 500;"));
        assert!(script.contains(r#"["symbol","uSymbol"]"#));
        assert!(script.contains(r#"["openInterest","oi","oiAmount"]"#));
        assert!(!script.contains("__"));
    }

    #[test]
    fn script_walks_shapes_in_host_order() {
        let script = observation_script(&CaptureConfig::default());
        let accessors = [
            "() => json,",
            "() => json.data,",
            "() => json.list,",
            "() => json.data && json.data.list,",
        ];
        let positions: Vec<usize> = accessors
            .iter()
            .map(|a| script.find(a).unwrap_or_else(|| panic!("missing accessor {}", a)))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        // Same payload the host resolves to `.list` must not stop at a short `.data`.
        assert!(script.contains("if (fingerprint(list)) return list;"));
        assert!(script.contains("list.length < minRecords"));
        assert!(script.contains("signalled = true;"));
    }
}

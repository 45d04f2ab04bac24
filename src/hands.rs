use async_trait::async_trait;
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::util::Timeout;
use headless_chrome::{Browser, Tab};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::driver::{PageDriver, ScrollProbe, TabConnector};
use crate::error::BridgeError;

/// Attaches to a running Chrome over its remote-debugging endpoint.
pub struct ChromeConnector {
    endpoint: String,
    http: reqwest::Client,
    attach_wait: Duration,
    idle_timeout: Duration,
}

impl ChromeConnector {
    /// `idle_timeout` is how long a tab connection may go without CDP
    /// traffic before headless_chrome drops it. It must outlive the session.
    pub fn new(endpoint: &str, attach_wait: Duration, idle_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            attach_wait,
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    async fn browser_ws_url(&self) -> Result<String, BridgeError> {
        let url = format!("{}/json/version", self.endpoint);
        debug!("Fetching browser version from {}", url);

        let version: Value = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BridgeError::Browser(format!("Chrome not available at {}: {}", self.endpoint, e)))?
            .json()
            .await
            .map_err(|e| BridgeError::Browser(format!("bad /json/version reply: {}", e)))?;

        version["webSocketDebuggerUrl"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| BridgeError::Browser("no webSocketDebuggerUrl in /json/version".into()))
    }
}

#[async_trait]
impl TabConnector for ChromeConnector {
    async fn connect(&self, tab_id: &str) -> Result<Arc<dyn PageDriver>, BridgeError> {
        let ws_url = self.browser_ws_url().await?;
        let tab_id = tab_id.to_string();
        let wait = self.attach_wait;
        let idle = self.idle_timeout;

        let page = tokio::task::spawn_blocking(move || ChromePage::attach(ws_url, &tab_id, wait, idle))
            .await
            .map_err(|e| BridgeError::Browser(format!("attach task panicked: {}", e)))??;

        Ok(Arc::new(page))
    }
}

/// One automation connection bound to one tab. Dropping it disconnects.
pub struct ChromePage {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromePage {
    fn attach(ws_url: String, tab_id: &str, wait: Duration, idle: Duration) -> Result<Self, BridgeError> {
        info!("Attaching to tab {} via {}", tab_id, ws_url);
        let browser = Browser::connect_with_timeout(ws_url, idle)
            .map_err(|e| BridgeError::Browser(format!("connect failed: {}", e)))?;

        // Existing targets are discovered asynchronously after connecting.
        let deadline = Instant::now() + wait;
        loop {
            let found = {
                let tabs = browser
                    .get_tabs()
                    .lock()
                    .map_err(|_| BridgeError::Browser("tab list lock poisoned".into()))?;
                tabs.iter().find(|t| t.get_target_id().as_str() == tab_id).cloned()
            };

            if let Some(tab) = found {
                return Ok(Self {
                    _browser: browser,
                    tab,
                });
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::Browser(format!("tab {} not found", tab_id)));
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    /// Run a blocking headless_chrome call off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(tab.as_ref()))
            .await
            .map_err(|e| BridgeError::Browser(format!("browser task panicked: {}", e)))?
            .map_err(|e| BridgeError::Browser(format!("{:#}", e)))
    }

    async fn eval_value(&self, expression: String) -> Result<Option<Value>, BridgeError> {
        self.blocking(move |tab| Ok(tab.evaluate(&expression, false)?.value))
            .await
    }
}

/// Only an expired wait is a timeout; anything else keeps its own message.
fn wait_failure(selector: &str, timeout: Duration, error: anyhow::Error) -> BridgeError {
    if error.is::<Timeout>() {
        BridgeError::Timeout(format!(
            "{} did not attach within {}ms",
            selector,
            timeout.as_millis()
        ))
    } else {
        BridgeError::Browser(format!("waiting for {}: {:#}", selector, error))
    }
}

/// A string as a JavaScript literal.
fn js_str(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), BridgeError> {
        let sel = selector.to_string();
        self.blocking(move |tab| {
            Ok(tab
                .wait_for_element_with_custom_timeout(&sel, timeout)
                .map(|_| ())
                .map_err(|e| wait_failure(&sel, timeout, e)))
        })
        .await?
    }

    async fn click(&self, selector: &str) -> Result<(), BridgeError> {
        let sel = selector.to_string();
        self.blocking(move |tab| {
            tab.find_element(&sel)?.click()?;
            Ok(())
        })
        .await
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<(), BridgeError> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.value = {}; return true; }})()",
            js_str(selector),
            js_str(value)
        );
        match self.eval_value(js).await? {
            Some(Value::Bool(true)) => Ok(()),
            _ => Err(BridgeError::SelectorNotFound(selector.to_string())),
        }
    }

    async fn is_checked(&self, selector: &str) -> Result<bool, BridgeError> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); return el ? !!el.checked : null; }})()",
            js_str(selector)
        );
        match self.eval_value(js).await? {
            Some(Value::Bool(checked)) => Ok(checked),
            _ => Err(BridgeError::SelectorNotFound(selector.to_string())),
        }
    }

    async fn select_values(&self, selector: &str, values: &[String]) -> Result<Vec<String>, BridgeError> {
        let js = format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  if (!el || el.tagName !== 'SELECT') return null;
  const wanted = new Set({values});
  el.value = undefined;
  for (const option of el.options) {{
    option.selected = wanted.has(option.value);
    if (option.selected && !el.multiple) break;
  }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return JSON.stringify([...el.options].filter(o => o.selected).map(o => o.value));
}})()"#,
            sel = js_str(selector),
            values = json!(values),
        );
        match self.eval_value(js).await? {
            Some(Value::String(raw)) => Ok(serde_json::from_str(&raw)?),
            _ => Err(BridgeError::SelectorNotFound(selector.to_string())),
        }
    }

    async fn probe_selector(&self, selector: &str) -> Result<ScrollProbe, BridgeError> {
        let js = format!(
            r#"(() => {{
  const el = document.querySelector({});
  if (el) el.scrollIntoView({{ behavior: 'instant', block: 'center' }});
  return JSON.stringify({{ found: !!el, scrollHeight: document.body.scrollHeight, viewportHeight: window.innerHeight }});
}})()"#,
            js_str(selector)
        );
        match self.eval_value(js).await? {
            Some(Value::String(raw)) => Ok(serde_json::from_str(&raw)?),
            other => Err(BridgeError::Browser(format!("unexpected probe result: {:?}", other))),
        }
    }

    async fn scroll_to(&self, offset: f64) -> Result<(), BridgeError> {
        let js = format!("window.scrollTo({{ top: {}, behavior: 'instant' }})", offset);
        self.eval_value(js).await.map(|_| ())
    }

    async fn evaluate(&self, expression: &str, await_promise: bool) -> Result<Option<Value>, BridgeError> {
        let expression = expression.to_string();
        self.blocking(move |tab| Ok(tab.evaluate(&expression, await_promise)?.value))
            .await
    }

    async fn window_size(&self) -> Result<(f64, f64), BridgeError> {
        let js = "JSON.stringify({ width: window.innerWidth, height: window.innerHeight })".to_string();
        let raw = match self.eval_value(js).await? {
            Some(Value::String(raw)) => raw,
            other => return Err(BridgeError::Browser(format!("unexpected window size: {:?}", other))),
        };
        let size: Value = serde_json::from_str(&raw)?;
        match (size["width"].as_f64(), size["height"].as_f64()) {
            (Some(w), Some(h)) => Ok((w, h)),
            _ => Err(BridgeError::Browser(format!("unexpected window size: {}", raw))),
        }
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), BridgeError> {
        // Built from JSON so only the required fields need naming.
        let params: Emulation::SetDeviceMetricsOverride = serde_json::from_value(json!({
            "width": width,
            "height": height,
            "deviceScaleFactor": 0.0,
            "mobile": false,
        }))
        .map_err(|e| BridgeError::Browser(format!("viewport params: {}", e)))?;

        self.blocking(move |tab| {
            tab.call_method(params)?;
            Ok(())
        })
        .await
    }
}

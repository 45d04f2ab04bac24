//! Recording fakes for the browser and backend seams.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::brain::{Decision, OptionResolver, SelectOptionRequest};
use crate::dom::{EXTRACT_HTML_JS, TEXT_LINES_JS};
use crate::driver::{PageDriver, ScrollProbe, TabConnector};
use crate::error::BridgeError;

/// Shared, ordered log of actions across several fakes.
pub(crate) type ActionLog = Arc<Mutex<Vec<String>>>;

pub(crate) struct FakePage {
    name: String,
    log: ActionLog,
    present: Mutex<HashSet<String>>,
    /// Selectors that appear once the page is scrolled to at least this offset.
    revealed_at: HashMap<String, f64>,
    checked: Mutex<HashSet<String>>,
    offset: Mutex<f64>,
    scroll_height: f64,
    viewport_height: f64,
    text_snapshots: Mutex<VecDeque<Option<Vec<String>>>>,
    html: Option<String>,
    options: Vec<String>,
    values: Mutex<HashMap<String, String>>,
    window: (f64, f64),
    fail_viewport: bool,
    click_delay: Duration,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            name: "page".into(),
            log: Arc::new(Mutex::new(Vec::new())),
            present: Mutex::new(HashSet::new()),
            revealed_at: HashMap::new(),
            checked: Mutex::new(HashSet::new()),
            offset: Mutex::new(0.0),
            scroll_height: 2000.0,
            viewport_height: 500.0,
            text_snapshots: Mutex::new(VecDeque::new()),
            html: None,
            options: Vec::new(),
            values: Mutex::new(HashMap::new()),
            window: (1000.0, 500.0),
            fail_viewport: false,
            click_delay: Duration::ZERO,
        }
    }

    pub fn named(mut self, name: &str, log: &ActionLog) -> Self {
        self.name = name.to_string();
        self.log = log.clone();
        self
    }

    pub fn with_present(self, selectors: &[&str]) -> Self {
        self.present
            .lock()
            .unwrap()
            .extend(selectors.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_revealed_at(mut self, selector: &str, offset: f64) -> Self {
        self.revealed_at.insert(selector.to_string(), offset);
        self
    }

    pub fn with_checked(self, selector: &str) -> Self {
        self.checked.lock().unwrap().insert(selector.to_string());
        self
    }

    pub fn with_page_height(mut self, scroll_height: f64, viewport_height: f64) -> Self {
        self.scroll_height = scroll_height;
        self.viewport_height = viewport_height;
        self
    }

    pub fn with_text_snapshot(self, lines: &[&str]) -> Self {
        self.text_snapshots
            .lock()
            .unwrap()
            .push_back(Some(lines.iter().map(|s| s.to_string()).collect()));
        self
    }

    pub fn with_failed_text_snapshot(self) -> Self {
        self.text_snapshots.lock().unwrap().push_back(None);
        self
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html = Some(html.to_string());
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_window(mut self, width: f64, height: f64) -> Self {
        self.window = (width, height);
        self
    }

    pub fn with_failing_viewport(mut self) -> Self {
        self.fail_viewport = true;
        self
    }

    pub fn with_click_delay(mut self, delay: Duration) -> Self {
        self.click_delay = delay;
        self
    }

    pub fn actions(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| a.strip_prefix(&format!("{}:click:", self.name)).map(String::from))
            .collect()
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.values.lock().unwrap().get(selector).cloned()
    }

    pub fn is_currently_checked(&self, selector: &str) -> bool {
        self.checked.lock().unwrap().contains(selector)
    }

    fn record(&self, action: String) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, action));
    }

    fn attached(&self, selector: &str) -> bool {
        if self.present.lock().unwrap().contains(selector) {
            return true;
        }
        let offset = *self.offset.lock().unwrap();
        self.revealed_at
            .get(selector)
            .is_some_and(|at| offset >= *at)
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), BridgeError> {
        if self.attached(selector) {
            Ok(())
        } else {
            self.record(format!("wait-timeout:{}", selector));
            Err(BridgeError::Timeout(format!("{} after {:?}", selector, timeout)))
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BridgeError> {
        if !self.attached(selector) {
            return Err(BridgeError::Browser(format!("no node for {}", selector)));
        }
        self.record(format!("click-start:{}", selector));
        if !self.click_delay.is_zero() {
            tokio::time::sleep(self.click_delay).await;
        }
        let mut checked = self.checked.lock().unwrap();
        if !checked.remove(selector) {
            checked.insert(selector.to_string());
        }
        drop(checked);
        self.record(format!("click:{}", selector));
        Ok(())
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<(), BridgeError> {
        if !self.attached(selector) {
            return Err(BridgeError::SelectorNotFound(selector.to_string()));
        }
        self.values
            .lock()
            .unwrap()
            .insert(selector.to_string(), value.to_string());
        self.record(format!("set:{}={}", selector, value));
        Ok(())
    }

    async fn is_checked(&self, selector: &str) -> Result<bool, BridgeError> {
        Ok(self.is_currently_checked(selector))
    }

    async fn select_values(&self, selector: &str, values: &[String]) -> Result<Vec<String>, BridgeError> {
        if !self.attached(selector) {
            return Err(BridgeError::SelectorNotFound(selector.to_string()));
        }
        let applied: Vec<String> = values
            .iter()
            .filter(|v| self.options.contains(v))
            .cloned()
            .collect();
        self.record(format!("select:{}={}", selector, applied.join(",")));
        Ok(applied)
    }

    async fn probe_selector(&self, selector: &str) -> Result<ScrollProbe, BridgeError> {
        let found = self.attached(selector);
        if found {
            self.present.lock().unwrap().insert(selector.to_string());
        }
        self.record(format!("probe:{}", selector));
        Ok(ScrollProbe {
            found,
            scroll_height: self.scroll_height,
            viewport_height: self.viewport_height,
        })
    }

    async fn scroll_to(&self, offset: f64) -> Result<(), BridgeError> {
        *self.offset.lock().unwrap() = offset;
        self.record(format!("scroll:{}", offset));
        Ok(())
    }

    async fn evaluate(&self, expression: &str, _await_promise: bool) -> Result<Option<Value>, BridgeError> {
        if expression == TEXT_LINES_JS {
            let next = self.text_snapshots.lock().unwrap().pop_front();
            return match next {
                Some(Some(lines)) => Ok(Some(Value::String(serde_json::to_string(&lines)?))),
                _ => Err(BridgeError::Browser("tab closed".into())),
            };
        }
        if expression == EXTRACT_HTML_JS {
            return match &self.html {
                Some(html) => Ok(Some(Value::String(html.clone()))),
                None => Err(BridgeError::Browser("tab closed".into())),
            };
        }
        Ok(None)
    }

    async fn window_size(&self) -> Result<(f64, f64), BridgeError> {
        Ok(self.window)
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), BridgeError> {
        if self.fail_viewport {
            return Err(BridgeError::Browser("emulation not allowed".into()));
        }
        self.record(format!("viewport:{}x{}", width, height));
        Ok(())
    }
}

/// Hands out pre-built pages by tab id.
#[derive(Default)]
pub(crate) struct FakeConnector {
    pages: Mutex<HashMap<String, Arc<FakePage>>>,
}

impl FakeConnector {
    pub fn with_tab(self, tab_id: &str, page: Arc<FakePage>) -> Self {
        self.pages.lock().unwrap().insert(tab_id.to_string(), page);
        self
    }
}

#[async_trait]
impl TabConnector for FakeConnector {
    async fn connect(&self, tab_id: &str) -> Result<Arc<dyn PageDriver>, BridgeError> {
        let page = self.pages.lock().unwrap().get(tab_id).cloned();
        match page {
            Some(page) => Ok(page as Arc<dyn PageDriver>),
            None => Err(BridgeError::Browser(format!("tab {} not found", tab_id))),
        }
    }
}

/// Replays queued decisions and records every request.
#[derive(Default)]
pub(crate) struct FakeResolver {
    decisions: Mutex<VecDeque<Result<Decision, BridgeError>>>,
    requests: Mutex<Vec<SelectOptionRequest>>,
    delay: Option<Duration>,
}

impl FakeResolver {
    pub fn answering(decision: Decision) -> Self {
        let resolver = Self::default();
        resolver.decisions.lock().unwrap().push_back(Ok(decision));
        resolver
    }

    pub fn failing(error: BridgeError) -> Self {
        let resolver = Self::default();
        resolver.decisions.lock().unwrap().push_back(Err(error));
        resolver
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<SelectOptionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl OptionResolver for FakeResolver {
    async fn select_option(&self, request: &SelectOptionRequest) -> Result<Decision, BridgeError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Decision::Unsuccessful))
    }
}

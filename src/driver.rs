use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BridgeError;

/// Result of one in-page "find element" probe.
///
/// When `found` is true the element has already been scrolled into view.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollProbe {
    pub found: bool,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

/// DOM actions against one automated tab (the session's page handle).
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Wait until `selector` is attached to the DOM, up to `timeout`.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), BridgeError>;

    async fn click(&self, selector: &str) -> Result<(), BridgeError>;

    /// Assign the element's `value` directly, without simulated keystrokes.
    async fn set_value(&self, selector: &str, value: &str) -> Result<(), BridgeError>;

    async fn is_checked(&self, selector: &str) -> Result<bool, BridgeError>;

    /// Select the options matching `values`; returns the values actually selected.
    async fn select_values(&self, selector: &str, values: &[String]) -> Result<Vec<String>, BridgeError>;

    async fn probe_selector(&self, selector: &str) -> Result<ScrollProbe, BridgeError>;

    async fn scroll_to(&self, offset: f64) -> Result<(), BridgeError>;

    /// Evaluate an expression in the page and return its primitive value.
    async fn evaluate(&self, expression: &str, await_promise: bool) -> Result<Option<Value>, BridgeError>;

    /// The window's inner size in CSS pixels.
    async fn window_size(&self) -> Result<(f64, f64), BridgeError>;

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), BridgeError>;
}

/// Opens an automation connection scoped to one browser tab.
///
/// Dropping the returned handle closes the connection.
#[async_trait]
pub trait TabConnector: Send + Sync {
    async fn connect(&self, tab_id: &str) -> Result<Arc<dyn PageDriver>, BridgeError>;
}

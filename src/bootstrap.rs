use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::driver::{PageDriver, TabConnector};
use crate::error::BridgeError;
use crate::registry::SessionRegistry;
use crate::types::{
    MAX_VIEWPORT_HEIGHT, MAX_VIEWPORT_WIDTH, OutboundEvent, ReplyChannel, StartRequest, VIEWPORT_SCALE,
};

/// One-time setup for a user-initiated run.
pub struct SessionBootstrap {
    connector: Arc<dyn TabConnector>,
    outbound: mpsc::UnboundedSender<OutboundEvent>,
}

impl SessionBootstrap {
    pub fn new(connector: Arc<dyn TabConnector>, outbound: mpsc::UnboundedSender<OutboundEvent>) -> Self {
        Self { connector, outbound }
    }

    /// Connect to the tab, register the session, size the viewport and
    /// announce the new work to the backend. All or nothing: on failure no
    /// session remains registered and the connection is dropped.
    pub async fn start(
        &self,
        registry: &mut SessionRegistry,
        request: StartRequest,
        reply: ReplyChannel,
    ) -> Result<String, BridgeError> {
        let page = self
            .connector
            .connect(&request.tab_id)
            .await
            .map_err(|e| BridgeError::Bootstrap(format!("connect to tab {}: {}", request.tab_id, e)))?;

        let mut work_id = generate_work_id();
        while registry.exists(&work_id) {
            work_id = generate_work_id();
        }

        registry.create(&work_id, page.clone());
        registry.bind_tab(&work_id, &request.tab_id);
        registry.bind_reply(&work_id, reply);

        if let Err(e) = self.prepare(page.as_ref(), &work_id, request.rendered_html).await {
            registry.delete(&work_id);
            warn!("Bootstrap of {} failed, closing connection: {}", work_id, e);
            return Err(BridgeError::Bootstrap(e.to_string()));
        }

        info!("Session {} started for tab {}", work_id, request.tab_id);
        Ok(work_id)
    }

    async fn prepare(&self, page: &dyn PageDriver, work_id: &str, rendered_html: String) -> Result<(), BridgeError> {
        let (inner_width, inner_height) = page.window_size().await?;
        let (width, height) = viewport_for(inner_width, inner_height);
        page.set_viewport(width, height).await?;

        self.outbound
            .send(OutboundEvent::NewWork {
                work_id: work_id.to_string(),
                rendered_html,
            })
            .map_err(|_| BridgeError::ChannelClosed("backend outbound"))
    }
}

/// `min(inner * 1.7, cap)` per axis.
pub fn viewport_for(inner_width: f64, inner_height: f64) -> (u32, u32) {
    let width = (inner_width * VIEWPORT_SCALE).min(MAX_VIEWPORT_WIDTH as f64);
    let height = (inner_height * VIEWPORT_SCALE).min(MAX_VIEWPORT_HEIGHT as f64);
    (width.round().max(1.0) as u32, height.round().max(1.0) as u32)
}

/// Base-36 millisecond timestamp plus a short random suffix.
pub fn generate_work_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let suffix = to_base36(rand::random::<u64>());
    let suffix: String = suffix.chars().take(5).collect();
    format!("{}-{}", to_base36(millis), suffix)
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

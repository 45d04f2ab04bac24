use clap::Parser;
use std::time::Duration;

use crate::executor::ExecutorConfig;

/// Scroll backoff never grows past this.
const SCROLL_BACKOFF_CAP_MS: u64 = 250;

/// Bridges a Chrome tab to a form-filling backend.
#[derive(Debug, Clone, Parser)]
#[command(name = "tab-bridge", version, about)]
pub struct Config {
    /// Chrome remote-debugging HTTP endpoint.
    #[arg(long, env = "TAB_BRIDGE_CHROME", default_value = "http://127.0.0.1:9222")]
    pub chrome_endpoint: String,

    /// Backend push channel.
    #[arg(long, env = "TAB_BRIDGE_BACKEND_WS", default_value = "ws://127.0.0.1:5001/ws")]
    pub backend_ws: String,

    /// Base URL of the decision endpoint.
    #[arg(long, env = "TAB_BRIDGE_BACKEND_HTTP", default_value = "http://127.0.0.1:5001")]
    pub backend_http: String,

    /// Caller-facing HTTP port. The next few ports are tried if it is taken.
    #[arg(long, env = "TAB_BRIDGE_PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "TAB_BRIDGE_DIRECT_WAIT_MS", default_value_t = 1000)]
    pub direct_wait_ms: u64,

    /// Bounded wait for an element before fill, checkbox and select.
    #[arg(long, env = "TAB_BRIDGE_ATTACH_WAIT_MS", default_value_t = 10_000)]
    pub attach_wait_ms: u64,

    #[arg(long, env = "TAB_BRIDGE_SCROLL_MAX_STEPS", default_value_t = 200)]
    pub scroll_max_steps: u32,

    /// Initial pause between scroll steps. Doubles each step.
    #[arg(long, env = "TAB_BRIDGE_SCROLL_BACKOFF_MS", default_value_t = 16)]
    pub scroll_backoff_ms: u64,

    #[arg(long, env = "TAB_BRIDGE_DECISION_TIMEOUT", default_value_t = 30)]
    pub decision_timeout_secs: u64,

    /// Sessions idle this long are expired.
    #[arg(long, env = "TAB_BRIDGE_SESSION_IDLE", default_value_t = 1800)]
    pub session_idle_secs: u64,

    #[arg(long, env = "TAB_BRIDGE_RECONNECT", default_value_t = 3)]
    pub reconnect_secs: u64,
}

impl Config {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            direct_wait: Duration::from_millis(self.direct_wait_ms),
            attach_wait: Duration::from_millis(self.attach_wait_ms),
            scroll_max_steps: self.scroll_max_steps,
            scroll_backoff: Duration::from_millis(self.scroll_backoff_ms),
            scroll_backoff_cap: Duration::from_millis(SCROLL_BACKOFF_CAP_MS.max(self.scroll_backoff_ms)),
            decision_timeout: self.decision_timeout(),
        }
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    /// CDP idle limit for tab connections. Outlives both the idle sweep and
    /// the longest decision wait, so a live session never loses its page.
    pub fn browser_idle(&self) -> Duration {
        self.session_idle() + self.decision_timeout()
    }

    pub fn reconnect(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs)
    }
}

use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::driver::PageDriver;
use crate::types::{CallerEvent, ReplyChannel};

/// One end-to-end automation run for one tab.
pub struct Session {
    pub work_id: String,
    pub page: Arc<dyn PageDriver>,
    pub tab_id: Option<String>,
    pub reply: Option<ReplyChannel>,
    pub attrs: HashMap<String, Value>,
    last_activity: Instant,
}

impl Session {
    /// Commands are only accepted once the tab and reply channel are bound.
    pub fn is_ready(&self) -> bool {
        self.tab_id.is_some() && self.reply.is_some()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Deliver an event to the caller. A disconnected caller is logged, not fatal.
    pub fn notify(&self, event: CallerEvent) -> bool {
        let Some(reply) = &self.reply else {
            debug!("Session {} has no reply channel", self.work_id);
            return false;
        };
        match reply.send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!("Caller for {} is gone, dropping {}", self.work_id, e.0.name());
                false
            }
        }
    }
}

/// In-memory sessions keyed by work id.
///
/// Owned by the dispatcher task, so every mutation happens on that one task.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, work_id: &str, page: Arc<dyn PageDriver>) -> &mut Session {
        let session = Session {
            work_id: work_id.to_string(),
            page,
            tab_id: None,
            reply: None,
            attrs: HashMap::new(),
            last_activity: Instant::now(),
        };
        match self.sessions.entry(work_id.to_string()) {
            Entry::Occupied(mut slot) => {
                slot.insert(session);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(session),
        }
    }

    pub fn get(&self, work_id: &str) -> Option<&Session> {
        self.sessions.get(work_id)
    }

    pub fn get_mut(&mut self, work_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(work_id)
    }

    pub fn bind_tab(&mut self, work_id: &str, tab_id: &str) -> bool {
        self.update(work_id, |s| s.tab_id = Some(tab_id.to_string()))
    }

    pub fn bind_reply(&mut self, work_id: &str, reply: ReplyChannel) -> bool {
        self.update(work_id, |s| s.reply = Some(reply))
    }

    /// Attach an extra attribute. Unknown work ids are logged and ignored.
    pub fn set_attr(&mut self, work_id: &str, key: &str, value: Value) -> bool {
        self.update(work_id, |s| {
            s.attrs.insert(key.to_string(), value);
        })
    }

    pub fn delete(&mut self, work_id: &str) -> Option<Session> {
        self.sessions.remove(work_id)
    }

    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn exists(&self, work_id: &str) -> bool {
        self.sessions.contains_key(work_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Work ids whose last activity is at least `max_idle` before `now`.
    pub fn idle_ids(&self, now: Instant, max_idle: Duration) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.idle_for(now) >= max_idle)
            .map(|s| s.work_id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn update(&mut self, work_id: &str, apply: impl FnOnce(&mut Session)) -> bool {
        match self.sessions.get_mut(work_id) {
            Some(session) => {
                apply(session);
                true
            }
            None => {
                error!("Work id {} does not exist, create the session first", work_id);
                false
            }
        }
    }
}

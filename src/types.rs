use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Structured description of a target DOM element, as sent by the backend.
///
/// Besides the selector attributes the bag may carry `description` (a
/// human-readable label forwarded to the decision endpoint) and
/// `select_option_value` (the value(s) to pick in a `<select>`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_type: Option<String>,
    #[serde(flatten)]
    pub attrs: BTreeMap<String, Value>,
}

impl TagDescriptor {
    pub fn new(tag_type: &str) -> Self {
        Self {
            tag_type: Some(tag_type.to_string()),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn description(&self) -> Value {
        self.attrs.get("description").cloned().unwrap_or(Value::Null)
    }

    /// Values requested for a `<select>`, accepting a single string or an array.
    pub fn select_values(&self) -> Vec<String> {
        match self.attrs.get("select_option_value") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(value_text).collect(),
            Some(other) => vec![value_text(other)],
        }
    }
}

/// Renders a JSON value the way it would appear inside an HTML attribute.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A unit of work pulled from the backend channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FillText {
        work_id: String,
        selector: String,
        value: String,
    },
    FillCheckbox {
        work_id: String,
        selector: String,
    },
    FillRadio {
        work_id: String,
        selector: String,
    },
    Click {
        work_id: String,
        selector: String,
    },
    ClickDropdownAndSelect {
        work_id: String,
        tag: TagDescriptor,
    },
    SelectByValue {
        work_id: String,
        tag: TagDescriptor,
        selector: String,
    },
    EndProcess {
        work_id: String,
        error: Option<String>,
        details: Option<String>,
    },
}

impl Command {
    pub fn work_id(&self) -> &str {
        match self {
            Command::FillText { work_id, .. }
            | Command::FillCheckbox { work_id, .. }
            | Command::FillRadio { work_id, .. }
            | Command::Click { work_id, .. }
            | Command::ClickDropdownAndSelect { work_id, .. }
            | Command::SelectByValue { work_id, .. }
            | Command::EndProcess { work_id, .. } => work_id,
        }
    }

    /// The backend event name this command was decoded from.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::FillText { .. } => "fill_text_input",
            Command::FillCheckbox { .. } => "fill_checkbox",
            Command::FillRadio { .. } => "fill_radio_btn",
            Command::Click { .. } => "click",
            Command::ClickDropdownAndSelect { .. } => "click_dropdown_and_select",
            Command::SelectByValue { .. } => "select_option",
            Command::EndProcess { .. } => "end-process",
        }
    }
}

/// Caller-supplied request that opens a new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(rename = "renderedHTML")]
    pub rendered_html: String,
    #[serde(rename = "tabid")]
    pub tab_id: String,
}

/// Notifications delivered to the caller that started a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum CallerEvent {
    Started {
        work_id: String,
    },
    ProcessComplete {
        result: String,
    },
    ProcessError {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl CallerEvent {
    pub fn complete() -> Self {
        CallerEvent::ProcessComplete {
            result: PROCESS_COMPLETE_RESULT.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CallerEvent::Started { .. } => "started",
            CallerEvent::ProcessComplete { .. } => "process-complete",
            CallerEvent::ProcessError { .. } => "process-error",
        }
    }
}

/// The caller-facing channel owned by a session until it completes.
pub type ReplyChannel = mpsc::UnboundedSender<CallerEvent>;

/// Events pushed to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    NewWork {
        work_id: String,
        rendered_html: String,
    },
}

pub const PROCESS_COMPLETE_RESULT: &str = "Run finished!";
pub const VIEWPORT_SCALE: f64 = 1.7;
pub const MAX_VIEWPORT_WIDTH: u32 = 1920;
pub const MAX_VIEWPORT_HEIGHT: u32 = 1080;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::DecodeError;
use crate::selector::build_selector;
use crate::types::{Command, OutboundEvent, TagDescriptor, value_text};

/// Every frame on the backend socket, in both directions.
#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct SelectorPayload {
    work_id: String,
    selector: String,
}

#[derive(Deserialize)]
struct FillTextPayload {
    work_id: String,
    selector: String,
    value: Value,
}

#[derive(Deserialize)]
struct TagPayload {
    work_id: String,
    tag: TagDescriptor,
}

#[derive(Deserialize)]
struct EndProcessPayload {
    work_id: String,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    details: Option<Value>,
}

/// Decode one text frame from the backend into a command.
pub fn decode_frame(text: &str) -> Result<Command, DecodeError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| DecodeError::NotJson(e.to_string()))?;
    decode_event(&envelope.event, envelope.data)
}

/// Decode a named event. A string payload is parsed as embedded JSON first.
pub fn decode_event(event: &str, data: Value) -> Result<Command, DecodeError> {
    let data = normalize(event, data)?;

    let command = match event {
        "fill_text_input" => {
            let p: FillTextPayload = parse(event, data)?;
            Command::FillText {
                work_id: p.work_id,
                selector: p.selector,
                value: value_text(&p.value),
            }
        }
        "fill_checkbox" => {
            let p: SelectorPayload = parse(event, data)?;
            Command::FillCheckbox {
                work_id: p.work_id,
                selector: p.selector,
            }
        }
        "fill_radio_btn" => {
            let p: SelectorPayload = parse(event, data)?;
            Command::FillRadio {
                work_id: p.work_id,
                selector: p.selector,
            }
        }
        "click" => {
            let p: SelectorPayload = parse(event, data)?;
            Command::Click {
                work_id: p.work_id,
                selector: p.selector,
            }
        }
        "click_dropdown_and_select" => {
            let p: TagPayload = parse(event, data)?;
            Command::ClickDropdownAndSelect {
                work_id: p.work_id,
                tag: p.tag,
            }
        }
        "select_option" => {
            let p: TagPayload = parse(event, data)?;
            let selector = build_selector(&p.tag);
            Command::SelectByValue {
                work_id: p.work_id,
                tag: p.tag,
                selector,
            }
        }
        "end-process" => {
            let p: EndProcessPayload = parse(event, data)?;
            Command::EndProcess {
                work_id: p.work_id,
                error: p.error.as_ref().filter(|v| !v.is_null()).map(value_text),
                details: p.details.as_ref().filter(|v| !v.is_null()).map(value_text),
            }
        }
        other => return Err(DecodeError::UnknownEvent(other.to_string())),
    };

    Ok(command)
}

/// Encode an outbound event as a text frame.
pub fn encode_outbound(event: &OutboundEvent) -> String {
    let envelope = match event {
        OutboundEvent::NewWork {
            work_id,
            rendered_html,
        } => json!({
            "event": "new_work",
            "data": {"work_id": work_id, "renderedHTML": rendered_html},
        }),
    };
    envelope.to_string()
}

fn normalize(event: &str, data: Value) -> Result<Value, DecodeError> {
    match data {
        Value::String(raw) => serde_json::from_str(&raw).map_err(|e| DecodeError::Malformed {
            event: event.to_string(),
            reason: format!("string payload is not JSON: {}", e),
        }),
        other => Ok(other),
    }
}

fn parse<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|e| DecodeError::Malformed {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

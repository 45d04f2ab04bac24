use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::BridgeError;
use crate::types::TagDescriptor;

/// Body of the decision request made while resolving a dropdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOptionRequest {
    pub options: Vec<String>,
    pub work_id: String,
    pub description: Value,
    #[serde(rename = "newHtml")]
    pub new_html: Option<String>,
}

/// What the backend decided for a revealed dropdown.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No option could be resolved; nothing should be selected.
    Unsuccessful,
    Select(TagDescriptor),
}

/// The backend's "which option do I pick" endpoint.
#[async_trait]
pub trait OptionResolver: Send + Sync {
    async fn select_option(&self, request: &SelectOptionRequest) -> Result<Decision, BridgeError>;
}

pub struct DecisionClient {
    client: Client,
    endpoint: String,
}

impl DecisionClient {
    pub fn new(backend_http: &str, timeout: Duration) -> Result<Self, BridgeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/select_option", backend_http.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OptionResolver for DecisionClient {
    async fn select_option(&self, request: &SelectOptionRequest) -> Result<Decision, BridgeError> {
        debug!(
            "Asking backend to pick from {} option(s) for {}",
            request.options.len(),
            request.work_id
        );

        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            return Err(BridgeError::Backend(format!(
                "select_option returned {}: {}",
                status, body
            )));
        }

        debug!("Backend decision: {}", body);
        parse_decision(body)
    }
}

/// Accepts `"unsuccessful"`, `{"status":"unsuccessful"}` and
/// `{"element_to_select": {...}}` (with or without `"status":"success"`).
pub fn parse_decision(body: Value) -> Result<Decision, BridgeError> {
    match body {
        Value::String(s) if s == "unsuccessful" => Ok(Decision::Unsuccessful),
        Value::Object(mut map) => {
            if map.get("status").and_then(Value::as_str) == Some("unsuccessful") {
                return Ok(Decision::Unsuccessful);
            }
            match map.remove("element_to_select") {
                Some(Value::Null) | None => Err(BridgeError::Backend(
                    "decision has neither element_to_select nor unsuccessful status".into(),
                )),
                Some(element) => Ok(Decision::Select(serde_json::from_value(element)?)),
            }
        }
        other => Err(BridgeError::Backend(format!("unexpected decision: {}", other))),
    }
}

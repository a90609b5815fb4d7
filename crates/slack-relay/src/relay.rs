//! The relay operation: parse, validate, forward once, map the outcome.
//!
//! Nothing here knows about axum; the HTTP host and the `send` subcommand
//! both drive [`relay`] with a [`Payload`] and a [`Notifier`].

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RelayError;
use crate::sink::Notifier;

pub const SLACK_WEBHOOK_PREFIX: &str = "https://hooks.slack.com/services/";
pub const SUCCESS_STATUS: &str = "Message sent successfully!";

/// Inbound body before the parse stage.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Raw bytes that must parse as JSON.
    Raw(Vec<u8>),
    /// Already structured, e.g. a decoded form.
    Structured(Value),
}

impl Payload {
    fn parse(self) -> Result<Value, RelayError> {
        let value = match self {
            Payload::Structured(value) => value,
            Payload::Raw(raw) if raw.iter().all(u8::is_ascii_whitespace) => {
                Value::Object(Map::new())
            }
            Payload::Raw(raw) => serde_json::from_slice(&raw).map_err(not_json)?,
        };

        match value {
            // A JSON string body carries the real document inside it.
            Value::String(text) => match serde_json::from_str::<Value>(&text).map_err(not_json)? {
                Value::Null => Err(RelayError::InvalidJson),
                inner => Ok(inner),
            },
            Value::Null => Err(RelayError::Internal(
                "cannot read fields of a null request body".to_string(),
            )),
            other => Ok(other),
        }
    }
}

fn not_json(err: serde_json::Error) -> RelayError {
    tracing::debug!(error = %err, "request body is not JSON");
    RelayError::InvalidJson
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRequest {
    pub message: Value,
    pub webhook: String,
}

impl RelayRequest {
    /// Validation in fixed order; first failure wins.
    pub fn from_payload(payload: Payload) -> Result<Self, RelayError> {
        let body = payload.parse()?;

        let message = truthy(body.get("message")).ok_or(RelayError::MissingMessage)?;
        let webhook = truthy(body.get("webhook")).ok_or(RelayError::MissingWebhook)?;
        let webhook = webhook.as_str().ok_or_else(|| {
            RelayError::Internal(format!("webhook must be a string, got {webhook}"))
        })?;

        if !webhook.starts_with(SLACK_WEBHOOK_PREFIX) {
            return Err(RelayError::InvalidWebhook);
        }

        Ok(Self {
            message: message.clone(),
            webhook: webhook.to_string(),
        })
    }
}

/// JSON falsiness: absent, null, false, 0 and "" all count as missing.
fn truthy(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RelayResponse {
    Sent {
        status: String,
    },
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl From<&RelayError> for RelayResponse {
    fn from(err: &RelayError) -> Self {
        RelayResponse::Failed {
            error: err.category(),
            details: err.details(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub status: StatusCode,
    pub body: RelayResponse,
}

impl RelayOutcome {
    pub fn sent() -> Self {
        Self {
            status: StatusCode::OK,
            body: RelayResponse::Sent {
                status: SUCCESS_STATUS.to_string(),
            },
        }
    }

    pub fn failed(err: &RelayError) -> Self {
        Self {
            status: err.status(),
            body: err.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Validate `payload` and forward it through `notifier`.
///
/// Never fails: every error, including a panic in the notifier, ends up as
/// an error outcome.
pub async fn relay(notifier: &dyn Notifier, payload: Payload) -> RelayOutcome {
    let result = AssertUnwindSafe(forward(notifier, payload))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(RelayError::Internal(panic_message(panic.as_ref()))));

    match result {
        Ok(()) => {
            tracing::info!("message relayed to Slack");
            RelayOutcome::sent()
        }
        Err(err) => {
            if err.is_client_error() {
                tracing::warn!(error = %err, "rejected relay request");
            } else {
                tracing::error!(error = %err, "relay failed");
            }
            RelayOutcome::failed(&err)
        }
    }
}

async fn forward(notifier: &dyn Notifier, payload: Payload) -> Result<(), RelayError> {
    let request = RelayRequest::from_payload(payload)?;

    let delivery = notifier
        .post(&request.webhook, &request.message)
        .await
        .map_err(|err| RelayError::Transport(format!("{err:#}")))?;

    if !delivery.is_success() {
        return Err(RelayError::Upstream {
            status: delivery.status,
            body: delivery.body,
        });
    }
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

use http::StatusCode;
use thiserror::Error;

/// Everything that can go wrong while relaying one message.
///
/// Validation variants render without `details`; the others carry the
/// lower-level diagnostic in their payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Invalid JSON in request body")]
    InvalidJson,

    #[error("Message is required")]
    MissingMessage,

    #[error("Webhook URL is required")]
    MissingWebhook,

    #[error("Invalid Slack webhook URL format")]
    InvalidWebhook,

    /// The webhook answered, but not with a 2xx.
    #[error("Slack API returned {status}: {}", display_body(.body))]
    Upstream { status: u16, body: String },

    /// No response was obtained at all (connect, TLS, timeout...).
    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Internal(String),
}

fn display_body(body: &str) -> &str {
    if body.is_empty() {
        "No response details"
    } else {
        body
    }
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidJson
            | RelayError::MissingMessage
            | RelayError::MissingWebhook
            | RelayError::InvalidWebhook => StatusCode::BAD_REQUEST,
            RelayError::Upstream { .. } | RelayError::Transport(_) | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short category placed in the `error` field of the response.
    pub fn category(&self) -> String {
        match self {
            RelayError::Upstream { .. } | RelayError::Transport(_) => {
                "Failed to send message to Slack API".to_string()
            }
            RelayError::Internal(_) => "Failed to process request".to_string(),
            other => other.to_string(),
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            RelayError::Upstream { .. } | RelayError::Transport(_) | RelayError::Internal(_) => {
                Some(self.to_string())
            }
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

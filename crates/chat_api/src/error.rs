use std::fmt;

use reqwest::StatusCode;
use serde_json::{Error as JsonError, Value};

#[derive(Debug)]
pub enum ChatApiError {
    MissingApiKey,
    InvalidBaseUrl(String),
    InvalidHeader(String),
    InvalidRequestPayload(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    Cancelled,
    Unknown(String),
}

impl ChatApiError {
    /// HTTP status attached to the failure, when the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status, _) => Some(*status),
            Self::Request(error) => error.status(),
            _ => None,
        }
    }
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "API key is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidHeader(message) => write!(f, "invalid request header: {message}"),
            Self::InvalidRequestPayload(message) => write!(f, "invalid request payload: {message}"),
            Self::Request(error) => write!(f, "network error: {error}"),
            Self::Status(status, message) => write!(f, "API error: HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ChatApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ChatApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extract a short human-readable message from a non-2xx response body.
///
/// Understands `{"error":{"message":..}}`, `{"error":".."}` and the
/// problem-details shape (`{"detail":..}` / `{"title":..}`). Anything else
/// falls back to the raw body, then to the status reason phrase.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(message) = message_from_value(&value) {
            return message;
        }
    }

    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn message_from_value(value: &Value) -> Option<String> {
    let error = value.get("error");
    error
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .or_else(|| error.and_then(Value::as_str))
        .or_else(|| value.get("detail").and_then(Value::as_str))
        .or_else(|| value.get("title").and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))
        .and_then(non_empty_string)
        .map(ToOwned::to_owned)
}

fn non_empty_string(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

//! Data models for the passpush server.

use crate::headers::NotificationOptions;
use crate::payload::{BrowserAlert, BrowserPayload, NotificationPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Website push ID of a subject
pub type SubjectId = String;

/// Hex device token issued by the browser
pub type DeviceToken = String;

/// Longest device token accepted from clients
pub const MAX_DEVICE_TOKEN_LEN: usize = 200;

/// A device subscribed to a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub subject_id: SubjectId,
    pub device_token: DeviceToken,

    /// Refreshed on every re-registration
    pub registered_at: DateTime<Utc>,
}

/// Check a device token taken from a request path.
pub fn is_valid_device_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_DEVICE_TOKEN_LEN
        && token.chars().all(|c| c.is_ascii_hexdigit())
}

// === API Request/Response Models ===

/// Log lines reported by Safari
#[derive(Debug, Deserialize)]
pub struct LogRequest {
    #[serde(default)]
    pub logs: Vec<String>,
}

/// Admin trigger body
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub title: String,
    pub body: String,

    /// Action button label
    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub url_args: Vec<String>,

    #[serde(default)]
    pub options: NotificationOptions,
}

impl TriggerRequest {
    /// Split into protocol options and browser content
    pub fn into_parts(self) -> (NotificationOptions, NotificationPayload) {
        let payload = NotificationPayload::Browser(BrowserPayload {
            alert: BrowserAlert {
                title: self.title,
                body: self.body,
                action: self.action,
            },
            url_args: self.url_args,
        });
        (self.options, payload)
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub registrations: usize,
    pub push_enabled: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

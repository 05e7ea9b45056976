//! Notification payloads and their JSON encoding.

use crate::config::Subject;
use serde::{Deserialize, Serialize};

/// Payload could not be turned into a request body.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("url-args has {actual} entries but the URL format string has {expected} placeholders")]
    UrlArgsMismatch { expected: usize, actual: usize },

    #[error("payload serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Alert shown by Safari
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserAlert {
    pub title: String,
    pub body: String,

    /// Label of the action button
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Safari web push content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserPayload {
    pub alert: BrowserAlert,

    /// Substituted in order into the subject's URL format string
    #[serde(rename = "url-args")]
    pub url_args: Vec<String>,
}

/// Notification content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationPayload {
    Browser(BrowserPayload),
}

#[derive(Serialize)]
struct Envelope<'a> {
    aps: &'a BrowserPayload,
}

impl NotificationPayload {
    /// Check the payload against the subject it is sent for.
    pub fn validate(&self, subject: &Subject) -> Result<(), EncodingError> {
        match self {
            NotificationPayload::Browser(browser) => {
                let expected = subject.placeholder_count();
                let actual = browser.url_args.len();
                if expected != actual {
                    return Err(EncodingError::UrlArgsMismatch { expected, actual });
                }
                Ok(())
            }
        }
    }

    /// Encode the gateway request body.
    pub fn encode(&self, subject: &Subject) -> Result<Vec<u8>, EncodingError> {
        self.validate(subject)?;

        match self {
            NotificationPayload::Browser(aps) => Ok(serde_json::to_vec(&Envelope { aps })?),
        }
    }
}

impl From<BrowserPayload> for NotificationPayload {
    fn from(payload: BrowserPayload) -> Self {
        NotificationPayload::Browser(payload)
    }
}

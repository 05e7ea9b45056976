//! APNS request headers.
//!
//! Every header is optional. An empty field is left off the request entirely,
//! which is how the gateway is told to apply its own default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const APNS_ID: &str = "apns-id";
pub const APNS_COLLAPSE_ID: &str = "apns-collapse-id";
pub const APNS_EXPIRATION: &str = "apns-expiration";
pub const APNS_PRIORITY: &str = "apns-priority";
pub const APNS_TOPIC: &str = "apns-topic";
pub const APNS_PUSH_TYPE: &str = "apns-push-type";

/// Wire value for [`Priority::LowPower`].
const LOW_POWER_PRIORITY: &str = "5";

/// Delivery priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Send right away (gateway default, never written to the wire)
    #[default]
    Immediate,
    /// Let the gateway batch deliveries to save device power
    LowPower,
}

/// How the receiving OS treats the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushType {
    Alert,
    Background,
    Voip,
    Complication,
    Fileprovider,
    Mdm,
    Location,
    Liveactivity,
}

impl PushType {
    pub fn as_str(self) -> &'static str {
        match self {
            PushType::Alert => "alert",
            PushType::Background => "background",
            PushType::Voip => "voip",
            PushType::Complication => "complication",
            PushType::Fileprovider => "fileprovider",
            PushType::Mdm => "mdm",
            PushType::Location => "location",
            PushType::Liveactivity => "liveactivity",
        }
    }
}

impl fmt::Display for PushType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-notification protocol metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationOptions {
    /// Canonical UUID for the notification; the gateway assigns one if empty
    pub id: String,

    /// Notifications sharing a collapse ID replace each other on the device
    pub collapse_id: String,

    /// Gateway keeps retrying until this instant; `None` means a single attempt
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub expiration: Option<DateTime<Utc>>,

    pub priority: Priority,

    /// Topic for certificates carrying several topics
    pub topic: String,

    pub push_type: Option<PushType>,
}

impl NotificationOptions {
    /// Render the options as request headers, omitting every empty field.
    pub fn compose(&self) -> BTreeMap<&'static str, String> {
        let mut headers = BTreeMap::new();

        if !self.id.is_empty() {
            headers.insert(APNS_ID, self.id.clone());
        }

        if !self.collapse_id.is_empty() {
            headers.insert(APNS_COLLAPSE_ID, self.collapse_id.clone());
        }

        if let Some(expiration) = self.expiration {
            headers.insert(APNS_EXPIRATION, expiration.timestamp().to_string());
        }

        if self.priority == Priority::LowPower {
            headers.insert(APNS_PRIORITY, LOW_POWER_PRIORITY.to_string());
        }

        if !self.topic.is_empty() {
            headers.insert(APNS_TOPIC, self.topic.clone());
        }

        if let Some(push_type) = self.push_type {
            headers.insert(APNS_PUSH_TYPE, push_type.as_str().to_string());
        }

        headers
    }
}

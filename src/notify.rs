//! Fan-out of a change notification to every subscribed device.
//!
//! One device's failure never stops the others. Devices the gateway reports
//! as gone are unregistered on the spot.

use crate::apns::{token_prefix, ApnsClient, FailureKind, PushError};
use crate::config::Subject;
use crate::headers::NotificationOptions;
use crate::payload::{EncodingError, NotificationPayload};
use crate::store::{RegistrationStore, StoreError};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one device's dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Delivered { apns_id: String },
    Failed { kind: FailureKind, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceOutcome {
    pub device_token: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Per-device results, in subscriber order
#[derive(Debug, Clone, Serialize)]
pub struct NotifyReport {
    pub subject_id: String,
    pub outcomes: Vec<DeviceOutcome>,
}

impl NotifyReport {
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Delivered { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

/// The batch could not be started at all
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Registration-triggered push workflow
pub struct Notifier {
    store: Arc<dyn RegistrationStore>,
    apns: Arc<ApnsClient>,
    concurrency: usize,
}

impl Notifier {
    pub fn new(store: Arc<dyn RegistrationStore>, apns: Arc<ApnsClient>, concurrency: usize) -> Self {
        Self {
            store,
            apns,
            concurrency: concurrency.max(1),
        }
    }

    /// Push `payload` to every device subscribed to `subject`.
    ///
    /// Makes at most one attempt per device. Dropping the returned future
    /// stops further dispatches; unregistrations already made stay made.
    pub async fn notify_changed(
        &self,
        subject: &Subject,
        options: &NotificationOptions,
        payload: &NotificationPayload,
    ) -> Result<NotifyReport, NotifyError> {
        let body = Bytes::from(payload.encode(subject)?);
        let subject_id = subject.website_push_id.as_str();
        let devices = self.store.subscribers(subject_id).await?;

        let outcomes: Vec<DeviceOutcome> = stream::iter(devices)
            .map(|device_token| {
                let body = body.clone();
                async move {
                    let outcome = match self.apns.send(&device_token, options, body).await {
                        Ok(apns_id) => Outcome::Delivered { apns_id },
                        Err(e) => self.failed(subject_id, &device_token, &e).await,
                    };
                    DeviceOutcome {
                        device_token,
                        outcome,
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = NotifyReport {
            subject_id: subject_id.to_string(),
            outcomes,
        };

        info!(
            subject = %subject_id,
            total = report.outcomes.len(),
            delivered = report.delivered(),
            failed = report.failed(),
            "Sent push notifications"
        );

        Ok(report)
    }

    async fn failed(&self, subject_id: &str, device_token: &str, err: &PushError) -> Outcome {
        if let PushError::DeviceGone { .. } = err {
            match self.store.unregister(subject_id, device_token).await {
                Ok(_) => info!(
                    subject = %subject_id,
                    token = token_prefix(device_token),
                    "Unregistered device reported gone by gateway"
                ),
                Err(e) => warn!(
                    subject = %subject_id,
                    token = token_prefix(device_token),
                    error = %e,
                    "Failed to unregister gone device"
                ),
            }
        }

        Outcome::Failed {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

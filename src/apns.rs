//! Apple Push Notification Service (APNS) integration.
//!
//! Each push is exactly one exchange with the gateway. The response is
//! classified into a [`PushError`] kind; retrying is left to the caller.

use crate::config::{Config, Subject};
use crate::credentials;
use crate::headers::{NotificationOptions, APNS_ID};
use crate::payload::{EncodingError, NotificationPayload};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Production gateway
pub const PRODUCTION_HOST: &str = "https://api.push.apple.com";

/// Development (sandbox) gateway
pub const DEVELOPMENT_HOST: &str = "https://api.development.push.apple.com";

/// Request handed to a [`Transport`]
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// Path below the gateway host, `/3/device/{token}`
    pub path: String,
    pub headers: BTreeMap<&'static str, String>,
    pub body: Bytes,
}

/// Raw gateway answer
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    /// `apns-id` response header
    pub apns_id: Option<String>,
    pub body: Bytes,
}

/// Network-level failure of a single exchange
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway connection failed: {0}")]
    Connect(String),

    #[error("invalid gateway request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Connect(err.to_string())
        }
    }
}

/// Sends one request to the gateway.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: GatewayRequest) -> Result<GatewayResponse, TransportError>;
}

/// HTTP/2 transport authenticated with a client certificate
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        identity: Option<reqwest::Identity>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout);

        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: GatewayRequest) -> Result<GatewayResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.body);

        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let apns_id = response
            .headers()
            .get(APNS_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(GatewayResponse {
            status,
            apns_id,
            body,
        })
    }
}

/// Rejection reason reported in the gateway's error body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    BadCollapseId,
    BadDeviceToken,
    BadExpirationDate,
    BadMessageId,
    BadPriority,
    BadTopic,
    DeviceTokenNotForTopic,
    DuplicateHeaders,
    IdleTimeout,
    InvalidPushType,
    MissingDeviceToken,
    MissingTopic,
    PayloadEmpty,
    TopicDisallowed,
    BadCertificate,
    BadCertificateEnvironment,
    ExpiredProviderToken,
    Forbidden,
    InvalidProviderToken,
    MissingProviderToken,
    BadPath,
    MethodNotAllowed,
    ExpiredToken,
    Unregistered,
    PayloadTooLarge,
    TooManyProviderTokenUpdates,
    TooManyRequests,
    InternalServerError,
    ServiceUnavailable,
    Shutdown,
    #[serde(other)]
    Unknown,
}

impl Reason {
    /// Reasons that mean our credential, not the request, is at fault.
    fn is_credential_problem(self) -> bool {
        matches!(
            self,
            Reason::BadCertificate
                | Reason::BadCertificateEnvironment
                | Reason::ExpiredProviderToken
                | Reason::InvalidProviderToken
                | Reason::MissingProviderToken
        )
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Variant names match the wire names
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    reason: Option<Reason>,
    /// Milliseconds since the epoch at which the token stopped being valid
    timestamp: Option<i64>,
}

/// Coarse failure category, used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Encoding,
    BadRequest,
    Unauthorized,
    Forbidden,
    DeviceGone,
    Throttled,
    GatewayUnavailable,
}

/// Why a push was not delivered
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("gateway rejected the request: {reason}")]
    BadRequest { reason: Reason },

    #[error("gateway refused our credentials: {reason}")]
    Unauthorized { reason: Reason },

    #[error("gateway refused the request: {reason}")]
    Forbidden { reason: Reason },

    #[error("device token is no longer valid: {reason}")]
    DeviceGone {
        reason: Reason,
        since: Option<DateTime<Utc>>,
    },

    #[error("gateway throttled the request: {reason}")]
    Throttled { reason: Reason },

    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

impl PushError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PushError::Encoding(_) => FailureKind::Encoding,
            PushError::BadRequest { .. } => FailureKind::BadRequest,
            PushError::Unauthorized { .. } => FailureKind::Unauthorized,
            PushError::Forbidden { .. } => FailureKind::Forbidden,
            PushError::DeviceGone { .. } => FailureKind::DeviceGone,
            PushError::Throttled { .. } => FailureKind::Throttled,
            PushError::GatewayUnavailable(_) => FailureKind::GatewayUnavailable,
        }
    }

    /// Whether the same request may succeed later after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PushError::Throttled { .. } | PushError::GatewayUnavailable(_)
        )
    }
}

impl From<TransportError> for PushError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidRequest(_) => PushError::BadRequest {
                reason: Reason::Unknown,
            },
            other => PushError::GatewayUnavailable(other.to_string()),
        }
    }
}

/// Map a gateway response to the assigned ID or a classified error.
fn classify(response: GatewayResponse) -> Result<Option<String>, PushError> {
    if (200..300).contains(&response.status) {
        return Ok(response.apns_id);
    }

    let body: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
    let reason = body.reason.unwrap_or(Reason::Unknown);

    Err(match response.status {
        410 => PushError::DeviceGone {
            reason,
            since: body
                .timestamp
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        },
        401 => PushError::Unauthorized { reason },
        403 if reason.is_credential_problem() => PushError::Unauthorized { reason },
        403 => PushError::Forbidden { reason },
        429 => PushError::Throttled { reason },
        400..=499 => PushError::BadRequest { reason },
        500..=599 => {
            PushError::GatewayUnavailable(format!("status {} ({reason})", response.status))
        }
        other => PushError::GatewayUnavailable(format!("unexpected status {other}")),
    })
}

/// Short, log-safe prefix of a device token
pub(crate) fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

/// APNS client wrapper
pub struct ApnsClient {
    transport: Option<Arc<dyn Transport>>,
    timeout: Duration,
}

impl ApnsClient {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            timeout,
        }
    }

    /// Client that reports every push as gateway-unavailable
    pub fn disabled() -> Self {
        Self {
            transport: None,
            timeout: Duration::ZERO,
        }
    }

    /// Create a new APNS client from configuration
    pub fn from_config(config: &Config) -> Self {
        let identity = match &config.apns_cert_path {
            Some(path) => match credentials::load_identity(path, &config.apns_cert_password) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    error!(path = %path, error = %e, "Failed to load APNS certificate");
                    return Self::disabled();
                }
            },
            // A host override without a certificate talks to a local gateway simulator
            None if config.apns_host.is_some() => None,
            None => {
                warn!("APNS not configured - push notifications disabled");
                return Self::disabled();
            }
        };

        let base_url = config.apns_base_url();
        match HttpTransport::new(base_url, identity, config.push_timeout) {
            Ok(transport) => {
                debug!(host = %base_url, "APNS client initialized");
                Self::new(Arc::new(transport), config.push_timeout)
            }
            Err(e) => {
                error!(error = %e, "Failed to create APNS client");
                Self::disabled()
            }
        }
    }

    /// Check if APNS is enabled
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Encode `payload` for `subject` and push it to one device.
    ///
    /// Returns the notification ID on success. Nothing is sent when the
    /// payload fails validation.
    pub async fn push(
        &self,
        device_token: &str,
        options: &NotificationOptions,
        payload: &NotificationPayload,
        subject: &Subject,
    ) -> Result<String, PushError> {
        let body = payload.encode(subject)?;
        self.send(device_token, options, Bytes::from(body)).await
    }

    /// Push an already encoded body to one device.
    pub async fn send(
        &self,
        device_token: &str,
        options: &NotificationOptions,
        body: Bytes,
    ) -> Result<String, PushError> {
        let transport = self.transport.as_ref().ok_or_else(|| {
            PushError::GatewayUnavailable("push gateway not configured".to_string())
        })?;

        let request = GatewayRequest {
            path: format!("/3/device/{device_token}"),
            headers: options.compose(),
            body,
        };

        let response = match tokio::time::timeout(self.timeout, transport.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!(token = token_prefix(device_token), error = %e, "Gateway exchange failed");
                return Err(e.into());
            }
            Err(_) => {
                debug!(
                    token = token_prefix(device_token),
                    timeout = ?self.timeout,
                    "Gateway exchange timed out"
                );
                return Err(TransportError::Timeout.into());
            }
        };

        let status = response.status;
        match classify(response) {
            Ok(apns_id) => {
                debug!(token = token_prefix(device_token), status, "Push delivered");
                Ok(apns_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| options.id.clone()))
            }
            Err(e) => {
                debug!(token = token_prefix(device_token), status, error = %e, "Push rejected");
                Err(e)
            }
        }
    }
}

/// Create a shared APNS client
pub fn create_client(config: &Config) -> Arc<ApnsClient> {
    Arc::new(ApnsClient::from_config(config))
}

//! HTTP request handlers for the passpush web service.
//!
//! Safari calls the registration, package and log endpoints. The admin
//! trigger starts a fan-out to every device subscribed to a subject.

use crate::apns::{token_prefix, ApnsClient};
use crate::auth::{require_bearer_token, require_push_token, AuthError};
use crate::config::{Config, Subject};
use crate::models::*;
use crate::notify::{Notifier, NotifyError, NotifyReport};
use crate::package::{PackageError, PackageSource};
use crate::store::{RegistrationStore, StoreError};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RegistrationStore>,
    pub apns: Arc<ApnsClient>,
    pub notifier: Arc<Notifier>,
    pub packages: Arc<dyn PackageSource>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn RegistrationStore>,
        apns: Arc<ApnsClient>,
        packages: Arc<dyn PackageSource>,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(
            store.clone(),
            apns.clone(),
            config.push_concurrency,
        ));
        Self {
            config,
            store,
            apns,
            notifier,
            packages,
        }
    }

    fn subject(&self, website_push_id: &str) -> Result<&Subject, ApiError> {
        self.config
            .subject(website_push_id)
            .ok_or(ApiError::SubjectNotFound)
    }
}

// === Health Check ===

/// GET /health - Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        registrations: state.store.len(),
        push_enabled: state.apns.is_enabled(),
    })
}

// === Device Registration ===

/// Resolve the subject, check Safari's token and the device token format.
fn authorize_device(
    state: &AppState,
    headers: &HeaderMap,
    device_token: &str,
    website_push_id: &str,
) -> Result<(), ApiError> {
    let subject = state.subject(website_push_id)?;
    require_push_token(headers, &subject.authentication_token).map_err(|e| {
        warn!(subject = %website_push_id, "Push token verification failed");
        e
    })?;

    if !is_valid_device_token(device_token) {
        return Err(ApiError::InvalidInput("invalid device token"));
    }
    Ok(())
}

/// POST /v1/devices/:device_token/registrations/:website_push_id
///
/// Called by Safari when the user grants permission. Re-registering an
/// existing device only refreshes its timestamp.
pub async fn register_device(
    State(state): State<AppState>,
    Path((device_token, website_push_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authorize_device(&state, &headers, &device_token, &website_push_id)?;

    state
        .store
        .register(&website_push_id, &device_token)
        .await?;

    info!(
        subject = %website_push_id,
        token = token_prefix(&device_token),
        "Device registered"
    );

    Ok(StatusCode::OK)
}

/// DELETE /v1/devices/:device_token/registrations/:website_push_id
///
/// Succeeds whether or not the device was registered.
pub async fn unregister_device(
    State(state): State<AppState>,
    Path((device_token, website_push_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authorize_device(&state, &headers, &device_token, &website_push_id)?;

    let removed = state
        .store
        .unregister(&website_push_id, &device_token)
        .await?;

    if removed {
        info!(
            subject = %website_push_id,
            token = token_prefix(&device_token),
            "Device unregistered"
        );
    } else {
        debug!(
            subject = %website_push_id,
            token = token_prefix(&device_token),
            "Unregister for unknown device"
        );
    }

    Ok(StatusCode::OK)
}

// === Push Package ===

/// POST /v1/pushPackages/:website_push_id - Stream the signed package
pub async fn push_package(
    State(state): State<AppState>,
    Path(website_push_id): Path<String>,
) -> Result<Response, ApiError> {
    let subject = state.subject(&website_push_id)?;
    let package = state.packages.open(subject).await?;

    debug!(subject = %website_push_id, "Serving push package");

    Ok((
        [(header::CONTENT_TYPE, "application/zip")],
        Body::from_stream(ReaderStream::new(package)),
    )
        .into_response())
}

// === Browser Logs ===

/// POST /v1/log - Errors reported by Safari
pub async fn log_messages(Json(req): Json<LogRequest>) -> StatusCode {
    for line in &req.logs {
        warn!(message = %line, "Safari reported push error");
    }
    StatusCode::OK
}

// === Admin Trigger ===

/// POST /v1/admin/subjects/:website_push_id/push
///
/// Pushes to every subscriber and returns the per-device report. Individual
/// device failures are part of the report, not an error. The body is only
/// parsed once the caller is authenticated.
pub async fn trigger_push(
    State(state): State<AppState>,
    Path(website_push_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<NotifyReport>, ApiError> {
    let admin_token = state
        .config
        .admin_token
        .as_deref()
        .ok_or(ApiError::TriggerDisabled)?;
    require_bearer_token(&headers, admin_token)?;

    let subject = state.subject(&website_push_id)?;

    let req: TriggerRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::InvalidInput("invalid trigger request body"))?;
    let (options, payload) = req.into_parts();
    if !options.id.is_empty() && !is_canonical_uuid(&options.id) {
        return Err(ApiError::InvalidInput(
            "options.id must be a hyphenated lowercase UUID",
        ));
    }

    let report = state
        .notifier
        .notify_changed(subject, &options, &payload)
        .await?;

    Ok(Json(report))
}

/// Only the form the gateway accepts in `apns-id`
fn is_canonical_uuid(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok_and(|u| u.hyphenated().to_string() == id)
}

// === Error Handling ===

/// API error types
#[derive(Debug)]
pub enum ApiError {
    InvalidInput(&'static str),
    SubjectNotFound,
    /// Payload does not fit the subject
    Encoding(String),
    PackageNotFound,
    /// Trigger requested but no admin token configured
    TriggerDisabled,
    /// Store full or unreachable
    StoreUnavailable,
    Internal,
    /// Authorization error (wraps AuthError)
    Auth(AuthError),
}

/// Implement From<AuthError> to enable ? operator in handlers
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AtCapacity => {
                warn!("Registration rejected: store at capacity");
                ApiError::StoreUnavailable
            }
            StoreError::Unavailable(reason) => {
                error!(error = %reason, "Registration store unavailable");
                ApiError::StoreUnavailable
            }
        }
    }
}

impl From<NotifyError> for ApiError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::Encoding(e) => ApiError::Encoding(e.to_string()),
            NotifyError::Store(e) => e.into(),
        }
    }
}

impl From<PackageError> for ApiError {
    fn from(err: PackageError) -> Self {
        match err {
            PackageError::NotFound(_) => ApiError::PackageNotFound,
            PackageError::Io(e) => {
                error!(error = %e, "Failed to open push package");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Auth(auth_err) => return auth_err.into_response(),
            ApiError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.to_string())
            }
            ApiError::SubjectNotFound => (
                StatusCode::NOT_FOUND,
                "SUBJECT_NOT_FOUND",
                "unknown website push id".to_string(),
            ),
            ApiError::Encoding(msg) => (StatusCode::BAD_REQUEST, "ENCODING_ERROR", msg),
            ApiError::PackageNotFound => (
                StatusCode::NOT_FOUND,
                "PACKAGE_NOT_FOUND",
                "push package not available".to_string(),
            ),
            ApiError::TriggerDisabled => (
                StatusCode::FORBIDDEN,
                "TRIGGER_DISABLED",
                "push trigger is disabled".to_string(),
            ),
            ApiError::StoreUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "registration store unavailable, try again later".to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
        });

        (status, body).into_response()
    }
}

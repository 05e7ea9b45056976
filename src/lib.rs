//! # Passpush
//!
//! Safari web push service: device registration, push package serving and
//! notification dispatch through the Apple Push Notification service.
//!
//! ## Design Principles
//!
//! - **RAM-only registrations**: lost on restart, no implicit expiry
//! - **One attempt per device**: every push is a single gateway exchange
//! - **Per-device outcomes**: a failing device never aborts a fan-out
//! - **Minimal logging**: device tokens are logged as short prefixes only
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Safari    │────▶│   Backend   │────▶│    APNS     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                     ┌──────┴──────┐
//!                     │             │
//!                 In-Memory      Push
//!                   Store      Packages
//! ```
//!
//! ## API Overview
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/health` | GET | Health check |
//! | `/v1/devices/:token/registrations/:id` | POST | Register device |
//! | `/v1/devices/:token/registrations/:id` | DELETE | Unregister device |
//! | `/v1/pushPackages/:id` | POST | Download push package |
//! | `/v1/log` | POST | Safari error log |
//! | `/v1/admin/subjects/:id/push` | POST | Push to all subscribers |

pub mod apns;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod handlers;
pub mod headers;
pub mod models;
pub mod notify;
pub mod package;
pub mod payload;
pub mod store;

pub use config::{Config, Subject};
pub use handlers::AppState;
pub use notify::{Notifier, NotifyReport};
pub use store::{MemoryStore, RegistrationStore};

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Maximum request body size (16 KiB).
pub const MAX_BODY_SIZE: usize = 16 * 1024;

/// Build the Axum router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check (unauthenticated)
        .route("/health", get(handlers::health))
        // Safari web service
        .route(
            "/v1/devices/:device_token/registrations/:website_push_id",
            post(handlers::register_device).delete(handlers::unregister_device),
        )
        .route(
            "/v1/pushPackages/:website_push_id",
            post(handlers::push_package),
        )
        .route("/v1/log", post(handlers::log_messages))
        // Admin
        .route(
            "/v1/admin/subjects/:website_push_id/push",
            post(handlers::trigger_push),
        )
        // Middleware stack (order matters: first added = outermost)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

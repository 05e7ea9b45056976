//! Configuration for the passpush server.
//!
//! All configuration is loaded from environment variables.
//! No secrets are logged.

use std::path::PathBuf;
use std::time::Duration;

/// Placeholder token used by Safari URL format strings.
pub const URL_PLACEHOLDER: &str = "%@";

/// A website identity devices subscribe to.
///
/// Read-only at runtime. The same values are baked into the signed push
/// package, so changing them requires re-signing the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Human readable website name
    pub name: String,

    /// Website push ID (`web.com.example...`), the subject identifier
    pub website_push_id: String,

    /// Origins allowed to ask for push permission
    pub allowed_domains: Vec<String>,

    /// Click-through URL with one `%@` per URL argument
    pub url_format_string: String,

    /// Token Safari echoes back on every web-service request
    pub authentication_token: String,

    /// Base URL of this web service
    pub web_service_url: String,
}

impl Subject {
    /// Number of `%@` placeholders in the URL format string.
    pub fn placeholder_count(&self) -> usize {
        self.url_format_string.matches(URL_PLACEHOLDER).count()
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,

    /// Server port
    pub port: u16,

    /// Configured website identities
    pub subjects: Vec<Subject>,

    // === APNS Configuration ===
    /// Path to the PKCS#12 push certificate
    pub apns_cert_path: Option<String>,

    /// Password for the PKCS#12 file
    pub apns_cert_password: String,

    /// Use APNS sandbox (development) environment
    pub apns_sandbox: bool,

    /// Explicit gateway base URL, overrides the sandbox switch
    pub apns_host: Option<String>,

    /// Deadline for a single gateway exchange (default: 10 seconds)
    pub push_timeout: Duration,

    /// Parallel dispatches per fan-out (default: 8)
    pub push_concurrency: usize,

    // === Limits ===
    /// Maximum live registrations across all subjects (default: 100,000)
    pub max_registrations: usize,

    /// Directory holding pre-signed `{website_push_id}.zip` packages
    pub push_package_dir: PathBuf,

    /// Bearer token for the admin trigger; unset disables the trigger
    pub admin_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),

            subjects: subject_from_env().into_iter().collect(),

            // APNS
            apns_cert_path: std::env::var("APNS_CERT_PATH").ok(),
            apns_cert_password: std::env::var("APNS_CERT_PASSWORD").unwrap_or_default(),
            apns_sandbox: std::env::var("APNS_SANDBOX")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true), // Default to sandbox for safety
            apns_host: std::env::var("APNS_HOST").ok().filter(|h| !h.is_empty()),
            push_timeout: Duration::from_secs(
                std::env::var("PUSH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            push_concurrency: std::env::var("PUSH_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(8),

            // Limits
            max_registrations: std::env::var("MAX_REGISTRATIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100_000),
            push_package_dir: std::env::var("PUSH_PACKAGE_DIR")
                .unwrap_or_else(|_| "push-packages".to_string())
                .into(),
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    /// Check if an APNS certificate is configured
    pub fn apns_configured(&self) -> bool {
        self.apns_cert_path.is_some()
    }

    /// Gateway base URL for the selected environment
    pub fn apns_base_url(&self) -> &str {
        match &self.apns_host {
            Some(host) => host,
            None if self.apns_sandbox => crate::apns::DEVELOPMENT_HOST,
            None => crate::apns::PRODUCTION_HOST,
        }
    }

    /// Look up a configured subject by website push ID
    pub fn subject(&self, website_push_id: &str) -> Option<&Subject> {
        self.subjects
            .iter()
            .find(|s| s.website_push_id == website_push_id)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// The single website identity described by `WEBSITE_*` variables, if any.
fn subject_from_env() -> Option<Subject> {
    let website_push_id = std::env::var("WEBSITE_PUSH_ID").ok()?;

    Some(Subject {
        name: std::env::var("WEBSITE_NAME").unwrap_or_else(|_| "Passpush".to_string()),
        website_push_id,
        allowed_domains: std::env::var("ALLOWED_DOMAINS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_default(),
        url_format_string: std::env::var("URL_FORMAT_STRING").unwrap_or_default(),
        authentication_token: std::env::var("AUTHENTICATION_TOKEN").unwrap_or_default(),
        web_service_url: std::env::var("WEB_SERVICE_URL").unwrap_or_default(),
    })
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

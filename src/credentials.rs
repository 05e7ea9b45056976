//! Push certificate loading.
//!
//! The gateway authenticates us with the TLS client certificate exported from
//! the developer portal as a password protected PKCS#12 file.

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to read certificate file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid PKCS#12 certificate or password: {0}")]
    Invalid(#[from] reqwest::Error),
}

/// Load a certificate + private key pair usable as a TLS client identity.
pub fn load_identity(
    path: impl AsRef<Path>,
    password: &str,
) -> Result<reqwest::Identity, CredentialError> {
    let der = std::fs::read(path)?;
    Ok(reqwest::Identity::from_pkcs12_der(&der, password)?)
}

//! Push package serving.
//!
//! Packages are zip archives signed offline. This module only locates and
//! streams them.

use crate::config::Subject;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Readable package archive
pub type PackageStream = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("no push package for {0}")]
    NotFound(String),

    #[error("failed to open push package: {0}")]
    Io(#[from] std::io::Error),
}

/// Provider of signed push packages.
#[async_trait]
pub trait PackageSource: Send + Sync {
    async fn open(&self, subject: &Subject) -> Result<PackageStream, PackageError>;
}

/// Serves `{dir}/{website_push_id}.zip`
#[derive(Debug, Clone)]
pub struct DirectoryPackages {
    dir: PathBuf,
}

impl DirectoryPackages {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, subject: &Subject) -> PathBuf {
        self.dir.join(format!("{}.zip", subject.website_push_id))
    }
}

#[async_trait]
impl PackageSource for DirectoryPackages {
    async fn open(&self, subject: &Subject) -> Result<PackageStream, PackageError> {
        match tokio::fs::File::open(self.path_for(subject)).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PackageError::NotFound(subject.website_push_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn subject(website_push_id: &str) -> Subject {
        Subject {
            name: "Example".to_string(),
            website_push_id: website_push_id.to_string(),
            allowed_domains: vec![],
            url_format_string: "https://example.com/%@".to_string(),
            authentication_token: "token".to_string(),
            web_service_url: "https://example.com".to_string(),
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("passpush-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn opens_archive_named_after_subject() {
        let dir = temp_dir("packages");
        std::fs::write(dir.join("web.com.example.zip"), b"PK\x03\x04archive").unwrap();
        let source = DirectoryPackages::new(&dir);

        let mut stream = source.open(&subject("web.com.example")).await.unwrap();
        let mut contents = Vec::new();
        stream.read_to_end(&mut contents).await.unwrap();

        assert_eq!(contents, b"PK\x03\x04archive");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_archive_is_not_found() {
        let dir = temp_dir("empty-packages");
        let source = DirectoryPackages::new(&dir);

        let err = source.open(&subject("web.com.missing")).await.err().unwrap();

        assert!(matches!(err, PackageError::NotFound(id) if id == "web.com.missing"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}

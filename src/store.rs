//! Device registration store.
//!
//! Registrations live in RAM only and are lost on restart. They never expire
//! on their own: a device leaves the table when Safari unregisters it or when
//! the gateway reports its token as gone.

use crate::models::{DeviceToken, Registration, SubjectId};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("registration store is at capacity")]
    AtCapacity,

    #[error("registration store unavailable: {0}")]
    Unavailable(String),
}

/// Mapping from subject to the devices subscribed to it.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert or refresh a registration. Idempotent.
    async fn register(
        &self,
        subject_id: &str,
        device_token: &str,
    ) -> Result<Registration, StoreError>;

    /// Remove a registration. Returns whether one existed.
    async fn unregister(&self, subject_id: &str, device_token: &str) -> Result<bool, StoreError>;

    /// Snapshot of the devices subscribed to a subject.
    async fn subscribers(&self, subject_id: &str) -> Result<BTreeSet<DeviceToken>, StoreError>;

    async fn registration(
        &self,
        subject_id: &str,
        device_token: &str,
    ) -> Result<Option<Registration>, StoreError>;

    /// Live registrations across all subjects
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thread-safe in-memory store
///
/// Each subject's device set is changed under its shard write lock and copied
/// under the shard read lock, so readers never see a half-applied write.
#[derive(Clone)]
pub struct MemoryStore {
    /// Device registrations per subject
    devices: Arc<DashMap<SubjectId, HashMap<DeviceToken, Registration>>>,

    /// Live registrations, reserved before insert
    total: Arc<AtomicUsize>,

    max_registrations: usize,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new(max_registrations: usize) -> Self {
        Self {
            devices: Arc::new(DashMap::new()),
            total: Arc::new(AtomicUsize::new(0)),
            max_registrations,
        }
    }

    fn reserve_slot(&self) -> bool {
        self.total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_registrations).then_some(n + 1)
            })
            .is_ok()
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn register(
        &self,
        subject_id: &str,
        device_token: &str,
    ) -> Result<Registration, StoreError> {
        let now = Utc::now();

        let mut entry = self.devices.entry(subject_id.to_string()).or_default();
        let devices = entry.value_mut();

        // Re-registration refreshes the timestamp
        if let Some(existing) = devices.get_mut(device_token) {
            existing.registered_at = now;
            debug!("Refreshed device registration");
            return Ok(existing.clone());
        }

        if !self.reserve_slot() {
            let empty = devices.is_empty();
            drop(entry);
            if empty {
                self.devices.remove_if(subject_id, |_, v| v.is_empty());
            }
            return Err(StoreError::AtCapacity);
        }

        let registration = Registration {
            subject_id: subject_id.to_string(),
            device_token: device_token.to_string(),
            registered_at: now,
        };
        devices.insert(device_token.to_string(), registration.clone());

        debug!("Registered device for push notifications");

        Ok(registration)
    }

    async fn unregister(&self, subject_id: &str, device_token: &str) -> Result<bool, StoreError> {
        let removed = match self.devices.get_mut(subject_id) {
            Some(mut entry) => entry.value_mut().remove(device_token).is_some(),
            None => false,
        };

        if removed {
            self.total.fetch_sub(1, Ordering::AcqRel);
            self.devices.remove_if(subject_id, |_, v| v.is_empty());
            debug!("Unregistered device");
        }

        Ok(removed)
    }

    async fn subscribers(&self, subject_id: &str) -> Result<BTreeSet<DeviceToken>, StoreError> {
        Ok(self
            .devices
            .get(subject_id)
            .map(|entry| entry.value().keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn registration(
        &self,
        subject_id: &str,
        device_token: &str,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(self
            .devices
            .get(subject_id)
            .and_then(|entry| entry.value().get(device_token).cloned()))
    }

    fn len(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SUBJECT: &str = "web.com.example";

    #[tokio::test]
    async fn register_then_unregister_is_idempotent() {
        let store = MemoryStore::new(100);

        store.register(SUBJECT, "d1").await.unwrap();
        assert!(store.subscribers(SUBJECT).await.unwrap().contains("d1"));

        assert!(store.unregister(SUBJECT, "d1").await.unwrap());
        assert!(!store.subscribers(SUBJECT).await.unwrap().contains("d1"));

        // Second unregister is a no-op
        assert!(!store.unregister(SUBJECT, "d1").await.unwrap());
        assert!(!store.unregister("web.com.unknown", "d1").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn re_registration_refreshes_without_duplicating() {
        let store = MemoryStore::new(100);

        let first = store.register(SUBJECT, "d1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = store.register(SUBJECT, "d1").await.unwrap();

        assert!(second.registered_at > first.registered_at);
        assert_eq!(store.len(), 1);
        assert_eq!(store.subscribers(SUBJECT).await.unwrap().len(), 1);

        let stored = store.registration(SUBJECT, "d1").await.unwrap().unwrap();
        assert_eq!(stored.registered_at, second.registered_at);
    }

    #[tokio::test]
    async fn subscribers_is_a_snapshot() {
        let store = MemoryStore::new(100);
        store.register(SUBJECT, "d1").await.unwrap();

        let snapshot = store.subscribers(SUBJECT).await.unwrap();
        store.register(SUBJECT, "d2").await.unwrap();
        store.unregister(SUBJECT, "d1").await.unwrap();

        assert_eq!(snapshot.into_iter().collect::<Vec<_>>(), vec!["d1"]);
        assert_eq!(
            store.subscribers(SUBJECT).await.unwrap().into_iter().collect::<Vec<_>>(),
            vec!["d2"]
        );
    }

    #[tokio::test]
    async fn subjects_are_isolated() {
        let store = MemoryStore::new(100);
        store.register("web.com.a", "d1").await.unwrap();
        store.register("web.com.b", "d2").await.unwrap();

        assert_eq!(store.subscribers("web.com.a").await.unwrap().len(), 1);
        assert!(store.registration("web.com.a", "d2").await.unwrap().is_none());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn capacity_limits_new_pairs_only() {
        let store = MemoryStore::new(2);
        store.register(SUBJECT, "d1").await.unwrap();
        store.register(SUBJECT, "d2").await.unwrap();

        let err = store.register("web.com.other", "d3").await.unwrap_err();
        assert!(matches!(err, StoreError::AtCapacity));
        assert!(store.subscribers("web.com.other").await.unwrap().is_empty());

        // Refreshing an existing pair still works
        store.register(SUBJECT, "d1").await.unwrap();

        store.unregister(SUBJECT, "d2").await.unwrap();
        store.register("web.com.other", "d3").await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_register_and_enumerate() {
        let store = MemoryStore::new(10_000);
        let expected: BTreeSet<String> = (0..64).map(|i| format!("{i:02x}")).collect();

        let writers: Vec<_> = expected
            .iter()
            .cloned()
            .map(|token| {
                let store = store.clone();
                tokio::spawn(async move { store.register(SUBJECT, &token).await.unwrap() })
            })
            .collect();

        let readers: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.subscribers(SUBJECT).await.unwrap() })
            })
            .collect();

        for writer in writers {
            writer.await.unwrap();
        }
        for reader in readers {
            let snapshot = reader.await.unwrap();
            assert!(snapshot.is_subset(&expected));
        }

        assert_eq!(store.subscribers(SUBJECT).await.unwrap(), expected);
        assert_eq!(store.len(), expected.len());
    }
}

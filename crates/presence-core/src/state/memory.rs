// # Memory Status Store
//
// In-memory holder of the single status record.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - The notification handle resets to absent, so the first delivery after a
//   restart creates a fresh message instead of editing the old one
//
// ## Ownership
//
// `StatusStore` is deliberately not `Clone`: exactly one owner (the
// `Reconciler`) can write. Readers such as the HTTP endpoint hold
// `StatusReader` handles, which share the same cell but expose no writes.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::status::TrackedStatus;
use crate::traits::NotificationHandle;

/// The process-wide status record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRecord {
    /// Last observed status (offline before the first observation)
    pub status: TrackedStatus,
    /// Handle of the last successfully created notification
    pub handle: Option<NotificationHandle>,
    /// Status carried by the last successfully delivered notification
    pub notified_status: Option<TrackedStatus>,
    /// When `status` was last written
    pub last_observed: Option<chrono::DateTime<chrono::Utc>>,
}

/// Writable status store, owned by the reconciler
#[derive(Debug, Default)]
pub struct StatusStore {
    inner: Arc<RwLock<StatusRecord>>,
}

impl StatusStore {
    /// Create a store holding the default record (offline, no handle)
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only handle sharing this store's record
    pub fn reader(&self) -> StatusReader {
        StatusReader {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Current status
    pub async fn read(&self) -> TrackedStatus {
        self.inner.read().await.status
    }

    /// Full snapshot of the record
    pub async fn record(&self) -> StatusRecord {
        self.inner.read().await.clone()
    }

    /// Store a new status, and a new handle when one is given
    ///
    /// Passing `None` keeps the existing handle; the handle is never cleared
    /// once a message has been created.
    pub async fn write(&self, status: TrackedStatus, handle: Option<NotificationHandle>) {
        let mut guard = self.inner.write().await;
        guard.status = status;
        guard.last_observed = Some(chrono::Utc::now());
        if let Some(handle) = handle {
            guard.handle = Some(handle);
        }
    }

    /// Record a successful delivery of `status` under `handle`
    pub async fn mark_notified(&self, status: TrackedStatus, handle: NotificationHandle) {
        let mut guard = self.inner.write().await;
        guard.handle = Some(handle);
        guard.notified_status = Some(status);
    }
}

/// Read-only view of the status record
#[derive(Debug, Clone)]
pub struct StatusReader {
    inner: Arc<RwLock<StatusRecord>>,
}

impl StatusReader {
    /// Current status
    pub async fn read(&self) -> TrackedStatus {
        self.inner.read().await.status
    }

    /// Full snapshot of the record
    pub async fn record(&self) -> StatusRecord {
        self.inner.read().await.clone()
    }
}

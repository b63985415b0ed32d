// SPDX-License-Identifier: MIT

//! The `ObjectStoreGateway` contract (spec §4.1) and its error/precondition
//! vocabulary.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors an OSG implementation may surface to a caller.
///
/// `Transient` is the only variant a caller should retry on a bare
/// backoff; the others carry enough information that the caller should
/// decide what to do next rather than blindly retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,
    #[error("precondition failed")]
    Conflict,
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// A condition `write_if` must see hold before it applies a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Always write, regardless of current state.
    None,
    /// The key must already exist.
    Exists,
    /// The key must not exist.
    Absent,
    /// The key must exist at exactly this version.
    Version(u64),
}

/// A live subscription to notifications published against one key.
///
/// `id` identifies the subscription for [`ObjectStoreGateway::unwatch`];
/// `rx` yields the raw payload of every `notify` call made against the
/// watched key after the subscription was established.
pub struct Watch {
    pub id: u64,
    pub rx: mpsc::Receiver<Vec<u8>>,
}

/// A transactional object store with watch/notify and a client registry,
/// per spec §4.1.
///
/// Every method is keyed by an opaque string path; callers (the instance
/// registry and placement orchestrator) own the namespacing convention.
#[async_trait]
pub trait ObjectStoreGateway: Send + Sync {
    /// Reads the current value of `key`, or `StoreError::NotFound`.
    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Writes `value` to `key` iff `precondition` holds, atomically.
    async fn write_if(
        &self,
        key: &str,
        value: Vec<u8>,
        precondition: Precondition,
    ) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Lists up to `limit` entries under `prefix`, starting strictly
    /// after `start_after` in key order, returning `(entries, has_more)`.
    async fn list_range(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: u32,
    ) -> Result<(Vec<(String, Vec<u8>)>, bool), StoreError>;

    /// Delivers `payload` to every live watcher of `key`.
    async fn notify(&self, key: &str, payload: Vec<u8>) -> Result<(), StoreError>;

    /// Subscribes to notifications published against `key`.
    async fn watch(&self, key: &str) -> Result<Watch, StoreError>;

    /// Cancels a subscription previously returned by [`Self::watch`].
    async fn unwatch(&self, key: &str, handle: u64) -> Result<(), StoreError>;

    /// Registers a live client under `scope`, `StoreError::Conflict` if
    /// one is already registered with the same `client_id`.
    async fn register_client(
        &self,
        scope: &str,
        client_id: &str,
        meta: Vec<u8>,
    ) -> Result<(), StoreError>;

    /// Unregisters a client. Unregistering an absent client is not an
    /// error.
    async fn unregister_client(&self, scope: &str, client_id: &str) -> Result<(), StoreError>;
}

// SPDX-License-Identifier: MIT

//! An in-memory [`ObjectStoreGateway`] reference implementation.
//!
//! Used by the daemon's standalone mode and by every test in this
//! workspace that needs a gateway but not a real distributed store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::gateway::{ObjectStoreGateway, Precondition, StoreError, Watch};

const WATCH_CHANNEL_CAPACITY: usize = 64;

struct Entry {
    value: Vec<u8>,
    version: u64,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, Entry>,
    watchers: HashMap<String, Vec<(u64, mpsc::Sender<Vec<u8>>)>>,
    next_watch_id: u64,
    clients: HashMap<(String, String), Vec<u8>>,
}

#[derive(Default)]
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStoreGateway for InMemoryGateway {
    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock();
        inner
            .objects
            .get(key)
            .map(|e| e.value.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn write_if(
        &self,
        key: &str,
        value: Vec<u8>,
        precondition: Precondition,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let current = inner.objects.get(key);
        let holds = match (precondition, current) {
            (Precondition::None, _) => true,
            (Precondition::Exists, Some(_)) => true,
            (Precondition::Exists, None) => false,
            (Precondition::Absent, None) => true,
            (Precondition::Absent, Some(_)) => false,
            (Precondition::Version(v), Some(e)) => e.version == v,
            (Precondition::Version(_), None) => false,
        };
        if !holds {
            return Err(StoreError::Conflict);
        }
        let next_version = current.map(|e| e.version + 1).unwrap_or(1);
        inner.objects.insert(key.to_string(), Entry { value, version: next_version });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.lock().objects.remove(key);
        Ok(())
    }

    async fn list_range(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: u32,
    ) -> Result<(Vec<(String, Vec<u8>)>, bool), StoreError> {
        let inner = self.inner.lock();
        let mut keys: Vec<&String> = inner
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| start_after.map_or(true, |after| k.as_str() > after))
            .collect();
        keys.sort();
        let limit = limit as usize;
        let has_more = keys.len() > limit;
        let page = keys
            .into_iter()
            .take(limit)
            .map(|k| (k.clone(), inner.objects[k].value.clone()))
            .collect();
        Ok((page, has_more))
    }

    async fn notify(&self, key: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(subs) = inner.watchers.get_mut(key) {
            subs.retain(|(_, tx)| tx.try_send(payload.clone()).is_ok() || !tx.is_closed());
        }
        Ok(())
    }

    async fn watch(&self, key: &str) -> Result<Watch, StoreError> {
        let mut inner = self.inner.lock();
        let id = inner.next_watch_id;
        inner.next_watch_id += 1;
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        inner.watchers.entry(key.to_string()).or_default().push((id, tx));
        Ok(Watch { id, rx })
    }

    async fn unwatch(&self, key: &str, handle: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(subs) = inner.watchers.get_mut(key) {
            subs.retain(|(id, _)| *id != handle);
        }
        Ok(())
    }

    async fn register_client(
        &self,
        scope: &str,
        client_id: &str,
        meta: Vec<u8>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let key = (scope.to_string(), client_id.to_string());
        if inner.clients.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        inner.clients.insert(key, meta);
        Ok(())
    }

    async fn unregister_client(&self, scope: &str, client_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.clients.remove(&(scope.to_string(), client_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

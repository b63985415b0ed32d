// SPDX-License-Identifier: MIT

//! Tracks the live peer set and removes silent peers after a heartbeat
//! grace (spec §4.2).
//!
//! Two locks, acquired in a fixed order to avoid deadlock: `timers`
//! (armed removal tasks) then `registry` (the membership set itself).
//! The timer callback acquires only `registry`; the arming path (used
//! by `notify`, which both inserts an unknown peer and re-arms its
//! timer) acquires both. A timer that loses its cancellation race
//! against an already-dispatched callback is tolerated: the callback
//! is a no-op once the instance has already been removed, and may in
//! rare cases remove an instance a concurrent `notify` just refreshed
//! — the next notification re-adds it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use immap_core::InstanceId;
use immap_store::{retry_with_backoff, ObjectStoreGateway, StoreError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

const DURABLE_DELETE_MAX_ATTEMPTS: u32 = 5;

/// A membership change the registry reports upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrEvent {
    Added(Vec<InstanceId>),
    Removed(Vec<InstanceId>),
}

struct Registry {
    local_instance_id: InstanceId,
    instance_scope: String,
    grace: Duration,
    list_page_size: u32,
    gateway: Arc<dyn ObjectStoreGateway>,
    event_tx: mpsc::Sender<IrEvent>,
    timers: Mutex<HashMap<InstanceId, JoinHandle<()>>>,
    members: Mutex<BTreeSet<InstanceId>>,
}

/// The instance registry. Always held behind an `Arc` because its
/// removal timers spawn tasks that call back into it.
#[derive(Clone)]
pub struct InstanceRegistry(Arc<Registry>);

impl InstanceRegistry {
    pub fn new(
        local_instance_id: InstanceId,
        instance_scope: impl Into<String>,
        grace: Duration,
        list_page_size: u32,
        gateway: Arc<dyn ObjectStoreGateway>,
        event_tx: mpsc::Sender<IrEvent>,
    ) -> Self {
        Self(Arc::new(Registry {
            local_instance_id,
            instance_scope: instance_scope.into(),
            grace,
            list_page_size,
            gateway,
            event_tx,
            timers: Mutex::new(HashMap::new()),
            members: Mutex::new(BTreeSet::new()),
        }))
    }

    /// Enumerates current peers, inserts them all (skipping this
    /// instance's own id), arms a removal timer on each, then delivers
    /// one combined `added` event.
    pub async fn init(&self) -> Result<(), StoreError> {
        let prefix = format!("{}/", self.0.instance_scope);
        let mut ids = Vec::new();
        let mut start_after: Option<String> = None;
        loop {
            let (entries, has_more) = self
                .0
                .gateway
                .list_range(&prefix, start_after.as_deref(), self.0.list_page_size)
                .await?;
            let mut last_key = None;
            for (key, _) in &entries {
                last_key = Some(key.clone());
                let id = InstanceId::new(key.strip_prefix(&prefix).unwrap_or(key));
                if id != self.0.local_instance_id {
                    ids.push(id);
                }
            }
            if !has_more || last_key.is_none() {
                break;
            }
            start_after = last_key;
        }

        {
            let mut members = self.0.members.lock();
            for id in &ids {
                members.insert(id.clone());
            }
        }
        for id in &ids {
            self.arm_timer(id.clone());
        }
        if !ids.is_empty() {
            let _ = self.0.event_tx.send(IrEvent::Added(ids)).await;
        }
        Ok(())
    }

    /// Called whenever a peer sends a liveness notification.
    pub async fn notify(&self, id: InstanceId) {
        if id == self.0.local_instance_id {
            return;
        }
        let is_new = {
            let mut members = self.0.members.lock();
            members.insert(id.clone())
        };
        self.arm_timer(id.clone());
        if is_new {
            info!(instance_id = %id, "new peer");
            let _ = self.0.event_tx.send(IrEvent::Added(vec![id])).await;
        }
    }

    /// Snapshot of the live set.
    pub fn list(&self) -> Vec<InstanceId> {
        self.0.members.lock().iter().cloned().collect()
    }

    /// Cancels every armed timer and waits for any already-dispatched
    /// callbacks to drain.
    pub async fn shut_down(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut timers = self.0.timers.lock();
            timers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Cancels one peer's removal timer. Returns `true` iff a timer was
    /// still armed (it had not yet been dispatched to run).
    pub fn cancel_event(&self, id: &InstanceId) -> bool {
        match self.0.timers.lock().remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Acquires `timers` then `members`: stores the new handle,
    /// aborting whatever was previously armed for this id.
    fn arm_timer(&self, id: InstanceId) {
        let this = self.clone();
        let grace = self.0.grace;
        let handle = {
            let id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                this.fire(id).await;
            })
        };
        let mut timers = self.0.timers.lock();
        if let Some(old) = timers.insert(id, handle) {
            old.abort();
        }
    }

    /// Acquires `members` only, per the fixed lock order.
    async fn fire(&self, id: InstanceId) {
        let removed = self.0.members.lock().remove(&id);
        if !removed {
            return;
        }

        info!(instance_id = %id, "peer heartbeat grace expired, removing");
        let _ = self.0.event_tx.send(IrEvent::Removed(vec![id.clone()])).await;

        let gateway = Arc::clone(&self.0.gateway);
        let key = format!("{}/{}", self.0.instance_scope, id);
        let scope = self.0.instance_scope.clone();
        tokio::spawn(async move {
            let delete =
                retry_with_backoff(|| gateway.remove(&key), DURABLE_DELETE_MAX_ATTEMPTS).await;
            if let Err(err) = delete {
                error!(instance_id = %id, %err, "failed to delete durable instance record");
            }
            let _ = gateway.unregister_client(&scope, id.as_str()).await;
        });
    }
}

#[cfg(test)]
#[path = "instance_registry_tests.rs"]
mod tests;

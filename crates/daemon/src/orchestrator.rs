// SPDX-License-Identifier: MIT

//! The placement orchestrator (spec §4.4): drives every per-image
//! transition, and sequences `add_instances` / `remove_instances` /
//! `handle_update` behind a single FIFO update gate so a shuffle and a
//! discovery update never interleave on the same image.
//!
//! Generic over `Clock` (not object-safe, since it requires `Clone`)
//! the way the teacher's `Runtime<A, N, C: Clock>` is; the object-store,
//! policy, and replica-adapter collaborators stay behind `Arc<dyn _>`
//! since those traits are dyn-compatible.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use immap_adapters::ReplicaAdapter;
use immap_core::{Clock, GlobalId, ImageMap, ImageMapState, ImageSpec, InstanceId};
use immap_store::{codec, retry_with_backoff, ObjectStoreGateway, Precondition};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::error::EngineError;
use crate::gather;
use crate::placement_map::PlacementMap;
use crate::policy::{Policy, RemapPlan, ShuffleKind};

const WRITE_MAX_ATTEMPTS: u32 = 5;

/// One newly discovered image from the discovery feed, with whatever
/// local/remote identifiers are already known.
#[derive(Debug, Clone)]
pub struct AddedImage {
    pub global_id: GlobalId,
    pub local_id: Option<String>,
    pub remote_id: Option<String>,
}

/// A policy wrapper that hides instances on the ignore list from
/// `do_map`, falling back to the unfiltered view if every instance is
/// ignored (a stale cluster view must still make progress).
struct IgnoreAwarePolicy<'a> {
    inner: &'a dyn Policy,
    ignored: &'a BTreeSet<InstanceId>,
}

impl Policy for IgnoreAwarePolicy<'_> {
    fn do_map(
        &self,
        by_instance: &BTreeMap<InstanceId, BTreeSet<ImageSpec>>,
        global_id: &GlobalId,
    ) -> Result<InstanceId, immap_core::EngineError> {
        if self.ignored.is_empty() {
            return self.inner.do_map(by_instance, global_id);
        }
        let filtered: BTreeMap<_, _> = by_instance
            .iter()
            .filter(|(id, _)| !self.ignored.contains(*id))
            .map(|(id, specs)| (id.clone(), specs.clone()))
            .collect();
        if filtered.is_empty() {
            self.inner.do_map(by_instance, global_id)
        } else {
            self.inner.do_map(&filtered, global_id)
        }
    }

    fn do_shuffle(
        &self,
        by_instance: &BTreeMap<InstanceId, BTreeSet<ImageSpec>>,
        changed_ids: &[InstanceId],
        kind: ShuffleKind,
    ) -> Result<RemapPlan, immap_core::EngineError> {
        self.inner.do_shuffle(by_instance, changed_ids, kind)
    }
}

struct Inner<C: Clock> {
    image_map_scope: String,
    pm: Arc<PlacementMap>,
    policy: Arc<dyn Policy>,
    gateway: Arc<dyn ObjectStoreGateway>,
    replica: Arc<dyn ReplicaAdapter>,
    clock: C,
    list_page_size: u32,
    update_gate: AsyncMutex<()>,
    loaded: Mutex<bool>,
    mirror_uuid: Mutex<Option<String>>,
    ignore_set: Mutex<BTreeSet<InstanceId>>,
}

/// The placement orchestrator. Wrapped in an `Arc` internally so its
/// per-image drivers can be spawned as owned, `'static` tasks.
pub struct PlacementOrchestrator<C: Clock>(Arc<Inner<C>>);

impl<C: Clock> Clone for PlacementOrchestrator<C> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

type BoxedDriver = Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>>;

impl<C: Clock> PlacementOrchestrator<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image_map_scope: impl Into<String>,
        pm: Arc<PlacementMap>,
        policy: Arc<dyn Policy>,
        gateway: Arc<dyn ObjectStoreGateway>,
        replica: Arc<dyn ReplicaAdapter>,
        clock: C,
        list_page_size: u32,
    ) -> Self {
        Self(Arc::new(Inner {
            image_map_scope: image_map_scope.into(),
            pm,
            policy,
            gateway,
            replica,
            clock,
            list_page_size,
            update_gate: AsyncMutex::new(()),
            loaded: Mutex::new(false),
            mirror_uuid: Mutex::new(None),
            ignore_set: Mutex::new(BTreeSet::new()),
        }))
    }

    /// Called by IR on `added`. Bootstrap mode (RPC suppression) is in
    /// effect only for the very first call after construction.
    pub async fn add_instances(&self, ids: Vec<InstanceId>) -> Result<(), EngineError> {
        let _gate = self.0.update_gate.lock().await;

        for id in &ids {
            self.notify_peer_of_local_uuid(id).await;
        }

        let bootstrap = {
            let mut loaded = self.0.loaded.lock();
            let first_call = !*loaded;
            *loaded = true;
            first_call
        };
        if bootstrap {
            self.0
                .pm
                .load(&*self.0.gateway, &self.0.image_map_scope, &ids, self.0.list_page_size)
                .await
                .map_err(EngineError::from)?;
        }

        let plan = {
            let ignored = self.0.ignore_set.lock().clone();
            let policy = IgnoreAwarePolicy { inner: &*self.0.policy, ignored: &ignored };
            self.0.pm.shuffle(&policy, &ids, ShuffleKind::Added)?
        };
        self.run_plan(plan, bootstrap).await
    }

    /// Called by IR on `removed`.
    pub async fn remove_instances(&self, ids: Vec<InstanceId>) -> Result<(), EngineError> {
        let _gate = self.0.update_gate.lock().await;
        let plan = {
            let ignored = self.0.ignore_set.lock().clone();
            let policy = IgnoreAwarePolicy { inner: &*self.0.policy, ignored: &ignored };
            self.0.pm.shuffle(&policy, &ids, ShuffleKind::Removed)?
        };
        self.run_plan(plan, false).await
    }

    /// Called by the image-discovery feed. Reconciles a changed
    /// `mirror_uuid` first (spec §4.4.3), then maps every added image
    /// and drives a cleanup unmap for every removed one.
    pub async fn handle_update(
        &self,
        mirror_uuid: &str,
        added: Vec<AddedImage>,
        removed: Vec<GlobalId>,
    ) -> Result<(), EngineError> {
        let _gate = self.0.update_gate.lock().await;

        let cached = self.0.mirror_uuid.lock().clone();
        if cached.as_deref() != Some(mirror_uuid) {
            self.reconcile_peer_uuid(cached, mirror_uuid.to_string()).await;
        }

        let mut tasks: Vec<BoxedDriver> = Vec::new();
        for img in added {
            let instance = {
                let ignored = self.0.ignore_set.lock().clone();
                let policy = IgnoreAwarePolicy { inner: &*self.0.policy, ignored: &ignored };
                self.0.pm.lookup_or_map(&policy, &img.global_id)?
            };
            if let Some(local_id) = img.local_id {
                self.0.pm.set_local_id(&img.global_id, local_id);
            }
            let this = self.clone();
            let global_id = img.global_id;
            tasks.push(Box::pin(async move {
                this.drive_map(global_id, instance.clone(), instance, false).await
            }));
        }

        for global_id in removed {
            let Some(spec) = self.0.pm.get_spec(&global_id) else { continue };
            let Some(owner) = self.0.pm.lookup(&global_id) else { continue };
            let this = self.clone();
            let image_id = spec.local_id.unwrap_or_else(|| global_id.to_string());
            tasks.push(Box::pin(async move { this.drive_unmap(global_id, owner, image_id).await }));
        }

        gather::first_error_wins(tasks).await
    }

    async fn run_plan(&self, plan: RemapPlan, bootstrap: bool) -> Result<(), EngineError> {
        let tasks: Vec<BoxedDriver> = plan
            .into_iter()
            .map(|(global_id, (from, to))| {
                let this = self.clone();
                Box::pin(async move { this.drive_map(global_id, from, to, bootstrap).await }) as BoxedDriver
            })
            .collect();
        gather::first_error_wins(tasks).await
    }

    /// Best-effort, non-fatal: informs a brand-new peer of our current
    /// mirror uuid, if one is already cached. Failures are logged only.
    async fn notify_peer_of_local_uuid(&self, instance_id: &InstanceId) {
        let Some(uuid) = self.0.mirror_uuid.lock().clone() else { return };
        if let Err(err) = self.0.replica.notify_peer_update(instance_id, "", &uuid).await {
            warn!(%instance_id, %err, "peer-uuid announcement to new peer failed");
        }
    }

    /// spec §4.4.3: fan out `add_peer(old, new)` to every live instance;
    /// any instance that fails to ack is recorded on the ignore list
    /// until a later notify to it succeeds. The cached uuid is swapped
    /// only after the fan-out completes.
    async fn reconcile_peer_uuid(&self, old_uuid: Option<String>, new_uuid: String) {
        let old_uuid = old_uuid.unwrap_or_default();
        let targets = self.0.pm.get_instance_ids();
        let tasks: Vec<_> = targets
            .iter()
            .map(|id| {
                let replica = Arc::clone(&self.0.replica);
                let id = id.clone();
                let old = old_uuid.clone();
                let new = new_uuid.clone();
                async move { replica.notify_add_peer(&id, &old, &new).await.map_err(EngineError::from) }
            })
            .collect();

        let failed = Mutex::new(BTreeSet::new());
        gather::all_success_required(tasks, |idx, err| {
            let id = &targets[idx];
            warn!(instance_id = %id, %err, "peer failed to ack uuid change; ignoring until refresh");
            failed.lock().insert(id.clone());
        })
        .await;

        let failed = failed.into_inner();
        let mut ignore = self.0.ignore_set.lock();
        for id in &targets {
            if failed.contains(id) {
                ignore.insert(id.clone());
            } else {
                ignore.remove(id);
            }
        }
        drop(ignore);

        *self.0.mirror_uuid.lock() = Some(new_uuid);
    }

    async fn read_current(&self, key: &str) -> Result<Option<ImageMap>, EngineError> {
        match self.0.gateway.read(key).await {
            Ok(bytes) => Ok(Some(codec::decode_image_map(&bytes)?)),
            Err(immap_store::StoreError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_image_map(&self, key: &str, record: &ImageMap) -> Result<(), EngineError> {
        let bytes = codec::encode_image_map(record);
        retry_with_backoff(
            || self.0.gateway.write_if(key, bytes.clone(), Precondition::None),
            WRITE_MAX_ATTEMPTS,
        )
        .await
        .map_err(EngineError::from)
    }

    async fn release(
        &self,
        instance_id: &InstanceId,
        global_id: &GlobalId,
        mirror_uuid: &str,
        image_id: &str,
        force: bool,
    ) -> Result<(), EngineError> {
        match self.0.replica.notify_image_release(instance_id, global_id, mirror_uuid, image_id, force).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_benign() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn acquire(
        &self,
        instance_id: &InstanceId,
        global_id: &GlobalId,
        mirror_uuid: &str,
        image_id: &str,
    ) -> Result<(), EngineError> {
        match self.0.replica.notify_image_acquire(instance_id, global_id, mirror_uuid, image_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_benign() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn image_key(&self, global_id: &GlobalId) -> String {
        format!("{}/{global_id}", self.0.image_map_scope)
    }

    /// The per-image state machine (spec §4.4.1): `READ_MAP` → guard →
    /// `WRITE_UNMAPPING` → `RELEASE_OLD` → `WRITE_MAPPING` →
    /// `ACQUIRE_NEW` → `WRITE_MAPPED`. The `from == to` case (a pure
    /// map, or a bootstrap self-remap) skips `WRITE_UNMAPPING` and
    /// `RELEASE_OLD` entirely.
    async fn drive_map(
        &self,
        global_id: GlobalId,
        from: InstanceId,
        to: InstanceId,
        bootstrap: bool,
    ) -> Result<(), EngineError> {
        let key = self.image_key(&global_id);
        let current = self.read_current(&key).await?;
        let guard_ok = match &current {
            None => true,
            Some(record) => {
                matches!(
                    record.state,
                    ImageMapState::Unmapping | ImageMapState::Mapping | ImageMapState::Unassigned
                ) || (record.state == ImageMapState::Mapped && record.instance_id == from)
            }
        };
        if !guard_ok {
            return Err(EngineError::invalid(
                global_id.to_string(),
                "durable state does not match the in-memory owner",
            ));
        }

        let mirror_uuid = self.0.mirror_uuid.lock().clone().unwrap_or_default();
        let image_id =
            self.0.pm.get_spec(&global_id).and_then(|s| s.local_id).unwrap_or_else(|| global_id.to_string());

        if from != to {
            let unmapping = ImageMap::new(from.clone(), ImageMapState::Unmapping, self.0.clock.epoch_ns());
            self.write_image_map(&key, &unmapping).await?;
            if !bootstrap {
                self.release(&from, &global_id, &mirror_uuid, &image_id, false).await?;
            }
        }

        let mapping = ImageMap::new(to.clone(), ImageMapState::Mapping, self.0.clock.epoch_ns());
        self.write_image_map(&key, &mapping).await?;

        if !bootstrap {
            self.acquire(&to, &global_id, &mirror_uuid, &image_id).await?;
        }

        let mapped = ImageMap::new(to, ImageMapState::Mapped, self.0.clock.epoch_ns());
        self.write_image_map(&key, &mapped).await
    }

    /// Removed-image cleanup (spec §9 open question, resolved as a real
    /// path): releases the current owner, deletes the durable record,
    /// and only then drops `global_id` from `pm`. Keeping the in-memory
    /// entry alive until the durable delete has actually succeeded
    /// means a failed cleanup leaves `pm` and the durable store
    /// consistent with each other — a later `handle_update` that
    /// re-reports the same id as `added` still finds its real owner
    /// via `lookup_or_map` instead of treating it as brand new.
    async fn drive_unmap(
        &self,
        global_id: GlobalId,
        owner: InstanceId,
        image_id: String,
    ) -> Result<(), EngineError> {
        let key = self.image_key(&global_id);
        let current = self.read_current(&key).await?;
        let guard_ok = match &current {
            None => true,
            Some(record) => {
                matches!(
                    record.state,
                    ImageMapState::Unmapping | ImageMapState::Mapping | ImageMapState::Unassigned
                ) || (record.state == ImageMapState::Mapped && record.instance_id == owner)
            }
        };
        if !guard_ok {
            return Err(EngineError::invalid(
                global_id.to_string(),
                "durable state does not match the in-memory owner during unmap",
            ));
        }

        let mirror_uuid = self.0.mirror_uuid.lock().clone().unwrap_or_default();

        let unmapping = ImageMap::new(owner.clone(), ImageMapState::Unmapping, self.0.clock.epoch_ns());
        self.write_image_map(&key, &unmapping).await?;
        self.release(&owner, &global_id, &mirror_uuid, &image_id, true).await?;

        retry_with_backoff(|| self.0.gateway.remove(&key), WRITE_MAX_ATTEMPTS)
            .await
            .map_err(EngineError::from)?;

        self.0.pm.unmap(&global_id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;

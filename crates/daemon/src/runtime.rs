// SPDX-License-Identifier: MIT

//! Wires the instance registry, placement map, and orchestrator
//! together, and drives `IrEvent`s into `PlacementOrchestrator` calls
//! (spec §2 "Data flow: discovery & IR → PO → PM → OSG").

use std::sync::Arc;

use immap_adapters::ReplicaAdapter;
use immap_core::{Clock, Config, InstanceId};
use immap_store::ObjectStoreGateway;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::instance_registry::{InstanceRegistry, IrEvent};
use crate::orchestrator::{AddedImage, PlacementOrchestrator};
use crate::placement_map::PlacementMap;
use crate::policy::{Policy, SimplePolicy};

const INSTANCE_SCOPE: &str = "instances";
const IMAGE_MAP_SCOPE: &str = "image-map";
const IR_EVENT_BUFFER: usize = 256;

/// The assembled daemon: an instance registry feeding a placement
/// orchestrator, plus the handle to the event-pump task.
pub struct Runtime<C: Clock> {
    pub ir: InstanceRegistry,
    pub po: PlacementOrchestrator<C>,
    pub pm: Arc<PlacementMap>,
    pump: JoinHandle<()>,
}

impl<C: Clock> Runtime<C> {
    /// Constructs every component, runs `IR::init`, and spawns the task
    /// that drains `IrEvent`s into `PO::add_instances`/`remove_instances`.
    /// Returns once the initial peer enumeration and its resulting
    /// bootstrap shuffle have both completed.
    pub async fn start(
        local_instance_id: InstanceId,
        config: Config,
        gateway: Arc<dyn ObjectStoreGateway>,
        replica: Arc<dyn ReplicaAdapter>,
        clock: C,
    ) -> Result<Self, immap_store::StoreError> {
        let (tx, mut rx) = mpsc::channel(IR_EVENT_BUFFER);
        let ir = InstanceRegistry::new(
            local_instance_id,
            INSTANCE_SCOPE,
            config.removal_grace(),
            config.list_page_size,
            Arc::clone(&gateway),
            tx,
        );

        let pm = Arc::new(PlacementMap::new());
        let policy: Arc<dyn Policy> = Arc::new(SimplePolicy::new());
        let po = PlacementOrchestrator::new(
            IMAGE_MAP_SCOPE,
            Arc::clone(&pm),
            policy,
            Arc::clone(&gateway),
            replica,
            clock,
            config.list_page_size,
        );

        ir.init().await?;

        // Drain whatever `init` already enqueued (the combined initial
        // `Added` event, if any peers existed) before handing the
        // channel to the background pump, so the caller observes a
        // fully bootstrapped placement map on return.
        if let Ok(event) = rx.try_recv() {
            apply_event(&po, event).await;
        }

        let po_for_pump = po.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                apply_event(&po_for_pump, event).await;
            }
        });

        Ok(Self { ir, po, pm, pump })
    }

    /// Forwards a discovery-feed update to the orchestrator.
    pub async fn handle_update(
        &self,
        mirror_uuid: &str,
        added: Vec<AddedImage>,
        removed: Vec<immap_core::GlobalId>,
    ) -> Result<(), crate::error::EngineError> {
        self.po.handle_update(mirror_uuid, added, removed).await
    }

    /// Stops the instance registry's timers and the event pump.
    pub async fn shut_down(self) {
        self.ir.shut_down().await;
        self.pump.abort();
        let _ = self.pump.await;
    }
}

async fn apply_event<C: Clock>(po: &PlacementOrchestrator<C>, event: IrEvent) {
    let result = match event {
        IrEvent::Added(ids) => {
            info!(count = ids.len(), "applying instance-added event");
            po.add_instances(ids).await
        }
        IrEvent::Removed(ids) => {
            info!(count = ids.len(), "applying instance-removed event");
            po.remove_instances(ids).await
        }
    };
    if let Err(err) = result {
        error!(%err, "orchestrator failed to apply membership event");
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;

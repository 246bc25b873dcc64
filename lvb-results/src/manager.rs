//! Workbench-level results management
//!
//! The manager owns one coordinator per source image (tree ownership:
//! coordinators hold no reference back), distributes the gateway and
//! connector handles, and aggregates per-device working/faulted state for
//! UI consumption.

use std::collections::HashMap;
use std::sync::Arc;

use lvb_common::config::WorkbenchConfig;
use lvb_common::events::ResultsEvent;
use lvb_common::roll::{ImageEntry, ImageRollConfig};
use lvb_common::DeviceKind;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::connector::DeviceConnector;
use crate::coordinator::ResultEntryCoordinator;
use crate::store::ResultsGateway;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Owns all result-entry coordinators for the selected image roll.
pub struct ResultsManager {
    config: WorkbenchConfig,
    roll: ImageRollConfig,
    gateway: Arc<dyn ResultsGateway>,
    connectors: Vec<Arc<dyn DeviceConnector>>,
    coordinators: HashMap<Uuid, ResultEntryCoordinator>,
    events: broadcast::Sender<ResultsEvent>,
}

impl ResultsManager {
    pub fn new(
        config: WorkbenchConfig,
        roll: ImageRollConfig,
        gateway: Arc<dyn ResultsGateway>,
        connectors: Vec<Arc<dyn DeviceConnector>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            roll,
            gateway,
            connectors,
            coordinators: HashMap::new(),
            events,
        }
    }

    /// Subscribe to workbench notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ResultsEvent> {
        self.events.subscribe()
    }

    /// Create a coordinator for a source image. Returns its UID, the
    /// handle used for all later lookups.
    pub fn add_image(&mut self, source_image: ImageEntry) -> Uuid {
        let uid = source_image.uid;
        let coordinator = ResultEntryCoordinator::new(
            source_image,
            self.roll.clone(),
            self.config.clone(),
            Arc::clone(&self.gateway),
            self.connectors.clone(),
            self.events.clone(),
        );
        self.coordinators.insert(uid, coordinator);
        uid
    }

    pub fn remove_image(&mut self, image_uid: Uuid) -> bool {
        self.coordinators.remove(&image_uid).is_some()
    }

    pub fn coordinator(&self, image_uid: Uuid) -> Option<&ResultEntryCoordinator> {
        self.coordinators.get(&image_uid)
    }

    pub fn coordinator_mut(&mut self, image_uid: Uuid) -> Option<&mut ResultEntryCoordinator> {
        self.coordinators.get_mut(&image_uid)
    }

    /// UIDs of all managed images, sorted for stable display order.
    pub fn image_uids(&self) -> Vec<Uuid> {
        let mut uids: Vec<Uuid> = self.coordinators.keys().copied().collect();
        uids.sort();
        uids
    }

    /// Swap the selected image roll and re-resolve every handler.
    pub fn set_image_roll(&mut self, roll: ImageRollConfig) {
        self.roll = roll.clone();
        for coordinator in self.coordinators.values_mut() {
            coordinator.set_image_roll(roll.clone());
        }
    }

    /// True when any entry for the device is mid-acquisition.
    pub fn device_working(&self, device: DeviceKind) -> bool {
        self.coordinators
            .values()
            .any(|coordinator| coordinator.is_working(device))
    }

    /// True when any entry for the device is faulted.
    pub fn device_faulted(&self, device: DeviceKind) -> bool {
        self.coordinators
            .values()
            .any(|coordinator| coordinator.is_faulted(device))
    }
}

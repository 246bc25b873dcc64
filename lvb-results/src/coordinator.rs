//! Result entry coordination
//!
//! One coordinator per source image. It owns one device entry (acquisition
//! orchestrator plus stored baseline) per connected device family and
//! mediates store/clear/load operations against the persistence gateway.
//! Overwrite safety is advisory: a baseline present without overwrite
//! permission is reported back for caller confirmation, never locked.

use std::sync::Arc;

use chrono::Utc;
use lvb_common::config::WorkbenchConfig;
use lvb_common::diff::{DiffFilter, SectorDifference};
use lvb_common::events::ResultsEvent;
use lvb_common::geometry::Point;
use lvb_common::roll::{ImageEntry, ImageRollConfig, ImageSourcePolicy};
use lvb_common::sector::order_sectors;
use lvb_common::{CanonicalSector, DeviceKind};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, warn};

use crate::connector::{AcquisitionRequest, DeviceConnector};
use crate::normalize::{normalizer_for, NamedPoint, NormalizeContext};
use crate::orchestrator::{AcquisitionOrchestrator, AcquisitionState};
use crate::store::{ResultsGateway, StoredResult};

/// Outcome of a store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// A baseline exists and overwrite was not granted; the caller confirms
    /// with the user and re-invokes with permission.
    NeedsConfirmation,
    NothingToStore,
    Failed,
}

/// Outcome of replaying the stored template to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Stored sector definitions (and masks) were pushed to the device.
    Restored,
    /// No baseline existed; the device was asked to detect sectors.
    Detected,
    Failed,
}

/// Per-device state owned by a coordinator.
struct DeviceEntry {
    device: DeviceKind,
    orchestrator: AcquisitionOrchestrator,
    stored: Vec<CanonicalSector>,
    row: Option<StoredResult>,
}

/// Coordinates acquisitions and persistence for one source image across
/// all connected device families.
pub struct ResultEntryCoordinator {
    source_image: ImageEntry,
    roll: ImageRollConfig,
    config: WorkbenchConfig,
    gateway: Arc<dyn ResultsGateway>,
    events: broadcast::Sender<ResultsEvent>,
    entries: Vec<DeviceEntry>,
}

impl ResultEntryCoordinator {
    pub fn new(
        source_image: ImageEntry,
        roll: ImageRollConfig,
        config: WorkbenchConfig,
        gateway: Arc<dyn ResultsGateway>,
        connectors: Vec<Arc<dyn DeviceConnector>>,
        events: broadcast::Sender<ResultsEvent>,
    ) -> Self {
        let entries = connectors
            .into_iter()
            .map(|connector| {
                let device = connector.device();
                DeviceEntry {
                    device,
                    orchestrator: AcquisitionOrchestrator::new(
                        device,
                        source_image.uid,
                        config.clone(),
                        connector,
                        events.clone(),
                    ),
                    stored: Vec::new(),
                    row: None,
                }
            })
            .collect();

        Self {
            source_image,
            roll,
            config,
            gateway,
            events,
            entries,
        }
    }

    pub fn source_image(&self) -> &ImageEntry {
        &self.source_image
    }

    pub fn roll(&self) -> &ImageRollConfig {
        &self.roll
    }

    /// Swap the roll configuration and re-resolve every handler.
    pub fn set_image_roll(&mut self, roll: ImageRollConfig) {
        self.roll = roll;
        self.refresh_handlers();
    }

    /// Re-resolve the acquisition handler for every device entry. Called
    /// after connectivity, simulator, sector-mode or baseline changes.
    pub fn refresh_handlers(&mut self) {
        let sector_mode = self.roll.sector_mode;
        for entry in &mut self.entries {
            let has_stored_template = entry.row.is_some();
            entry
                .orchestrator
                .update_handler(sector_mode, has_stored_template);
        }
    }

    pub fn state(&self, device: DeviceKind) -> Option<AcquisitionState> {
        self.entry(device).map(|entry| entry.orchestrator.state())
    }

    pub fn is_working(&self, device: DeviceKind) -> bool {
        self.state(device).is_some_and(|state| state.is_working)
    }

    pub fn is_faulted(&self, device: DeviceKind) -> bool {
        self.state(device).is_some_and(|state| state.is_faulted)
    }

    pub fn stored_sectors(&self, device: DeviceKind) -> &[CanonicalSector] {
        self.entry(device).map_or(&[], |entry| entry.stored.as_slice())
    }

    pub fn current_sectors(&self, device: DeviceKind) -> &[CanonicalSector] {
        self.entry(device)
            .map_or(&[], |entry| entry.orchestrator.current_sectors())
    }

    /// Reconciliation output for one device, filtered per call site.
    pub fn differences(&self, device: DeviceKind, filter: DiffFilter) -> Vec<SectorDifference> {
        self.entry(device)
            .map(|entry| entry.orchestrator.differences(filter))
            .unwrap_or_default()
    }

    /// Load the stored baseline for one device from the gateway and rebuild
    /// its sector set and diff list. A parse failure empties the sector set
    /// but keeps the row cached so restore handlers stay available.
    pub async fn load_stored(&mut self, device: DeviceKind) -> bool {
        let roll_uid = self.roll.uid;
        let image_uid = self.source_image.uid;
        let sector_mode = self.roll.sector_mode;
        let ctx = self.stored_context();

        let row = match self
            .gateway
            .select_result(device, roll_uid, image_uid, roll_uid)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                error!("{device}: error while loading stored results: {e}");
                return false;
            }
        };

        let Some(entry) = self.entry_mut(device) else {
            error!("No device entry for {device}.");
            return false;
        };

        entry.stored.clear();
        match row {
            None => entry.row = None,
            Some(row) => {
                match normalizer_for(device).normalize(&row.template, &row.report, &ctx) {
                    Ok(mut sectors) => {
                        order_sectors(&mut sectors);
                        entry.stored = sectors;
                    }
                    Err(e) => error!("{device}: error while loading stored results: {e}"),
                }
                entry.row = Some(row);
            }
        }

        let has_stored_template = entry.row.is_some();
        entry
            .orchestrator
            .update_handler(sector_mode, has_stored_template);
        entry.orchestrator.reconcile_with(&entry.stored);
        true
    }

    /// Run one acquisition for the device and reconcile the arriving
    /// report against the stored baseline.
    pub async fn process(&mut self, device: DeviceKind) -> bool {
        let ctx = self.acquisition_context(device);
        let roll = self.roll.clone();
        let source_image = self.source_image.clone();

        let Some(entry) = self.entry_mut(device) else {
            error!("No device entry for {device}.");
            return false;
        };

        let handler = entry
            .orchestrator
            .update_handler(roll.sector_mode, entry.row.is_some());
        if handler.is_offline() {
            warn!("{device}: device offline, acquisition skipped");
            return false;
        }

        // Image policy: the roll may ask for the persisted baseline image,
        // but camera handlers always shoot the registered label and a
        // missing baseline image falls back to the source.
        let stored_image = entry.row.as_ref().and_then(|row| row.stored_image.clone());
        let use_source =
            roll.image_source == ImageSourcePolicy::Source || !handler.is_simulator();
        let image = match (use_source, stored_image) {
            (false, Some(stored)) => stored,
            _ => source_image,
        };

        let request = AcquisitionRequest {
            image_dpi: roll.effective_dpi(&image),
            image: image.bytes,
            handler,
            stored_template: if handler.is_restore() {
                entry.row.as_ref().map(|row| row.template.clone())
            } else {
                None
            },
        };

        entry.orchestrator.process(request, &entry.stored, &ctx).await
    }

    /// Pull an already-captured report from the device by repeat index.
    pub async fn read(&mut self, device: DeviceKind, index: u32) -> bool {
        let ctx = self.acquisition_context(device);
        let Some(entry) = self.entry_mut(device) else {
            error!("No device entry for {device}.");
            return false;
        };
        entry.orchestrator.read(index, &entry.stored, &ctx).await
    }

    /// Persist the current capture as the stored baseline for the device.
    pub async fn store(&mut self, device: DeviceKind, allow_overwrite: bool) -> StoreOutcome {
        let roll_uid = self.roll.uid;
        let image_uid = self.source_image.uid;

        let Some(entry) = self.entry(device) else {
            error!("No device entry for {device}.");
            return StoreOutcome::Failed;
        };
        if entry.orchestrator.current_sectors().is_empty() {
            error!("{device}: no sectors to store.");
            return StoreOutcome::NothingToStore;
        }
        if !entry.stored.is_empty() && !allow_overwrite {
            return StoreOutcome::NeedsConfirmation;
        }

        let (template, report) = entry.orchestrator.current_documents();
        let Some(report) = report.cloned() else {
            error!("{device}: no report document to store.");
            return StoreOutcome::Failed;
        };

        let result = StoredResult {
            device,
            image_roll_uid: roll_uid,
            source_image_uid: image_uid,
            run_uid: roll_uid,
            template: template.cloned().unwrap_or(Value::Null),
            report,
            stored_image: entry.orchestrator.current_image().cloned(),
            created_at: Utc::now(),
        };

        if !self.persist(&result).await {
            return StoreOutcome::Failed;
        }

        let _ = self.load_stored(device).await;
        if let Some(entry) = self.entry_mut(device) {
            entry.orchestrator.clear_current();
        }
        let _ = self.events.send(ResultsEvent::StoredReplaced {
            device,
            image_uid,
        });
        StoreOutcome::Stored
    }

    /// Persist one named current sector into the stored baseline, keeping
    /// the other stored sectors. Handheld-only: the baseline document is
    /// the accumulated pair array.
    pub async fn store_single(
        &mut self,
        device: DeviceKind,
        sector_name: &str,
        allow_overwrite: bool,
    ) -> StoreOutcome {
        if device != DeviceKind::Handheld {
            error!("{device}: single-sector store is only supported for the handheld verifier.");
            return StoreOutcome::Failed;
        }
        let roll_uid = self.roll.uid;
        let image_uid = self.source_image.uid;

        let Some(entry) = self.entry(device) else {
            error!("No device entry for {device}.");
            return StoreOutcome::Failed;
        };
        let Some(pair) = entry.orchestrator.handheld_pair(sector_name) else {
            error!("{device}: no current sector named '{sector_name}' to store.");
            return StoreOutcome::Failed;
        };
        let exists = entry
            .stored
            .iter()
            .any(|sector| sector.template.name == sector_name);
        if exists && !allow_overwrite {
            return StoreOutcome::NeedsConfirmation;
        }

        let mut pairs: Vec<Value> = entry
            .row
            .as_ref()
            .and_then(|row| row.report.get("AllReports"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        pairs.retain(|stored_pair| {
            stored_pair
                .get("Template")
                .and_then(|template| template.get("Name"))
                .and_then(Value::as_str)
                != Some(sector_name)
        });
        pairs.push(pair.clone());

        let result = StoredResult {
            device,
            image_roll_uid: roll_uid,
            source_image_uid: image_uid,
            run_uid: roll_uid,
            template: Value::Null,
            report: serde_json::json!({ "AllReports": pairs }),
            stored_image: entry.orchestrator.current_image().cloned(),
            created_at: Utc::now(),
        };

        if !self.persist(&result).await {
            return StoreOutcome::Failed;
        }

        let _ = self.load_stored(device).await;
        if let Some(entry) = self.entry_mut(device) {
            entry.orchestrator.remove_current(sector_name, &entry.stored);
        }
        let _ = self.events.send(ResultsEvent::StoredReplaced {
            device,
            image_uid,
        });
        StoreOutcome::Stored
    }

    /// Drop the current capture for the device.
    pub fn clear_current(&mut self, device: DeviceKind) -> bool {
        let Some(entry) = self.entry_mut(device) else {
            error!("No device entry for {device}.");
            return false;
        };
        entry.orchestrator.clear_current();
        true
    }

    /// Drop one named sector from the current capture (handheld workflows).
    pub fn clear_single(&mut self, device: DeviceKind, sector_name: &str) -> bool {
        let Some(entry) = self.entry_mut(device) else {
            error!("No device entry for {device}.");
            return false;
        };
        entry.orchestrator.remove_current(sector_name, &entry.stored)
    }

    /// Delete the stored baseline for the device and rebuild the diff list.
    pub async fn clear_stored(&mut self, device: DeviceKind) -> bool {
        let roll_uid = self.roll.uid;
        let image_uid = self.source_image.uid;

        match self
            .gateway
            .delete_result(device, roll_uid, image_uid, roll_uid)
            .await
        {
            Ok(_) => {}
            Err(e) => {
                error!("{device}: error while clearing stored results: {e}");
                return false;
            }
        }
        self.load_stored(device).await
    }

    /// Replay the stored template to the device: clear its sectors, then
    /// push each stored definition (with non-zero blemish-mask layers), or
    /// ask for detection when no baseline exists.
    pub async fn load(&mut self, device: DeviceKind) -> LoadOutcome {
        let Some(entry) = self.entry(device) else {
            error!("No device entry for {device}.");
            return LoadOutcome::Failed;
        };
        let connector = Arc::clone(entry.orchestrator.connector());
        let stored = entry.stored.clone();

        match connector.delete_sectors().await {
            Ok(true) => {}
            Ok(false) => {
                error!("{device}: unable to clear sectors on the device.");
                return LoadOutcome::Failed;
            }
            Err(e) => {
                error!("{device}: unable to clear sectors on the device: {e}");
                return LoadOutcome::Failed;
            }
        }

        if stored.is_empty() {
            return match connector.detect_sectors().await {
                Ok(true) => LoadOutcome::Detected,
                Ok(false) => {
                    error!("{device}: sector detection failed.");
                    LoadOutcome::Failed
                }
                Err(e) => {
                    error!("{device}: sector detection failed: {e}");
                    LoadOutcome::Failed
                }
            };
        }

        for sector in &stored {
            let definition = match serde_json::to_value(&sector.template) {
                Ok(definition) => definition,
                Err(e) => {
                    error!("{device}: unable to serialize sector '{}': {e}", sector.template.name);
                    return LoadOutcome::Failed;
                }
            };
            match connector.add_sector(&sector.template.name, &definition).await {
                Ok(true) => {}
                Ok(false) => {
                    error!("{device}: unable to restore sector '{}'.", sector.template.name);
                    return LoadOutcome::Failed;
                }
                Err(e) => {
                    error!(
                        "{device}: unable to restore sector '{}': {e}",
                        sector.template.name
                    );
                    return LoadOutcome::Failed;
                }
            }

            if let Some(mask) = &sector.template.blemish_mask {
                for layer in &mask.layers {
                    let layer_doc = match serde_json::to_value(layer) {
                        Ok(doc) => doc,
                        Err(e) => {
                            error!(
                                "{device}: unable to serialize mask layer '{}': {e}",
                                layer.name
                            );
                            return LoadOutcome::Failed;
                        }
                    };
                    let added = matches!(
                        connector.add_mask(&sector.template.name, &layer_doc).await,
                        Ok(true)
                    );
                    // Zero-value layers are allowed to fail.
                    if !added && layer.value != 0 {
                        error!(
                            "{device}: unable to restore mask layer '{}' for '{}'.",
                            layer.name, sector.template.name
                        );
                        return LoadOutcome::Failed;
                    }
                }
            }
        }

        LoadOutcome::Restored
    }

    /// Name of the first known sector (stored before current, per device)
    /// whose center contains the given point.
    pub fn sector_name_at(&self, point: Point) -> Option<String> {
        let radius = self.config.containment_radius;
        for entry in &self.entries {
            for sector in entry
                .stored
                .iter()
                .chain(entry.orchestrator.current_sectors())
            {
                if sector.report.center().within(point, radius) {
                    return Some(sector.template.name.clone());
                }
            }
        }
        None
    }

    async fn persist(&self, result: &StoredResult) -> bool {
        match self.gateway.insert_or_replace_result(result).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                error!("{}: error while storing results.", result.device);
                false
            }
            Err(e) => {
                error!("{}: error while storing results: {e}", result.device);
                false
            }
        }
    }

    fn stored_context(&self) -> NormalizeContext {
        NormalizeContext {
            ignore_no_read: self.config.ignore_no_read,
            containment_radius: self.config.containment_radius,
            existing: Vec::new(),
            accumulated: 0,
        }
    }

    fn acquisition_context(&self, device: DeviceKind) -> NormalizeContext {
        let mut existing = Vec::new();
        for entry in &self.entries {
            for sector in entry
                .stored
                .iter()
                .chain(entry.orchestrator.current_sectors())
            {
                existing.push(NamedPoint {
                    name: sector.template.name.clone(),
                    center: sector.report.center(),
                });
            }
        }
        let accumulated = self
            .entry(device)
            .map_or(0, |entry| entry.orchestrator.current_sectors().len());

        NormalizeContext {
            ignore_no_read: self.config.ignore_no_read,
            containment_radius: self.config.containment_radius,
            existing,
            accumulated,
        }
    }

    fn entry(&self, device: DeviceKind) -> Option<&DeviceEntry> {
        self.entries.iter().find(|entry| entry.device == device)
    }

    fn entry_mut(&mut self, device: DeviceKind) -> Option<&mut DeviceEntry> {
        self.entries.iter_mut().find(|entry| entry.device == device)
    }
}

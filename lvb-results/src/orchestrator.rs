//! Per-device acquisition lifecycle
//!
//! One orchestrator per (device, image entry). Owns the working/faulted
//! state, races the device connector against a configurable deadline, and
//! feeds arriving reports through normalization, ordering and
//! reconciliation. The first of {report, deadline} to resolve wins; the
//! loser is detected through the acquisition generation counter and
//! discarded.
//!
//! All state mutation goes through `&mut self` on the owning coordinator's
//! task; device callbacks arriving on other tasks must be handed off to
//! that task before calling [`AcquisitionOrchestrator::process_full_report`].

use std::sync::Arc;

use lvb_common::config::WorkbenchConfig;
use lvb_common::diff::{reconcile, DiffFilter, DiffPolicy, MeasurementComparer, SectorComparer, SectorDifference};
use lvb_common::events::{FaultReason, ResultsEvent};
use lvb_common::handler::{resolve_handler, HandlerInputs, HandlerMode};
use lvb_common::roll::{ImageEntry, SectorMode};
use lvb_common::sector::order_sectors;
use lvb_common::{CanonicalSector, DeviceKind};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, warn};
use uuid::Uuid;

use crate::connector::{AcquisitionRequest, DeviceConnector, VendorReport};
use crate::normalize::{normalizer_for, NormalizeContext};
use crate::Result;

/// DPI of images captured by a physical camera device.
const CAMERA_DPI: u32 = 600;

/// Observable acquisition state for one (device, image entry) pair.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionState {
    pub is_working: bool,
    pub is_faulted: bool,
    pub handler: HandlerMode,
}

impl Default for AcquisitionState {
    fn default() -> Self {
        Self {
            is_working: false,
            is_faulted: false,
            handler: HandlerMode::Offline,
        }
    }
}

/// Drives acquisitions for one device against one source image.
pub struct AcquisitionOrchestrator {
    device: DeviceKind,
    image_uid: Uuid,
    config: WorkbenchConfig,
    connector: Arc<dyn DeviceConnector>,
    events: broadcast::Sender<ResultsEvent>,
    comparer: Box<dyn SectorComparer + Send + Sync>,
    diff_policy: DiffPolicy,
    state: AcquisitionState,
    /// Bumped when an acquisition starts; a report tagged with an older
    /// generation lost the race against the deadline and is ignored.
    generation: u64,
    /// DPI to record for the next arriving report image.
    report_dpi: u32,
    current: Vec<CanonicalSector>,
    current_template: Option<Value>,
    current_report: Option<Value>,
    current_image: Option<ImageEntry>,
    /// Raw template/report pairs backing the accumulated handheld set,
    /// keyed by assigned sector name.
    handheld_pairs: Vec<(String, Value)>,
    differences: Vec<SectorDifference>,
}

impl AcquisitionOrchestrator {
    pub fn new(
        device: DeviceKind,
        image_uid: Uuid,
        config: WorkbenchConfig,
        connector: Arc<dyn DeviceConnector>,
        events: broadcast::Sender<ResultsEvent>,
    ) -> Self {
        Self {
            device,
            image_uid,
            config,
            connector,
            events,
            comparer: Box::new(MeasurementComparer::default()),
            diff_policy: DiffPolicy::default(),
            state: AcquisitionState::default(),
            generation: 0,
            report_dpi: 0,
            current: Vec::new(),
            current_template: None,
            current_report: None,
            current_image: None,
            handheld_pairs: Vec::new(),
            differences: Vec::new(),
        }
    }

    /// Replace the injected symbology comparer.
    pub fn with_comparer(mut self, comparer: Box<dyn SectorComparer + Send + Sync>) -> Self {
        self.comparer = comparer;
        self
    }

    /// Replace the reconciliation policy.
    pub fn with_diff_policy(mut self, policy: DiffPolicy) -> Self {
        self.diff_policy = policy;
        self
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connector(&self) -> &Arc<dyn DeviceConnector> {
        &self.connector
    }

    pub fn current_sectors(&self) -> &[CanonicalSector] {
        &self.current
    }

    pub fn current_documents(&self) -> (Option<&Value>, Option<&Value>) {
        (self.current_template.as_ref(), self.current_report.as_ref())
    }

    pub fn current_image(&self) -> Option<&ImageEntry> {
        self.current_image.as_ref()
    }

    /// The raw persisted pair for a named handheld sector, if present.
    pub fn handheld_pair(&self, name: &str) -> Option<&Value> {
        self.handheld_pairs
            .iter()
            .find(|(pair_name, _)| pair_name == name)
            .map(|(_, pair)| pair)
    }

    /// Reconciliation output for the last acquisition, filtered per call
    /// site.
    pub fn differences(&self, filter: DiffFilter) -> Vec<SectorDifference> {
        filter.apply(self.differences.clone())
    }

    /// Re-resolve the acquisition handler from live connector status and
    /// roll configuration. Called before every acquisition and on every
    /// connectivity or stored-template change.
    pub fn update_handler(&mut self, sector_mode: SectorMode, has_stored_template: bool) -> HandlerMode {
        let status = self.connector.status();
        self.state.handler = resolve_handler(HandlerInputs {
            connected: status.connected,
            process_ready: status.process_ready,
            simulator: status.simulator,
            sector_mode,
            has_stored_template,
        });
        self.state.handler
    }

    /// Run one acquisition and process its report.
    ///
    /// Re-entrant calls while an acquisition is in flight are rejected,
    /// not queued. Returns false on rejection or fault; the corresponding
    /// state is observable via [`Self::state`].
    pub async fn process(
        &mut self,
        request: AcquisitionRequest,
        stored: &[CanonicalSector],
        ctx: &NormalizeContext,
    ) -> bool {
        if self.state.is_working {
            warn!("{}: acquisition already in flight, request rejected", self.device);
            return false;
        }
        if request.handler.is_offline() {
            warn!("{}: device offline, acquisition skipped", self.device);
            return false;
        }
        if request.image.is_empty() {
            error!("{}: no image bytes available for acquisition", self.device);
            return false;
        }

        self.state.handler = request.handler;
        self.report_dpi = if request.handler.is_simulator() {
            request.image_dpi
        } else if self.device == DeviceKind::Handheld {
            // Handheld thumbnails carry no density.
            0
        } else {
            CAMERA_DPI
        };

        self.begin();
        let generation = self.generation;

        let outcome = tokio::time::timeout(
            self.config.acquisition_timeout(),
            self.connector.process_label(request),
        )
        .await;

        match outcome {
            Err(_) => {
                self.fault_timeout();
                false
            }
            Ok(Err(e)) => {
                error!("{}: connector failure during acquisition: {e}", self.device);
                self.state.is_faulted = true;
                self.state.is_working = false;
                self.notify_fault(FaultReason::EmptyReport);
                false
            }
            Ok(Ok(report)) => self.process_full_report(generation, report, stored, ctx),
        }
    }

    /// Pull an already-captured report from the device by repeat index.
    pub async fn read(
        &mut self,
        index: u32,
        stored: &[CanonicalSector],
        ctx: &NormalizeContext,
    ) -> bool {
        if self.state.is_working {
            warn!("{}: acquisition already in flight, read rejected", self.device);
            return false;
        }

        self.begin();
        let generation = self.generation;

        let outcome = tokio::time::timeout(
            self.config.acquisition_timeout(),
            self.connector.get_full_report(index),
        )
        .await;

        match outcome {
            Err(_) => {
                self.fault_timeout();
                false
            }
            Ok(Err(e)) => {
                error!("{}: connector failure during read: {e}", self.device);
                self.state.is_faulted = true;
                self.state.is_working = false;
                self.notify_fault(FaultReason::EmptyReport);
                false
            }
            Ok(Ok(None)) => {
                // The device had no report to give; not a fault.
                error!("{}: unable to read report {index} from device", self.device);
                self.state.is_working = false;
                self.clear_current();
                false
            }
            Ok(Ok(report @ Some(_))) => self.process_full_report(generation, report, stored, ctx),
        }
    }

    /// Apply an arriving report for the given acquisition generation.
    ///
    /// A report whose generation no longer matches (or that arrives when no
    /// acquisition is in flight) lost the race against the deadline; it is
    /// discarded without touching the fault flag.
    pub fn process_full_report(
        &mut self,
        generation: u64,
        report: Option<VendorReport>,
        stored: &[CanonicalSector],
        ctx: &NormalizeContext,
    ) -> bool {
        if generation != self.generation || !self.state.is_working {
            warn!(
                "{}: stale report discarded (acquisition already resolved)",
                self.device
            );
            return false;
        }

        let ok = self.apply_report(report, stored, ctx);
        self.state.is_working = false;
        ok
    }

    /// Rebuild the difference list against a changed stored set.
    pub fn reconcile_with(&mut self, stored: &[CanonicalSector]) {
        self.differences = reconcile(stored, &self.current, self.comparer.as_ref(), self.diff_policy);
    }

    /// Drop the current set, its documents and its diff list.
    pub fn clear_current(&mut self) {
        self.current.clear();
        self.differences.clear();
        self.current_template = None;
        self.current_report = None;
        self.current_image = None;
        self.handheld_pairs.clear();
        let _ = self.events.send(ResultsEvent::CurrentCleared {
            device: self.device,
            image_uid: self.image_uid,
        });
    }

    /// Remove one named sector from the current set (handheld workflows).
    pub fn remove_current(&mut self, name: &str, stored: &[CanonicalSector]) -> bool {
        let before = self.current.len();
        self.current.retain(|sector| sector.template.name != name);
        if self.current.len() == before {
            warn!("{}: no current sector named '{name}' to clear", self.device);
            return false;
        }
        self.handheld_pairs.retain(|(pair_name, _)| pair_name != name);

        if self.current.is_empty() {
            self.clear_current();
        } else {
            if self.device == DeviceKind::Handheld {
                self.rebuild_handheld_report();
            }
            self.reconcile_with(stored);
        }
        true
    }

    fn begin(&mut self) {
        self.state.is_working = true;
        self.state.is_faulted = false;
        self.generation = self.generation.wrapping_add(1);
        let _ = self.events.send(ResultsEvent::AcquisitionStarted {
            device: self.device,
            image_uid: self.image_uid,
        });
    }

    fn fault_timeout(&mut self) {
        error!(
            "{}: acquisition deadline of {:?} elapsed with no report",
            self.device,
            self.config.acquisition_timeout()
        );
        self.state.is_working = false;
        self.state.is_faulted = true;
        self.notify_fault(FaultReason::Timeout);
    }

    fn notify_fault(&self, reason: FaultReason) {
        let _ = self.events.send(ResultsEvent::AcquisitionFaulted {
            device: self.device,
            image_uid: self.image_uid,
            reason,
        });
    }

    fn apply_report(
        &mut self,
        report: Option<VendorReport>,
        stored: &[CanonicalSector],
        ctx: &NormalizeContext,
    ) -> bool {
        let Some(report) = report else {
            error!("{}: full report is null", self.device);
            self.state.is_faulted = true;
            self.notify_fault(FaultReason::EmptyReport);
            return false;
        };
        if report.image.is_empty() {
            error!("{}: report image payload is empty", self.device);
            self.state.is_faulted = true;
            self.notify_fault(FaultReason::EmptyReport);
            return false;
        }

        match self.ingest(report, stored, ctx) {
            Ok(sector_count) => {
                self.state.is_faulted = false;
                let _ = self.events.send(ResultsEvent::AcquisitionCompleted {
                    device: self.device,
                    image_uid: self.image_uid,
                    sector_count,
                });
                true
            }
            Err(e) => {
                error!("{}: error while processing report: {e}", self.device);
                self.state.is_faulted = true;
                self.notify_fault(FaultReason::Parse);
                false
            }
        }
    }

    fn ingest(
        &mut self,
        report: VendorReport,
        stored: &[CanonicalSector],
        ctx: &NormalizeContext,
    ) -> Result<usize> {
        let normalizer = normalizer_for(self.device);
        let added = normalizer.normalize(&report.template, &report.report, ctx)?;

        if self.device == DeviceKind::Handheld {
            // One capture per trigger pull; the current set accumulates.
            for sector in &added {
                let mut template = report.template.clone();
                if let Value::Object(map) = &mut template {
                    map.insert(
                        "Name".to_string(),
                        Value::String(sector.template.name.clone()),
                    );
                }
                let pair =
                    serde_json::json!({ "Template": template, "Report": report.report.clone() });
                self.handheld_pairs.push((sector.template.name.clone(), pair));
            }
            self.current.extend(added);
            self.rebuild_handheld_report();
            self.current_template = None;
        } else {
            self.current = added;
            self.current_template = Some(report.template);
            self.current_report = Some(report.report);
            self.handheld_pairs.clear();
        }

        order_sectors(&mut self.current);
        self.reconcile_with(stored);
        self.current_image = Some(ImageEntry::new(self.image_uid, report.image, self.report_dpi));
        Ok(self.current.len())
    }

    fn rebuild_handheld_report(&mut self) {
        let pairs: Vec<&Value> = self.handheld_pairs.iter().map(|(_, pair)| pair).collect();
        self.current_report = Some(serde_json::json!({ "AllReports": pairs }));
    }
}

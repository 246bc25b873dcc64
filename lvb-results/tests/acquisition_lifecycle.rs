//! End-to-end acquisition lifecycle tests
//!
//! Drives coordinators and the manager against scripted connectors and an
//! in-memory SQLite store: acquire, reconcile, persist, reload, and fault
//! paths.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lvb_common::config::WorkbenchConfig;
use lvb_common::diff::DiffFilter;
use lvb_common::events::ResultsEvent;
use lvb_common::roll::{ImageEntry, ImageRollConfig, ImageSourcePolicy, SectorMode};
use lvb_common::{DeviceKind, HandlerMode};
use lvb_results::connector::{AcquisitionRequest, ConnectorStatus, DeviceConnector, VendorReport};
use lvb_results::coordinator::{ResultEntryCoordinator, StoreOutcome};
use lvb_results::store::SqliteResultsStore;
use lvb_results::{Result, ResultsManager};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Connector that plays back a scripted queue of reports.
struct ScriptedConnector {
    device: DeviceKind,
    connected: AtomicBool,
    simulator: AtomicBool,
    responses: Mutex<VecDeque<Option<VendorReport>>>,
    requests: Mutex<Vec<AcquisitionRequest>>,
}

impl ScriptedConnector {
    fn new(device: DeviceKind) -> Self {
        Self {
            device,
            connected: AtomicBool::new(true),
            simulator: AtomicBool::new(true),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push_response(&self, report: Option<VendorReport>) {
        self.responses.lock().unwrap().push_back(report);
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn last_request(&self) -> Option<AcquisitionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DeviceConnector for ScriptedConnector {
    fn device(&self) -> DeviceKind {
        self.device
    }

    fn status(&self) -> ConnectorStatus {
        ConnectorStatus {
            connected: self.connected.load(Ordering::SeqCst),
            process_ready: self.connected.load(Ordering::SeqCst),
            simulator: self.simulator.load(Ordering::SeqCst),
        }
    }

    async fn process_label(&self, request: AcquisitionRequest) -> Result<Option<VendorReport>> {
        self.requests.lock().unwrap().push(request);
        Ok(self.responses.lock().unwrap().pop_front().flatten())
    }

    async fn get_full_report(&self, _index: u32) -> Result<Option<VendorReport>> {
        Ok(self.responses.lock().unwrap().pop_front().flatten())
    }

    async fn delete_sectors(&self) -> Result<bool> {
        Ok(true)
    }

    async fn add_sector(&self, _name: &str, _definition: &Value) -> Result<bool> {
        Ok(true)
    }

    async fn add_mask(&self, _name: &str, _layer: &Value) -> Result<bool> {
        Ok(true)
    }

    async fn detect_sectors(&self) -> Result<bool> {
        Ok(true)
    }
}

fn vision_report(grade_letter: &str, grade_value: f64, symbology: &str) -> VendorReport {
    VendorReport {
        template: json!({
            "jobVersion": "1.0.0",
            "sectors": [{"name": "sector1", "username": "Code 1",
                         "left": 10.0, "top": 10.0, "width": 100.0, "height": 100.0}]
        }),
        report: json!({
            "inspectLabel": {"inspectSector": [
                {"name": "sector1", "type": "verify2D",
                 "left": 10.0, "top": 10.0, "width": 100.0, "height": 100.0,
                 "data": {"symbolType": symbology,
                          "overallGrade": {"grade": {"letter": grade_letter,
                                                     "value": grade_value}}}}
            ]}
        }),
        image: vec![0xFF, 0xD8, 0xFF],
    }
}

fn handheld_report(x1: f64, y1: f64, grade: &str) -> VendorReport {
    VendorReport {
        template: json!({
            "Report": {"X1": x1, "Y1": y1, "SizeX": 60.0, "SizeY": 60.0},
            "Settings": [{"SettingName": "Version", "SettingValue": "3.1"}]
        }),
        report: json!({
            "OverallGrade": grade,
            "Symbology": "DataMatrix",
            "Decodability": 96.0
        }),
        image: vec![0x42, 0x4D],
    }
}

async fn coordinator_with(
    connector: Arc<ScriptedConnector>,
) -> (ResultEntryCoordinator, Arc<SqliteResultsStore>) {
    let store = Arc::new(SqliteResultsStore::connect("sqlite::memory:").await.unwrap());
    let roll = ImageRollConfig::new(
        Uuid::new_v4(),
        SectorMode::Dynamic,
        ImageSourcePolicy::Source,
        600,
    );
    let source_image = ImageEntry::new(Uuid::new_v4(), vec![1, 2, 3, 4], 300);
    let (events, _) = broadcast::channel(64);
    let coordinator = ResultEntryCoordinator::new(
        source_image,
        roll,
        WorkbenchConfig::default(),
        store.clone(),
        vec![connector],
        events,
    );
    (coordinator, store)
}

#[tokio::test]
async fn test_acquire_store_reacquire_round_trip() {
    init_tracing();
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Vision));
    let (mut coordinator, _store) = coordinator_with(connector.clone()).await;

    // First capture with no baseline.
    connector.push_response(Some(vision_report("A", 4.0, "DataMatrix")));
    assert!(coordinator.process(DeviceKind::Vision).await);
    assert_eq!(coordinator.current_sectors(DeviceKind::Vision).len(), 1);
    // No baseline yet: the diff stays empty (new sectors are not flooded).
    assert!(coordinator
        .differences(DeviceKind::Vision, DiffFilter::All)
        .is_empty());

    // Persist it as the baseline; the current set moves to stored.
    assert_eq!(
        coordinator.store(DeviceKind::Vision, false).await,
        StoreOutcome::Stored
    );
    assert_eq!(coordinator.stored_sectors(DeviceKind::Vision).len(), 1);
    assert!(coordinator.current_sectors(DeviceKind::Vision).is_empty());

    // Identical re-capture reconciles clean.
    connector.push_response(Some(vision_report("A", 4.0, "DataMatrix")));
    assert!(coordinator.process(DeviceKind::Vision).await);
    assert!(coordinator
        .differences(DeviceKind::Vision, DiffFilter::All)
        .is_empty());

    // A degraded capture surfaces a field delta, but not a missing entry.
    connector.push_response(Some(vision_report("C", 2.0, "DataMatrix")));
    assert!(coordinator.process(DeviceKind::Vision).await);
    let all = coordinator.differences(DeviceKind::Vision, DiffFilter::All);
    assert_eq!(all.len(), 1);
    assert!(!all[0].is_sector_missing);
    assert!(coordinator
        .differences(DeviceKind::Vision, DiffFilter::MissingOnly)
        .is_empty());

    // A symbology flip is reported as a synthetic missing entry.
    connector.push_response(Some(vision_report("A", 4.0, "QRCode")));
    assert!(coordinator.process(DeviceKind::Vision).await);
    let missing = coordinator.differences(DeviceKind::Vision, DiffFilter::MissingOnly);
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].username, "Code 1 (SYMBOLOGY MISMATCH)");
}

#[tokio::test]
async fn test_store_requires_confirmation_to_overwrite() {
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Vision));
    let (mut coordinator, _store) = coordinator_with(connector.clone()).await;

    connector.push_response(Some(vision_report("A", 4.0, "DataMatrix")));
    assert!(coordinator.process(DeviceKind::Vision).await);
    assert_eq!(
        coordinator.store(DeviceKind::Vision, false).await,
        StoreOutcome::Stored
    );

    connector.push_response(Some(vision_report("B", 3.0, "DataMatrix")));
    assert!(coordinator.process(DeviceKind::Vision).await);

    // A baseline exists now; without permission the store is refused.
    assert_eq!(
        coordinator.store(DeviceKind::Vision, false).await,
        StoreOutcome::NeedsConfirmation
    );
    assert_eq!(coordinator.current_sectors(DeviceKind::Vision).len(), 1);

    assert_eq!(
        coordinator.store(DeviceKind::Vision, true).await,
        StoreOutcome::Stored
    );
    assert_eq!(
        coordinator.stored_sectors(DeviceKind::Vision)[0]
            .report
            .grade
            .letter,
        "B"
    );
}

#[tokio::test]
async fn test_store_with_nothing_captured_fails() {
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Vision));
    let (mut coordinator, _store) = coordinator_with(connector).await;
    assert_eq!(
        coordinator.store(DeviceKind::Vision, true).await,
        StoreOutcome::NothingToStore
    );
}

#[tokio::test]
async fn test_clear_stored_removes_baseline_and_rediffs() {
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Vision));
    let (mut coordinator, _store) = coordinator_with(connector.clone()).await;

    connector.push_response(Some(vision_report("A", 4.0, "DataMatrix")));
    assert!(coordinator.process(DeviceKind::Vision).await);
    assert_eq!(
        coordinator.store(DeviceKind::Vision, false).await,
        StoreOutcome::Stored
    );
    assert!(!coordinator.stored_sectors(DeviceKind::Vision).is_empty());

    assert!(coordinator.clear_stored(DeviceKind::Vision).await);
    assert!(coordinator.stored_sectors(DeviceKind::Vision).is_empty());
    assert!(coordinator
        .differences(DeviceKind::Vision, DiffFilter::All)
        .is_empty());
}

#[tokio::test]
async fn test_restore_handler_carries_stored_template() {
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Vision));
    let (mut coordinator, _store) = coordinator_with(connector.clone()).await;

    connector.push_response(Some(vision_report("A", 4.0, "DataMatrix")));
    assert!(coordinator.process(DeviceKind::Vision).await);
    assert_eq!(
        coordinator.store(DeviceKind::Vision, false).await,
        StoreOutcome::Stored
    );

    // With a baseline present the dynamic roll resolves to restore, and
    // the request replays the stored template document.
    connector.push_response(Some(vision_report("A", 4.0, "DataMatrix")));
    assert!(coordinator.process(DeviceKind::Vision).await);
    let request = connector.last_request().unwrap();
    assert_eq!(request.handler, HandlerMode::SimulatorRestore);
    assert!(request.stored_template.is_some());
}

#[tokio::test]
async fn test_offline_device_skips_acquisition() {
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Vision));
    let (mut coordinator, _store) = coordinator_with(connector.clone()).await;

    connector.set_connected(false);
    assert!(!coordinator.process(DeviceKind::Vision).await);
    assert_eq!(
        coordinator.state(DeviceKind::Vision).unwrap().handler,
        HandlerMode::Offline
    );
    assert!(!coordinator.is_faulted(DeviceKind::Vision));
}

#[tokio::test]
async fn test_null_report_faults_entry() {
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Vision));
    let (mut coordinator, _store) = coordinator_with(connector.clone()).await;

    connector.push_response(None);
    assert!(!coordinator.process(DeviceKind::Vision).await);
    assert!(coordinator.is_faulted(DeviceKind::Vision));
    assert!(!coordinator.is_working(DeviceKind::Vision));

    // A good follow-up acquisition recovers.
    connector.push_response(Some(vision_report("A", 4.0, "DataMatrix")));
    assert!(coordinator.process(DeviceKind::Vision).await);
    assert!(!coordinator.is_faulted(DeviceKind::Vision));
}

#[tokio::test]
async fn test_handheld_accumulates_and_names_sectors() {
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Handheld));
    let (mut coordinator, _store) = coordinator_with(connector.clone()).await;

    // Two trigger pulls at distinct locations accumulate into one set
    // with synthetic names.
    connector.push_response(Some(handheld_report(100.0, 100.0, "A (4.0)")));
    assert!(coordinator.process(DeviceKind::Handheld).await);
    connector.push_response(Some(handheld_report(400.0, 100.0, "B (3.2)")));
    assert!(coordinator.process(DeviceKind::Handheld).await);

    let current = coordinator.current_sectors(DeviceKind::Handheld);
    assert_eq!(current.len(), 2);
    assert_eq!(current[0].template.name, "Verify_1");
    assert_eq!(current[1].template.name, "Verify_2");

    // Persist, reload: names survive through the AllReports document.
    assert_eq!(
        coordinator.store(DeviceKind::Handheld, false).await,
        StoreOutcome::Stored
    );
    let stored = coordinator.stored_sectors(DeviceKind::Handheld);
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].template.name, "Verify_1");
    assert_eq!(stored[1].template.name, "Verify_2");

    // A re-capture at the first location inherits the stored name via the
    // containment lookup, so reconciliation matches it up.
    connector.push_response(Some(handheld_report(110.0, 110.0, "C (1.8)")));
    assert!(coordinator.process(DeviceKind::Handheld).await);
    let current = coordinator.current_sectors(DeviceKind::Handheld);
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].template.name, "Verify_1");

    let all = coordinator.differences(DeviceKind::Handheld, DiffFilter::All);
    // Grade delta for Verify_1 plus Verify_2 missing from current.
    assert_eq!(all.len(), 2);
    assert!(!all[0].is_sector_missing);
    assert!(all[1].is_sector_missing);
}

#[tokio::test]
async fn test_handheld_store_single_and_clear_single() {
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Handheld));
    let (mut coordinator, _store) = coordinator_with(connector.clone()).await;

    connector.push_response(Some(handheld_report(100.0, 100.0, "A (4.0)")));
    assert!(coordinator.process(DeviceKind::Handheld).await);
    connector.push_response(Some(handheld_report(400.0, 100.0, "B (3.2)")));
    assert!(coordinator.process(DeviceKind::Handheld).await);

    // Store only the first capture; it leaves the current set.
    assert_eq!(
        coordinator
            .store_single(DeviceKind::Handheld, "Verify_1", false)
            .await,
        StoreOutcome::Stored
    );
    assert_eq!(coordinator.stored_sectors(DeviceKind::Handheld).len(), 1);
    let current = coordinator.current_sectors(DeviceKind::Handheld);
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].template.name, "Verify_2");

    // Clearing the remaining capture empties the current set.
    assert!(coordinator.clear_single(DeviceKind::Handheld, "Verify_2"));
    assert!(coordinator.current_sectors(DeviceKind::Handheld).is_empty());
    assert!(!coordinator.clear_single(DeviceKind::Handheld, "Verify_2"));
}

#[tokio::test]
async fn test_store_single_rejected_for_other_devices() {
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Vision));
    let (mut coordinator, _store) = coordinator_with(connector.clone()).await;

    connector.push_response(Some(vision_report("A", 4.0, "DataMatrix")));
    assert!(coordinator.process(DeviceKind::Vision).await);
    assert_eq!(
        coordinator
            .store_single(DeviceKind::Vision, "sector1", true)
            .await,
        StoreOutcome::Failed
    );
}

#[tokio::test]
async fn test_manager_aggregates_fault_state_and_events() {
    init_tracing();
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Vision));
    let store = Arc::new(SqliteResultsStore::connect("sqlite::memory:").await.unwrap());
    let roll = ImageRollConfig::new(
        Uuid::new_v4(),
        SectorMode::Dynamic,
        ImageSourcePolicy::Source,
        600,
    );
    let mut manager = ResultsManager::new(
        WorkbenchConfig::default(),
        roll,
        store,
        vec![connector.clone()],
    );
    let mut events = manager.subscribe();

    let image_uid = manager.add_image(ImageEntry::new(Uuid::new_v4(), vec![1, 2, 3], 300));
    assert!(!manager.device_faulted(DeviceKind::Vision));

    connector.push_response(None);
    assert!(!manager
        .coordinator_mut(image_uid)
        .unwrap()
        .process(DeviceKind::Vision)
        .await);
    assert!(manager.device_faulted(DeviceKind::Vision));
    assert!(!manager.device_working(DeviceKind::Vision));

    // Started, then faulted.
    let started = events.recv().await.unwrap();
    assert!(matches!(started, ResultsEvent::AcquisitionStarted { .. }));
    let faulted = events.recv().await.unwrap();
    assert!(matches!(faulted, ResultsEvent::AcquisitionFaulted { .. }));

    // Recovery clears the aggregate flag.
    connector.push_response(Some(vision_report("A", 4.0, "DataMatrix")));
    assert!(manager
        .coordinator_mut(image_uid)
        .unwrap()
        .process(DeviceKind::Vision)
        .await);
    assert!(!manager.device_faulted(DeviceKind::Vision));

    assert!(manager.remove_image(image_uid));
    assert!(!manager.remove_image(image_uid));
}

#[tokio::test]
async fn test_read_pulls_report_without_trigger() {
    let connector = Arc::new(ScriptedConnector::new(DeviceKind::Vision));
    let (mut coordinator, _store) = coordinator_with(connector.clone()).await;

    connector.push_response(Some(vision_report("A", 4.0, "DataMatrix")));
    assert!(coordinator.read(DeviceKind::Vision, 0).await);
    assert_eq!(coordinator.current_sectors(DeviceKind::Vision).len(), 1);

    // No report available: the current set is cleared, no fault raised.
    connector.push_response(None);
    assert!(!coordinator.read(DeviceKind::Vision, 0).await);
    assert!(coordinator.current_sectors(DeviceKind::Vision).is_empty());
    assert!(!coordinator.is_faulted(DeviceKind::Vision));
}

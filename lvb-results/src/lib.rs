//! # LVB Results
//!
//! Result reconciliation and acquisition orchestration for the label
//! verification workbench:
//! - Device connector contract (wire protocols live behind it)
//! - Vendor report normalizers for the three device families
//! - Per-device acquisition lifecycle with timeout fault recovery
//! - Result-entry coordination (stored vs. current sector sets)
//! - SQLite results store

pub mod connector;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod normalize;
pub mod orchestrator;
pub mod store;

pub use connector::{AcquisitionRequest, ConnectorStatus, DeviceConnector, VendorReport};
pub use coordinator::{LoadOutcome, ResultEntryCoordinator, StoreOutcome};
pub use error::{Error, Result};
pub use manager::ResultsManager;
pub use orchestrator::{AcquisitionOrchestrator, AcquisitionState};
pub use store::{ResultsGateway, StoredResult};

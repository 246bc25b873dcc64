//! Device connector contract
//!
//! One connector per device family. The wire protocol (REST, websocket,
//! process automation) lives entirely behind this trait; the results layer
//! only sees structured vendor documents.

use async_trait::async_trait;
use lvb_common::{DeviceKind, HandlerMode};
use serde_json::Value;

use crate::Result;

/// A captured report as returned by a device: the template/job document,
/// the inspection report document, and the image the device graded.
#[derive(Debug, Clone)]
pub struct VendorReport {
    pub template: Value,
    pub report: Value,
    pub image: Vec<u8>,
}

/// Connectivity flags consumed read-only by handler resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectorStatus {
    pub connected: bool,
    /// The device's backing process is up and accepting work (always true
    /// for devices without a separate process).
    pub process_ready: bool,
    pub simulator: bool,
}

/// One acquisition request.
///
/// `stored_template` is present only for Restore handler modes, so the
/// device can replay prior sector definitions instead of re-detecting.
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub image: Vec<u8>,
    pub image_dpi: u32,
    pub handler: HandlerMode,
    pub stored_template: Option<Value>,
}

/// Device connector, one implementation per device family.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    fn device(&self) -> DeviceKind;

    fn status(&self) -> ConnectorStatus;

    /// Run one acquisition. Resolves when the device produces its report;
    /// `None` means the device finished without a report.
    async fn process_label(&self, request: AcquisitionRequest) -> Result<Option<VendorReport>>;

    /// Pull-style read of an already-captured report by repeat index.
    async fn get_full_report(&self, index: u32) -> Result<Option<VendorReport>>;

    /// Remove all sector definitions from the device.
    async fn delete_sectors(&self) -> Result<bool>;

    /// Push one sector definition to the device.
    async fn add_sector(&self, name: &str, definition: &Value) -> Result<bool>;

    /// Push one blemish-mask layer for a named sector.
    async fn add_mask(&self, name: &str, layer: &Value) -> Result<bool>;

    /// Ask the device to auto-detect sectors on the registered image.
    async fn detect_sectors(&self) -> Result<bool>;
}

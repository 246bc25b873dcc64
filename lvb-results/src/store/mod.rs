//! Results persistence
//!
//! The gateway is an external synchronized resource: callers must not
//! assume atomicity across a read-then-write sequence. Overwrite safety
//! rests on caller confirmation, not on locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lvb_common::roll::ImageEntry;
use lvb_common::DeviceKind;
use serde_json::Value;
use uuid::Uuid;

use crate::Result;

mod sqlite;

pub use sqlite::SqliteResultsStore;

/// One persisted baseline: the template and report documents captured for
/// a (device, roll, source image, run) tuple, plus the graded image.
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub device: DeviceKind,
    pub image_roll_uid: Uuid,
    pub source_image_uid: Uuid,
    pub run_uid: Uuid,
    pub template: Value,
    pub report: Value,
    pub stored_image: Option<ImageEntry>,
    pub created_at: DateTime<Utc>,
}

impl StoredResult {
    /// True when the row carries both documents needed to rebuild sectors.
    pub fn has_documents(&self) -> bool {
        !self.report.is_null()
    }
}

/// Persistence gateway for stored results.
///
/// `insert_or_replace_result` returns `None` to signal failure; failures
/// are logged by callers, never thrown across the orchestration surface.
#[async_trait]
pub trait ResultsGateway: Send + Sync {
    async fn select_result(
        &self,
        device: DeviceKind,
        image_roll_uid: Uuid,
        source_image_uid: Uuid,
        run_uid: Uuid,
    ) -> Result<Option<StoredResult>>;

    async fn insert_or_replace_result(&self, result: &StoredResult)
        -> Result<Option<StoredResult>>;

    async fn delete_result(
        &self,
        device: DeviceKind,
        image_roll_uid: Uuid,
        source_image_uid: Uuid,
        run_uid: Uuid,
    ) -> Result<bool>;
}

//! Vendor report normalization
//!
//! Converts the three structurally different vendor document formats into
//! the canonical sector model. Each device family has one normalizer behind
//! a shared trait; dispatch is keyed by [`DeviceKind`]. Vendor documents are
//! deserialized into per-device typed structs first, so an unknown shape is
//! a typed parse error rather than a silent path miss.

use lvb_common::geometry::Point;
use lvb_common::sector::MeasurementValue;
use lvb_common::{CanonicalSector, DeviceKind};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Result;

mod handheld;
mod scanner;
mod vision;

pub use handheld::HandheldNormalizer;
pub use scanner::ScannerNormalizer;
pub use vision::VisionNormalizer;

/// A known sector location used for the handheld naming lookup.
#[derive(Debug, Clone)]
pub struct NamedPoint {
    pub name: String,
    pub center: Point,
}

/// Context shared by all normalizers for one pass.
#[derive(Debug, Clone, Default)]
pub struct NormalizeContext {
    /// Drop sectors whose report indicates no symbol was detected; when
    /// false they are kept with a zero-value grade.
    pub ignore_no_read: bool,
    /// Radius for the handheld center-point containment lookup.
    pub containment_radius: f64,
    /// Sector locations already known to the workbench (stored and current,
    /// across device entries), searched in order.
    pub existing: Vec<NamedPoint>,
    /// Sectors already accumulated in the current set before this pass;
    /// synthetic handheld names continue the 1-based count from here.
    pub accumulated: usize,
}

impl NormalizeContext {
    /// Name of the first known sector whose center the given point falls
    /// within, if any.
    pub fn name_at(&self, center: Point) -> Option<&str> {
        self.existing
            .iter()
            .find(|known| known.center.within(center, self.containment_radius))
            .map(|known| known.name.as_str())
    }
}

/// One vendor report normalizer.
///
/// A failure to parse an individual sector must not abort normalization of
/// the remaining sectors in the same report; only a document that does not
/// match the device schema at all is an error.
pub trait ReportNormalizer: Send + Sync {
    fn device(&self) -> DeviceKind;

    fn normalize(
        &self,
        template: &Value,
        report: &Value,
        ctx: &NormalizeContext,
    ) -> Result<Vec<CanonicalSector>>;
}

/// The normalizer for a device family.
pub fn normalizer_for(device: DeviceKind) -> &'static dyn ReportNormalizer {
    match device {
        DeviceKind::Vision => &VisionNormalizer,
        DeviceKind::Scanner => &ScannerNormalizer,
        DeviceKind::Handheld => &HandheldNormalizer,
    }
}

/// Collect scalar JSON fields into the extended measurement map. Nested
/// objects and arrays are not measurements and are ignored.
pub(crate) fn collect_measurements(
    fields: &serde_json::Map<String, Value>,
) -> BTreeMap<String, MeasurementValue> {
    let mut out = BTreeMap::new();
    for (key, value) in fields {
        let measurement = match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MeasurementValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    MeasurementValue::Number(f)
                } else {
                    continue;
                }
            }
            Value::String(s) => MeasurementValue::Text(s.clone()),
            Value::Bool(b) => MeasurementValue::Text(b.to_string()),
            _ => continue,
        };
        out.insert(key.clone(), measurement);
    }
    out
}

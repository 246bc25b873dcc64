//! Canonical sector model
//!
//! Every vendor report, regardless of device family, is normalized into a
//! list of [`CanonicalSector`] values: the static template definition of an
//! inspected region paired with the measured report for it. Sectors are
//! constructed once per normalization pass and never mutated.

use crate::geometry::{Point, Rect};
use crate::symbology::{Grade, Symbology};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One layer of a blemish mask attached to a sector template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlemishLayer {
    pub name: String,
    pub value: i64,
}

/// Blemish-mask layers restored to the device alongside sector definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlemishMask {
    pub layers: Vec<BlemishLayer>,
}

/// Static definition of an inspected region.
///
/// `name` is the join key for reconciliation and is unique within one
/// captured report; `username` is display-only and may collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorTemplate {
    pub name: String,
    pub username: String,
    pub region: Rect,
    /// Degrees, clockwise.
    pub orientation: f64,
    pub blemish_mask: Option<BlemishMask>,
    /// Symbology/job version tag carried by the vendor template.
    pub version: Option<String>,
}

impl SectorTemplate {
    pub fn center(&self) -> Point {
        self.region.center()
    }
}

/// A device-specific extended measurement (module modulation, quiet zone,
/// decode contrast, ...). Kept loosely typed; reconciliation compares by
/// display value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    Number(f64),
    Integer(i64),
    Text(String),
}

impl std::fmt::Display for MeasurementValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Measured outcome for one sector.
///
/// `measurements` is an ordered map so iteration, and therefore
/// reconciliation output, is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorReport {
    pub symbology: Symbology,
    pub grade: Grade,
    pub region: Rect,
    #[serde(default)]
    pub measurements: BTreeMap<String, MeasurementValue>,
}

impl SectorReport {
    pub fn center(&self) -> Point {
        self.region.center()
    }
}

/// One inspected region of a label: template definition plus measured
/// report, immutable after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSector {
    pub template: SectorTemplate,
    pub report: SectorReport,
}

/// Deterministic spatial sort: ascending by (report top, report left),
/// ties keep arrival order. Applied identically to stored and current sets
/// before display and reconciliation so comparison order is position-stable
/// rather than order-of-arrival dependent.
pub fn order_sectors(sectors: &mut [CanonicalSector]) {
    sectors.sort_by(|a, b| {
        a.report
            .region
            .top
            .total_cmp(&b.report.region.top)
            .then(a.report.region.left.total_cmp(&b.report.region.left))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(name: &str, top: f64, left: f64) -> CanonicalSector {
        CanonicalSector {
            template: SectorTemplate {
                name: name.to_string(),
                username: name.to_string(),
                region: Rect::new(left, top, 10.0, 10.0),
                orientation: 0.0,
                blemish_mask: None,
                version: None,
            },
            report: SectorReport {
                symbology: Symbology::DataMatrix,
                grade: Grade::new("A", 4.0),
                region: Rect::new(left, top, 10.0, 10.0),
                measurements: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn test_order_top_then_left() {
        let mut sectors = vec![
            sector("c", 50.0, 10.0),
            sector("a", 10.0, 90.0),
            sector("b", 10.0, 20.0),
        ];
        order_sectors(&mut sectors);
        let names: Vec<_> = sectors.iter().map(|s| s.template.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn test_order_is_stable_on_ties() {
        let mut sectors = vec![sector("first", 10.0, 10.0), sector("second", 10.0, 10.0)];
        order_sectors(&mut sectors);
        assert_eq!(sectors[0].template.name, "first");
        assert_eq!(sectors[1].template.name, "second");
    }
}

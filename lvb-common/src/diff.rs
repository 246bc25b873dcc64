//! Sector reconciliation
//!
//! Diffs a stored baseline sector collection against a freshly captured
//! one, producing a deterministic, ordered list of differences. Matched
//! differences surface first, then stored sectors missing from the current
//! set, then current sectors missing from the baseline.

use crate::sector::{CanonicalSector, SectorReport};
use serde::{Deserialize, Serialize};

/// One field-level delta between a stored and a current measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDeltaEntry {
    pub field: String,
    pub stored: String,
    pub current: String,
}

/// Structured field-level delta produced by a [`SectorComparer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub entries: Vec<FieldDeltaEntry>,
}

/// One reconciliation outcome.
///
/// Rebuilt in full on every pass; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorDifference {
    /// Template join key of the subject sector.
    pub name: String,
    /// Display name, possibly annotated ("(MISSING)", "(SYMBOLOGY MISMATCH)").
    pub username: String,
    pub is_sector_missing: bool,
    pub missing_text: Option<String>,
    pub delta: Option<FieldDelta>,
}

/// Symbology-specific field comparison, injected into the engine.
///
/// Returns `None` when the two reports match exactly; matching sectors
/// produce no reconciliation entry at all.
pub trait SectorComparer {
    fn compare(&self, stored: &SectorReport, current: &SectorReport) -> Option<FieldDelta>;
}

/// Default comparer: overall grade plus the extended measurement map.
///
/// A measurement present in the stored report but absent from the current
/// one is itself a difference.
#[derive(Debug, Clone, Default)]
pub struct MeasurementComparer {
    /// Numeric grade deltas at or below this tolerance are not differences.
    pub grade_tolerance: f64,
}

impl SectorComparer for MeasurementComparer {
    fn compare(&self, stored: &SectorReport, current: &SectorReport) -> Option<FieldDelta> {
        let mut entries = Vec::new();

        let grade_changed = stored.grade.letter != current.grade.letter
            || (stored.grade.value - current.grade.value).abs() > self.grade_tolerance;
        if grade_changed {
            entries.push(FieldDeltaEntry {
                field: "overallGrade".to_string(),
                stored: stored.grade.to_string(),
                current: current.grade.to_string(),
            });
        }

        for (field, stored_value) in &stored.measurements {
            match current.measurements.get(field) {
                Some(current_value) if current_value == stored_value => {}
                Some(current_value) => entries.push(FieldDeltaEntry {
                    field: field.clone(),
                    stored: stored_value.to_string(),
                    current: current_value.to_string(),
                }),
                None => entries.push(FieldDeltaEntry {
                    field: field.clone(),
                    stored: stored_value.to_string(),
                    current: "(not reported)".to_string(),
                }),
            }
        }

        if entries.is_empty() {
            None
        } else {
            Some(FieldDelta { entries })
        }
    }
}

/// Named reconciliation policy knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffPolicy {
    /// Run the current-not-in-stored pass even when the baseline is empty.
    /// Off by default: a first-ever capture produces no flood of "new
    /// sector" entries.
    pub flag_new_without_baseline: bool,
}

/// Caller-level filter over the engine output. The engine itself always
/// returns every entry; each call site decides what it surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffFilter {
    All,
    MissingOnly,
}

impl DiffFilter {
    pub fn apply(self, mut differences: Vec<SectorDifference>) -> Vec<SectorDifference> {
        if self == Self::MissingOnly {
            differences.retain(|d| d.is_sector_missing);
        }
        differences
    }
}

/// Diff `stored` against `current`.
///
/// Output order is fixed: matched-pass entries, then stored sectors with no
/// current counterpart, then current sectors with no stored counterpart.
/// Given identical (ordered) inputs the output is identical across calls;
/// nothing here consults clocks, randomness, or unordered collections.
pub fn reconcile(
    stored: &[CanonicalSector],
    current: &[CanonicalSector],
    comparer: &dyn SectorComparer,
    policy: DiffPolicy,
) -> Vec<SectorDifference> {
    let mut differences = Vec::new();

    // Matched pass. Missing sectors are deliberately not detected here so
    // that found differences stay at the top of the list.
    for sec in stored {
        for current_sec in current {
            if sec.template.name != current_sec.template.name {
                continue;
            }
            if sec.report.symbology == current_sec.report.symbology {
                if let Some(delta) = comparer.compare(&sec.report, &current_sec.report) {
                    differences.push(SectorDifference {
                        name: sec.template.name.clone(),
                        username: current_sec.template.username.clone(),
                        is_sector_missing: false,
                        missing_text: None,
                        delta: Some(delta),
                    });
                }
            } else {
                differences.push(SectorDifference {
                    name: sec.template.name.clone(),
                    username: format!("{} (SYMBOLOGY MISMATCH)", sec.template.username),
                    is_sector_missing: true,
                    missing_text: Some(format!(
                        "Stored Sector {} : Current Sector {}",
                        sec.report.symbology, current_sec.report.symbology
                    )),
                    delta: None,
                });
            }
        }
    }

    // Stored sectors with no same-named counterpart in current.
    for sec in stored {
        let found = current.iter().any(|c| c.template.name == sec.template.name);
        if !found {
            differences.push(SectorDifference {
                name: sec.template.name.clone(),
                username: format!("{} (MISSING)", sec.template.username),
                is_sector_missing: true,
                missing_text: Some("Not found in current Sectors".to_string()),
                delta: None,
            });
        }
    }

    // Current sectors with no same-named counterpart in stored. Gated on a
    // non-empty baseline unless the policy flag lifts the gate.
    if !stored.is_empty() || policy.flag_new_without_baseline {
        for sec in current {
            let found = stored.iter().any(|s| s.template.name == sec.template.name);
            if !found {
                differences.push(SectorDifference {
                    name: sec.template.name.clone(),
                    username: format!("{} (MISSING)", sec.template.username),
                    is_sector_missing: true,
                    missing_text: Some("Not found in Stored Sectors".to_string()),
                    delta: None,
                });
            }
        }
    }

    differences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::sector::{MeasurementValue, SectorTemplate};
    use crate::symbology::{Grade, Symbology};
    use std::collections::BTreeMap;

    fn sector(name: &str, symbology: Symbology, grade: Grade) -> CanonicalSector {
        CanonicalSector {
            template: SectorTemplate {
                name: name.to_string(),
                username: name.to_string(),
                region: Rect::new(0.0, 0.0, 10.0, 10.0),
                orientation: 0.0,
                blemish_mask: None,
                version: None,
            },
            report: SectorReport {
                symbology,
                grade,
                region: Rect::new(0.0, 0.0, 10.0, 10.0),
                measurements: BTreeMap::new(),
            },
        }
    }

    fn comparer() -> MeasurementComparer {
        MeasurementComparer::default()
    }

    #[test]
    fn test_identical_sectors_produce_no_entries() {
        let stored = vec![sector("A", Symbology::DataMatrix, Grade::new("A", 4.0))];
        let current = vec![sector("A", Symbology::DataMatrix, Grade::new("A", 4.0))];
        let diff = reconcile(&stored, &current, &comparer(), DiffPolicy::default());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_missing_in_current() {
        let stored = vec![sector("A", Symbology::DataMatrix, Grade::new("A", 4.0))];
        let diff = reconcile(&stored, &[], &comparer(), DiffPolicy::default());
        assert_eq!(diff.len(), 1);
        assert!(diff[0].is_sector_missing);
        assert_eq!(diff[0].username, "A (MISSING)");
        assert_eq!(
            diff[0].missing_text.as_deref(),
            Some("Not found in current Sectors")
        );
    }

    #[test]
    fn test_missing_in_stored_gated_by_empty_baseline() {
        let current = vec![sector("A", Symbology::DataMatrix, Grade::new("A", 4.0))];
        let diff = reconcile(&[], &current, &comparer(), DiffPolicy::default());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_missing_in_stored_ungated_by_policy_flag() {
        let current = vec![sector("A", Symbology::DataMatrix, Grade::new("A", 4.0))];
        let policy = DiffPolicy {
            flag_new_without_baseline: true,
        };
        let diff = reconcile(&[], &current, &comparer(), policy);
        assert_eq!(diff.len(), 1);
        assert_eq!(
            diff[0].missing_text.as_deref(),
            Some("Not found in Stored Sectors")
        );
    }

    #[test]
    fn test_symbology_mismatch_synthesizes_missing_entry() {
        let stored = vec![sector("A", Symbology::QrCode, Grade::new("A", 4.0))];
        let current = vec![sector("A", Symbology::DataMatrix, Grade::new("A", 4.0))];
        let diff = reconcile(&stored, &current, &comparer(), DiffPolicy::default());
        assert_eq!(diff.len(), 1);
        assert!(diff[0].is_sector_missing);
        assert_eq!(diff[0].username, "A (SYMBOLOGY MISMATCH)");
        assert_eq!(
            diff[0].missing_text.as_deref(),
            Some("Stored Sector QRCode : Current Sector DataMatrix")
        );
    }

    #[test]
    fn test_grade_change_is_a_field_delta() {
        let stored = vec![sector("A", Symbology::DataMatrix, Grade::new("A", 4.0))];
        let current = vec![sector("A", Symbology::DataMatrix, Grade::new("C", 2.0))];
        let diff = reconcile(&stored, &current, &comparer(), DiffPolicy::default());
        assert_eq!(diff.len(), 1);
        assert!(!diff[0].is_sector_missing);
        let delta = diff[0].delta.as_ref().unwrap();
        assert_eq!(delta.entries[0].field, "overallGrade");
        assert_eq!(delta.entries[0].stored, "A (4.0)");
        assert_eq!(delta.entries[0].current, "C (2.0)");
    }

    #[test]
    fn test_measurement_dropped_from_current_is_a_delta() {
        let mut stored_sec = sector("A", Symbology::DataMatrix, Grade::new("A", 4.0));
        stored_sec
            .report
            .measurements
            .insert("quietZone".to_string(), MeasurementValue::Number(1.5));
        let current = vec![sector("A", Symbology::DataMatrix, Grade::new("A", 4.0))];
        let diff = reconcile(&[stored_sec], &current, &comparer(), DiffPolicy::default());
        let delta = diff[0].delta.as_ref().unwrap();
        assert_eq!(delta.entries[0].field, "quietZone");
        assert_eq!(delta.entries[0].current, "(not reported)");
    }

    #[test]
    fn test_output_order_is_matched_then_missing_current_then_missing_stored() {
        let stored = vec![
            sector("A", Symbology::QrCode, Grade::new("A", 4.0)),
            sector("B", Symbology::DataMatrix, Grade::new("A", 4.0)),
        ];
        let current = vec![
            sector("A", Symbology::DataMatrix, Grade::new("A", 4.0)),
            sector("C", Symbology::DataMatrix, Grade::new("A", 4.0)),
        ];
        let diff = reconcile(&stored, &current, &comparer(), DiffPolicy::default());
        assert_eq!(diff.len(), 3);
        assert_eq!(diff[0].username, "A (SYMBOLOGY MISMATCH)");
        assert_eq!(
            diff[1].missing_text.as_deref(),
            Some("Not found in current Sectors")
        );
        assert_eq!(diff[1].name, "B");
        assert_eq!(
            diff[2].missing_text.as_deref(),
            Some("Not found in Stored Sectors")
        );
        assert_eq!(diff[2].name, "C");
    }

    #[test]
    fn test_determinism_across_repeated_calls() {
        use crate::sector::order_sectors;

        let mut stored = vec![
            sector("B", Symbology::DataMatrix, Grade::new("B", 3.0)),
            sector("A", Symbology::QrCode, Grade::new("A", 4.0)),
        ];
        let mut current = vec![
            sector("A", Symbology::DataMatrix, Grade::new("A", 4.0)),
            sector("B", Symbology::DataMatrix, Grade::new("C", 2.0)),
        ];
        order_sectors(&mut stored);
        order_sectors(&mut current);

        let first = reconcile(&stored, &current, &comparer(), DiffPolicy::default());
        let second = reconcile(&stored, &current, &comparer(), DiffPolicy::default());
        assert_eq!(first, second);

        let first_json = serde_json::to_string(&first).unwrap();
        let second_json = serde_json::to_string(&second).unwrap();
        assert_eq!(first_json, second_json);
    }

    #[test]
    fn test_missing_only_filter() {
        let stored = vec![
            sector("A", Symbology::DataMatrix, Grade::new("A", 4.0)),
            sector("B", Symbology::DataMatrix, Grade::new("A", 4.0)),
        ];
        let current = vec![sector("A", Symbology::DataMatrix, Grade::new("C", 2.0))];
        let diff = reconcile(&stored, &current, &comparer(), DiffPolicy::default());
        assert_eq!(diff.len(), 2);

        let missing_only = DiffFilter::MissingOnly.apply(diff.clone());
        assert_eq!(missing_only.len(), 1);
        assert_eq!(missing_only[0].name, "B");

        let all = DiffFilter::All.apply(diff);
        assert_eq!(all.len(), 2);
    }
}

//! Vision-inspection node normalizer
//!
//! Template and report are separate documents. The template carries the
//! sector definitions; the report nests measured sectors under
//! `inspectLabel.inspectSector`. The two are joined by sector name.

use lvb_common::geometry::Rect;
use lvb_common::sector::{BlemishLayer, BlemishMask, CanonicalSector, SectorReport, SectorTemplate};
use lvb_common::symbology::{Grade, Symbology};
use lvb_common::DeviceKind;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{collect_measurements, NormalizeContext, ReportNormalizer};
use crate::{Error, Result};

/// Verification sector kinds this workbench grades. OCR/OCV/blemish
/// sectors are skipped as per-sector parse failures.
const SUPPORTED_KINDS: [&str; 2] = ["verify1D", "verify2D"];

#[derive(Debug, Deserialize)]
struct VisionTemplate {
    sectors: Vec<Value>,
    #[serde(rename = "jobVersion", default)]
    job_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VisionTemplateSector {
    name: String,
    #[serde(default)]
    username: Option<String>,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    orientation: f64,
    #[serde(rename = "blemishMask", default)]
    blemish_mask: Option<VisionBlemishMask>,
}

#[derive(Debug, Deserialize)]
struct VisionBlemishMask {
    #[serde(default)]
    layers: Vec<VisionBlemishLayer>,
}

#[derive(Debug, Deserialize)]
struct VisionBlemishLayer {
    name: String,
    value: i64,
}

#[derive(Debug, Deserialize)]
struct VisionReport {
    #[serde(rename = "inspectLabel")]
    inspect_label: VisionInspectLabel,
}

#[derive(Debug, Deserialize)]
struct VisionInspectLabel {
    #[serde(rename = "inspectSector", default)]
    inspect_sector: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct VisionInspectSector {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    data: VisionSectorData,
}

#[derive(Debug, Deserialize)]
struct VisionSectorData {
    #[serde(rename = "symbolType", default)]
    symbol_type: Option<String>,
    #[serde(rename = "overallGrade", default)]
    overall_grade: Option<VisionOverallGrade>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct VisionOverallGrade {
    /// Absent when the device detected no symbol in the sector.
    #[serde(default)]
    grade: Option<VisionGradeValue>,
}

#[derive(Debug, Deserialize)]
struct VisionGradeValue {
    letter: String,
    value: f64,
}

pub struct VisionNormalizer;

impl ReportNormalizer for VisionNormalizer {
    fn device(&self) -> DeviceKind {
        DeviceKind::Vision
    }

    fn normalize(
        &self,
        template: &Value,
        report: &Value,
        ctx: &NormalizeContext,
    ) -> Result<Vec<CanonicalSector>> {
        let template: VisionTemplate = serde_json::from_value(template.clone())
            .map_err(|e| Error::ReportParse(format!("vision template: {e}")))?;
        let report: VisionReport = serde_json::from_value(report.clone())
            .map_err(|e| Error::ReportParse(format!("vision report: {e}")))?;

        let mut sectors = Vec::new();
        for raw_template in &template.sectors {
            let template_sector: VisionTemplateSector =
                match serde_json::from_value(raw_template.clone()) {
                    Ok(sector) => sector,
                    Err(e) => {
                        warn!("Skipping vision template sector: {e}");
                        continue;
                    }
                };

            for raw_report in &report.inspect_label.inspect_sector {
                let name_matches = raw_report
                    .get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|name| name == template_sector.name);
                if !name_matches {
                    continue;
                }

                match map_sector(&template_sector, raw_report, template.job_version.as_deref(), ctx)
                {
                    Ok(Some(sector)) => sectors.push(sector),
                    Ok(None) => {}
                    Err(e) => warn!(
                        "Skipping vision sector '{}': {e}",
                        template_sector.name
                    ),
                }
                break;
            }
        }

        Ok(sectors)
    }
}

fn map_sector(
    template: &VisionTemplateSector,
    raw_report: &Value,
    job_version: Option<&str>,
    ctx: &NormalizeContext,
) -> Result<Option<CanonicalSector>> {
    let report: VisionInspectSector = serde_json::from_value(raw_report.clone())
        .map_err(|e| Error::SectorParse(e.to_string()))?;

    if !SUPPORTED_KINDS.contains(&report.kind.as_str()) {
        return Err(Error::SectorParse(format!(
            "unsupported sector kind '{}'",
            report.kind
        )));
    }

    let grade = match report.data.overall_grade.as_ref().and_then(|g| g.grade.as_ref()) {
        Some(value) => Grade::new(value.letter.clone(), value.value),
        None => {
            // No symbol detected in this sector.
            if ctx.ignore_no_read {
                return Ok(None);
            }
            Grade::no_read()
        }
    };

    let symbology = report
        .data
        .symbol_type
        .as_deref()
        .map(Symbology::from_name)
        .unwrap_or_else(|| Symbology::Unknown("NoRead".to_string()));

    let blemish_mask = template.blemish_mask.as_ref().map(|mask| BlemishMask {
        layers: mask
            .layers
            .iter()
            .map(|layer| BlemishLayer {
                name: layer.name.clone(),
                value: layer.value,
            })
            .collect(),
    });

    Ok(Some(CanonicalSector {
        template: SectorTemplate {
            name: template.name.clone(),
            username: template
                .username
                .clone()
                .unwrap_or_else(|| template.name.clone()),
            region: Rect::new(template.left, template.top, template.width, template.height),
            orientation: template.orientation,
            blemish_mask,
            version: job_version.map(str::to_string),
        },
        report: SectorReport {
            symbology,
            grade,
            region: Rect::new(report.left, report.top, report.width, report.height),
            measurements: collect_measurements(&report.data.extra),
        },
    }))
}

//! Handheld-style verifier normalizer
//!
//! Each trigger pull produces one template/report pair for a single
//! sector; pairs accumulate into an `AllReports` array that forms the
//! logical current set. A freshly captured sector has no name of its own:
//! it is named after the known sector whose center contains its own center
//! point, falling back to a synthetic `Verify_{n}` name.

use lvb_common::geometry::Rect;
use lvb_common::sector::{CanonicalSector, SectorReport, SectorTemplate};
use lvb_common::symbology::{Grade, Symbology};
use lvb_common::DeviceKind;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{collect_measurements, NormalizeContext, ReportNormalizer};
use crate::{Error, Result};

/// Overall-grade text reported when the verifier saw no symbol.
const NO_READ_GRADE: &str = "Bar Code Not Detected";

#[derive(Debug, Deserialize)]
struct HandheldPair {
    #[serde(rename = "Template")]
    template: Value,
    #[serde(rename = "Report")]
    report: Value,
}

#[derive(Debug, Deserialize)]
struct HandheldTemplate {
    /// Pixel geometry of the captured region.
    #[serde(rename = "Report")]
    geometry: HandheldGeometry,
    #[serde(rename = "Settings", default)]
    settings: Vec<HandheldSetting>,
    /// Present on persisted pairs; live captures are unnamed.
    #[serde(rename = "Name", default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HandheldGeometry {
    #[serde(rename = "X1")]
    x1: f64,
    #[serde(rename = "Y1")]
    y1: f64,
    #[serde(rename = "SizeX")]
    size_x: f64,
    #[serde(rename = "SizeY")]
    size_y: f64,
}

#[derive(Debug, Deserialize)]
struct HandheldSetting {
    #[serde(rename = "SettingName")]
    name: String,
    #[serde(rename = "SettingValue")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct HandheldReport {
    #[serde(rename = "OverallGrade")]
    overall_grade: String,
    #[serde(rename = "Symbology", default)]
    symbology: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

pub struct HandheldNormalizer;

impl ReportNormalizer for HandheldNormalizer {
    fn device(&self) -> DeviceKind {
        DeviceKind::Handheld
    }

    /// Accepts either one live template/report pair, or a persisted
    /// document whose report side is `{"AllReports": [pair, ...]}`.
    fn normalize(
        &self,
        template: &Value,
        report: &Value,
        ctx: &NormalizeContext,
    ) -> Result<Vec<CanonicalSector>> {
        let mut sectors = Vec::new();

        if let Some(all_reports) = report.get("AllReports") {
            let pairs = all_reports.as_array().ok_or_else(|| {
                Error::ReportParse("handheld AllReports is not an array".to_string())
            })?;
            for raw_pair in pairs {
                let pair: HandheldPair = match serde_json::from_value(raw_pair.clone()) {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("Skipping handheld pair: {e}");
                        continue;
                    }
                };
                match map_pair(&pair.template, &pair.report, ctx, sectors.len()) {
                    Ok(Some(sector)) => sectors.push(sector),
                    Ok(None) => {}
                    Err(e) => warn!("Skipping handheld pair: {e}"),
                }
            }
        } else {
            match map_pair(template, report, ctx, 0)? {
                Some(sector) => sectors.push(sector),
                None => {}
            }
        }

        Ok(sectors)
    }
}

fn map_pair(
    template: &Value,
    report: &Value,
    ctx: &NormalizeContext,
    added_so_far: usize,
) -> Result<Option<CanonicalSector>> {
    let template: HandheldTemplate = serde_json::from_value(template.clone())
        .map_err(|e| Error::SectorParse(format!("handheld template: {e}")))?;
    let report: HandheldReport = serde_json::from_value(report.clone())
        .map_err(|e| Error::SectorParse(format!("handheld report: {e}")))?;

    let region = Rect::new(
        template.geometry.x1,
        template.geometry.y1,
        template.geometry.size_x,
        template.geometry.size_y,
    );

    let grade = if report.overall_grade == NO_READ_GRADE {
        if ctx.ignore_no_read {
            return Ok(None);
        }
        Grade::no_read()
    } else {
        parse_overall_grade(&report.overall_grade).ok_or_else(|| {
            Error::SectorParse(format!(
                "unrecognized overall grade '{}'",
                report.overall_grade
            ))
        })?
    };

    let name = match &template.name {
        Some(name) => name.clone(),
        None => match ctx.name_at(region.center()) {
            Some(known) => known.to_string(),
            None => format!("Verify_{}", ctx.accumulated + added_so_far + 1),
        },
    };

    let version = template
        .settings
        .iter()
        .find(|setting| setting.name == "Version")
        .map(|setting| setting.value.clone());

    Ok(Some(CanonicalSector {
        template: SectorTemplate {
            username: name.clone(),
            name,
            region,
            orientation: 0.0,
            blemish_mask: None,
            version,
        },
        report: SectorReport {
            symbology: report
                .symbology
                .as_deref()
                .map(Symbology::from_name)
                .unwrap_or_else(|| Symbology::Unknown("NoRead".to_string())),
            grade,
            region,
            measurements: collect_measurements(&report.extra),
        },
    }))
}

/// Parse the verifier's combined grade text, e.g. `"A (4.0)"`.
fn parse_overall_grade(text: &str) -> Option<Grade> {
    let (letter, rest) = text.trim().split_once(' ')?;
    let value = rest
        .trim()
        .strip_prefix('(')?
        .strip_suffix(')')?
        .parse::<f64>()
        .ok()?;
    Some(Grade::new(letter, value))
}

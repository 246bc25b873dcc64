//! Scanner/verifier appliance normalizer
//!
//! The report nests measured results under `event.data.toolResults[*]
//! .results[*]`; each result carries a 1-based `toolSlot` index into the
//! tool list of the job configuration document, which supplies the region
//! definition for the sector.

use lvb_common::geometry::Rect;
use lvb_common::sector::{CanonicalSector, SectorReport, SectorTemplate};
use lvb_common::symbology::{Grade, Symbology};
use lvb_common::DeviceKind;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{collect_measurements, NormalizeContext, ReportNormalizer};
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct ScannerConfig {
    response: ScannerConfigResponse,
}

#[derive(Debug, Deserialize)]
struct ScannerConfigResponse {
    #[serde(default)]
    message: Option<String>,
    data: ScannerConfigData,
}

#[derive(Debug, Deserialize)]
struct ScannerConfigData {
    job: ScannerJob,
}

#[derive(Debug, Deserialize)]
struct ScannerJob {
    #[serde(rename = "toolList", default)]
    tool_list: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ScannerTool {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "SymbologyTool", default)]
    symbology_tool: Option<ScannerSymbologyTool>,
}

#[derive(Debug, Deserialize)]
struct ScannerSymbologyTool {
    #[serde(rename = "regionList", default)]
    region_list: Vec<ScannerRegionEntry>,
}

#[derive(Debug, Deserialize)]
struct ScannerRegionEntry {
    #[serde(rename = "Region")]
    region: ScannerRegion,
}

#[derive(Debug, Deserialize)]
struct ScannerRegion {
    shape: ScannerShape,
}

#[derive(Debug, Deserialize)]
struct ScannerShape {
    #[serde(rename = "RectShape", default)]
    rect: Option<ScannerRectShape>,
}

#[derive(Debug, Deserialize)]
struct ScannerRectShape {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct ScannerReport {
    event: ScannerEvent,
}

#[derive(Debug, Deserialize)]
struct ScannerEvent {
    data: ScannerEventData,
}

#[derive(Debug, Deserialize)]
struct ScannerEventData {
    #[serde(rename = "toolResults", default)]
    tool_results: Vec<ScannerToolResult>,
}

#[derive(Debug, Deserialize)]
struct ScannerToolResult {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ScannerResult {
    /// 1-based index into the job tool list.
    #[serde(rename = "toolSlot")]
    tool_slot: usize,
    #[serde(default)]
    symbology: Option<String>,
    /// Absent when the tool decoded nothing.
    #[serde(default)]
    grade: Option<ScannerGrade>,
    #[serde(default)]
    region: Option<ScannerResultRegion>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ScannerGrade {
    letter: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ScannerResultRegion {
    #[serde(rename = "xOffset")]
    x_offset: f64,
    #[serde(rename = "yOffset")]
    y_offset: f64,
    width: f64,
    height: f64,
}

pub struct ScannerNormalizer;

impl ReportNormalizer for ScannerNormalizer {
    fn device(&self) -> DeviceKind {
        DeviceKind::Scanner
    }

    fn normalize(
        &self,
        template: &Value,
        report: &Value,
        ctx: &NormalizeContext,
    ) -> Result<Vec<CanonicalSector>> {
        let config: ScannerConfig = serde_json::from_value(template.clone())
            .map_err(|e| Error::ReportParse(format!("scanner config: {e}")))?;
        let report: ScannerReport = serde_json::from_value(report.clone())
            .map_err(|e| Error::ReportParse(format!("scanner report: {e}")))?;

        let version = config.response.message.clone();

        let mut sectors = Vec::new();
        for tool_result in &report.event.data.tool_results {
            for raw_result in &tool_result.results {
                match map_result(raw_result, &config, version.as_deref(), ctx) {
                    Ok(Some(sector)) => sectors.push(sector),
                    Ok(None) => {}
                    Err(e) => warn!("Skipping scanner result: {e}"),
                }
            }
        }

        Ok(sectors)
    }
}

fn map_result(
    raw_result: &Value,
    config: &ScannerConfig,
    version: Option<&str>,
    ctx: &NormalizeContext,
) -> Result<Option<CanonicalSector>> {
    let result: ScannerResult = serde_json::from_value(raw_result.clone())
        .map_err(|e| Error::SectorParse(e.to_string()))?;

    if result.tool_slot == 0 || result.tool_slot > config.response.data.job.tool_list.len() {
        return Err(Error::SectorParse(format!(
            "toolSlot {} outside tool list of {}",
            result.tool_slot,
            config.response.data.job.tool_list.len()
        )));
    }
    let raw_tool = &config.response.data.job.tool_list[result.tool_slot - 1];
    let tool: ScannerTool = serde_json::from_value(raw_tool.clone())
        .map_err(|e| Error::SectorParse(format!("toolSlot {}: {e}", result.tool_slot)))?;

    let grade = match &result.grade {
        Some(grade) => Grade::new(grade.letter.clone(), grade.value),
        None => {
            // The tool ran but decoded no symbol.
            if ctx.ignore_no_read {
                return Ok(None);
            }
            Grade::no_read()
        }
    };

    let name = tool
        .name
        .clone()
        .unwrap_or_else(|| format!("SymbologyTool_{}", result.tool_slot));

    let template_region = tool
        .symbology_tool
        .as_ref()
        .and_then(|t| t.region_list.first())
        .and_then(|entry| entry.region.shape.rect.as_ref())
        .map(|rect| Rect::new(rect.x, rect.y, rect.width, rect.height));

    let report_region = result
        .region
        .as_ref()
        .map(|r| Rect::new(r.x_offset, r.y_offset, r.width, r.height))
        .or(template_region)
        .ok_or_else(|| {
            Error::SectorParse(format!("toolSlot {} has no region", result.tool_slot))
        })?;

    Ok(Some(CanonicalSector {
        template: SectorTemplate {
            name: name.clone(),
            username: name,
            region: template_region.unwrap_or(report_region),
            orientation: 0.0,
            blemish_mask: None,
            version: version.map(str::to_string),
        },
        report: SectorReport {
            symbology: result
                .symbology
                .as_deref()
                .map(Symbology::from_name)
                .unwrap_or_else(|| Symbology::Unknown("NoRead".to_string())),
            grade,
            region: report_region,
            measurements: collect_measurements(&result.extra),
        },
    }))
}

//! Flat epoch records, console report lines and comparative chart data

use crate::types::{BasinResult, DateRange};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Chart title
pub const CHART_TITLE: &str = "Al Gash Basin: Spectral Trends (1985-2025)";

/// Per-epoch summary record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub year: i32,
    #[serde(rename = "MNDWI_value")]
    pub mndwi_value: Option<f64>,
    #[serde(rename = "NDVI_value")]
    pub ndvi_value: Option<f64>,
    #[serde(rename = "BSI_value")]
    pub bsi_value: Option<f64>,
    pub peak_month: Option<u32>,
}

fn show(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "null".to_string(),
    }
}

impl EpochReport {
    pub fn console_lines(&self) -> Vec<String> {
        vec![
            format!("--- Yearly Analysis: {} ---", self.year),
            format!("Peak Water Value (MNDWI): {}", show(self.mndwi_value)),
            format!(
                "Peak Occurrence Month: {}",
                self.peak_month.map_or("null".to_string(), |m| m.to_string())
            ),
            format!("Vegetation at Peak (NDVI): {}", show(self.ndvi_value)),
        ]
    }
}

/// Preprocessing summary of one epoch's optical mosaic and SAR composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetadata {
    pub label: String,
    pub sensor: String,
    pub scene_count: usize,
    pub range: DateRange,
    /// SAR scene count, `None` when the epoch has no SAR range
    pub sar_scene_count: Option<usize>,
}

impl EpochMetadata {
    pub fn console_line(&self) -> String {
        let mut line = format!(
            "Metadata {}: Sensor: {}, Count: {}, Range: {}-{}",
            self.label,
            self.sensor,
            self.scene_count,
            self.range.start.format("%Y"),
            self.range.end.format("%Y")
        );
        if let Some(n) = self.sar_scene_count {
            let _ = write!(line, ", SAR: Sentinel-1 ({} scenes)", n);
        }
        line
    }
}

/// One line of the comparative chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub color: String,
    /// (year, value) pairs
    pub points: Vec<(i32, Option<f64>)>,
}

/// Time series of the three indices keyed by year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparativeChart {
    pub title: String,
    pub x_property: String,
    pub series: Vec<ChartSeries>,
}

impl ComparativeChart {
    pub fn from_reports(reports: &[EpochReport]) -> Self {
        let mut sorted = reports.to_vec();
        sorted.sort_by_key(|r| r.year);
        let series = |name: &str, color: &str, pick: fn(&EpochReport) -> Option<f64>| ChartSeries {
            name: name.to_string(),
            color: color.to_string(),
            points: sorted.iter().map(|r| (r.year, pick(r))).collect(),
        };
        Self {
            title: CHART_TITLE.to_string(),
            x_property: "Year".to_string(),
            series: vec![
                series("Water (MNDWI)", "#2563eb", |r| r.mndwi_value),
                series("Veg (NDVI)", "#16a34a", |r| r.ndvi_value),
                series("Soil (BSI)", "#92400e", |r| r.bsi_value),
            ],
        }
    }

    pub fn to_json(&self) -> BasinResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One row per year, one column per series; missing values are empty cells
    pub fn to_csv(&self) -> String {
        let mut out = self.x_property.clone();
        for s in &self.series {
            out.push(',');
            out.push_str(&s.name);
        }
        out.push('\n');

        let years: Vec<i32> = self
            .series
            .first()
            .map(|s| s.points.iter().map(|p| p.0).collect())
            .unwrap_or_default();
        for (i, year) in years.iter().enumerate() {
            out.push_str(&year.to_string());
            for s in &self.series {
                out.push(',');
                if let Some(Some(v)) = s.points.get(i).map(|p| p.1) {
                    let _ = write!(out, "{}", v);
                }
            }
            out.push('\n');
        }
        out
    }
}

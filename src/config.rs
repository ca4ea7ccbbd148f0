//! Epoch table and run configuration
//!
//! The defaults reproduce the five Al Gash basin epochs. A JSON file with the
//! same shape overrides them; missing fields fall back to the defaults.

use crate::core::band_profile::Sensor;
use crate::core::peak_detector::PeakDetectorParams;
use crate::core::sar_composite::SarFilterParams;
use crate::types::{BasinError, BasinResult, DateRange};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One epoch of the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSpec {
    pub label: String,
    pub year: i32,
    pub sensor: Sensor,
    /// Optical collection id; defaults to the sensor's collection
    pub catalog_id: String,
    /// Peak detection window
    pub peak_range: DateRange,
    /// Multi-year window of the optical median mosaic
    pub mosaic_range: DateRange,
    /// Sentinel-1 window, if SAR is available for the epoch
    pub sar_range: Option<DateRange>,
    /// Optical mosaic export scale in meters
    pub export_scale: f64,
}

impl EpochSpec {
    pub fn new(label: &str, year: i32, sensor: Sensor, mosaic: (&str, &str)) -> BasinResult<Self> {
        Ok(Self {
            label: label.to_string(),
            year,
            sensor,
            catalog_id: sensor.collection_id().to_string(),
            peak_range: DateRange::calendar_year(year)?,
            mosaic_range: DateRange::parse(mosaic.0, mosaic.1)?,
            sar_range: None,
            export_scale: sensor.native_scale(),
        })
    }

    pub fn with_sar(mut self, start: &str, end: &str) -> BasinResult<Self> {
        self.sar_range = Some(DateRange::parse(start, end)?);
        Ok(self)
    }
}

/// Export naming and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Prefix of optical and SAR exports
    pub prefix: String,
    pub folder: String,
    pub max_pixels: f64,
    /// Prefix of peak analysis exports
    pub analysis_prefix: String,
    pub analysis_folder: String,
    pub analysis_scale: f64,
    pub analysis_max_pixels: f64,
    pub sar_scale: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            prefix: "AlGash".to_string(),
            folder: "AlGash_Project".to_string(),
            max_pixels: 1e13,
            analysis_prefix: "Gash".to_string(),
            analysis_folder: "Gash_Basin_Project".to_string(),
            analysis_scale: 30.0,
            analysis_max_pixels: 1e9,
            sar_scale: 10.0,
        }
    }
}

/// Top-level run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasinConfig {
    pub project: String,
    pub epochs: Vec<EpochSpec>,
    pub peak: PeakDetectorParams,
    pub sar: SarFilterParams,
    pub export: ExportConfig,
}

impl Default for BasinConfig {
    fn default() -> Self {
        Self {
            project: "Al Gash Basin".to_string(),
            epochs: default_epochs(),
            peak: PeakDetectorParams::default(),
            sar: SarFilterParams::default(),
            export: ExportConfig::default(),
        }
    }
}

fn default_epochs() -> Vec<EpochSpec> {
    let table = || -> BasinResult<Vec<EpochSpec>> {
        Ok(vec![
            EpochSpec::new("1985", 1985, Sensor::Landsat5Tm, ("1984-01-01", "1987-12-31"))?,
            EpochSpec::new("1995", 1995, Sensor::Landsat5Tm, ("1994-01-01", "1996-12-31"))?,
            EpochSpec::new("2005", 2005, Sensor::Landsat7Etm, ("2004-01-01", "2006-12-31"))?,
            EpochSpec::new("2015", 2015, Sensor::Landsat8Oli, ("2014-01-01", "2016-12-31"))?
                .with_sar("2014-10-01", "2016-12-31")?,
            EpochSpec::new("2025", 2025, Sensor::Sentinel2Msi, ("2024-01-01", "2025-12-31"))?
                .with_sar("2024-01-01", "2025-12-31")?,
        ])
    };
    // The literal table is always valid
    table().unwrap_or_default()
}

fn is_positive(value: f64) -> bool {
    value > 0.0
}

impl BasinConfig {
    pub fn from_json_str(json: &str) -> BasinResult<Self> {
        let config: BasinConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> BasinResult<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> BasinResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> BasinResult<()> {
        if self.epochs.is_empty() {
            return Err(BasinError::Config("No epochs configured".to_string()));
        }
        let mut labels = HashSet::new();
        for epoch in &self.epochs {
            if !labels.insert(epoch.label.as_str()) {
                return Err(BasinError::Config(format!("Duplicate epoch label {}", epoch.label)));
            }
            if !is_positive(epoch.export_scale) {
                return Err(BasinError::Config(format!(
                    "Epoch {} export scale must be positive",
                    epoch.label
                )));
            }
            let ranges = [Some(epoch.peak_range), Some(epoch.mosaic_range), epoch.sar_range];
            if let Some(r) = ranges.iter().flatten().find(|r| r.end <= r.start) {
                return Err(BasinError::Config(format!(
                    "Epoch {} has an empty date range {}",
                    epoch.label, r
                )));
            }
        }
        let positive = [
            ("peak.analysis_scale", self.peak.analysis_scale),
            ("peak.max_pixels", self.peak.max_pixels),
            ("sar.radius_m", self.sar.radius_m),
            ("export.max_pixels", self.export.max_pixels),
            ("export.analysis_scale", self.export.analysis_scale),
            ("export.analysis_max_pixels", self.export.analysis_max_pixels),
            ("export.sar_scale", self.export.sar_scale),
        ];
        for (name, value) in positive {
            if !is_positive(value) {
                return Err(BasinError::Config(format!("{} must be positive, got {}", name, value)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_epochs() {
        let config = BasinConfig::default();
        assert_eq!(config.epochs.len(), 5);
        config.validate().unwrap();

        let e2025 = &config.epochs[4];
        assert_eq!(e2025.sensor, Sensor::Sentinel2Msi);
        assert_eq!(e2025.export_scale, 10.0);
        assert!(e2025.sar_range.is_some());
        assert!(config.epochs[1].sar_range.is_none());
        assert_eq!(config.epochs[0].mosaic_range.to_string(), "1984-01-01..1987-12-31");
        assert_eq!(config.epochs[0].catalog_id, "LANDSAT/LT05/C02/T1_L2");
    }

    #[test]
    fn test_json_round_trip() {
        let config = BasinConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(BasinConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = BasinConfig::from_json_str(r#"{"project": "Gash"}"#).unwrap();
        assert_eq!(config.project, "Gash");
        assert_eq!(config.epochs.len(), 5);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = BasinConfig::default();
        config.epochs[1].label = "1985".to_string();
        assert!(config.validate().is_err());

        let mut config = BasinConfig::default();
        config.peak.analysis_scale = 0.0;
        assert!(matches!(config.validate(), Err(BasinError::Config(_))));

        assert!(BasinConfig::from_json_str(r#"{"epochs": []}"#).is_err());
    }
}

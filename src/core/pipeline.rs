//! Multi-epoch analysis: a pure plan and its parallel execution
//!
//! Epochs are independent and run in parallel. Inside an epoch the peak
//! composite, the optical median mosaic and the SAR composite run
//! concurrently, each with its own result.

use crate::config::{BasinConfig, EpochSpec};
use crate::core::band_profile::{SensorFamily, SAR_COLLECTION};
use crate::core::indices::INDEX_BANDS;
use crate::core::median_composite::{MedianCompositor, OpticalComposite};
use crate::core::peak_detector::{EpochComposite, YearlyPeakDetector};
use crate::core::region::Region;
use crate::core::report::{ComparativeChart, EpochMetadata, EpochReport};
use crate::core::sar_composite::{SarComposite, SarCompositeBuilder};
use crate::io::catalog::{SceneCatalog, SceneQuery};
use crate::io::export::ExportRequest;
use crate::render::{self, Layer, Legend};
use crate::types::{BandStack, BasinResult, DateRange, Scene};

pub const REPORT_HEADER: &str = "--- PHASE I: PROCESSING REPORT (Optical & SAR) ---";

/// Region and configuration of one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisPlan {
    pub region: Region,
    pub config: BasinConfig,
}

impl AnalysisPlan {
    pub fn new(region: Region, config: BasinConfig) -> BasinResult<Self> {
        config.validate()?;
        Ok(Self { region, config })
    }

    pub fn epoch_labels(&self) -> Vec<&str> {
        self.config.epochs.iter().map(|e| e.label.as_str()).collect()
    }
}

/// Results of one epoch
#[derive(Debug)]
pub struct EpochOutcome {
    pub spec: EpochSpec,
    pub peak: BasinResult<EpochComposite>,
    pub mosaic: BasinResult<OpticalComposite>,
    /// `None` when the epoch has no SAR window
    pub sar: Option<BasinResult<SarComposite>>,
}

impl EpochOutcome {
    pub fn report(&self) -> Option<EpochReport> {
        self.peak.as_ref().ok().map(EpochComposite::report)
    }

    pub fn metadata(&self) -> EpochMetadata {
        EpochMetadata {
            label: self.spec.label.clone(),
            sensor: self.spec.sensor.display_name().to_string(),
            scene_count: self.mosaic.as_ref().map_or(0, |m| m.scene_count),
            range: self.spec.mosaic_range,
            sar_scene_count: self
                .sar
                .as_ref()
                .map(|sar| sar.as_ref().map_or(0, |s| s.scene_count)),
        }
    }

    /// Any grid produced by this epoch
    fn grid(&self) -> Option<&BandStack> {
        match (&self.mosaic, &self.peak) {
            (Ok(m), _) => Some(&m.stack),
            (_, Ok(p)) => Some(&p.stack),
            _ => None,
        }
    }
}

/// Executes an [`AnalysisPlan`] against a scene catalog
pub struct Pipeline<'a> {
    catalog: &'a dyn SceneCatalog,
}

impl<'a> Pipeline<'a> {
    pub fn new(catalog: &'a dyn SceneCatalog) -> Self {
        Self { catalog }
    }

    pub fn execute(&self, plan: &AnalysisPlan) -> AnalysisRun {
        log::info!(
            "Running {} epoch(s) over region {} {:?}",
            plan.config.epochs.len(),
            plan.region.name(),
            plan.region.bounds()
        );

        #[cfg(feature = "parallel")]
        let outcomes = {
            use rayon::prelude::*;
            plan.config
                .epochs
                .par_iter()
                .map(|spec| self.run_epoch(plan, spec))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let outcomes = plan
            .config
            .epochs
            .iter()
            .map(|spec| self.run_epoch(plan, spec))
            .collect();

        AnalysisRun { outcomes }
    }

    fn fetch(&self, collection: &str, plan: &AnalysisPlan, range: DateRange) -> BasinResult<Vec<Scene>> {
        self.catalog
            .scenes(&SceneQuery::new(collection, plan.region.bounds(), range))
    }

    fn run_epoch(&self, plan: &AnalysisPlan, spec: &EpochSpec) -> EpochOutcome {
        let region = &plan.region;

        let peak = || -> BasinResult<EpochComposite> {
            let scenes = self.fetch(&spec.catalog_id, plan, spec.peak_range)?;
            YearlyPeakDetector::with_params(plan.config.peak.clone()).detect_in_range(
                &spec.label,
                spec.year,
                &spec.peak_range,
                spec.sensor,
                &scenes,
                region,
            )
        };
        let mosaic = || -> BasinResult<OpticalComposite> {
            let scenes = self.fetch(&spec.catalog_id, plan, spec.mosaic_range)?;
            MedianCompositor::new().build(&spec.label, spec.sensor, &spec.mosaic_range, &scenes, region)
        };
        let sar = || -> Option<BasinResult<SarComposite>> {
            let range = spec.sar_range?;
            Some(self.fetch(SAR_COLLECTION, plan, range).and_then(|scenes| {
                SarCompositeBuilder::with_params(plan.config.sar.clone()).build(&spec.label, &range, &scenes, region)
            }))
        };

        #[cfg(feature = "parallel")]
        let (peak, (mosaic, sar)) = rayon::join(peak, || rayon::join(mosaic, sar));
        #[cfg(not(feature = "parallel"))]
        let (peak, mosaic, sar) = (peak(), mosaic(), sar());

        if let Err(e) = &peak {
            log::warn!("Epoch {}: peak composite unavailable: {}", spec.label, e);
        }
        if let Err(e) = &mosaic {
            log::warn!("Epoch {}: optical mosaic unavailable: {}", spec.label, e);
        }
        if let Some(Err(e)) = &sar {
            log::warn!("Epoch {}: SAR composite unavailable: {}", spec.label, e);
        }

        EpochOutcome {
            spec: spec.clone(),
            peak,
            mosaic,
            sar,
        }
    }
}

/// Outcomes of every epoch, in plan order
#[derive(Debug)]
pub struct AnalysisRun {
    pub outcomes: Vec<EpochOutcome>,
}

impl AnalysisRun {
    pub fn reports(&self) -> Vec<EpochReport> {
        self.outcomes.iter().filter_map(EpochOutcome::report).collect()
    }

    pub fn chart(&self) -> ComparativeChart {
        ComparativeChart::from_reports(&self.reports())
    }

    /// Preprocessing metadata followed by the yearly analysis lines
    pub fn console_report(&self) -> Vec<String> {
        let mut lines = vec![REPORT_HEADER.to_string()];
        lines.extend(self.outcomes.iter().map(|o| o.metadata().console_line()));
        for outcome in &self.outcomes {
            match &outcome.peak {
                Ok(peak) => lines.extend(peak.report().console_lines()),
                Err(e) => {
                    lines.push(format!("--- Yearly Analysis: {} ---", outcome.spec.year));
                    lines.push(format!("Unavailable: {}", e));
                }
            }
        }
        lines
    }

    /// Display layers: topography, optical, SAR, region outline, then peak layers
    pub fn layers(&self, region: &Region, dem: Option<&BandStack>) -> BasinResult<Vec<Layer>> {
        let mut layers = Vec::new();
        if let Some(dem) = dem {
            layers.push(render::topography_layer(dem)?);
        }

        let last = self.outcomes.len().saturating_sub(1);
        for (i, outcome) in self.outcomes.iter().enumerate() {
            if let Ok(mosaic) = &outcome.mosaic {
                layers.push(render::optical_layer(mosaic, i == 0 || i == last)?);
                if mosaic.sensor.family() == SensorFamily::Sentinel2 {
                    layers.push(render::false_color_layer(mosaic)?);
                }
            }
        }

        let sar: Vec<&SarComposite> = self
            .outcomes
            .iter()
            .filter_map(|o| o.sar.as_ref().and_then(|s| s.as_ref().ok()))
            .collect();
        for (i, composite) in sar.iter().enumerate() {
            layers.push(render::sar_layer(composite, i + 1 == sar.len())?);
        }

        if let Some(grid) = self.outcomes.iter().find_map(EpochOutcome::grid) {
            layers.push(render::roi_boundary_layer(region, grid)?);
        }

        for (i, outcome) in self.outcomes.iter().enumerate() {
            if let Ok(peak) = &outcome.peak {
                layers.extend(render::peak_layers(peak, i)?);
            }
        }
        Ok(layers)
    }

    pub fn legend(&self) -> Legend {
        let labels: Vec<&str> = self.outcomes.iter().map(|o| o.spec.label.as_str()).collect();
        render::peak_legend(&labels)
    }

    /// Optical mosaic, SAR and peak analysis exports of every available product
    pub fn export_requests(&self, plan: &AnalysisPlan) -> BasinResult<Vec<ExportRequest>> {
        let export = &plan.config.export;
        let bounds = plan.region.bounds();
        let mut requests = Vec::new();

        for outcome in &self.outcomes {
            let label = &outcome.spec.label;
            if let Ok(mosaic) = &outcome.mosaic {
                requests.push(ExportRequest {
                    description: format!("{}_Optical_Mosaic_{}", export.prefix, label),
                    folder: export.folder.clone(),
                    image: mosaic.stack.clone(),
                    region: bounds,
                    scale: outcome.spec.export_scale,
                    max_pixels: export.max_pixels,
                });
            }
            if let Some(Ok(sar)) = &outcome.sar {
                requests.push(ExportRequest {
                    description: format!("{}_SAR_{}", export.prefix, label),
                    folder: export.folder.clone(),
                    image: sar.stack.clone(),
                    region: bounds,
                    scale: export.sar_scale,
                    max_pixels: export.max_pixels,
                });
            }
            if let Ok(peak) = &outcome.peak {
                requests.push(ExportRequest {
                    description: format!("{}_Analysis_{}", export.analysis_prefix, label),
                    folder: export.analysis_folder.clone(),
                    image: peak.stack.select(&INDEX_BANDS)?,
                    region: bounds,
                    scale: export.analysis_scale,
                    max_pixels: export.analysis_max_pixels,
                });
            }
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::catalog::MemoryCatalog;
    use crate::types::BoundingBox;

    #[test]
    fn test_empty_catalog_keeps_every_epoch() {
        let region = Region::from_bounds("roi", BoundingBox::new(0.0, 0.0, 90.0, 90.0)).unwrap();
        let plan = AnalysisPlan::new(region, BasinConfig::default()).unwrap();
        let catalog = MemoryCatalog::new();
        let run = Pipeline::new(&catalog).execute(&plan);

        assert_eq!(run.outcomes.len(), 5);
        assert!(run.reports().is_empty());
        assert!(run.outcomes.iter().all(|o| o.peak.is_err() && o.mosaic.is_err()));
        assert!(run.outcomes[1].sar.is_none());
        assert!(matches!(
            run.outcomes[3].sar,
            Some(Err(crate::types::BasinError::EmptyCollection { .. }))
        ));

        let meta = run.outcomes[3].metadata();
        assert_eq!(meta.scene_count, 0);
        assert_eq!(meta.sar_scene_count, Some(0));

        let lines = run.console_report();
        assert_eq!(lines[0], REPORT_HEADER);
        assert!(lines[1].starts_with("Metadata 1985: Sensor: Landsat 5 TM, Count: 0"));
        assert!(run.export_requests(&plan).unwrap().is_empty());
        assert!(run.layers(&plan.region, None).unwrap().is_empty());
        assert_eq!(run.legend().entries.len(), 5);
    }
}

//! Sentinel-1 backscatter composites
//!
//! Scenes are filtered by footprint, polarization and instrument mode,
//! speckle filtered, clipped to the region and reduced with a temporal median.

use crate::core::band_profile::SAR_COLLECTION;
use crate::core::reducers::temporal_median;
use crate::core::region::Region;
use crate::core::speckle_filter::{KernelShape, SpeckleFilter, SpeckleFilterParams};
use crate::types::{AcquisitionMode, BandStack, BasinError, BasinResult, DateRange, Polarization, Scene};
use serde::{Deserialize, Serialize};

/// SAR scene selection and filtering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarFilterParams {
    pub polarization: Polarization,
    pub mode: AcquisitionMode,
    /// Focal median radius in meters
    pub radius_m: f64,
    pub kernel: KernelShape,
}

impl Default for SarFilterParams {
    fn default() -> Self {
        Self {
            polarization: Polarization::VV,
            mode: AcquisitionMode::IW,
            radius_m: 30.0,
            kernel: KernelShape::Circle,
        }
    }
}

/// Temporal median backscatter over one date range
#[derive(Debug, Clone)]
pub struct SarComposite {
    pub label: String,
    pub range: DateRange,
    /// Single band named after the polarization
    pub stack: BandStack,
    pub scene_count: usize,
}

impl SarComposite {
    pub fn band_name(&self) -> Option<&str> {
        self.stack.band_names().next()
    }
}

pub struct SarCompositeBuilder {
    params: SarFilterParams,
}

impl SarCompositeBuilder {
    pub fn new() -> Self {
        Self::with_params(SarFilterParams::default())
    }

    pub fn with_params(params: SarFilterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SarFilterParams {
        &self.params
    }

    /// Whether a scene takes part in the composite
    pub fn accepts(&self, scene: &Scene, range: &DateRange, region: &Region) -> bool {
        range.contains(&scene.acquired)
            && scene.footprint().intersects(&region.bounds())
            && scene.properties.polarizations.contains(&self.params.polarization)
            && scene.properties.instrument_mode == Some(self.params.mode)
    }

    pub fn build(
        &self,
        label: &str,
        range: &DateRange,
        scenes: &[Scene],
        region: &Region,
    ) -> BasinResult<SarComposite> {
        let band_name = self.params.polarization.to_string();
        let kept: Vec<&Scene> = scenes
            .iter()
            .filter(|s| self.accepts(s, range, region))
            .collect();

        log::info!(
            "SAR composite {}: {} of {} scenes match {} {:?} over {}",
            label,
            kept.len(),
            scenes.len(),
            band_name,
            self.params.mode,
            range
        );

        if kept.is_empty() {
            return Err(BasinError::EmptyCollection {
                collection: SAR_COLLECTION.to_string(),
                range: range.to_string(),
            });
        }

        let filter = SpeckleFilter::with_params(SpeckleFilterParams {
            radius_m: self.params.radius_m,
            kernel: self.params.kernel,
        });

        let mut filtered = Vec::with_capacity(kept.len());
        for scene in &kept {
            let vv = scene.band(&band_name)?;
            let smoothed = filter.apply_filter(vv, scene.stack.pixel_size_m())?;
            let single = scene.stack.empty_like().with_band(band_name.as_str(), smoothed)?;
            filtered.push(region.clip(&single)?);
        }

        let reference = &filtered[0];
        if let Some(bad) = filtered.iter().find(|s| !s.same_grid(reference)) {
            return Err(BasinError::InvalidFormat(format!(
                "SAR scenes are not on a common grid: {:?} vs {:?}",
                bad.shape(),
                reference.shape()
            )));
        }

        let layers: Vec<_> = filtered
            .iter()
            .filter_map(|s| s.band(&band_name))
            .collect();
        let median = temporal_median(&layers)?;
        let stack = reference.empty_like().with_band(band_name, median)?;

        Ok(SarComposite {
            label: label.to_string(),
            range: *range,
            stack,
            scene_count: kept.len(),
        })
    }
}

impl Default for SarCompositeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

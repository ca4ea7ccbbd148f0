//! Per-pixel flood peak detection for one epoch year
//!
//! Every scene of the year is masked and augmented with index bands, then a
//! quality mosaic keeps, per pixel, the scene with the highest MNDWI and carries
//! its NDVI, BSI and month along.

use crate::core::band_profile::Sensor;
use crate::core::indices::{IndexEngine, BSI, MNDWI, MONTH, NDVI};
use crate::core::quality_mask::QaMask;
use crate::core::region::Region;
use crate::core::report::EpochReport;
use crate::core::statistics::RegionStatistics;
use crate::types::{BandStack, BasinError, BasinResult, DateRange, Scene};
use chrono::{DateTime, TimeZone, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Composite `stacks` by maximising `criterion` per pixel.
///
/// The output holds `criterion` plus every `payload` band, all taken from the
/// winning input. Ties go to the earliest input; pixels where the criterion is
/// no-data in every input stay no-data.
pub fn quality_mosaic(stacks: &[&BandStack], criterion: &str, payload: &[&str]) -> BasinResult<BandStack> {
    let first = stacks.first().ok_or_else(|| {
        BasinError::Processing("Quality mosaic requires at least one input".to_string())
    })?;
    if let Some(bad) = stacks.iter().find(|s| !s.same_grid(first)) {
        return Err(BasinError::InvalidFormat(format!(
            "Mosaic inputs are not on a common grid: {:?} vs {:?}",
            bad.shape(),
            first.shape()
        )));
    }

    for s in stacks {
        for name in std::iter::once(&criterion).chain(payload) {
            if s.band(name).is_none() {
                return Err(BasinError::BandResolution {
                    scene: "mosaic input".to_string(),
                    band: name.to_string(),
                });
            }
        }
    }

    let shape = first.shape();
    let mut best = Array2::<f32>::from_elem(shape, f32::NAN);
    let mut winner = Array2::<usize>::from_elem(shape, usize::MAX);
    for (index, stack) in stacks.iter().enumerate() {
        if let Some(score) = stack.band(criterion) {
            ndarray::Zip::from(&mut best)
                .and(&mut winner)
                .and(score)
                .for_each(|b, w, &v| {
                    if v.is_finite() && (*w == usize::MAX || v > *b) {
                        *b = v;
                        *w = index;
                    }
                });
        }
    }

    let mut out = first.empty_like();
    out.insert(criterion, best)?;
    for name in payload {
        let carried = Array2::from_shape_fn(shape, |(r, c)| {
            let w = winner[[r, c]];
            if w == usize::MAX {
                f32::NAN
            } else {
                stacks[w].band(name).map_or(f32::NAN, |b| b[[r, c]])
            }
        });
        out.insert(*name, carried)?;
    }
    Ok(out)
}

/// Peak detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDetectorParams {
    /// Region statistics scale in meters
    pub analysis_scale: f64,
    pub max_pixels: f64,
}

impl Default for PeakDetectorParams {
    fn default() -> Self {
        Self {
            analysis_scale: 1000.0,
            max_pixels: 1e9,
        }
    }
}

/// Region medians of the peak composite
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EpochSummary {
    pub mndwi: Option<f64>,
    pub ndvi: Option<f64>,
    pub bsi: Option<f64>,
    pub month_median: Option<f64>,
    /// Rounded month median
    pub peak_month: Option<u32>,
}

/// Peak composite of one epoch year
#[derive(Debug, Clone)]
pub struct EpochComposite {
    pub label: String,
    pub year: i32,
    pub sensor: Sensor,
    /// MNDWI, NDVI, BSI and month bands
    pub stack: BandStack,
    pub summary: EpochSummary,
    pub scene_count: usize,
    /// Start of the epoch year
    pub start: DateTime<Utc>,
}

impl EpochComposite {
    pub fn report(&self) -> EpochReport {
        EpochReport {
            year: self.year,
            mndwi_value: self.summary.mndwi,
            ndvi_value: self.summary.ndvi,
            bsi_value: self.summary.bsi,
            peak_month: self.summary.peak_month,
        }
    }
}

pub struct YearlyPeakDetector {
    params: PeakDetectorParams,
}

impl YearlyPeakDetector {
    pub fn new() -> Self {
        Self::with_params(PeakDetectorParams::default())
    }

    pub fn with_params(params: PeakDetectorParams) -> Self {
        Self { params }
    }

    /// Peak composite over the calendar year `year`
    pub fn detect(
        &self,
        label: &str,
        year: i32,
        sensor: Sensor,
        scenes: &[Scene],
        region: &Region,
    ) -> BasinResult<EpochComposite> {
        let range = DateRange::calendar_year(year)?;
        self.detect_in_range(label, year, &range, sensor, scenes, region)
    }

    /// Peak composite over an explicit date range
    pub fn detect_in_range(
        &self,
        label: &str,
        year: i32,
        range: &DateRange,
        sensor: Sensor,
        scenes: &[Scene],
        region: &Region,
    ) -> BasinResult<EpochComposite> {
        let selected: Vec<&Scene> = scenes
            .iter()
            .filter(|s| range.contains(&s.acquired) && s.footprint().intersects(&region.bounds()))
            .collect();

        log::info!(
            "Peak detection {} ({}): {} of {} scenes in {}",
            label,
            sensor,
            selected.len(),
            scenes.len(),
            range
        );

        if selected.is_empty() {
            return Err(BasinError::EmptyCollection {
                collection: sensor.collection_id().to_string(),
                range: range.to_string(),
            });
        }

        let mask = QaMask::for_sensor(sensor);
        let engine = IndexEngine::for_sensor(sensor);
        let prepare = |s: &&Scene| -> BasinResult<Scene> { engine.augment(&mask.apply(s, region)?) };

        #[cfg(feature = "parallel")]
        let indexed: Vec<Scene> = {
            use rayon::prelude::*;
            selected.par_iter().map(prepare).collect::<BasinResult<_>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let indexed: Vec<Scene> = selected.iter().map(prepare).collect::<BasinResult<_>>()?;

        let stacks: Vec<&BandStack> = indexed.iter().map(|s| &s.stack).collect();
        let stack = quality_mosaic(&stacks, MNDWI, &[NDVI, BSI, MONTH])?;

        let stats = RegionStatistics::new(self.params.analysis_scale, self.params.max_pixels);
        let medians = stats.median(&stack, &region.bounds(), &[MNDWI, NDVI, BSI, MONTH])?;
        let get = |name: &str| medians.get(name).copied().flatten();
        let month_median = get(MONTH);
        let summary = EpochSummary {
            mndwi: get(MNDWI),
            ndvi: get(NDVI),
            bsi: get(BSI),
            month_median,
            peak_month: month_median.map(|m| m.round() as u32),
        };
        log::debug!("Epoch {} summary: {:?}", label, summary);

        let start = range
            .start
            .and_hms_opt(0, 0, 0)
            .map(|t| Utc.from_utc_datetime(&t))
            .ok_or_else(|| BasinError::Processing(format!("Invalid epoch start {}", range.start)))?;

        Ok(EpochComposite {
            label: label.to_string(),
            year,
            sensor,
            stack,
            summary,
            scene_count: selected.len(),
            start,
        })
    }
}

impl Default for YearlyPeakDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordinateSystem, GeoTransform};
    use approx::assert_relative_eq;
    use ndarray::arr2;

    fn stack(mndwi: [[f32; 2]; 1], tag: f32) -> BandStack {
        BandStack::new(
            (1, 2),
            GeoTransform::north_up(0.0, 30.0, 30.0, 30.0),
            CoordinateSystem::Projected { epsg: 32636 },
        )
        .with_band(MNDWI, arr2(&mndwi))
        .unwrap()
        .with_band(NDVI, Array2::from_elem((1, 2), tag))
        .unwrap()
    }

    #[test]
    fn test_mosaic_picks_max_and_carries_payload() {
        let a = stack([[0.1, f32::NAN]], 1.0);
        let b = stack([[0.4, f32::NAN]], 2.0);
        let c = stack([[0.2, f32::NAN]], 3.0);
        let out = quality_mosaic(&[&a, &b, &c], MNDWI, &[NDVI]).unwrap();
        assert_relative_eq!(out.band(MNDWI).unwrap()[[0, 0]], 0.4);
        assert_relative_eq!(out.band(NDVI).unwrap()[[0, 0]], 2.0);
        assert!(out.band(MNDWI).unwrap()[[0, 1]].is_nan());
        assert!(out.band(NDVI).unwrap()[[0, 1]].is_nan());
    }

    #[test]
    fn test_mosaic_tie_goes_to_first() {
        let a = stack([[0.3, 0.3]], 1.0);
        let b = stack([[0.3, 0.3]], 2.0);
        let out = quality_mosaic(&[&a, &b], MNDWI, &[NDVI]).unwrap();
        assert_eq!(out.band(NDVI).unwrap()[[0, 0]], 1.0);
    }

    #[test]
    fn test_mosaic_negative_values_win_over_nodata() {
        let a = stack([[f32::NAN, -0.5]], 1.0);
        let b = stack([[-0.2, f32::NAN]], 2.0);
        let out = quality_mosaic(&[&a, &b], MNDWI, &[NDVI]).unwrap();
        assert_eq!(out.band(NDVI).unwrap()[[0, 0]], 2.0);
        assert_eq!(out.band(NDVI).unwrap()[[0, 1]], 1.0);
    }

    #[test]
    fn test_mosaic_grid_mismatch() {
        let a = stack([[0.1, 0.1]], 1.0);
        let mut b = stack([[0.1, 0.1]], 1.0);
        b.transform.top_left_x += 30.0;
        assert!(matches!(
            quality_mosaic(&[&a, &b], MNDWI, &[NDVI]),
            Err(BasinError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_report_fields() {
        let composite = EpochComposite {
            label: "1995".to_string(),
            year: 1995,
            sensor: Sensor::Landsat5Tm,
            stack: stack([[0.1, 0.1]], 1.0),
            summary: EpochSummary {
                mndwi: Some(0.42),
                ndvi: Some(0.35),
                bsi: Some(-0.1),
                month_median: Some(7.0),
                peak_month: Some(7),
            },
            scene_count: 3,
            start: Utc.with_ymd_and_hms(1995, 1, 1, 0, 0, 0).unwrap(),
        };
        let report = composite.report();
        assert_eq!(report.year, 1995);
        assert_eq!(report.peak_month, Some(7));
    }
}

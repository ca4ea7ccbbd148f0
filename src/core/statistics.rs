use crate::core::reducers::median;
use crate::types::{BandStack, BasinError, BasinResult, BoundingBox};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Region median reducer evaluated on a coarse analysis grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStatistics {
    /// Analysis grid spacing in meters
    pub scale: f64,
    /// Upper bound on analysis grid cells
    pub max_pixels: f64,
}

impl Default for RegionStatistics {
    fn default() -> Self {
        Self {
            scale: 1000.0,
            max_pixels: 1e9,
        }
    }
}

impl RegionStatistics {
    pub fn new(scale: f64, max_pixels: f64) -> Self {
        Self { scale, max_pixels }
    }

    /// Cell centres of the analysis grid over `bounds`, in the CRS of `stack`.
    ///
    /// The bounds are divided into `ceil(extent / step)` equal cells per axis.
    pub fn sample_points(&self, stack: &BandStack, bounds: &BoundingBox) -> BasinResult<Vec<(f64, f64)>> {
        if self.scale.is_nan() || self.scale <= 0.0 {
            return Err(BasinError::Config(format!(
                "Analysis scale must be positive, got {}",
                self.scale
            )));
        }
        let (_, lat) = bounds.center();
        let (dx, dy) = stack.crs.meters_to_map_units(self.scale, lat);

        let ncols = ((bounds.width() / dx).ceil() as usize).max(1);
        let nrows = ((bounds.height() / dy).ceil() as usize).max(1);
        let cells = ncols as f64 * nrows as f64;
        if cells > self.max_pixels {
            return Err(BasinError::Processing(format!(
                "Analysis grid of {} x {} cells exceeds maxPixels {:e}",
                ncols, nrows, self.max_pixels
            )));
        }

        let cell_w = bounds.width() / ncols as f64;
        let cell_h = bounds.height() / nrows as f64;
        let mut points = Vec::with_capacity(ncols * nrows);
        for r in 0..nrows {
            let y = bounds.max_y - (r as f64 + 0.5) * cell_h;
            for c in 0..ncols {
                points.push((bounds.min_x + (c as f64 + 0.5) * cell_w, y));
            }
        }
        Ok(points)
    }

    /// Median of each named band over the analysis grid. Bands with no valid
    /// samples map to `None`.
    pub fn median(
        &self,
        stack: &BandStack,
        bounds: &BoundingBox,
        bands: &[&str],
    ) -> BasinResult<BTreeMap<String, Option<f64>>> {
        let points = self.sample_points(stack, bounds)?;
        let pixels: Vec<(usize, usize)> = points
            .iter()
            .filter_map(|&(x, y)| stack.transform.world_to_pixel(x, y, stack.shape()))
            .collect();

        log::debug!(
            "Region median at {} m: {} grid cells, {} inside the raster",
            self.scale,
            points.len(),
            pixels.len()
        );

        let mut out = BTreeMap::new();
        for name in bands {
            let band = stack.band(name).ok_or_else(|| BasinError::BandResolution {
                scene: "statistics input".to_string(),
                band: name.to_string(),
            })?;
            let mut values: Vec<f64> = pixels.iter().map(|&p| band[p] as f64).collect();
            out.insert(name.to_string(), median(&mut values));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordinateSystem, GeoTransform};
    use approx::assert_relative_eq;
    use ndarray::{arr2, Array2};

    fn utm_stack(band: Array2<f32>, pixel: f64) -> BandStack {
        let (rows, cols) = band.dim();
        BandStack::new(
            (rows, cols),
            GeoTransform::north_up(0.0, rows as f64 * pixel, pixel, pixel),
            CoordinateSystem::Projected { epsg: 32636 },
        )
        .with_band("X", band)
        .unwrap()
    }

    #[test]
    fn test_grid_centres() {
        let stack = utm_stack(Array2::zeros((1, 1)), 3000.0);
        let stats = RegionStatistics::default();
        let pts = stats
            .sample_points(&stack, &BoundingBox::new(0.0, 0.0, 2500.0, 1000.0))
            .unwrap();
        // 3 columns of 833.3 m, 1 row
        assert_eq!(pts.len(), 3);
        assert_relative_eq!(pts[0].0, 2500.0 / 6.0, epsilon = 1e-9);
        assert_relative_eq!(pts[0].1, 500.0);
    }

    #[test]
    fn test_median_ignores_nodata() {
        let band = arr2(&[[1.0, 2.0], [f32::NAN, 9.0]]);
        let stack = utm_stack(band, 1000.0);
        let stats = RegionStatistics::default();
        let bounds = stack.footprint();
        let out = stats.median(&stack, &bounds, &["X"]).unwrap();
        assert_relative_eq!(out["X"].unwrap(), 2.0);
    }

    #[test]
    fn test_all_nodata_is_none() {
        let stack = utm_stack(Array2::from_elem((2, 2), f32::NAN), 1000.0);
        let out = RegionStatistics::default()
            .median(&stack, &stack.footprint(), &["X"])
            .unwrap();
        assert_eq!(out["X"], None);
    }

    #[test]
    fn test_max_pixels_exceeded() {
        let stack = utm_stack(Array2::zeros((2, 2)), 1000.0);
        let stats = RegionStatistics::new(1.0, 100.0);
        assert!(stats.median(&stack, &stack.footprint(), &["X"]).is_err());
    }

    #[test]
    fn test_geographic_scale() {
        let stack = BandStack::new(
            (10, 10),
            GeoTransform::north_up(36.0, 16.0, 0.01, 0.01),
            CoordinateSystem::Geographic,
        )
        .with_band("X", Array2::from_elem((10, 10), 0.5))
        .unwrap();
        let stats = RegionStatistics::default();
        let pts = stats.sample_points(&stack, &stack.footprint()).unwrap();
        // 0.1 deg is about 11 km north-south
        assert!(pts.len() >= 100 && pts.len() <= 144);
        let out = stats.median(&stack, &stack.footprint(), &["X"]).unwrap();
        assert_relative_eq!(out["X"].unwrap(), 0.5);
    }
}

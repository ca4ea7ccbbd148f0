use crate::types::{Band, BasinError, BasinResult};
use crate::core::reducers::median;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Neighbourhood shape of the focal window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelShape {
    /// Pixels whose center lies within the radius
    Circle,
    /// Full (2r+1) x (2r+1) window
    Square,
}

/// Speckle filtering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeckleFilterParams {
    /// Kernel radius in meters
    pub radius_m: f64,
    pub kernel: KernelShape,
}

impl Default for SpeckleFilterParams {
    fn default() -> Self {
        Self {
            radius_m: 30.0,
            kernel: KernelShape::Circle,
        }
    }
}

/// Focal median speckle filter for backscatter in dB
pub struct SpeckleFilter {
    params: SpeckleFilterParams,
}

impl SpeckleFilter {
    /// Create a new speckle filter with default parameters
    pub fn new() -> Self {
        Self {
            params: SpeckleFilterParams::default(),
        }
    }

    /// Create a speckle filter with custom parameters
    pub fn with_params(params: SpeckleFilterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SpeckleFilterParams {
        &self.params
    }

    /// Kernel radius in pixels for a given pixel size, at least one pixel
    pub fn radius_pixels(&self, pixel_size_m: f64) -> usize {
        if pixel_size_m.is_nan() || pixel_size_m <= 0.0 {
            return 1;
        }
        ((self.params.radius_m / pixel_size_m).round() as usize).max(1)
    }

    /// Row/column offsets of the kernel
    fn offsets(&self, radius: usize) -> Vec<(isize, isize)> {
        let r = radius as isize;
        let limit = (radius * radius) as isize;
        let mut offsets = Vec::new();
        for di in -r..=r {
            for dj in -r..=r {
                let inside = match self.params.kernel {
                    KernelShape::Circle => di * di + dj * dj <= limit,
                    KernelShape::Square => true,
                };
                if inside {
                    offsets.push((di, dj));
                }
            }
        }
        offsets
    }

    /// Focal median of a SAR band.
    ///
    /// No-data neighbours are ignored; a no-data center stays no-data.
    pub fn apply_filter(&self, image: &Band, pixel_size_m: f64) -> BasinResult<Band> {
        if self.params.radius_m <= 0.0 {
            return Err(BasinError::Processing(format!(
                "Speckle filter radius must be positive, got {} m",
                self.params.radius_m
            )));
        }

        let radius = self.radius_pixels(pixel_size_m);
        let offsets = self.offsets(radius);
        log::debug!(
            "Applying median speckle filter: {} m radius = {} px, {} kernel taps",
            self.params.radius_m,
            radius,
            offsets.len()
        );

        let (height, width) = image.dim();
        let filter_row = |i: usize| -> Vec<f32> {
            let mut window = Vec::with_capacity(offsets.len());
            (0..width)
                .map(|j| {
                    if !image[[i, j]].is_finite() {
                        return f32::NAN;
                    }
                    window.clear();
                    for &(di, dj) in &offsets {
                        let ii = i as isize + di;
                        let jj = j as isize + dj;
                        if ii < 0 || jj < 0 || ii >= height as isize || jj >= width as isize {
                            continue;
                        }
                        let v = image[[ii as usize, jj as usize]];
                        if v.is_finite() {
                            window.push(v);
                        }
                    }
                    median(&mut window).unwrap_or(f32::NAN)
                })
                .collect()
        };

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<f32>> = {
            use rayon::prelude::*;
            (0..height).into_par_iter().map(filter_row).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<f32>> = (0..height).map(filter_row).collect();

        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((height, width), flat)
            .map_err(|e| BasinError::Processing(format!("Speckle filter output: {}", e)))
    }
}

impl Default for SpeckleFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_radius_pixels() {
        let filter = SpeckleFilter::new();
        assert_eq!(filter.radius_pixels(10.0), 3);
        assert_eq!(filter.radius_pixels(30.0), 1);
        // coarser than the radius still gets a 1 pixel neighbourhood
        assert_eq!(filter.radius_pixels(100.0), 1);
    }

    #[test]
    fn test_circle_kernel_excludes_corners() {
        let filter = SpeckleFilter::new();
        let taps = filter.offsets(1);
        assert_eq!(taps.len(), 5);
        assert!(!taps.contains(&(1, 1)));

        let square = SpeckleFilter::with_params(SpeckleFilterParams {
            radius_m: 30.0,
            kernel: KernelShape::Square,
        });
        assert_eq!(square.offsets(1).len(), 9);
    }

    #[test]
    fn test_median_removes_spike_in_db() {
        let mut image = Array2::from_elem((5, 5), -12.0f32);
        image[[2, 2]] = 5.0;
        let out = SpeckleFilter::new().apply_filter(&image, 30.0).unwrap();
        assert_relative_eq!(out[[2, 2]], -12.0);
    }

    #[test]
    fn test_nodata_handling() {
        let mut image = Array2::from_elem((3, 3), -10.0f32);
        image[[0, 0]] = f32::NAN;
        image[[1, 1]] = -20.0;
        let out = SpeckleFilter::new().apply_filter(&image, 30.0).unwrap();
        assert!(out[[0, 0]].is_nan());
        // neighbours of (0,1): (0,1), (1,1), (0,2); (0,0) is skipped
        assert_relative_eq!(out[[0, 1]], -10.0);
        assert_relative_eq!(out[[1, 1]], -10.0);
    }
}
